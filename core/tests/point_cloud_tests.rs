use cv_core::point_cloud::PointCloudf64;
use nalgebra::Point3;

#[test]
fn test_point_cloud_append_preserves_order() {
    let mut cloud = PointCloudf64::default();
    assert!(cloud.is_empty());

    cloud.push(Point3::new(0.0, 0.0, 1.0));
    cloud.push(Point3::new(1.0, 1.0, 2.0));
    cloud.push(Point3::new(2.0, 0.5, 3.0));

    assert_eq!(cloud.len(), 3);
    let depths: Vec<f64> = cloud.iter().map(|p| p.z).collect();
    assert_eq!(depths, vec![1.0, 2.0, 3.0]);

    cloud.clear();
    assert!(cloud.is_empty());
}
