use cv_core::{CameraExtrinsics, CameraIntrinsics, ImageDimension, PinholeModel};
use cv_stereo::*;
use image::{GrayImage, Luma};
use nalgebra::{Matrix3, Vector3};

/// Hashed texture with no repeating pattern along a row. `right` sees the
/// scene `shift` pixels further left than `left`.
fn shifted_texture(width: u32, height: u32, shift: u32) -> (GrayImage, GrayImage) {
    let texture = |x: u32, y: u32| -> u8 {
        ((x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)) % 241) as u8
    };
    let left = GrayImage::from_fn(width, height, |x, y| Luma([texture(x, y)]));
    let right = GrayImage::from_fn(width, height, |x, y| Luma([texture(x + shift, y)]));
    (left, right)
}

#[test]
fn test_block_matching_sad() {
    let (left, right) = shifted_texture(64, 64, 4);

    let disparity = BlockMatcher::new()
        .with_block_size(7)
        .with_disparity_range(0, 10)
        .with_metric(MatchingMetric::SAD)
        .compute(&left, &right)
        .unwrap();

    assert!(disparity.is_valid(32, 32));
    assert_eq!(disparity.get(32, 32), 4.0);
    for x in 20..60 {
        assert_eq!(disparity.get(x, 40), 4.0, "column {x}");
    }
}

#[test]
fn test_block_matching_ssd() {
    let (left, right) = shifted_texture(64, 64, 2);

    let disparity = BlockMatcher::new()
        .with_block_size(5)
        .with_disparity_range(0, 5)
        .with_metric(MatchingMetric::SSD)
        .compute(&left, &right)
        .unwrap();

    assert!(disparity.is_valid(32, 32));
    assert_eq!(disparity.get(32, 32), 2.0);
}

#[test]
fn test_block_matching_ncc_ignores_gain() {
    let (left, right) = shifted_texture(64, 64, 3);
    // Scaling the right image changes SAD costs but barely moves the correlation
    let right = GrayImage::from_fn(64, 64, |x, y| Luma([right.get_pixel(x, y)[0] / 2]));

    let disparity = BlockMatcher::new()
        .with_block_size(7)
        .with_disparity_range(0, 8)
        .with_metric(MatchingMetric::NCC)
        .compute(&left, &right)
        .unwrap();

    assert!(disparity.is_valid(32, 32));
    assert_eq!(disparity.get(32, 32), 3.0);
}

#[test]
fn test_rectified_sideways_pair_matches_shift() {
    let intrinsics = CameraIntrinsics::new(60.0, 60.0, 32.0, 24.0, 64, 48);
    let camera = PinholeModel::undistorted(intrinsics);
    let view1_to_view2 = CameraExtrinsics::new(Matrix3::identity(), Vector3::new(-0.25, 0.0, 0.0));
    let rect = StereoRectification::new(&camera, ImageDimension::new(64, 48), &camera, &view1_to_view2)
        .unwrap();

    // Fronto-parallel plane at depth 3 gives a disparity of 60 * 0.25 / 3 = 5
    let texture = |x: u32, y: u32| -> u8 { (((x / 3) * 37 + (y / 3) * 91) % 251) as u8 };
    let mut left = GrayImage::new(64, 48);
    let mut right = GrayImage::new(64, 48);
    for y in 0..48 {
        for x in 0..64 {
            left.put_pixel(x, y, Luma([texture(x + 10, y)]));
            right.put_pixel(x, y, Luma([texture(x + 15, y)]));
        }
    }

    let pair = rectify_stereo_pair(&rect, &left, &right);
    // Identity rectification leaves interior pixels untouched
    assert_eq!(pair.left.get_pixel(32, 24), left.get_pixel(32, 24));
    assert_eq!(pair.right.get_pixel(20, 10), right.get_pixel(20, 10));

    let mut disparity = BlockMatcher::new()
        .with_block_size(5)
        .with_disparity_range(0, 12)
        .compute(&pair.left, &pair.right)
        .unwrap();
    rect.invalidate_outside(&mut disparity, &pair);

    assert!(disparity.valid_count() > 0);
    assert_eq!(disparity.get(32, 24), 5.0);

    let params = rect.disparity_parameters(0, 12);
    assert!((params.depth(5.0).unwrap() - 3.0).abs() < 1e-9);
}
