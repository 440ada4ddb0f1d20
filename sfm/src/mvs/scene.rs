use super::{MvsError, Result};
use cv_core::{CameraExtrinsics, PinholeModel};
use serde::{Deserialize, Serialize};

/// Known extrinsics of a single view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneView {
    /// Index of the camera model used by this view
    pub camera: usize,
    pub world_to_view: CameraExtrinsics,
}

/// Known intrinsic and extrinsic parameters of every view, typically the
/// output of bundle adjustment. Read-only during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneStructure {
    pub cameras: Vec<PinholeModel>,
    pub views: Vec<SceneView>,
}

impl SceneStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_camera(&mut self, camera: PinholeModel) -> usize {
        self.cameras.push(camera);
        self.cameras.len() - 1
    }

    pub fn add_view(&mut self, camera: usize, world_to_view: CameraExtrinsics) -> usize {
        self.views.push(SceneView {
            camera,
            world_to_view,
        });
        self.views.len() - 1
    }

    pub fn view(&self, view: usize) -> Result<&SceneView> {
        self.views
            .get(view)
            .ok_or_else(|| MvsError::configuration(format!("scene has no view {view}")))
    }

    pub fn world_to_view(&self, view: usize) -> Result<CameraExtrinsics> {
        Ok(self.view(view)?.world_to_view)
    }

    pub fn camera_of(&self, view: usize) -> Result<&PinholeModel> {
        let camera = self.view(view)?.camera;
        self.cameras.get(camera).ok_or_else(|| {
            MvsError::configuration(format!("view {view} references missing camera {camera}"))
        })
    }

    /// Transform from the frame of `view1` into the frame of `view2`.
    pub fn view1_to_view2(&self, view1: usize, view2: usize) -> Result<CameraExtrinsics> {
        let world_to_view1 = self.world_to_view(view1)?;
        let world_to_view2 = self.world_to_view(view2)?;
        Ok(world_to_view1.inverse().concat(&world_to_view2))
    }
}
