//! ONNX Runtime bindings for the detector and mesh models.

pub mod detector;
pub mod mesh;
pub mod session;
pub mod tracker;
pub mod yunet;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::environment::Backend;
use crate::model::{FaceModel, FaceModelLoader, MeshModel, MeshModelLoader, ModelBackend};
use crate::options::{DetectorOptions, LandmarkOptions, ModelType};

pub use detector::OnnxFaceDetector;
pub use mesh::OnnxFaceMesh;
pub use session::OrtBackendProbe;

/// Model files on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnnxModelPaths {
    pub detector: PathBuf,
    /// Detector used for [`ModelType::Full`]. Falls back to `detector`.
    pub detector_full_range: Option<PathBuf>,
    pub mesh: PathBuf,
}

impl Default for OnnxModelPaths {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            detector_full_range: None,
            mesh: PathBuf::from("models/face_mesh.onnx"),
        }
    }
}

impl OnnxModelPaths {
    pub fn detector_for(&self, model_type: ModelType) -> &PathBuf {
        match (model_type, &self.detector_full_range) {
            (ModelType::Full, Some(full)) => full,
            (ModelType::Full, None) => {
                log::warn!("no full-range detector configured, using the default detector");
                &self.detector
            }
            (ModelType::Short, _) => &self.detector,
        }
    }
}

pub struct OnnxFaceLoader {
    paths: OnnxModelPaths,
}

impl FaceModelLoader for OnnxFaceLoader {
    fn load(&self, options: &DetectorOptions, backend: Backend) -> Result<Box<dyn FaceModel>> {
        let path = self.paths.detector_for(options.model_type);
        log::debug!("loading face detector from {}", path.display());
        Ok(Box::new(OnnxFaceDetector::load(
            path,
            backend,
            options.enable_tracking,
        )?))
    }
}

pub struct OnnxMeshLoader {
    paths: OnnxModelPaths,
}

impl OnnxMeshLoader {
    /// Mesh regions come from the same detector as the face list.
    fn region_detector(&self, options: &LandmarkOptions) -> &Path {
        self.paths.detector_for(options.model_type)
    }
}

impl MeshModelLoader for OnnxMeshLoader {
    fn load(&self, options: &LandmarkOptions, backend: Backend) -> Result<Box<dyn MeshModel>> {
        log::debug!("loading face mesh from {}", self.paths.mesh.display());
        Ok(Box::new(OnnxFaceMesh::load(
            self.region_detector(options),
            &self.paths.mesh,
            backend,
        )?))
    }
}

/// [`ModelBackend`] running both models on ONNX Runtime.
pub fn onnx_backend(paths: OnnxModelPaths) -> ModelBackend {
    ModelBackend::new(
        OnnxFaceLoader {
            paths: paths.clone(),
        },
        OnnxMeshLoader { paths },
        OrtBackendProbe,
    )
}
