//! Seams to the external face-detection and face-mesh models.
//!
//! Adapters never see a concrete network: they build models through a
//! loader and read back the loosely-shaped `Raw*` outputs defined here.

use crate::environment::{Backend, BackendProbe};
use crate::media::Media;
use crate::options::{DetectorOptions, LandmarkOptions};
use crate::types::{BoundingBox, Point3D};

/// Keypoint as reported by a detector. Some models attach a confidence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawKeypoint {
    pub x: f32,
    pub y: f32,
    pub score: Option<f32>,
}

/// One face as a detector reports it. Which fields are populated depends on
/// the model; see [`crate::detector::SCORE_EXTRACTORS`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawFace {
    pub bbox: Option<BoundingBox>,
    pub score: Option<f32>,
    pub confidence: Option<f32>,
    pub keypoints: Vec<RawKeypoint>,
    pub tracking_id: Option<u32>,
}

impl RawFace {
    pub fn with_box(bbox: BoundingBox) -> Self {
        Self {
            bbox: Some(bbox),
            ..Default::default()
        }
    }

    pub fn scored(bbox: BoundingBox, score: f32) -> Self {
        Self {
            bbox: Some(bbox),
            score: Some(score),
            ..Default::default()
        }
    }
}

/// One face mesh, in the coordinate space of the media it was run on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawMesh {
    pub points: Vec<Point3D>,
    pub score: Option<f32>,
}

impl RawMesh {
    pub fn new(points: Vec<Point3D>) -> Self {
        Self {
            points,
            score: None,
        }
    }
}

pub trait FaceModel: Send {
    fn estimate_faces(
        &mut self,
        media: &Media,
        options: &DetectorOptions,
    ) -> anyhow::Result<Vec<RawFace>>;

    /// Release runtime resources. Called once before the model is dropped.
    fn dispose(&mut self) {}
}

pub trait MeshModel: Send {
    fn estimate_mesh(
        &mut self,
        media: &Media,
        options: &LandmarkOptions,
    ) -> anyhow::Result<Vec<RawMesh>>;

    fn dispose(&mut self) {}
}

/// Builds a [`FaceModel`] for the given settings.
pub trait FaceModelLoader: Send + Sync {
    fn load(&self, options: &DetectorOptions, backend: Backend)
        -> anyhow::Result<Box<dyn FaceModel>>;
}

/// Builds a [`MeshModel`] for the given settings.
pub trait MeshModelLoader: Send + Sync {
    fn load(&self, options: &LandmarkOptions, backend: Backend)
        -> anyhow::Result<Box<dyn MeshModel>>;
}

/// Everything [`FaceApi`](crate::FaceApi) needs from a model runtime.
pub struct ModelBackend {
    pub faces: Box<dyn FaceModelLoader>,
    pub mesh: Box<dyn MeshModelLoader>,
    pub probe: Box<dyn BackendProbe>,
}

impl ModelBackend {
    pub fn new(
        faces: impl FaceModelLoader + 'static,
        mesh: impl MeshModelLoader + 'static,
        probe: impl BackendProbe + 'static,
    ) -> Self {
        Self {
            faces: Box::new(faces),
            mesh: Box::new(mesh),
            probe: Box::new(probe),
        }
    }
}

/// Model state held by an adapter: built lazily, dropped on invalidation.
pub(crate) enum ModelState<M: ?Sized> {
    Uninitialized,
    Ready(Box<M>),
}

impl<M: ?Sized> ModelState<M> {
    pub(crate) fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }

    pub(crate) fn get_or_try_init<E>(
        &mut self,
        init: impl FnOnce() -> Result<Box<M>, E>,
    ) -> Result<&mut M, E> {
        if let ModelState::Uninitialized = self {
            *self = ModelState::Ready(init()?);
        }
        match self {
            ModelState::Ready(model) => Ok(&mut **model),
            ModelState::Uninitialized => unreachable!("initialized above"),
        }
    }

    pub(crate) fn take(&mut self) -> Option<Box<M>> {
        match std::mem::replace(self, ModelState::Uninitialized) {
            ModelState::Ready(model) => Some(model),
            ModelState::Uninitialized => None,
        }
    }
}
