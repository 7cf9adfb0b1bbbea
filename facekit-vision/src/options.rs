//! Caller-facing configuration.
//!
//! [`FaceApiOptions`] is a sparse overlay: every field is optional, merging
//! copies the fields that are set, and [`ResolvedOptions`] fills in defaults.

use serde::{Deserialize, Serialize};

use crate::environment::{Backend, Environment};
use crate::error::{FaceError, FaceResult};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_FACES: usize = 10;

/// Detector model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    /// Faces within a couple of metres of the camera.
    #[default]
    Short,
    /// Faces further away; heavier model.
    Full,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceApiOptions {
    pub score_threshold: Option<f32>,
    pub max_faces: Option<usize>,
    /// Cap on faces receiving landmarks. Defaults to `max_faces`.
    pub max_landmark_faces: Option<usize>,
    pub enable_tracking: Option<bool>,
    pub refine_landmarks: Option<bool>,
    pub environment: Option<Environment>,
    pub model_type: Option<ModelType>,
    pub runtime: Option<Backend>,
    /// Inputs wider than this are downscaled before inference; 0 disables.
    pub downscale_width_threshold: Option<u32>,
}

impl FaceApiOptions {
    pub fn validate(&self) -> FaceResult<()> {
        if let Some(threshold) = self.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(FaceError::InvalidOptions(format!(
                    "score_threshold must be between 0.0 and 1.0, got {}",
                    threshold
                )));
            }
        }
        if self.max_faces == Some(0) {
            return Err(FaceError::InvalidOptions(
                "max_faces must be at least 1".to_string(),
            ));
        }
        if self.max_landmark_faces == Some(0) {
            return Err(FaceError::InvalidOptions(
                "max_landmark_faces must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay every field set in `other`.
    pub fn merge(&mut self, other: &FaceApiOptions) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        overlay!(
            score_threshold,
            max_faces,
            max_landmark_faces,
            enable_tracking,
            refine_landmarks,
            environment,
            model_type,
            runtime,
            downscale_width_threshold
        );
    }

    pub fn resolve(&self) -> ResolvedOptions {
        let max_faces = self.max_faces.unwrap_or(DEFAULT_MAX_FACES);
        ResolvedOptions {
            score_threshold: self.score_threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD),
            max_faces,
            max_landmark_faces: self.max_landmark_faces.unwrap_or(max_faces),
            enable_tracking: self.enable_tracking.unwrap_or(false),
            refine_landmarks: self.refine_landmarks.unwrap_or(false),
            environment: self.environment,
            model_type: self.model_type.unwrap_or_default(),
            runtime: self.runtime,
            downscale_width_threshold: self.downscale_width_threshold.unwrap_or(0),
        }
    }
}

/// [`FaceApiOptions`] with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub score_threshold: f32,
    pub max_faces: usize,
    pub max_landmark_faces: usize,
    pub enable_tracking: bool,
    pub refine_landmarks: bool,
    pub environment: Option<Environment>,
    pub model_type: ModelType,
    pub runtime: Option<Backend>,
    pub downscale_width_threshold: u32,
}

impl ResolvedOptions {
    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            score_threshold: self.score_threshold,
            max_faces: self.max_faces,
            enable_tracking: self.enable_tracking,
            model_type: self.model_type,
        }
    }

    pub fn landmark_options(&self) -> LandmarkOptions {
        LandmarkOptions {
            score_threshold: self.score_threshold,
            max_faces: self.max_landmark_faces,
            refine_landmarks: self.refine_landmarks,
            model_type: self.model_type,
        }
    }
}

/// Settings the face detector adapter and its model are built with.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    pub score_threshold: f32,
    pub max_faces: usize,
    pub enable_tracking: bool,
    pub model_type: ModelType,
}

impl DetectorOptions {
    /// Fields baked into a constructed model; changing one forces a rebuild.
    pub fn requires_rebuild(&self, next: &DetectorOptions) -> bool {
        self.max_faces != next.max_faces
            || self.enable_tracking != next.enable_tracking
            || self.model_type != next.model_type
    }
}

impl Default for DetectorOptions {
    fn default() -> Self {
        FaceApiOptions::default().resolve().detector_options()
    }
}

/// Settings the landmark adapter and its model are built with.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkOptions {
    pub score_threshold: f32,
    pub max_faces: usize,
    pub refine_landmarks: bool,
    /// Detector variant used to find mesh regions. Matches the face
    /// detector so faces and meshes pair up by position.
    pub model_type: ModelType,
}

impl LandmarkOptions {
    pub fn requires_rebuild(&self, next: &LandmarkOptions) -> bool {
        self.max_faces != next.max_faces
            || self.refine_landmarks != next.refine_landmarks
            || self.model_type != next.model_type
    }
}

impl Default for LandmarkOptions {
    fn default() -> Self {
        FaceApiOptions::default().resolve().landmark_options()
    }
}
