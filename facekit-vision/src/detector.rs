//! Face detector adapter: lazy model lifecycle plus output normalisation.

use log::Level;

use crate::environment::Backend;
use crate::error::{FaceError, FaceResult};
use crate::media::Media;
use crate::model::{FaceModel, FaceModelLoader, ModelState, RawFace};
use crate::options::DetectorOptions;
use crate::telemetry::timing_guard;
use crate::types::TrackedFace;

/// Score given to a face with a usable box but no numeric confidence, so
/// threshold filtering does not silently drop it.
pub const FALLBACK_CONFIDENCE: f32 = 0.95;

pub type ScoreExtractor = fn(&RawFace) -> Option<f32>;

/// Score sources, tried in order.
pub const SCORE_EXTRACTORS: &[(&str, ScoreExtractor)] = &[
    ("score", direct_score),
    ("confidence", confidence_score),
    ("keypoints", keypoint_score),
];

fn direct_score(face: &RawFace) -> Option<f32> {
    face.score
}

fn confidence_score(face: &RawFace) -> Option<f32> {
    face.confidence
}

/// Mean of the keypoint confidences, when the model reports any.
fn keypoint_score(face: &RawFace) -> Option<f32> {
    let scores: Vec<f32> = face.keypoints.iter().filter_map(|k| k.score).collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f32>() / scores.len() as f32)
    }
}

/// First finite score any extractor finds, clamped to `[0, 1]`; falls back
/// to [`FALLBACK_CONFIDENCE`].
pub fn extract_score(face: &RawFace) -> f32 {
    SCORE_EXTRACTORS
        .iter()
        .find_map(|(_, extract)| extract(face).filter(|s| s.is_finite()))
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(FALLBACK_CONFIDENCE)
}

pub struct FaceDetectorAdapter {
    options: DetectorOptions,
    loader: Box<dyn FaceModelLoader>,
    model: ModelState<dyn FaceModel>,
    disposed: bool,
}

impl FaceDetectorAdapter {
    pub fn new(options: DetectorOptions, loader: Box<dyn FaceModelLoader>) -> Self {
        Self {
            options,
            loader,
            model: ModelState::Uninitialized,
            disposed: false,
        }
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_ready()
    }

    /// Apply new settings. Settings the model is built with drop the cached
    /// model; it is rebuilt on the next call.
    pub fn update_options(&mut self, options: DetectorOptions) -> FaceResult<()> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        if self.options.requires_rebuild(&options) {
            log::debug!("detector options changed, invalidating cached model");
            self.release_model();
        }
        self.options = options;
        Ok(())
    }

    /// Drop the cached model so the next call rebuilds it, e.g. after a
    /// backend change.
    pub fn invalidate(&mut self) {
        self.release_model();
    }

    fn model(&mut self, backend: Backend) -> FaceResult<&mut (dyn FaceModel + 'static)> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        let loader = &self.loader;
        let options = &self.options;
        self.model.get_or_try_init(|| {
            let _guard = timing_guard("facekit::load_detector", Level::Debug);
            loader
                .load(options, backend)
                .map_err(|source| FaceError::ModelInitializationFailed {
                    model: "face detector",
                    source,
                })
        })
    }

    pub fn detect(&mut self, media: &Media, backend: Backend) -> FaceResult<Vec<TrackedFace>> {
        let options = self.options.clone();
        let model = self.model(backend)?;
        let raw = model
            .estimate_faces(media, &options)
            .map_err(FaceError::wrap)?;
        let faces = normalize_faces(raw, &options);
        log::debug!("face detector returned {} face(s)", faces.len());
        Ok(faces)
    }

    pub fn warmup(&mut self, backend: Backend) -> FaceResult<()> {
        self.detect(&Media::blank(128, 128), backend).map(|_| ())
    }

    /// Release the model. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.release_model();
        self.disposed = true;
    }

    fn release_model(&mut self) {
        if let Some(mut model) = self.model.take() {
            model.dispose();
        }
    }
}

/// Turn raw model output into scored, filtered, capped faces.
pub fn normalize_faces(raw: Vec<RawFace>, options: &DetectorOptions) -> Vec<TrackedFace> {
    raw.into_iter()
        .filter_map(|face| {
            let bbox = face.bbox.filter(|b| b.is_valid())?;
            let mut tracked = TrackedFace::new(bbox, extract_score(&face));
            if options.enable_tracking {
                tracked.tracking_id = face.tracking_id;
            }
            Some(tracked)
        })
        .filter(|face| face.score() >= options.score_threshold)
        .take(options.max_faces)
        .collect()
}
