//! Face mesh adapter. Mirrors [`FaceDetectorAdapter`](crate::FaceDetectorAdapter)
//! for the landmark model.

use log::Level;

use crate::environment::Backend;
use crate::error::{FaceError, FaceResult};
use crate::media::Media;
use crate::model::{MeshModel, MeshModelLoader, ModelState, RawMesh};
use crate::options::LandmarkOptions;
use crate::telemetry::timing_guard;
use crate::types::LandmarkSet;

/// Mesh points per face without refinement.
pub const MESH_POINTS: usize = 468;
/// Mesh points per face with refined eye and lip landmarks.
pub const REFINED_MESH_POINTS: usize = 478;

pub struct LandmarkDetectorAdapter {
    options: LandmarkOptions,
    loader: Box<dyn MeshModelLoader>,
    model: ModelState<dyn MeshModel>,
    disposed: bool,
}

impl LandmarkDetectorAdapter {
    pub fn new(options: LandmarkOptions, loader: Box<dyn MeshModelLoader>) -> Self {
        Self {
            options,
            loader,
            model: ModelState::Uninitialized,
            disposed: false,
        }
    }

    pub fn options(&self) -> &LandmarkOptions {
        &self.options
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_ready()
    }

    pub fn update_options(&mut self, options: LandmarkOptions) -> FaceResult<()> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        if self.options.requires_rebuild(&options) {
            log::debug!("landmark options changed, invalidating cached model");
            self.release_model();
        }
        self.options = options;
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.release_model();
    }

    fn model(&mut self, backend: Backend) -> FaceResult<&mut (dyn MeshModel + 'static)> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        let loader = &self.loader;
        let options = &self.options;
        self.model.get_or_try_init(|| {
            let _guard = timing_guard("facekit::load_mesh", Level::Debug);
            loader
                .load(options, backend)
                .map_err(|source| FaceError::ModelInitializationFailed {
                    model: "face mesh",
                    source,
                })
        })
    }

    /// One landmark set per face the mesh model finds, in model order.
    pub fn detect(&mut self, media: &Media, backend: Backend) -> FaceResult<Vec<LandmarkSet>> {
        let options = self.options.clone();
        let model = self.model(backend)?;
        let raw = model
            .estimate_mesh(media, &options)
            .map_err(FaceError::wrap)?;
        let sets = normalize_meshes(raw, &options);
        log::debug!("mesh model returned {} landmark set(s)", sets.len());
        Ok(sets)
    }

    pub fn warmup(&mut self, backend: Backend) -> FaceResult<()> {
        self.detect(&Media::blank(128, 128), backend).map(|_| ())
    }

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

/// Meshes the model scores below `score_threshold` come back empty rather
/// than removed, so the Nth set still belongs to the Nth face.
pub fn normalize_meshes(raw: Vec<RawMesh>, options: &LandmarkOptions) -> Vec<LandmarkSet> {
    raw.into_iter()
        .take(options.max_faces)
        .map(|mesh| match mesh.score {
            Some(score) if score < options.score_threshold => {
                log::debug!("discarding mesh scored {:.3}", score);
                LandmarkSet::default()
            }
            _ => LandmarkSet::new(mesh.points.into_iter().filter(|p| p.is_finite()).collect()),
        })
        .collect()
}
