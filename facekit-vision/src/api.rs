//! The public entry point: one face detector and one mesh model composed
//! into `detect` and `detect_with_landmarks`.

use std::borrow::Cow;
use std::time::Instant;

use log::Level;

use crate::detector::FaceDetectorAdapter;
use crate::environment::{Backend, BackendInitializer, BackendProbe, Environment};
use crate::error::{FaceError, FaceResult};
use crate::landmarks::LandmarkDetectorAdapter;
use crate::media::Media;
use crate::model::ModelBackend;
use crate::options::{FaceApiOptions, ResolvedOptions};
use crate::scaling::{self, ImageScaler};
use crate::telemetry::{millis, timing_guard};
use crate::types::{DetectionResult, FaceWithLandmarks, LandmarkSet, Timing, TrackedFace};

/// Environment and backend, resolved once.
#[derive(Debug, Clone, Copy)]
struct Runtime {
    environment: Environment,
    backend: Backend,
    scaler: ImageScaler,
}

/// Media ready for inference plus what is needed to map results back.
struct Prepared<'a> {
    media: Cow<'a, Media>,
    scale_factor: f32,
    runtime: Runtime,
}

pub struct FaceApi {
    options: FaceApiOptions,
    resolved: ResolvedOptions,
    detector: FaceDetectorAdapter,
    landmarks: LandmarkDetectorAdapter,
    probe: Box<dyn BackendProbe>,
    runtime: Option<Runtime>,
    disposed: bool,
}

impl FaceApi {
    /// Build an instance. Models are loaded lazily on first use.
    pub fn new(options: FaceApiOptions, models: ModelBackend) -> FaceResult<Self> {
        options.validate()?;
        let resolved = options.resolve();
        Ok(Self {
            detector: FaceDetectorAdapter::new(resolved.detector_options(), models.faces),
            landmarks: LandmarkDetectorAdapter::new(resolved.landmark_options(), models.mesh),
            probe: models.probe,
            options,
            resolved,
            runtime: None,
            disposed: false,
        })
    }

    /// Persisted options, including any sticky per-call overrides.
    pub fn options(&self) -> &FaceApiOptions {
        &self.options
    }

    pub fn resolved_options(&self) -> &ResolvedOptions {
        &self.resolved
    }

    /// Environment chosen by [`initialize`](Self::initialize), if it ran.
    pub fn environment(&self) -> Option<Environment> {
        self.runtime.map(|rt| rt.environment)
    }

    pub fn backend(&self) -> Option<Backend> {
        self.runtime.map(|rt| rt.backend)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Resolve the environment and activate a backend. Runs once; later
    /// calls return the cached environment. Detect calls do this implicitly.
    pub fn initialize(&mut self) -> FaceResult<Environment> {
        self.runtime().map(|rt| rt.environment)
    }

    fn runtime(&mut self) -> FaceResult<Runtime> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        if let Some(rt) = self.runtime {
            return Ok(rt);
        }

        let environment = self.resolved.environment.unwrap_or_else(Environment::detect);
        let chain = BackendInitializer::chain_for(environment, self.resolved.runtime);
        let backend = BackendInitializer::initialize(&chain, self.probe.as_ref())?;
        log::info!("face api ready: environment={} backend={}", environment, backend);

        let rt = Runtime {
            environment,
            backend,
            scaler: ImageScaler::new(environment),
        };
        self.runtime = Some(rt);
        Ok(rt)
    }

    /// Merge `options` into the persisted configuration and hand the result
    /// to both adapters. Changing `environment` or `runtime` re-runs backend
    /// selection on the next call.
    pub fn update_options(&mut self, options: &FaceApiOptions) -> FaceResult<()> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        options.validate()?;

        let previous = self.resolved.clone();
        self.options.merge(options);
        self.resolved = self.options.resolve();

        if previous.environment != self.resolved.environment
            || previous.runtime != self.resolved.runtime
        {
            log::debug!("environment or runtime changed, resetting backend");
            self.runtime = None;
            self.detector.invalidate();
            self.landmarks.invalidate();
        }

        self.detector.update_options(self.resolved.detector_options())?;
        self.landmarks.update_options(self.resolved.landmark_options())?;
        Ok(())
    }

    /// Validation, sticky option merge, backend init and optional downscale.
    fn prepare<'a>(
        &mut self,
        media: &'a Media,
        overrides: Option<&FaceApiOptions>,
    ) -> FaceResult<Prepared<'a>> {
        if self.disposed {
            return Err(FaceError::ResourceDisposed);
        }
        media.validate()?;
        if let Some(overrides) = overrides {
            self.update_options(overrides)?;
        }
        let runtime = self.runtime()?;

        let threshold = self.resolved.downscale_width_threshold;
        if threshold > 0 && runtime.scaler.can_process(media) {
            let scaled = runtime.scaler.downscale(media, threshold)?;
            if scaled.scale_factor != 1.0 {
                return Ok(Prepared {
                    media: Cow::Owned(scaled.media),
                    scale_factor: scaled.scale_factor,
                    runtime,
                });
            }
        }

        Ok(Prepared {
            media: Cow::Borrowed(media),
            scale_factor: 1.0,
            runtime,
        })
    }

    /// Detect faces. Boxes are reported in `media`'s own pixel space even
    /// when the detector ran on a downscaled copy.
    ///
    /// `overrides` are merged into the persisted options exactly like
    /// [`update_options`](Self::update_options): they stay in effect for
    /// later calls. They are merged before the downscale decision, so a
    /// `downscale_width_threshold` override already applies to this call.
    pub fn detect(
        &mut self,
        media: &Media,
        overrides: Option<&FaceApiOptions>,
    ) -> FaceResult<DetectionResult<TrackedFace>> {
        let started = Instant::now();

        let pre = timing_guard("facekit::preprocess", Level::Debug);
        let prepared = self.prepare(media, overrides)?;
        let preprocessing = pre.finish_ms();

        let inference = timing_guard("facekit::face_inference", Level::Debug);
        let mut faces = self
            .detector
            .detect(&prepared.media, prepared.runtime.backend)?;
        let inference = inference.finish_ms();

        let post = timing_guard("facekit::postprocess", Level::Debug);
        upscale_faces(&mut faces, prepared.scale_factor);
        let postprocessing = post.finish_ms();

        Ok(DetectionResult {
            faces,
            timing: Timing {
                total: millis(started.elapsed()),
                preprocessing: Some(preprocessing),
                inference: Some(inference),
                postprocessing: Some(postprocessing),
            },
        })
    }

    /// Detect faces and attach a face mesh to each.
    ///
    /// When landmarks are capped at one face and several faces are found,
    /// only the face with the largest box is returned, and its mesh is
    /// computed on a full-resolution crop when the environment allows it.
    /// `overrides` are sticky, as for [`detect`](Self::detect).
    pub fn detect_with_landmarks(
        &mut self,
        media: &Media,
        overrides: Option<&FaceApiOptions>,
    ) -> FaceResult<DetectionResult<FaceWithLandmarks>> {
        let started = Instant::now();

        let pre = timing_guard("facekit::preprocess", Level::Debug);
        let prepared = self.prepare(media, overrides)?;
        let preprocessing = pre.finish_ms();
        let backend = prepared.runtime.backend;

        let guard = timing_guard("facekit::face_inference", Level::Debug);
        let mut faces = self.detector.detect(&prepared.media, backend)?;
        let mut inference = guard.finish_ms();

        if faces.is_empty() {
            return Ok(DetectionResult {
                faces: Vec::new(),
                timing: Timing {
                    total: millis(started.elapsed()),
                    preprocessing: Some(preprocessing),
                    inference: Some(inference),
                    postprocessing: None,
                },
            });
        }

        let guard = timing_guard("facekit::postprocess", Level::Debug);
        upscale_faces(&mut faces, prepared.scale_factor);
        let mut postprocessing = guard.finish_ms();

        let combined = if faces.len() > 1 && self.resolved.max_landmark_faces == 1 {
            let index = largest_face_index(&faces).unwrap_or(0);
            let face = faces.swap_remove(index);
            let scaler = prepared.runtime.scaler;

            let cropped = if scaler.can_process(media) {
                match scaler.crop(media, face.bbox(), 0.0) {
                    Ok(cropped) => Some(cropped),
                    Err(err) => {
                        log::debug!("cannot crop around selected face, using whole input: {}", err);
                        None
                    }
                }
            } else {
                None
            };

            let landmarks = if let Some(cropped) = cropped {
                let guard = timing_guard("facekit::mesh_inference", Level::Debug);
                let sets = self.landmarks.detect(&cropped.media, backend)?;
                inference += guard.finish_ms();

                let mut landmarks = sets.into_iter().next().unwrap_or_default();
                scaling::translate_points(
                    &mut landmarks.mesh_points,
                    cropped.offset_x as f32,
                    cropped.offset_y as f32,
                );
                landmarks
            } else {
                let guard = timing_guard("facekit::mesh_inference", Level::Debug);
                let sets = self.landmarks.detect(&prepared.media, backend)?;
                inference += guard.finish_ms();

                let mut landmarks = sets.into_iter().next().unwrap_or_default();
                scaling::upscale_points(&mut landmarks.mesh_points, prepared.scale_factor);
                landmarks
            };

            vec![FaceWithLandmarks { face, landmarks }]
        } else {
            let guard = timing_guard("facekit::mesh_inference", Level::Debug);
            let mut sets = self.landmarks.detect(&prepared.media, backend)?;
            inference += guard.finish_ms();

            let guard = timing_guard("facekit::postprocess", Level::Debug);
            for set in &mut sets {
                scaling::upscale_points(&mut set.mesh_points, prepared.scale_factor);
            }
            let paired = pair_landmarks(faces, sets);
            postprocessing += guard.finish_ms();
            paired
        };

        Ok(DetectionResult {
            faces: combined,
            timing: Timing {
                total: millis(started.elapsed()),
                preprocessing: Some(preprocessing),
                inference: Some(inference),
                postprocessing: Some(postprocessing),
            },
        })
    }

    /// Load both models and push a blank frame through each, concurrently.
    /// Failures are logged, never returned.
    pub fn warmup(&mut self) {
        if self.disposed {
            log::debug!("warmup skipped: face api disposed");
            return;
        }
        let backend = match self.runtime() {
            Ok(rt) => rt.backend,
            Err(err) => {
                log::warn!("warmup skipped: {}", err);
                return;
            }
        };

        let _guard = timing_guard("facekit::warmup", Level::Debug);
        let detector = &mut self.detector;
        let landmarks = &mut self.landmarks;
        std::thread::scope(|s| {
            let faces = s.spawn(move || detector.warmup(backend));
            let mesh = s.spawn(move || landmarks.warmup(backend));
            for (name, handle) in [("face detector", faces), ("face mesh", mesh)] {
                match handle.join() {
                    Ok(Ok(())) => log::debug!("{} warmed up", name),
                    Ok(Err(err)) => log::warn!("{} warmup failed: {}", name, err),
                    Err(_) => log::warn!("{} warmup panicked", name),
                }
            }
        });
    }

    /// Release both models. Later detect and update calls fail with
    /// [`FaceError::ResourceDisposed`]. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.detector.dispose();
        self.landmarks.dispose();
        self.runtime = None;
        self.disposed = true;
        log::debug!("face api disposed");
    }
}

impl Drop for FaceApi {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn upscale_faces(faces: &mut [TrackedFace], scale_factor: f32) {
    if scale_factor == 1.0 {
        return;
    }
    for face in faces {
        face.detection.bbox = scaling::upscale_box(&face.detection.bbox, scale_factor);
    }
}

/// Index of the face with the largest box area; the first one wins ties.
pub fn largest_face_index(faces: &[TrackedFace]) -> Option<usize> {
    faces
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, face)| {
            let area = face.bbox().area();
            match best {
                Some((_, best_area)) if best_area >= area => best,
                _ => Some((i, area)),
            }
        })
        .map(|(i, _)| i)
}

/// Pair the Nth face with the Nth landmark set. Faces without a set get an
/// empty mesh; extra sets are dropped.
pub fn pair_landmarks(faces: Vec<TrackedFace>, sets: Vec<LandmarkSet>) -> Vec<FaceWithLandmarks> {
    let mut sets = sets.into_iter();
    faces
        .into_iter()
        .map(|face| FaceWithLandmarks {
            face,
            landmarks: sets.next().unwrap_or_default(),
        })
        .collect()
}
