//! Scripted models that record how the api drives them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use facekit_vision::environment::{AcceptAll, Backend};
use facekit_vision::model::{
    FaceModel, FaceModelLoader, MeshModel, MeshModelLoader, ModelBackend, RawFace, RawMesh,
};
use facekit_vision::options::{DetectorOptions, LandmarkOptions};
use facekit_vision::{BoundingBox, FaceApi, FaceApiOptions, Media, Point3D};

/// Counters shared between a fake loader, its models and the test.
#[derive(Clone, Default)]
pub struct Calls {
    loads: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    disposals: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl Calls {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Dimensions of every media a model was run on, in call order.
    pub fn inputs(&self) -> Vec<(u32, u32)> {
        self.inputs.lock().unwrap().clone()
    }

    fn record_run(&self, media: &Media) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(media.dimensions());
    }
}

#[derive(Clone, Default)]
pub struct FaceScript {
    pub faces: Vec<RawFace>,
    /// Loads that fail before one succeeds.
    pub failing_loads: usize,
    pub inference_error: Option<&'static str>,
}

#[derive(Clone, Default)]
pub struct MeshScript {
    pub meshes: Vec<RawMesh>,
    pub failing_loads: usize,
}

struct FakeFaceLoader {
    script: FaceScript,
    calls: Calls,
}

struct FakeFaceModel {
    script: FaceScript,
    calls: Calls,
}

impl FaceModelLoader for FakeFaceLoader {
    fn load(&self, _options: &DetectorOptions, _backend: Backend) -> Result<Box<dyn FaceModel>> {
        let attempt = self.calls.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.script.failing_loads {
            bail!("face model file missing");
        }
        Ok(Box::new(FakeFaceModel {
            script: self.script.clone(),
            calls: self.calls.clone(),
        }))
    }
}

impl FaceModel for FakeFaceModel {
    fn estimate_faces(&mut self, media: &Media, _options: &DetectorOptions) -> Result<Vec<RawFace>> {
        self.calls.record_run(media);
        if let Some(message) = self.script.inference_error {
            bail!(message);
        }
        Ok(self.script.faces.clone())
    }

    fn dispose(&mut self) {
        self.calls.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeMeshLoader {
    script: MeshScript,
    calls: Calls,
}

struct FakeMeshModel {
    script: MeshScript,
    calls: Calls,
}

impl MeshModelLoader for FakeMeshLoader {
    fn load(&self, _options: &LandmarkOptions, _backend: Backend) -> Result<Box<dyn MeshModel>> {
        let attempt = self.calls.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.script.failing_loads {
            bail!("mesh model file missing");
        }
        Ok(Box::new(FakeMeshModel {
            script: self.script.clone(),
            calls: self.calls.clone(),
        }))
    }
}

impl MeshModel for FakeMeshModel {
    fn estimate_mesh(&mut self, media: &Media, _options: &LandmarkOptions) -> Result<Vec<RawMesh>> {
        self.calls.record_run(media);
        Ok(self.script.meshes.clone())
    }

    fn dispose(&mut self) {
        self.calls.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub faces: Calls,
    pub mesh: Calls,
}

pub fn fake_backend(faces: FaceScript, mesh: MeshScript) -> (ModelBackend, Harness) {
    let harness = Harness {
        faces: Calls::default(),
        mesh: Calls::default(),
    };
    let backend = ModelBackend::new(
        FakeFaceLoader {
            script: faces,
            calls: harness.faces.clone(),
        },
        FakeMeshLoader {
            script: mesh,
            calls: harness.mesh.clone(),
        },
        AcceptAll,
    );
    (backend, harness)
}

/// Api over scripted models, pinned to the in-process environment.
pub fn fake_api(
    options: FaceApiOptions,
    faces: FaceScript,
    mesh: MeshScript,
) -> (FaceApi, Harness) {
    let (backend, harness) = fake_backend(faces, mesh);
    let api = FaceApi::new(options, backend).unwrap();
    (api, harness)
}

pub fn face(x: f32, y: f32, width: f32, height: f32, score: f32) -> RawFace {
    RawFace::scored(BoundingBox::new(x, y, width, height), score)
}

/// Mesh with a single point.
pub fn mesh_at(x: f32, y: f32) -> RawMesh {
    RawMesh::new(vec![Point3D::new(x, y, 0.0)])
}

pub fn image(width: u32, height: u32) -> Media {
    Media::blank(width, height)
}
