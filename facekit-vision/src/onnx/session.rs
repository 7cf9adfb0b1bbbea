use std::path::Path;

use anyhow::{bail, Context, Result};
#[cfg(any(feature = "cuda", feature = "openvino"))]
use ort::ep::{self, ExecutionProvider};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};

use crate::environment::{Backend, BackendProbe};

/// Session builder with the execution provider for `backend` registered.
pub fn session_builder(backend: Backend) -> Result<SessionBuilder> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(ort::Error::<()>::from)?;

    match backend {
        Backend::Accelerated => register_cuda(&mut builder)?,
        Backend::Native => register_openvino(&mut builder)?,
        Backend::Cpu => {}
    }

    Ok(builder)
}

pub fn load_session(path: &Path, backend: Backend) -> Result<Session> {
    session_builder(backend)?
        .commit_from_file(path)
        .with_context(|| format!("load model {}", path.display()))
}

#[cfg(feature = "cuda")]
fn register_cuda(builder: &mut SessionBuilder) -> Result<()> {
    let ep = ep::CUDA::default();
    if !ep.is_available()? {
        bail!("cuda feature is enabled, onnx runtime not compiled with cuda");
    }
    ep.register(builder)?;
    Ok(())
}

#[cfg(not(feature = "cuda"))]
fn register_cuda(_builder: &mut SessionBuilder) -> Result<()> {
    bail!("built without the cuda feature")
}

#[cfg(feature = "openvino")]
fn register_openvino(builder: &mut SessionBuilder) -> Result<()> {
    let ep = ep::OpenVINO::default();
    if !ep.is_available()? {
        bail!("openvino feature is enabled, onnx runtime not compiled with openvino");
    }
    ep.register(builder)?;
    Ok(())
}

#[cfg(not(feature = "openvino"))]
fn register_openvino(_builder: &mut SessionBuilder) -> Result<()> {
    bail!("built without the openvino feature")
}

/// Checks backends against the execution providers compiled into ONNX
/// Runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtBackendProbe;

impl BackendProbe for OrtBackendProbe {
    fn activate(&self, backend: Backend) -> Result<()> {
        session_builder(backend).map(|_| ())
    }
}
