//! Host environment detection and compute backend selection.
//!
//! An [`Environment`] is resolved once per [`FaceApi`](crate::FaceApi) and
//! answers the two capability questions the orchestrator asks: which backends
//! to try, in order, and whether in-process image operations are available.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{FaceError, FaceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Browser,
    Node,
    ReactNative,
}

impl Environment {
    /// Inspect the compile target.
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Environment::Browser
        } else if cfg!(any(target_os = "android", target_os = "ios")) {
            Environment::ReactNative
        } else {
            Environment::Node
        }
    }

    /// Backends to try, most preferred first. Always ends with [`Backend::Cpu`].
    pub fn backend_chain(&self) -> Vec<Backend> {
        match self {
            Environment::Browser | Environment::ReactNative => {
                vec![Backend::Accelerated, Backend::Cpu]
            }
            Environment::Node => vec![Backend::Native, Backend::Cpu],
        }
    }

    /// Whether downscaling and cropping can run in-process.
    pub fn supports_graphics(&self) -> bool {
        match self {
            Environment::Browser | Environment::Node => true,
            Environment::ReactNative => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Browser => "browser",
            Environment::Node => "node",
            Environment::ReactNative => "react-native",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = FaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "browser" => Ok(Environment::Browser),
            "node" => Ok(Environment::Node),
            "react-native" => Ok(Environment::ReactNative),
            other => Err(FaceError::InvalidOptions(format!(
                "unknown environment `{}`",
                other
            ))),
        }
    }
}

/// Compute path the models execute on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// GPU execution provider.
    Accelerated,
    /// Platform-native accelerated runtime.
    Native,
    Cpu,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Accelerated => "accelerated",
            Backend::Native => "native",
            Backend::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = FaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accelerated" => Ok(Backend::Accelerated),
            "native" => Ok(Backend::Native),
            "cpu" => Ok(Backend::Cpu),
            other => Err(FaceError::InvalidOptions(format!(
                "unknown runtime `{}`",
                other
            ))),
        }
    }
}

/// Activates a backend for the model runtime.
pub trait BackendProbe: Send + Sync {
    fn activate(&self, backend: Backend) -> anyhow::Result<()>;
}

/// Probe that accepts every backend. Useful for model bindings that pick
/// their execution path on their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl BackendProbe for AcceptAll {
    fn activate(&self, _backend: Backend) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Walks a backend chain until one activates.
pub struct BackendInitializer;

impl BackendInitializer {
    /// Chain for `environment`, with `runtime` moved to the front when set.
    pub fn chain_for(environment: Environment, runtime: Option<Backend>) -> Vec<Backend> {
        let mut chain = environment.backend_chain();
        if let Some(preferred) = runtime {
            chain.retain(|b| *b != preferred);
            chain.insert(0, preferred);
        }
        if !chain.contains(&Backend::Cpu) {
            chain.push(Backend::Cpu);
        }
        chain
    }

    pub fn initialize(chain: &[Backend], probe: &dyn BackendProbe) -> FaceResult<Backend> {
        let mut last_error = None;
        for &backend in chain {
            match probe.activate(backend) {
                Ok(()) => {
                    log::debug!("activated {} backend", backend);
                    return Ok(backend);
                }
                Err(source) => {
                    let unavailable = FaceError::BackendUnavailable { backend, source };
                    log::warn!("{}, falling back", error_chain(&unavailable));
                    last_error = Some(unavailable);
                }
            }
        }

        let source = match last_error {
            Some(err) => anyhow::Error::new(err),
            None => anyhow!("backend chain is empty"),
        };
        Err(FaceError::ModelInitializationFailed {
            model: "backend",
            source,
        })
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
