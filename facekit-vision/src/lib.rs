pub mod api;
pub mod detector;
pub mod environment;
pub mod error;
pub mod landmarks;
pub mod media;
pub mod model;
pub mod onnx;
pub mod options;
pub mod scaling;
pub mod telemetry;
pub mod types;
pub mod video;

// Re-export commonly used types
pub use api::FaceApi;
pub use detector::FaceDetectorAdapter;
pub use environment::{Backend, Environment};
pub use error::{FaceError, FaceResult};
pub use landmarks::LandmarkDetectorAdapter;
pub use media::Media;
pub use model::ModelBackend;
pub use options::{FaceApiOptions, ModelType};
pub use types::{
    BoundingBox, Detection, DetectionResult, FaceWithLandmarks, LandmarkSet, Point2D, Point3D,
    Timing, TrackedFace,
};
pub use video::Camera;
