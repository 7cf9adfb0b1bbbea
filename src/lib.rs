pub mod config;

// Re-export vision types for convenience
pub use facekit_vision::{
    onnx, video, BoundingBox, DetectionResult, FaceApi, FaceApiOptions, FaceError,
    FaceWithLandmarks, Media, TrackedFace,
};
