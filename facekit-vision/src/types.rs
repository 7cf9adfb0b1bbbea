//! Result types shared by the adapters and the [`FaceApi`](crate::FaceApi).
//!
//! Every coordinate is an `f32` pixel value with a top-left origin. Boxes and
//! points leave the orchestrator in the coordinate space of the caller's
//! original input.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

/// Mesh point. `z` is the model's unscaled depth value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Axis-aligned box: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> Point2D {
        Point2D {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    /// Finite origin and a strictly positive size.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Multiply every component by `factor` (original → downscaled space).
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Divide every component by `factor` (downscaled → original space).
    pub fn unscaled(&self, factor: f32) -> Self {
        Self::new(
            self.x / factor,
            self.y / factor,
            self.width / factor,
            self.height / factor,
        )
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let inter = (x2 - x1) * (y2 - y1);
        inter / (self.area() + other.area() - inter)
    }
}

/// One located face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub score: f32,
}

/// A detection plus the tracking id the model assigned, if tracking is on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFace {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(rename = "trackingID", skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<u32>,
}

impl TrackedFace {
    pub fn new(bbox: BoundingBox, score: f32) -> Self {
        Self {
            detection: Detection { bbox, score },
            tracking_id: None,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.detection.bbox
    }

    pub fn score(&self) -> f32 {
        self.detection.score
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkSet {
    pub mesh_points: Vec<Point3D>,
}

impl LandmarkSet {
    pub fn new(mesh_points: Vec<Point3D>) -> Self {
        Self { mesh_points }
    }

    pub fn is_empty(&self) -> bool {
        self.mesh_points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mesh_points.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceWithLandmarks {
    #[serde(flatten)]
    pub face: TrackedFace,
    pub landmarks: LandmarkSet,
}

/// Wall-clock durations of one call, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Timing {
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult<T> {
    pub faces: Vec<T>,
    pub timing: Timing,
}
