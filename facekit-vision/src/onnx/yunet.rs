//! YuNet output decoding.
//!
//! YuNet is anchor-free: for each stride (8, 16, 32) it predicts, per grid
//! cell, a class score, an objectness score, a box delta `(dx, dy, dw, dh)`
//! and five landmark deltas. Decoding maps a cell straight to image space:
//!
//! cx = (grid_x + dx) * stride / input_size
//! cy = (grid_y + dy) * stride / input_size
//! w = dw * stride / input_size
//! h = dh * stride / input_size

use anyhow::{bail, Result};
use ndarray::Array2;

const STRIDES: [usize; 3] = [8, 16, 32];

/// Native input edge of the YuNet graph.
pub const INPUT_SIZE: usize = 640;

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,...,x5,y5 (normalized [0,1])
}

/// Per-stride tensors, ordered stride 8, 16, 32.
#[derive(Debug)]
pub struct YuNetOutputs {
    pub scores: Vec<Array2<f32>>,
    pub boxes: Vec<Array2<f32>>,
    pub landmarks: Vec<Array2<f32>>,
}

fn grid_cells(input_size: usize) -> [usize; 3] {
    STRIDES.map(|stride| (input_size / stride) * (input_size / stride))
}

/// Read the three per-stride tensors starting at output `first`, checking
/// each is `[1, cells, channels]`.
fn stride_group(
    outputs: &[(&[i64], &[f32])],
    first: usize,
    channels: usize,
    label: &str,
    input_size: usize,
) -> Result<Vec<Array2<f32>>> {
    grid_cells(input_size)
        .iter()
        .enumerate()
        .map(|(i, &cells)| {
            let idx = first + i;
            let Some((shape, data)) = outputs.get(idx) else {
                bail!("missing {} output at index {}", label, idx);
            };
            if shape.len() != 3 || shape[0] != 1 || shape[2] != channels as i64 {
                bail!(
                    "unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
                    label,
                    idx,
                    shape,
                    cells,
                    channels
                );
            }
            if shape[1] as usize != cells {
                bail!(
                    "expected {} locations for {} at index {}, got {}",
                    cells,
                    label,
                    idx,
                    shape[1]
                );
            }
            Ok(Array2::from_shape_vec((cells, channels), data.to_vec())?)
        })
        .collect()
}

/// Split the 12 raw outputs (cls ×3, obj ×3, bbox ×3, kps ×3) and combine
/// class and objectness scores.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<YuNetOutputs> {
    let cls = stride_group(outputs, 0, 1, "cls", input_size)?;
    let obj = stride_group(outputs, 3, 1, "obj", input_size)?;
    let boxes = stride_group(outputs, 6, 4, "bbox", input_size)?;
    let landmarks = stride_group(outputs, 9, 10, "kps", input_size)?;

    let scores = cls.iter().zip(obj.iter()).map(|(c, o)| c * o).collect();

    Ok(YuNetOutputs {
        scores,
        boxes,
        landmarks,
    })
}

/// Decode every grid cell scoring at least `score_threshold`.
pub fn decode(
    outputs: &YuNetOutputs,
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    let mut detections = Vec::new();
    let size = input_size as f32;

    for (scale_idx, &stride) in STRIDES.iter().enumerate() {
        let scores = &outputs.scores[scale_idx];
        let boxes = &outputs.boxes[scale_idx];
        let landmarks = &outputs.landmarks[scale_idx];

        let feature_size = input_size / stride;
        if scores.shape()[0] != feature_size * feature_size {
            bail!(
                "expected {} cells for stride {}, got {}",
                feature_size * feature_size,
                stride,
                scores.shape()[0]
            );
        }

        let step = stride as f32;
        for row in 0..feature_size {
            for col in 0..feature_size {
                let idx = row * feature_size + col;
                let score = scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + boxes[[idx, 0]]) * step / size;
                let cy = (row as f32 + boxes[[idx, 1]]) * step / size;
                let w = boxes[[idx, 2]] * step / size;
                let h = boxes[[idx, 3]] * step / size;

                let mut lms = [0.0f32; 10];
                for k in 0..5 {
                    lms[k * 2] = (col as f32 + landmarks[[idx, k * 2]]) * step / size;
                    lms[k * 2 + 1] = (row as f32 + landmarks[[idx, k * 2 + 1]]) * step / size;
                }

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks: lms,
                });
            }
        }
    }

    Ok(detections)
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn apply_sigmoid(scores: &mut [Array2<f32>]) {
    for score_map in scores {
        score_map.mapv_inplace(sigmoid);
    }
}
