use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use super::session::load_session;
use super::tracker::IouTracker;
use super::yunet;
use crate::environment::Backend;
use crate::media::Media;
use crate::model::{FaceModel, RawFace, RawKeypoint};
use crate::options::DetectorOptions;
use crate::types::BoundingBox;

/// Overlap above which the weaker of two boxes is suppressed.
pub const NMS_IOU_THRESHOLD: f32 = 0.3;

/// YuNet face, in the pixel space of the image it ran on.
#[derive(Debug, Clone)]
pub struct YuNetFace {
    pub bbox: BoundingBox,
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

/// Square-pad `img` onto a 640×640 canvas and pack it as a BGR CHW tensor.
/// Returns the tensor with the scale and padding applied.
fn letterbox(img: &DynamicImage) -> Result<(Array4<f32>, f32, f32, f32)> {
    let target_size = yunet::INPUT_SIZE as u32;
    let (orig_width, orig_height) = img.dimensions();

    let max_dim = orig_width.max(orig_height);
    let scale = target_size as f32 / max_dim as f32;
    let new_width = ((orig_width as f32 * scale) as u32).max(1);
    let new_height = ((orig_height as f32 * scale) as u32).max(1);

    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(target_size, target_size);
    let offset_x = (target_size - new_width) / 2;
    let offset_y = (target_size - new_height) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    let canvas = canvas.to_rgb8();
    let pixel_count = (target_size * target_size) as usize;
    let mut input_data = vec![0.0f32; 3 * pixel_count];
    let (b_channel, rest) = input_data.split_at_mut(pixel_count);
    let (g_channel, r_channel) = rest.split_at_mut(pixel_count);
    for (i, px) in canvas.as_raw().chunks_exact(3).enumerate() {
        r_channel[i] = px[0] as f32;
        g_channel[i] = px[1] as f32;
        b_channel[i] = px[2] as f32;
    }

    let tensor = Array4::from_shape_vec(
        (1, 3, target_size as usize, target_size as usize),
        input_data,
    )?;
    Ok((tensor, scale, offset_x as f32, offset_y as f32))
}

/// Run YuNet on `img` and return faces in `img` pixel space, strongest first.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<YuNetFace>> {
    let target_size = yunet::INPUT_SIZE as f32;
    let (input, scale, offset_x, offset_y) = letterbox(img)?;
    let input_tensor = Value::from_array(input)?;

    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        output_data.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let output_refs: Vec<(&[i64], &[f32])> = output_data
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let mut parsed = yunet::parse_outputs(&output_refs, yunet::INPUT_SIZE)?;
    yunet::apply_sigmoid(&mut parsed.scores);
    let raw = yunet::decode(&parsed, score_threshold, yunet::INPUT_SIZE)?;

    // Normalized canvas coordinates → canvas pixels → original pixels.
    let unletterbox_x = |v: f32| (v * target_size - offset_x) / scale;
    let unletterbox_y = |v: f32| (v * target_size - offset_y) / scale;

    let faces: Vec<YuNetFace> = raw
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for i in 0..5 {
                landmarks[i * 2] = unletterbox_x(d.landmarks[i * 2]);
                landmarks[i * 2 + 1] = unletterbox_y(d.landmarks[i * 2 + 1]);
            }
            YuNetFace {
                bbox: BoundingBox::new(
                    unletterbox_x(d.bbox[0]),
                    unletterbox_y(d.bbox[1]),
                    d.bbox[2] * target_size / scale,
                    d.bbox[3] * target_size / scale,
                ),
                score: d.score,
                landmarks,
            }
        })
        .collect();

    Ok(nms(&faces, nms_threshold))
}

/// Non-maximum suppression. Output is sorted by descending score.
pub fn nms(faces: &[YuNetFace], iou_threshold: f32) -> Vec<YuNetFace> {
    let mut sorted = faces.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<YuNetFace> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

/// YuNet behind the [`FaceModel`] seam.
pub struct OnnxFaceDetector {
    session: Session,
    tracker: Option<IouTracker>,
}

impl OnnxFaceDetector {
    pub fn load(path: &Path, backend: Backend, enable_tracking: bool) -> Result<Self> {
        let session = load_session(path, backend).context("load detector model")?;
        Ok(Self {
            session,
            tracker: enable_tracking.then(|| IouTracker::new(NMS_IOU_THRESHOLD)),
        })
    }
}

impl FaceModel for OnnxFaceDetector {
    fn estimate_faces(
        &mut self,
        media: &Media,
        options: &DetectorOptions,
    ) -> Result<Vec<RawFace>> {
        let img = media.to_dynamic();
        let mut faces = detect_faces(
            &mut self.session,
            &img,
            options.score_threshold,
            NMS_IOU_THRESHOLD,
        )
        .context("detecting faces")?;
        faces.truncate(options.max_faces);

        let ids = match self.tracker.as_mut() {
            Some(tracker) => {
                let boxes: Vec<BoundingBox> = faces.iter().map(|f| f.bbox).collect();
                tracker.assign(&boxes).into_iter().map(Some).collect()
            }
            None => vec![None; faces.len()],
        };

        Ok(faces
            .into_iter()
            .zip(ids)
            .map(|(face, tracking_id)| RawFace {
                bbox: Some(face.bbox),
                score: Some(face.score),
                confidence: None,
                keypoints: face
                    .landmarks
                    .chunks_exact(2)
                    .map(|p| RawKeypoint {
                        x: p[0],
                        y: p[1],
                        score: None,
                    })
                    .collect(),
                tracking_id,
            })
            .collect())
    }

    fn dispose(&mut self) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.reset();
        }
    }
}
