//! Face mesh on ONNX Runtime.
//!
//! The mesh network regresses landmarks for a single, roughly centred face,
//! so each call first proposes face regions with YuNet, then runs the mesh
//! network on a square crop around each region.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use super::detector::{detect_faces, NMS_IOU_THRESHOLD};
use super::session::load_session;
use super::yunet::sigmoid;
use crate::environment::Backend;
use crate::landmarks::{MESH_POINTS, REFINED_MESH_POINTS};
use crate::media::Media;
use crate::model::{MeshModel, RawMesh};
use crate::options::LandmarkOptions;
use crate::scaling::{crop_region, CropRegion};
use crate::types::{BoundingBox, Point3D};

/// Edge of the mesh network's square input.
pub const MESH_INPUT_SIZE: u32 = 192;

/// Region proposals are grown to a square this many times the face size.
const ROI_EXPANSION: f32 = 1.5;

pub struct OnnxFaceMesh {
    proposals: Session,
    mesh: Session,
}

impl OnnxFaceMesh {
    pub fn load(detector: &Path, mesh: &Path, backend: Backend) -> Result<Self> {
        Ok(Self {
            proposals: load_session(detector, backend).context("load mesh region model")?,
            mesh: load_session(mesh, backend).context("load mesh model")?,
        })
    }

    fn run_mesh(&mut self, crop: &DynamicImage) -> Result<(Vec<f32>, Option<f32>)> {
        let input = crop
            .resize_exact(MESH_INPUT_SIZE, MESH_INPUT_SIZE, FilterType::Triangle)
            .to_rgb8();
        let size = MESH_INPUT_SIZE as usize;
        let plane = size * size;
        let mut data = vec![0.0f32; 3 * plane];
        for (i, px) in input.as_raw().chunks_exact(3).enumerate() {
            data[i] = px[0] as f32 / 255.0;
            data[plane + i] = px[1] as f32 / 255.0;
            data[2 * plane + i] = px[2] as f32 / 255.0;
        }
        let tensor = Value::from_array(Array4::from_shape_vec((1, 3, size, size), data)?)?;

        let outputs = self.mesh.run(ort::inputs![tensor])?;
        let mut extracted: Vec<Vec<f32>> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (_shape, data) = output.try_extract_tensor::<f32>()?;
            extracted.push(data.to_vec());
        }

        let mut extracted = extracted.into_iter();
        let Some(coords) = extracted.next() else {
            bail!("mesh model produced no outputs");
        };
        let face_flag = extracted
            .next()
            .and_then(|flag| flag.first().copied())
            .map(sigmoid);
        Ok((coords, face_flag))
    }
}

/// Square region around `bbox`, grown by [`ROI_EXPANSION`] and clamped to the
/// image.
fn mesh_region(dims: (u32, u32), bbox: &BoundingBox) -> Result<CropRegion> {
    let side = bbox.width.max(bbox.height) * ROI_EXPANSION;
    let center = bbox.center();
    let square = BoundingBox::new(center.x - side / 2.0, center.y - side / 2.0, side, side);
    Ok(crop_region(dims, &square, 0.0)?)
}

/// Map `point_count` xyz triples from mesh-input space into image space.
fn project_points(coords: &[f32], point_count: usize, region: &CropRegion) -> Vec<Point3D> {
    let sx = region.width as f32 / MESH_INPUT_SIZE as f32;
    let sy = region.height as f32 / MESH_INPUT_SIZE as f32;
    coords
        .chunks_exact(3)
        .take(point_count)
        .map(|p| {
            Point3D::new(
                region.x as f32 + p[0] * sx,
                region.y as f32 + p[1] * sy,
                p[2] * sx,
            )
        })
        .collect()
}

impl MeshModel for OnnxFaceMesh {
    fn estimate_mesh(&mut self, media: &Media, options: &LandmarkOptions) -> Result<Vec<RawMesh>> {
        let img = media.to_dynamic();
        let dims = media.dimensions();
        let mut faces = detect_faces(
            &mut self.proposals,
            &img,
            options.score_threshold,
            NMS_IOU_THRESHOLD,
        )
        .context("proposing mesh regions")?;
        faces.truncate(options.max_faces);

        let point_count = if options.refine_landmarks {
            REFINED_MESH_POINTS
        } else {
            MESH_POINTS
        };

        let mut meshes = Vec::with_capacity(faces.len());
        for face in &faces {
            let region = mesh_region(dims, &face.bbox)?;
            let crop = img.crop_imm(region.x, region.y, region.width, region.height);
            let (coords, face_flag) = self.run_mesh(&crop)?;
            if coords.len() < MESH_POINTS * 3 {
                bail!(
                    "mesh output has {} values, expected at least {}",
                    coords.len(),
                    MESH_POINTS * 3
                );
            }
            if options.refine_landmarks && coords.len() < REFINED_MESH_POINTS * 3 {
                log::warn!("refined landmarks requested but the mesh model has no refinement head");
            }
            meshes.push(RawMesh {
                points: project_points(&coords, point_count, &region),
                score: face_flag,
            });
        }
        Ok(meshes)
    }
}
