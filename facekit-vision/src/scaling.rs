//! Downscaling, cropping, and the coordinate mapping between the two.

use image::imageops::{self, FilterType};

use crate::environment::Environment;
use crate::error::{FaceError, FaceResult};
use crate::media::Media;
use crate::types::{BoundingBox, Point3D};

/// Output of [`ImageScaler::downscale`].
#[derive(Debug, Clone)]
pub struct Scaled {
    pub media: Media,
    /// `scaled width / original width`, in `(0, 1]`.
    pub scale_factor: f32,
}

/// Output of [`ImageScaler::crop`]. Add the offset to crop-local coordinates
/// to get image coordinates.
#[derive(Debug, Clone)]
pub struct Cropped {
    pub media: Media,
    pub offset_x: u32,
    pub offset_y: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageScaler {
    environment: Environment,
}

impl ImageScaler {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Whether `media` can go through [`downscale`](Self::downscale) and
    /// [`crop`](Self::crop) here.
    pub fn can_process(&self, media: &Media) -> bool {
        self.environment.supports_graphics() && media.is_graphics_compatible()
    }

    fn check(&self, op: &'static str, media: &Media) -> FaceResult<()> {
        if !self.environment.supports_graphics() {
            return Err(FaceError::EnvironmentUnsupported(op));
        }
        if !media.is_graphics_compatible() {
            return Err(FaceError::InvalidInput(format!(
                "{} input cannot be passed to {}",
                media.kind(),
                op
            )));
        }
        Ok(())
    }

    /// Resample `media` to `target_width`, keeping the aspect ratio. Never
    /// upsamples: inputs at or below the target (or a target of 0) come back
    /// as a same-size copy with a factor of 1.
    pub fn downscale(&self, media: &Media, target_width: u32) -> FaceResult<Scaled> {
        self.check("downscale", media)?;

        let (width, height) = media.dimensions();
        if target_width == 0 || width <= target_width {
            return Ok(Scaled {
                media: media.clone(),
                scale_factor: 1.0,
            });
        }

        let scale_factor = target_width as f32 / width as f32;
        let target_height = ((height as f32 * scale_factor).round() as u32).max(1);
        log::debug!(
            "downscaling {}x{} to {}x{} (factor {:.4})",
            width,
            height,
            target_width,
            target_height,
            scale_factor
        );

        let media = match media {
            Media::Image(img) => {
                Media::Image(img.resize_exact(target_width, target_height, FilterType::Triangle))
            }
            Media::Frame(frame) => Media::Frame(imageops::resize(
                frame,
                target_width,
                target_height,
                FilterType::Triangle,
            )),
            Media::Tensor(_) => unreachable!("tensor rejected by check"),
        };

        Ok(Scaled {
            media,
            scale_factor,
        })
    }

    /// Cut out `bbox` grown by `margin` (a fraction of the box size) on every
    /// side, clamped to the image.
    pub fn crop(&self, media: &Media, bbox: &BoundingBox, margin: f32) -> FaceResult<Cropped> {
        self.check("crop", media)?;
        let region = crop_region(media.dimensions(), bbox, margin)?;

        let cropped = match media {
            Media::Image(img) => {
                Media::Image(img.crop_imm(region.x, region.y, region.width, region.height))
            }
            Media::Frame(frame) => Media::Frame(
                imageops::crop_imm(frame, region.x, region.y, region.width, region.height)
                    .to_image(),
            ),
            Media::Tensor(_) => unreachable!("tensor rejected by check"),
        };

        Ok(Cropped {
            media: cropped,
            offset_x: region.x,
            offset_y: region.y,
        })
    }
}

/// Pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Whole-pixel region covering `bbox` plus margin, rounded outwards and
/// clamped to `(width, height)`.
pub fn crop_region(
    (width, height): (u32, u32),
    bbox: &BoundingBox,
    margin: f32,
) -> FaceResult<CropRegion> {
    if !bbox.is_valid() || !margin.is_finite() || margin < 0.0 {
        return Err(FaceError::InvalidInput(format!(
            "cannot crop around {:?} with margin {}",
            bbox, margin
        )));
    }

    let grow_x = bbox.width * margin;
    let grow_y = bbox.height * margin;
    let left = (bbox.x - grow_x).floor().max(0.0);
    let top = (bbox.y - grow_y).floor().max(0.0);
    let right = (bbox.x + bbox.width + grow_x).ceil().min(width as f32);
    let bottom = (bbox.y + bbox.height + grow_y).ceil().min(height as f32);

    if right <= left || bottom <= top {
        return Err(FaceError::InvalidInput(format!(
            "crop box {:?} lies outside the {}x{} image",
            bbox, width, height
        )));
    }

    Ok(CropRegion {
        x: left as u32,
        y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

/// Map a box from downscaled space back to original space.
pub fn upscale_box(bbox: &BoundingBox, scale_factor: f32) -> BoundingBox {
    if scale_factor == 1.0 {
        *bbox
    } else {
        bbox.unscaled(scale_factor)
    }
}

/// Map mesh points from downscaled space back to original space. `z` is
/// left alone.
pub fn upscale_points(points: &mut [Point3D], scale_factor: f32) {
    if scale_factor == 1.0 {
        return;
    }
    for p in points {
        p.x /= scale_factor;
        p.y /= scale_factor;
    }
}

/// Shift crop-local mesh points into image space. `z` is left alone.
pub fn translate_points(points: &mut [Point3D], offset_x: f32, offset_y: f32) {
    for p in points {
        p.x += offset_x;
        p.y += offset_y;
    }
}
