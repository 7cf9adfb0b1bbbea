use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array3;

use crate::error::{FaceError, FaceResult};

/// Input accepted by [`FaceApi`](crate::FaceApi) and the model adapters.
#[derive(Debug, Clone)]
pub enum Media {
    /// Decoded still image.
    Image(DynamicImage),
    /// Video frame, e.g. from [`Camera::frame`](crate::video::Camera::frame).
    Frame(RgbImage),
    /// Raw `[height, width, 3]` pixel tensor handed to the model untouched.
    Tensor(Array3<u8>),
}

impl Media {
    /// Black RGB frame used for warmup runs.
    pub fn blank(width: u32, height: u32) -> Self {
        Media::Frame(RgbImage::new(width, height))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Media::Image(img) => img.dimensions(),
            Media::Frame(frame) => frame.dimensions(),
            Media::Tensor(t) => {
                let (h, w, _) = t.dim();
                (w as u32, h as u32)
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    /// Whether scaling and cropping can operate on this media.
    pub fn is_graphics_compatible(&self) -> bool {
        matches!(self, Media::Image(_) | Media::Frame(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Media::Image(_) => "image",
            Media::Frame(_) => "frame",
            Media::Tensor(_) => "tensor",
        }
    }

    /// Reject media no model can consume.
    pub fn validate(&self) -> FaceResult<()> {
        if let Media::Tensor(t) = self {
            let (_, _, channels) = t.dim();
            if channels != 3 {
                return Err(FaceError::InvalidInput(format!(
                    "tensor input must have 3 channels, got {}",
                    channels
                )));
            }
        }
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(FaceError::InvalidInput(format!(
                "{} input has zero dimensions ({}x{})",
                self.kind(),
                width,
                height
            )));
        }
        Ok(())
    }

    /// RGB8 view of the pixels, converting when needed.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            Media::Image(img) => img.to_rgb8(),
            Media::Frame(frame) => frame.clone(),
            Media::Tensor(t) => {
                let (h, w, _) = t.dim();
                RgbImage::from_fn(w as u32, h as u32, |x, y| {
                    let (x, y) = (x as usize, y as usize);
                    image::Rgb([t[[y, x, 0]], t[[y, x, 1]], t[[y, x, 2]]])
                })
            }
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Media::Image(img) => img.clone(),
            other => DynamicImage::ImageRgb8(other.to_rgb()),
        }
    }
}

impl From<DynamicImage> for Media {
    fn from(img: DynamicImage) -> Self {
        Media::Image(img)
    }
}

impl From<RgbImage> for Media {
    fn from(frame: RgbImage) -> Self {
        Media::Frame(frame)
    }
}

impl From<Array3<u8>> for Media {
    fn from(tensor: Array3<u8>) -> Self {
        Media::Tensor(tensor)
    }
}
