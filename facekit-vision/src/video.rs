use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::media::Media;

/// V4L2 capture device producing [`Media::Frame`]s.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device).context("open camera")?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, fallback to YUYV, else accept existing format
        let desired = Format::new(fmt.width, fmt.height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        log::info!(
            "camera {} streaming {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Capture the next frame as RGB.
    pub fn frame(&mut self) -> Result<Media> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: {}x{} fourcc={:?} seq={} len={}",
            self.width,
            self.height,
            self.fourcc,
            meta.sequence,
            data.len()
        );
        let rgb = to_rgb(self.fourcc, self.width, self.height, data)?;
        Ok(Media::Frame(rgb))
    }
}

/// Convert a raw capture buffer to an RGB image.
pub fn to_rgb(fourcc: FourCC, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    let mut buf = match &fourcc.repr {
        b"RGB3" => data.to_vec(),
        b"YUYV" => yuyv_to_rgb(width, height, data)?,
        b"GREY" => grey_to_rgb(width, height, data)?,
        other => bail!("unsupported pixel format {:?}", String::from_utf8_lossy(other)),
    };

    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        bail!("buffer too small: got {}, expected {}", buf.len(), expected);
    } else if buf.len() > expected {
        log::warn!(
            "buffer larger than expected ({} > {}), truncating",
            buf.len(),
            expected
        );
        buf.truncate(expected);
    }
    RgbImage::from_raw(width, height, buf).ok_or_else(|| anyhow!("failed to build image buffer"))
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        bail!("short YUYV buffer");
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for y in [y0, y1] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        bail!("short GREY buffer");
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_yuyv_is_grey() {
        let rgb = to_rgb(FourCC::new(b"YUYV"), 2, 1, &[100, 128, 200, 128]).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn grey_expands_to_three_channels() {
        let rgb = to_rgb(FourCC::new(b"GREY"), 2, 2, &[1, 2, 3, 4]).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [4, 4, 4]);
    }

    #[test]
    fn short_and_unknown_buffers_fail() {
        assert!(to_rgb(FourCC::new(b"RGB3"), 2, 2, &[0; 5]).is_err());
        assert!(to_rgb(FourCC::new(b"MJPG"), 2, 2, &[0; 12]).is_err());
    }
}
