use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tower::Service;
use tracing::debug;

use super::predictor::FrameMasks;
use crate::error::AppError;
use crate::video::FrameSequence;

/// Object colours, assigned by the object's position within a frame and cycling.
pub const MASK_PALETTE: [[u8; 3]; 10] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
    [128, 0, 255],
    [0, 255, 128],
    [255, 128, 128],
];

/// ffmpeg image2 pattern matching `masked_frame_file_name`.
pub const MASKED_FRAME_PATTERN: &str = "masked_frame_%d.jpg";

pub fn masked_frame_file_name(index: usize) -> String {
    format!("masked_frame_{}.jpg", index)
}

pub fn palette_color(position: usize) -> [u8; 3] {
    MASK_PALETTE[position % MASK_PALETTE.len()]
}

/// Blends the coloured masks of one frame onto it.
///
/// Colours of overlapping objects are added per channel and saturate at 255 rather
/// than one object winning. Pixels covered by no mask keep their original value.
pub fn composite(frame: &RgbImage, masks: &FrameMasks, alpha: f32) -> Result<RgbImage, AppError> {
    let (width, height) = frame.dimensions();
    for (object, mask) in &masks.masks {
        if mask.dimensions() != (width, height) {
            return Err(AppError::MaskSize {
                object: object.clone(),
                frame: masks.frame_index,
                mask_width: mask.width(),
                mask_height: mask.height(),
                frame_width: width,
                frame_height: height,
            });
        }
    }

    let mut blended = frame.clone();
    for (x, y, pixel) in blended.enumerate_pixels_mut() {
        let mut overlay = [0u16; 3];
        for (position, mask) in masks.masks.values().enumerate() {
            if mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let color = palette_color(position);
            for channel in 0..3 {
                overlay[channel] += u16::from(color[channel]);
            }
        }
        let overlay = overlay.map(|value| value.min(255) as u8);
        if overlay == [0, 0, 0] {
            continue;
        }

        let Rgb(original) = *pixel;
        let mut out = [0u8; 3];
        for channel in 0..3 {
            let value = (1.0 - alpha) * f32::from(original[channel])
                + alpha * f32::from(overlay[channel]);
            out[channel] = value as u8;
        }
        *pixel = Rgb(out);
    }
    Ok(blended)
}

/// Composites each frame's masks onto the matching source frame and writes it as
/// `masked_frame_<index>.jpg` into the output directory.
#[derive(Clone)]
pub struct MaskOverlayService {
    frames: Arc<FrameSequence>,
    output_dir: PathBuf,
    alpha: f32,
    jpeg_quality: u8,
}

impl MaskOverlayService {
    pub fn new(frames: Arc<FrameSequence>, output_dir: &Path, alpha: f32, jpeg_quality: u8) -> Self {
        Self {
            frames,
            output_dir: output_dir.to_path_buf(),
            alpha,
            jpeg_quality,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render(&self, masks: &FrameMasks) -> Result<PathBuf, AppError> {
        let source = self.frames.get(masks.frame_index).ok_or_else(|| {
            AppError::Predictor(format!(
                "mask for frame {} but only {} frames exist",
                masks.frame_index,
                self.frames.len()
            ))
        })?;
        let frame = image::open(&source.path)?.to_rgb8();
        let blended = composite(&frame, masks, self.alpha)?;

        let path = self.output_dir.join(masked_frame_file_name(masks.frame_index));
        let writer = BufWriter::new(File::create(&path)?);
        blended.write_with_encoder(JpegEncoder::new_with_quality(writer, self.jpeg_quality))?;
        debug!(
            "Wrote {} ({} object mask(s))",
            path.display(),
            masks.masks.len()
        );
        Ok(path)
    }
}

impl Service<FrameMasks> for MaskOverlayService {
    type Response = PathBuf;
    type Error = AppError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), AppError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, masks: FrameMasks) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || service.render(&masks))
                .await
                .map_err(|e| AppError::Predictor(format!("overlay task failed: {}", e)))?
        })
    }
}
