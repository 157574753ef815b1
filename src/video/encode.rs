use std::ffi::OsString;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::tool::ExternalTool;
use crate::config::{EncodingSettings, Settings};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub frames_dir: PathBuf,
    /// ffmpeg image2 pattern inside `frames_dir`, e.g. `masked_frame_%d.jpg`
    pub pattern: String,
    pub output: PathBuf,
    pub fps: u32,
}

/// Assembles a numbered still sequence back into an H.264 MP4.
#[derive(Debug, Clone)]
pub struct VideoEncoder {
    ffmpeg: ExternalTool,
    settings: EncodingSettings,
}

impl VideoEncoder {
    pub fn new(ffmpeg: ExternalTool, settings: EncodingSettings) -> Self {
        Self { ffmpeg, settings }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ExternalTool::new(&settings.tools.ffmpeg),
            settings.encoding.clone(),
        )
    }

    pub fn encode_args(&self, request: &EncodeRequest) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-framerate".into(),
            request.fps.to_string().into(),
            "-i".into(),
            request.frames_dir.join(&request.pattern).into(),
            "-c:v".into(),
            self.settings.codec.clone().into(),
            "-pix_fmt".into(),
            self.settings.pixel_format.clone().into(),
            "-crf".into(),
            self.settings.crf.to_string().into(),
            request.output.clone().into(),
        ]
    }

    pub async fn encode(
        &self,
        request: &EncodeRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AppError> {
        if request.fps == 0 {
            return Err(AppError::MissingInput("Output FPS"));
        }
        if !request.frames_dir.is_dir() {
            return Err(AppError::MissingInput("Masked frames directory"));
        }

        info!(
            "Encoding {} at {} fps into {}",
            request.frames_dir.join(&request.pattern).display(),
            request.fps,
            request.output.display()
        );
        self.ffmpeg.run(self.encode_args(request), cancel).await?;
        info!("Video created successfully: {}", request.output.display());
        Ok(request.output.clone())
    }
}
