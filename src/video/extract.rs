use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::frames::{FrameSequence, FRAME_PATTERN};
use super::probe::{fps_options, probe_frame_rate};
use super::tool::ExternalTool;
use crate::config::{ExtractionSettings, Settings};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub video: PathBuf,
    pub output_dir: PathBuf,
    pub fps: u32,
}

/// Splits a source video into numbered JPEG stills at a chosen sampling rate.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg: ExternalTool,
    ffprobe: ExternalTool,
    settings: ExtractionSettings,
}

impl FrameExtractor {
    pub fn new(ffmpeg: ExternalTool, ffprobe: ExternalTool, settings: ExtractionSettings) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            settings,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ExternalTool::new(&settings.tools.ffmpeg),
            ExternalTool::new(&settings.tools.ffprobe),
            settings.extraction.clone(),
        )
    }

    pub async fn probe_fps(&self, video: &Path, cancel: &CancellationToken) -> Result<f64, AppError> {
        probe_frame_rate(&self.ffprobe, video, cancel).await
    }

    /// Detects the source rate and lists the rates the user may pick, highest first.
    pub async fn fps_choices(
        &self,
        video: &Path,
        cancel: &CancellationToken,
    ) -> Result<(f64, Vec<u32>), AppError> {
        let source_fps = self.probe_fps(video, cancel).await?;
        Ok((source_fps, fps_options(source_fps)))
    }

    pub fn extract_args(&self, request: &ExtractionRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.settings.overwrite {
            args.push("-y".into());
        }
        args.push("-i".into());
        args.push(request.video.clone().into());
        args.push("-vf".into());
        args.push(format!("fps={}", request.fps).into());
        args.push("-q:v".into());
        args.push(self.settings.jpeg_quality.to_string().into());
        args.push("-start_number".into());
        args.push(self.settings.start_number.to_string().into());
        args.push(request.output_dir.join(FRAME_PATTERN).into());
        args
    }

    /// Runs the extraction and returns the frames now present in the output directory.
    /// Frames written before a failure or cancellation are left in place.
    pub async fn extract(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<FrameSequence, AppError> {
        if request.fps == 0 {
            return Err(AppError::MissingInput("Output FPS"));
        }
        if !request.video.is_file() {
            return Err(AppError::MissingInput("Video file"));
        }
        if !request.output_dir.is_dir() {
            return Err(AppError::MissingInput("Output folder"));
        }

        info!(
            "Extracting frames from {} into {} at {} fps",
            request.video.display(),
            request.output_dir.display(),
            request.fps
        );
        self.ffmpeg.run(self.extract_args(request), cancel).await?;

        let frames = FrameSequence::scan_non_empty(&request.output_dir)?;
        info!("Frames extracted successfully: {} frame(s)", frames.len());
        Ok(frames)
    }
}

/// Makes sure the destination folder exists. A missing folder is created only when
/// `confirm` agrees; returns false when the user declines.
pub fn prepare_output_dir<F>(dir: &Path, confirm: F) -> Result<bool, AppError>
where
    F: FnOnce(&Path) -> bool,
{
    if dir.is_dir() {
        return Ok(true);
    }
    if !confirm(dir) {
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    info!("Created output folder {}", dir.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frames::frame_file_name;

    fn extractor(ffmpeg: ExternalTool) -> FrameExtractor {
        FrameExtractor::new(ffmpeg, ExternalTool::new("ffprobe"), ExtractionSettings::default())
    }

    #[test]
    fn builds_sampling_command() {
        let request = ExtractionRequest {
            video: PathBuf::from("/data/weld.mp4"),
            output_dir: PathBuf::from("/data/frames"),
            fps: 10,
        };
        let args: Vec<String> = extractor(ExternalTool::new("ffmpeg"))
            .extract_args(&request)
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/data/weld.mp4",
                "-vf",
                "fps=10",
                "-q:v",
                "2",
                "-start_number",
                "0",
                "/data/frames/%05d.jpg",
            ]
        );
    }

    #[test]
    fn output_dir_created_only_after_confirmation() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("frames").join("run1");

        assert!(!prepare_output_dir(&target, |_| false).unwrap());
        assert!(!target.exists());

        assert!(prepare_output_dir(&target, |_| true).unwrap());
        assert!(target.is_dir());

        assert!(prepare_output_dir(&target, |_| panic!("already exists")).unwrap());
    }

    #[tokio::test]
    async fn missing_inputs_stop_before_running_ffmpeg() {
        let root = tempfile::tempdir().unwrap();
        let request = ExtractionRequest {
            video: root.path().join("missing.mp4"),
            output_dir: root.path().to_path_buf(),
            fps: 5,
        };
        let err = extractor(ExternalTool::new("/no/such/ffmpeg"))
            .extract(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingInput("Video file")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn same_rate_extraction_yields_contiguous_frames() {
        let root = tempfile::tempdir().unwrap();
        let video = root.path().join("weld.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let frames_dir = root.path().join("frames");
        std::fs::create_dir(&frames_dir).unwrap();

        // Stands in for ffmpeg: writes one file per source frame into the output pattern's folder.
        let script = format!(
            "for i in 0 1 2 3; do : > \"{}/0000$i.jpg\"; done",
            frames_dir.display()
        );
        let ffmpeg = ExternalTool::new("sh").with_leading_args(["-c".to_string(), script, "ffmpeg".to_string()]);

        let request = ExtractionRequest {
            video,
            output_dir: frames_dir.clone(),
            fps: 4,
        };
        let frames = extractor(ffmpeg)
            .extract(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(frames.len(), 4);
        assert!(frames.gaps().is_empty());
        assert_eq!(frames.frames()[3].path, frames_dir.join(frame_file_name(3)));
    }
}
