use std::ffi::OsStr;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::tool::ExternalTool;
use crate::error::AppError;

/// Reads the average frame rate of the first video stream with ffprobe.
pub async fn probe_frame_rate(
    ffprobe: &ExternalTool,
    video: &Path,
    cancel: &CancellationToken,
) -> Result<f64, AppError> {
    let args: [&OsStr; 9] = [
        OsStr::new("-v"),
        OsStr::new("error"),
        OsStr::new("-select_streams"),
        OsStr::new("v:0"),
        OsStr::new("-show_entries"),
        OsStr::new("stream=r_frame_rate"),
        OsStr::new("-of"),
        OsStr::new("default=noprint_wrappers=1:nokey=1"),
        video.as_os_str(),
    ];
    let output = ffprobe.run(args, cancel).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| AppError::ToolFailed {
            tool: ffprobe.name().to_string(),
            status: output.status,
            stderr: format!("no video stream found in {}", video.display()),
        })?;

    let fps = parse_rate(line).ok_or_else(|| AppError::ToolFailed {
        tool: ffprobe.name().to_string(),
        status: output.status,
        stderr: format!("unreadable frame rate '{}'", line),
    })?;
    info!("Input video {} runs at {:.1} fps", video.display(), fps);
    Ok(fps)
}

/// Parses `30000/1001`, `25/1` or a plain `29.97`.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Output rates offered to the user: whole numbers from the source rate down to 1.
pub fn fps_options(source_fps: f64) -> Vec<u32> {
    let top = if source_fps.is_finite() && source_fps >= 1.0 {
        source_fps.floor() as u32
    } else {
        1
    };
    (1..=top).rev().collect()
}
