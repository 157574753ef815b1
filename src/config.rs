use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;
use crate::segmentation::model::{DeviceChoice, ModelVariant};

const DEFAULT_CONFIG_FILE: &str = "meltseg";
const ENV_PREFIX: &str = "MELTSEG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tools: ToolSettings,
    pub extraction: ExtractionSettings,
    pub encoding: EncodingSettings,
    pub segmentation: SegmentationSettings,
    pub annotation: AnnotationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// ffmpeg `-q:v` level, 2 is near-lossless JPEG
    pub jpeg_quality: u8,
    pub start_number: u32,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncodingSettings {
    pub codec: String,
    pub pixel_format: String,
    pub crf: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationSettings {
    pub model: ModelVariant,
    pub device: DeviceChoice,
    pub alpha: f32,
    /// Quality of the masked frames written by the overlay step (1-100)
    pub jpeg_quality: u8,
    pub predictor: PredictorSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    pub removal_radius: f64,
    pub marker_size: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 2,
            start_number: 0,
            overwrite: true,
        }
    }
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            codec: "h264".to_string(),
            pixel_format: "yuv420p".to_string(),
            crf: 23,
        }
    }
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            model: ModelVariant::default(),
            device: DeviceChoice::Auto,
            alpha: 0.25,
            jpeg_quality: 75,
            predictor: PredictorSettings::default(),
        }
    }
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("sam2-propagate"),
            args: Vec::new(),
        }
    }
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            removal_radius: 10.0,
            marker_size: 5.0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Layers defaults, an optional config file and `MELTSEG__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AppError> {
        if !(0.0..=1.0).contains(&self.segmentation.alpha) {
            return Err(AppError::InvalidSettings(
                "segmentation.alpha must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.encoding.crf > 51 {
            return Err(AppError::InvalidSettings(
                "encoding.crf must be between 0 and 51".to_string(),
            ));
        }

        if self.extraction.jpeg_quality == 0 || self.extraction.jpeg_quality > 31 {
            return Err(AppError::InvalidSettings(
                "extraction.jpeg_quality must be between 1 and 31".to_string(),
            ));
        }

        if self.segmentation.jpeg_quality == 0 || self.segmentation.jpeg_quality > 100 {
            return Err(AppError::InvalidSettings(
                "segmentation.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.annotation.removal_radius <= 0.0 {
            return Err(AppError::InvalidSettings(
                "annotation.removal_radius must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_workflow_constants() {
        let settings = Settings::default();
        assert_eq!(settings.extraction.jpeg_quality, 2);
        assert_eq!(settings.extraction.start_number, 0);
        assert_eq!(settings.encoding.crf, 23);
        assert_eq!(settings.encoding.pixel_format, "yuv420p");
        assert_eq!(settings.segmentation.alpha, 0.25);
        assert_eq!(settings.segmentation.model, ModelVariant::BasePlus);
        assert_eq!(settings.annotation.removal_radius, 10.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[segmentation]\nalpha = 0.5\nmodel = \"tiny\"\n\n[tools]\nffmpeg = \"/opt/ffmpeg/bin/ffmpeg\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.segmentation.alpha, 0.5);
        assert_eq!(settings.segmentation.model, ModelVariant::Tiny);
        assert_eq!(settings.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(settings.tools.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(settings.encoding.crf, 23);
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        let mut settings = Settings::default();
        settings.segmentation.alpha = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(AppError::InvalidSettings(_))
        ));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut settings = Settings::default();
        settings.logging.level = "chatty".to_string();
        assert_eq!(settings.log_level(), tracing::Level::INFO);
        settings.logging.level = "debug".to_string();
        assert_eq!(settings.log_level(), tracing::Level::DEBUG);
    }
}
