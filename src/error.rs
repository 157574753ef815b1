use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Annotation Error: {0}")]
    Annotation(#[from] AnnotationError),
    #[error("Invalid prompt file: {0}")]
    InvalidPrompt(String),
    #[error("{0} not set.")]
    MissingInput(&'static str),
    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Predictor Error: {0}")]
    Predictor(String),
    #[error("Frame directory {0} contains no frames")]
    EmptyFrameDirectory(PathBuf),
    #[error("Mask for object '{object}' on frame {frame} is {mask_width}x{mask_height}, frame is {frame_width}x{frame_height}")]
    MaskSize {
        object: String,
        frame: usize,
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidSettings(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("UI Error: {0}")]
    Ui(String),
}

// Validation failures surfaced to the user while editing annotations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("Please enter an object name.")]
    EmptyName,
    #[error("Object name '{0}' already exists.")]
    NameExists(String),
    #[error("Unknown object '{0}'.")]
    UnknownObject(String),
}

impl AppError {
    /// True when the error came from user input that can simply be corrected and retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Annotation(_))
    }
}
