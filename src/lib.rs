pub mod annotation;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod segmentation;
pub mod task;
pub mod video;

pub use config::Settings;
pub use error::{AnnotationError, AppError};
