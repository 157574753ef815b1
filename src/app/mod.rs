pub mod notice;
pub mod views;
pub mod workflow_app;

pub use notice::{Notice, NoticeBoard, NoticeLevel};
pub use workflow_app::WorkflowApp;
