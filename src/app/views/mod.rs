pub mod annotation_view;
pub mod extract_view;
pub mod segment_view;

use std::path::PathBuf;

use crate::app::notice::NoticeBoard;
use crate::segmentation::SegmentationReport;
use crate::video::FrameSequence;

/// Moves the workflow to another stage.
pub enum Transition {
    Annotate { frames: FrameSequence, fps: u32 },
    Segment { frames_dir: PathBuf, prompts_path: PathBuf, fps: u32 },
    Finished(SegmentationReport),
    Restart,
}

pub trait View {
    fn title(&self) -> String;

    fn draw(&mut self, ui: &mut egui::Ui, notices: &mut NoticeBoard) -> Option<Transition>;

    /// True while a background task owned by the view is still running.
    fn is_busy(&self) -> bool {
        false
    }
}
