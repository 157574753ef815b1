use std::time::Duration;

use tracing::info;

use crate::app::notice::NoticeBoard;
use crate::app::views::annotation_view::AnnotationView;
use crate::app::views::extract_view::ExtractView;
use crate::app::views::segment_view::SegmentView;
use crate::app::views::{Transition, View};
use crate::config::Settings;
use crate::error::AppError;
use crate::segmentation::SegmentationReport;
use crate::video::FrameSequence;

const WINDOW_TITLE: &str = "Meltseg - Weld Pool Segmentation";
const BUSY_REPAINT: Duration = Duration::from_millis(100);

enum Stage {
    Extract(ExtractView),
    Annotate(AnnotationView),
    Segment(SegmentView),
    Done(SegmentationReport),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Extract(_) => "1. Extract",
            Stage::Annotate(_) => "2. Annotate",
            Stage::Segment(_) => "3. Segment",
            Stage::Done(_) => "Done",
        }
    }

    fn title(&mut self) -> String {
        match self.view() {
            Some(view) => view.title(),
            None => "Segmentation finished".to_string(),
        }
    }

    fn view(&mut self) -> Option<&mut dyn View> {
        match self {
            Stage::Extract(view) => Some(view as &mut dyn View),
            Stage::Annotate(view) => Some(view as &mut dyn View),
            Stage::Segment(view) => Some(view as &mut dyn View),
            Stage::Done(_) => None,
        }
    }
}

/// Guides the user through extract -> annotate -> segment in one window.
pub struct WorkflowApp {
    settings: Settings,
    stage: Stage,
    notices: NoticeBoard,
}

impl WorkflowApp {
    pub fn new(settings: Settings, frames: Option<(FrameSequence, u32)>) -> Self {
        let stage = match frames {
            Some((frames, fps)) => Stage::Annotate(AnnotationView::new(frames, fps, &settings)),
            None => Stage::Extract(ExtractView::new(&settings)),
        };
        Self {
            settings,
            stage,
            notices: NoticeBoard::default(),
        }
    }

    /// Opens the window and blocks until it is closed. With `frames`, the workflow starts
    /// at the annotation stage.
    pub fn start_gui(settings: &Settings, frames: Option<(FrameSequence, u32)>) -> Result<(), AppError> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(1280.0, 800.0))
                .with_title(WINDOW_TITLE),
            ..Default::default()
        };

        let app = WorkflowApp::new(settings.clone(), frames);
        eframe::run_native(WINDOW_TITLE, options, Box::new(move |_cc| Ok(Box::new(app))))
            .map_err(|e| AppError::Ui(e.to_string()))
    }

    fn apply(&mut self, transition: Transition) {
        self.stage = match transition {
            Transition::Annotate { frames, fps } => {
                info!(
                    "Annotating {} ({} frame(s) at {} fps)",
                    frames.dir().display(),
                    frames.len(),
                    fps
                );
                Stage::Annotate(AnnotationView::new(frames, fps, &self.settings))
            }
            Transition::Segment {
                frames_dir,
                prompts_path,
                fps,
            } => Stage::Segment(SegmentView::new(&self.settings, frames_dir, prompts_path, fps)),
            Transition::Finished(report) => Stage::Done(report),
            Transition::Restart => Stage::Extract(ExtractView::new(&self.settings)),
        };
        info!("Workflow stage: {}", self.stage.name());
    }

    fn draw_done(report: &SegmentationReport, ui: &mut egui::Ui) -> Option<Transition> {
        ui.heading("Segmentation finished");
        ui.label(format!("Masked frames written: {}", report.frames_written));
        ui.label(format!("Masked frames folder: {}", report.masked_dir.display()));
        if let Some(video) = &report.video {
            ui.label(format!("Output video: {}", video.display()));
        }
        ui.separator();
        ui.button("Start Over")
            .clicked()
            .then_some(Transition::Restart)
    }
}

impl eframe::App for WorkflowApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("stage_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(WINDOW_TITLE);
                ui.separator();
                ui.label(format!("{}: {}", self.stage.name(), self.stage.title()));
            });
        });

        egui::TopBottomPanel::bottom("notice_panel")
            .resizable(true)
            .default_height(120.0)
            .show(ctx, |ui| {
                self.notices.show_log(ui);
            });

        let blocked = self.notices.is_blocking();
        let mut busy = false;
        let transition = egui::CentralPanel::default()
            .show(ctx, |ui| {
                ui.add_enabled_ui(!blocked, |ui| match &mut self.stage {
                    Stage::Done(report) => Self::draw_done(report, ui),
                    stage => stage.view().and_then(|view| {
                        let transition = view.draw(ui, &mut self.notices);
                        busy = view.is_busy();
                        transition
                    }),
                })
                .inner
            })
            .inner;

        self.notices.show_modal(ctx);

        if let Some(transition) = transition {
            self.apply(transition);
        }
        if busy {
            ctx.request_repaint_after(BUSY_REPAINT);
        }
    }
}
