use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::app::notice::{Notice, NoticeBoard};
use crate::app::views::{Transition, View};
use crate::config::Settings;
use crate::error::AppError;
use crate::task::{TaskHandle, TaskPoll};
use crate::video::{prepare_output_dir, ExtractionRequest, FrameExtractor, FrameSequence};

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// First stage: pick a video, probe its frame rate and sample it into numbered JPEGs.
pub struct ExtractView {
    extractor: Arc<FrameExtractor>,
    video: Option<PathBuf>,
    output_dir: String,
    source_fps: Option<f64>,
    fps_options: Vec<u32>,
    selected_fps: u32,
    probe: Option<TaskHandle<(f64, Vec<u32>)>>,
    extraction: Option<TaskHandle<FrameSequence>>,
}

impl ExtractView {
    pub fn new(settings: &Settings) -> Self {
        Self {
            extractor: Arc::new(FrameExtractor::from_settings(settings)),
            video: None,
            output_dir: String::new(),
            source_fps: None,
            fps_options: Vec::new(),
            selected_fps: 1,
            probe: None,
            extraction: None,
        }
    }

    fn select_video(&mut self) {
        let Some(video) = rfd::FileDialog::new()
            .set_title("Select Video File")
            .add_filter("Video files", &VIDEO_EXTENSIONS)
            .pick_file()
        else {
            return;
        };

        info!("Selected video {}", video.display());
        let extractor = self.extractor.clone();
        let path = video.clone();
        self.probe = Some(TaskHandle::spawn(
            "Frame rate probe",
            move |cancel, _progress| async move { extractor.fps_choices(&path, &cancel).await },
        ));
        self.video = Some(video);
        self.source_fps = None;
        self.fps_options.clear();
    }

    fn select_output_dir(&mut self) {
        if let Some(dir) = rfd::FileDialog::new()
            .set_title("Select Output Frames Folder")
            .pick_folder()
        {
            self.output_dir = dir.display().to_string();
        }
    }

    fn start_extraction(&mut self, notices: &mut NoticeBoard) {
        let Some(video) = self.video.clone() else {
            notices.push_error(&AppError::MissingInput("Video file"));
            return;
        };
        let output = self.output_dir.trim();
        if output.is_empty() {
            notices.push_error(&AppError::MissingInput("Output folder"));
            return;
        }
        let output_dir = PathBuf::from(output);

        match prepare_output_dir(&output_dir, confirm_create) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                notices.push_error(&e);
                return;
            }
        }

        let request = ExtractionRequest {
            video,
            output_dir,
            fps: self.selected_fps,
        };
        let extractor = self.extractor.clone();
        self.extraction = Some(TaskHandle::spawn(
            "Frame extraction",
            move |cancel, progress| async move {
                progress.report("Extracting frames...", None);
                extractor.extract(&request, &cancel).await
            },
        ));
    }

    fn use_existing_frames(&mut self, notices: &mut NoticeBoard) -> Option<Transition> {
        let dir = rfd::FileDialog::new()
            .set_title("Select Input Frames Directory")
            .pick_folder()?;
        self.open_existing_frames(&dir, notices)
    }

    fn open_existing_frames(&self, dir: &Path, notices: &mut NoticeBoard) -> Option<Transition> {
        match FrameSequence::scan_non_empty(dir) {
            Ok(frames) => Some(Transition::Annotate {
                frames,
                fps: self.selected_fps,
            }),
            Err(e) => {
                notices.push_error(&e);
                None
            }
        }
    }

    fn poll_tasks(&mut self, notices: &mut NoticeBoard) -> Option<Transition> {
        if let Some(probe) = self.probe.as_mut() {
            if let TaskPoll::Finished(result) = probe.try_finish() {
                self.probe = None;
                match result {
                    Ok((source_fps, options)) => {
                        self.source_fps = Some(source_fps);
                        self.selected_fps = options.first().copied().unwrap_or(1);
                        self.fps_options = options;
                    }
                    Err(e) => notices.push_error(&e),
                }
            }
        }

        let extraction = self.extraction.as_mut()?;
        let TaskPoll::Finished(result) = extraction.try_finish() else {
            return None;
        };
        self.extraction = None;
        match result {
            Ok(frames) => {
                notices.push(Notice::info(
                    "Success",
                    format!("Frames extracted successfully: {} frame(s).", frames.len()),
                ));
                Some(Transition::Annotate {
                    frames,
                    fps: self.selected_fps,
                })
            }
            Err(AppError::Cancelled) => {
                notices.push(Notice::info("Cancelled", "Frame extraction cancelled."));
                None
            }
            Err(e) => {
                notices.push_error(&e);
                None
            }
        }
    }

    fn draw_fps_selector(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Output FPS:");
            if self.fps_options.is_empty() {
                ui.add(egui::DragValue::new(&mut self.selected_fps).range(1..=240));
            } else {
                egui::ComboBox::from_id_salt("fps_selector")
                    .selected_text(self.selected_fps.to_string())
                    .show_ui(ui, |ui| {
                        for fps in &self.fps_options {
                            ui.selectable_value(&mut self.selected_fps, *fps, fps.to_string());
                        }
                    });
            }
            match self.source_fps {
                Some(source_fps) => ui.label(format!("(source: {:.2} fps)", source_fps)),
                None if self.probe.is_some() => ui.spinner(),
                None => ui.label(""),
            };
        });
    }
}

fn confirm_create(dir: &Path) -> bool {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Info)
        .set_title("Create Folder")
        .set_description(format!(
            "The folder '{}' does not exist. Do you want to create it?",
            dir.display()
        ))
        .set_buttons(rfd::MessageButtons::YesNo)
        .show()
        == rfd::MessageDialogResult::Yes
}

impl View for ExtractView {
    fn title(&self) -> String {
        "Extract Frames".to_string()
    }

    fn is_busy(&self) -> bool {
        self.probe.is_some() || self.extraction.is_some()
    }

    fn draw(&mut self, ui: &mut egui::Ui, notices: &mut NoticeBoard) -> Option<Transition> {
        let mut transition = self.poll_tasks(notices);
        let idle = self.extraction.is_none();

        ui.heading("Extract Frames from Video");
        ui.separator();

        ui.horizontal(|ui| {
            if ui
                .add_enabled(idle, egui::Button::new("Select Video File"))
                .clicked()
            {
                self.select_video();
            }
            match &self.video {
                Some(video) => ui.label(video.display().to_string()),
                None => ui.label("No video selected"),
            };
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(idle, egui::Button::new("Select Output Frames Folder"))
                .clicked()
            {
                self.select_output_dir();
            }
            ui.add_enabled(
                idle,
                egui::TextEdit::singleline(&mut self.output_dir).hint_text("output folder"),
            );
        });

        self.draw_fps_selector(ui);
        ui.separator();

        match self.extraction.as_mut() {
            Some(extraction) => {
                let message = extraction
                    .progress()
                    .map(|p| p.message.clone())
                    .unwrap_or_default();
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(message);
                    if ui.button("Cancel").clicked() {
                        extraction.cancel();
                    }
                });
            }
            None => {
                let picked = ui
                    .horizontal(|ui| {
                        if ui.button("Extract Frames").clicked() {
                            self.start_extraction(notices);
                        }
                        if ui.button("Use Existing Frames").clicked() {
                            return self.use_existing_frames(notices);
                        }
                        None
                    })
                    .inner;
                transition = transition.or(picked);
            }
        }

        transition
    }
}
