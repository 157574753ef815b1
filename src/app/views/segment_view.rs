use std::path::PathBuf;

use chrono::Local;
use tracing::info;

use crate::annotation::PromptFile;
use crate::app::notice::{Notice, NoticeBoard};
use crate::app::views::{Transition, View};
use crate::config::Settings;
use crate::error::AppError;
use crate::segmentation::{
    DeviceChoice, ModelVariant, SegmentationOrchestrator, SegmentationReport, SegmentationRequest,
};
use crate::task::{TaskHandle, TaskPoll};

/// Default name offered in the save dialog, e.g. `segmented_20240101_120000.mp4`.
pub fn default_video_name() -> String {
    format!("segmented_{}.mp4", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Third stage: run the predictor over every frame and encode the masked video.
pub struct SegmentView {
    settings: Settings,
    frames_dir: PathBuf,
    prompts_path: PathBuf,
    fps: u32,
    model: ModelVariant,
    device: DeviceChoice,
    masked_dir: Option<PathBuf>,
    output_video: Option<PathBuf>,
    task: Option<TaskHandle<SegmentationReport>>,
}

impl SegmentView {
    pub fn new(settings: &Settings, frames_dir: PathBuf, prompts_path: PathBuf, fps: u32) -> Self {
        Self {
            settings: settings.clone(),
            frames_dir,
            prompts_path,
            fps,
            model: settings.segmentation.model,
            device: settings.segmentation.device,
            masked_dir: None,
            output_video: None,
            task: None,
        }
    }

    fn start(&mut self, notices: &mut NoticeBoard) {
        let Some(masked_dir) = self.masked_dir.clone() else {
            notices.push_error(&AppError::MissingInput("Masked frames folder"));
            return;
        };
        let Some(output_video) = self.output_video.clone() else {
            notices.push_error(&AppError::MissingInput("Output video"));
            return;
        };
        let prompts = match PromptFile::load(&self.prompts_path) {
            Ok(prompts) => prompts,
            Err(e) => {
                notices.push_error(&e);
                return;
            }
        };

        let request = SegmentationRequest {
            frames_dir: self.frames_dir.clone(),
            prompts,
            masked_dir,
            output_video: Some(output_video),
            fps: self.fps,
        };
        let settings = self.settings.clone();
        let model = self.model;
        let device = self.device;
        self.task = Some(TaskHandle::spawn(
            "Segmentation",
            move |cancel, progress| async move {
                progress.report("Loading model...", None);
                let orchestrator =
                    SegmentationOrchestrator::external(&settings, model, device).await?;
                orchestrator.run(request, cancel, progress).await
            },
        ));
    }

    fn poll_task(&mut self, notices: &mut NoticeBoard) -> Option<Transition> {
        let task = self.task.as_mut()?;
        let TaskPoll::Finished(result) = task.try_finish() else {
            return None;
        };
        self.task = None;
        match result {
            Ok(report) => {
                notices.push(Notice::info("Success", "Video created successfully."));
                Some(Transition::Finished(report))
            }
            Err(AppError::Cancelled) => {
                notices.push(Notice::info("Cancelled", "Segmentation cancelled."));
                None
            }
            Err(e) => {
                notices.push_error(&e);
                None
            }
        }
    }

    fn draw_inputs(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("segment_inputs")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                if ui.button("Select Input Frames Directory").clicked() {
                    if let Some(dir) = rfd::FileDialog::new()
                        .set_title("Select Input Frames Directory")
                        .pick_folder()
                    {
                        self.frames_dir = dir;
                    }
                }
                ui.label(self.frames_dir.display().to_string());
                ui.end_row();

                if ui.button("Select Prompts JSON File").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Select Prompts JSON File")
                        .add_filter("JSON files", &["json"])
                        .pick_file()
                    {
                        self.prompts_path = path;
                    }
                }
                ui.label(self.prompts_path.display().to_string());
                ui.end_row();

                if ui.button("Select Masked Frames Directory").clicked() {
                    if let Some(dir) = rfd::FileDialog::new()
                        .set_title("Select Output Directory for Masked Video Segments")
                        .pick_folder()
                    {
                        self.masked_dir = Some(dir);
                    }
                }
                ui.label(display_or_unset(self.masked_dir.as_ref()));
                ui.end_row();

                if ui.button("Save Output Video As").clicked() {
                    if let Some(mut path) = rfd::FileDialog::new()
                        .set_title("Save Output Video As")
                        .add_filter("MP4 files", &["mp4"])
                        .set_file_name(default_video_name())
                        .save_file()
                    {
                        if path.extension().is_none() {
                            path.set_extension("mp4");
                        }
                        info!("Output video {}", path.display());
                        self.output_video = Some(path);
                    }
                }
                ui.label(display_or_unset(self.output_video.as_ref()));
                ui.end_row();

                ui.label("Output FPS:");
                ui.add(egui::DragValue::new(&mut self.fps).range(1..=240));
                ui.end_row();
            });
    }

    fn draw_model_choice(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Model:");
            for variant in ModelVariant::ALL {
                ui.radio_value(&mut self.model, variant, variant.display_name());
            }
        });
        ui.horizontal(|ui| {
            ui.label("Device:");
            egui::ComboBox::from_id_salt("device_selector")
                .selected_text(self.device.label())
                .show_ui(ui, |ui| {
                    for choice in DeviceChoice::ALL {
                        ui.selectable_value(&mut self.device, choice, choice.label());
                    }
                });
        });
    }
}

fn display_or_unset(path: Option<&PathBuf>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "not set".to_string())
}

impl View for SegmentView {
    fn title(&self) -> String {
        "Segment Video".to_string()
    }

    fn is_busy(&self) -> bool {
        self.task.is_some()
    }

    fn draw(&mut self, ui: &mut egui::Ui, notices: &mut NoticeBoard) -> Option<Transition> {
        let transition = self.poll_task(notices);

        ui.heading("Segment Video");
        ui.separator();

        ui.add_enabled_ui(self.task.is_none(), |ui| {
            self.draw_inputs(ui);
            ui.separator();
            self.draw_model_choice(ui);
        });
        ui.separator();

        match self.task.as_mut() {
            Some(task) => {
                let (message, fraction) = task
                    .progress()
                    .map(|p| (p.message.clone(), p.fraction))
                    .unwrap_or_default();
                let bar = match fraction {
                    Some(fraction) => egui::ProgressBar::new(fraction).show_percentage(),
                    None => egui::ProgressBar::new(0.0).animate(true),
                };
                ui.add(bar.text(message));
                if ui.button("Cancel").clicked() {
                    task.cancel();
                }
            }
            None => {
                if ui.button("Run Segmentation").clicked() {
                    self.start(notices);
                }
            }
        }

        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_video_name_is_timestamped_mp4() {
        let name = default_video_name();
        assert!(name.starts_with("segmented_"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.len(), "segmented_20240101_120000.mp4".len());
    }
}
