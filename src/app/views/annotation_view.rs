use std::path::PathBuf;

use egui::epaint::CircleShape;
use egui::{pos2, vec2, Color32, Pos2, Rect, Sense, Shape, Stroke, TextureOptions};

use crate::annotation::{
    AnnotationSession, Label, Marker, MarkerColor, MarkerShape, TracingObserver, UnsavedChanges,
};
use crate::app::notice::{Notice, NoticeBoard};
use crate::app::views::{Transition, View};
use crate::config::Settings;
use crate::error::AppError;
use crate::video::FrameSequence;

/// Second stage: click prompt points onto the first frame and save them as JSON.
pub struct AnnotationView {
    frames: FrameSequence,
    fps: u32,
    session: AnnotationSession,
    unsaved: UnsavedChanges,
    marker_size: f32,
    name_entry: String,
    texture: Option<egui::TextureHandle>,
    image_size: [u32; 2],
    load_failed: bool,
    saved_to: Option<PathBuf>,
}

impl AnnotationView {
    pub fn new(frames: FrameSequence, fps: u32, settings: &Settings) -> Self {
        let unsaved = UnsavedChanges::new();
        let session = AnnotationSession::new(&settings.annotation)
            .add_observer(Box::new(TracingObserver))
            .add_observer(Box::new(unsaved.clone()));
        let name_entry = session.current_object().to_string();

        Self {
            frames,
            fps,
            session,
            unsaved,
            marker_size: settings.annotation.marker_size,
            name_entry,
            texture: None,
            image_size: [0, 0],
            load_failed: false,
            saved_to: None,
        }
    }

    fn load_texture(&mut self, ctx: &egui::Context) -> Result<(), AppError> {
        let frame = self
            .frames
            .first()
            .ok_or_else(|| AppError::EmptyFrameDirectory(self.frames.dir().to_path_buf()))?;
        let image = image::open(&frame.path)?.to_rgb8();

        let color_image = egui::ColorImage::from_rgb(
            [image.width() as usize, image.height() as usize],
            image.as_raw().as_slice(),
        );
        self.image_size = [image.width(), image.height()];
        self.texture = Some(ctx.load_texture("annotation_frame", color_image, TextureOptions::LINEAR));
        Ok(())
    }

    fn save_points(&mut self, notices: &mut NoticeBoard) {
        if self.session.set().is_empty() {
            notices.push(Notice::info("Info", "No points to save."));
            return;
        }
        let Some(mut path) = rfd::FileDialog::new()
            .set_title("Save Points")
            .add_filter("JSON files", &["json"])
            .set_file_name("prompts.json")
            .save_file()
        else {
            return;
        };
        if path.extension().is_none() {
            path.set_extension("json");
        }

        match self.session.save(&path) {
            Ok(true) => {
                notices.push(Notice::info(
                    "Success",
                    format!("Data saved to {}", path.display()),
                ));
                self.saved_to = Some(path);
            }
            Ok(false) => notices.push(Notice::info("Info", "No points to save.")),
            Err(e) => notices.push_error(&e),
        }
    }

    fn print_points(&self, notices: &mut NoticeBoard) {
        match self.session.print_points() {
            Some(summary) => notices.push(Notice::info("Points", summary)),
            None => notices.push(Notice::info("Info", "No points annotated yet.")),
        }
    }

    fn draw_toolbar(&mut self, ui: &mut egui::Ui, notices: &mut NoticeBoard) {
        ui.horizontal(|ui| {
            let toggle = format!("Toggle Pos/Neg (Current: {})", self.session.current_label());
            if ui.button(toggle).clicked() {
                self.session.toggle_label();
            }
            if ui.button("Print Points").clicked() {
                self.print_points(notices);
            }
            if ui.button("Save to JSON").clicked() {
                self.save_points(notices);
            }
        });

        ui.horizontal(|ui| {
            ui.label("Object name:");
            ui.text_edit_singleline(&mut self.name_entry);

            if ui.button("New Object").clicked() {
                if let Err(e) = self.session.new_object(&self.name_entry) {
                    notices.push_error(&AppError::from(e));
                }
            }

            let current = self.session.current_object().to_string();
            let mut selected = current.clone();
            egui::ComboBox::from_id_salt("object_selector")
                .selected_text(selected.clone())
                .show_ui(ui, |ui| {
                    for name in self.session.object_names() {
                        ui.selectable_value(&mut selected, name.clone(), name);
                    }
                });
            if selected != current {
                match self.session.select_object(&selected) {
                    Ok(()) => self.name_entry = selected,
                    Err(e) => notices.push_error(&AppError::from(e)),
                }
            }

            if ui.button("Rename Object").clicked() {
                if let Err(e) = self.session.rename_object(&current, &self.name_entry) {
                    notices.push_error(&AppError::from(e));
                }
            }
        });
    }

    fn draw_canvas(&mut self, ui: &mut egui::Ui) {
        let Some(texture) = &self.texture else {
            return;
        };
        let [width, height] = self.image_size;

        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click());
        let canvas = response.rect;
        self.session
            .update_scale(canvas.width(), canvas.height(), width, height);

        let scale = self.session.scale_factor() as f32;
        let image_rect = Rect::from_min_size(
            canvas.min,
            vec2(width as f32 * scale, height as f32 * scale),
        );
        painter.image(
            texture.id(),
            image_rect,
            Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
            Color32::WHITE,
        );

        if let Some(pointer) = response.interact_pointer_pos() {
            let local = pointer - canvas.min;
            if response.clicked() {
                self.session.add_point(local.x, local.y);
            } else if response.secondary_clicked() {
                self.session.remove_nearest_point(local.x, local.y);
            }
        }

        for marker in self.session.markers() {
            painter.add(marker_shape(&marker, canvas.min, self.marker_size));
        }
    }
}

fn marker_shape(marker: &Marker, origin: Pos2, size: f32) -> Shape {
    let fill = match marker.color {
        MarkerColor::Green => Color32::GREEN,
        MarkerColor::Red => Color32::RED,
    };
    let stroke = Stroke::new(1.0, Color32::BLACK);
    let cx = origin.x + marker.x;
    let cy = origin.y + marker.y;

    match marker.shape {
        MarkerShape::Circle => Shape::Circle(CircleShape {
            center: pos2(cx, cy),
            radius: size,
            fill,
            stroke,
        }),
        shape => {
            let points = shape
                .outline(cx, cy, size)
                .into_iter()
                .map(|(x, y)| pos2(x, y))
                .collect();
            Shape::convex_polygon(points, fill, stroke)
        }
    }
}

impl View for AnnotationView {
    fn title(&self) -> String {
        let frame = self
            .frames
            .first()
            .and_then(|f| f.path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dirty = if self.unsaved.is_dirty() { "*" } else { "" };
        format!("Annotate {}{}", frame, dirty)
    }

    fn draw(&mut self, ui: &mut egui::Ui, notices: &mut NoticeBoard) -> Option<Transition> {
        if self.texture.is_none() && !self.load_failed {
            if let Err(e) = self.load_texture(ui.ctx()) {
                self.load_failed = true;
                notices.push_error(&e);
            }
        }

        ui.heading(self.title());
        ui.label("Left click adds a point to the current object, right click removes the nearest point.");
        self.draw_toolbar(ui, notices);

        let mut transition = None;
        ui.horizontal(|ui| {
            let set = self.session.set();
            ui.label(format!(
                "Current object: {} | Objects: {} | Points: {} ({} pos, {} neg) | Scale: {:.3}",
                self.session.current_object(),
                set.len(),
                set.total_points(),
                set.count_by_label(Label::Positive),
                set.count_by_label(Label::Negative),
                self.session.scale_factor()
            ));
            if let Some(path) = &self.saved_to {
                let ready = !self.unsaved.is_dirty();
                if ui
                    .add_enabled(ready, egui::Button::new("Continue to Segmentation"))
                    .on_disabled_hover_text("Save the latest edits first")
                    .clicked()
                {
                    transition = Some(Transition::Segment {
                        frames_dir: self.frames.dir().to_path_buf(),
                        prompts_path: path.clone(),
                        fps: self.fps,
                    });
                }
            }
        });
        ui.separator();

        self.draw_canvas(ui);
        transition
    }
}
