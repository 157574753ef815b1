use egui::{Align2, Color32, RichText};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: "Warning".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: "Error".to_string(),
            message: message.into(),
        }
    }

    fn color(&self) -> Color32 {
        match self.level {
            NoticeLevel::Info => Color32::LIGHT_GREEN,
            NoticeLevel::Warning => Color32::YELLOW,
            NoticeLevel::Error => Color32::LIGHT_RED,
        }
    }
}

impl From<&AppError> for Notice {
    fn from(error: &AppError) -> Self {
        if error.is_validation() {
            Notice::warning(error.to_string())
        } else {
            Notice::error(error.to_string())
        }
    }
}

/// Modal notice plus a scrollback of everything shown this session.
#[derive(Default)]
pub struct NoticeBoard {
    pending: Option<Notice>,
    history: Vec<Notice>,
}

impl NoticeBoard {
    pub fn push(&mut self, notice: Notice) {
        self.history.push(notice.clone());
        self.pending = Some(notice);
    }

    pub fn push_error(&mut self, error: &AppError) {
        self.push(Notice::from(error));
    }

    pub fn is_blocking(&self) -> bool {
        self.pending.is_some()
    }

    pub fn history(&self) -> &[Notice] {
        &self.history
    }

    pub fn show_modal(&mut self, ctx: &egui::Context) {
        let Some(notice) = &self.pending else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new(notice.title.clone())
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(RichText::new(&notice.message).color(notice.color()));
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.pending = None;
        }
    }

    pub fn show_log(&self, ui: &mut egui::Ui) {
        ui.heading("Notices");
        egui::ScrollArea::vertical().show(ui, |ui| {
            for notice in self.history().iter().rev() {
                ui.colored_label(
                    notice.color(),
                    format!("[{}] {}", notice.title, notice.message),
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnotationError;

    #[test]
    fn validation_errors_become_warnings() {
        let notice = Notice::from(&AppError::Annotation(AnnotationError::EmptyName));
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "Annotation Error: Please enter an object name.");

        let notice = Notice::from(&AppError::MissingInput("Video file"));
        assert_eq!(notice.level, NoticeLevel::Error);
    }

    #[test]
    fn board_keeps_history_after_dismissal() {
        let mut board = NoticeBoard::default();
        board.push(Notice::info("Info", "No points to save."));
        board.push(Notice::error("ffmpeg exited"));
        assert!(board.is_blocking());
        assert_eq!(board.history().len(), 2);
    }
}
