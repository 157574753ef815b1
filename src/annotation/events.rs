use tracing::debug;

use super::point::{Label, Point};

/// Notifications emitted by the annotation session after each successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEvent {
    PointAdded { object: String, point: Point },
    PointRemoved { object: String, index: usize, point: Point },
    ObjectCreated { name: String },
    ObjectRenamed { from: String, to: String },
    ObjectSelected { name: String },
    LabelChanged(Label),
    ScaleChanged(f64),
    Saved,
}

impl AnnotationEvent {
    /// Events that change what would be written to a prompt file.
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            AnnotationEvent::PointAdded { .. }
                | AnnotationEvent::PointRemoved { .. }
                | AnnotationEvent::ObjectCreated { .. }
                | AnnotationEvent::ObjectRenamed { .. }
        )
    }
}

/// Observer pattern for annotation changes
pub trait AnnotationObserver: Send {
    fn on_event(&mut self, event: &AnnotationEvent);
}

/// Traces every event at debug level.
pub struct TracingObserver;

impl AnnotationObserver for TracingObserver {
    fn on_event(&mut self, event: &AnnotationEvent) {
        debug!("Annotation event: {:?}", event);
    }
}

/// Tracks whether there are edits that have not been written to disk yet.
#[derive(Clone, Default)]
pub struct UnsavedChanges {
    dirty: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl UnsavedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl AnnotationObserver for UnsavedChanges {
    fn on_event(&mut self, event: &AnnotationEvent) {
        let ordering = std::sync::atomic::Ordering::Relaxed;
        if event.is_edit() {
            self.dirty.store(true, ordering);
        } else if *event == AnnotationEvent::Saved {
            self.dirty.store(false, ordering);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsaved_changes_follow_edits_and_saves() {
        let tracker = UnsavedChanges::new();
        let mut observer = tracker.clone();
        assert!(!tracker.is_dirty());

        observer.on_event(&AnnotationEvent::LabelChanged(Label::Negative));
        assert!(!tracker.is_dirty());

        observer.on_event(&AnnotationEvent::PointAdded {
            object: "Object 1".to_string(),
            point: Point::new(1, 2, Label::Positive),
        });
        assert!(tracker.is_dirty());

        observer.on_event(&AnnotationEvent::Saved);
        assert!(!tracker.is_dirty());
    }
}
