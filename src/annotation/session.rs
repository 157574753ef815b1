use std::path::Path;

use tracing::{debug, info};

use super::events::{AnnotationEvent, AnnotationObserver};
use super::point::{Label, Point};
use super::prompt::PromptFile;
use super::render::{markers, Marker};
use super::store::{AnnotationSet, RemovedPoint};
use crate::config::AnnotationSettings;
use crate::error::{AnnotationError, AppError};

pub const DEFAULT_OBJECT_NAME: &str = "Object 1";

/// Editing context for one annotated frame: the point store plus the editor's
/// current object, label mode and display scale.
pub struct AnnotationSession {
    set: AnnotationSet,
    current_object: String,
    current_label: Label,
    scale_factor: f64,
    removal_radius: f64,
    observers: Vec<Box<dyn AnnotationObserver>>,
}

impl AnnotationSession {
    pub fn new(settings: &AnnotationSettings) -> Self {
        Self {
            set: AnnotationSet::new(),
            current_object: DEFAULT_OBJECT_NAME.to_string(),
            current_label: Label::Positive,
            scale_factor: 1.0,
            removal_radius: settings.removal_radius,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(mut self, observer: Box<dyn AnnotationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    fn notify(&mut self, event: AnnotationEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    pub fn set(&self) -> &AnnotationSet {
        &self.set
    }

    pub fn current_object(&self) -> &str {
        &self.current_object
    }

    pub fn current_label(&self) -> Label {
        self.current_label
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Names offered for selection: every object in the set, plus the current one
    /// while it has no points yet.
    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.set.names().map(str::to_string).collect();
        if !self.set.contains(&self.current_object) {
            names.push(self.current_object.clone());
        }
        names
    }

    /// Fits the image inside the display area keeping its aspect ratio.
    pub fn update_scale(
        &mut self,
        display_width: f32,
        display_height: f32,
        image_width: u32,
        image_height: u32,
    ) -> f64 {
        let scale = fit_scale(display_width, display_height, image_width, image_height);
        if (scale - self.scale_factor).abs() > f64::EPSILON {
            self.scale_factor = scale;
            self.notify(AnnotationEvent::ScaleChanged(scale));
        }
        self.scale_factor
    }

    /// Display coordinates to original image coordinates, truncated toward zero.
    pub fn to_original(&self, display_x: f32, display_y: f32) -> (i32, i32) {
        (
            (f64::from(display_x) / self.scale_factor).trunc() as i32,
            (f64::from(display_y) / self.scale_factor).trunc() as i32,
        )
    }

    pub fn add_point(&mut self, display_x: f32, display_y: f32) -> Point {
        let (x, y) = self.to_original(display_x, display_y);
        let point = Point::new(x, y, self.current_label);
        let object = self.current_object.clone();
        self.set.push_point(&object, point);
        debug!("Added {:?} to '{}'", point, object);
        self.notify(AnnotationEvent::PointAdded { object, point });
        point
    }

    /// Removes the closest point within the removal radius. The radius is measured
    /// in original image units, so the on-screen hit area shrinks as the image does.
    pub fn remove_nearest_point(&mut self, display_x: f32, display_y: f32) -> Option<RemovedPoint> {
        let (x, y) = self.to_original(display_x, display_y);
        let removed = self.set.remove_nearest(x, y, self.removal_radius)?;
        debug!("Removed {:?} from '{}'", removed.point, removed.object);
        self.notify(AnnotationEvent::PointRemoved {
            object: removed.object.clone(),
            index: removed.index,
            point: removed.point,
        });
        Some(removed)
    }

    pub fn toggle_label(&mut self) -> Label {
        self.current_label = self.current_label.toggled();
        self.notify(AnnotationEvent::LabelChanged(self.current_label));
        self.current_label
    }

    /// Creates and selects a new object. An existing name is handled as a rename of
    /// the current object, which fails unless it is the current object itself.
    pub fn new_object(&mut self, name: &str) -> Result<(), AnnotationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AnnotationError::EmptyName);
        }
        if self.set.contains(name) {
            let current = self.current_object.clone();
            return self.rename_object(&current, name);
        }

        self.set.insert_object(name);
        self.current_object = name.to_string();
        info!("Created object '{}'", name);
        self.notify(AnnotationEvent::ObjectCreated {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn rename_object(&mut self, old: &str, new: &str) -> Result<(), AnnotationError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(AnnotationError::EmptyName);
        }
        if new == old {
            return Ok(());
        }

        if self.set.contains(old) {
            self.set.rename(old, new)?;
        } else if old != self.current_object {
            return Err(AnnotationError::UnknownObject(old.to_string()));
        } else if self.set.contains(new) {
            return Err(AnnotationError::NameExists(new.to_string()));
        }

        if self.current_object == old {
            self.current_object = new.to_string();
        }
        info!("Object renamed from '{}' to '{}'", old, new);
        self.notify(AnnotationEvent::ObjectRenamed {
            from: old.to_string(),
            to: new.to_string(),
        });
        Ok(())
    }

    pub fn select_object(&mut self, name: &str) -> Result<(), AnnotationError> {
        if !self.set.contains(name) && name != self.current_object {
            return Err(AnnotationError::UnknownObject(name.to_string()));
        }
        self.current_object = name.to_string();
        self.notify(AnnotationEvent::ObjectSelected {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn serialize(&self) -> PromptFile {
        PromptFile::from_set(&self.set)
    }

    /// Writes the prompt file. Returns false without touching disk when there is nothing to save.
    pub fn save(&mut self, path: &Path) -> Result<bool, AppError> {
        if self.set.is_empty() {
            info!("No points to save.");
            return Ok(false);
        }
        self.serialize().save(path)?;
        self.notify(AnnotationEvent::Saved);
        Ok(true)
    }

    /// Logs and returns the point listing, `None` when nothing is annotated yet.
    pub fn print_points(&self) -> Option<String> {
        let summary = self.set.summary()?;
        info!("{}", summary);
        Some(summary)
    }

    pub fn markers(&self) -> Vec<Marker> {
        markers(&self.set, self.scale_factor)
    }
}

pub fn fit_scale(display_width: f32, display_height: f32, image_width: u32, image_height: u32) -> f64 {
    if image_width == 0 || image_height == 0 || display_width <= 0.0 || display_height <= 0.0 {
        return 1.0;
    }
    let width_ratio = f64::from(display_width) / f64::from(image_width);
    let height_ratio = f64::from(display_height) / f64::from(image_height);
    width_ratio.min(height_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::events::UnsavedChanges;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<AnnotationEvent>>>);

    impl AnnotationObserver for Recorder {
        fn on_event(&mut self, event: &AnnotationEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn session() -> AnnotationSession {
        AnnotationSession::new(&AnnotationSettings::default())
    }

    #[test]
    fn scale_uses_smaller_ratio() {
        assert_eq!(fit_scale(800.0, 300.0, 1600, 1200), 0.25);
        assert_eq!(fit_scale(400.0, 1000.0, 1600, 1200), 0.25);
        assert_eq!(fit_scale(0.0, 0.0, 1600, 1200), 1.0);
    }

    #[test]
    fn points_are_stored_in_original_space_at_any_scale() {
        let mut session = session();
        session.update_scale(800.0, 600.0, 1600, 1200);
        assert_eq!(session.scale_factor(), 0.5);
        let first = session.add_point(100.0, 50.0);
        assert_eq!((first.x, first.y), (200, 100));

        session.update_scale(3200.0, 2400.0, 1600, 1200);
        let second = session.add_point(100.0, 50.0);
        assert_eq!((second.x, second.y), (50, 25));

        session.update_scale(1000.0, 1000.0, 1600, 1200);
        let third = session.add_point(99.9, 10.0);
        assert_eq!((third.x, third.y), (159, 16));
    }

    #[test]
    fn first_point_materialises_default_object() {
        let mut session = session();
        assert!(session.set().is_empty());
        assert_eq!(session.object_names(), vec![DEFAULT_OBJECT_NAME.to_string()]);

        session.add_point(10.0, 10.0);
        assert!(session.set().contains(DEFAULT_OBJECT_NAME));
    }

    #[test]
    fn toggled_label_applies_to_next_point() {
        let mut session = session();
        assert_eq!(session.toggle_label(), Label::Negative);
        assert_eq!(session.add_point(1.0, 1.0).label, Label::Negative);
        assert_eq!(session.toggle_label(), Label::Positive);
        assert_eq!(session.add_point(2.0, 2.0).label, Label::Positive);
    }

    #[test]
    fn removal_radius_is_measured_in_original_units() {
        let mut session = session();
        session.update_scale(400.0, 300.0, 1600, 1200);
        session.add_point(100.0, 100.0);

        // 3 display pixels away is 12 original pixels at quarter scale.
        assert!(session.remove_nearest_point(103.0, 100.0).is_none());
        let removed = session.remove_nearest_point(102.0, 100.0).unwrap();
        assert_eq!((removed.point.x, removed.point.y), (400, 400));
        assert_eq!(session.set().total_points(), 0);
    }

    #[test]
    fn new_object_selects_it_and_existing_name_is_a_rename() {
        let mut session = session();
        session.add_point(1.0, 1.0);
        session.new_object("  torch ").unwrap();
        assert_eq!(session.current_object(), "torch");
        session.add_point(5.0, 5.0);

        assert_eq!(
            session.new_object(DEFAULT_OBJECT_NAME),
            Err(AnnotationError::NameExists(DEFAULT_OBJECT_NAME.to_string()))
        );
        assert_eq!(session.new_object("torch"), Ok(()));
        assert_eq!(session.new_object(" "), Err(AnnotationError::EmptyName));
        assert_eq!(session.set().len(), 2);
    }

    #[test]
    fn renaming_pending_default_object_moves_current_name() {
        let mut session = session();
        session.rename_object(DEFAULT_OBJECT_NAME, "pool").unwrap();
        assert_eq!(session.current_object(), "pool");
        session.add_point(3.0, 3.0);
        assert!(session.set().contains("pool"));
        assert!(!session.set().contains(DEFAULT_OBJECT_NAME));
    }

    #[test]
    fn rename_collision_does_not_mutate() {
        let mut session = session();
        session.add_point(1.0, 1.0);
        session.new_object("b").unwrap();
        session.add_point(2.0, 2.0);
        let before = session.set().clone();

        assert!(session.rename_object("b", DEFAULT_OBJECT_NAME).is_err());
        assert_eq!(session.set(), &before);
        assert_eq!(session.current_object(), "b");
    }

    #[test]
    fn select_requires_known_object() {
        let mut session = session();
        session.add_point(1.0, 1.0);
        session.new_object("b").unwrap();
        assert!(session.select_object(DEFAULT_OBJECT_NAME).is_ok());
        assert_eq!(session.current_object(), DEFAULT_OBJECT_NAME);
        assert!(session.select_object("nope").is_err());
    }

    #[test]
    fn observers_receive_mutations() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut session = session().add_observer(Box::new(Recorder(events.clone())));

        session.add_point(4.0, 4.0);
        session.toggle_label();
        session.remove_nearest_point(4.0, 4.0);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AnnotationEvent::PointAdded { .. }));
        assert_eq!(events[1], AnnotationEvent::LabelChanged(Label::Negative));
        assert!(matches!(events[2], AnnotationEvent::PointRemoved { index: 0, .. }));
    }

    #[test]
    fn save_skips_empty_set_and_clears_unsaved_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        let tracker = UnsavedChanges::new();
        let mut session = session().add_observer(Box::new(tracker.clone()));

        assert!(!session.save(&path).unwrap());
        assert!(!path.exists());
        assert!(session.print_points().is_none());

        session.add_point(10.0, 10.0);
        assert!(tracker.is_dirty());
        assert!(session.save(&path).unwrap());
        assert!(!tracker.is_dirty());
        assert!(path.exists());
    }
}
