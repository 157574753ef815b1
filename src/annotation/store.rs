use indexmap::IndexMap;

use super::point::{Label, Point};
use crate::error::AnnotationError;

/// Object name -> ordered prompt points. Iteration order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet {
    objects: IndexMap<String, Vec<Point>>,
}

/// A point taken out of the set by a removal request.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPoint {
    pub object: String,
    pub index: usize,
    pub point: Point,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// No objects at all. An object without points still counts as content.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn total_points(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    pub fn points(&self, name: &str) -> Option<&[Point]> {
        self.objects.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Point])> {
        self.objects
            .iter()
            .map(|(name, points)| (name.as_str(), points.as_slice()))
    }

    /// Creates the object if it is missing. Returns true when it was created.
    pub fn insert_object(&mut self, name: &str) -> bool {
        if self.objects.contains_key(name) {
            return false;
        }
        self.objects.insert(name.to_string(), Vec::new());
        true
    }

    /// Appends to the object, creating it on first use. Duplicate coordinates are allowed.
    pub fn push_point(&mut self, object: &str, point: Point) {
        self.objects
            .entry(object.to_string())
            .or_default()
            .push(point);
    }

    /// Removes the point closest to `(x, y)` strictly within `radius`.
    ///
    /// Objects and points are scanned in insertion order; on an exact distance tie the
    /// first point encountered wins.
    pub fn remove_nearest(&mut self, x: i32, y: i32, radius: f64) -> Option<RemovedPoint> {
        let mut best: Option<(usize, usize, f64)> = None;

        for (object_index, points) in self.objects.values().enumerate() {
            for (point_index, point) in points.iter().enumerate() {
                let distance = point.distance_to(x, y);
                if distance >= radius {
                    continue;
                }
                if best.map_or(true, |(_, _, d)| distance < d) {
                    best = Some((object_index, point_index, distance));
                }
            }
        }

        let (object_index, point_index, _) = best?;
        let (name, points) = self.objects.get_index_mut(object_index)?;
        let point = points.remove(point_index);
        Some(RemovedPoint {
            object: name.clone(),
            index: point_index,
            point,
        })
    }

    /// Renames `old` to `new`, keeping its position in the set.
    ///
    /// Renaming an object to its own name succeeds without changes. A collision with a
    /// different existing object fails and leaves the set untouched.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), AnnotationError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(AnnotationError::EmptyName);
        }
        if new == old {
            return Ok(());
        }
        if self.objects.contains_key(new) {
            return Err(AnnotationError::NameExists(new.to_string()));
        }

        let (index, _, points) = self
            .objects
            .swap_remove_full(old)
            .ok_or_else(|| AnnotationError::UnknownObject(old.to_string()))?;
        self.objects.insert(new.to_string(), points);
        let last = self.objects.len() - 1;
        self.objects.swap_indices(index, last);
        Ok(())
    }

    /// Human readable listing of every annotated point.
    pub fn summary(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut out = String::from("Annotated Points:\n");
        for (name, points) in self.iter() {
            out.push_str(&format!("\n{}:\n", name));
            for point in points {
                out.push_str(&format!(
                    "  Coordinates: ({}, {}), Label: {}({})\n",
                    point.x,
                    point.y,
                    point.label.as_flag(),
                    point.label.short_name()
                ));
            }
        }
        Some(out)
    }

    pub(crate) fn from_objects(objects: IndexMap<String, Vec<Point>>) -> Self {
        Self { objects }
    }

    pub fn count_by_label(&self, label: Label) -> usize {
        self.objects
            .values()
            .flatten()
            .filter(|point| point.label == label)
            .count()
    }
}
