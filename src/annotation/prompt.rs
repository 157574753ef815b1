use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::point::{Label, Point};
use super::store::AnnotationSet;
use crate::error::AppError;

/// Prompt points for one object, index-aligned `coordinates` and `labels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPrompt {
    pub coordinates: Vec<[i32; 2]>,
    pub labels: Vec<u8>,
}

impl ObjectPrompt {
    pub fn from_points(points: &[Point]) -> Self {
        Self {
            coordinates: points.iter().map(|p| [p.x, p.y]).collect(),
            labels: points.iter().map(|p| p.label.as_flag()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn to_points(&self) -> Result<Vec<Point>, AppError> {
        if self.coordinates.len() != self.labels.len() {
            return Err(AppError::InvalidPrompt(format!(
                "{} coordinates but {} labels",
                self.coordinates.len(),
                self.labels.len()
            )));
        }

        self.coordinates
            .iter()
            .zip(&self.labels)
            .map(|(&[x, y], &flag)| {
                let label = Label::from_flag(flag).ok_or_else(|| {
                    AppError::InvalidPrompt(format!("label {} is neither 0 nor 1", flag))
                })?;
                Ok(Point::new(x, y, label))
            })
            .collect()
    }
}

/// The persisted prompt document: object id -> prompt, in annotation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptFile {
    objects: IndexMap<String, ObjectPrompt>,
}

impl PromptFile {
    pub fn from_set(set: &AnnotationSet) -> Self {
        Self {
            objects: set
                .iter()
                .map(|(name, points)| (name.to_string(), ObjectPrompt::from_points(points)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, object_id: &str) -> Option<&ObjectPrompt> {
        self.objects.get(object_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectPrompt)> {
        self.objects
            .iter()
            .map(|(name, prompt)| (name.as_str(), prompt))
    }

    pub fn insert(&mut self, object_id: &str, prompt: ObjectPrompt) {
        self.objects.insert(object_id.to_string(), prompt);
    }

    /// Checks every object is well formed and rebuilds the annotation set.
    pub fn to_set(&self) -> Result<AnnotationSet, AppError> {
        let mut objects = IndexMap::with_capacity(self.objects.len());
        for (name, prompt) in &self.objects {
            let points = prompt.to_points().map_err(|e| match e {
                AppError::InvalidPrompt(msg) => {
                    AppError::InvalidPrompt(format!("object '{}': {}", name, msg))
                }
                other => other,
            })?;
            objects.insert(name.clone(), points);
        }
        Ok(AnnotationSet::from_objects(objects))
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let prompts: PromptFile = serde_json::from_str(json)?;
        prompts.to_set()?;
        Ok(prompts)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        fs::write(path, self.to_json()?)?;
        info!("Saved {} object prompt(s) to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let json = fs::read_to_string(path)?;
        let prompts = Self::from_json(&json)?;
        info!("Loaded {} object prompt(s) from {}", prompts.len(), path.display());
        Ok(prompts)
    }
}
