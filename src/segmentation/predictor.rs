use std::path::Path;

use image::GrayImage;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::annotation::ObjectPrompt;
use crate::error::AppError;

/// Binary masks of every tracked object on one frame. A nonzero pixel is inside the mask.
#[derive(Debug, Clone)]
pub struct FrameMasks {
    pub frame_index: usize,
    pub masks: IndexMap<String, GrayImage>,
}

impl FrameMasks {
    pub fn new(frame_index: usize) -> Self {
        Self {
            frame_index,
            masks: IndexMap::new(),
        }
    }

    pub fn with_mask(mut self, object_id: &str, mask: GrayImage) -> Self {
        self.masks.insert(object_id.to_string(), mask);
        self
    }
}

/// Lazily produced per-frame masks, one item per frame in increasing frame order.
pub type MaskStream = Box<dyn Iterator<Item = Result<FrameMasks, AppError>> + Send>;

/// A pretrained video object segmentation model, seen from the outside.
///
/// A session is initialised on a frame directory, receives point prompts per object,
/// and is consumed by `propagate`, so a propagation cannot be restarted. Once `cancel`
/// fires the stream should end promptly, even while it is waiting on the model.
pub trait VideoPredictor: Send + Sync {
    type Session: Send;

    fn init(&self, frames_dir: &Path) -> Result<Self::Session, AppError>;

    fn add_prompt(
        &self,
        session: &mut Self::Session,
        frame_index: usize,
        object_id: &str,
        prompt: &ObjectPrompt,
    ) -> Result<(), AppError>;

    fn propagate(
        &self,
        session: Self::Session,
        cancel: &CancellationToken,
    ) -> Result<MaskStream, AppError>;
}

/// Rejects streams whose frame indices do not strictly increase.
pub struct Monotonic {
    inner: MaskStream,
    last: Option<usize>,
    failed: bool,
}

impl Monotonic {
    pub fn new(inner: MaskStream) -> Self {
        Self {
            inner,
            last: None,
            failed: false,
        }
    }
}

impl Iterator for Monotonic {
    type Item = Result<FrameMasks, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        if self.last.is_some_and(|last| frame.frame_index <= last) {
            self.failed = true;
            return Some(Err(AppError::Predictor(format!(
                "frame {} arrived after frame {}",
                frame.frame_index,
                self.last.unwrap_or_default()
            ))));
        }
        self.last = Some(frame.frame_index);
        Some(Ok(frame))
    }
}
