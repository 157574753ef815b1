pub mod events;
pub mod point;
pub mod prompt;
pub mod render;
pub mod session;
pub mod store;

pub use events::{AnnotationEvent, AnnotationObserver, TracingObserver, UnsavedChanges};
pub use point::{Label, Point};
pub use prompt::{ObjectPrompt, PromptFile};
pub use render::{Marker, MarkerColor, MarkerShape};
pub use session::{AnnotationSession, DEFAULT_OBJECT_NAME};
pub use store::{AnnotationSet, RemovedPoint};
