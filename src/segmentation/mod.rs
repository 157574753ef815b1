pub mod external;
pub mod model;
pub mod orchestrator;
pub mod overlay;
pub mod predictor;

pub use external::ExternalPredictor;
pub use model::{Device, DeviceChoice, ModelVariant};
pub use orchestrator::{SegmentationOrchestrator, SegmentationReport, SegmentationRequest};
pub use overlay::{composite, masked_frame_file_name, MaskOverlayService, MASK_PALETTE};
pub use predictor::{FrameMasks, MaskStream, Monotonic, VideoPredictor};
