pub mod encode;
pub mod extract;
pub mod frames;
pub mod probe;
pub mod tool;

pub use encode::{EncodeRequest, VideoEncoder};
pub use extract::{prepare_output_dir, ExtractionRequest, FrameExtractor};
pub use frames::{frame_file_name, FrameFile, FrameSequence};
pub use probe::{fps_options, parse_rate};
pub use tool::ExternalTool;
