use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::AppError;

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "JPG", "JPEG"];

/// ffmpeg output pattern for extracted frames: `00000.jpg`, `00001.jpg`, ...
pub const FRAME_PATTERN: &str = "%05d.jpg";

pub fn frame_file_name(index: usize) -> String {
    format!("{:05}.jpg", index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFile {
    pub index: usize,
    pub path: PathBuf,
}

/// The numbered still images of one frame directory, ordered by index.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    dir: PathBuf,
    frames: Vec<FrameFile>,
}

impl FrameSequence {
    /// Collects JPEG files whose stem is an integer. Anything else is ignored.
    pub fn scan(dir: &Path) -> Result<Self, AppError> {
        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext));
            if !is_frame {
                continue;
            }

            match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<usize>().ok())
            {
                Some(index) => frames.push(FrameFile { index, path }),
                None => warn!("Skipping non-numbered frame {}", path.display()),
            }
        }
        frames.sort_by_key(|frame| frame.index);

        let sequence = Self {
            dir: dir.to_path_buf(),
            frames,
        };
        let gaps = sequence.gaps();
        if !gaps.is_empty() {
            warn!(
                "Frame directory {} is missing {} frame index(es), first missing {}",
                dir.display(),
                gaps.len(),
                gaps[0]
            );
        }
        Ok(sequence)
    }

    /// Like `scan`, but an empty directory is an error.
    pub fn scan_non_empty(dir: &Path) -> Result<Self, AppError> {
        let sequence = Self::scan(dir)?;
        if sequence.is_empty() {
            return Err(AppError::EmptyFrameDirectory(dir.to_path_buf()));
        }
        Ok(sequence)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameFile] {
        &self.frames
    }

    /// The frame that gets annotated.
    pub fn first(&self) -> Option<&FrameFile> {
        self.frames.first()
    }

    /// Looks up a frame by its position in the sequence.
    pub fn get(&self, position: usize) -> Option<&FrameFile> {
        self.frames.get(position)
    }

    /// Indices missing from `0..=max_index`.
    pub fn gaps(&self) -> Vec<usize> {
        let mut gaps = Vec::new();
        let mut expected = 0;
        for frame in &self.frames {
            while expected < frame.index {
                gaps.push(expected);
                expected += 1;
            }
            expected = frame.index + 1;
        }
        gaps
    }
}
