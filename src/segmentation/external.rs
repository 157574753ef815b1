use std::fs;
use std::io::{self, BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use image::GrayImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{Device, ModelVariant};
use super::predictor::{FrameMasks, MaskStream, VideoPredictor};
use crate::annotation::{ObjectPrompt, PromptFile};
use crate::config::PredictorSettings;
use crate::error::AppError;

const PROMPTS_FILE: &str = "prompts.json";
const MASKS_DIR: &str = "masks";
const EXIT_POLL: Duration = Duration::from_millis(20);

/// Runs the segmentation model as a helper process.
///
/// The helper is called as
/// `<program> <args..> --model <id> --device <dev> --frames <dir> --prompts <json> --output <dir>`.
/// For every propagated frame it writes one grayscale PNG per object to
/// `<output>/<frame:05>/<object position>.png` and then prints the frame index on its
/// own stdout line. Cancelling the propagation kills the helper.
#[derive(Debug, Clone)]
pub struct ExternalPredictor {
    program: PathBuf,
    args: Vec<String>,
    model: ModelVariant,
    device: Device,
    work_root: PathBuf,
}

pub struct ExternalSession {
    frames_dir: PathBuf,
    prompts: PromptFile,
}

impl ExternalPredictor {
    pub fn new(settings: &PredictorSettings, model: ModelVariant, device: Device) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            model,
            device,
            work_root: std::env::temp_dir(),
        }
    }

    /// Directory under which per-run scratch folders are created.
    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }

    fn command(&self, frames_dir: &Path, prompts: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--model")
            .arg(self.model.model_id())
            .arg("--device")
            .arg(self.device.as_str())
            .arg("--frames")
            .arg(frames_dir)
            .arg("--prompts")
            .arg(prompts)
            .arg("--output")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn tool_name(&self) -> String {
        self.program
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl VideoPredictor for ExternalPredictor {
    type Session = ExternalSession;

    fn init(&self, frames_dir: &Path) -> Result<Self::Session, AppError> {
        if !frames_dir.is_dir() {
            return Err(AppError::MissingInput("Input frames directory"));
        }
        Ok(ExternalSession {
            frames_dir: frames_dir.to_path_buf(),
            prompts: PromptFile::default(),
        })
    }

    fn add_prompt(
        &self,
        session: &mut Self::Session,
        frame_index: usize,
        object_id: &str,
        prompt: &ObjectPrompt,
    ) -> Result<(), AppError> {
        if frame_index != 0 {
            return Err(AppError::Predictor(format!(
                "prompts are only accepted on the first frame, got frame {}",
                frame_index
            )));
        }
        session.prompts.insert(object_id, prompt.clone());
        Ok(())
    }

    fn propagate(
        &self,
        session: Self::Session,
        cancel: &CancellationToken,
    ) -> Result<MaskStream, AppError> {
        if session.prompts.is_empty() {
            return Err(AppError::MissingInput("Object prompts"));
        }

        let work_dir = self.work_root.join(format!("meltseg-{}", Uuid::new_v4()));
        let masks_dir = work_dir.join(MASKS_DIR);
        fs::create_dir_all(&masks_dir)?;
        let prompts_path = work_dir.join(PROMPTS_FILE);
        session.prompts.save(&prompts_path)?;

        let mut command = self.command(&session.frames_dir, &prompts_path, &masks_dir);
        info!(
            "Starting predictor {} ({} on {})",
            self.program.display(),
            self.model.model_id(),
            self.device
        );
        debug!("Running {:?}", command);

        let tool = self.tool_name();
        let mut child = command.spawn().map_err(|source| AppError::ToolSpawn {
            tool: tool.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Predictor("predictor stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Predictor("predictor stderr unavailable".to_string()))?;
        // Drained on its own thread so progress output cannot fill the pipe and stall the child.
        let stderr_reader = std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        });

        let child = Arc::new(Mutex::new(child));
        let halt = cancel.child_token();
        spawn_killer(child.clone(), halt.clone(), tool.clone());

        Ok(Box::new(ExternalMaskStream {
            tool,
            child,
            halt,
            lines: BufReader::new(stdout).lines(),
            stderr_reader: Some(stderr_reader),
            object_ids: session.prompts.iter().map(|(id, _)| id.to_string()).collect(),
            masks_dir,
            work_dir,
            finished: false,
        }))
    }
}

/// Kills the helper once `halt` fires, unless it has already exited. The stream fires
/// `halt` itself when it is done, which releases this thread.
fn spawn_killer(child: Arc<Mutex<Child>>, halt: CancellationToken, tool: String) {
    std::thread::spawn(move || {
        futures::executor::block_on(halt.cancelled());
        let Ok(mut child) = child.lock() else {
            return;
        };
        if matches!(child.try_wait(), Ok(None)) {
            info!("Stopping {}", tool);
            let _ = child.kill();
        }
    });
}

struct ExternalMaskStream {
    tool: String,
    child: Arc<Mutex<Child>>,
    halt: CancellationToken,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_reader: Option<JoinHandle<String>>,
    object_ids: Vec<String>,
    masks_dir: PathBuf,
    work_dir: PathBuf,
    finished: bool,
}

impl ExternalMaskStream {
    /// Loads every object's mask for a frame. An object the helper left out gets an empty
    /// mask so palette positions stay the same on every frame.
    fn load_frame(&self, frame_index: usize) -> Result<FrameMasks, AppError> {
        let frame_dir = self.masks_dir.join(format!("{:05}", frame_index));
        let mut loaded = Vec::with_capacity(self.object_ids.len());
        for (position, object_id) in self.object_ids.iter().enumerate() {
            let path = frame_dir.join(format!("{}.png", position));
            if path.is_file() {
                loaded.push(Some(image::open(&path)?.to_luma8()));
            } else {
                debug!("No mask for '{}' on frame {}", object_id, frame_index);
                loaded.push(None);
            }
        }

        let mut frame = FrameMasks::new(frame_index);
        let Some((width, height)) = loaded.iter().flatten().next().map(|m| m.dimensions()) else {
            return Ok(frame);
        };
        for (object_id, mask) in self.object_ids.iter().zip(loaded) {
            let mask = mask.unwrap_or_else(|| GrayImage::new(width, height));
            frame.masks.insert(object_id.clone(), mask);
        }
        Ok(frame)
    }

    fn lock_child(&self) -> io::Result<MutexGuard<'_, Child>> {
        self.child
            .lock()
            .map_err(|_| io::Error::other("predictor process handle poisoned"))
    }

    /// Polls so the killer thread can take the lock while the helper is still running.
    fn wait_child(&self) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.lock_child()?.try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(EXIT_POLL);
        }
    }

    fn finish(&mut self) -> Result<(), AppError> {
        self.finished = true;
        let status = self.wait_child();
        let cancelled = self.halt.is_cancelled();
        self.halt.cancel();
        let status = status?;
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        if cancelled {
            return Err(AppError::Cancelled);
        }
        Err(AppError::ToolFailed {
            tool: self.tool.clone(),
            status,
            stderr: stderr.trim().to_string(),
        })
    }

    fn stop_child(&mut self) {
        self.finished = true;
        self.halt.cancel();
        if let Ok(mut child) = self.lock_child() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn fail(&mut self, error: AppError) -> Option<Result<FrameMasks, AppError>> {
        self.stop_child();
        Some(Err(error))
    }
}

impl Iterator for ExternalMaskStream {
    type Item = Result<FrameMasks, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let frame_index = match line.parse::<usize>() {
                        Ok(index) => index,
                        Err(_) => {
                            return self.fail(AppError::Predictor(format!(
                                "unexpected predictor output '{}'",
                                line
                            )))
                        }
                    };
                    return match self.load_frame(frame_index) {
                        Ok(frame) => Some(Ok(frame)),
                        Err(e) => self.fail(e),
                    };
                }
                Some(Err(e)) => return self.fail(e.into()),
                None => {
                    return match self.finish() {
                        Ok(()) => None,
                        Err(e) => Some(Err(e)),
                    }
                }
            }
        }
    }
}

impl Drop for ExternalMaskStream {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Predictor stream dropped early, stopping {}", self.tool);
            self.stop_child();
        }
        self.halt.cancel();
        if let Err(e) = fs::remove_dir_all(&self.work_dir) {
            debug!("Could not remove {}: {}", self.work_dir.display(), e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_mask(path: &Path, lit: &[(u32, u32)]) {
        let mut mask = GrayImage::new(4, 4);
        for &(x, y) in lit {
            mask.put_pixel(x, y, Luma([255]));
        }
        mask.save(path).unwrap();
    }

    fn prompt() -> ObjectPrompt {
        ObjectPrompt {
            coordinates: vec![[1, 1]],
            labels: vec![1],
        }
    }

    fn predictor(script: &str, work_root: &Path) -> ExternalPredictor {
        let settings = PredictorSettings {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string(), "sam2-propagate".to_string()],
        };
        ExternalPredictor::new(&settings, ModelVariant::Tiny, Device::Cpu).with_work_root(work_root)
    }

    #[test]
    fn streams_masks_per_announced_frame() {
        let fixtures = tempfile::tempdir().unwrap();
        write_mask(&fixtures.path().join("pool.png"), &[(0, 0)]);
        write_mask(&fixtures.path().join("arc.png"), &[(3, 3)]);
        let frames = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();

        // $2 = model id, $8 = prompts file, ${10} = output dir
        let script = format!(
            "test \"$2\" = facebook/sam2.1-hiera-tiny || exit 3\n\
             test -f \"$8\" || exit 4\n\
             out=\"${{10}}\"\n\
             mkdir -p \"$out/00000\" \"$out/00001\"\n\
             cp {fx}/pool.png \"$out/00000/0.png\"; cp {fx}/arc.png \"$out/00000/1.png\"; echo 0\n\
             cp {fx}/arc.png \"$out/00001/1.png\"; echo 1\n",
            fx = fixtures.path().display()
        );
        let predictor = predictor(&script, work.path());

        let mut session = predictor.init(frames.path()).unwrap();
        predictor.add_prompt(&mut session, 0, "pool", &prompt()).unwrap();
        predictor.add_prompt(&mut session, 0, "arc", &prompt()).unwrap();

        let frames: Vec<FrameMasks> = predictor
            .propagate(session, &CancellationToken::new())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_index, 0);
        assert_eq!(frames[0].masks.keys().collect::<Vec<_>>(), vec!["pool", "arc"]);
        assert_eq!(frames[0].masks["arc"].get_pixel(3, 3), &Luma([255]));

        // "pool" has no mask on frame 1 but keeps its slot, so "arc" keeps its colour
        assert_eq!(frames[1].masks.keys().collect::<Vec<_>>(), vec!["pool", "arc"]);
        assert!(frames[1].masks["pool"].pixels().all(|p| p.0[0] == 0));
        assert_eq!(frames[1].masks["pool"].dimensions(), (4, 4));
        assert_eq!(frames[1].masks["arc"].get_pixel(3, 3), &Luma([255]));

        // scratch folder is removed once the stream is dropped
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn helper_failure_surfaces_stderr() {
        let frames = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let predictor = predictor("echo 'CUDA out of memory' >&2; exit 1", work.path());

        let mut session = predictor.init(frames.path()).unwrap();
        predictor.add_prompt(&mut session, 0, "pool", &prompt()).unwrap();
        let results: Vec<_> = predictor
            .propagate(session, &CancellationToken::new())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(AppError::ToolFailed { stderr, .. }) => assert_eq!(stderr, "CUDA out of memory"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_prompts_off_the_first_frame_and_empty_sessions() {
        let frames = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let predictor = predictor("true", work.path());

        let mut session = predictor.init(frames.path()).unwrap();
        assert!(predictor.add_prompt(&mut session, 3, "pool", &prompt()).is_err());
        assert!(matches!(
            predictor.propagate(session, &CancellationToken::new()),
            Err(AppError::MissingInput(_))
        ));
        assert!(predictor.init(&frames.path().join("missing")).is_err());
    }

    #[test]
    fn cancelling_kills_a_silent_helper() {
        let frames = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let predictor = predictor("exec sleep 30", work.path());

        let mut session = predictor.init(frames.path()).unwrap();
        predictor.add_prompt(&mut session, 0, "pool", &prompt()).unwrap();
        let cancel = CancellationToken::new();
        let mut stream = predictor.propagate(session, &cancel).unwrap();

        let canceller = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        assert!(matches!(stream.next(), Some(Err(AppError::Cancelled))));
        assert!(stream.next().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
