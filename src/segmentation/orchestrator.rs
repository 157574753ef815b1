use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use super::external::ExternalPredictor;
use super::model::{Device, DeviceChoice, ModelVariant};
use super::overlay::{MaskOverlayService, MASKED_FRAME_PATTERN};
use super::predictor::{FrameMasks, Monotonic, VideoPredictor};
use crate::annotation::PromptFile;
use crate::config::{SegmentationSettings, Settings};
use crate::error::AppError;
use crate::task::ProgressSender;
use crate::video::{EncodeRequest, FrameSequence, VideoEncoder};

const MASK_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    pub frames_dir: PathBuf,
    pub prompts: PromptFile,
    pub masked_dir: PathBuf,
    /// Skipped when `None`, leaving only the masked frames.
    pub output_video: Option<PathBuf>,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationReport {
    pub frames_written: usize,
    pub masked_dir: PathBuf,
    pub video: Option<PathBuf>,
}

/// Drives prompt -> propagate -> overlay -> encode for one frame directory.
pub struct SegmentationOrchestrator<P: VideoPredictor> {
    predictor: Arc<P>,
    encoder: VideoEncoder,
    alpha: f32,
    jpeg_quality: u8,
}

impl SegmentationOrchestrator<ExternalPredictor> {
    /// Orchestrator backed by the predictor helper process. `auto` device selection is
    /// resolved here, off the async threads.
    pub async fn external(
        settings: &Settings,
        model: ModelVariant,
        device: DeviceChoice,
    ) -> Result<Self, AppError> {
        let device = tokio::task::spawn_blocking(move || Device::resolve(device))
            .await
            .map_err(|e| AppError::Predictor(format!("device probe failed: {}", e)))?;
        info!("Selected Model: {} ({})", model.display_name(), model.model_id());
        info!("Using device: {}", device);

        let predictor = ExternalPredictor::new(&settings.segmentation.predictor, model, device);
        Ok(Self::new(
            predictor,
            VideoEncoder::from_settings(settings),
            &settings.segmentation,
        ))
    }
}

impl<P> SegmentationOrchestrator<P>
where
    P: VideoPredictor + 'static,
{
    pub fn new(predictor: P, encoder: VideoEncoder, settings: &SegmentationSettings) -> Self {
        Self {
            predictor: Arc::new(predictor),
            encoder,
            alpha: settings.alpha,
            jpeg_quality: settings.jpeg_quality,
        }
    }

    pub async fn run(
        &self,
        request: SegmentationRequest,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> Result<SegmentationReport, AppError> {
        if request.prompts.is_empty() {
            return Err(AppError::MissingInput("Prompts"));
        }
        let frames = Arc::new(FrameSequence::scan_non_empty(&request.frames_dir)?);
        fs::create_dir_all(&request.masked_dir)?;

        info!("Selected Input Frames: {}", request.frames_dir.display());
        info!(
            "Segmenting {} frame(s) for {} object(s)",
            frames.len(),
            request.prompts.len()
        );

        let mut overlay = MaskOverlayService::new(
            frames.clone(),
            &request.masked_dir,
            self.alpha,
            self.jpeg_quality,
        );

        let (mask_tx, mut mask_rx) = mpsc::channel(MASK_CHANNEL_CAPACITY);
        let halt = cancel.child_token();
        let producer = self.spawn_predictor(
            request.frames_dir.clone(),
            request.prompts.clone(),
            mask_tx,
            halt.clone(),
            progress.clone(),
        );

        let total = frames.len();
        let mut frames_written = 0;
        let outcome: Result<(), AppError> = async {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    next = mask_rx.recv() => next,
                };
                let Some(masks) = next else {
                    return Ok(());
                };
                let masks = masks?;
                let frame_index = masks.frame_index;
                let path = overlay.ready().await?.call(masks).await?;
                frames_written += 1;
                debug!("Frame {} composited into {}", frame_index, path.display());
                progress.report(
                    format!("Masked frame {} of {}", frames_written, total),
                    Some(frames_written as f32 / total as f32),
                );
            }
        }
        .await;
        drop(mask_rx);

        // The predictor thread may be blocked on a silent model. Halting it kills the
        // helper and the thread winds down on its own, so it is not awaited here.
        if let Err(e) = outcome {
            halt.cancel();
            return Err(e);
        }
        if let Err(e) = producer.await {
            warn!("Predictor thread ended abnormally: {}", e);
        }
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        if frames_written < total {
            warn!(
                "Predictor produced {} of {} frame(s)",
                frames_written, total
            );
        }
        info!(
            "Segmented video frames saved to {}",
            request.masked_dir.display()
        );

        let video = match &request.output_video {
            Some(output) => {
                progress.report("Encoding video", None);
                let encode = EncodeRequest {
                    frames_dir: request.masked_dir.clone(),
                    pattern: MASKED_FRAME_PATTERN.to_string(),
                    output: output.clone(),
                    fps: request.fps,
                };
                Some(self.encoder.encode(&encode, &cancel).await?)
            }
            None => None,
        };

        Ok(SegmentationReport {
            frames_written,
            masked_dir: request.masked_dir,
            video,
        })
    }

    /// Runs the blocking predictor on its own thread, forwarding masks as they arrive.
    /// Stops when `halt` fires or when the receiving side goes away.
    fn spawn_predictor(
        &self,
        frames_dir: PathBuf,
        prompts: PromptFile,
        mask_tx: mpsc::Sender<Result<FrameMasks, AppError>>,
        halt: CancellationToken,
        progress: ProgressSender,
    ) -> tokio::task::JoinHandle<()> {
        let predictor = self.predictor.clone();
        tokio::task::spawn_blocking(move || {
            let stream = (|| {
                progress.report("Initialising predictor", None);
                let mut session = predictor.init(&frames_dir)?;
                for (object_id, prompt) in prompts.iter() {
                    info!(
                        "Processing object {}: {:?} {:?}",
                        object_id, prompt.coordinates, prompt.labels
                    );
                    predictor.add_prompt(&mut session, 0, object_id, prompt)?;
                }
                progress.report("Propagating masks", None);
                predictor.propagate(session, &halt)
            })();

            let stream = match stream {
                Ok(stream) => Monotonic::new(stream),
                Err(e) => {
                    let _ = mask_tx.blocking_send(Err(e));
                    return;
                }
            };

            for item in stream {
                if halt.is_cancelled() {
                    debug!("Propagation cancelled");
                    return;
                }
                let failed = item.is_err();
                if mask_tx.blocking_send(item).is_err() || failed {
                    return;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Label, Point, AnnotationSet};
    use crate::config::{EncodingSettings, SegmentationSettings};
    use crate::segmentation::MaskStream;
    use crate::video::{frame_file_name, ExternalTool};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::path::Path;
    use std::sync::Mutex;

    /// Marks the pixel under each object's first point on every frame.
    struct FakePredictor {
        calls: Mutex<Vec<String>>,
        fail_on_frame: Option<usize>,
    }

    struct FakeSession {
        frames: usize,
        size: (u32, u32),
        prompts: Vec<(String, [i32; 2])>,
    }

    impl FakePredictor {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on_frame: None,
            }
        }
    }

    impl VideoPredictor for FakePredictor {
        type Session = FakeSession;

        fn init(&self, frames_dir: &Path) -> Result<FakeSession, AppError> {
            self.calls.lock().unwrap().push("init".to_string());
            let frames = FrameSequence::scan_non_empty(frames_dir)?;
            let first = image::open(&frames.frames()[0].path)?;
            Ok(FakeSession {
                frames: frames.len(),
                size: (first.width(), first.height()),
                prompts: Vec::new(),
            })
        }

        fn add_prompt(
            &self,
            session: &mut FakeSession,
            frame_index: usize,
            object_id: &str,
            prompt: &crate::annotation::ObjectPrompt,
        ) -> Result<(), AppError> {
            assert_eq!(frame_index, 0);
            self.calls.lock().unwrap().push(format!("prompt {}", object_id));
            session.prompts.push((object_id.to_string(), prompt.coordinates[0]));
            Ok(())
        }

        fn propagate(
            &self,
            session: FakeSession,
            _cancel: &CancellationToken,
        ) -> Result<MaskStream, AppError> {
            self.calls.lock().unwrap().push("propagate".to_string());
            let fail_on_frame = self.fail_on_frame;
            Ok(Box::new((0..session.frames).map(move |index| {
                if Some(index) == fail_on_frame {
                    return Err(AppError::Predictor("model crashed".to_string()));
                }
                let mut frame = FrameMasks::new(index);
                for (object_id, [x, y]) in &session.prompts {
                    let mut mask = GrayImage::new(session.size.0, session.size.1);
                    mask.put_pixel(*x as u32, *y as u32, Luma([1]));
                    frame = frame.with_mask(object_id, mask);
                }
                Ok(frame)
            })))
        }
    }

    fn frames_dir(count: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..count {
            RgbImage::from_pixel(16, 16, Rgb([20, 20, 20]))
                .save(dir.path().join(frame_file_name(index)))
                .unwrap();
        }
        dir
    }

    fn prompts() -> PromptFile {
        let mut set = AnnotationSet::new();
        set.push_point("pool", Point::new(2, 2, Label::Positive));
        set.push_point("arc", Point::new(8, 8, Label::Positive));
        set.push_point("arc", Point::new(1, 14, Label::Negative));
        PromptFile::from_set(&set)
    }

    fn orchestrator(predictor: FakePredictor) -> SegmentationOrchestrator<FakePredictor> {
        let encoder = VideoEncoder::new(ExternalTool::new("ffmpeg"), EncodingSettings::default());
        SegmentationOrchestrator::new(predictor, encoder, &SegmentationSettings::default())
    }

    #[tokio::test]
    async fn writes_one_masked_frame_per_propagated_frame() {
        let frames = frames_dir(3);
        let out = tempfile::tempdir().unwrap();
        let masked_dir = out.path().join("masked");
        let orchestrator = orchestrator(FakePredictor::new());

        let report = orchestrator
            .run(
                SegmentationRequest {
                    frames_dir: frames.path().to_path_buf(),
                    prompts: prompts(),
                    masked_dir: masked_dir.clone(),
                    output_video: None,
                    fps: 3,
                },
                CancellationToken::new(),
                ProgressSender::detached(),
            )
            .await
            .unwrap();

        assert_eq!(report.frames_written, 3);
        assert!(report.video.is_none());
        for index in 0..3 {
            assert!(masked_dir.join(format!("masked_frame_{}.jpg", index)).is_file());
        }
        assert_eq!(
            *orchestrator.predictor.calls.lock().unwrap(),
            vec!["init", "prompt pool", "prompt arc", "propagate"]
        );
    }

    #[tokio::test]
    async fn predictor_error_aborts_without_cleanup() {
        let frames = frames_dir(4);
        let out = tempfile::tempdir().unwrap();
        let mut predictor = FakePredictor::new();
        predictor.fail_on_frame = Some(2);

        let err = orchestrator(predictor)
            .run(
                SegmentationRequest {
                    frames_dir: frames.path().to_path_buf(),
                    prompts: prompts(),
                    masked_dir: out.path().to_path_buf(),
                    output_video: Some(out.path().join("never.mp4")),
                    fps: 3,
                },
                CancellationToken::new(),
                ProgressSender::detached(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Predictor(_)));
        assert!(out.path().join("masked_frame_1.jpg").is_file());
        assert!(!out.path().join("never.mp4").exists());
    }

    #[tokio::test]
    async fn empty_prompts_stop_immediately() {
        let frames = frames_dir(1);
        let err = orchestrator(FakePredictor::new())
            .run(
                SegmentationRequest {
                    frames_dir: frames.path().to_path_buf(),
                    prompts: PromptFile::default(),
                    masked_dir: frames.path().join("masked"),
                    output_video: None,
                    fps: 1,
                },
                CancellationToken::new(),
                ProgressSender::detached(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingInput("Prompts")));
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancellation() {
        let frames = frames_dir(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator(FakePredictor::new())
            .run(
                SegmentationRequest {
                    frames_dir: frames.path().to_path_buf(),
                    prompts: prompts(),
                    masked_dir: frames.path().join("masked"),
                    output_video: None,
                    fps: 1,
                },
                cancel,
                ProgressSender::detached(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn encodes_masked_frames_when_output_requested() {
        let frames = frames_dir(2);
        let out = tempfile::tempdir().unwrap();
        let video = out.path().join("weld_masked.mp4");
        let script = format!(": > \"{}\"", video.display());
        let ffmpeg = ExternalTool::new("sh").with_leading_args(["-c".to_string(), script, "ffmpeg".to_string()]);
        let orchestrator = SegmentationOrchestrator::new(
            FakePredictor::new(),
            VideoEncoder::new(ffmpeg, EncodingSettings::default()),
            &SegmentationSettings::default(),
        );

        let report = orchestrator
            .run(
                SegmentationRequest {
                    frames_dir: frames.path().to_path_buf(),
                    prompts: prompts(),
                    masked_dir: out.path().join("masked"),
                    output_video: Some(video.clone()),
                    fps: 2,
                },
                CancellationToken::new(),
                ProgressSender::detached(),
            )
            .await
            .unwrap();
        assert_eq!(report.video, Some(video.clone()));
        assert!(video.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_during_propagation_returns_without_waiting_for_the_model() {
        let frames = frames_dir(2);
        let work = tempfile::tempdir().unwrap();
        let settings = crate::config::PredictorSettings {
            program: PathBuf::from("sh"),
            args: vec![
                "-c".to_string(),
                "sleep 3; exit 0".to_string(),
                "sam2-propagate".to_string(),
            ],
        };
        let predictor = ExternalPredictor::new(&settings, ModelVariant::Tiny, Device::Cpu)
            .with_work_root(work.path());
        let orchestrator = SegmentationOrchestrator::new(
            predictor,
            VideoEncoder::new(ExternalTool::new("ffmpeg"), EncodingSettings::default()),
            &SegmentationSettings::default(),
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = orchestrator
            .run(
                SegmentationRequest {
                    frames_dir: frames.path().to_path_buf(),
                    prompts: prompts(),
                    masked_dir: frames.path().join("masked"),
                    output_video: None,
                    fps: 1,
                },
                cancel,
                ProgressSender::detached(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}
