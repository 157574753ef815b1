use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::annotation::PromptFile;
use crate::app::WorkflowApp;
use crate::config::Settings;
use crate::error::AppError;
use crate::segmentation::{DeviceChoice, ModelVariant, SegmentationOrchestrator, SegmentationRequest};
use crate::task::{TaskHandle, TaskPoll};
use crate::video::{prepare_output_dir, ExtractionRequest, FrameExtractor, FrameSequence};

#[derive(Debug, Parser)]
#[command(name = "meltseg", version, about = "Weld pool video segmentation workflow")]
pub struct Cli {
    /// Settings file, defaults to ./meltseg.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the desktop workflow (default)
    Gui {
        /// Skip extraction and annotate the frames already in this folder
        #[arg(long)]
        frames: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        fps: u32,
    },
    /// Print the source frame rate and the output rates on offer
    Probe {
        #[arg(long)]
        video: PathBuf,
    },
    /// Sample a video into numbered JPEG frames
    Extract {
        #[arg(long)]
        video: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Output frame rate, defaults to the highest whole rate of the source
        #[arg(long)]
        fps: Option<u32>,
        /// Create the output folder without asking
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// List the points stored in a prompt file
    Points { prompts: PathBuf },
    /// Segment extracted frames from a prompt file and encode the masked video
    Segment {
        #[arg(long)]
        frames: PathBuf,
        #[arg(long)]
        prompts: PathBuf,
        #[arg(long)]
        masked_dir: PathBuf,
        /// Encoded result, omitted to keep only the masked frames
        #[arg(long)]
        video_out: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        fps: u32,
        #[arg(long)]
        model: Option<ModelVariant>,
        #[arg(long)]
        device: Option<DeviceChoice>,
    },
}

pub async fn run(cli: Cli, settings: Settings) -> Result<(), AppError> {
    let command = cli.command.unwrap_or(Command::Gui {
        frames: None,
        fps: 1,
    });

    match command {
        Command::Gui { frames, fps } => {
            let frames = match frames {
                Some(dir) => Some((FrameSequence::scan_non_empty(&dir)?, fps)),
                None => None,
            };
            WorkflowApp::start_gui(&settings, frames)
        }
        Command::Probe { video } => {
            let extractor = FrameExtractor::from_settings(&settings);
            let (source_fps, options) = extractor
                .fps_choices(&video, &CancellationToken::new())
                .await?;
            println!("Source FPS: {:.3}", source_fps);
            println!("Output FPS options: {:?}", options);
            Ok(())
        }
        Command::Extract {
            video,
            output,
            fps,
            yes,
        } => extract(&settings, video, output, fps, yes).await,
        Command::Points { prompts } => {
            let set = PromptFile::load(&prompts)?.to_set()?;
            match set.summary() {
                Some(summary) => print!("{}", summary),
                None => println!("No points annotated yet."),
            }
            Ok(())
        }
        Command::Segment {
            frames,
            prompts,
            masked_dir,
            video_out,
            fps,
            model,
            device,
        } => {
            let request = SegmentationRequest {
                frames_dir: frames,
                prompts: PromptFile::load(&prompts)?,
                masked_dir,
                output_video: video_out,
                fps,
            };
            let model = model.unwrap_or(settings.segmentation.model);
            let device = device.unwrap_or(settings.segmentation.device);

            let handle = TaskHandle::spawn("Segmentation", move |cancel, progress| async move {
                let orchestrator =
                    SegmentationOrchestrator::external(&settings, model, device).await?;
                orchestrator.run(request, cancel, progress).await
            });
            let report = wait_with_progress(handle).await?;
            println!(
                "Wrote {} masked frame(s) to {}",
                report.frames_written,
                report.masked_dir.display()
            );
            if let Some(video) = report.video {
                println!("Video created successfully: {}", video.display());
            }
            Ok(())
        }
    }
}

async fn extract(
    settings: &Settings,
    video: PathBuf,
    output: PathBuf,
    fps: Option<u32>,
    yes: bool,
) -> Result<(), AppError> {
    let extractor = FrameExtractor::from_settings(settings);
    let fps = match fps {
        Some(fps) => fps,
        None => {
            let (source_fps, options) = extractor
                .fps_choices(&video, &CancellationToken::new())
                .await?;
            let fps = options.first().copied().unwrap_or(1);
            info!("Source FPS {:.3}, extracting at {}", source_fps, fps);
            fps
        }
    };

    if !prepare_output_dir(&output, |_| yes)? {
        warn!(
            "Output folder {} does not exist, pass --yes to create it",
            output.display()
        );
        return Err(AppError::MissingInput("Output folder"));
    }

    let request = ExtractionRequest {
        video,
        output_dir: output,
        fps,
    };
    let handle = TaskHandle::spawn("Frame extraction", move |cancel, _progress| async move {
        extractor.extract(&request, &cancel).await
    });
    let frames = wait_with_progress(handle).await?;
    println!(
        "Frames extracted successfully: {} frame(s) in {}",
        frames.len(),
        frames.dir().display()
    );
    Ok(())
}

/// Awaits a task, logging its progress and cancelling it on Ctrl-C.
async fn wait_with_progress<T: Send + 'static>(mut handle: TaskHandle<T>) -> Result<T, AppError> {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(500));
    let mut last_message = String::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling {}", handle.label());
                handle.cancel();
            }
            _ = ticker.tick() => {}
        }

        if let Some(progress) = handle.progress() {
            if progress.message != last_message {
                info!("{}", progress.message);
                last_message = progress.message.clone();
            }
        }
        if let TaskPoll::Finished(result) = handle.try_finish() {
            return result;
        }
    }
}
