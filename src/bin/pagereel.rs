use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use pagereel::assembler::{self, FfmpegTool};
use pagereel::config::{RecorderSettings, default_config_path};
use pagereel::{frames, session};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Assemble a variable-frame-rate video from a browser window-recording
/// frame dump.
#[derive(Parser, Debug)]
#[command(name = "pagereel", version, about = "Assemble a window-recording frame dump into a video", long_about = None)]
struct Args {
    /// Final video path. Any pre-existing file there is replaced.
    #[arg(long)]
    output: PathBuf,

    /// Session directory holding the frame dump. When omitted, the most
    /// recent matching directory under the configured base directory is
    /// used.
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Override the base directory scanned for session directories.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Skip the flush-quiescence wait; only safe when the browser has
    /// already exited.
    #[arg(long, action = ArgAction::SetTrue)]
    no_wait: bool,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Override the default recorder configuration path.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "pagereel=debug"
    } else {
        "pagereel=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut settings = RecorderSettings::load_or_default(&config_path)?;
    if let Some(base_dir) = args.base_dir {
        settings.base_dir = base_dir;
    }

    let session_dir = match args.session_dir {
        Some(dir) => dir,
        None => session::find_session_dir(&settings.base_dir, &settings.session_prefix)
            .context("No frame dump to assemble")?,
    };
    info!(session = %session_dir.display(), "assembling frame dump");

    if !args.no_wait {
        session::wait_until_flushed(&session_dir, &settings.poll).await?;
    }

    let frames = frames::sequence_frames(&session_dir)?;
    let tool = FfmpegTool::locate(&settings.tools)?;
    assembler::assemble(&tool, &session_dir, &frames, &args.output).await?;

    info!(
        destination = %args.output.display(),
        frames = frames.len(),
        "video written"
    );
    Ok(())
}
