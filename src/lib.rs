pub mod assembler;
pub mod config;
pub mod driver;
pub mod error;
pub mod frames;
pub mod session;

use std::{io, mem, path::Path};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::assembler::{FfmpegTool, VideoTool};
use crate::config::RecorderSettings;
use crate::driver::BrowserDriver;
use crate::error::RecordingError;

enum RecorderState {
    Idle,
    Recording {
        // Scratch space for the duration of one capture cycle; removed on
        // drop.
        _scratch: TempDir,
    },
}

/// Drives one browser's window-recording cycle: toggle capture, wait for the
/// frame flush, sequence the dump, and assemble the final video.
///
/// One logical session per instance, `Idle → Recording → Idle`. A host may
/// run several recorders concurrently across browser sessions as long as
/// each browser writes its dumps into its own `base_dir`; within an instance
/// every stage runs strictly sequentially.
pub struct WindowRecorder<D, T> {
    driver: D,
    tool: T,
    settings: RecorderSettings,
    state: RecorderState,
}

impl<D: BrowserDriver> WindowRecorder<D, FfmpegTool> {
    /// Recorder backed by the real `ffmpeg`/`mp4fpsmod` binaries.
    pub fn with_ffmpeg(driver: D, settings: RecorderSettings) -> Result<Self, RecordingError> {
        let tool = FfmpegTool::locate(&settings.tools)?;
        Ok(Self::new(driver, tool, settings))
    }
}

impl<D: BrowserDriver, T: VideoTool> WindowRecorder<D, T> {
    pub fn new(driver: D, tool: T, settings: RecorderSettings) -> Self {
        Self {
            driver,
            tool,
            settings,
            state: RecorderState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    /// Begin a capture cycle. The browser starts dumping frames into a new
    /// session directory under `base_dir` as a side effect of its
    /// compositor.
    pub async fn start(&mut self) -> Result<(), RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::StateViolation(
                "start() called while a recording is in progress",
            ));
        }
        debug!("starting window recorder");
        let scratch = tempfile::Builder::new()
            .prefix("pagereel-")
            .tempdir()?;
        driver::set_window_recording(&mut self.driver, true).await?;
        self.state = RecorderState::Recording { _scratch: scratch };
        Ok(())
    }

    /// End the capture cycle and assemble the video at `destination`.
    ///
    /// The session is consumed whether or not assembly succeeds; the
    /// recorder is back in `Idle` either way and a retry takes a fresh
    /// start/stop cycle.
    pub async fn stop(&mut self, destination: &Path) -> Result<(), RecordingError> {
        self.consume_session("stop() called while idle")?;
        debug!(destination = %destination.display(), "stopping window recorder");

        driver::set_window_recording(&mut self.driver, false).await?;
        remove_stale_destination(destination)?;

        let session_dir =
            session::find_session_dir(&self.settings.base_dir, &self.settings.session_prefix)?;
        session::wait_until_flushed(&session_dir, &self.settings.poll).await?;
        let frames = frames::sequence_frames(&session_dir)?;
        assembler::assemble(&self.tool, &session_dir, &frames, destination).await?;

        info!(
            destination = %destination.display(),
            frames = frames.len(),
            "recording written"
        );
        Ok(())
    }

    /// Abandon the capture cycle without producing a video: capture is
    /// disabled and the dumped session directory, if any, is discarded.
    /// Intended for caller-driven timeouts around a hung browser.
    pub async fn cancel(&mut self) -> Result<(), RecordingError> {
        self.consume_session("cancel() called while idle")?;
        debug!("cancelling window recorder");

        driver::set_window_recording(&mut self.driver, false).await?;
        match session::find_session_dir(&self.settings.base_dir, &self.settings.session_prefix) {
            Ok(dir) => {
                if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                    warn!(
                        session = %dir.display(),
                        error = %err,
                        "failed to discard cancelled capture session"
                    );
                }
            }
            Err(RecordingError::SessionNotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Leave `Recording` unconditionally; the session cannot be reused.
    fn consume_session(&mut self, violation: &'static str) -> Result<(), RecordingError> {
        match mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Recording { .. } => Ok(()),
            RecorderState::Idle => Err(RecordingError::StateViolation(violation)),
        }
    }
}

/// Remove a pre-existing file at the destination so the remux cannot collide
/// with stale output. A missing file is the normal case, not an error.
fn remove_stale_destination(destination: &Path) -> Result<(), RecordingError> {
    match std::fs::remove_file(destination) {
        Ok(()) => {
            debug!(destination = %destination.display(), "removed stale destination");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RecordingError::DestinationCleanup {
            destination: destination.to_path_buf(),
            source: err,
        }),
    }
}
