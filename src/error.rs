use std::io;
use std::path::PathBuf;

/// Failure taxonomy for a recording cycle. Everything here propagates out of
/// [`crate::WindowRecorder::stop`]; the only swallowed condition is a
/// destination file that did not exist during overwrite cleanup.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    /// API called in the wrong lifecycle state; a caller bug, never retried.
    #[error("recorder state violation: {0}")]
    StateViolation(&'static str),

    /// No capture session directory matched the expected prefix.
    #[error("no capture session directory matching {prefix:?} under {}", base.display())]
    SessionNotFound { base: PathBuf, prefix: String },

    /// Two session directories share the most recent mtime; refusing to pick
    /// one arbitrarily.
    #[error("ambiguous capture sessions with identical mtime: {} and {}", first.display(), second.display())]
    SessionAmbiguous { first: PathBuf, second: PathBuf },

    /// The frame flush never quiesced within the configured bound.
    #[error("capture session {} still flushing after {waited_ms}ms", dir.display())]
    FlushTimeout { dir: PathBuf, waited_ms: u64 },

    /// A file in the session directory does not follow
    /// `frame-<seq>-<offsetMs>.<ext>`.
    #[error("unexpected frame store content: {filename:?}")]
    MalformedFrame { filename: String },

    /// The session directory contained no frames at all.
    #[error("capture session {} contains no frames", dir.display())]
    EmptyCapture { dir: PathBuf },

    /// An external encoder invocation failed or left no output behind.
    #[error("{tool} failed: {detail}")]
    ToolFailure { tool: String, detail: String },

    /// A pre-existing destination file could not be removed.
    #[error("unable to remove stale destination {}", destination.display())]
    DestinationCleanup {
        destination: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The browser driver rejected a context switch or script.
    #[error("browser driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
