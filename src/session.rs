use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::config::PollSettings;
use crate::error::RecordingError;

/// Pick the authoritative capture session: the matching directory with the
/// most recent mtime. The browser creates one directory per capture, so
/// under normal operation the newest one belongs to the cycle being stopped.
pub fn find_session_dir(base: &Path, prefix: &str) -> Result<PathBuf, RecordingError> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(prefix) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }
        candidates.push((entry.path(), metadata.modified()?));
    }

    let directory = select_latest(candidates, base, prefix)?;
    debug!(directory = %directory.display(), "using window recording directory");
    Ok(directory)
}

/// Two directories tied on the most recent mtime cannot be told apart, so
/// discovery fails rather than picking one arbitrarily.
fn select_latest(
    candidates: Vec<(PathBuf, SystemTime)>,
    base: &Path,
    prefix: &str,
) -> Result<PathBuf, RecordingError> {
    let mut best: Option<(PathBuf, SystemTime)> = None;
    let mut tied_with: Option<PathBuf> = None;

    for (path, modified) in candidates {
        match best.as_ref().map(|(_, best_modified)| *best_modified) {
            None => best = Some((path, modified)),
            Some(best_modified) if modified > best_modified => {
                best = Some((path, modified));
                tied_with = None;
            }
            Some(best_modified) if modified == best_modified => {
                tied_with = Some(path);
            }
            Some(_) => {}
        }
    }

    match (best, tied_with) {
        (Some((path, _)), None) => Ok(path),
        (Some((first, _)), Some(second)) => {
            Err(RecordingError::SessionAmbiguous { first, second })
        }
        (None, _) => Err(RecordingError::SessionNotFound {
            base: base.to_path_buf(),
            prefix: prefix.to_string(),
        }),
    }
}

/// Wait until the browser has finished flushing frames into `dir`.
///
/// Frame writing continues briefly after the disable command returns; two
/// consecutive identical directory mtime samples are treated as flush
/// completion. Exceeding the configured bound is a distinct timeout failure
/// so a crashed browser cannot block a stop() forever.
pub async fn wait_until_flushed(dir: &Path, poll: &PollSettings) -> Result<(), RecordingError> {
    let target = dir.to_path_buf();
    wait_for_quiescence(
        dir,
        move || Ok(fs::metadata(&target)?.modified()?),
        poll,
    )
    .await
}

/// Quiescence loop over an injectable mtime sampler.
pub(crate) async fn wait_for_quiescence<S>(
    dir: &Path,
    mut sample: S,
    poll: &PollSettings,
) -> Result<(), RecordingError>
where
    S: FnMut() -> Result<SystemTime, RecordingError>,
{
    let started = Instant::now();
    let mut previous = sample()?;
    sleep(poll.initial_delay()).await;
    let mut current = sample()?;

    while previous != current {
        let waited = started.elapsed();
        if waited >= poll.max_wait() {
            return Err(RecordingError::FlushTimeout {
                dir: dir.to_path_buf(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        debug!(?previous, ?current, "still waiting for all frames");
        sleep(poll.interval()).await;
        previous = current;
        current = sample()?;
    }
    Ok(())
}
