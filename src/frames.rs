use std::{collections::HashSet, fs, path::Path};

use tracing::debug;

use crate::error::RecordingError;

/// A captured frame after renumbering: canonical zero-padded filename plus
/// the capture-relative offset the browser stamped into the original name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedFrame {
    pub filename: String,
    pub offset_ms: u64,
}

/// Parse `frame-<seq>-<offsetMs>.<ext>` into its sequence number and offset.
fn parse_frame_name(name: &str) -> Result<(u32, u64), RecordingError> {
    let malformed = || RecordingError::MalformedFrame {
        filename: name.to_string(),
    };

    let mut fields = name.split('-');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some("frame"), Some(seq), Some(offset_ext), None) => {
            let seq = seq.parse::<u32>().map_err(|_| malformed())?;
            let offset = offset_ext
                .split('.')
                .next()
                .and_then(|raw| raw.parse::<u64>().ok())
                .ok_or_else(malformed)?;
            Ok((seq, offset))
        }
        _ => Err(malformed()),
    }
}

/// Rename every frame in the session directory to its canonical
/// `frame<seq:04>.png` name and return the (filename, offset) pairs sorted
/// by canonical filename, which equals numeric sequence order.
///
/// Any file that does not match the dump pattern aborts sequencing before a
/// single rename happens; a corrupt sequence would otherwise produce a
/// visibly wrong video.
pub fn sequence_frames(dir: &Path) -> Result<Vec<SequencedFrame>, RecordingError> {
    let mut parsed = Vec::new();
    let mut seen = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_str().ok_or_else(|| RecordingError::MalformedFrame {
            filename: name.to_string_lossy().into_owned(),
        })?;
        let (seq, offset) = parse_frame_name(name)?;
        // Two dumps collapsing to one canonical name would clobber a frame
        // and desync the manifest from the encoded frame count.
        if !seen.insert(seq) {
            return Err(RecordingError::MalformedFrame {
                filename: name.to_string(),
            });
        }
        parsed.push((name.to_string(), seq, offset));
    }

    if parsed.is_empty() {
        return Err(RecordingError::EmptyCapture {
            dir: dir.to_path_buf(),
        });
    }

    // Offsets are non-decreasing in sequence order by construction of the
    // browser's capture loop; an inversion means the dump is corrupt and
    // the manifest would come out garbage.
    parsed.sort_by_key(|&(_, seq, _)| seq);
    for pair in parsed.windows(2) {
        if pair[1].2 < pair[0].2 {
            return Err(RecordingError::MalformedFrame {
                filename: pair[1].0.clone(),
            });
        }
    }

    let mut frames = Vec::with_capacity(parsed.len());
    for (original, seq, offset) in parsed {
        let canonical = format!("frame{seq:04}.png");
        fs::rename(dir.join(&original), dir.join(&canonical))?;
        frames.push(SequencedFrame {
            filename: canonical,
            offset_ms: offset,
        });
    }

    frames.sort_by(|a, b| a.filename.cmp(&b.filename));
    debug!(frames = frames.len(), "sequenced capture frames");
    Ok(frames)
}
