use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ToolSettings;
use crate::error::RecordingError;
use crate::frames::SequencedFrame;

const INTERMEDIATE_NAME: &str = "tmp-cfr.mp4";
const MANIFEST_NAME: &str = "offsets.txt";

/// Abstract encoder capabilities, so a fake can stand in for the external
/// binaries in tests and record the arguments it was handed.
#[allow(async_fn_in_trait)]
pub trait VideoTool {
    /// Merge the canonically named frames into a constant-frame-rate video.
    async fn assemble_cfr(
        &self,
        session_dir: &Path,
        intermediate: &Path,
    ) -> Result<(), RecordingError>;

    /// Re-time the constant-rate video into a variable-frame-rate file at
    /// the destination, driven by the offsets manifest.
    async fn remux_vfr(
        &self,
        intermediate: &Path,
        manifest: &Path,
        destination: &Path,
    ) -> Result<(), RecordingError>;
}

/// Production implementation shelling out to `ffmpeg` and `mp4fpsmod`.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    mp4fpsmod: PathBuf,
}

impl FfmpegTool {
    pub fn new(ffmpeg: PathBuf, mp4fpsmod: PathBuf) -> Self {
        Self { ffmpeg, mp4fpsmod }
    }

    /// Resolve both binaries from settings overrides or `PATH`.
    pub fn locate(tools: &ToolSettings) -> Result<Self, RecordingError> {
        let ffmpeg = resolve_binary(tools.ffmpeg.as_deref(), "ffmpeg")?;
        let mp4fpsmod = resolve_binary(tools.mp4fpsmod.as_deref(), "mp4fpsmod")?;
        Ok(Self::new(ffmpeg, mp4fpsmod))
    }
}

fn resolve_binary(configured: Option<&Path>, name: &str) -> Result<PathBuf, RecordingError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    which::which(name).map_err(|err| RecordingError::ToolFailure {
        tool: name.to_string(),
        detail: format!("binary not found on PATH: {err}"),
    })
}

/// Arguments for the constant-frame-rate merge. Width and height are padded
/// up to the nearest even number; the encoder rejects odd dimensions.
fn cfr_args(session_dir: &Path, intermediate: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        session_dir.join("frame%04d.png").to_string_lossy().into_owned(),
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        intermediate.to_string_lossy().into_owned(),
    ]
}

/// Arguments for the variable-frame-rate remux.
fn vfr_args(intermediate: &Path, manifest: &Path, destination: &Path) -> Vec<String> {
    vec![
        "-o".into(),
        destination.to_string_lossy().into_owned(),
        "-t".into(),
        manifest.to_string_lossy().into_owned(),
        intermediate.to_string_lossy().into_owned(),
    ]
}

async fn run_tool(binary: &Path, args: &[String]) -> Result<(), RecordingError> {
    let tool = binary
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.display().to_string());
    debug!(command = %format!("{} {}", binary.display(), args.join(" ")), "executing encoder");

    let output = Command::new(binary)
        .args(args)
        .output()
        .await
        .map_err(|err| RecordingError::ToolFailure {
            tool: tool.clone(),
            detail: format!("failed to spawn: {err}"),
        })?;

    if !output.status.success() {
        return Err(RecordingError::ToolFailure {
            tool,
            detail: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

impl VideoTool for FfmpegTool {
    async fn assemble_cfr(
        &self,
        session_dir: &Path,
        intermediate: &Path,
    ) -> Result<(), RecordingError> {
        run_tool(&self.ffmpeg, &cfr_args(session_dir, intermediate)).await
    }

    async fn remux_vfr(
        &self,
        intermediate: &Path,
        manifest: &Path,
        destination: &Path,
    ) -> Result<(), RecordingError> {
        run_tool(&self.mp4fpsmod, &vfr_args(intermediate, manifest, destination)).await
    }
}

/// Render the offsets manifest: one millisecond offset per line, rebased so
/// the first frame is always 0. The remux tool expects offsets relative to
/// the first frame, not to absolute capture start.
fn render_manifest(frames: &[SequencedFrame]) -> String {
    let mut manifest = String::from("0\n");
    if let Some(first) = frames.first() {
        for frame in &frames[1..] {
            manifest.push_str(&(frame.offset_ms - first.offset_ms).to_string());
            manifest.push('\n');
        }
    }
    manifest
}

/// Run the two-stage pipeline over a sequenced session directory and leave
/// the final variable-frame-rate video at `destination`.
///
/// The session directory (frames, intermediate video, manifest) is removed
/// after a successful remux; on failure it is left in place for diagnosis.
pub async fn assemble<T: VideoTool>(
    tool: &T,
    session_dir: &Path,
    frames: &[SequencedFrame],
    destination: &Path,
) -> Result<(), RecordingError> {
    let intermediate = session_dir.join(INTERMEDIATE_NAME);
    tool.assemble_cfr(session_dir, &intermediate).await?;

    let manifest = session_dir.join(MANIFEST_NAME);
    tokio::fs::write(&manifest, render_manifest(frames)).await?;

    tool.remux_vfr(&intermediate, &manifest, destination).await?;

    if !destination.exists() {
        return Err(RecordingError::ToolFailure {
            tool: "mp4fpsmod".into(),
            detail: format!("no output produced at {}", destination.display()),
        });
    }

    if let Err(err) = tokio::fs::remove_dir_all(session_dir).await {
        warn!(
            session = %session_dir.display(),
            error = %err,
            "failed to remove capture session directory"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    fn frame(filename: &str, offset_ms: u64) -> SequencedFrame {
        SequencedFrame {
            filename: filename.into(),
            offset_ms,
        }
    }

    /// Records invocations instead of shelling out; writes the destination
    /// on remux like the real tool would.
    #[derive(Default)]
    struct FakeTool {
        calls: Mutex<Vec<String>>,
        fail_cfr: bool,
        fail_vfr: bool,
    }

    impl VideoTool for FakeTool {
        async fn assemble_cfr(
            &self,
            session_dir: &Path,
            intermediate: &Path,
        ) -> Result<(), RecordingError> {
            if self.fail_cfr {
                return Err(RecordingError::ToolFailure {
                    tool: "ffmpeg".into(),
                    detail: "exited with 1".into(),
                });
            }
            fs::write(intermediate, b"cfr").unwrap();
            self.calls
                .lock()
                .unwrap()
                .push(format!("cfr:{}", session_dir.display()));
            Ok(())
        }

        async fn remux_vfr(
            &self,
            _intermediate: &Path,
            manifest: &Path,
            destination: &Path,
        ) -> Result<(), RecordingError> {
            if self.fail_vfr {
                return Err(RecordingError::ToolFailure {
                    tool: "mp4fpsmod".into(),
                    detail: "exited with 1".into(),
                });
            }
            let offsets = fs::read_to_string(manifest).unwrap();
            fs::write(destination, b"vfr").unwrap();
            self.calls
                .lock()
                .unwrap()
                .push(format!("vfr:{}", offsets.escape_default()));
            Ok(())
        }
    }

    fn session_with_frames() -> (tempfile::TempDir, PathBuf) {
        let base = tempfile::tempdir().unwrap();
        let session = base.path().join("windowrecording-1700000000");
        fs::create_dir(&session).unwrap();
        fs::write(session.join("frame0001.png"), b"png").unwrap();
        (base, session)
    }

    #[test]
    fn manifest_is_rebased_to_the_first_frame() {
        let frames = [
            frame("frame0001.png", 0),
            frame("frame0002.png", 33),
            frame("frame0003.png", 67),
        ];
        assert_eq!(render_manifest(&frames), "0\n33\n67\n");

        // A capture whose first frame is not at absolute zero is normalized.
        let late = [frame("frame0001.png", 120), frame("frame0002.png", 180)];
        assert_eq!(render_manifest(&late), "0\n60\n");
    }

    #[test]
    fn manifest_for_a_single_frame_is_just_zero() {
        assert_eq!(render_manifest(&[frame("frame0001.png", 40)]), "0\n");
    }

    #[test]
    fn cfr_args_pad_to_even_dimensions() {
        let args = cfr_args(Path::new("windowrecording-1"), Path::new("windowrecording-1/tmp-cfr.mp4"));
        assert_eq!(
            args,
            vec![
                "-i",
                "windowrecording-1/frame%04d.png",
                "-vf",
                "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                "-pix_fmt",
                "yuv420p",
                "windowrecording-1/tmp-cfr.mp4",
            ]
        );
    }

    #[test]
    fn vfr_args_carry_manifest_and_destination() {
        let args = vfr_args(
            Path::new("s/tmp-cfr.mp4"),
            Path::new("s/offsets.txt"),
            Path::new("out.mp4"),
        );
        assert_eq!(args, vec!["-o", "out.mp4", "-t", "s/offsets.txt", "s/tmp-cfr.mp4"]);
    }

    #[test]
    fn configured_binary_paths_skip_path_lookup() {
        let tools = ToolSettings {
            ffmpeg: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            mp4fpsmod: Some(PathBuf::from("/opt/mp4fpsmod")),
        };
        let tool = FfmpegTool::locate(&tools).unwrap();
        assert_eq!(tool.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(tool.mp4fpsmod, PathBuf::from("/opt/mp4fpsmod"));
    }

    #[tokio::test]
    async fn assemble_runs_both_stages_and_removes_the_session() {
        let (base, session) = session_with_frames();
        let destination = base.path().join("trial.mp4");
        let tool = FakeTool::default();
        let frames = [frame("frame0001.png", 10), frame("frame0002.png", 43)];

        assemble(&tool, &session, &frames, &destination).await.unwrap();

        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("cfr:"));
        // The manifest existed, rebased, by the time the remux ran.
        assert_eq!(calls[1], "vfr:0\\n33\\n");
        assert!(destination.exists());
        assert!(!session.exists());
    }

    #[tokio::test]
    async fn failing_remux_keeps_the_session_for_diagnosis() {
        let (base, session) = session_with_frames();
        let destination = base.path().join("trial.mp4");
        let tool = FakeTool {
            fail_vfr: true,
            ..FakeTool::default()
        };
        let frames = [frame("frame0001.png", 0)];

        let err = assemble(&tool, &session, &frames, &destination)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordingError::ToolFailure { .. }));
        assert!(!destination.exists());
        assert!(session.exists());
    }

    #[tokio::test]
    async fn failing_cfr_never_reaches_the_remux() {
        let (base, session) = session_with_frames();
        let destination = base.path().join("trial.mp4");
        let tool = FakeTool {
            fail_cfr: true,
            ..FakeTool::default()
        };
        let frames = [frame("frame0001.png", 0)];

        let err = assemble(&tool, &session, &frames, &destination)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordingError::ToolFailure { .. }));
        assert!(tool.calls.lock().unwrap().is_empty());
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn silent_tool_with_no_output_is_a_failure() {
        struct SilentTool;
        impl VideoTool for SilentTool {
            async fn assemble_cfr(&self, _: &Path, _: &Path) -> Result<(), RecordingError> {
                Ok(())
            }
            async fn remux_vfr(&self, _: &Path, _: &Path, _: &Path) -> Result<(), RecordingError> {
                Ok(())
            }
        }

        let (base, session) = session_with_frames();
        let destination = base.path().join("trial.mp4");
        let err = assemble(&SilentTool, &session, &[frame("frame0001.png", 0)], &destination)
            .await
            .unwrap_err();
        match err {
            RecordingError::ToolFailure { detail, .. } => {
                assert!(detail.contains("no output"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
