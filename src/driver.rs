use tracing::debug;

use crate::error::RecordingError;

/// Privileged execution context the capture API lives in; page scripts run
/// in the content sandbox and cannot reach `windowUtils`.
pub const PRIVILEGED_CONTEXT: &str = "chrome";

/// The one capability consumed from the browser collaborator: switch the
/// driver's execution context and run a script in it. Implemented by the
/// host's WebDriver layer.
#[allow(async_fn_in_trait)]
pub trait BrowserDriver {
    /// Name of the currently active execution context.
    async fn context(&mut self) -> Result<String, RecordingError>;

    async fn set_context(&mut self, context: &str) -> Result<(), RecordingError>;

    async fn execute_script(&mut self, script: &str) -> Result<(), RecordingError>;
}

/// Toggle the browser compositor's window recording.
///
/// The previous execution context is restored even when the script fails,
/// so a failed toggle does not leave the driver stuck in the chrome context
/// for subsequent operations.
pub async fn set_window_recording<D: BrowserDriver>(
    driver: &mut D,
    enabled: bool,
) -> Result<(), RecordingError> {
    let script = format!(
        "windowUtils.setCompositionRecording({});",
        if enabled { "1" } else { "0" }
    );
    debug!(enabled, "toggling window recording");

    let previous = driver.context().await?;
    driver.set_context(PRIVILEGED_CONTEXT).await?;
    let outcome = driver.execute_script(&script).await;
    let restored = driver.set_context(&previous).await;
    outcome?;
    restored
}
