use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the process or the end of the host input, whichever comes first.
///
/// On Windows detached processes can't detect signals sent to them, there the browser closing
/// stdin is the only way to stop.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
