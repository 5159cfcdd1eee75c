//! Cooperative cancellation for a supervised run.

use tokio_util::sync::CancellationToken;

/// One-way stop signal shared between a caller and a running supervisor.
///
/// Cloning yields a handle to the same signal. There is no way to reset it.
#[derive(Debug, Clone, Default)]
pub struct CancellationGate {
    token: CancellationToken,
}

impl CancellationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Repeated calls have no further effect.
    pub fn request(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Cancellation requested");
        }
        self.token.cancel();
    }

    /// Check whether cancellation has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once cancellation has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await;
    }
}
