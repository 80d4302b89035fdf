//! Bounded pool for identity lookups.
//!
//! Lookups block on HTTP, so each runs on `spawn_blocking` while holding a
//! semaphore permit; at most `verification_workers` run at once and the
//! rest queue for a permit. Results go back to the engine loop over a
//! channel and are never applied from the worker itself.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};

use drawbridge_identity::{IdentityService, VerificationError, VerifiedIdentity};
use drawbridge_session::PendingVerification;
use drawbridge_transport::ConnectionId;

/// A finished lookup on its way back to the engine loop.
#[derive(Debug)]
pub(crate) struct VerificationOutcome {
    pub(crate) connection: ConnectionId,
    pub(crate) stamp: u64,
    pub(crate) result: Result<VerifiedIdentity, VerificationError>,
}

#[derive(Clone)]
pub(crate) struct Verifier {
    service: Arc<dyn IdentityService>,
    permits: Arc<Semaphore>,
    completions: mpsc::UnboundedSender<VerificationOutcome>,
}

impl Verifier {
    pub(crate) fn new(
        service: Arc<dyn IdentityService>,
        workers: usize,
        completions: mpsc::UnboundedSender<VerificationOutcome>,
    ) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            completions,
        }
    }

    /// Queues a lookup. Never blocks the caller.
    pub(crate) fn submit(&self, pending: PendingVerification) {
        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.permits);
        let completions = self.completions.clone();
        tracing::trace!(
            connection = %pending.connection,
            free_workers = permits.available_permits(),
            "verification queued"
        );

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let connection = pending.connection;
            let request = pending.request;
            let name = request.name.clone();

            let result = match tokio::task::spawn_blocking(move || service.verify(&request)).await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(%connection, error = %e, "verification worker failed");
                    Err(VerificationError::ServiceUnavailable(format!(
                        "verification worker failed: {e}"
                    )))
                }
            };
            tracing::debug!(%connection, %name, verified = result.is_ok(), "verification finished");

            // The engine loop is gone during shutdown; nothing to deliver to.
            let _ = completions.send(VerificationOutcome {
                connection,
                stamp: pending.stamp,
                result,
            });
        });
    }
}
