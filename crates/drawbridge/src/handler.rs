//! Per-connection tasks: one reads, one writes.
//!
//! The reader feeds transport bytes into the session and hands any
//! verification request to the pool. The writer drains the session's
//! outbound queue in order and, once the session has closed and the queue
//! is empty, releases the transport exactly once. A closed session gets
//! [`CLOSE_DRAIN`] to flush its last frames; a peer that stopped reading
//! loses them and the transport is released anyway.
//!
//! ```text
//!  transport ──recv──► reader ──receive()──► Session ──take_outbound()──► writer ──send──► transport
//!                         │                                                  ▲
//!                         └── PendingVerification ──► Verifier               └── Notify
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use drawbridge_protocol::DisconnectReason;
use drawbridge_session::{ServerContext, SessionError, reason};
use drawbridge_transport::{Connection, TransportError};

use crate::connection::SessionHandle;
use crate::verifier::Verifier;

/// How long a closed session's remaining output may take to reach the
/// peer before the transport is released regardless.
pub(crate) const CLOSE_DRAIN: Duration = Duration::from_secs(1);

/// Starts the reader and writer tasks for an accepted connection.
pub(crate) fn spawn_connection<C>(
    conn: C,
    handle: Arc<SessionHandle>,
    ctx: ServerContext,
    verifier: Verifier,
) where
    C: Connection<Error = TransportError>,
{
    let conn = Arc::new(conn);
    tokio::spawn(read_loop(Arc::clone(&conn), Arc::clone(&handle), ctx, verifier));
    tokio::spawn(write_loop(conn, handle));
}

async fn read_loop<C>(
    conn: Arc<C>,
    handle: Arc<SessionHandle>,
    ctx: ServerContext,
    verifier: Verifier,
) where
    C: Connection<Error = TransportError>,
{
    let id = handle.id();
    let mut closed = handle.subscribe_closed();

    loop {
        let received = tokio::select! {
            result = conn.recv() => result,
            _ = closed.wait_for(|closed| *closed) => break,
        };

        match received {
            Ok(Some(bytes)) => {
                if let Some(pending) = handle.with_session(|s| s.receive(&bytes, &ctx)) {
                    verifier.submit(pending);
                }
            }
            Ok(None) => {
                tracing::debug!(%id, "peer closed the stream");
                handle.with_session(|s| s.close(DisconnectReason::new(reason::PEER_DISCONNECTED)));
                break;
            }
            Err(e) => {
                handle.mark_dead();
                handle.with_session(|s| s.fail(SessionError::Transport(e)));
                break;
            }
        }
    }
    tracing::trace!(%id, "reader finished");
}

async fn write_loop<C>(conn: Arc<C>, handle: Arc<SessionHandle>)
where
    C: Connection<Error = TransportError>,
{
    let id = handle.id();
    let mut closed_rx = handle.subscribe_closed();
    let mut drain_deadline: Option<Instant> = None;

    loop {
        let (batch, closed) = {
            let mut session = handle.lock();
            (session.take_outbound(), session.is_closed())
        };
        if closed && drain_deadline.is_none() {
            drain_deadline = Some(Instant::now() + CLOSE_DRAIN);
        }

        match batch {
            Some(bytes) => {
                let sent = {
                    let send = conn.send(&bytes);
                    tokio::pin!(send);
                    match drain_deadline {
                        Some(deadline) => tokio::time::timeout_at(deadline, &mut send).await.ok(),
                        None => tokio::select! {
                            result = &mut send => Some(result),
                            () = async { let _ = closed_rx.wait_for(|closed| *closed).await; } => {
                                // Closed mid-write: the same write continues,
                                // bounded by the drain deadline.
                                let deadline = *drain_deadline.insert(Instant::now() + CLOSE_DRAIN);
                                tokio::time::timeout_at(deadline, &mut send).await.ok()
                            }
                        },
                    }
                };

                let Some(result) = sent else {
                    tracing::debug!(%id, pending = bytes.len(), "peer stopped reading, dropping output");
                    break;
                };
                match result {
                    Ok(()) => {
                        handle.clear_write_failures();
                        continue;
                    }
                    Err(e) if e.is_transient() && handle.record_transient_failure() == 1 => {
                        // Retry when the sweeper next wakes us.
                        tracing::debug!(%id, error = %e, "transient write failure");
                        handle.lock().requeue_front(bytes);
                    }
                    Err(e) => {
                        handle.mark_dead();
                        handle.with_session(|s| s.fail(SessionError::Transport(e)));
                        break;
                    }
                }
            }
            None if closed => break,
            None => {}
        }

        match drain_deadline {
            Some(deadline) => {
                if tokio::time::timeout_at(deadline, handle.writer_woken()).await.is_err() {
                    break;
                }
            }
            None => handle.writer_woken().await,
        }
    }

    if handle.mark_released() {
        match tokio::time::timeout(CLOSE_DRAIN, conn.close()).await {
            Ok(Err(e)) => tracing::debug!(%id, error = %e, "error closing transport"),
            Err(_) => tracing::debug!(%id, "transport close timed out"),
            Ok(Ok(())) => {}
        }
        tracing::debug!(%id, "transport released");
    }
}
