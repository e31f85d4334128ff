//! Per-connection handler: request dispatch and event push.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The connection is one hub subscriber. The loop waits on three things
//! at once:
//!   1. an incoming frame → decode → run the request → send the response
//!   2. a hub event for a joined session → send it as an `Event` envelope
//!   3. server shutdown → close the connection

use std::sync::Arc;

use telesim_hub::{BroadcastHub, SubscriberSender};
use telesim_protocol::{
    Codec, Envelope, Payload, Request, Response, SessionId, SubscriberId, TelemetryEvent,
};
use telesim_store::Storage;
use telesim_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::server::ServerState;
use crate::TelesimError;

/// Drop guard that removes the subscriber from the hub when the handler
/// exits, however it exits. `Drop` is synchronous, so the async call is
/// spawned.
struct SubscriptionGuard {
    subscriber: SubscriberId,
    hub: BroadcastHub,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let subscriber = self.subscriber;
        let hub = self.hub.clone();
        tokio::spawn(async move {
            let _ = hub.disconnect(subscriber).await;
        });
    }
}

/// Outgoing frame state for one connection.
struct Outbound<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<C: Codec> Outbound<'_, C> {
    async fn send(&mut self, payload: Payload) -> Result<(), TelesimError> {
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.start.elapsed().as_millis() as u64,
            payload,
        };
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(&mut self, err: &TelesimError) -> Result<(), TelesimError> {
        self.send(Payload::Response(Response::Error {
            code: err.code(),
            message: err.to_string(),
        }))
        .await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, C>>,
    cancel: CancellationToken,
) -> Result<(), TelesimError>
where
    S: Storage,
    C: Codec,
{
    let conn_id = conn.id();
    let subscriber = SubscriberId(conn_id.into_inner());
    tracing::debug!(%conn_id, %subscriber, peer = ?conn.peer_addr(), "handling new connection");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
    let _guard = SubscriptionGuard {
        subscriber,
        hub: state.engine.hub().clone(),
    };

    let mut out = Outbound {
        conn: &conn,
        codec: &state.codec,
        seq: 1,
        start: Instant::now(),
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%subscriber, "server shutting down, closing connection");
                let _ = conn.close().await;
                break;
            }
            Some(event) = events_rx.recv() => {
                out.send(Payload::Event(event)).await?;
            }
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%subscriber, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%subscriber, error = %e, "recv error");
                        break;
                    }
                };

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(%subscriber, error = %e, "failed to decode envelope");
                        out.send_error(&TelesimError::Protocol(e)).await?;
                        continue;
                    }
                };

                let request = match envelope.payload {
                    Payload::Request(request) => request,
                    _ => {
                        let err = TelesimError::Validation("clients may only send requests".into());
                        out.send_error(&err).await?;
                        continue;
                    }
                };

                if let Request::Disconnect { reason } = &request {
                    tracing::info!(%subscriber, %reason, "client disconnected");
                    break;
                }

                match handle_request(&state, subscriber, &events_tx, request).await {
                    Ok(response) => out.send(Payload::Response(response)).await?,
                    Err(e) => {
                        tracing::debug!(%subscriber, error = %e, "request failed");
                        out.send_error(&e).await?;
                    }
                }
            }
        }
    }

    // _guard drops here → hub disconnect fires.
    Ok(())
}

/// Runs one request against the engine and builds its response.
async fn handle_request<S, C>(
    state: &ServerState<S, C>,
    subscriber: SubscriberId,
    events_tx: &SubscriberSender,
    request: Request,
) -> Result<Response, TelesimError>
where
    S: Storage,
    C: Codec,
{
    let engine = &state.engine;
    match request {
        Request::CreateSession { name } => {
            let session_id = engine.create_session(name.as_deref()).await?;
            Ok(Response::SessionCreated { session_id })
        }
        Request::StartGeneration { session_id } => {
            let session_id = require_id(session_id)?;
            engine.start_generation(session_id).await?;
            Ok(Response::GenerationStarted { session_id })
        }
        Request::StopGeneration { session_id } => {
            let session_id = require_id(session_id)?;
            let changed = engine.stop_generation(session_id).await?;
            Ok(Response::GenerationStopped { session_id, changed })
        }
        Request::EndSession { session_id } => {
            let session_id = require_id(session_id)?;
            let changed = engine.end_session(session_id).await?;
            Ok(Response::SessionEnded { session_id, changed })
        }
        Request::ListSessions => Ok(Response::Sessions {
            sessions: engine.list_sessions().await?,
        }),
        Request::ListPackets { session_id } => {
            let session_id = require_id(session_id)?;
            Ok(Response::Packets {
                session_id,
                packets: engine.list_packets(session_id).await?,
            })
        }
        Request::Status => Ok(Response::Status {
            status: engine.status().await?,
            message: "ok".into(),
        }),
        Request::JoinSession { session_id } => {
            let session_id = require_id(session_id)?;
            // Only existing sessions have groups worth joining.
            engine.session_state(session_id).await?;
            engine
                .hub()
                .join(subscriber, events_tx.clone(), session_id)
                .await?;
            Ok(Response::Subscribed {
                session_id,
                joined: true,
            })
        }
        Request::LeaveSession { session_id } => {
            let session_id = require_id(session_id)?;
            engine.hub().leave(subscriber, session_id).await?;
            Ok(Response::Subscribed {
                session_id,
                joined: false,
            })
        }
        Request::Disconnect { .. } => Err(TelesimError::Validation(
            "disconnect is handled by the connection loop".into(),
        )),
    }
}

fn require_id(session_id: Option<SessionId>) -> Result<SessionId, TelesimError> {
    session_id.ok_or_else(|| TelesimError::Validation("session_id is required".into()))
}
