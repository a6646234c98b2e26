//! One WebSocket connection to the onboard controller.
//!
//! A [`Session`] owns the transport exclusively. `start` performs the
//! handshake and spawns a single receive loop that decodes frames and pushes
//! them into the [`InboundQueue`](crate::InboundQueue) without waiting for the
//! consumer. Outbound writes go through `send`, serialised by an async mutex
//! on the write half.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rover_core::codec;
use rover_core::{CodecError, Command, SendFailure, SessionError, Telemetry};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::queue::{InboundQueue, InboundReceiver, InboundSender};
use crate::sink::CommandSink;
use crate::state::SessionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Upper bound on the close handshake during `stop`.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Counters snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Data frames read from the socket.
    pub frames_received: u64,
    /// Frames dropped because they failed to decode.
    pub malformed_frames: u64,
    /// Commands written successfully.
    pub commands_sent: u64,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    commands_sent: AtomicU64,
}

/// State shared with the receive loop.
struct Shared {
    endpoint: Endpoint,
    state: watch::Sender<SessionState>,
    writer: Mutex<Option<WsWriter>>,
    cancel: CancellationToken,
    counters: Counters,
    last_error: parking_lot::Mutex<Option<String>>,
}

impl Shared {
    /// Apply `next` if the edge is legal. Returns whether the state changed.
    fn transition(&self, next: SessionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(endpoint = %self.endpoint, state = %next, "session state changed");
        }
        changed
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn ingest(&self, decoded: Result<Telemetry, CodecError>, inbound: &InboundSender) {
        let _ = self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        match decoded {
            Ok(message) => {
                if inbound.push(message).is_err() {
                    debug!(endpoint = %self.endpoint, "inbound receiver dropped, discarding frame");
                }
            }
            Err(error) => {
                let _ = self.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
                warn!(endpoint = %self.endpoint, %error, "dropping malformed frame");
            }
        }
    }
}

/// A bidirectional, message-oriented link to one controller.
pub struct Session {
    shared: Arc<Shared>,
    inbound: parking_lot::Mutex<Option<InboundSender>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create an idle session and the receiver its messages will arrive on.
    pub fn new(endpoint: Endpoint) -> (Self, InboundReceiver) {
        let (tx, rx) = InboundQueue::new();
        let (state, _) = watch::channel(SessionState::Idle);
        let session = Self {
            shared: Arc::new(Shared {
                endpoint,
                state,
                writer: Mutex::new(None),
                cancel: CancellationToken::new(),
                counters: Counters::default(),
                last_error: parking_lot::Mutex::new(None),
            }),
            inbound: parking_lot::Mutex::new(Some(tx)),
            receive_task: Mutex::new(None),
        };
        (session, rx)
    }

    /// Controller address.
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Whether frames can be sent right now.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Counters snapshot.
    pub fn stats(&self) -> SessionStats {
        let c = &self.shared.counters;
        SessionStats {
            frames_received: c.frames_received.load(Ordering::Relaxed),
            malformed_frames: c.malformed_frames.load(Ordering::Relaxed),
            commands_sent: c.commands_sent.load(Ordering::Relaxed),
        }
    }

    /// Connect and spawn the receive loop.
    ///
    /// Only valid from `idle`. On failure the session ends `closed`. A
    /// concurrent [`stop`](Self::stop) aborts the handshake.
    pub async fn start(&self) -> Result<(), SessionError> {
        if !self.shared.transition(SessionState::Connecting) {
            return Err(SessionError::InvalidState {
                operation: "start",
                state: self.state().to_string(),
            });
        }

        let url = self.shared.endpoint.url();
        info!(endpoint = %url, "connecting");

        let connected = tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => Err("stopped while connecting".to_owned()),
            result = connect_async(url.as_str()) => result
                .map(|(ws, _response)| ws)
                .map_err(|e| e.to_string()),
        };
        let ws = match connected {
            Ok(ws) => ws,
            Err(reason) => return Err(self.fail_connect(reason)),
        };

        let (writer, reader) = ws.split();
        let mut task_slot = self.receive_task.lock().await;
        *self.shared.writer.lock().await = Some(writer);

        if !self.shared.transition(SessionState::Open) {
            drop(self.shared.writer.lock().await.take());
            return Err(self.fail_connect("stopped while connecting".to_owned()));
        }

        let inbound = self.inbound.lock().take();
        let Some(inbound) = inbound else {
            return Err(self.fail_connect("inbound queue already released".to_owned()));
        };
        *task_slot = Some(tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            reader,
            inbound,
        )));
        info!(endpoint = %url, "session open");
        Ok(())
    }

    fn fail_connect(&self, reason: String) -> SessionError {
        let _ = self.shared.transition(SessionState::Closed);
        *self.shared.last_error.lock() = Some(reason.clone());
        drop(self.inbound.lock().take());
        warn!(endpoint = %self.shared.endpoint, %reason, "connect failed");
        SessionError::Connect {
            endpoint: self.shared.endpoint.url(),
            reason,
        }
    }

    /// Encode and write one command.
    ///
    /// Commands that cannot be encoded are logged and skipped. A write
    /// failure closes the session.
    pub async fn send(&self, command: Command) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(SendFailure::NotOpen {
                state: state.to_string(),
            }
            .into());
        }

        let text = match codec::encode(&command) {
            Ok(text) => text,
            Err(error) => {
                warn!(?command, %error, "skipping unencodable command");
                return Ok(());
            }
        };

        let cancel = &self.shared.cancel;
        let mut guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SendFailure::Interrupted.into()),
            guard = self.shared.writer.lock() => guard,
        };
        let Some(writer) = guard.as_mut() else {
            return Err(SendFailure::NotOpen {
                state: self.state().to_string(),
            }
            .into());
        };

        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SendFailure::Interrupted.into()),
            result = writer.send(Message::Text(text.into())) => result,
        };

        match written {
            Ok(()) => {
                let _ = self
                    .shared
                    .counters
                    .commands_sent
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(error) => {
                drop(guard.take());
                drop(guard);
                let _ = self.shared.transition(SessionState::Closed);
                cancel.cancel();
                warn!(endpoint = %self.shared.endpoint, %error, "write failed, closing session");
                Err(SendFailure::Transport(error.to_string()).into())
            }
        }
    }

    /// Resolve once the session is open.
    ///
    /// Fails with [`SessionError::Connect`] if it closes first.
    pub async fn await_open(&self) -> Result<(), SessionError> {
        let mut rx = self.shared.state.subscribe();
        let reached = rx
            .wait_for(|s| matches!(s, SessionState::Open | SessionState::Closed))
            .await
            .map(|s| *s)
            .unwrap_or(SessionState::Closed);
        if reached == SessionState::Open {
            return Ok(());
        }
        let reason = self
            .shared
            .last_error
            .lock()
            .clone()
            .unwrap_or_else(|| "closed before open".to_owned());
        Err(SessionError::Connect {
            endpoint: self.shared.endpoint.url(),
            reason,
        })
    }

    /// Resolve once the session is closed.
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    /// Tear the session down.
    ///
    /// No-op before `start`. Idempotent. Safe to call while sends are in
    /// flight: they fail with [`SendFailure::Interrupted`].
    pub async fn stop(&self) {
        if self.state() == SessionState::Idle {
            return;
        }
        self.shared.cancel.cancel();
        if self.shared.transition(SessionState::Closed) {
            info!(endpoint = %self.shared.endpoint, "stopping session");
        }

        let writer = self.shared.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match tokio::time::timeout(CLOSE_GRACE, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => debug!(%error, "close handshake failed"),
                Err(_elapsed) => debug!("close handshake timed out"),
            }
        }

        let handle = self.receive_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "receive loop ended abnormally");
            }
        }
        drop(self.inbound.lock().take());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[async_trait]
impl CommandSink for Session {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        Session::send(self, command).await
    }

    fn is_open(&self) -> bool {
        Session::is_open(self)
    }
}

async fn receive_loop(shared: Arc<Shared>, mut reader: WsReader, inbound: InboundSender) {
    loop {
        let frame = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => {
                debug!("receive loop cancelled");
                break;
            }
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => shared.ingest(codec::decode(text.as_str()), &inbound),
            Some(Ok(Message::Binary(bytes))) => shared.ingest(codec::decode_bytes(&bytes), &inbound),
            Some(Ok(Message::Close(frame))) => {
                info!(endpoint = %shared.endpoint, ?frame, "controller closed the connection");
                break;
            }
            // ping/pong are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                warn!(endpoint = %shared.endpoint, %error, "read failed");
                break;
            }
            None => {
                info!(endpoint = %shared.endpoint, "stream ended");
                break;
            }
        }
    }

    let _ = shared.transition(SessionState::Closed);
    shared.cancel.cancel();
    drop(shared.writer.lock().await.take());
}
