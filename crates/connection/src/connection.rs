//! The connection state machine.
//!
//! Each connection is driven by a single actor task draining a command
//! channel: every lifecycle transition, timer tick and queue operation
//! is processed strictly in submission order. Dispatch ordering
//! therefore matches transition ordering, and a timer callback can
//! never act on a connection mid-teardown — ticks that arrive after
//! close are dropped by the actor's epoch and state checks.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use eventline_protocol::constants::COMMAND_BUFFER_SIZE;
use eventline_protocol::{ConnectionId, Event};

use crate::ConnectionError;
use crate::collaborators::Collaborators;
use crate::config::ConnectionConfig;
use crate::pumps::auth::auth_pump;
use crate::pumps::heartbeat::heartbeat_pump;
use crate::queue::EventQueue;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Open; authentication not required by configuration.
    Open,
    /// Open, waiting for authentication within the grace period.
    OpenUnauthenticated,
    /// Open and authenticated.
    OpenAuthenticated,
    /// Teardown in progress.
    Closing,
    /// Terminal. No transition leaves this state.
    Closed,
}

impl LifecycleState {
    /// `true` for any of the open states.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            Self::Open | Self::OpenUnauthenticated | Self::OpenAuthenticated
        )
    }
}

/// Commands processed by the connection actor, in submission order.
pub(crate) enum Command {
    Open { initial: Option<Value> },
    Receive { raw: String },
    Pong,
    Authenticate,
    SetHeartbeatInterval(Duration),
    Enqueue(Event),
    Trigger(Event),
    Flush,
    SendMessage { name: String, data: Value },
    Error { detail: Option<Value> },
    Close { reason: Option<Value> },
    HeartbeatTick { epoch: u64 },
    AuthDeadline,
}

/// Read-only view published by the actor.
#[derive(Debug, Clone)]
struct Snapshot {
    state: LifecycleState,
    authenticated: bool,
    user_id: Option<String>,
}

/// Handle to one logical client session.
///
/// Cheap to clone. All mutation flows through the connection's command
/// channel and is applied by the actor task; introspection reads a
/// watch snapshot and never blocks.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: Option<IpAddr>,
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<Snapshot>,
    opened: Arc<AtomicBool>,
}

impl Connection {
    /// Spawns the actor for a freshly accepted transport connection.
    ///
    /// The id comes from whoever accepted the transport (the connection
    /// manager); `remote_addr` is the best-effort client address taken
    /// from the request descriptor at construction.
    pub fn spawn(
        id: ConnectionId,
        remote_addr: Option<IpAddr>,
        config: ConnectionConfig,
        collaborators: Collaborators,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);

        let initial_state = if config.require_auth {
            LifecycleState::OpenUnauthenticated
        } else {
            LifecycleState::Open
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot {
            state: initial_state,
            authenticated: false,
            user_id: None,
        });

        let actor = Actor {
            id,
            heartbeat_interval: config.heartbeat_interval,
            config,
            collab: collaborators,
            snapshot_tx,
            cmd_tx: cmd_tx.clone(),
            state: initial_state,
            authenticated: false,
            awaiting_pong: false,
            queue: EventQueue::new(),
            heartbeat_epoch: 0,
            heartbeat_cancel: CancellationToken::new(),
            auth_cancel: CancellationToken::new(),
            identity: None,
        };
        tokio::spawn(actor.run(cmd_rx));

        Self {
            id,
            remote_addr,
            cmd_tx,
            snapshot_rx,
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens the connection: starts the heartbeat (and, when required,
    /// the auth watchdog) and dispatches the `connection_opened` event.
    ///
    /// Calling `open` twice is a programming error and returns
    /// [`ConnectionError::InvalidTransition`] without submitting
    /// anything.
    pub async fn open(&self, initial: Option<Value>) -> Result<(), ConnectionError> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::InvalidTransition(
                "connection already opened",
            ));
        }
        self.submit(Command::Open { initial }).await;
        Ok(())
    }

    /// Decodes an inbound text payload into an event and dispatches it.
    /// Decode failures funnel into the error path, never to the caller.
    pub async fn receive(&self, raw: impl Into<String>) {
        self.submit(Command::Receive { raw: raw.into() }).await;
    }

    /// Clears the awaiting-pong flag. No-op when already clear.
    pub async fn receive_pong(&self) {
        self.submit(Command::Pong).await;
    }

    /// Marks the connection authenticated and disarms the auth
    /// watchdog. Has no effect once the watchdog already fired — the
    /// connection is already closing.
    pub async fn authenticate(&self) {
        self.submit(Command::Authenticate).await;
    }

    /// Appends an event to the outbound queue tail. Best-effort once
    /// teardown has begun: the event is silently dropped.
    pub async fn enqueue(&self, event: Event) {
        self.submit(Command::Enqueue(event)).await;
    }

    /// Delivers one event directly to the transport, bypassing the
    /// queue. Send failures are logged, never propagated.
    pub async fn trigger(&self, event: Event) {
        self.submit(Command::Trigger(event)).await;
    }

    /// Atomically drains the queue and hands the serialized batch to
    /// the transport. A failed send is logged and the batch is not
    /// re-enqueued; the connection stays open either way.
    pub async fn flush(&self) {
        self.submit(Command::Flush).await;
    }

    /// Builds an application event carrying the connection's memoized
    /// user identity and enqueues it.
    pub async fn send_message(&self, name: impl Into<String>, data: Value) {
        self.submit(Command::SendMessage {
            name: name.into(),
            data,
        })
        .await;
    }

    /// Dispatches a `connection_error` event, then closes with the same
    /// detail. The single teardown path for all runtime failures.
    pub async fn error(&self, detail: Option<Value>) {
        self.submit(Command::Error { detail }).await;
    }

    /// Cancels both timers, dispatches `connection_closed`, signals the
    /// data store and the connection manager, and transitions to
    /// `Closed`. Closing an already-closed connection is a no-op.
    pub async fn close(&self, reason: Option<Value>) {
        self.submit(Command::Close { reason }).await;
    }

    /// Restarts the heartbeat with a new interval and a fresh (healthy)
    /// awaiting-pong flag.
    pub async fn set_heartbeat_interval(&self, interval: Duration) {
        self.submit(Command::SetHeartbeatInterval(interval)).await;
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Best-effort remote address extracted at construction. May be
    /// absent; absence is not an error.
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.snapshot_rx.borrow().state
    }

    /// Liveness flag: `true` until `close` completes.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot_rx.borrow().authenticated
    }

    /// The memoized user identity, resolved once when the connection
    /// opens.
    pub fn user_identifier(&self) -> Option<String> {
        self.snapshot_rx.borrow().user_id.clone()
    }

    /// `true` if this connection is associated with an identified user.
    pub fn is_user_connection(&self) -> bool {
        self.user_identifier().is_some()
    }

    /// Waits until teardown completes.
    pub async fn closed(&self) {
        let mut rx = self.snapshot_rx.clone();
        // The actor publishes the final snapshot before exiting, so a
        // dropped sender here also means the connection is gone.
        let _ = rx.wait_for(|s| s.state == LifecycleState::Closed).await;
    }

    async fn submit(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).await.is_err() {
            trace!(conn = %self.id, "command dropped: connection closed");
        }
    }
}

/// Exclusively owned connection state, driven by [`Actor::run`].
struct Actor {
    id: ConnectionId,
    config: ConnectionConfig,
    collab: Collaborators,
    snapshot_tx: watch::Sender<Snapshot>,
    cmd_tx: mpsc::Sender<Command>,
    state: LifecycleState,
    authenticated: bool,
    awaiting_pong: bool,
    queue: EventQueue,
    heartbeat_interval: Duration,
    heartbeat_epoch: u64,
    heartbeat_cancel: CancellationToken,
    auth_cancel: CancellationToken,
    /// Memoized identity lookup: `None` = not yet resolved.
    identity: Option<Option<String>>,
}

impl Actor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = cmd_rx.recv().await {
            self.handle(cmd).await;
            if self.state == LifecycleState::Closed {
                break;
            }
        }
        // All handles dropped without close, or teardown finished:
        // either way no timer may outlive the actor.
        self.heartbeat_cancel.cancel();
        self.auth_cancel.cancel();
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Open { initial } => self.on_open(initial).await,
            Command::Receive { raw } => self.on_receive(raw).await,
            Command::Pong => self.on_pong(),
            Command::Authenticate => self.on_authenticate(),
            Command::SetHeartbeatInterval(interval) => self.restart_heartbeat(interval),
            Command::Enqueue(event) => self.on_enqueue(event),
            Command::Trigger(event) => self.on_trigger(event).await,
            Command::Flush => self.on_flush().await,
            Command::SendMessage { name, data } => self.on_send_message(name, data),
            Command::Error { detail } => self.on_error(detail).await,
            Command::Close { reason } => self.on_close(reason).await,
            Command::HeartbeatTick { epoch } => self.on_heartbeat_tick(epoch).await,
            Command::AuthDeadline => self.on_auth_deadline().await,
        }
    }

    async fn on_open(&mut self, initial: Option<Value>) {
        self.start_heartbeat();
        if self.config.require_auth {
            tokio::spawn(auth_pump(
                self.cmd_tx.clone(),
                self.config.auth_grace_period,
                self.auth_cancel.clone(),
            ));
        }
        // Identity is fixed for the connection's lifetime; resolving it
        // here makes it visible to introspection from the start.
        self.resolve_identity();
        debug!(conn = %self.id, "connection opened");
        self.dispatch(Event::opened(self.id, initial)).await;
    }

    async fn on_receive(&mut self, raw: String) {
        if !self.state.is_open() {
            return;
        }
        match Event::decode(&raw, self.id) {
            Ok(event) => {
                trace!(conn = %self.id, event = event.name(), "inbound event");
                self.dispatch(event).await;
            }
            Err(e) => {
                warn!(conn = %self.id, error = %e, "failed to decode inbound payload");
                let detail = ConnectionError::Protocol(e.to_string()).to_string();
                self.on_error(Some(Value::String(detail))).await;
            }
        }
    }

    fn on_pong(&mut self) {
        if self.awaiting_pong {
            trace!(conn = %self.id, "pong received");
            self.awaiting_pong = false;
        }
    }

    fn on_authenticate(&mut self) {
        if !self.state.is_open() {
            // The watchdog already fired; late authentication is not honored.
            return;
        }
        self.auth_cancel.cancel();
        self.authenticated = true;
        if self.state == LifecycleState::OpenUnauthenticated {
            self.state = LifecycleState::OpenAuthenticated;
        }
        self.publish();
        debug!(conn = %self.id, "authenticated");
    }

    fn on_enqueue(&mut self, event: Event) {
        self.queue.enqueue(event);
    }

    fn on_send_message(&mut self, name: String, data: Value) {
        let user_id = self.resolve_identity();
        let event = Event::new(name, data, self.id).with_user(user_id);
        self.queue.enqueue(event);
    }

    async fn on_trigger(&mut self, event: Event) {
        let frame = match event.serialize() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn = %self.id, error = %e, "failed to serialize event");
                return;
            }
        };
        // Send failures here are non-fatal: only the heartbeat and auth
        // paths close the connection.
        if let Err(e) = self.collab.transport.send(frame).await {
            warn!(conn = %self.id, event = event.name(), error = %e, "trigger send failed");
        }
    }

    async fn on_flush(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let batch = self.queue.flush();
        let count = batch.len();
        let frame = match Event::serialize_batch(&batch) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn = %self.id, count, error = %e, "failed to serialize batch");
                return;
            }
        };
        match self.collab.transport.send(frame).await {
            // At-most-once per flush cycle: a failed batch is not
            // re-enqueued and the connection stays open.
            Err(e) => warn!(conn = %self.id, count, error = %e, "flush send failed"),
            Ok(()) => trace!(conn = %self.id, count, "flushed batch"),
        }
    }

    async fn on_error(&mut self, detail: Option<Value>) {
        if !self.state.is_open() {
            return;
        }
        self.dispatch(Event::error(self.id, detail.clone())).await;
        self.on_close(detail).await;
    }

    async fn on_close(&mut self, reason: Option<Value>) {
        if !self.state.is_open() {
            return;
        }
        self.state = LifecycleState::Closing;
        self.publish();

        // Cancel both timers before any collaborator call so a racing
        // tick cannot act mid-teardown.
        self.heartbeat_cancel.cancel();
        self.auth_cancel.cancel();

        self.dispatch(Event::closed(self.id, reason)).await;
        self.collab.data_store.destroy(self.id).await;
        self.collab.dispatcher.deregister(self.id).await;

        self.state = LifecycleState::Closed;
        self.publish();
        debug!(conn = %self.id, "connection closed");
    }

    async fn on_heartbeat_tick(&mut self, epoch: u64) {
        if epoch != self.heartbeat_epoch || !self.state.is_open() {
            // Stale pump after an interval change, or already closing.
            return;
        }
        if self.awaiting_pong {
            warn!(conn = %self.id, "heartbeat pong not received — closing");
            self.heartbeat_cancel.cancel();
            let detail = ConnectionError::LivenessTimeout.to_string();
            self.on_error(Some(Value::String(detail))).await;
            return;
        }
        self.awaiting_pong = true;
        // Pings bypass the queue so liveness probes are never delayed
        // behind buffered application traffic.
        self.on_trigger(Event::ping(self.id)).await;
    }

    async fn on_auth_deadline(&mut self) {
        if self.authenticated || !self.state.is_open() {
            return;
        }
        warn!(conn = %self.id, "authentication grace period elapsed — closing");
        self.auth_cancel.cancel();
        let detail = ConnectionError::AuthTimeout.to_string();
        self.on_error(Some(Value::String(detail))).await;
    }

    fn start_heartbeat(&mut self) {
        // Retire any previous pump so only one heartbeat is ever live.
        self.heartbeat_cancel.cancel();
        self.heartbeat_epoch += 1;
        self.heartbeat_cancel = CancellationToken::new();
        self.awaiting_pong = false;
        tokio::spawn(heartbeat_pump(
            self.cmd_tx.clone(),
            self.heartbeat_interval,
            self.heartbeat_epoch,
            self.heartbeat_cancel.clone(),
        ));
    }

    fn restart_heartbeat(&mut self, interval: Duration) {
        if !self.state.is_open() {
            return;
        }
        self.heartbeat_interval = interval;
        self.start_heartbeat();
        debug!(conn = %self.id, interval_secs = interval.as_secs_f64(), "heartbeat restarted");
    }

    fn resolve_identity(&mut self) -> Option<String> {
        if self.identity.is_none() {
            let resolved = self
                .collab
                .identity
                .resolve(&self.config.user_identifier_field);
            self.identity = Some(resolved);
            self.publish();
        }
        self.identity.clone().flatten()
    }

    async fn dispatch(&self, event: Event) {
        self.collab.dispatcher.dispatch(event).await;
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(Snapshot {
            state: self.state,
            authenticated: self.authenticated,
            user_id: self.identity.clone().flatten(),
        });
    }
}
