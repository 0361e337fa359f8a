//! Per-connection client state, its bounded outbound mailbox, and the
//! outbound task that drains the mailbox into the transport.
//!
//! The [`Hub`](crate::hub::Hub) is the only producer that matters here: it
//! pushes membership snapshots and forwarded signals into mailboxes with
//! [`Client::push`], which never waits. Exactly one [`run_outbound`] task
//! consumes each mailbox.

use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use parking_lot::Mutex;
use signal_proto::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Default number of outbound messages buffered per connection.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Identifies one accepted connection, independent of the identity it
/// claims with `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    /// Creates a new time-ordered connection identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection as seen by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Accepted but not yet joined to a room.
    Anonymous,
    /// Registered in `room` under identity `id`.
    Joined {
        /// Room the connection is registered in.
        room: String,
        /// Identity claimed by the connection's `join`.
        id: String,
    },
    /// Left, evicted, or disconnected. Terminal.
    Removed,
}

/// Outcome of a non-blocking mailbox push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// The message is queued for the outbound task.
    Delivered,
    /// The mailbox is at capacity; the message was dropped.
    Full,
    /// The mailbox is closed or its consumer is gone; the message was dropped.
    Closed,
}

/// How an outbound task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// The mailbox was closed and fully drained. Clean shutdown.
    MailboxClosed,
    /// Writing to the transport failed.
    WriteFailed,
}

/// One connection's state and outbound mailbox.
///
/// State changes happen under the hub's write lock; the mutex here only
/// makes the client shareable between the hub and the connection tasks.
#[derive(Debug)]
pub struct Client {
    conn_id: ConnId,
    state: Mutex<ClientState>,
    mailbox: Mutex<Option<mpsc::Sender<Message>>>,
}

impl Client {
    /// Creates an anonymous client and the receiving end of its mailbox.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let client = Self {
            conn_id: ConnId::new(),
            state: Mutex::new(ClientState::Anonymous),
            mailbox: Mutex::new(Some(tx)),
        };
        (Arc::new(client), rx)
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state.lock().clone()
    }

    /// Returns `(room, id)` while the client is joined.
    #[must_use]
    pub fn registration(&self) -> Option<(String, String)> {
        match &*self.state.lock() {
            ClientState::Joined { room, id } => Some((room.clone(), id.clone())),
            ClientState::Anonymous | ClientState::Removed => None,
        }
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        *self.state.lock() = state;
    }

    /// Queues a message without waiting. Full or closed mailboxes drop it.
    pub fn push(&self, msg: Message) -> Push {
        match self.try_push(msg) {
            Ok(()) => Push::Delivered,
            Err((outcome, _)) => outcome,
        }
    }

    /// Like [`push`](Self::push), but hands a dropped message back with the
    /// reason it was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Push::Full`] or [`Push::Closed`] together with `msg`.
    pub fn try_push(&self, msg: Message) -> Result<(), (Push, Message)> {
        let mailbox = self.mailbox.lock();
        let Some(tx) = mailbox.as_ref() else {
            return Err((Push::Closed, msg));
        };
        tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(msg) => (Push::Full, msg),
            TrySendError::Closed(msg) => (Push::Closed, msg),
        })
    }

    /// Closes the mailbox. Returns `true` only for the call that closed it.
    ///
    /// Already-queued messages are still delivered before the outbound task
    /// observes the close.
    pub fn close_mailbox(&self) -> bool {
        self.mailbox.lock().take().is_some()
    }

    /// Whether the mailbox has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.mailbox.lock().is_none()
    }
}

/// Drains `mailbox` into `sink` until the mailbox closes or a write fails.
///
/// A closed mailbox is a clean end: the sink is closed too, which for a
/// WebSocket sends the close frame.
pub async fn run_outbound<S>(
    client: Arc<Client>,
    mut mailbox: mpsc::Receiver<Message>,
    mut sink: S,
) -> OutboundExit
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(msg) = mailbox.recv().await {
        if let Err(e) = sink.send(msg).await {
            let (room, id) = client.registration().unwrap_or_default();
            tracing::warn!(
                conn = %client.conn_id(),
                room = %room,
                id = %id,
                error = %e,
                "outbound write failed"
            );
            return OutboundExit::WriteFailed;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(conn = %client.conn_id(), error = %e, "closing sink failed");
    }
    tracing::debug!(conn = %client.conn_id(), "mailbox closed, outbound task done");
    OutboundExit::MailboxClosed
}
