//! The hub: room registry and message router.
//!
//! Maps room name → identity → [`Client`] under a single reader/writer lock.
//! Joins and removals take the write lock and broadcast the room's fresh
//! membership; point-to-point forwards take the read lock. Inside the lock
//! the hub only touches the maps and performs non-blocking mailbox pushes,
//! so no peer's network speed can stall the registry.
//!
//! Delivery is best-effort throughout: an unknown target or a full mailbox
//! drops the message without telling the sender.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::Sink;
use parking_lot::RwLock;
use signal_proto::{Message, MessageType};
use tokio::task::JoinHandle;

use crate::client::{self, Client, ClientState, DEFAULT_MAILBOX_CAPACITY, OutboundExit, Push};
use crate::origin::OriginPolicy;

/// Members of one room, keyed by identity.
type Room = HashMap<String, Arc<Client>>;

/// Construction-time settings for a [`Hub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound messages buffered per connection before drops start.
    pub mailbox_capacity: usize,
    /// Which origins the connection adapter admits.
    pub origin_policy: OriginPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            origin_policy: OriginPolicy::default(),
        }
    }
}

/// Shared room registry and router.
#[derive(Debug, Default)]
pub struct Hub {
    rooms: RwLock<HashMap<String, Room>>,
    config: HubConfig,
}

impl Hub {
    /// Creates a hub with default mailbox capacity and the loopback origin
    /// policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hub with explicit settings.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The origin policy the connection adapter must apply before
    /// [`Hub::connect`].
    #[must_use]
    pub const fn origin_policy(&self) -> &OriginPolicy {
        &self.config.origin_policy
    }

    /// Accepts a new anonymous connection.
    ///
    /// Spawns the client's outbound task, which writes every mailbox message
    /// into `sink` until the mailbox is closed or a write fails. The owning
    /// connection loop keeps the returned client for [`Hub::dispatch`] and
    /// must call [`Hub::disconnect`] when it ends.
    pub fn connect<S>(&self, sink: S) -> (Arc<Client>, JoinHandle<OutboundExit>)
    where
        S: Sink<Message> + Send + Unpin + 'static,
        S::Error: std::fmt::Display,
    {
        let (client, mailbox) = Client::new(self.config.mailbox_capacity);
        let outbound = tokio::spawn(client::run_outbound(Arc::clone(&client), mailbox, sink));
        tracing::debug!(conn = %client.conn_id(), "client connected");
        (client, outbound)
    }

    /// Routes one inbound message from `client`.
    ///
    /// Messages missing the fields their type needs are ignored, as are
    /// keepalives and unknown types; none of these affect the connection.
    pub fn dispatch(&self, client: &Arc<Client>, msg: Message) {
        match &msg.kind {
            MessageType::Join => {
                if msg.room.is_empty() || msg.from.is_empty() {
                    tracing::debug!(conn = %client.conn_id(), "join without room or identity ignored");
                    return;
                }
                self.join(client, msg.room, msg.from);
            }
            MessageType::Leave => self.remove_client(client),
            kind if kind.is_forwarded() => {
                if msg.to.is_empty() {
                    tracing::debug!(
                        conn = %client.conn_id(),
                        kind = %kind,
                        room = %msg.room,
                        "signal without target dropped"
                    );
                    return;
                }
                self.forward(msg);
            }
            MessageType::Ping | MessageType::Pong => {
                tracing::trace!(conn = %client.conn_id(), kind = %msg.kind, "keepalive");
            }
            kind => {
                tracing::debug!(
                    conn = %client.conn_id(),
                    kind = %kind,
                    room = %msg.room,
                    from = %msg.from,
                    "ignoring message type"
                );
            }
        }
    }

    /// Registers `client` in `room` as `id` and broadcasts the new roster.
    ///
    /// A connection that is already joined elsewhere (or under another
    /// identity) is first detached from its previous registration, and that
    /// room gets its own roster update. Removed connections cannot join.
    pub fn join(&self, client: &Arc<Client>, room: String, id: String) {
        let mut rooms = self.rooms.write();
        match client.state() {
            ClientState::Removed => {
                tracing::debug!(conn = %client.conn_id(), "join on removed connection ignored");
                return;
            }
            ClientState::Joined {
                room: prev_room,
                id: prev_id,
            } if prev_room != room || prev_id != id => {
                tracing::info!(
                    conn = %client.conn_id(),
                    from_room = %prev_room,
                    to_room = %room,
                    "client re-joining, leaving previous room"
                );
                detach(&mut rooms, client, &prev_room, &prev_id);
            }
            ClientState::Joined { .. } | ClientState::Anonymous => {}
        }
        client.set_state(ClientState::Joined { room, id });
        insert(&mut rooms, client);
    }

    /// Inserts a joined client into its room, replacing any entry with the
    /// same identity, and broadcasts the room's members to everyone in it.
    ///
    /// Clients that are not joined are ignored.
    pub fn add_client(&self, client: &Arc<Client>) {
        let mut rooms = self.rooms.write();
        insert(&mut rooms, client);
    }

    /// Removes `client` from its room, closes its mailbox, and broadcasts
    /// the shrunken roster. The last member leaving deletes the room.
    ///
    /// No-op for anonymous or already-removed clients.
    pub fn remove_client(&self, client: &Arc<Client>) {
        let mut rooms = self.rooms.write();
        remove(&mut rooms, client);
    }

    /// Connection teardown: removes `client` if joined and closes its
    /// mailbox whatever state it was in.
    pub fn disconnect(&self, client: &Arc<Client>) {
        let mut rooms = self.rooms.write();
        remove(&mut rooms, client);
        client.set_state(ClientState::Removed);
        if client.close_mailbox() {
            tracing::debug!(conn = %client.conn_id(), "anonymous client disconnected");
        }
    }

    /// Delivers `msg` to `rooms[msg.room][msg.to]`.
    ///
    /// Returns whether the message was queued. Unknown rooms, unknown
    /// targets, and full mailboxes all drop silently.
    pub fn forward(&self, msg: Message) -> bool {
        let rooms = self.rooms.read();
        let Some((room, to, target)) = rooms.get_key_value(&msg.room).and_then(|(room, members)| {
            members
                .get_key_value(&msg.to)
                .map(|(to, target)| (room, to, target))
        }) else {
            tracing::debug!(room = %msg.room, to = %msg.to, from = %msg.from, "forward target not found");
            return false;
        };

        match target.try_push(msg) {
            Ok(()) => {
                tracing::debug!(room = %room, to = %to, "forwarded");
                true
            }
            Err((outcome, msg)) => {
                tracing::debug!(room = %room, to = %to, kind = %msg.kind, ?outcome, "forward dropped");
                false
            }
        }
    }

    /// Closes every registered client's mailbox and empties the registry.
    ///
    /// Each outbound task flushes what is queued and closes its connection.
    pub fn close_all(&self) {
        let mut rooms = self.rooms.write();
        for (name, members) in rooms.drain() {
            for client in members.into_values() {
                client.set_state(ClientState::Removed);
                client.close_mailbox();
            }
            tracing::info!(room = %name, "room closed for shutdown");
        }
    }

    /// Current members of `room`, or `None` if the room does not exist.
    #[must_use]
    pub fn room_members(&self, room: &str) -> Option<BTreeSet<String>> {
        self.rooms.read().get(room).map(|m| m.keys().cloned().collect())
    }

    /// Whether `room` currently exists.
    #[must_use]
    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.read().contains_key(room)
    }

    /// Number of open rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Number of registered clients across all rooms.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.rooms.read().values().map(HashMap::len).sum()
    }
}

fn insert(rooms: &mut HashMap<String, Room>, client: &Arc<Client>) {
    let Some((room, id)) = client.registration() else {
        return;
    };
    let members = rooms.entry(room.clone()).or_default();
    if members.is_empty() {
        tracing::info!(room = %room, "room opened");
    }

    if let Some(previous) = members.insert(id.clone(), Arc::clone(client))
        && previous.conn_id() != client.conn_id()
    {
        previous.set_state(ClientState::Removed);
        previous.close_mailbox();
        tracing::info!(
            room = %room,
            id = %id,
            old_conn = %previous.conn_id(),
            new_conn = %client.conn_id(),
            "identity taken over by new connection"
        );
    }

    tracing::info!(room = %room, id = %id, conn = %client.conn_id(), members = members.len(), "join");
    broadcast_members(&room, members);
}

fn remove(rooms: &mut HashMap<String, Room>, client: &Arc<Client>) {
    let Some((room, id)) = client.registration() else {
        return;
    };
    if detach(rooms, client, &room, &id) {
        client.set_state(ClientState::Removed);
        client.close_mailbox();
        tracing::info!(room = %room, id = %id, conn = %client.conn_id(), "leave");
    }
}

/// Deletes the `(room, id)` entry if it belongs to `client`'s connection,
/// then either drops the empty room or broadcasts its new roster.
fn detach(rooms: &mut HashMap<String, Room>, client: &Arc<Client>, room: &str, id: &str) -> bool {
    let Some(members) = rooms.get_mut(room) else {
        return false;
    };
    if !members
        .get(id)
        .is_some_and(|existing| existing.conn_id() == client.conn_id())
    {
        return false;
    }
    members.remove(id);

    if members.is_empty() {
        rooms.remove(room);
        tracing::info!(room = %room, "room closed");
    } else {
        broadcast_members(room, members);
    }
    true
}

fn broadcast_members(room: &str, members: &Room) {
    let roster = Message::room_members(room, members.keys().cloned().collect());
    for (id, client) in members {
        match client.push(roster.clone()) {
            Push::Delivered => {}
            outcome => {
                tracing::debug!(room = %room, id = %id, ?outcome, "member update dropped");
            }
        }
    }
}
