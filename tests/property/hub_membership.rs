// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc
)]

//! Property-based tests for hub membership.
//!
//! Random sequences of joins, re-joins, leaves and disconnects over a small
//! pool of connections, rooms and identities. After every step each joined
//! connection's most recent roster must match the room's actual membership.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use signal_proto::{Message, MessageType};
use signal_relay::client::{Client, ClientState};
use signal_relay::hub::Hub;
use tokio::sync::mpsc;

const CONNS: usize = 4;
const ROOMS: [&str; 2] = ["R1", "R2"];
const IDS: [&str; 3] = ["alice", "bob", "carol"];

#[derive(Debug, Clone)]
enum Op {
    Join { conn: usize, room: usize, id: usize },
    Leave { conn: usize },
    Disconnect { conn: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..CONNS, 0..ROOMS.len(), 0..IDS.len())
            .prop_map(|(conn, room, id)| Op::Join { conn, room, id }),
        1 => (0..CONNS).prop_map(|conn| Op::Leave { conn }),
        1 => (0..CONNS).prop_map(|conn| Op::Disconnect { conn }),
    ]
}

/// One test connection: the hub-side client, its mailbox, and the last
/// roster it was sent.
struct Conn {
    client: Arc<Client>,
    rx: mpsc::Receiver<Message>,
    roster: Option<BTreeSet<String>>,
}

impl Conn {
    fn new() -> Self {
        let (client, rx) = Client::new(32);
        Self {
            client,
            rx,
            roster: None,
        }
    }

    fn drain(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            if msg.kind == MessageType::RoomMembers {
                self.roster = msg.members;
            }
        }
    }
}

fn apply(hub: &Hub, conns: &mut [Conn], op: &Op) {
    match *op {
        Op::Join { conn, room, id } => {
            // A removed connection is gone for good; model a fresh one.
            if conns[conn].client.state() == ClientState::Removed {
                conns[conn] = Conn::new();
            }
            hub.dispatch(&conns[conn].client, Message::join(ROOMS[room], IDS[id]));
        }
        Op::Leave { conn } => {
            let client = &conns[conn].client;
            let (room, id) = client.registration().unwrap_or_default();
            hub.dispatch(client, Message::leave(room, id));
        }
        Op::Disconnect { conn } => hub.disconnect(&conns[conn].client),
    }
}

proptest! {
    #[test]
    fn joined_members_see_current_roster(ops in prop::collection::vec(arb_op(), 1..40)) {
        let hub = Hub::new();
        let mut conns: Vec<Conn> = (0..CONNS).map(|_| Conn::new()).collect();

        for op in &ops {
            apply(&hub, &mut conns, op);

            let mut registered = 0;
            for conn in &mut conns {
                conn.drain();
                if let Some((room, _)) = conn.client.registration() {
                    registered += 1;
                    prop_assert_eq!(conn.roster.clone(), hub.room_members(&room), "after {:?}", op);
                }
            }

            prop_assert_eq!(hub.client_count(), registered);
            for room in ROOMS {
                if let Some(members) = hub.room_members(room) {
                    prop_assert!(!members.is_empty(), "room {} kept with no members", room);
                }
            }
        }
    }
}
