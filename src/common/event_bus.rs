//! Publish/subscribe seam between the coordinator and the transport.
//!
//! Every connection is a subscriber with an mpsc queue.  The connection thread
//! drains that queue onto its websocket, so the coordinator never touches a
//! socket.
use std::collections::HashMap;
use std::sync::mpsc;

use log::{debug, trace};

use crate::common::bus_message::BusMessage;

pub type ConnId = u64;

/// An inbound message, stamped with the coordinator clock when it arrived
#[derive(Debug)]
pub enum Inbound {
    Connected(ConnId, mpsc::Sender<BusMessage>),
    Message {
        conn: ConnId,
        msg: BusMessage,
        received_at: u128,
    },
    Disconnected(ConnId),
}

pub trait EventBus {
    fn subscribe(&mut self, conn: ConnId, tx: mpsc::Sender<BusMessage>) -> ();
    fn unsubscribe(&mut self, conn: ConnId) -> ();
    /// send to every subscriber
    fn publish(&mut self, msg: &BusMessage) -> ();
    /// send to a single subscriber
    fn send_to(&mut self, conn: ConnId, msg: &BusMessage) -> ();
}

pub struct ChannelBus {
    subscribers: HashMap<ConnId, mpsc::Sender<BusMessage>>,
}

impl ChannelBus {
    pub fn new() -> ChannelBus {
        ChannelBus {
            subscribers: HashMap::new(),
        }
    }
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl EventBus for ChannelBus {
    fn subscribe(&mut self, conn: ConnId, tx: mpsc::Sender<BusMessage>) -> () {
        debug!("bus: subscribe {}", conn);
        self.subscribers.insert(conn, tx);
    }
    fn unsubscribe(&mut self, conn: ConnId) -> () {
        if self.subscribers.remove(&conn).is_some() {
            debug!("bus: unsubscribe {}", conn);
        }
    }
    fn publish(&mut self, msg: &BusMessage) -> () {
        trace!("bus publish: {}", msg);
        // a closed queue means the connection thread is gone
        self.subscribers
            .retain(|conn, tx| match tx.send(msg.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!("bus: dropping closed subscriber {}", conn);
                    false
                }
            });
    }
    fn send_to(&mut self, conn: ConnId, msg: &BusMessage) -> () {
        let closed = match self.subscribers.get(&conn) {
            Some(tx) => tx.send(msg.clone()).is_err(),
            None => {
                debug!("bus: no subscriber {} for {}", conn, msg.event());
                false
            }
        };
        if closed {
            self.unsubscribe(conn);
        }
    }
}
