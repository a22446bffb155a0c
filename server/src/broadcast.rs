//! Broadcast fan-out of accepted state changes
//!
//! Delivery is decoupled from arbitration: the ledger and network loop only
//! ever enqueue, a dedicated sender task owns the socket writes. A slow or
//! disconnected observer can therefore never delay a bidder. Delivery is
//! best-effort and at-most-once; an observer that misses an event recovers
//! via the snapshot it gets on reconnect.

use bincode::serialize;
use log::{debug, error, info};
use parking_lot::RwLock;
use shared::{now_ms, Packet};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::ledger::LedgerEvent;

/// Messages consumed by the sender task.
#[derive(Debug)]
pub enum Delivery {
    /// Targeted delivery to one observer (acks and rejections).
    Send { packet: Packet, addr: SocketAddr },
    /// Fan-out to every currently connected observer, submitter included.
    Broadcast { packet: Packet },
}

/// Live observers by connection id.
///
/// Connection ids are sequential and never reused, which is what lets the
/// registry synthesize collision-free anonymous identities from them.
#[derive(Debug, Default)]
pub struct ObserverTable {
    observers: HashMap<u64, SocketAddr>,
    next_connection_id: u64,
}

impl ObserverTable {
    pub fn new() -> Self {
        Self {
            observers: HashMap::new(),
            next_connection_id: 1,
        }
    }

    /// Registers an observer and returns its new connection id.
    pub fn add(&mut self, addr: SocketAddr) -> u64 {
        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;
        self.observers.insert(connection_id, addr);
        info!("Observer {} connected from {}", connection_id, addr);
        connection_id
    }

    /// Drops an observer. Returns true if it was present.
    pub fn remove(&mut self, connection_id: u64) -> bool {
        if self.observers.remove(&connection_id).is_some() {
            info!("Observer {} disconnected", connection_id);
            true
        } else {
            false
        }
    }

    /// Finds the connection currently associated with a network address.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u64> {
        self.observers
            .iter()
            .find(|(_, observer_addr)| **observer_addr == addr)
            .map(|(id, _)| *id)
    }

    /// Snapshot of every observer for a fan-out pass.
    pub fn addrs(&self) -> Vec<(u64, SocketAddr)> {
        self.observers
            .iter()
            .map(|(id, addr)| (*id, *addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// Maps an accepted ledger event to its wire packet.
fn event_packet(event: LedgerEvent) -> Packet {
    match event {
        LedgerEvent::BidAccepted(lot) => Packet::BidUpdate {
            lot_id: lot.id,
            current_price: lot.current_price,
            winner_id: lot.winner_id.unwrap_or_default(),
            winner_name: lot.winner_name.unwrap_or_default(),
        },
        LedgerEvent::Reset(lots) => Packet::AuctionsReset {
            lots,
            server_time: now_ms(),
        },
    }
}

/// Queues outbound packets for the sender task.
///
/// Cloneable handle; all consumers of one handle feed the same FIFO queue,
/// which preserves per-lot ordering end to end.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    delivery_tx: mpsc::UnboundedSender<Delivery>,
}

impl Broadcaster {
    /// Spawns the sender task that owns all socket writes.
    pub fn spawn(socket: Arc<UdpSocket>, observers: Arc<RwLock<ObserverTable>>) -> Self {
        let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel::<Delivery>();

        tokio::spawn(async move {
            while let Some(delivery) = delivery_rx.recv().await {
                match delivery {
                    Delivery::Send { packet, addr } => {
                        if let Err(e) = send_packet(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Delivery::Broadcast { packet } => {
                        let targets = observers.read().addrs();
                        for (connection_id, addr) in targets {
                            if let Err(e) = send_packet(&socket, &packet, addr).await {
                                error!("Failed to send to observer {}: {}", connection_id, e);
                            }
                        }
                    }
                }
            }
        });

        Self { delivery_tx }
    }

    /// Spawns the pump that turns ledger events into broadcasts.
    pub fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<LedgerEvent>) {
        let delivery_tx = self.delivery_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let packet = event_packet(event);
                if delivery_tx.send(Delivery::Broadcast { packet }).is_err() {
                    debug!("Delivery queue closed, stopping event pump");
                    break;
                }
            }
        });
    }

    /// Queues a targeted packet for one observer.
    pub fn send(&self, packet: Packet, addr: SocketAddr) {
        if self
            .delivery_tx
            .send(Delivery::Send { packet, addr })
            .is_err()
        {
            error!("Failed to queue packet for {}", addr);
        }
    }

    /// Queues a fan-out to every observer.
    pub fn broadcast(&self, packet: Packet) {
        if self.delivery_tx.send(Delivery::Broadcast { packet }).is_err() {
            error!("Failed to queue broadcast packet");
        }
    }
}

async fn send_packet(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}
