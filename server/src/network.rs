//! Server network layer: UDP front end and main event loop
//!
//! One receiver task feeds datagrams into the main loop; the main loop
//! dispatches them against the registry and ledger and queues replies on the
//! broadcaster. Malformed datagrams are dropped at this boundary with a log
//! line; one client's garbage never reaches arbitration or affects others.

use bincode::deserialize;
use log::{error, info, warn};
use parking_lot::RwLock;
use shared::{now_ms, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::broadcast::{Broadcaster, ObserverTable};
use crate::catalog::LotConfig;
use crate::ledger::{AuctionLedger, BidOutcome, LedgerEvent};
use crate::registry::UserRegistry;

/// Identities that have not re-registered within this window are reclaimed.
const IDENTITY_TTL: Duration = Duration::from_secs(30 * 60);
/// How often the eviction sweeper runs.
const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Messages sent from the receiver task to the main loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Main server coordinating registration, arbitration and fan-out.
pub struct AuctionServer {
    socket: Arc<UdpSocket>,
    registry: Arc<UserRegistry>,
    ledger: Arc<AuctionLedger>,
    observers: Arc<RwLock<ObserverTable>>,
    broadcaster: Broadcaster,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    ledger_events: Option<mpsc::UnboundedReceiver<LedgerEvent>>,
}

impl AuctionServer {
    pub async fn new(
        addr: &str,
        catalog: Vec<LotConfig>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Auction server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(UserRegistry::new());
        let ledger = Arc::new(AuctionLedger::new(
            catalog,
            Arc::clone(&registry),
            event_tx,
        ));
        let observers = Arc::new(RwLock::new(ObserverTable::new()));
        let broadcaster = Broadcaster::spawn(Arc::clone(&socket), Arc::clone(&observers));

        Ok(AuctionServer {
            socket,
            registry,
            ledger,
            observers,
            broadcaster,
            server_tx,
            server_rx,
            ledger_events: Some(event_rx),
        })
    }

    /// Address the server actually bound to (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Spawns the task that continuously listens for incoming datagrams.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Dropping malformed datagram from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the registry growth-control sweeper.
    ///
    /// Runs well away from the bid path; the bid path itself never cleans up.
    fn spawn_eviction_sweeper(&self) {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
            interval.tick().await; // the first tick fires immediately

            loop {
                interval.tick().await;
                let evicted = registry.evict_idle(IDENTITY_TTL.as_millis() as u64, now_ms());
                if !evicted.is_empty() {
                    info!("Eviction sweep reclaimed {} identities", evicted.len());
                }
            }
        });
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { session_token } => {
                // A reconnect from the same address replaces the old observer
                let existing = self.observers.read().find_by_addr(addr);
                if let Some(existing_id) = existing {
                    info!("Replacing existing observer {} from {}", existing_id, addr);
                    self.observers.write().remove(existing_id);
                }

                let connection_id = self.observers.write().add(addr);
                let user =
                    self.registry
                        .register(connection_id, session_token.as_deref(), now_ms());
                info!(
                    "Connection {} from {} registered as '{}'",
                    connection_id, addr, user.name
                );

                self.broadcaster.send(Packet::Welcome { user }, addr);
                self.broadcaster.send(
                    Packet::Snapshot {
                        lots: self.ledger.list_lots(),
                        server_time: now_ms(),
                    },
                    addr,
                );
            }

            Packet::PlaceBid { lot_id, amount } => {
                // The submitter is whoever owns the sending address, never
                // whatever the payload claims
                let connection_id = match self.observers.read().find_by_addr(addr) {
                    Some(id) => id,
                    None => {
                        warn!("Bid from unconnected address {}", addr);
                        return;
                    }
                };

                match self.ledger.place_bid(lot_id, amount, connection_id) {
                    BidOutcome::Accepted(lot) => {
                        // The broadcast goes out through the event pump; only
                        // the ack is targeted at the submitter
                        self.broadcaster
                            .send(Packet::BidAccepted { lot_id: lot.id }, addr);
                    }
                    BidOutcome::Rejected {
                        reason,
                        current_price,
                    } => {
                        self.broadcaster.send(
                            Packet::BidRejected {
                                lot_id,
                                reason,
                                current_price,
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Reset => {
                info!("Reset requested from {}", addr);
                self.ledger.reset();
            }

            Packet::Disconnect => {
                // Observer bookkeeping only; registry entries survive so the
                // identity is still there when the token returns
                let connection_id = self.observers.read().find_by_addr(addr);
                if let Some(connection_id) = connection_id {
                    self.observers.write().remove(connection_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop. Runs until the message channel closes.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_eviction_sweeper();
        if let Some(events) = self.ledger_events.take() {
            self.broadcaster.spawn_event_pump(events);
        }

        info!(
            "Auction server started with {} lots",
            self.ledger.lot_count()
        );

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr);
                }
                Some(ServerMessage::Shutdown) | None => {
                    info!("Auction server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
