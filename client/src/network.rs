//! Client network loop
//!
//! Connects to the auction server, syncs the clock from the initial snapshot,
//! keeps the local catalog view current from broadcasts, and turns stdin
//! lines into bid and reset commands.

use crate::clock::ServerClock;
use crate::view::{CatalogView, LotPhase, Standing};
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{Packet, UserInfo};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

pub struct AuctionClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    session_token: Option<String>,

    me: Option<UserInfo>,
    clock: Option<ServerClock>,
    view: Option<CatalogView>,
}

impl AuctionClient {
    pub async fn new(
        server_addr: &str,
        session_token: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(AuctionClient {
            socket,
            server_addr,
            session_token,
            me: None,
            clock: None,
            view: None,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to auction server...");

        let packet = Packet::Connect {
            session_token: self.session_token.clone(),
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Welcome { user } => {
                info!("Welcome, {} ({})", user.name, user.id);
                self.me = Some(user);
            }

            Packet::Snapshot { lots, server_time } => {
                // The offset is derived once, from the first snapshot; later
                // snapshots only refresh lot state
                if self.clock.is_none() {
                    let clock = ServerClock::sync(server_time);
                    info!("Clock synced, offset {}ms", clock.offset_ms());
                    self.clock = Some(clock);
                }

                let my_id = self
                    .me
                    .as_ref()
                    .map(|user| user.id.clone())
                    .unwrap_or_default();
                let now = self.clock.map(|clock| clock.now()).unwrap_or(server_time);

                info!("Catalog snapshot: {} lots", lots.len());
                self.view = Some(CatalogView::new(my_id, lots, now));
            }

            Packet::BidUpdate {
                lot_id,
                current_price,
                winner_id,
                winner_name,
            } => {
                if let Some(view) = self.view.as_mut() {
                    match view.apply_update(lot_id, current_price, winner_id, winner_name) {
                        Some(lot_view) => match lot_view.standing {
                            Standing::Winning => {
                                info!("Lot {} now at {}, you are winning", lot_id, current_price)
                            }
                            Standing::Outbid => info!(
                                "Lot {} now at {}, held by {}",
                                lot_id,
                                current_price,
                                lot_view.lot.winner_name.as_deref().unwrap_or("someone")
                            ),
                            Standing::Neutral => {
                                info!("Lot {} now at {}", lot_id, current_price)
                            }
                        },
                        None => warn!("Update for unknown lot {}", lot_id),
                    }
                }
            }

            Packet::BidAccepted { lot_id } => {
                info!("Bid on lot {} accepted", lot_id);
            }

            Packet::BidRejected {
                lot_id,
                reason,
                current_price,
            } => match current_price {
                Some(price) => warn!(
                    "Bid on lot {} rejected: {} (current price {})",
                    lot_id, reason, price
                ),
                None => warn!("Bid on lot {} rejected: {}", lot_id, reason),
            },

            Packet::AuctionsReset { lots, server_time } => {
                info!("Auctions reset: {} lots reopened", lots.len());
                if self.clock.is_none() {
                    self.clock = Some(ServerClock::sync(server_time));
                }
                match self.view.as_mut() {
                    Some(view) => view.apply_reset(lots),
                    None => {
                        let my_id = self
                            .me
                            .as_ref()
                            .map(|user| user.id.clone())
                            .unwrap_or_default();
                        let now = self.clock.map(|clock| clock.now()).unwrap_or(server_time);
                        self.view = Some(CatalogView::new(my_id, lots, now));
                    }
                }
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    fn report_ended_lots(&mut self) {
        let (Some(clock), Some(view)) = (self.clock, self.view.as_mut()) else {
            return;
        };

        for (lot_id, phase) in view.tick(clock.now()) {
            match phase {
                LotPhase::EndedUnsold => info!("Lot {} ended unsold", lot_id),
                LotPhase::EndedWonByMe => info!("Lot {} ended, you won!", lot_id),
                LotPhase::EndedWonByOther => {
                    let winner = view
                        .lot(lot_id)
                        .and_then(|lot_view| lot_view.lot.winner_name.clone())
                        .unwrap_or_else(|| "someone".to_string());
                    info!("Lot {} ended, won by {}", lot_id, winner);
                }
                LotPhase::Open => {}
            }
        }
    }

    fn print_lots(&self) {
        let (Some(clock), Some(view)) = (self.clock, self.view.as_ref()) else {
            info!("No catalog yet");
            return;
        };

        for lot_view in view.lots() {
            let lot = &lot_view.lot;
            info!(
                "Lot {}: '{}' at {} ({}s left, {:?}/{:?})",
                lot.id,
                lot.title,
                lot.current_price,
                clock.remaining_ms(lot.deadline_ms) / 1000,
                lot_view.phase,
                lot_view.standing,
            );
        }
    }

    async fn handle_command(&mut self, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            ["bid", lot_id, amount] => match (lot_id.parse::<u32>(), amount.parse::<u64>()) {
                (Ok(lot_id), Ok(amount)) => {
                    self.send_packet(&Packet::PlaceBid { lot_id, amount }).await?;
                }
                _ => warn!("Usage: bid <lot-id> <amount>"),
            },
            ["reset"] => {
                self.send_packet(&Packet::Reset).await?;
            }
            ["lots"] => {
                self.print_lots();
            }
            ["quit"] => {
                self.send_packet(&Packet::Disconnect).await?;
                return Ok(true);
            }
            [] => {}
            _ => warn!("Commands: bid <lot-id> <amount> | lots | reset | quit"),
        }

        Ok(false)
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut countdown_interval = interval(Duration::from_millis(100));
        let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut buffer = [0u8; 8192];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet);
                            } else {
                                warn!("Dropping malformed datagram from server");
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = countdown_interval.tick() => {
                    self.report_ended_lots();
                },

                line = stdin_lines.next_line(), if stdin_open => {
                    match line? {
                        Some(line) => {
                            if self.handle_command(&line).await? {
                                break;
                            }
                        }
                        None => {
                            // stdin closed; keep observing broadcasts
                            stdin_open = false;
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
