use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Current authoritative time as unix milliseconds.
///
/// The server clock is ground truth for all deadline math; clients only ever
/// approximate it via the offset carried in snapshots.
pub fn now_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Connect {
        session_token: Option<String>,
    },
    PlaceBid {
        lot_id: u32,
        amount: u64,
    },
    Reset,
    Disconnect,

    // Server -> client
    Welcome {
        user: UserInfo,
    },
    Snapshot {
        lots: Vec<Lot>,
        server_time: u64,
    },
    BidUpdate {
        lot_id: u32,
        current_price: u64,
        winner_id: String,
        winner_name: String,
    },
    BidAccepted {
        lot_id: u32,
    },
    BidRejected {
        lot_id: u32,
        reason: RejectReason,
        current_price: Option<u64>,
    },
    AuctionsReset {
        lots: Vec<Lot>,
        server_time: u64,
    },
}

/// A registered participant as presented to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
}

/// Snapshot of one auctionable item.
///
/// `current_price` never drops below `start_price`, and the winner fields are
/// populated exactly when `current_price` has moved past it. The deadline is
/// fixed between resets; there is no extension for last-second bids.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Lot {
    pub id: u32,
    pub title: String,
    pub image: String,
    pub start_price: u64,
    pub current_price: u64,
    pub winner_id: Option<String>,
    pub winner_name: Option<String>,
    pub deadline_ms: u64,
}

impl Lot {
    pub fn has_winner(&self) -> bool {
        self.winner_id.is_some()
    }

    /// Whether the auction is over as of the given authoritative time.
    pub fn is_ended(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }

    /// Milliseconds left on the clock, saturating at zero.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.deadline_ms.saturating_sub(now_ms)
    }
}

/// Why a bid attempt was turned away.
///
/// Every variant is an expected, recoverable outcome delivered only to the
/// submitter; none of them ever reaches the broadcast path.
#[derive(Error, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("lot not found")]
    LotNotFound,
    #[error("auction has ended")]
    AuctionEnded,
    #[error("bid must be higher than current price")]
    BidTooLow,
}
