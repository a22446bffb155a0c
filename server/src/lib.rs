//! # Auction Server Library
//!
//! Authoritative server for the LiveBid real-time auction service. It owns
//! the per-lot bid ledger, decides whether each submitted bid is accepted,
//! and fans accepted state changes out to every connected observer so all
//! clients converge on a single consistent view.
//!
//! ## Core Responsibilities
//!
//! ### Bid Arbitration
//! All auction state decisions happen here. A bid is checked against the
//! lot's deadline and current price and applied atomically under a per-lot
//! lock, so concurrent submissions on one lot serialize into a single total
//! order while bids on different lots proceed independently.
//!
//! ### Identity Registration
//! Stable session tokens map to generated display names ("User 1", "User 2",
//! ...) that survive reconnects. Connections that present no token get a
//! synthetic per-connection identity. Table growth is reclaimed by a
//! TTL-based eviction sweeper, never by the bid path.
//!
//! ### State Broadcasting
//! Accepted bids and resets are pushed to every observer through an internal
//! event channel and a dedicated sender task, so a slow or disconnected
//! observer can never delay arbitration. Rejections go only to the submitter.
//!
//! ## Module Organization
//!
//! - [`catalog`] — lot seed data (titles, images, starting prices, durations)
//! - [`registry`] — identity table, connection bindings, eviction policy
//! - [`ledger`] — the authoritative lots and the arbitration/reset operations
//! - [`broadcast`] — observer table, delivery queue, ledger event pump
//! - [`network`] — UDP front end, packet dispatch, main event loop
//!
//! ## Time
//!
//! The server clock is authoritative. Every snapshot carries the current
//! server time so clients can compute a clock offset and run countdowns that
//! agree with deadline enforcement here.

pub mod broadcast;
pub mod catalog;
pub mod ledger;
pub mod network;
pub mod registry;
