//! # Auction Client Library
//!
//! Client-side implementation for the LiveBid real-time auction service.
//! The client holds a local projection of the server's catalog and keeps it
//! converged with every other observer through server broadcasts, without
//! ever trusting its own clock for deadlines.
//!
//! ## Clock Synchronization
//! The initial snapshot carries the server's current time. The client stores
//! the offset against its local clock and uses the estimated server time for
//! every countdown, so independently-clocked clients agree on time remaining.
//! See [`clock`] for the accepted error bounds of this simplification.
//!
//! ## View Reconciliation
//! Bid broadcasts and reset broadcasts are merged into a per-lot state
//! machine ([`view`]): open lots track whether this client is winning,
//! outbid or neutral; a countdown crossing zero moves the lot into one of
//! three terminal phases that only a reset broadcast can reopen. The
//! projection is display logic only and never feeds back into the server.
//!
//! ## Module Organization
//!
//! - [`clock`] — server clock offset and countdown math
//! - [`view`] — per-lot phase/standing state machine and catalog projection
//! - [`network`] — connection handshake, packet handling, command loop

pub mod clock;
pub mod network;
pub mod view;
