//! The authoritative auction ledger
//!
//! This module owns every lot's live state and implements bid arbitration,
//! the only place auction state is ever mutated:
//! - Per-lot mutual exclusion: concurrent bids on one lot serialize into a
//!   single total order, bids on different lots never contend
//! - The ended-check through the price/winner mutation run as one critical
//!   section, so no bid can straddle a reset or race another bid
//! - Accepted state changes are emitted into an internal event channel while
//!   the lot lock is still held, which is what gives broadcast fan-out the
//!   per-lot acceptance-order guarantee
//!
//! Rejections are plain return values for the submitter; they never enter
//! the event channel.

use log::{debug, info};
use parking_lot::Mutex;
use shared::{now_ms, Lot, RejectReason};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::catalog::LotConfig;
use crate::registry::UserRegistry;

/// Accepted state changes, in the order arbitration applied them.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    BidAccepted(Lot),
    Reset(Vec<Lot>),
}

/// Result of one bid attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidOutcome {
    /// The bid won arbitration; carries the full updated lot snapshot.
    Accepted(Lot),
    /// The bid was turned away. `current_price` is set for `BidTooLow` so the
    /// submitter can correct its next offer.
    Rejected {
        reason: RejectReason,
        current_price: Option<u64>,
    },
}

/// One lot plus its lock. The config fields are immutable; only the `Lot`
/// snapshot behind the mutex ever changes.
#[derive(Debug)]
struct LotSlot {
    id: u32,
    duration_ms: u64,
    state: Mutex<Lot>,
}

/// The authoritative set of lots.
///
/// Shared as an `Arc` across however many tasks or threads serve bidders;
/// all methods take `&self`.
#[derive(Debug)]
pub struct AuctionLedger {
    slots: Vec<LotSlot>,
    registry: Arc<UserRegistry>,
    events: mpsc::UnboundedSender<LedgerEvent>,
}

impl AuctionLedger {
    /// Seeds the ledger from a catalog. Every lot opens at its starting price
    /// with no winner and a deadline of now plus its configured duration.
    pub fn new(
        catalog: Vec<LotConfig>,
        registry: Arc<UserRegistry>,
        events: mpsc::UnboundedSender<LedgerEvent>,
    ) -> Self {
        let now = now_ms();
        let mut slots: Vec<LotSlot> = catalog
            .into_iter()
            .map(|config| LotSlot {
                id: config.id,
                duration_ms: config.duration_ms,
                state: Mutex::new(Lot {
                    id: config.id,
                    title: config.title,
                    image: config.image,
                    start_price: config.start_price,
                    current_price: config.start_price,
                    winner_id: None,
                    winner_name: None,
                    deadline_ms: now + config.duration_ms,
                }),
            })
            .collect();
        slots.sort_by_key(|slot| slot.id);

        info!("Ledger seeded with {} lots", slots.len());
        Self {
            slots,
            registry,
            events,
        }
    }

    fn slot(&self, lot_id: u32) -> Option<&LotSlot> {
        self.slots.iter().find(|slot| slot.id == lot_id)
    }

    /// Snapshot of every lot in catalog order.
    ///
    /// Each lot is cloned under its own lock, so a caller can never observe a
    /// torn lot or corrupt ledger state through the returned value.
    pub fn list_lots(&self) -> Vec<Lot> {
        self.slots
            .iter()
            .map(|slot| slot.state.lock().clone())
            .collect()
    }

    pub fn lot_count(&self) -> usize {
        self.slots.len()
    }

    /// Arbitrates one bid attempt.
    ///
    /// The deadline check, identity resolution, price check and mutation all
    /// run under the lot's lock: of two racing bids exactly one wins and the
    /// other sees the already-updated price. An unregistered connection still
    /// gets to bid under its raw connection id (an intentional fallback, not
    /// an error).
    pub fn place_bid(&self, lot_id: u32, amount: u64, connection_id: u64) -> BidOutcome {
        let slot = match self.slot(lot_id) {
            Some(slot) => slot,
            None => {
                return BidOutcome::Rejected {
                    reason: RejectReason::LotNotFound,
                    current_price: None,
                }
            }
        };

        let mut lot = slot.state.lock();

        if lot.is_ended(now_ms()) {
            return BidOutcome::Rejected {
                reason: RejectReason::AuctionEnded,
                current_price: None,
            };
        }

        let (bidder_id, bidder_name) = match self.registry.resolve(connection_id) {
            Some(user) => (user.id, user.name),
            None => (format!("conn-{}", connection_id), "Unknown".to_string()),
        };

        if amount <= lot.current_price {
            return BidOutcome::Rejected {
                reason: RejectReason::BidTooLow,
                current_price: Some(lot.current_price),
            };
        }

        lot.current_price = amount;
        lot.winner_id = Some(bidder_id);
        lot.winner_name = Some(bidder_name);
        let snapshot = lot.clone();

        debug!(
            "Accepted bid of {} on lot {} by {:?}",
            amount, lot_id, snapshot.winner_name
        );

        // Emitted under the lock so fan-out order matches acceptance order.
        // Delivery is best-effort; a gone consumer only loses broadcasts.
        if self
            .events
            .send(LedgerEvent::BidAccepted(snapshot.clone()))
            .is_err()
        {
            debug!("Ledger event channel closed, broadcast dropped");
        }

        BidOutcome::Accepted(snapshot)
    }

    /// Reinitializes every lot: starting price restored, winner cleared,
    /// deadline recomputed from now.
    ///
    /// All lot locks are taken (ascending id order) before any mutation, so
    /// no bid can straddle the reset and the reset event cannot interleave
    /// with a bid event out of order. `place_bid` only ever holds one lock,
    /// so the bulk acquisition cannot deadlock against it.
    pub fn reset(&self) -> Vec<Lot> {
        let mut guards: Vec<_> = self.slots.iter().map(|slot| slot.state.lock()).collect();
        let now = now_ms();

        for (slot, lot) in self.slots.iter().zip(guards.iter_mut()) {
            lot.current_price = lot.start_price;
            lot.winner_id = None;
            lot.winner_name = None;
            lot.deadline_ms = now + slot.duration_ms;
        }

        let snapshots: Vec<Lot> = guards.iter().map(|lot| (**lot).clone()).collect();
        info!("Auctions reset: {} lots reopened", snapshots.len());

        if self
            .events
            .send(LedgerEvent::Reset(snapshots.clone()))
            .is_err()
        {
            debug!("Ledger event channel closed, reset broadcast dropped");
        }

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_catalog;
    use std::thread;

    fn test_ledger() -> (
        Arc<AuctionLedger>,
        Arc<UserRegistry>,
        mpsc::UnboundedReceiver<LedgerEvent>,
    ) {
        let registry = Arc::new(UserRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let ledger = Arc::new(AuctionLedger::new(
            default_catalog(),
            Arc::clone(&registry),
            tx,
        ));
        (ledger, registry, rx)
    }

    fn ledger_with_ended_lot() -> (Arc<AuctionLedger>, mpsc::UnboundedReceiver<LedgerEvent>) {
        let registry = Arc::new(UserRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        // Zero duration: the deadline is now, so the lot is ended on arrival
        let catalog = vec![LotConfig::new(1, "Expired", "none", 100, 0)];
        (Arc::new(AuctionLedger::new(catalog, registry, tx)), rx)
    }

    #[test]
    fn test_seeding_from_catalog() {
        let (ledger, _, _rx) = test_ledger();
        let lots = ledger.list_lots();

        assert_eq!(lots.len(), 4);
        for lot in &lots {
            assert_eq!(lot.current_price, lot.start_price);
            assert!(lot.winner_id.is_none());
            assert!(lot.winner_name.is_none());
            assert!(lot.deadline_ms > now_ms() - 1000);
        }
    }

    #[test]
    fn test_accepted_bid_updates_lot() {
        let (ledger, registry, _rx) = test_ledger();
        registry.register(5, Some("token-a"), 0);

        let outcome = ledger.place_bid(1, 120, 5);

        match outcome {
            BidOutcome::Accepted(lot) => {
                assert_eq!(lot.current_price, 120);
                assert_eq!(lot.winner_id.as_deref(), Some("token-a"));
                assert_eq!(lot.winner_name.as_deref(), Some("User 1"));
            }
            other => panic!("Expected acceptance, got {:?}", other),
        }

        let lots = ledger.list_lots();
        assert_eq!(lots[0].current_price, 120);
    }

    #[test]
    fn test_bid_too_low_echoes_current_price_without_mutation() {
        let (ledger, registry, _rx) = test_ledger();
        registry.register(5, Some("token-a"), 0);

        assert!(matches!(
            ledger.place_bid(1, 120, 5),
            BidOutcome::Accepted(_)
        ));

        let outcome = ledger.place_bid(1, 115, 5);
        assert_eq!(
            outcome,
            BidOutcome::Rejected {
                reason: RejectReason::BidTooLow,
                current_price: Some(120),
            }
        );

        // Equal amounts lose too: the price must strictly increase
        let outcome = ledger.place_bid(1, 120, 5);
        assert_eq!(
            outcome,
            BidOutcome::Rejected {
                reason: RejectReason::BidTooLow,
                current_price: Some(120),
            }
        );

        let lots = ledger.list_lots();
        assert_eq!(lots[0].current_price, 120);
        assert_eq!(lots[0].winner_id.as_deref(), Some("token-a"));
    }

    #[test]
    fn test_opening_bid_must_exceed_start_price() {
        let (ledger, _, _rx) = test_ledger();

        let outcome = ledger.place_bid(1, 100, 5);
        assert_eq!(
            outcome,
            BidOutcome::Rejected {
                reason: RejectReason::BidTooLow,
                current_price: Some(100),
            }
        );
        assert!(ledger.list_lots()[0].winner_id.is_none());
    }

    #[test]
    fn test_unknown_lot_is_rejected() {
        let (ledger, _, _rx) = test_ledger();

        let outcome = ledger.place_bid(999, 1_000_000, 5);
        assert_eq!(
            outcome,
            BidOutcome::Rejected {
                reason: RejectReason::LotNotFound,
                current_price: None,
            }
        );
    }

    #[test]
    fn test_ended_lot_rejects_any_amount() {
        let (ledger, _rx) = ledger_with_ended_lot();

        let outcome = ledger.place_bid(1, u64::MAX, 5);
        assert_eq!(
            outcome,
            BidOutcome::Rejected {
                reason: RejectReason::AuctionEnded,
                current_price: None,
            }
        );

        let lots = ledger.list_lots();
        assert_eq!(lots[0].current_price, 100);
        assert!(lots[0].winner_id.is_none());
    }

    #[test]
    fn test_unregistered_connection_falls_back_to_connection_identity() {
        let (ledger, _, _rx) = test_ledger();

        let outcome = ledger.place_bid(1, 150, 42);
        match outcome {
            BidOutcome::Accepted(lot) => {
                assert_eq!(lot.winner_id.as_deref(), Some("conn-42"));
                assert_eq!(lot.winner_name.as_deref(), Some("Unknown"));
            }
            other => panic!("Expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_list_lots_returns_detached_snapshots() {
        let (ledger, _, _rx) = test_ledger();

        let mut lots = ledger.list_lots();
        lots[0].current_price = 999_999;
        lots[0].winner_id = Some("mallory".to_string());

        // Mutating the snapshot must not touch ledger state
        let fresh = ledger.list_lots();
        assert_eq!(fresh[0].current_price, fresh[0].start_price);
        assert!(fresh[0].winner_id.is_none());
    }

    #[test]
    fn test_reset_restores_lots_and_extends_deadlines() {
        let (ledger, registry, _rx) = test_ledger();
        registry.register(5, Some("token-a"), 0);
        ledger.place_bid(1, 500, 5);
        ledger.place_bid(3, 90, 5);

        let before = now_ms();
        let lots = ledger.reset();

        assert_eq!(lots.len(), 4);
        for lot in &lots {
            assert_eq!(lot.current_price, lot.start_price);
            assert!(lot.winner_id.is_none());
            assert!(lot.winner_name.is_none());
            assert!(lot.deadline_ms > before);
        }
    }

    #[test]
    fn test_events_follow_acceptance_order() {
        let (ledger, registry, mut rx) = test_ledger();
        registry.register(5, Some("token-a"), 0);
        registry.register(6, Some("token-b"), 0);

        ledger.place_bid(1, 120, 5);
        ledger.place_bid(1, 115, 6); // rejected: no event
        ledger.place_bid(1, 150, 6);
        ledger.reset();

        match rx.try_recv().unwrap() {
            LedgerEvent::BidAccepted(lot) => {
                assert_eq!(lot.current_price, 120);
                assert_eq!(lot.winner_name.as_deref(), Some("User 1"));
            }
            other => panic!("Expected bid event, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            LedgerEvent::BidAccepted(lot) => {
                assert_eq!(lot.current_price, 150);
                assert_eq!(lot.winner_name.as_deref(), Some("User 2"));
            }
            other => panic!("Expected bid event, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            LedgerEvent::Reset(lots) => assert_eq!(lots.len(), 4),
            other => panic!("Expected reset event, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bid_survives_closed_event_channel() {
        let (ledger, _, rx) = test_ledger();
        drop(rx);

        // Arbitration still works when nobody is listening for broadcasts
        assert!(matches!(
            ledger.place_bid(1, 120, 5),
            BidOutcome::Accepted(_)
        ));
    }

    #[test]
    fn test_concurrent_bids_serialize_into_total_order() {
        let (ledger, _, mut rx) = test_ledger();

        let threads = 16;
        let bids_per_thread = 25;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let mut accepted = 0u32;
                    for i in 0..bids_per_thread {
                        // Overlapping amount ranges across threads
                        let amount = 100 + (i * threads + t + 1) as u64;
                        if let BidOutcome::Accepted(_) = ledger.place_bid(1, amount, t as u64) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let total_accepted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(total_accepted >= 1);

        // Every accepted event carries a strictly higher price than the last:
        // no lost update, no double accept
        let mut last_price = 100u64;
        let mut event_count = 0u32;
        while let Ok(event) = rx.try_recv() {
            match event {
                LedgerEvent::BidAccepted(lot) => {
                    assert!(lot.current_price > last_price);
                    last_price = lot.current_price;
                    event_count += 1;
                }
                other => panic!("Unexpected event {:?}", other),
            }
        }
        assert_eq!(event_count, total_accepted);

        // Final state reflects the highest accepted amount
        let lots = ledger.list_lots();
        assert_eq!(lots[0].current_price, last_price);
        assert!(lots[0].winner_id.is_some());
    }

    #[test]
    fn test_concurrent_reset_and_bids_never_tear() {
        let (ledger, _, _rx) = test_ledger();

        let bidder = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for i in 0..200u64 {
                    ledger.place_bid(2, 251 + i, 1);
                }
            })
        };
        let resetter = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..20 {
                    ledger.reset();
                }
            })
        };

        bidder.join().unwrap();
        resetter.join().unwrap();

        // Whatever interleaving happened, the invariants hold
        for lot in ledger.list_lots() {
            assert!(lot.current_price >= lot.start_price);
            assert_eq!(lot.has_winner(), lot.current_price > lot.start_price);
        }
    }
}
