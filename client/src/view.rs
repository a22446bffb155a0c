//! Client-side projection of ledger state
//!
//! Each client keeps a local view of every lot, merged from the snapshots and
//! broadcasts the server sends and from its own locally-ticking countdown
//! (driven by the synced clock). The projection is derived state only; it
//! never feeds back into the ledger.

use shared::Lot;

/// Lifecycle of one lot as seen by this client.
///
/// Terminal phases are sticky: once a lot has ended locally, only an explicit
/// reset broadcast reopens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotPhase {
    Open,
    EndedUnsold,
    EndedWonByMe,
    EndedWonByOther,
}

impl LotPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LotPhase::Open)
    }
}

/// Where this client stands on an open lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// The current winning identity is mine
    Winning,
    /// Someone else holds the lot
    Outbid,
    /// Nobody has bid past the starting price yet
    Neutral,
}

/// One lot plus the state derived for display logic.
#[derive(Debug, Clone)]
pub struct LotView {
    pub lot: Lot,
    pub phase: LotPhase,
    pub standing: Standing,
}

impl LotView {
    fn new(lot: Lot, my_id: &str, estimated_now_ms: u64) -> Self {
        let mut view = Self {
            lot,
            phase: LotPhase::Open,
            standing: Standing::Neutral,
        };
        view.recompute_standing(my_id);
        // A snapshot can describe a lot that already ended
        if view.lot.is_ended(estimated_now_ms) {
            view.phase = view.ended_phase(my_id);
        }
        view
    }

    fn recompute_standing(&mut self, my_id: &str) {
        self.standing = match self.lot.winner_id.as_deref() {
            Some(winner) if winner == my_id => Standing::Winning,
            Some(_) => Standing::Outbid,
            None => Standing::Neutral,
        };
    }

    fn ended_phase(&self, my_id: &str) -> LotPhase {
        match self.lot.winner_id.as_deref() {
            None => LotPhase::EndedUnsold,
            Some(winner) if winner == my_id => LotPhase::EndedWonByMe,
            Some(_) => LotPhase::EndedWonByOther,
        }
    }

    /// Merges the server-authoritative fields of a bid update.
    ///
    /// A terminal phase stays terminal even if an update squeaks in after the
    /// local countdown crossed zero; the winner fields still matter for the
    /// final outcome shown.
    fn apply_update(
        &mut self,
        current_price: u64,
        winner_id: String,
        winner_name: String,
        my_id: &str,
    ) {
        self.lot.current_price = current_price;
        self.lot.winner_id = Some(winner_id);
        self.lot.winner_name = Some(winner_name);
        self.recompute_standing(my_id);
        if self.phase.is_terminal() {
            self.phase = self.ended_phase(my_id);
        }
    }

    /// Advances the local countdown. Returns the terminal phase if this tick
    /// crossed the deadline.
    fn tick(&mut self, estimated_now_ms: u64, my_id: &str) -> Option<LotPhase> {
        if self.phase != LotPhase::Open || !self.lot.is_ended(estimated_now_ms) {
            return None;
        }
        self.phase = self.ended_phase(my_id);
        Some(self.phase)
    }

    /// Replaces the lot with its reset state and reopens it.
    fn apply_reset(&mut self, lot: Lot, my_id: &str) {
        self.lot = lot;
        self.phase = LotPhase::Open;
        self.recompute_standing(my_id);
    }
}

/// The full local projection for one connected client.
#[derive(Debug, Clone)]
pub struct CatalogView {
    my_id: String,
    lots: Vec<LotView>,
}

impl CatalogView {
    pub fn new(my_id: String, lots: Vec<Lot>, estimated_now_ms: u64) -> Self {
        let lot_views = lots
            .into_iter()
            .map(|lot| LotView::new(lot, &my_id, estimated_now_ms))
            .collect();
        Self {
            my_id,
            lots: lot_views,
        }
    }

    pub fn my_id(&self) -> &str {
        &self.my_id
    }

    pub fn lots(&self) -> &[LotView] {
        &self.lots
    }

    pub fn lot(&self, lot_id: u32) -> Option<&LotView> {
        self.lots.iter().find(|view| view.lot.id == lot_id)
    }

    /// Applies a bid-update broadcast. Returns the refreshed view, or None
    /// for an unknown lot id (stale client against a newer catalog).
    pub fn apply_update(
        &mut self,
        lot_id: u32,
        current_price: u64,
        winner_id: String,
        winner_name: String,
    ) -> Option<&LotView> {
        let my_id = self.my_id.clone();
        let view = self.lots.iter_mut().find(|view| view.lot.id == lot_id)?;
        view.apply_update(current_price, winner_id, winner_name, &my_id);
        Some(view)
    }

    /// Applies a reset broadcast, reopening every lot it carries.
    pub fn apply_reset(&mut self, lots: Vec<Lot>) {
        let my_id = self.my_id.clone();
        for lot in lots {
            if let Some(view) = self.lots.iter_mut().find(|view| view.lot.id == lot.id) {
                view.apply_reset(lot, &my_id);
            }
        }
    }

    /// Advances every countdown. Returns the lots that ended on this tick
    /// with their terminal phase.
    pub fn tick(&mut self, estimated_now_ms: u64) -> Vec<(u32, LotPhase)> {
        let my_id = self.my_id.clone();
        self.lots
            .iter_mut()
            .filter_map(|view| {
                view.tick(estimated_now_ms, &my_id)
                    .map(|phase| (view.lot.id, phase))
            })
            .collect()
    }
}
