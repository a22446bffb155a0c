//! Seed catalog for the auction ledger.
//!
//! Lot metadata is defined here at process start; where it would come from in
//! a larger deployment (database, CMS) is outside the core's scope.

/// Immutable configuration for one lot.
///
/// `duration_ms` is the auction length used both at seed time and on every
/// reset; the running deadline itself lives in the ledger.
#[derive(Debug, Clone)]
pub struct LotConfig {
    pub id: u32,
    pub title: String,
    pub image: String,
    pub start_price: u64,
    pub duration_ms: u64,
}

impl LotConfig {
    pub fn new(id: u32, title: &str, image: &str, start_price: u64, duration_ms: u64) -> Self {
        Self {
            id,
            title: title.to_string(),
            image: image.to_string(),
            start_price,
            duration_ms,
        }
    }
}

const MINUTE_MS: u64 = 60 * 1000;

/// The default four-lot catalog.
pub fn default_catalog() -> Vec<LotConfig> {
    vec![
        LotConfig::new(
            1,
            "Vintage Camera 1950s",
            "https://images.unsplash.com/photo-1516035069371-29a1b244cc32?ixlib=rb-4.0.3&auto=format&fit=crop&w=1000&q=80",
            100,
            5 * MINUTE_MS,
        ),
        LotConfig::new(
            2,
            "Limited Edition Sneakers",
            "https://images.unsplash.com/photo-1552346154-21d32810aba3?ixlib=rb-4.0.3&auto=format&fit=crop&w=1000&q=80",
            250,
            3 * MINUTE_MS,
        ),
        LotConfig::new(
            3,
            "Gaming Headset Pro",
            "https://images.unsplash.com/photo-1505740420928-5e560c06d30e?ixlib=rb-4.0.3&auto=format&fit=crop&w=1000&q=80",
            50,
            10 * MINUTE_MS,
        ),
        LotConfig::new(
            4,
            "Mechanical Keyboard",
            "https://images.unsplash.com/photo-1595225476474-87563907a212?ixlib=rb-4.0.3&auto=format&fit=crop&w=1000&q=80",
            120,
            7 * MINUTE_MS,
        ),
    ]
}
