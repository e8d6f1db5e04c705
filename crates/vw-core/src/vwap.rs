//! Incremental volume-weighted average price over a sliding window of trades.
//!
//! [`Aggregator`] keeps running totals of units and notional for exactly the
//! trades currently held in its [`CircularWindow`]. Each [`Aggregator::add`]
//! subtracts the trade being evicted (if any) and adds the new one, so the
//! VWAP costs O(1) per trade regardless of window size.
//!
//! If the running totals ever stop being finite (a single huge notional
//! overflows, then is evicted as `inf - inf`), they are rebuilt from the
//! window contents instead of staying poisoned.

use crate::types::TradeRecord;
use crate::window::CircularWindow;

/// Sliding-window VWAP calculator.
///
/// Not thread-safe — each instrument's driver owns its own instance.
#[derive(Debug, Clone)]
pub struct Aggregator {
    window: CircularWindow<TradeRecord>,
    total_units: f64,
    total_notional: f64,
}

impl Aggregator {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            window: CircularWindow::new(window_capacity),
            total_units: 0.0,
            total_notional: 0.0,
        }
    }

    /// Record a trade and return the updated VWAP.
    ///
    /// Returns `None` while the window holds no units (only possible with a
    /// zero-capacity window, since trades carry positive units).
    pub fn add(&mut self, units: f64, unit_price: f64) -> Option<f64> {
        // Index 0 is the trade the push below overwrites.
        let evicted = if self.window.is_full() {
            self.window.at(0).ok().copied()
        } else {
            None
        };

        let trade = TradeRecord::new(units, unit_price);
        self.window.push(trade);

        if self.window.capacity() == 0 {
            return self.vwap();
        }

        if let Some(old) = evicted {
            self.total_units -= old.units();
            self.total_notional -= old.notional();
        }

        self.total_units += trade.units();
        self.total_notional += trade.notional();

        if !self.total_units.is_finite() || !self.total_notional.is_finite() {
            self.resync();
        }

        self.vwap()
    }

    /// Recompute both totals from the trades held.
    fn resync(&mut self) {
        self.total_units = self.window.iter().map(|t| t.units()).sum();
        self.total_notional = self.window.iter().map(|t| t.notional()).sum();
    }

    /// Current VWAP, `None` when the window holds no units.
    #[inline]
    pub fn vwap(&self) -> Option<f64> {
        if self.total_units == 0.0 {
            None
        } else {
            Some(self.total_notional / self.total_units)
        }
    }

    #[inline]
    pub fn total_units(&self) -> f64 {
        self.total_units
    }

    #[inline]
    pub fn total_notional(&self) -> f64 {
        self.total_notional
    }

    /// The trades currently contributing to the VWAP.
    pub fn window(&self) -> &CircularWindow<TradeRecord> {
        &self.window
    }
}
