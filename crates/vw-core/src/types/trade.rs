//! Trade records consumed by the VWAP aggregator.

/// One executed trade: units traded and the price paid per unit.
///
/// Values are validated by the decode stage before a record is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeRecord {
    units: f64,
    unit_price: f64,
}

impl TradeRecord {
    #[inline]
    pub fn new(units: f64, unit_price: f64) -> Self {
        Self { units, unit_price }
    }

    #[inline]
    pub fn units(&self) -> f64 {
        self.units
    }

    #[inline]
    pub fn unit_price(&self) -> f64 {
        self.unit_price
    }

    /// Total value of the trade, `units * unit_price`.
    #[inline]
    pub fn notional(&self) -> f64 {
        self.units * self.unit_price
    }
}
