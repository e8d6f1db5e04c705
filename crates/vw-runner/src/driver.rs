//! Per-instrument driver: feeds trades into an aggregator and prints VWAPs.

use std::io::Write;

use futures_util::{Stream, StreamExt};
use tracing::warn;
use vw_core::Instrument;
use vw_core::vwap::Aggregator;
use vw_feed::DecodedEvent;

/// What a driver saw before its event stream ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub trades: u64,
    pub errors: u64,
    /// Whether the stream ended on a terminal transport failure.
    pub retired: bool,
}

/// Consume `events` until the stream ends, writing one line per event to `out`:
///
/// - `"BTC-USD": 30000.5` for a trade (the updated VWAP)
/// - `"BTC-USD" ERROR: <error>` for a protocol error
///
/// A terminal error means the subscription will deliver nothing more; it is
/// printed like any other and logged.
pub async fn run<S, W>(
    instrument: &Instrument,
    mut events: S,
    window_capacity: usize,
    out: &mut W,
) -> std::io::Result<DriverStats>
where
    S: Stream<Item = DecodedEvent> + Unpin,
    W: Write,
{
    let mut aggregator = Aggregator::new(window_capacity);
    let mut stats = DriverStats::default();

    while let Some(event) = events.next().await {
        match event {
            DecodedEvent::Trade(trade) => {
                stats.trades += 1;
                match aggregator.add(trade.units(), trade.unit_price()) {
                    Some(vwap) => writeln!(out, "{:?}: {vwap}", instrument.as_str())?,
                    None => writeln!(out, "{:?}: undefined", instrument.as_str())?,
                }
            }
            DecodedEvent::ProtocolError(e) => {
                stats.errors += 1;
                writeln!(out, "{:?} ERROR: {e}", instrument.as_str())?;
                if e.is_terminal() {
                    stats.retired = true;
                    warn!("[{instrument}] feed retired: {e}");
                }
            }
            DecodedEvent::Ignored => {}
        }
    }

    Ok(stats)
}
