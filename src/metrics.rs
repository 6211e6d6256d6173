use metrics::{counter, gauge};

/// Pre-register every metric the engine records so they appear even before
/// the first increment. The engine never installs a recorder itself; until
/// the host provides one, recording is a no-op.
pub fn register_metrics() {
    counter!("whalewatch_fills_processed_total").absolute(0);
    counter!("whalewatch_close_events_total").absolute(0);
    counter!("whalewatch_whales_woken_total").absolute(0);
    counter!("whalewatch_feed_records_dropped_total").absolute(0);
    counter!("whalewatch_cascade_simulations_total").absolute(0);

    gauge!("whalewatch_tracked_whales").set(0.0);
    gauge!("whalewatch_dormant_whales").set(0.0);
    gauge!("whalewatch_open_positions").set(0.0);
}
