use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accounting::lots::Lot;
use crate::config::EngineConfig;
use crate::feed::AccountSnapshot;
use crate::models::{Fill, Position, PositionSide, Whale};

/// A dormant whale came back: its open-position count increased.
/// Delivered exactly once through `WhaleLedger::drain_wake_events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeEvent {
    pub address: String,
    pub woke_at: DateTime<Utc>,
    pub active_positions: u64,
}

/// Per-address working state. Lots and positions are keyed by asset inside
/// the book, so identity is structurally (address, asset) rather than a
/// composite string key.
#[derive(Debug, Clone, Default)]
struct AddressBook {
    lots: HashMap<String, Lot>,
    positions: HashMap<String, Position>,
    close_events: u64,
    winning_closes: u64,
}

/// Position and PnL accounting for every tracked address.
///
/// One batch (fills + optional snapshot) is processed to completion per
/// address before the next; books for different addresses are fully
/// independent, so a host may shard addresses across workers.
#[derive(Debug, Default)]
pub struct WhaleLedger {
    whales: HashMap<String, Whale>,
    books: HashMap<String, AddressBook>,
    wake_events: Vec<WakeEvent>,
}

impl WhaleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one batch of time-ordered fills plus the latest exchange
    /// snapshot for `address`. A `None` snapshot leaves existing metrics and
    /// open positions untouched. No fill can abort the rest of the batch.
    pub fn process_batch(
        &mut self,
        address: &str,
        fills: &[Fill],
        snapshot: Option<&AccountSnapshot>,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) {
        let known = self.whales.contains_key(address);
        let first_seen = fills.first().map(|f| f.timestamp).unwrap_or(now);
        let whale = self
            .whales
            .entry(address.to_string())
            .or_insert_with(|| Whale::new(address, first_seen));
        let book = self.books.entry(address.to_string()).or_default();

        // Dormancy is lazy: the stored flag only records the last
        // materialized transition, so a whale may have crossed the dormancy
        // window since its previous batch. Classify from (now − last_active)
        // at entry, before fills move the clock, so a batch that both wakes
        // and fills still raises its wake event.
        if known
            && !whale.dormant
            && whale.active_positions == 0
            && now.signed_duration_since(whale.last_active) >= Duration::days(config.dormancy_days)
        {
            whale.dormant = true;
            whale.dormant_since = Some(whale.last_active);
            tracing::info!(
                address = %whale.address,
                last_active = %whale.last_active,
                "Whale went dormant"
            );
        }

        let was_dormant = whale.dormant;
        let prev_active = whale.active_positions;

        for fill in fills {
            apply_fill(whale, book, fill, config.dust_epsilon);
        }

        if let Some(snapshot) = snapshot {
            apply_snapshot(whale, book, snapshot, now, config.dust_epsilon);
        }

        whale.active_positions = book.positions.len() as u64;
        whale.total_pnl = whale.realized_pnl + whale.unrealized_pnl;
        whale.roi = if whale.margin_used > Decimal::ZERO {
            whale.total_pnl / whale.margin_used * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        whale.win_rate = if book.close_events > 0 {
            Decimal::from(book.winning_closes) / Decimal::from(book.close_events)
        } else {
            Decimal::ZERO
        };

        // Wake: position count grew while the prior state was dormant.
        if was_dormant && whale.active_positions > prev_active {
            whale.dormant = false;
            whale.dormant_since = None;
            tracing::info!(
                address = %whale.address,
                active_positions = whale.active_positions,
                "Dormant whale woke up"
            );
            counter!("whalewatch_whales_woken_total").increment(1);
            self.wake_events.push(WakeEvent {
                address: whale.address.clone(),
                woke_at: now,
                active_positions: whale.active_positions,
            });
        }

        // Dormancy is recomputed lazily from (now − last_active); there is
        // no background timer.
        let inactive_for = now.signed_duration_since(whale.last_active);
        let is_dormant = whale.active_positions == 0
            && inactive_for >= Duration::days(config.dormancy_days);
        if is_dormant && !whale.dormant {
            whale.dormant = true;
            whale.dormant_since = Some(whale.last_active);
            tracing::info!(
                address = %whale.address,
                last_active = %whale.last_active,
                "Whale went dormant"
            );
        } else if !is_dormant && whale.dormant {
            // Fresh fills reset the inactivity clock without a wake event.
            whale.dormant = false;
            whale.dormant_since = None;
        }

        gauge!("whalewatch_tracked_whales").set(self.whales.len() as f64);
        gauge!("whalewatch_dormant_whales")
            .set(self.whales.values().filter(|w| w.dormant).count() as f64);
        gauge!("whalewatch_open_positions").set(
            self.books
                .values()
                .map(|b| b.positions.len())
                .sum::<usize>() as f64,
        );
    }

    /// Drain pending wake events. Each event is returned exactly once.
    pub fn drain_wake_events(&mut self) -> Vec<WakeEvent> {
        std::mem::take(&mut self.wake_events)
    }

    pub fn whale(&self, address: &str) -> Option<&Whale> {
        self.whales.get(address)
    }

    pub fn whales(&self) -> impl Iterator<Item = &Whale> {
        self.whales.values()
    }

    /// Snapshot of every open position across all addresses. Callers pass
    /// this frozen view to the risk analyzer and heatmap builder.
    pub fn open_positions(&self) -> Vec<Position> {
        self.books
            .values()
            .flat_map(|b| b.positions.values().cloned())
            .collect()
    }

    pub fn lot(&self, address: &str, asset: &str) -> Option<&Lot> {
        self.books.get(address)?.lots.get(asset)
    }
}

fn apply_fill(whale: &mut Whale, book: &mut AddressBook, fill: &Fill, epsilon: Decimal) {
    let lot = book.lots.entry(fill.asset.clone()).or_default();
    let outcome = lot.apply(fill.side, fill.size, fill.price, fill.fee, epsilon);

    whale.realized_pnl += outcome.realized_pnl;
    whale.total_trades += 1;
    if fill.timestamp > whale.last_active {
        whale.last_active = fill.timestamp;
    }
    if fill.timestamp < whale.first_seen {
        whale.first_seen = fill.timestamp;
    }

    counter!("whalewatch_fills_processed_total").increment(1);

    if let Some(close) = outcome.close {
        book.close_events += 1;
        if close.realized_pnl > Decimal::ZERO {
            book.winning_closes += 1;
        }
        counter!("whalewatch_close_events_total").increment(1);
        tracing::debug!(
            address = %whale.address,
            asset = %fill.asset,
            closed = %close.size,
            realized = %close.realized_pnl,
            "Closing fill"
        );
    }

    // Keep a provisional position in sync with the lot so exposure is
    // visible between snapshot polls. Exchange-reported leverage, margin,
    // and liquidation price survive until the next snapshot.
    if lot.is_open() {
        let (size, entry) = (lot.size, lot.avg_entry_price);
        book.positions
            .entry(fill.asset.clone())
            .and_modify(|p| {
                p.side = PositionSide::from_signed_size(size);
                p.size = size.abs();
                p.entry_price = entry;
                p.notional = (size * entry).abs();
                p.last_updated = fill.timestamp;
            })
            .or_insert_with(|| Position {
                address: whale.address.clone(),
                asset: fill.asset.clone(),
                side: PositionSide::from_signed_size(size),
                size: size.abs(),
                entry_price: entry,
                leverage: Decimal::ONE,
                margin_used: Decimal::ZERO,
                liquidation_price: None,
                unrealized_pnl: Decimal::ZERO,
                notional: (size * entry).abs(),
                last_updated: fill.timestamp,
            });
    } else {
        book.positions.remove(&fill.asset);
    }
}

/// The exchange snapshot is authoritative: per-asset positions are replaced
/// from it, and positions it no longer reports are removed (closed or
/// liquidated out of band). Account-level unrealized PnL and margin come
/// straight from the exchange, which knows the live mark used for margining.
fn apply_snapshot(
    whale: &mut Whale,
    book: &mut AddressBook,
    snapshot: &AccountSnapshot,
    now: DateTime<Utc>,
    epsilon: Decimal,
) {
    whale.margin_used = snapshot.margin_used;
    whale.unrealized_pnl = snapshot.unrealized_pnl;

    let mut refreshed: HashMap<String, Position> = HashMap::new();
    for pos in &snapshot.positions {
        if pos.size.abs() < epsilon {
            continue;
        }
        refreshed.insert(
            pos.asset.clone(),
            Position {
                address: whale.address.clone(),
                asset: pos.asset.clone(),
                side: PositionSide::from_signed_size(pos.size),
                size: pos.size.abs(),
                entry_price: pos.entry_price,
                leverage: pos.leverage,
                margin_used: pos.margin_used,
                liquidation_price: pos.liquidation_price,
                unrealized_pnl: pos.unrealized_pnl,
                notional: (pos.size * pos.entry_price).abs(),
                last_updated: now,
            },
        );
    }

    for asset in book.positions.keys() {
        if !refreshed.contains_key(asset) {
            tracing::info!(
                address = %whale.address,
                asset = %asset,
                "Position no longer in snapshot — closed or liquidated"
            );
        }
    }

    book.positions = refreshed;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
