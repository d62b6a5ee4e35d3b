// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ledger engine.
//!
//! The [`Engine`] runs the full pipeline for one pool:
//!
//! 1. **Collect**: validate raw records and flatten them into events.
//! 2. **Sequence**: stable-sort the events by timestamp.
//! 3. **Account**: replay the events through a fresh [`ShareAccountant`].
//! 4. **Resolve**: turn the final share state into per-investor balances.
//!
//! Nothing is cached between calls; every invocation replays the whole
//! history, so the same inputs always produce the same report.

use crate::accountant::{ShareAccountant, validate_profit_share_rate};
use crate::balance::{LedgerReport, resolve_balances};
use crate::error::LedgerError;
use crate::event::collect_events;
use crate::metrics::PoolMetrics;
use crate::record::PoolHistory;
use crate::sequencer::sequence_events;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

/// Ledger engine bound to one pool's profit-share rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    profit_share_rate: Decimal,
}

impl Engine {
    /// Creates an engine for a pool whose manager keeps `profit_share_rate`
    /// of positive post-fee trade profit.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidProfitShareRate`] unless the rate is in `[0, 1)`.
    pub fn new(profit_share_rate: Decimal) -> Result<Self, LedgerError> {
        Ok(Engine {
            profit_share_rate: validate_profit_share_rate(profit_share_rate)?,
        })
    }

    pub fn profit_share_rate(&self) -> Decimal {
        self.profit_share_rate
    }

    /// Replays `history`, booking records with missing or unparseable
    /// timestamps at `now`.
    ///
    /// # Errors
    ///
    /// Any validation error raised while collecting events (see
    /// [`collect_events`](crate::collect_events)), or
    /// [`LedgerError::Overflow`] if the replay does not fit in `Decimal`.
    pub fn compute(
        &self,
        history: &PoolHistory,
        now: DateTime<Utc>,
    ) -> Result<LedgerReport, LedgerError> {
        let events = collect_events(&history.investors, &history.withdrawals, &history.trades, now)?;
        let events = sequence_events(events);
        debug!(events = events.len(), "replaying pool history");

        let state = ShareAccountant::replay(self.profit_share_rate, &events)?;
        let report = resolve_balances(state, &history.investors, &history.withdrawals)?;
        debug!(
            investors = report.balances.len(),
            pool_value = %report.total_pool_value,
            total_shares = %report.total_shares,
            "pool history replayed"
        );
        Ok(report)
    }

    /// [`Engine::compute`] with the current wall-clock time as fallback.
    pub fn compute_now(&self, history: &PoolHistory) -> Result<LedgerReport, LedgerError> {
        self.compute(history, Utc::now())
    }

    /// Order-independent dashboard totals for `history`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if the totals do not fit in `Decimal`.
    pub fn metrics(&self, history: &PoolHistory) -> Result<PoolMetrics, LedgerError> {
        PoolMetrics::aggregate(
            &history.trades,
            &history.investors,
            &history.withdrawals,
            self.profit_share_rate,
        )
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            profit_share_rate: Decimal::ZERO,
        }
    }
}
