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

//! Multi-pool record book.
//!
//! Investors hold shares in exactly one pool, and every pool is an
//! independent ledger. [`PoolBook`] collects raw records per pool and
//! replays all pools in parallel.
//!
//! # Thread Safety
//!
//! Records are held in a [`DashMap`], so loaders may feed the book from
//! several threads. Replays only read the book; each pool's replay owns its
//! own share state.

use crate::balance::LedgerReport;
use crate::base::{PoolId, WalletAddress};
use crate::config::LedgerConfig;
use crate::engine::Engine;
use crate::error::LedgerError;
use crate::metrics::PoolMetrics;
use crate::record::{DepositTransaction, Investor, PoolHistory, Trade, WithdrawalRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{error, info};

/// Outcome of replaying one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub pool: PoolId,
    pub result: Result<LedgerReport, LedgerError>,
}

/// Raw records grouped by pool.
#[derive(Debug, Default)]
pub struct PoolBook {
    pools: DashMap<PoolId, PoolHistory>,
}

impl PoolBook {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Appends a deposit to the wallet's log, creating the investor on first
    /// deposit. The stored invested amount grows with it, saturating at the
    /// `Decimal` bounds.
    pub fn add_deposit(&self, pool: PoolId, wallet: WalletAddress, deposit: DepositTransaction) {
        let mut history = self.pools.entry(pool).or_default();
        let investor = investor_mut(&mut history.investors, wallet);
        investor.invested_amount = investor.invested_amount.saturating_add(deposit.amount);
        investor.deposit_transactions.push(deposit);
    }

    /// Overrides the stored invested amount for a wallet.
    ///
    /// Call after the wallet's deposits are loaded; later deposits add to it.
    pub fn set_invested_amount(&self, pool: PoolId, wallet: WalletAddress, amount: Decimal) {
        let mut history = self.pools.entry(pool).or_default();
        investor_mut(&mut history.investors, wallet).invested_amount = amount;
    }

    pub fn add_withdrawal(&self, pool: PoolId, withdrawal: WithdrawalRequest) {
        self.pools.entry(pool).or_default().withdrawals.push(withdrawal);
    }

    pub fn add_trade(&self, pool: PoolId, trade: Trade) {
        self.pools.entry(pool).or_default().trades.push(trade);
    }

    /// Known pools, sorted.
    pub fn pools(&self) -> Vec<PoolId> {
        let mut pools: Vec<PoolId> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        pools.sort();
        pools
    }

    /// Snapshot of one pool's records.
    pub fn history(&self, pool: &PoolId) -> Option<PoolHistory> {
        self.pools.get(pool).map(|history| history.value().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Replays every pool in parallel, one scoped thread per pool.
    ///
    /// Reports are returned sorted by pool. A pool with invalid records or
    /// an invalid configured rate reports its error without affecting others.
    pub fn compute(&self, config: &LedgerConfig, now: DateTime<Utc>) -> Vec<PoolReport> {
        let pools = self.pools();
        let results: DashMap<PoolId, Result<LedgerReport, LedgerError>> = DashMap::new();

        crossbeam::scope(|scope| {
            for pool in &pools {
                let results = &results;
                scope.spawn(move |_| {
                    let result = self.compute_pool(pool, config, now);
                    match &result {
                        Ok(report) => info!(
                            %pool,
                            investors = report.balances.len(),
                            pool_value = %report.total_pool_value,
                            "pool replayed"
                        ),
                        Err(e) => error!(%pool, error = %e, "pool replay refused"),
                    }
                    results.insert(pool.clone(), result);
                });
            }
        })
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        let mut reports: Vec<PoolReport> = results
            .into_iter()
            .map(|(pool, result)| PoolReport { pool, result })
            .collect();
        reports.sort_by(|a, b| a.pool.cmp(&b.pool));
        reports
    }

    /// Dashboard totals per pool, sorted by pool.
    pub fn metrics(&self, config: &LedgerConfig) -> Vec<(PoolId, Result<PoolMetrics, LedgerError>)> {
        self.pools()
            .into_iter()
            .map(|pool| {
                let result = Engine::new(config.profit_share_rate(&pool)).and_then(|engine| {
                    self.pools
                        .get(&pool)
                        .map_or_else(|| Ok(PoolMetrics::default()), |history| engine.metrics(&history))
                });
                (pool, result)
            })
            .collect()
    }

    fn compute_pool(
        &self,
        pool: &PoolId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<LedgerReport, LedgerError> {
        let engine = Engine::new(config.profit_share_rate(pool))?;
        match self.pools.get(pool) {
            Some(history) => engine.compute(&history, now),
            None => Ok(LedgerReport::default()),
        }
    }
}

fn investor_mut(investors: &mut Vec<Investor>, wallet: WalletAddress) -> &mut Investor {
    let index = match investors.iter().position(|i| i.wallet_address == wallet) {
        Some(index) => index,
        None => {
            investors.push(Investor::new(wallet));
            investors.len() - 1
        }
    };
    &mut investors[index]
}
