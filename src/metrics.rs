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

//! Pool-wide dashboard totals.
//!
//! An order-independent approximation of the pool's position. Unlike the
//! chronological ledger it reads each investor's stored `invested_amount`
//! rather than the deposit log, so the two totals can legitimately differ.

use crate::accountant::{TradeOutcome, checked};
use crate::error::LedgerError;
use crate::record::{Investor, Trade, WithdrawalRequest};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub gross_pnl: Decimal,
    pub trading_fees: Decimal,
    pub profit_share: Decimal,
    pub net_pnl: Decimal,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_balance: Decimal,
}

impl PoolMetrics {
    pub const DECIMAL_PRECISION: u32 = 4;

    /// Aggregates totals across the whole history.
    ///
    /// Profit share is computed once on the summed result, not per trade, so
    /// a losing trade can offset a winning one here.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if a total does not fit in `Decimal`.
    pub fn aggregate(
        trades: &[Trade],
        investors: &[Investor],
        withdrawals: &[WithdrawalRequest],
        profit_share_rate: Decimal,
    ) -> Result<Self, LedgerError> {
        let gross_pnl = sum(trades.iter().map(|t| t.pnl), "gross pnl")?;
        let trading_fees = sum(trades.iter().map(|t| t.fee), "trading fees")?;
        let outcome = TradeOutcome::new(gross_pnl, trading_fees, profit_share_rate)?;

        let total_deposits = sum(investors.iter().map(|i| i.invested_amount), "total deposits")?;
        let total_withdrawals = sum(
            withdrawals.iter().filter(|w| w.is_paid()).map(|w| w.amount),
            "total withdrawals",
        )?;
        let total_balance = checked(
            total_deposits
                .checked_sub(total_withdrawals)
                .and_then(|cash| cash.checked_add(outcome.net_pnl)),
            "total balance",
        )?;

        Ok(Self {
            gross_pnl,
            trading_fees,
            profit_share: outcome.profit_share,
            net_pnl: outcome.net_pnl,
            total_deposits,
            total_withdrawals,
            total_balance,
        })
    }
}

fn sum(
    values: impl Iterator<Item = Decimal>,
    operation: &'static str,
) -> Result<Decimal, LedgerError> {
    checked(
        values.fold(Some(Decimal::ZERO), |acc, v| acc.and_then(|acc| acc.checked_add(v))),
        operation,
    )
}

impl Serialize for PoolMetrics {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let round = |value: Decimal| value.round_dp(Self::DECIMAL_PRECISION);
        let mut state = serializer.serialize_struct("PoolMetrics", 7)?;
        state.serialize_field("gross_pnl", &round(self.gross_pnl))?;
        state.serialize_field("trading_fees", &round(self.trading_fees))?;
        state.serialize_field("profit_share", &round(self.profit_share))?;
        state.serialize_field("net_pnl", &round(self.net_pnl))?;
        state.serialize_field("total_deposits", &round(self.total_deposits))?;
        state.serialize_field("total_withdrawals", &round(self.total_withdrawals))?;
        state.serialize_field("total_balance", &round(self.total_balance))?;
        state.end()
    }
}
