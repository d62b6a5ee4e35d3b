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

//! Per-investor balance resolution.
//!
//! Turns the final [`ShareState`] of a replay into user-facing summaries.
//! `total_balance` is a cash-flow figure (raw deposits minus paid
//! withdrawals plus attributed net PnL). It is deliberately not derived
//! from `shares * NAV`; that figure is reported separately as `share_value`.

use crate::accountant::{ShareState, WalletPnl, checked, nav};
use crate::base::WalletAddress;
use crate::error::LedgerError;
use crate::record::{Investor, WithdrawalRequest};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// One investor's position.
///
/// Fields hold full precision; serialization rounds half-to-even.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserBalance {
    pub total_balance: Decimal,
    pub ownership_percent: Decimal,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub net_pnl: Decimal,
    pub gross_pnl: Decimal,
    pub fees_paid: Decimal,
    pub profit_share_paid: Decimal,
    pub shares: Decimal,
    /// `shares * NAV`, informational only.
    pub share_value: Decimal,
    pub deposit_count: usize,
}

impl UserBalance {
    pub const MONEY_PRECISION: u32 = 4;
    pub const SHARE_PRECISION: u32 = 8;
}

impl Serialize for UserBalance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let money = |value: Decimal| value.round_dp(Self::MONEY_PRECISION);
        let mut state = serializer.serialize_struct("UserBalance", 11)?;
        state.serialize_field("total_balance", &money(self.total_balance))?;
        state.serialize_field("ownership_percent", &money(self.ownership_percent))?;
        state.serialize_field("deposits", &money(self.deposits))?;
        state.serialize_field("withdrawals", &money(self.withdrawals))?;
        state.serialize_field("net_pnl", &money(self.net_pnl))?;
        state.serialize_field("gross_pnl", &money(self.gross_pnl))?;
        state.serialize_field("fees_paid", &money(self.fees_paid))?;
        state.serialize_field("profit_share_paid", &money(self.profit_share_paid))?;
        state.serialize_field("shares", &self.shares.round_dp(Self::SHARE_PRECISION))?;
        state.serialize_field("share_value", &money(self.share_value))?;
        state.serialize_field("deposit_count", &self.deposit_count)?;
        state.end()
    }
}

/// Result of one pool replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerReport {
    pub balances: BTreeMap<WalletAddress, UserBalance>,
    pub total_pool_value: Decimal,
    pub total_shares: Decimal,
}

impl LedgerReport {
    /// NAV per share at the end of the history; 1 while no shares are outstanding.
    pub fn nav(&self) -> Decimal {
        nav(self.total_pool_value, self.total_shares)
    }

    pub fn balance(&self, wallet: &WalletAddress) -> Option<&UserBalance> {
        self.balances.get(wallet)
    }
}

impl Serialize for LedgerReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("LedgerReport", 4)?;
        state.serialize_field("balances", &self.balances)?;
        state.serialize_field(
            "total_pool_value",
            &self.total_pool_value.round_dp(UserBalance::MONEY_PRECISION),
        )?;
        state.serialize_field(
            "total_shares",
            &self.total_shares.round_dp(UserBalance::SHARE_PRECISION),
        )?;
        state.serialize_field("nav", &self.nav().round_dp(UserBalance::SHARE_PRECISION))?;
        state.end()
    }
}

/// Builds per-wallet summaries from the final share state and raw cash flows.
///
/// Reported wallets are those that ever held shares plus those attributed
/// any trading result. Deposits are summed from the investors' deposit logs,
/// withdrawals from paid requests only.
///
/// # Errors
///
/// [`LedgerError::Overflow`] if a wallet's totals do not fit in `Decimal`.
pub fn resolve_balances(
    state: ShareState,
    investors: &[Investor],
    withdrawals: &[WithdrawalRequest],
) -> Result<LedgerReport, LedgerError> {
    let mut deposits: BTreeMap<&WalletAddress, (Decimal, usize)> = BTreeMap::new();
    for investor in investors {
        let entry = deposits.entry(&investor.wallet_address).or_default();
        entry.0 = checked(
            investor.deposited().and_then(|sum| entry.0.checked_add(sum)),
            "wallet deposits",
        )?;
        entry.1 += investor.deposit_transactions.len();
    }

    let mut paid: BTreeMap<&WalletAddress, Decimal> = BTreeMap::new();
    for withdrawal in withdrawals.iter().filter(|w| w.is_paid()) {
        let entry = paid.entry(&withdrawal.wallet_address).or_default();
        *entry = checked(entry.checked_add(withdrawal.amount), "wallet withdrawals")?;
    }

    let nav = state.nav();
    let wallets: BTreeSet<&WalletAddress> = state.shares.keys().chain(state.pnl.keys()).collect();

    let mut balances = BTreeMap::new();
    for wallet in wallets {
        let shares = state.shares.get(wallet).copied().unwrap_or_default();
        let pnl = state.pnl.get(wallet).copied().unwrap_or_else(WalletPnl::default);
        let (deposited, deposit_count) = deposits.get(wallet).copied().unwrap_or_default();
        let withdrawn = paid.get(wallet).copied().unwrap_or_default();

        // Can exceed 100 for a wallet left holding shares after another
        // wallet's over-withdrawal shrank the total below its holding.
        let ownership_percent = if state.total_shares > Decimal::ZERO {
            checked(
                shares
                    .checked_div(state.total_shares)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED)),
                "ownership percent",
            )?
        } else {
            Decimal::ZERO
        };
        let total_balance = checked(
            deposited
                .checked_sub(withdrawn)
                .and_then(|cash| cash.checked_add(pnl.net_pnl)),
            "total balance",
        )?;

        let balance = UserBalance {
            total_balance,
            ownership_percent,
            deposits: deposited,
            withdrawals: withdrawn,
            net_pnl: pnl.net_pnl,
            gross_pnl: pnl.gross_pnl,
            fees_paid: pnl.fees,
            profit_share_paid: pnl.profit_share,
            shares,
            share_value: checked(shares.checked_mul(nav), "share value")?,
            deposit_count,
        };
        balances.insert(wallet.clone(), balance);
    }

    Ok(LedgerReport {
        balances,
        total_pool_value: state.total_pool_value,
        total_shares: state.total_shares,
    })
}
