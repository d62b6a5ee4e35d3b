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

//! Raw records supplied by the persistence layer.
//!
//! These mirror the stored shape of deposits, withdrawal requests, and trades.
//! Timestamps stay as raw strings here; they are parsed (with a fallback to
//! "now") when the records are collected into ledger events.

use crate::base::WalletAddress;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single immutable deposit in an investor's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTransaction {
    pub amount: Decimal,
    pub date: Option<String>,
    pub tx_hash: Option<String>,
}

impl DepositTransaction {
    pub fn new(amount: Decimal, date: impl Into<String>) -> Self {
        Self {
            amount,
            date: Some(date.into()),
            tx_hash: None,
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }
}

/// Pool participant and their deposit log.
///
/// `invested_amount` is the stored balance field kept by the persistence
/// layer. The chronological ledger never reads it; only the pool metrics
/// aggregate does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investor {
    pub wallet_address: WalletAddress,
    #[serde(default)]
    pub deposit_transactions: Vec<DepositTransaction>,
    #[serde(default)]
    pub invested_amount: Decimal,
}

impl Investor {
    pub fn new(wallet: impl Into<WalletAddress>) -> Self {
        Self {
            wallet_address: wallet.into(),
            deposit_transactions: Vec::new(),
            invested_amount: Decimal::ZERO,
        }
    }

    /// Appends a deposit and bumps the stored invested amount.
    pub fn with_deposit(mut self, deposit: DepositTransaction) -> Self {
        self.invested_amount = self.invested_amount.saturating_add(deposit.amount);
        self.deposit_transactions.push(deposit);
        self
    }

    /// Sum of the deposit log, or `None` if it overflows.
    pub fn deposited(&self) -> Option<Decimal> {
        self.deposit_transactions
            .iter()
            .try_fold(Decimal::ZERO, |sum, d| sum.checked_add(d.amount))
    }
}

/// Withdrawal request lifecycle.
///
/// Only [`WithdrawalStatus::Paid`] requests move money, so only they are
/// visible to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub wallet_address: WalletAddress,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub created_date: Option<String>,
    pub paid_date: Option<String>,
}

impl WithdrawalRequest {
    pub fn is_paid(&self) -> bool {
        self.status == WithdrawalStatus::Paid
    }

    /// Timestamp the ledger books this withdrawal at: paid date, else
    /// creation date.
    pub fn effective_date(&self) -> Option<&str> {
        self.paid_date.as_deref().or(self.created_date.as_deref())
    }
}

/// Pool-wide trading result, shared by all holders at the time it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub date: Option<String>,
    pub pnl: Decimal,
    pub fee: Decimal,
}

impl Trade {
    pub fn new(date: impl Into<String>, pnl: Decimal, fee: Decimal) -> Self {
        Self {
            date: Some(date.into()),
            pnl,
            fee,
        }
    }
}

/// Full raw history of one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHistory {
    pub investors: Vec<Investor>,
    pub withdrawals: Vec<WithdrawalRequest>,
    pub trades: Vec<Trade>,
}

impl PoolHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paid_withdrawals(&self) -> impl Iterator<Item = &WithdrawalRequest> {
        self.withdrawals.iter().filter(|w| w.is_paid())
    }
}
