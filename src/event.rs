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

//! Ledger events.
//!
//! Deposits, paid withdrawals, and trades arrive as three differently shaped
//! record types. [`collect_events`] validates them and flattens them into one
//! stream of [`LedgerEvent`]s, each pinned to a UTC timestamp.

use crate::base::WalletAddress;
use crate::error::LedgerError;
use crate::record::{Investor, Trade, WithdrawalRequest};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Deposit {
        timestamp: DateTime<Utc>,
        wallet: WalletAddress,
        amount: Decimal,
    },
    Withdrawal {
        timestamp: DateTime<Utc>,
        wallet: WalletAddress,
        amount: Decimal,
    },
    Trade {
        timestamp: DateTime<Utc>,
        gross_pnl: Decimal,
        fee: Decimal,
    },
}

impl LedgerEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Deposit { timestamp, .. } => *timestamp,
            Self::Withdrawal { timestamp, .. } => *timestamp,
            Self::Trade { timestamp, .. } => *timestamp,
        }
    }

    pub fn wallet(&self) -> Option<&WalletAddress> {
        match self {
            Self::Deposit { wallet, .. } | Self::Withdrawal { wallet, .. } => Some(wallet),
            Self::Trade { .. } => None,
        }
    }
}

/// Largest magnitude accepted for any single cash movement, trade result, or fee.
///
/// Leaves enough headroom below `Decimal::MAX` that realistic histories
/// replay without overflow.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000);

fn check_range(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount.abs() > MAX_AMOUNT {
        return Err(LedgerError::AmountOutOfRange(amount));
    }
    Ok(amount)
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a stored timestamp.
///
/// Accepts RFC 3339, naive date-times (read as UTC), and bare dates
/// (midnight UTC). A missing or unparseable value yields `now`.
pub fn parse_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.and_utc();
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return midnight.and_utc();
    }

    warn!(timestamp = raw, "unparseable timestamp, booking at current time");
    now
}

/// Flattens raw records into an unordered event stream.
///
/// Only paid withdrawals produce events. Input that would corrupt the replay
/// (empty wallets, non-positive cash movements, negative fees) is refused.
///
/// # Errors
///
/// - [`LedgerError::EmptyWallet`] - an investor or paid withdrawal has no wallet.
/// - [`LedgerError::InvalidDeposit`] - a deposit amount is zero or negative.
/// - [`LedgerError::InvalidWithdrawal`] - a paid withdrawal amount is zero or negative.
/// - [`LedgerError::NegativeFee`] - a trade carries a negative fee.
/// - [`LedgerError::AmountOutOfRange`] - an amount, PnL, or fee exceeds [`MAX_AMOUNT`] in magnitude.
pub fn collect_events(
    investors: &[Investor],
    withdrawals: &[WithdrawalRequest],
    trades: &[Trade],
    now: DateTime<Utc>,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let mut events = Vec::new();

    for investor in investors {
        let wallet = &investor.wallet_address;
        for deposit in &investor.deposit_transactions {
            if wallet.is_empty() {
                return Err(LedgerError::EmptyWallet);
            }
            if deposit.amount <= Decimal::ZERO {
                return Err(LedgerError::InvalidDeposit {
                    wallet: wallet.to_string(),
                    amount: deposit.amount,
                });
            }
            events.push(LedgerEvent::Deposit {
                timestamp: parse_timestamp(deposit.date.as_deref(), now),
                wallet: wallet.clone(),
                amount: check_range(deposit.amount)?,
            });
        }
    }

    for withdrawal in withdrawals.iter().filter(|w| w.is_paid()) {
        if withdrawal.wallet_address.is_empty() {
            return Err(LedgerError::EmptyWallet);
        }
        if withdrawal.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidWithdrawal {
                wallet: withdrawal.wallet_address.to_string(),
                amount: withdrawal.amount,
            });
        }
        events.push(LedgerEvent::Withdrawal {
            timestamp: parse_timestamp(withdrawal.effective_date(), now),
            wallet: withdrawal.wallet_address.clone(),
            amount: check_range(withdrawal.amount)?,
        });
    }

    for trade in trades {
        if trade.fee < Decimal::ZERO {
            return Err(LedgerError::NegativeFee(trade.fee));
        }
        events.push(LedgerEvent::Trade {
            timestamp: parse_timestamp(trade.date.as_deref(), now),
            gross_pnl: check_range(trade.pnl)?,
            fee: check_range(trade.fee)?,
        });
    }

    Ok(events)
}
