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

//! Error types for ledger input validation and configuration.

use crate::event::MAX_AMOUNT;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger errors.
///
/// Apart from [`LedgerError::Overflow`], every variant describes input that
/// was refused before it could reach the share accountant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Wallet address is empty after normalization
    #[error("empty wallet address")]
    EmptyWallet,

    /// Deposit amount is zero or negative
    #[error("invalid deposit amount {amount} for {wallet} (must be positive)")]
    InvalidDeposit { wallet: String, amount: Decimal },

    /// Paid withdrawal amount is zero or negative
    #[error("invalid withdrawal amount {amount} for {wallet} (must be positive)")]
    InvalidWithdrawal { wallet: String, amount: Decimal },

    /// Trade fee is negative
    #[error("invalid trade fee {0} (must not be negative)")]
    NegativeFee(Decimal),

    /// Amount, PnL, or fee beyond the accepted magnitude
    #[error("amount {0} out of range (magnitude must not exceed {max})", max = MAX_AMOUNT)]
    AmountOutOfRange(Decimal),

    /// Decimal arithmetic overflowed while replaying or aggregating
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Profit share rate outside `[0, 1)`
    #[error("invalid profit share rate {0} (must be in [0, 1))")]
    InvalidProfitShareRate(Decimal),

    /// Configuration file could not be read or parsed
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
