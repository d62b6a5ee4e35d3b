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

//! # Pool Share Ledger
//!
//! This library computes investor balances for a pooled trading account using
//! NAV-per-share accounting, the way mutual funds account for units. Gains
//! and losses are attributed to investors according to *when* they held
//! shares, not only *how much* they deposited.
//!
//! ## Core Components
//!
//! - [`collect_events`]: Validates raw deposits, paid withdrawals, and trades into [`LedgerEvent`]s
//! - [`sequence_events`]: Stable chronological ordering of events
//! - [`ShareAccountant`]: The NAV-per-share state machine
//! - [`resolve_balances`]: Per-investor [`UserBalance`] summaries
//! - [`PoolMetrics`]: Order-independent pool-wide totals for dashboards
//! - [`Engine`]: Runs the whole pipeline for one pool
//! - [`PoolBook`]: Groups records by pool and replays pools in parallel
//!
//! ## Example
//!
//! ```
//! use pool_share_ledger::{DepositTransaction, Engine, Investor, PoolHistory, Trade, WalletAddress};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new(dec!(0.20)).unwrap();
//!
//! let history = PoolHistory {
//!     investors: vec![
//!         Investor::new("0xabc").with_deposit(DepositTransaction::new(dec!(5000), "2024-01-01")),
//!     ],
//!     withdrawals: vec![],
//!     trades: vec![Trade::new("2024-01-02", dec!(500), dec!(10))],
//! };
//!
//! let report = engine.compute_now(&history).unwrap();
//! let balance = report.balance(&WalletAddress::new("0xABC")).unwrap();
//! assert_eq!(balance.total_balance, dec!(5392));
//! assert_eq!(balance.ownership_percent, dec!(100));
//! ```
//!
//! ## Determinism
//!
//! A replay is a pure function of its inputs and the fallback "now" used for
//! records without a usable timestamp. Pass the same `now` to
//! [`Engine::compute`] and identical inputs give identical reports.

pub mod accountant;
mod balance;
mod base;
pub mod config;
mod engine;
pub mod error;
mod event;
mod metrics;
mod pool_book;
mod record;
mod sequencer;

pub use accountant::{MIN_SHARE_PRICE, ShareAccountant, ShareState, TradeOutcome, WalletPnl};
pub use balance::{LedgerReport, UserBalance, resolve_balances};
pub use base::{PoolId, WalletAddress};
pub use config::{LedgerConfig, PoolSettings};
pub use engine::Engine;
pub use error::LedgerError;
pub use event::{LedgerEvent, MAX_AMOUNT, collect_events, parse_timestamp};
pub use metrics::PoolMetrics;
pub use pool_book::{PoolBook, PoolReport};
pub use record::{DepositTransaction, Investor, PoolHistory, Trade, WithdrawalRequest, WithdrawalStatus};
pub use sequencer::sequence_events;
