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

//! Share accounting.
//!
//! The [`ShareAccountant`] replays an ordered event stream against a running
//! NAV-per-share state:
//!
//! - **Deposits** buy shares at the NAV prevailing before their own cash lands.
//! - **Withdrawals** redeem shares at the NAV prevailing before the cash leaves.
//! - **Trades** move pool value; their net result is attributed to the wallets
//!   holding shares at that moment, in proportion to their ownership.
//!
//! NAV is `total_pool_value / total_shares`, or exactly 1 while no shares are
//! outstanding. Shares are never priced below [`MIN_SHARE_PRICE`]. All
//! arithmetic is checked: an event whose effect would overflow `Decimal` is
//! refused with [`LedgerError::Overflow`] and leaves the state untouched.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use pool_share_ledger::{LedgerEvent, ShareAccountant};
//! use rust_decimal_macros::dec;
//!
//! let mut accountant = ShareAccountant::new(dec!(0.20)).unwrap();
//! accountant
//!     .apply(&LedgerEvent::Deposit {
//!         timestamp: Utc::now(),
//!         wallet: "0xabc".into(),
//!         amount: dec!(5000),
//!     })
//!     .unwrap();
//! assert_eq!(accountant.nav(), dec!(1));
//! assert_eq!(accountant.total_shares(), dec!(5000));
//! ```

use crate::base::WalletAddress;
use crate::error::LedgerError;
use crate::event::LedgerEvent;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Lowest price at which shares are issued or redeemed.
///
/// A pool whose NAV has collapsed below this (including an insolvent one)
/// prices shares at 1, the bootstrap price.
pub const MIN_SHARE_PRICE: Decimal = dec!(0.000000000001);

/// Checks that a profit share rate lies in `[0, 1)`.
pub(crate) fn validate_profit_share_rate(rate: Decimal) -> Result<Decimal, LedgerError> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(LedgerError::InvalidProfitShareRate(rate));
    }
    Ok(rate)
}

pub(crate) fn checked(value: Option<Decimal>, operation: &'static str) -> Result<Decimal, LedgerError> {
    value.ok_or(LedgerError::Overflow(operation))
}

/// Split of one trade's result between fees, the manager, and the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeOutcome {
    pub gross_pnl: Decimal,
    pub fee: Decimal,
    /// Manager's cut; zero unless the trade is profitable after fees.
    pub profit_share: Decimal,
    /// What the pool keeps: `gross_pnl - fee - profit_share`.
    pub net_pnl: Decimal,
}

impl TradeOutcome {
    pub fn new(
        gross_pnl: Decimal,
        fee: Decimal,
        profit_share_rate: Decimal,
    ) -> Result<Self, LedgerError> {
        let profit_after_fees = checked(gross_pnl.checked_sub(fee), "trade profit after fees")?;
        let profit_share = if profit_after_fees > Decimal::ZERO {
            checked(profit_after_fees.checked_mul(profit_share_rate), "profit share")?
        } else {
            Decimal::ZERO
        };
        Ok(Self {
            gross_pnl,
            fee,
            profit_share,
            net_pnl: checked(profit_after_fees.checked_sub(profit_share), "trade net pnl")?,
        })
    }
}

/// Per-wallet trading attribution.
///
/// Display-only side ledgers: none of these feed back into share counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalletPnl {
    pub net_pnl: Decimal,
    pub gross_pnl: Decimal,
    pub fees: Decimal,
    pub profit_share: Decimal,
}

impl WalletPnl {
    /// Adds `ownership` of a trade outcome to this ledger.
    fn attribute(self, outcome: &TradeOutcome, ownership: Decimal) -> Result<Self, LedgerError> {
        let add = |acc: Decimal, amount: Decimal| {
            checked(
                amount.checked_mul(ownership).and_then(|part| acc.checked_add(part)),
                "trade attribution",
            )
        };
        Ok(Self {
            net_pnl: add(self.net_pnl, outcome.net_pnl)?,
            gross_pnl: add(self.gross_pnl, outcome.gross_pnl)?,
            fees: add(self.fees, outcome.fee)?,
            profit_share: add(self.profit_share, outcome.profit_share)?,
        })
    }
}

/// Final state of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareState {
    /// Every wallet that ever received shares, including fully redeemed ones.
    pub shares: BTreeMap<WalletAddress, Decimal>,
    pub total_shares: Decimal,
    pub total_pool_value: Decimal,
    /// Wallets that were attributed at least one trade.
    pub pnl: BTreeMap<WalletAddress, WalletPnl>,
}

impl ShareState {
    /// NAV per share; 1 while no shares are outstanding.
    pub fn nav(&self) -> Decimal {
        nav(self.total_pool_value, self.total_shares)
    }
}

/// Saturates at the `Decimal` bounds when the quotient does not fit.
pub(crate) fn nav(pool_value: Decimal, total_shares: Decimal) -> Decimal {
    if total_shares <= Decimal::ZERO {
        return Decimal::ONE;
    }
    match pool_value.checked_div(total_shares) {
        Some(nav) => nav,
        None if pool_value.is_sign_negative() => Decimal::MIN,
        None => Decimal::MAX,
    }
}

/// Price at which shares are issued or redeemed.
///
/// Equal to [`nav`] while it is at least [`MIN_SHARE_PRICE`]. Below that the
/// pool trades at 1, so share counts stay non-negative and bounded.
fn share_price(pool_value: Decimal, total_shares: Decimal) -> Decimal {
    let price = nav(pool_value, total_shares);
    if price >= MIN_SHARE_PRICE {
        price
    } else {
        warn!(%pool_value, %total_shares, %price, "share price below floor, pricing shares at 1");
        Decimal::ONE
    }
}

/// Running NAV-per-share state machine.
///
/// # Invariants
///
/// - Per-wallet shares and `total_shares` are never negative.
/// - Trade attribution never changes share counts.
/// - A refused event leaves the state exactly as it was.
#[derive(Debug, Clone)]
pub struct ShareAccountant {
    profit_share_rate: Decimal,
    shares: BTreeMap<WalletAddress, Decimal>,
    total_shares: Decimal,
    total_pool_value: Decimal,
    pnl: BTreeMap<WalletAddress, WalletPnl>,
}

impl ShareAccountant {
    /// Creates an empty pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidProfitShareRate`] if the rate is outside `[0, 1)`.
    pub fn new(profit_share_rate: Decimal) -> Result<Self, LedgerError> {
        Ok(Self {
            profit_share_rate: validate_profit_share_rate(profit_share_rate)?,
            shares: BTreeMap::new(),
            total_shares: Decimal::ZERO,
            total_pool_value: Decimal::ZERO,
            pnl: BTreeMap::new(),
        })
    }

    /// Replays an already ordered event stream from an empty pool.
    pub fn replay<'a, I>(profit_share_rate: Decimal, events: I) -> Result<ShareState, LedgerError>
    where
        I: IntoIterator<Item = &'a LedgerEvent>,
    {
        let mut accountant = Self::new(profit_share_rate)?;
        for event in events {
            accountant.apply(event)?;
        }
        Ok(accountant.finish())
    }

    /// Applies one event.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the event's effect does not fit in
    /// `Decimal`; the state is left unchanged.
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        match event {
            LedgerEvent::Deposit { wallet, amount, .. } => self.deposit(wallet, *amount)?,
            LedgerEvent::Withdrawal { wallet, amount, .. } => self.withdraw(wallet, *amount)?,
            LedgerEvent::Trade { gross_pnl, fee, .. } => self.book_trade(*gross_pnl, *fee)?,
        }
        self.assert_invariants();
        Ok(())
    }

    pub fn nav(&self) -> Decimal {
        nav(self.total_pool_value, self.total_shares)
    }

    pub fn shares_of(&self, wallet: &WalletAddress) -> Decimal {
        self.shares.get(wallet).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_shares(&self) -> Decimal {
        self.total_shares
    }

    pub fn total_pool_value(&self) -> Decimal {
        self.total_pool_value
    }

    pub fn finish(self) -> ShareState {
        ShareState {
            shares: self.shares,
            total_shares: self.total_shares,
            total_pool_value: self.total_pool_value,
            pnl: self.pnl,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.total_shares >= Decimal::ZERO,
            "Invariant violated: total shares went negative: {}",
            self.total_shares
        );
        debug_assert!(
            self.shares.values().all(|s| *s >= Decimal::ZERO),
            "Invariant violated: wallet shares went negative"
        );
    }

    /// Issues shares at the pre-deposit NAV.
    fn deposit(&mut self, wallet: &WalletAddress, amount: Decimal) -> Result<(), LedgerError> {
        let price = share_price(self.total_pool_value, self.total_shares);
        let new_shares = checked(amount.checked_div(price), "share issue")?;
        let held = checked(self.shares_of(wallet).checked_add(new_shares), "wallet shares")?;
        let total_shares = checked(self.total_shares.checked_add(new_shares), "total shares")?;
        let pool_value = checked(self.total_pool_value.checked_add(amount), "pool value")?;

        self.shares.insert(wallet.clone(), held);
        self.total_shares = total_shares;
        self.total_pool_value = pool_value;
        Ok(())
    }

    /// Redeems shares at the pre-withdrawal NAV.
    ///
    /// A wallet without shares keeps none, but the cash still leaves the pool.
    /// Redemptions beyond a wallet's holding clamp its shares at zero.
    fn withdraw(&mut self, wallet: &WalletAddress, amount: Decimal) -> Result<(), LedgerError> {
        let price = share_price(self.total_pool_value, self.total_shares);
        let shares_to_remove = checked(amount.checked_div(price), "share redemption")?;
        let pool_value = checked(self.total_pool_value.checked_sub(amount), "pool value")?;
        self.total_pool_value = pool_value;

        let Some(held) = self.shares.get_mut(wallet).filter(|held| **held > Decimal::ZERO) else {
            warn!(
                %wallet,
                %amount,
                "withdrawal from wallet without shares, pool value reduced anyway"
            );
            return Ok(());
        };

        let current = *held;
        if shares_to_remove > current {
            warn!(
                %wallet,
                held = %current,
                requested = %shares_to_remove,
                "withdrawal exceeds holding, clamping to zero"
            );
        }
        // Both operands are non-negative, so neither subtraction can overflow.
        *held = (current - shares_to_remove).max(Decimal::ZERO);
        self.total_shares = (self.total_shares - shares_to_remove).max(Decimal::ZERO);
        Ok(())
    }

    /// Splits a trade's result across current holders by ownership.
    ///
    /// Pool value moves even when nobody holds shares.
    fn book_trade(&mut self, gross_pnl: Decimal, fee: Decimal) -> Result<(), LedgerError> {
        let outcome = TradeOutcome::new(gross_pnl, fee, self.profit_share_rate)?;

        let mut attributed = Vec::new();
        if self.total_shares > Decimal::ZERO {
            for (wallet, held) in self.shares.iter().filter(|(_, s)| **s > Decimal::ZERO) {
                let ownership = checked(held.checked_div(self.total_shares), "ownership")?;
                let current = self.pnl.get(wallet).copied().unwrap_or_default();
                attributed.push((wallet.clone(), current.attribute(&outcome, ownership)?));
            }
        } else {
            warn!(net_pnl = %outcome.net_pnl, "trade booked with no shareholders");
        }
        let pool_value = checked(self.total_pool_value.checked_add(outcome.net_pnl), "pool value")?;

        self.pnl.extend(attributed);
        self.total_pool_value = pool_value;
        debug!(
            net_pnl = %outcome.net_pnl,
            pool_value = %self.total_pool_value,
            nav = %self.nav(),
            "trade booked"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn deposit(wallet: &str, amount: Decimal) -> LedgerEvent {
        LedgerEvent::Deposit {
            timestamp: at(1),
            wallet: wallet.into(),
            amount,
        }
    }

    fn withdrawal(wallet: &str, amount: Decimal) -> LedgerEvent {
        LedgerEvent::Withdrawal {
            timestamp: at(1),
            wallet: wallet.into(),
            amount,
        }
    }

    fn trade(gross_pnl: Decimal, fee: Decimal) -> LedgerEvent {
        LedgerEvent::Trade {
            timestamp: at(1),
            gross_pnl,
            fee,
        }
    }

    // === TradeOutcome ===

    #[test]
    fn outcome_on_profit() {
        let outcome = TradeOutcome::new(dec!(500), dec!(10), dec!(0.20)).unwrap();
        assert_eq!(outcome.profit_share, dec!(98));
        assert_eq!(outcome.net_pnl, dec!(392));
    }

    #[test]
    fn outcome_on_loss_has_no_profit_share() {
        let outcome = TradeOutcome::new(dec!(-200), dec!(10), dec!(0.5)).unwrap();
        assert_eq!(outcome.profit_share, Decimal::ZERO);
        assert_eq!(outcome.net_pnl, dec!(-210));
    }

    #[test]
    fn outcome_when_fee_eats_profit() {
        let outcome = TradeOutcome::new(dec!(10), dec!(10), dec!(0.5)).unwrap();
        assert_eq!(outcome.profit_share, Decimal::ZERO);
        assert_eq!(outcome.net_pnl, Decimal::ZERO);
    }

    // === State transitions ===

    #[test]
    fn first_deposit_issues_shares_at_par() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(1000))).unwrap();
        assert_eq!(accountant.shares_of(&"0xa".into()), dec!(1000));
        assert_eq!(accountant.total_pool_value(), dec!(1000));
        assert_eq!(accountant.nav(), dec!(1));
    }

    #[test]
    fn deposit_after_gain_buys_at_higher_nav() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(1000))).unwrap();
        accountant.apply(&trade(dec!(250), dec!(0))).unwrap();
        assert_eq!(accountant.nav(), dec!(1.25));

        accountant.apply(&deposit("0xb", dec!(500))).unwrap();
        assert_eq!(accountant.shares_of(&"0xb".into()), dec!(400));
        assert_eq!(accountant.total_shares(), dec!(1400));
        assert_eq!(accountant.nav(), dec!(1.25));
    }

    #[test]
    fn withdrawal_redeems_at_pre_withdrawal_nav() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(1000))).unwrap();
        accountant.apply(&trade(dec!(1000), dec!(0))).unwrap();
        accountant.apply(&withdrawal("0xa", dec!(500))).unwrap();

        assert_eq!(accountant.shares_of(&"0xa".into()), dec!(750));
        assert_eq!(accountant.total_shares(), dec!(750));
        assert_eq!(accountant.total_pool_value(), dec!(1500));
        assert_eq!(accountant.nav(), dec!(2));
    }

    #[test]
    fn over_withdrawal_clamps_to_zero() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(100))).unwrap();
        accountant.apply(&withdrawal("0xa", dec!(150))).unwrap();

        assert_eq!(accountant.shares_of(&"0xa".into()), Decimal::ZERO);
        assert_eq!(accountant.total_shares(), Decimal::ZERO);
        assert_eq!(accountant.total_pool_value(), dec!(-50));
    }

    #[test]
    fn withdrawal_without_shares_only_reduces_pool_value() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(1000))).unwrap();
        accountant.apply(&withdrawal("0xstranger", dec!(100))).unwrap();

        assert_eq!(accountant.total_shares(), dec!(1000));
        assert_eq!(accountant.total_pool_value(), dec!(900));
        assert_eq!(accountant.nav(), dec!(0.9));

        let state = accountant.finish();
        assert!(!state.shares.contains_key(&"0xstranger".into()));
    }

    #[test]
    fn fully_redeemed_wallet_cannot_drain_other_holders() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(100))).unwrap();
        accountant.apply(&deposit("0xb", dec!(100))).unwrap();
        accountant.apply(&withdrawal("0xa", dec!(100))).unwrap();
        accountant.apply(&withdrawal("0xa", dec!(50))).unwrap();

        assert_eq!(accountant.shares_of(&"0xa".into()), Decimal::ZERO);
        assert_eq!(accountant.shares_of(&"0xb".into()), dec!(100));
        assert_eq!(accountant.total_shares(), dec!(100));
    }

    #[test]
    fn trade_distributes_by_ownership() {
        let mut accountant = ShareAccountant::new(dec!(0.10)).unwrap();
        accountant.apply(&deposit("0xa", dec!(3000))).unwrap();
        accountant.apply(&deposit("0xb", dec!(1000))).unwrap();
        accountant.apply(&trade(dec!(420), dec!(20))).unwrap();

        let state = accountant.finish();
        let a = state.pnl[&WalletAddress::from("0xa")];
        let b = state.pnl[&WalletAddress::from("0xb")];
        assert_eq!(a.gross_pnl, dec!(315));
        assert_eq!(a.fees, dec!(15));
        assert_eq!(a.profit_share, dec!(30));
        assert_eq!(a.net_pnl, dec!(270));
        assert_eq!(b.net_pnl, dec!(90));
        assert_eq!(state.total_pool_value, dec!(4360));
        // Attribution never touches share counts.
        assert_eq!(state.total_shares, dec!(4000));
    }

    #[test]
    fn trade_without_holders_still_moves_pool_value() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&trade(dec!(100), dec!(0))).unwrap();
        assert_eq!(accountant.total_pool_value(), dec!(100));
        assert_eq!(accountant.nav(), dec!(1));

        // The phantom value is absorbed by the next depositor's share price.
        accountant.apply(&deposit("0xa", dec!(1000))).unwrap();
        assert_eq!(accountant.shares_of(&"0xa".into()), dec!(1000));
        assert_eq!(accountant.total_pool_value(), dec!(1100));
        assert!(accountant.finish().pnl.is_empty());
    }

    #[test]
    fn insolvent_pool_prices_at_one() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(100))).unwrap();
        accountant.apply(&trade(dec!(-100), dec!(0))).unwrap();
        assert_eq!(accountant.nav(), Decimal::ZERO);

        accountant.apply(&deposit("0xb", dec!(50))).unwrap();
        assert_eq!(accountant.shares_of(&"0xb".into()), dec!(50));

        accountant.apply(&trade(dec!(-100), dec!(0))).unwrap();
        accountant.apply(&withdrawal("0xb", dec!(10))).unwrap();
        assert_eq!(accountant.shares_of(&"0xb".into()), dec!(40));
        assert!(accountant.total_shares() >= Decimal::ZERO);
    }

    #[test]
    fn replay_matches_manual_application() {
        let events = vec![
            deposit("0xa", dec!(1000)),
            trade(dec!(100), dec!(0)),
            deposit("0xb", dec!(1100)),
        ];
        let state = ShareAccountant::replay(dec!(0), &events).unwrap();
        assert_eq!(state.shares[&WalletAddress::from("0xb")], dec!(1000));
        assert_eq!(state.total_shares, dec!(2000));
        assert_eq!(state.nav(), dec!(1.1));
    }

    // === Degenerate prices and overflow ===

    #[test]
    fn collapsed_nav_prices_at_one() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(1))).unwrap();
        accountant
            .apply(&trade(dec!(-0.9999999999999999999999999999), dec!(0)))
            .unwrap();
        assert!(accountant.nav() < MIN_SHARE_PRICE);

        accountant.apply(&deposit("0xb", dec!(10))).unwrap();
        assert_eq!(accountant.shares_of(&"0xb".into()), dec!(10));
        assert_eq!(accountant.total_shares(), dec!(11));
    }

    #[test]
    fn overflowing_deposit_is_refused_without_side_effects() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(50000000000000000000000000000))).unwrap();

        let err = accountant
            .apply(&deposit("0xb", dec!(50000000000000000000000000000)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
        assert_eq!(accountant.shares_of(&"0xb".into()), Decimal::ZERO);
        assert_eq!(accountant.total_shares(), dec!(50000000000000000000000000000));
        assert_eq!(accountant.total_pool_value(), dec!(50000000000000000000000000000));
    }

    #[test]
    fn overflowing_trade_leaves_attribution_untouched() {
        let mut accountant = ShareAccountant::new(dec!(0)).unwrap();
        accountant.apply(&deposit("0xa", dec!(50000000000000000000000000000))).unwrap();
        accountant.apply(&trade(dec!(1), dec!(0))).unwrap();

        let err = accountant
            .apply(&trade(dec!(50000000000000000000000000000), dec!(0)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
        let state = accountant.finish();
        assert_eq!(state.pnl[&WalletAddress::from("0xa")].net_pnl, dec!(1));
    }

    #[test]
    fn replay_propagates_overflow() {
        let events = vec![
            deposit("0xa", dec!(50000000000000000000000000000)),
            deposit("0xb", dec!(50000000000000000000000000000)),
        ];
        assert!(matches!(
            ShareAccountant::replay(dec!(0), &events),
            Err(LedgerError::Overflow(_))
        ));
    }

    #[test]
    fn new_rejects_out_of_range_rate() {
        assert_eq!(
            ShareAccountant::new(dec!(1)).unwrap_err(),
            LedgerError::InvalidProfitShareRate(dec!(1))
        );
        assert_eq!(
            ShareAccountant::new(dec!(-0.1)).unwrap_err(),
            LedgerError::InvalidProfitShareRate(dec!(-0.1))
        );
        assert!(ShareAccountant::new(dec!(0.99)).is_ok());
    }
}
