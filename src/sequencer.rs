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

//! Chronological ordering of ledger events.

use crate::event::LedgerEvent;

/// Orders events by timestamp, ascending.
///
/// The sort is stable: events sharing a timestamp keep their input order.
/// No secondary key (such as event kind) is applied.
pub fn sequence_events(mut events: Vec<LedgerEvent>) -> Vec<LedgerEvent> {
    events.sort_by_key(LedgerEvent::timestamp);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn trade(day: u32, pnl: i64) -> LedgerEvent {
        LedgerEvent::Trade {
            timestamp: at(day),
            gross_pnl: pnl.into(),
            fee: dec!(0),
        }
    }

    #[test]
    fn orders_by_timestamp() {
        let ordered = sequence_events(vec![trade(3, 3), trade(1, 1), trade(2, 2)]);
        let days: Vec<_> = ordered.iter().map(LedgerEvent::timestamp).collect();
        assert_eq!(days, vec![at(1), at(2), at(3)]);
    }

    #[test]
    fn ties_keep_input_order() {
        let withdrawal = LedgerEvent::Withdrawal {
            timestamp: at(1),
            wallet: "0xa".into(),
            amount: dec!(5),
        };
        let deposit = LedgerEvent::Deposit {
            timestamp: at(1),
            wallet: "0xa".into(),
            amount: dec!(5),
        };
        let ordered = sequence_events(vec![trade(1, 7), withdrawal.clone(), deposit.clone()]);
        assert_eq!(ordered, vec![trade(1, 7), withdrawal, deposit]);
    }

    #[test]
    fn empty_stream() {
        assert!(sequence_events(Vec::new()).is_empty());
    }
}
