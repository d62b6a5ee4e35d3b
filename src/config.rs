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

//! Ledger configuration.
//!
//! Profit-share rates are configured per pool in TOML. Decimals are written
//! as strings so they round-trip without binary float error:
//!
//! ```toml
//! default_profit_share_rate = "0.20"
//!
//! [pools.gold]
//! profit_share_rate = "0.25"
//! ```

use crate::base::PoolId;
use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub default_profit_share_rate: Decimal,
    #[serde(default)]
    pub pools: BTreeMap<String, PoolSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub profit_share_rate: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_profit_share_rate: Decimal::ZERO,
            pools: BTreeMap::new(),
        }
    }
}

impl LedgerConfig {
    pub fn with_default_rate(default_profit_share_rate: Decimal) -> Self {
        Self {
            default_profit_share_rate,
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, LedgerError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Rate for `pool`: its own entry if configured, else the default.
    pub fn profit_share_rate(&self, pool: &PoolId) -> Decimal {
        self.pools
            .get(pool.as_str())
            .map(|settings| settings.profit_share_rate)
            .unwrap_or(self.default_profit_share_rate)
    }
}
