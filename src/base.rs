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

//! Core identifier types for investors and pools.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Normalized investor wallet address.
///
/// Addresses are compared in their canonical form: surrounding whitespace
/// removed, case-folded, and stripped of any URI-scheme prefix such as
/// `chrome-extension://`. Two spellings of the same wallet therefore map to
/// the same investor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(raw: &str) -> Self {
        let folded = raw.trim().to_lowercase();
        let stripped = match folded.split_once("://") {
            Some((scheme, rest)) if is_scheme(scheme) => rest.trim(),
            _ => folded.as_str(),
        };
        WalletAddress(stripped.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl From<&str> for WalletAddress {
    fn from(raw: &str) -> Self {
        WalletAddress::new(raw)
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(WalletAddress::new(&raw))
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a pool-type partition.
///
/// Every investor holds shares in exactly one pool; each pool is an
/// independent ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PoolId(pub String);

impl PoolId {
    pub const DEFAULT: &'static str = "default";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        PoolId(Self::DEFAULT.to_string())
    }
}

impl From<&str> for PoolId {
    fn from(raw: &str) -> Self {
        PoolId(raw.trim().to_string())
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
