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

use chrono::Utc;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use pool_share_ledger::{
    DepositTransaction, LedgerConfig, PoolBook, PoolId, PoolMetrics, PoolReport, Trade,
    UserBalance, WalletAddress, WithdrawalRequest, WithdrawalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Pool Share Ledger - Compute investor balances from pool history CSVs
///
/// Replays deposits, paid withdrawals, and trades per pool and writes each
/// investor's balance and ownership to stdout as CSV.
#[derive(Parser, Debug)]
#[command(name = "pool-share-ledger")]
#[command(about = "Computes NAV-per-share investor balances for trading pools", long_about = None)]
struct Args {
    /// Deposits CSV: pool,wallet,amount,date,tx_hash
    #[arg(long, value_name = "FILE")]
    deposits: PathBuf,

    /// Stored investor balances CSV: pool,wallet,invested_amount
    ///
    /// Only used by --metrics. Defaults to each wallet's deposit total.
    #[arg(long, value_name = "FILE")]
    investors: Option<PathBuf>,

    /// Withdrawal requests CSV: pool,id,wallet,amount,status,created_date,paid_date
    #[arg(long, value_name = "FILE")]
    withdrawals: Option<PathBuf>,

    /// Trades CSV: pool,date,pnl,fee
    #[arg(long, value_name = "FILE")]
    trades: Option<PathBuf>,

    /// TOML file with per-pool profit share rates
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Default manager profit share rate, in [0, 1)
    #[arg(long, value_name = "RATE")]
    profit_share_rate: Option<Decimal>,

    /// Write pool-wide totals instead of investor balances
    #[arg(long)]
    metrics: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => match LedgerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => LedgerConfig::default(),
    };
    if let Some(rate) = args.profit_share_rate {
        config.default_profit_share_rate = rate;
    }

    let book = PoolBook::new();
    // Deposits first: a stored investor balance overrides the deposit total.
    let loaded = open(&args.deposits)
        .and_then(|reader| load_deposits(&book, reader).map_err(|e| e.to_string()))
        .and_then(|_| load_optional(&args.investors, |reader| load_investors(&book, reader)))
        .and_then(|_| load_optional(&args.withdrawals, |reader| load_withdrawals(&book, reader)))
        .and_then(|_| load_optional(&args.trades, |reader| load_trades(&book, reader)));
    if let Err(e) = loaded {
        eprintln!("Error reading input: {}", e);
        process::exit(1);
    }

    let written = if args.metrics {
        let mut metrics = Vec::new();
        for (pool, result) in book.metrics(&config) {
            match result {
                Ok(m) => metrics.push((pool, m)),
                Err(e) => {
                    eprintln!("Error in pool '{}': {}", pool, e);
                    process::exit(1);
                }
            }
        }
        write_metrics(&metrics, std::io::stdout())
    } else {
        let reports = book.compute(&config, Utc::now());
        let mut failed = false;
        for report in &reports {
            if let Err(e) = &report.result {
                eprintln!("Error in pool '{}': {}", report.pool, e);
                failed = true;
            }
        }
        if failed {
            process::exit(1);
        }
        write_balances(&reports, std::io::stdout())
    };

    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("cannot open '{}': {}", path.display(), e))
}

fn load_optional<F>(path: &Option<PathBuf>, load: F) -> Result<(), String>
where
    F: FnOnce(BufReader<File>) -> Result<(), csv::Error>,
{
    match path {
        Some(path) => load(open(path)?).map_err(|e| format!("'{}': {}", path.display(), e)),
        None => Ok(()),
    }
}

fn pool_id(raw: Option<String>) -> PoolId {
    match raw {
        Some(raw) if !raw.trim().is_empty() => PoolId::from(raw.as_str()),
        _ => PoolId::default(),
    }
}

#[derive(Debug, Deserialize)]
struct DepositRecord {
    #[serde(default)]
    pool: Option<String>,
    wallet: String,
    amount: Decimal,
    date: Option<String>,
    #[serde(default)]
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvestorRecord {
    #[serde(default)]
    pool: Option<String>,
    wallet: String,
    invested_amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct WithdrawalRecord {
    #[serde(default)]
    pool: Option<String>,
    id: String,
    wallet: String,
    amount: Decimal,
    status: String,
    #[serde(default)]
    created_date: Option<String>,
    #[serde(default)]
    paid_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradeRecord {
    #[serde(default)]
    pool: Option<String>,
    date: Option<String>,
    pnl: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    fee: Option<Decimal>,
}

/// Reads all well-formed rows, skipping malformed ones with a warning.
///
/// # Errors
///
/// Returns a CSV error if the header row cannot be read.
fn read_rows<T: DeserializeOwned, R: Read>(reader: R, kind: &str) -> Result<Vec<T>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut rows = Vec::new();
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!(kind, error = %e, "skipping malformed row"),
        }
    }
    Ok(rows)
}

pub fn load_deposits<R: Read>(book: &PoolBook, reader: R) -> Result<(), csv::Error> {
    for row in read_rows::<DepositRecord, R>(reader, "deposit")? {
        let deposit = DepositTransaction {
            amount: row.amount,
            date: row.date,
            tx_hash: row.tx_hash,
        };
        book.add_deposit(pool_id(row.pool), WalletAddress::new(&row.wallet), deposit);
    }
    Ok(())
}

pub fn load_investors<R: Read>(book: &PoolBook, reader: R) -> Result<(), csv::Error> {
    for row in read_rows::<InvestorRecord, R>(reader, "investor")? {
        book.set_invested_amount(
            pool_id(row.pool),
            WalletAddress::new(&row.wallet),
            row.invested_amount,
        );
    }
    Ok(())
}

pub fn load_withdrawals<R: Read>(book: &PoolBook, reader: R) -> Result<(), csv::Error> {
    for row in read_rows::<WithdrawalRecord, R>(reader, "withdrawal")? {
        let status = match row.status.to_lowercase().as_str() {
            "pending" => WithdrawalStatus::Pending,
            "paid" => WithdrawalStatus::Paid,
            "rejected" => WithdrawalStatus::Rejected,
            other => {
                warn!(id = %row.id, status = other, "skipping withdrawal with unknown status");
                continue;
            }
        };
        let withdrawal = WithdrawalRequest {
            id: row.id,
            wallet_address: WalletAddress::new(&row.wallet),
            amount: row.amount,
            status,
            created_date: row.created_date,
            paid_date: row.paid_date,
        };
        book.add_withdrawal(pool_id(row.pool), withdrawal);
    }
    Ok(())
}

pub fn load_trades<R: Read>(book: &PoolBook, reader: R) -> Result<(), csv::Error> {
    for row in read_rows::<TradeRecord, R>(reader, "trade")? {
        let trade = Trade {
            date: row.date,
            pnl: row.pnl,
            fee: row.fee.unwrap_or(Decimal::ZERO),
        };
        book.add_trade(pool_id(row.pool), trade);
    }
    Ok(())
}

/// Output row for one investor; values rounded half-to-even.
#[derive(Debug, Serialize)]
struct BalanceRecord<'a> {
    pool: &'a str,
    wallet: &'a str,
    total_balance: Decimal,
    ownership_percent: Decimal,
    deposits: Decimal,
    withdrawals: Decimal,
    net_pnl: Decimal,
    gross_pnl: Decimal,
    fees_paid: Decimal,
    profit_share_paid: Decimal,
    shares: Decimal,
    share_value: Decimal,
    deposit_count: usize,
}

impl<'a> BalanceRecord<'a> {
    fn new(pool: &'a PoolId, wallet: &'a WalletAddress, balance: &UserBalance) -> Self {
        let money = |value: Decimal| value.round_dp(UserBalance::MONEY_PRECISION);
        Self {
            pool: pool.as_str(),
            wallet: wallet.as_str(),
            total_balance: money(balance.total_balance),
            ownership_percent: money(balance.ownership_percent),
            deposits: money(balance.deposits),
            withdrawals: money(balance.withdrawals),
            net_pnl: money(balance.net_pnl),
            gross_pnl: money(balance.gross_pnl),
            fees_paid: money(balance.fees_paid),
            profit_share_paid: money(balance.profit_share_paid),
            shares: balance.shares.round_dp(UserBalance::SHARE_PRECISION),
            share_value: money(balance.share_value),
            deposit_count: balance.deposit_count,
        }
    }
}

/// Writes one CSV row per investor, pools and wallets in sorted order.
///
/// Pools whose replay failed are skipped.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_balances<W: Write>(reports: &[PoolReport], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for PoolReport { pool, result } in reports {
        let Ok(report) = result else {
            error!(%pool, "no balances written for failed pool");
            continue;
        };
        for (wallet, balance) in &report.balances {
            wtr.serialize(BalanceRecord::new(pool, wallet, balance))?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Output row of pool-wide totals; values rounded half-to-even.
#[derive(Debug, Serialize)]
struct MetricsRecord<'a> {
    pool: &'a str,
    gross_pnl: Decimal,
    trading_fees: Decimal,
    profit_share: Decimal,
    net_pnl: Decimal,
    total_deposits: Decimal,
    total_withdrawals: Decimal,
    total_balance: Decimal,
}

impl<'a> MetricsRecord<'a> {
    fn new(pool: &'a PoolId, metrics: &PoolMetrics) -> Self {
        let round = |value: Decimal| value.round_dp(PoolMetrics::DECIMAL_PRECISION);
        Self {
            pool: pool.as_str(),
            gross_pnl: round(metrics.gross_pnl),
            trading_fees: round(metrics.trading_fees),
            profit_share: round(metrics.profit_share),
            net_pnl: round(metrics.net_pnl),
            total_deposits: round(metrics.total_deposits),
            total_withdrawals: round(metrics.total_withdrawals),
            total_balance: round(metrics.total_balance),
        }
    }
}

/// Writes one CSV row of pool-wide totals per pool.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_metrics<W: Write>(metrics: &[(PoolId, PoolMetrics)], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for (pool, m) in metrics {
        wtr.serialize(MetricsRecord::new(pool, m))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn parse_deposits_into_pools() {
        let csv = "pool,wallet,amount,date,tx_hash\n\
                   gold,0xA,100.0,2024-01-01,0xfeed\n\
                   ,0xB,50.0,2024-01-02,\n";
        let book = PoolBook::new();
        load_deposits(&book, Cursor::new(csv)).unwrap();

        assert_eq!(book.pools(), vec![PoolId::from("default"), PoolId::from("gold")]);
        let gold = book.history(&PoolId::from("gold")).unwrap();
        assert_eq!(gold.investors[0].wallet_address.as_str(), "0xa");
        assert_eq!(gold.investors[0].deposit_transactions[0].tx_hash.as_deref(), Some("0xfeed"));
        let default = book.history(&PoolId::default()).unwrap();
        assert_eq!(default.investors[0].deposit_transactions[0].tx_hash, None);
    }

    #[test]
    fn pool_column_is_optional() {
        let csv = "wallet,amount,date\n0xa,10,2024-01-01\n";
        let book = PoolBook::new();
        load_deposits(&book, Cursor::new(csv)).unwrap();
        assert_eq!(book.pools(), vec![PoolId::default()]);
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "pool,wallet,amount,date\n\
                   gold,0xa,100.0,2024-01-01\n\
                   gold,0xb,not-a-number,2024-01-01\n\
                   gold,0xc,5,2024-01-01\n";
        let book = PoolBook::new();
        load_deposits(&book, Cursor::new(csv)).unwrap();
        assert_eq!(book.history(&PoolId::from("gold")).unwrap().investors.len(), 2);
    }

    #[test]
    fn parse_withdrawal_statuses() {
        let csv = "pool,id,wallet,amount,status,created_date,paid_date\n\
                   gold,1,0xa,10,PAID,2024-01-01,2024-01-02\n\
                   gold,2,0xa,10,pending,2024-01-01,\n\
                   gold,3,0xa,10,bogus,2024-01-01,\n";
        let book = PoolBook::new();
        load_withdrawals(&book, Cursor::new(csv)).unwrap();

        let gold = book.history(&PoolId::from("gold")).unwrap();
        assert_eq!(gold.withdrawals.len(), 2);
        assert_eq!(gold.withdrawals[0].status, WithdrawalStatus::Paid);
        assert_eq!(gold.withdrawals[0].paid_date.as_deref(), Some("2024-01-02"));
        assert_eq!(gold.withdrawals[1].paid_date, None);
    }

    #[test]
    fn missing_fee_defaults_to_zero() {
        let csv = "pool,date,pnl,fee\ngold,2024-01-02,25.5,\n";
        let book = PoolBook::new();
        load_trades(&book, Cursor::new(csv)).unwrap();
        let gold = book.history(&PoolId::from("gold")).unwrap();
        assert_eq!(gold.trades[0].fee, Decimal::ZERO);
        assert_eq!(gold.trades[0].pnl, dec!(25.5));
    }

    #[test]
    fn stored_investor_balance_overrides_deposit_total() {
        let book = PoolBook::new();
        load_deposits(&book, Cursor::new("pool,wallet,amount,date\ngold,0xa,100,2024-01-01\n")).unwrap();
        load_investors(&book, Cursor::new("pool,wallet,invested_amount\ngold,0xa,80\n")).unwrap();

        let metrics = book.metrics(&LedgerConfig::default());
        assert_eq!(metrics[0].1, Ok(PoolMetrics {
            total_deposits: dec!(80),
            total_balance: dec!(80),
            ..PoolMetrics::default()
        }));
    }

    #[test]
    fn write_balances_to_csv() {
        let book = PoolBook::new();
        load_deposits(&book, Cursor::new("pool,wallet,amount,date\ngold,0xa,5000,2024-01-01\n")).unwrap();
        load_trades(&book, Cursor::new("pool,date,pnl,fee\ngold,2024-01-02,500,10\n")).unwrap();

        let config = LedgerConfig::with_default_rate(dec!(0.20));
        let reports = book.compute(&config, now());

        let mut output = Vec::new();
        write_balances(&reports, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        let mut lines = output.lines();

        assert_eq!(
            lines.next().unwrap(),
            "pool,wallet,total_balance,ownership_percent,deposits,withdrawals,net_pnl,\
             gross_pnl,fees_paid,profit_share_paid,shares,share_value,deposit_count"
        );
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[0], "gold");
        assert_eq!(row[1], "0xa");
        assert_eq!(row[2].parse::<Decimal>().unwrap(), dec!(5392));
        assert_eq!(row[3].parse::<Decimal>().unwrap(), dec!(100));
        assert_eq!(row[12], "1");
        assert!(lines.next().is_none());
    }

    #[test]
    fn write_metrics_to_csv() {
        let metrics = vec![(PoolId::from("gold"), PoolMetrics {
            net_pnl: dec!(1.23456),
            ..PoolMetrics::default()
        })];
        let mut output = Vec::new();
        write_metrics(&metrics, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.starts_with(
            "pool,gross_pnl,trading_fees,profit_share,net_pnl,total_deposits,total_withdrawals,total_balance"
        ));
        assert!(output.contains("gold,0,0,0,1.2346,0,0,0"));
    }
}
