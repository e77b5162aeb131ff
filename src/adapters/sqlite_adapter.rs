//! SQLite trade and bar store.
//!
//! Two tables: `trades`, one row per closed trade, and `ohlcv`, bars keyed
//! by symbol and epoch-millisecond timestamp.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::adapters::csv_adapter::parse_timestamp;
use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::position::{CloseReason, Side, Trade};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{BarStorePort, DataPort};
use crate::ports::trade_store_port::TradeStorePort;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn pool_error(e: r2d2::Error) -> TraderError {
    TraderError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> TraderError {
    TraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.format(TIME_FORMAT).to_string()
}

fn conversion_error(column: usize, text: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unrecognized value '{}'", text).into(),
    )
}

fn parse_reason(raw: &str) -> Option<CloseReason> {
    match raw {
        "STOP_LOSS" => Some(CloseReason::StopLoss),
        "TAKE_PROFIT" => Some(CloseReason::TakeProfit),
        "TIME_OUT" => Some(CloseReason::TimeOut),
        _ => None,
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| TraderError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                open_time TEXT NOT NULL,
                open_price REAL NOT NULL,
                close_time TEXT NOT NULL,
                close_price REAL NOT NULL,
                fees REAL NOT NULL,
                pnl REAL NOT NULL,
                reason TEXT NOT NULL,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol);
            CREATE TABLE IF NOT EXISTS ohlcv (
                symbol TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, timestamp)
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    /// Closed trades for `symbol` in insertion order.
    pub fn fetch_trades(&self, symbol: &str) -> Result<Vec<Trade>, TraderError> {
        let conn = self.pool.get().map_err(pool_error)?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, strategy, side, quantity, open_time, open_price,
                        close_time, close_price, fees, pnl, reason
                 FROM trades WHERE symbol = ?1 ORDER BY id ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![symbol], |row| {
                let side_raw: String = row.get(2)?;
                let side: Side = side_raw
                    .parse()
                    .map_err(|_| conversion_error(2, &side_raw))?;
                let open_raw: String = row.get(4)?;
                let open_time =
                    parse_timestamp(&open_raw).ok_or_else(|| conversion_error(4, &open_raw))?;
                let close_raw: String = row.get(6)?;
                let close_time =
                    parse_timestamp(&close_raw).ok_or_else(|| conversion_error(6, &close_raw))?;
                let reason_raw: String = row.get(10)?;
                let reason =
                    parse_reason(&reason_raw).ok_or_else(|| conversion_error(10, &reason_raw))?;
                Ok(Trade {
                    symbol: row.get(0)?,
                    strategy: row.get(1)?,
                    side,
                    quantity: row.get(3)?,
                    open_time,
                    close_time,
                    open_price: row.get(5)?,
                    close_price: row.get(7)?,
                    fee: row.get(8)?,
                    pnl: row.get(9)?,
                    reason,
                })
            })
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }
}

impl TradeStorePort for SqliteAdapter {
    fn record_trade(&self, trade: &Trade) -> Result<(), TraderError> {
        let conn = self.pool.get().map_err(pool_error)?;
        conn.execute(
            "INSERT INTO trades (symbol, strategy, side, quantity, open_time, open_price,
                                 close_time, close_price, fees, pnl, reason, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL)",
            params![
                trade.symbol,
                trade.strategy,
                trade.side.as_str(),
                trade.quantity,
                format_time(trade.open_time),
                trade.open_price,
                format_time(trade.close_time),
                trade.close_price,
                trade.fee,
                trade.pnl,
                trade.reason.as_str(),
            ],
        )
        .map_err(query_error)?;
        Ok(())
    }
}

impl BarStorePort for SqliteAdapter {
    fn store_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize, TraderError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;

        let mut written = 0;
        for bar in bars {
            written += tx
                .execute(
                    "INSERT OR REPLACE INTO ohlcv (symbol, timestamp, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        symbol,
                        bar.timestamp.timestamp_millis(),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume
                    ],
                )
                .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(written)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError> {
        let conn = self.pool.get().map_err(pool_error)?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, open, high, low, close, volume
                 FROM ohlcv WHERE symbol = ?1 ORDER BY timestamp ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![symbol], |row| {
                let ms: i64 = row.get(0)?;
                let timestamp = DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
                    rusqlite::Error::IntegralValueOutOfRange(0, ms)
                })?;
                Ok(Bar {
                    timestamp,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(query_error)?;

        let bars = rows.collect::<Result<Vec<_>, _>>().map_err(query_error)?;
        if bars.is_empty() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}
