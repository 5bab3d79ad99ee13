//! SQLite storage for ledger snapshots.
//!
//! Uses WAL mode and prepared statements for batch inserts. Events are kept
//! as JSON payload rows keyed by their ledger position, so the event schema
//! can grow without migrations and ledger order survives the round trip.

use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::cell::RefCell;

use crate::ledger::EventLedger;
use crate::types::{Account, Business, Event};

pub struct Store {
    conn: RefCell<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: RefCell::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.borrow_mut().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS businesses (
                owner TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                reward_router TEXT NOT NULL,
                redeem_router TEXT NOT NULL,
                brand TEXT NOT NULL,
                token_name TEXT NOT NULL,
                token_price REAL
            );

            CREATE TABLE IF NOT EXISTS users (
                address TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Appends a ledger snapshot in one transaction.
    ///
    /// Businesses and users already present are left untouched; events are
    /// appended after the highest stored position. Returns the number of
    /// events written.
    ///
    /// # Errors
    /// Returns error if serialization or any insert fails.
    pub fn import(&self, ledger: &EventLedger) -> Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO businesses (
                    owner, token, reward_router, redeem_router, brand, token_name, token_price
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for b in ledger.businesses() {
                stmt.execute(rusqlite::params![
                    b.owner,
                    b.token,
                    b.reward_router,
                    b.redeem_router,
                    b.brand,
                    b.token_name,
                    b.token_price,
                ])?;
            }

            let mut stmt = tx.prepare("INSERT OR IGNORE INTO users (address) VALUES (?)")?;
            for u in ledger.users() {
                stmt.execute(rusqlite::params![u.address])?;
            }

            let next_seq: i64 = tx.query_row("SELECT COALESCE(MAX(seq) + 1, 0) FROM events", [], |row| {
                row.get(0)
            })?;

            let mut stmt = tx.prepare("INSERT INTO events (seq, kind, payload) VALUES (?, ?, ?)")?;
            for (offset, event) in ledger.events().iter().enumerate() {
                let kind = event
                    .kind()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let payload = serde_json::to_string(event).wrap_err("failed to encode event")?;
                stmt.execute(rusqlite::params![next_seq + offset as i64, kind, payload])?;
            }
        }

        let count = ledger.events().len();
        tx.commit()?;
        tracing::info!(events = count, "ledger imported into SQLite");
        Ok(count)
    }

    /// Reads the full ledger back in ledger order.
    ///
    /// # Errors
    /// Returns error on query failure or if an event payload is corrupt.
    pub fn load_ledger(&self) -> Result<EventLedger> {
        let conn = self.conn.borrow();

        let mut stmt = conn.prepare(
            "
            SELECT owner, token, reward_router, redeem_router, brand, token_name, token_price
            FROM businesses ORDER BY rowid
            ",
        )?;
        let businesses = stmt
            .query_map([], |row| {
                Ok(Business {
                    owner: row.get(0)?,
                    token: row.get(1)?,
                    reward_router: row.get(2)?,
                    redeem_router: row.get(3)?,
                    brand: row.get(4)?,
                    token_name: row.get(5)?,
                    token_price: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT address FROM users ORDER BY rowid")?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0).map(Account::new))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT seq, payload FROM events ORDER BY seq")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let events = rows
            .into_iter()
            .map(|(seq, payload)| {
                serde_json::from_str::<Event>(&payload)
                    .wrap_err_with(|| format!("corrupt event payload at seq {seq}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EventLedger::new(businesses, users, events))
    }

    /// Number of stored events.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn event_count(&self) -> Result<u64> {
        let count: Option<i64> = self
            .conn
            .borrow()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }
}
