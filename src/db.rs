// Expense Store - SQLite persistence
// One table, one connection per operation, aggregation done by SQLite itself

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// DATA MODEL
// ============================================================================

/// A stored expense row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Assigned by SQLite on insert, never changes
    pub id: i64,
    pub date: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
}

/// An expense that has not been stored yet (no id)
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub date: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
}

/// Sum of amounts for one date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: String,
    pub total: f64,
}

/// Sum of amounts for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

// ============================================================================
// SCOPED CONNECTIONS
// ============================================================================

/// Handle on the database file.
///
/// Holds no open connection. Every call to [`Store::with_connection`] opens a
/// fresh one and drops it before returning, whether the closure succeeded or not.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the schema if it is missing
    pub fn init(&self) -> Result<()> {
        self.with_connection(setup_database)
    }

    /// Open a connection, run `f`, close the connection
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = open_connection(&self.path)?;
        let result = f(&conn);
        // Close explicitly so a failing close is reported instead of swallowed by Drop
        let closed = conn
            .close()
            .map_err(|(_, e)| e)
            .with_context(|| format!("Failed to close database {}", self.path.display()));

        let value = result?;
        closed?;
        Ok(value)
    }
}

/// Open a file-backed connection configured for concurrent request handling
pub fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL lets readers run while a writer holds the lock
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT,
            amount REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

/// Insert one expense, returning the id SQLite assigned to it
pub fn insert_expense(conn: &Connection, expense: &NewExpense) -> Result<i64> {
    conn.execute(
        "INSERT INTO expenses (date, category, description, amount)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            expense.date,
            expense.category,
            expense.description,
            expense.amount
        ],
    )
    .context("Failed to insert expense")?;

    Ok(conn.last_insert_rowid())
}

// ============================================================================
// READS
// ============================================================================

/// Sum of all amounts recorded on `date`. An empty day sums to 0.0.
pub fn total_for_date(conn: &Connection, date: &str) -> Result<f64> {
    let total: Option<f64> = conn.query_row(
        "SELECT SUM(amount) FROM expenses WHERE date = ?1",
        [date],
        |row| row.get(0),
    )?;

    Ok(total.unwrap_or(0.0))
}

/// Per-date totals for `start <= date <= end`, oldest first
pub fn daily_totals_between(conn: &Connection, start: &str, end: &str) -> Result<Vec<DailyTotal>> {
    let mut stmt = conn.prepare(
        "SELECT date, SUM(amount) AS total_spent
         FROM expenses
         WHERE date BETWEEN ?1 AND ?2
         GROUP BY date
         ORDER BY date ASC",
    )?;

    let totals = stmt
        .query_map([start, end], |row| {
            Ok(DailyTotal {
                date: row.get(0)?,
                total: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(totals)
}

/// Per-category totals for a single date, ordered by category name
pub fn category_totals_for_date(conn: &Connection, date: &str) -> Result<Vec<CategoryTotal>> {
    let mut stmt = conn.prepare(
        "SELECT category, SUM(amount) AS total_spent
         FROM expenses
         WHERE date = ?1
         GROUP BY category
         ORDER BY category ASC",
    )?;

    let totals = stmt
        .query_map([date], |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                total: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(totals)
}

pub fn get_expense(conn: &Connection, id: i64) -> Result<Option<Expense>> {
    let expense = conn
        .query_row(
            "SELECT id, date, category, description, amount FROM expenses WHERE id = ?1",
            [id],
            |row| {
                Ok(Expense {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    category: row.get(2)?,
                    description: row.get(3)?,
                    amount: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(expense)
}

pub fn count_expenses(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;

    Ok(count)
}
