// Expense Tracker - Core Library
// Exposes the store, analysis, charts and HTTP API for the server binary and tests

pub mod analysis;
pub mod api;
pub mod charts;
pub mod config;
pub mod db;

// Re-export commonly used types
pub use analysis::{
    AggregationWindow, Clock, FixedClock, LocalClock,
    format_date, peak_spend_day,
};
pub use api::{router, ApiError, AppState, ExpensePayload};
pub use charts::{ChartRenderer, SvgChartRenderer};
pub use config::ServerConfig;
pub use db::{
    CategoryTotal, DailyTotal, Expense, NewExpense, Store,
    setup_database, insert_expense, total_for_date,
    daily_totals_between, category_totals_for_date, count_expenses,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
