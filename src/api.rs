// Expense Tracker - HTTP API
// Five endpoints on Axum, each one store round-trip per request

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analysis::{format_date, peak_spend_day, AggregationWindow, Clock};
use crate::charts::ChartRenderer;
use crate::db::{self, NewExpense, Store};

pub const MSG_EXPENSE_ADDED: &str = "Expense added successfully";
pub const MSG_NO_WEEK_EXPENSES: &str = "No expenses found for the past week";
pub const MSG_NO_TODAY_EXPENSES: &str = "No expenses found for today";

const PNG_CONTENT_TYPE: &str = "image/png";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub charts: Arc<dyn ChartRenderer>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: Store, charts: Arc<dyn ChartRenderer>, clock: Arc<dyn Clock>) -> Self {
        Self { store, charts, clock }
    }

    fn today(&self) -> String {
        format_date(self.clock.today())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Everything a handler can fail with, mapped onto a status code
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", missing_fields_message(.0))]
    MissingFields(Vec<&'static str>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn missing_fields_message(fields: &[&'static str]) -> String {
    match fields {
        [field] => format!("Missing required field: {}", field),
        _ => format!("Missing required fields: {}", fields.join(", ")),
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MissingFields(_) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(MessageResponse { message })).into_response()
    }
}

/// Run store access and rendering off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?
}

// ============================================================================
// Request / Response types
// ============================================================================

/// Body of POST /add_expense.
///
/// Every key is required. `description` may be `null` but must be present.
#[derive(Debug, Deserialize)]
pub struct ExpensePayload {
    pub date: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub description: Option<Option<String>>,
    pub amount: Option<f64>,
}

/// Distinguishes `"description": null` (Some(None)) from a missing key (None)
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ExpensePayload {
    pub fn into_new_expense(self) -> Result<NewExpense, ApiError> {
        let mut missing = Vec::new();
        if self.date.is_none() {
            missing.push("date");
        }
        if self.category.is_none() {
            missing.push("category");
        }
        if self.description.is_none() {
            missing.push("description");
        }
        if self.amount.is_none() {
            missing.push("amount");
        }

        match (self.date, self.category, self.description, self.amount) {
            (Some(date), Some(category), Some(description), Some(amount)) => Ok(NewExpense {
                date,
                category,
                description,
                amount,
            }),
            _ => Err(ApiError::MissingFields(missing)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalTodayResponse {
    pub total_today: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeekAnalysisResponse {
    pub highest_spent_day: String,
    pub total_spent: f64,
}

fn png_response(png: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, PNG_CONTENT_TYPE)], png).into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// POST /add_expense - Record one expense
async fn add_expense(
    State(state): State<AppState>,
    payload: Result<Json<ExpensePayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let expense = payload.into_new_expense()?;

    let store = state.store.clone();
    let id = blocking(move || Ok(store.with_connection(|conn| db::insert_expense(conn, &expense))?))
        .await?;

    tracing::info!(id, "Expense added");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: MSG_EXPENSE_ADDED.to_string(),
        }),
    ))
}

/// GET /get_total_today - Sum of today's expenses, 0.0 when there are none
async fn get_total_today(State(state): State<AppState>) -> Result<Json<TotalTodayResponse>, ApiError> {
    let today = state.today();

    let store = state.store.clone();
    let total_today = blocking(move || Ok(store.with_connection(|conn| db::total_for_date(conn, &today))?))
        .await?;

    Ok(Json(TotalTodayResponse { total_today }))
}

/// GET /get_week_analysis - Highest spending day in the trailing week
async fn get_week_analysis(
    State(state): State<AppState>,
) -> Result<Json<WeekAnalysisResponse>, ApiError> {
    let window = AggregationWindow::ending(state.clock.today());

    let store = state.store.clone();
    let totals = blocking(move || {
        Ok(store.with_connection(|conn| db::daily_totals_between(conn, &window.start, &window.end))?)
    })
    .await?;

    let peak = peak_spend_day(&totals).ok_or(ApiError::NotFound(MSG_NO_WEEK_EXPENSES))?;

    Ok(Json(WeekAnalysisResponse {
        highest_spent_day: peak.date.clone(),
        total_spent: peak.total,
    }))
}

/// GET /visualize_weekly_expenses - Bar chart of the trailing week
async fn visualize_weekly_expenses(State(state): State<AppState>) -> Result<Response, ApiError> {
    let window = AggregationWindow::ending(state.clock.today());

    let store = state.store.clone();
    let charts = Arc::clone(&state.charts);
    let png = blocking(move || {
        let totals =
            store.with_connection(|conn| db::daily_totals_between(conn, &window.start, &window.end))?;
        if totals.is_empty() {
            return Err(ApiError::NotFound(MSG_NO_WEEK_EXPENSES));
        }

        let (labels, values): (Vec<String>, Vec<f64>) =
            totals.into_iter().map(|day| (day.date, day.total)).unzip();
        Ok(charts.render_bar_chart(&labels, &values)?)
    })
    .await?;

    Ok(png_response(png))
}

/// GET /visualize_today_expenses_by_category - Pie chart of today's categories
async fn visualize_today_expenses_by_category(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let today = state.today();

    let store = state.store.clone();
    let charts = Arc::clone(&state.charts);
    let png = blocking(move || {
        let totals = store.with_connection(|conn| db::category_totals_for_date(conn, &today))?;
        if totals.is_empty() {
            return Err(ApiError::NotFound(MSG_NO_TODAY_EXPENSES));
        }

        let (labels, values): (Vec<String>, Vec<f64>) =
            totals.into_iter().map(|cat| (cat.category, cat.total)).unzip();
        Ok(charts.render_pie_chart(&labels, &values)?)
    })
    .await?;

    Ok(png_response(png))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/add_expense", post(add_expense))
        .route("/get_total_today", get(get_total_today))
        .route("/get_week_analysis", get(get_week_analysis))
        .route("/visualize_weekly_expenses", get(visualize_weekly_expenses))
        .route(
            "/visualize_today_expenses_by_category",
            get(visualize_today_expenses_by_category),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
