// Spending Analysis - date windows and peak-day selection
// Pure post-processing of the rows the store returns

use chrono::{Duration, Local, NaiveDate};

use crate::db::DailyTotal;

/// Date format used for the `date` column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Days before today included in the weekly window
pub const WINDOW_DAYS: i64 = 7;

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "today". Handlers never read the system clock directly.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Server-local calendar date, read on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always returns the same date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ============================================================================
// AGGREGATION WINDOW
// ============================================================================

/// Inclusive `[start, end]` span in stored date format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationWindow {
    pub start: String,
    pub end: String,
}

impl AggregationWindow {
    /// The trailing week: `today - 7 days` through `today`
    pub fn ending(today: NaiveDate) -> Self {
        let start = today - Duration::days(WINDOW_DAYS);
        Self {
            start: format_date(start),
            end: format_date(today),
        }
    }
}

// ============================================================================
// PEAK DAY
// ============================================================================

/// Day with the largest total.
///
/// Ties go to the earliest date, whatever order `totals` arrive in.
/// Returns `None` for an empty slice.
pub fn peak_spend_day(totals: &[DailyTotal]) -> Option<&DailyTotal> {
    let mut best: Option<&DailyTotal> = None;

    for day in totals {
        let replace = match best {
            None => true,
            Some(current) => {
                day.total > current.total
                    || (day.total == current.total && day.date < current.date)
            }
        };
        if replace {
            best = Some(day);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(date: &str, total: f64) -> DailyTotal {
        DailyTotal {
            date: date.to_string(),
            total,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_window_spans_eight_calendar_days() {
        let window = AggregationWindow::ending(date("2024-01-08"));

        assert_eq!(window.start, "2024-01-01");
        assert_eq!(window.end, "2024-01-08");
    }

    #[test]
    fn test_window_crosses_year_boundary() {
        let window = AggregationWindow::ending(date("2024-01-03"));

        assert_eq!(window.start, "2023-12-27");
        assert_eq!(window.end, "2024-01-03");
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(date("2024-02-29"));
        assert_eq!(format_date(clock.today()), "2024-02-29");
    }

    #[test]
    fn test_peak_day_picks_maximum() {
        let totals = vec![day("2024-01-01", 10.0), day("2024-01-02", 25.0), day("2024-01-03", 7.5)];

        let peak = peak_spend_day(&totals).unwrap();

        assert_eq!(peak.date, "2024-01-02");
        assert_eq!(peak.total, 25.0);
    }

    #[test]
    fn test_peak_day_tie_goes_to_earliest_date() {
        let totals = vec![day("2024-01-01", 5.0), day("2024-01-02", 30.0), day("2024-01-05", 30.0)];
        assert_eq!(peak_spend_day(&totals).unwrap().date, "2024-01-02");

        // Input order does not change the outcome
        let reversed: Vec<DailyTotal> = totals.iter().rev().cloned().collect();
        assert_eq!(peak_spend_day(&reversed).unwrap().date, "2024-01-02");
    }

    #[test]
    fn test_peak_day_with_negative_totals() {
        let totals = vec![day("2024-01-01", -4.0), day("2024-01-02", -1.0)];
        assert_eq!(peak_spend_day(&totals).unwrap().date, "2024-01-02");
    }

    #[test]
    fn test_peak_day_empty() {
        assert!(peak_spend_day(&[]).is_none());
    }
}
