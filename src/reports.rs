use std::time::Duration;

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::ReportCache;
use crate::error::Result;
use crate::models::round_cents;

pub const AGGREGATES_KEY: &str = "aggregates";
pub const GRAND_TOTAL_KEY: &str = "grand_total";
pub const BY_PUBLISHER_KEY: &str = "by_publisher";

pub const REPORT_CACHE_KEYS: [&str; 3] = [AGGREGATES_KEY, GRAND_TOTAL_KEY, BY_PUBLISHER_KEY];

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Grouped sums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Category,
    CategoryPublisher,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherTotal {
    pub category: String,
    pub publisher: String,
    pub total: f64,
}

/// One row of a grouped sum; `publisher` is only set for `GroupBy::CategoryPublisher`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub category: String,
    pub publisher: Option<String>,
    pub total: f64,
}

pub fn sum_expenses_by(conn: &Connection, group: GroupBy) -> Result<Vec<GroupTotal>> {
    let sql = match group {
        GroupBy::Category => {
            "SELECT c.name, NULL, SUM(b.distribution_expenses) \
             FROM books b JOIN categories c ON b.category_id = c.id \
             GROUP BY c.name ORDER BY c.name"
        }
        GroupBy::CategoryPublisher => {
            "SELECT c.name, b.publisher, SUM(b.distribution_expenses) \
             FROM books b JOIN categories c ON b.category_id = c.id \
             GROUP BY c.name, b.publisher ORDER BY c.name, b.publisher"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(GroupTotal {
                category: row.get(0)?,
                publisher: row.get(1)?,
                total: round_cents(row.get(2)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn sum_expenses_total(conn: &Connection) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(distribution_expenses), 0.0) FROM books",
        [],
        |row| row.get(0),
    )?;
    Ok(round_cents(total))
}

pub fn get_category_totals(conn: &Connection) -> Result<Vec<CategoryTotal>> {
    Ok(sum_expenses_by(conn, GroupBy::Category)?
        .into_iter()
        .map(|g| CategoryTotal {
            category: g.category,
            total: g.total,
        })
        .collect())
}

pub fn get_publisher_totals(conn: &Connection) -> Result<Vec<PublisherTotal>> {
    Ok(sum_expenses_by(conn, GroupBy::CategoryPublisher)?
        .into_iter()
        .map(|g| PublisherTotal {
            category: g.category,
            publisher: g.publisher.unwrap_or_default(),
            total: g.total,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Expense report (cached)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseReport {
    pub by_category: Vec<CategoryTotal>,
    pub by_publisher: Vec<PublisherTotal>,
    pub grand_total: f64,
}

fn cached<T: DeserializeOwned>(cache: &dyn ReportCache, key: &str) -> Result<Option<T>> {
    let Some(value) = cache.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!(key, error = %e, "cached report has unexpected shape, recomputing");
            Ok(None)
        }
    }
}

/// Grouped results: an empty cached list counts as a miss and is recomputed.
fn cached_grouping<T, F>(cache: &dyn ReportCache, key: &str, ttl: Duration, compute: F) -> Result<Vec<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<Vec<T>>,
{
    if let Some(rows) = cached::<Vec<T>>(cache, key)? {
        if !rows.is_empty() {
            return Ok(rows);
        }
    }
    let rows = compute()?;
    cache.set(key, &serde_json::to_value(&rows)?, ttl)?;
    Ok(rows)
}

pub fn get_expense_report(conn: &Connection, cache: &dyn ReportCache, ttl: Duration) -> Result<ExpenseReport> {
    let by_category = cached_grouping(cache, AGGREGATES_KEY, ttl, || get_category_totals(conn))?;

    let grand_total = match cached::<f64>(cache, GRAND_TOTAL_KEY)? {
        Some(total) => total,
        None => {
            let total = sum_expenses_total(conn)?;
            cache.set(GRAND_TOTAL_KEY, &serde_json::to_value(total)?, ttl)?;
            total
        }
    };

    let by_publisher = cached_grouping(cache, BY_PUBLISHER_KEY, ttl, || get_publisher_totals(conn))?;

    Ok(ExpenseReport {
        by_category,
        by_publisher,
        grand_total,
    })
}

pub fn invalidate_report_cache(cache: &dyn ReportCache) -> Result<()> {
    cache.delete_many(&REPORT_CACHE_KEYS)
}

/// Drop cached reports after a committed change. A failure is only logged;
/// any stale entry still expires with its TTL.
pub fn discard_cached_reports(cache: &dyn ReportCache) {
    if let Err(e) = invalidate_report_cache(cache) {
        tracing::warn!(error = %e, "could not invalidate report cache");
    }
}
