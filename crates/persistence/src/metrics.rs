//! Query timing for the PostgreSQL store.

use metrics::{counter, histogram};
use std::time::Instant;

/// Record how long a named query took and whether it failed.
pub fn record_query(query_name: &'static str, duration_secs: f64, ok: bool) {
    histogram!("store_query_duration_seconds", "query" => query_name).record(duration_secs);
    if !ok {
        counter!("store_query_errors_total", "query" => query_name).increment(1);
    }
}

/// Times one repository call.
///
/// ```ignore
/// let timer = QueryTimer::new("find_job_by_random_id");
/// let result = sqlx::query_as::<_, JobEntity>(...).fetch_optional(&pool).await;
/// timer.finish(result)
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    /// Records the elapsed time and passes the result through.
    pub fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        record_query(
            self.query_name,
            self.start.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }
}
