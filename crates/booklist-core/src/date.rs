//! SQL expressions extracting year/month/day from free-text date columns.
//!
//! Dates are stored as text and are frequently partial (`2013`, `2013-5`) or
//! junk. Each expression matches the leading characters against GLOB patterns
//! for `YYYY`, `YYYY-M`, `YYYY-MM`, `YYYY-MM-D` and `YYYY-MM-DD` (and the
//! single-digit-month variants) and yields the part as an integer, or the
//! literal [`UNKNOWN`] when the text does not carry that part.

/// Bucket value for date parts that cannot be parsed.
pub const UNKNOWN: &str = "UNKNOWN";

const YEAR: &str = "[0-9][0-9][0-9][0-9]";
const D1: &str = "[0-9]";
const D2: &str = "[0-9][0-9]";

pub(crate) fn year_expr(column: &str) -> String {
    format!(
        "CASE WHEN {column} GLOB '{YEAR}*' THEN CAST(substr({column}, 1, 4) AS INTEGER) ELSE '{UNKNOWN}' END"
    )
}

pub(crate) fn month_expr(column: &str) -> String {
    format!(
        "CASE \
         WHEN {column} GLOB '{YEAR}-{D2}*' THEN CAST(substr({column}, 6, 2) AS INTEGER) \
         WHEN {column} GLOB '{YEAR}-{D1}*' THEN CAST(substr({column}, 6, 1) AS INTEGER) \
         ELSE '{UNKNOWN}' END"
    )
}

pub(crate) fn day_expr(column: &str) -> String {
    format!(
        "CASE \
         WHEN {column} GLOB '{YEAR}-{D2}-{D2}*' THEN CAST(substr({column}, 9, 2) AS INTEGER) \
         WHEN {column} GLOB '{YEAR}-{D2}-{D1}*' THEN CAST(substr({column}, 9, 1) AS INTEGER) \
         WHEN {column} GLOB '{YEAR}-{D1}-{D2}*' THEN CAST(substr({column}, 8, 2) AS INTEGER) \
         WHEN {column} GLOB '{YEAR}-{D1}-{D1}*' THEN CAST(substr({column}, 8, 1) AS INTEGER) \
         ELSE '{UNKNOWN}' END"
    )
}
