//! Column filter construction.
//!
//! Filters are ephemeral: they are derived from a query target and the
//! dashboard time range on every request and sent in the data request body,
//! never persisted.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::query::{ColumnDataType, ColumnType, QueryColumn, ValidQuery};

/// A comparison applied server-side to one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperation {
    /// `==`
    Equals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEquals,
    /// `!=`
    NotEquals,
    /// Substring match.
    Contains,
    /// Negated substring match.
    NotContains,
}

/// A single column predicate in a data request.
///
/// A `value` of `None` serializes as JSON `null`, which the table service
/// interprets as the null cell value (used for null exclusion).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// The name of the column the predicate applies to.
    pub column: String,
    /// The comparison to perform.
    pub operation: FilterOperation,
    /// The right-hand side of the comparison.
    pub value: Option<String>,
}

/// Builds the time-range bounds for the table's timestamp index column.
///
/// Returns two filters (`>= from`, `<= to`) on the first column with
/// `TIMESTAMP` data type and `INDEX` role, or nothing when the query has no
/// such column. Values are formatted as ISO 8601 with millisecond precision.
pub fn time_filters(
    columns: &[QueryColumn],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<ColumnFilter> {
    let Some(index) = columns.iter().find(|c| {
        c.data_type == ColumnDataType::Timestamp && c.column_type == ColumnType::Index
    }) else {
        return vec![];
    };
    vec![
        ColumnFilter {
            column: index.name.clone(),
            operation: FilterOperation::GreaterThanEquals,
            value: Some(from.to_rfc3339_opts(SecondsFormat::Millis, true)),
        },
        ColumnFilter {
            column: index.name.clone(),
            operation: FilterOperation::LessThanEquals,
            value: Some(to.to_rfc3339_opts(SecondsFormat::Millis, true)),
        },
    ]
}

/// Builds null and NaN exclusion filters.
///
/// Nullable columns get a `!= null` filter; float columns additionally get
/// a `!= "NaN"` filter whether or not they are nullable, since a non-null
/// float cell can still hold NaN. Emission follows column order, with the
/// null filter before the NaN filter within a column.
pub fn null_filters(columns: &[QueryColumn]) -> Vec<ColumnFilter> {
    let mut filters = Vec::new();
    for column in columns {
        if column.column_type == ColumnType::Nullable {
            filters.push(ColumnFilter {
                column: column.name.clone(),
                operation: FilterOperation::NotEquals,
                value: None,
            });
        }
        if matches!(
            column.data_type,
            ColumnDataType::Float32 | ColumnDataType::Float64
        ) {
            filters.push(ColumnFilter {
                column: column.name.clone(),
                operation: FilterOperation::NotEquals,
                value: Some("NaN".to_string()),
            });
        }
    }
    filters
}

/// The complete filter list for a data request: time filters first, then
/// null filters, each contributed only when the target opts in.
pub fn request_filters(
    query: &ValidQuery<'_>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<ColumnFilter> {
    let mut filters = Vec::new();
    if query.apply_time_filters {
        filters.extend(time_filters(query.columns, from, to));
    }
    if query.filter_nulls {
        filters.extend(null_filters(query.columns));
    }
    filters
}
