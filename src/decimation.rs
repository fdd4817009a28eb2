//! Decimation parameters for data requests.
//!
//! Every data request carries decimation parameters; only the method and the
//! set of decimated columns vary. The table service decimates the numeric
//! (`y`) columns down to the requested number of intervals.

use serde::{Deserialize, Serialize};

use crate::query::QueryColumn;

/// Interval count used when the dashboard supplies no point-count hint.
pub const DEFAULT_INTERVALS: u32 = 1000;

/// The decimation algorithm applied by the table service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecimationMethod {
    /// Completes faster but is less accurate.
    #[default]
    Lossy,
    /// Preserves spikes and dips.
    MaxMin,
    /// Maintains edges of data (includes max/min).
    EntryExit,
}

/// The `decimation` section of a data request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecimationParams {
    /// Number of output intervals.
    pub intervals: u32,
    /// The algorithm to apply.
    pub method: DecimationMethod,
    /// Names of the columns to decimate: the numeric columns of the query,
    /// in their original order.
    pub y_columns: Vec<String>,
}

impl DecimationParams {
    /// Assemble decimation parameters for a query's columns.
    ///
    /// `max_points` is the dashboard's point-count hint;
    /// [`DEFAULT_INTERVALS`] is used when it is absent. `method` falls back
    /// to [`DecimationMethod::Lossy`].
    pub fn new(
        columns: &[QueryColumn],
        method: Option<DecimationMethod>,
        max_points: Option<u32>,
    ) -> Self {
        Self {
            intervals: max_points.unwrap_or(DEFAULT_INTERVALS),
            method: method.unwrap_or_default(),
            y_columns: columns
                .iter()
                .filter(|c| c.data_type.is_numeric())
                .map(|c| c.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::{ColumnDataType, ColumnType};

    fn column(name: &str, data_type: ColumnDataType) -> QueryColumn {
        QueryColumn {
            name: name.to_string(),
            data_type,
            column_type: ColumnType::Normal,
        }
    }

    #[test]
    fn non_numeric_columns_are_excluded() {
        let columns = [
            column("int", ColumnDataType::Int32),
            column("string", ColumnDataType::String),
            column("float", ColumnDataType::Float32),
        ];
        let params = DecimationParams::new(&columns, Some(DecimationMethod::EntryExit), Some(300));
        assert_eq!(params.intervals, 300);
        assert_eq!(params.method, DecimationMethod::EntryExit);
        assert_eq!(params.y_columns, vec!["int", "float"]);
    }

    #[test]
    fn defaults_apply_when_unspecified() {
        let columns = [column("bool", ColumnDataType::Bool)];
        let params = DecimationParams::new(&columns, None, None);
        assert_eq!(params.intervals, DEFAULT_INTERVALS);
        assert_eq!(params.method, DecimationMethod::Lossy);
        // No numeric columns: parameters are still sent, just with no
        // decimation targets.
        assert!(params.y_columns.is_empty());
    }

    #[test]
    fn serializes_to_wire_shape() {
        let columns = [column("time", ColumnDataType::Timestamp)];
        let params = DecimationParams::new(&columns, Some(DecimationMethod::MaxMin), Some(500));
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            serde_json::json!({
                "intervals": 500,
                "method": "MAX_MIN",
                "yColumns": ["time"],
            })
        );
    }
}
