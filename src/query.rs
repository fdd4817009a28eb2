//! Query target types sent from the frontend query editor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{decimation::DecimationMethod, variables::ScopedVars};

/// The data type of a column in a remote table.
///
/// Cell values always arrive as strings on the wire; this declared type
/// drives both decimation eligibility and the output field type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnDataType {
    /// Boolean values, serialized as `"true"` / `"false"`.
    Bool,
    /// 32 bit signed integers.
    Int32,
    /// 64 bit signed integers.
    Int64,
    /// 32 bit floats.
    Float32,
    /// 64 bit floats.
    Float64,
    /// Arbitrary strings.
    String,
    /// Timestamps, serialized as ISO 8601 with fractional seconds.
    Timestamp,
}

impl ColumnDataType {
    /// Whether columns of this type are eligible as decimation targets.
    ///
    /// Timestamps count as numeric; strings and booleans do not.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Float32 | Self::Float64 | Self::Timestamp
        )
    }
}

/// The role of a column within its table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    /// The table's index column.
    Index,
    /// A column whose cells may be null.
    Nullable,
    /// A plain column.
    Normal,
}

/// A column of a remote table, as described by the table metadata service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// The column name.
    pub name: String,
    /// The declared type of the column's cells.
    pub data_type: ColumnDataType,
    /// The column's role within the table.
    pub column_type: ColumnType,
    /// Free-form properties attached by the table's owner.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// The subset of [`Column`] stored on a query target.
///
/// The query editor creates these when the user selects columns from the
/// table metadata; everything a query needs to build filters, decimation
/// parameters and output fields is here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryColumn {
    /// The column name.
    pub name: String,
    /// The declared type of the column's cells.
    pub data_type: ColumnDataType,
    /// The column's role within the table.
    pub column_type: ColumnType,
}

/// One query target, i.e. the JSON the query editor stores per panel query.
///
/// `ref_id`, the time range and the max data points hint ride on the SDK's
/// [`DataQuery`][grafana_plugin_sdk::backend::DataQuery] envelope rather
/// than here.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFrameQuery {
    /// The id of the table to query. May contain `${var}` references.
    #[serde(default)]
    pub table_id: Option<String>,
    /// The columns selected for the query.
    #[serde(default)]
    pub columns: Option<Vec<QueryColumn>>,
    /// The decimation method to request; `LOSSY` when unset.
    #[serde(default)]
    pub decimation_method: Option<DecimationMethod>,
    /// Exclude null (and, for floats, NaN) values server-side.
    #[serde(default)]
    pub filter_nulls: bool,
    /// Bound the query by the dashboard time range.
    #[serde(default)]
    pub apply_time_filters: bool,
    /// Scoped template variables for this target, used when resolving
    /// `${var}` references in the table id.
    #[serde(default)]
    pub scoped_vars: ScopedVars,
}

impl DataFrameQuery {
    /// Whether this target is well-formed enough to execute.
    ///
    /// Incomplete targets are the normal editing state (no table entered
    /// yet, or no columns selected) and are silently skipped, never errors.
    pub fn is_valid(&self) -> bool {
        self.validate().is_some()
    }

    /// Borrow this target as a [`ValidQuery`], or `None` if it is not
    /// executable yet.
    pub fn validate(&self) -> Option<ValidQuery<'_>> {
        let table_id = self.table_id.as_deref().filter(|id| !id.is_empty())?;
        let columns = self.columns.as_deref().filter(|cols| !cols.is_empty())?;
        Some(ValidQuery {
            table_id,
            columns,
            decimation_method: self.decimation_method,
            filter_nulls: self.filter_nulls,
            apply_time_filters: self.apply_time_filters,
            scoped_vars: &self.scoped_vars,
        })
    }
}

/// A validated view of a [`DataFrameQuery`]: the table id is known to be
/// non-empty and at least one column is selected.
#[derive(Clone, Copy, Debug)]
pub struct ValidQuery<'a> {
    /// The (unresolved) id of the table to query.
    pub table_id: &'a str,
    /// The selected columns; never empty.
    pub columns: &'a [QueryColumn],
    /// The decimation method to request.
    pub decimation_method: Option<DecimationMethod>,
    /// Exclude nulls/NaNs server-side.
    pub filter_nulls: bool,
    /// Bound the query by the dashboard time range.
    pub apply_time_filters: bool,
    /// Scoped template variables for this target.
    pub scoped_vars: &'a ScopedVars,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> QueryColumn {
        QueryColumn {
            name: name.to_string(),
            data_type: ColumnDataType::Float32,
            column_type: ColumnType::Normal,
        }
    }

    #[test]
    fn empty_target_is_invalid() {
        assert!(!DataFrameQuery::default().is_valid());
    }

    #[test]
    fn target_without_columns_is_invalid() {
        let query = DataFrameQuery {
            table_id: Some("table".to_string()),
            ..Default::default()
        };
        assert!(!query.is_valid());

        let query = DataFrameQuery {
            table_id: Some("table".to_string()),
            columns: Some(vec![]),
            ..Default::default()
        };
        assert!(!query.is_valid());
    }

    #[test]
    fn target_with_empty_table_id_is_invalid() {
        let query = DataFrameQuery {
            table_id: Some(String::new()),
            columns: Some(vec![column("float")]),
            ..Default::default()
        };
        assert!(!query.is_valid());
    }

    #[test]
    fn target_with_table_and_columns_is_valid() {
        let query = DataFrameQuery {
            table_id: Some("table".to_string()),
            columns: Some(vec![column("float")]),
            ..Default::default()
        };
        let valid = query.validate().unwrap();
        assert_eq!(valid.table_id, "table");
        assert_eq!(valid.columns.len(), 1);
    }

    #[test]
    fn deserializes_editor_json() {
        let query: DataFrameQuery = serde_json::from_value(serde_json::json!({
            "tableId": "t-1",
            "columns": [
                {"name": "time", "dataType": "TIMESTAMP", "columnType": "INDEX"},
                {"name": "value", "dataType": "FLOAT64", "columnType": "NULLABLE"}
            ],
            "decimationMethod": "MAX_MIN",
            "filterNulls": true,
            "applyTimeFilters": true
        }))
        .unwrap();
        assert!(query.is_valid());
        assert_eq!(
            query.decimation_method,
            Some(crate::decimation::DecimationMethod::MaxMin)
        );
        let cols = query.columns.as_deref().unwrap();
        assert_eq!(cols[0].data_type, ColumnDataType::Timestamp);
        assert_eq!(cols[1].column_type, ColumnType::Nullable);
    }

    #[test]
    fn numeric_data_types() {
        assert!(ColumnDataType::Int32.is_numeric());
        assert!(ColumnDataType::Int64.is_numeric());
        assert!(ColumnDataType::Float32.is_numeric());
        assert!(ColumnDataType::Float64.is_numeric());
        assert!(ColumnDataType::Timestamp.is_numeric());
        assert!(!ColumnDataType::String.is_numeric());
        assert!(!ColumnDataType::Bool.is_numeric());
    }
}
