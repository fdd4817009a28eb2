//! Conversion of raw table rows into typed Grafana frames.
//!
//! The table service sends every cell as a string; this module parses each
//! selected column into its declared type and assembles the SDK
//! [`Frame`]. Row order and count are preserved, and a cell that does not
//! parse is an error naming the column and row, never a silent zero.

use chrono::{DateTime, Utc};
use grafana_plugin_sdk::{
    data::{Field, Frame},
    prelude::*,
};
use thiserror::Error;

use crate::{
    client::TableRows,
    query::{ColumnDataType, QueryColumn},
};

/// An error converting raw rows into a typed frame.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A selected column is missing from the response.
    #[error("column {column:?} missing from table data response")]
    MissingColumn {
        /// The name of the missing column.
        column: String,
    },
    /// A row is shorter than the response's column list.
    #[error("row {row} has {len} cells, expected {expected}")]
    RaggedRow {
        /// The index of the short row.
        row: usize,
        /// The number of cells present.
        len: usize,
        /// The number of cells expected.
        expected: usize,
    },
    /// A cell's text does not parse as the column's declared type.
    #[error("cannot parse {value:?} (column {column:?}, row {row}) as {expected}")]
    Cell {
        /// The column the cell belongs to.
        column: String,
        /// The row index of the cell.
        row: usize,
        /// The offending cell text.
        value: String,
        /// The type the cell was declared as.
        expected: &'static str,
    },
}

/// Convert a raw data response into a typed [`Frame`] named `name`.
///
/// One field is produced per query column, in query-column order, with
/// cells located by name in the response's column header.
pub fn to_frame(
    name: &str,
    columns: &[QueryColumn],
    rows: &TableRows,
) -> Result<Frame, ConvertError> {
    let mut frame = Frame::new(name);
    for column in columns {
        let index = rows
            .frame
            .columns
            .iter()
            .position(|c| c == &column.name)
            .ok_or_else(|| ConvertError::MissingColumn {
                column: column.name.clone(),
            })?;
        let expected = rows.frame.columns.len();
        let mut cells = Vec::with_capacity(rows.frame.data.len());
        for (row, data) in rows.frame.data.iter().enumerate() {
            let cell = data.get(index).ok_or(ConvertError::RaggedRow {
                row,
                len: data.len(),
                expected,
            })?;
            cells.push(cell.as_str());
        }
        frame.add_field(typed_field(column, &cells)?);
    }
    Ok(frame)
}

fn typed_field(column: &QueryColumn, cells: &[&str]) -> Result<Field, ConvertError> {
    let name = column.name.as_str();
    let field = match column.data_type {
        ColumnDataType::Bool => parse_cells::<bool>(column, cells, "BOOL")?.into_field(name),
        ColumnDataType::Int32 => parse_cells::<i32>(column, cells, "INT32")?.into_field(name),
        ColumnDataType::Int64 => parse_cells::<i64>(column, cells, "INT64")?.into_field(name),
        ColumnDataType::Float32 => {
            parse_cells::<f32>(column, cells, "FLOAT32")?.into_field(name)
        }
        ColumnDataType::Float64 => {
            parse_cells::<f64>(column, cells, "FLOAT64")?.into_field(name)
        }
        ColumnDataType::String => cells
            .iter()
            .map(|cell| cell.to_string())
            .collect::<Vec<_>>()
            .into_field(name),
        ColumnDataType::Timestamp => {
            let mut values = Vec::with_capacity(cells.len());
            for (row, cell) in cells.iter().enumerate() {
                let parsed = DateTime::parse_from_rfc3339(cell)
                    .map_err(|_| cell_error(column, row, cell, "TIMESTAMP"))?;
                values.push(parsed.with_timezone(&Utc));
            }
            values.into_field(name)
        }
    };
    Ok(field)
}

fn parse_cells<T: std::str::FromStr>(
    column: &QueryColumn,
    cells: &[&str],
    expected: &'static str,
) -> Result<Vec<T>, ConvertError> {
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.parse()
                .map_err(|_| cell_error(column, row, cell, expected))
        })
        .collect()
}

fn cell_error(column: &QueryColumn, row: usize, value: &str, expected: &'static str) -> ConvertError {
    ConvertError::Cell {
        column: column.name.clone(),
        row,
        value: value.to_string(),
        expected,
    }
}
