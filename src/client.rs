//! The HTTP client for the table-storage service.
//!
//! All requests go through the [`Transport`] seam so that tests can record
//! and answer calls without a network; the production transport is a thin
//! wrapper over [`reqwest::Client`].

use chrono::{DateTime, Utc};
use grafana_plugin_sdk::backend::async_trait;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    decimation::DecimationParams,
    filters::{request_filters, ColumnFilter},
    query::{Column, ValidQuery},
    variables::{ScopedVars, VariableResolver},
};

/// How many tables a name search returns at most.
const TABLE_SEARCH_LIMIT: u32 = 5;

/// An error from a table service call.
#[derive(Debug, Error)]
pub enum TableClientError {
    /// The service answered with a non-2xx status.
    #[error("{} - {status_text}", status.as_u16())]
    Http {
        /// The response status code.
        status: StatusCode,
        /// The response status text.
        status_text: String,
        /// The response body, if any.
        data: Value,
    },
    /// The request failed before an HTTP response arrived.
    #[error("request to table service failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The response body did not match the expected shape.
    #[error("malformed response from table service: {0}")]
    Body(#[from] serde_json::Error),
}

/// A decoded HTTP response.
#[derive(Debug)]
pub struct FetchResponse {
    /// The response status code.
    pub status: StatusCode,
    /// The response status text.
    pub status_text: String,
    /// The decoded JSON body; `Null` for empty bodies.
    pub data: Value,
}

/// The HTTP transport used by [`TableClient`].
///
/// Implementations resolve to a decoded response for 2xx statuses and to
/// [`TableClientError::Http`] otherwise.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Issue a request and decode the response body as JSON.
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<FetchResponse, TableClientError>;
}

/// The production [`Transport`], backed by a shared [`reqwest::Client`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<FetchResponse, TableClientError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let text = response.text().await?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            // Error bodies are not guaranteed to be JSON.
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        if !status.is_success() {
            return Err(TableClientError::Http {
                status,
                status_text,
                data,
            });
        }
        Ok(FetchResponse {
            status,
            status_text,
            data,
        })
    }
}

/// Metadata describing one remote table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    /// The table id.
    pub id: String,
    /// The table's display name.
    pub name: String,
    /// The workspace the table belongs to.
    pub workspace: String,
    /// The table's columns.
    pub columns: Vec<Column>,
}

/// The response to a table search.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadataList {
    /// The matching tables.
    pub tables: Vec<TableMetadata>,
    /// Token for fetching the next page; unused by this plugin.
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// The raw tabular payload of a data response. Every cell arrives as a
/// string regardless of the column's declared type.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawFrame {
    /// Column names, in the order cells appear within each row.
    pub columns: Vec<String>,
    /// Row-major cell values.
    pub data: Vec<Vec<String>>,
}

/// The response to a decimated data query.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRows {
    /// The rows, as strings.
    pub frame: RawFrame,
    /// Token for fetching the next page; unused by this plugin.
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// A decimated data response, tagged with the resolved table id it came from.
#[derive(Clone, Debug)]
pub struct DecimatedTableData {
    /// The table id after variable resolution.
    pub table_id: String,
    /// The raw rows.
    pub rows: TableRows,
}

#[derive(Debug, Serialize)]
struct TableSearchRequest {
    filter: String,
    take: u32,
}

#[derive(Debug, Serialize)]
struct TableDataRequest {
    columns: Vec<String>,
    filters: Vec<ColumnFilter>,
    decimation: DecimationParams,
}

/// A client for one datasource instance of the table-storage service.
///
/// Holds no connection state of its own: the transport is shared across
/// instances and requests.
#[derive(Debug)]
pub struct TableClient<'a> {
    transport: &'a dyn Transport,
    instance_url: &'a str,
    resolver: &'a dyn VariableResolver,
}

impl<'a> TableClient<'a> {
    /// Create a client for the service at `instance_url`.
    pub fn new(
        transport: &'a dyn Transport,
        instance_url: &'a str,
        resolver: &'a dyn VariableResolver,
    ) -> Self {
        Self {
            transport,
            instance_url,
            resolver,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/v1/{}", self.instance_url.trim_end_matches('/'), route)
    }

    /// Fetch the metadata for a table.
    ///
    /// The id is passed through variable resolution first; an id that
    /// resolves to the empty string means no table has been selected yet,
    /// and returns `None` without touching the network.
    pub async fn get_table_metadata(
        &self,
        id: &str,
        scope: Option<&ScopedVars>,
    ) -> Result<Option<TableMetadata>, TableClientError> {
        let resolved = self.resolver.resolve(id, scope);
        if resolved.is_empty() {
            return Ok(None);
        }
        let response = self
            .transport
            .fetch(Method::GET, &self.url(&format!("tables/{resolved}")), None)
            .await?;
        Ok(Some(serde_json::from_value(response.data)?))
    }

    /// Search tables by name, capped at [`TABLE_SEARCH_LIMIT`] results.
    ///
    /// The match is case-sensitive "contains" on the table name.
    pub async fn query_tables(
        &self,
        search_text: &str,
    ) -> Result<Vec<TableMetadata>, TableClientError> {
        let body = serde_json::to_value(TableSearchRequest {
            filter: format!("name.Contains(\"{search_text}\")"),
            take: TABLE_SEARCH_LIMIT,
        })?;
        let response = self
            .transport
            .fetch(Method::POST, &self.url("query-tables"), Some(&body))
            .await?;
        let list: TableMetadataList = serde_json::from_value(response.data)?;
        Ok(list.tables)
    }

    /// Query decimated data for a validated target.
    ///
    /// Resolves the target's table id with its scoped variables, then sends
    /// the selected column names, the combined filter list and the
    /// decimation parameters.
    pub async fn get_decimated_table_data(
        &self,
        query: &ValidQuery<'_>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max_points: Option<u32>,
    ) -> Result<DecimatedTableData, TableClientError> {
        let table_id = self
            .resolver
            .resolve(query.table_id, Some(query.scoped_vars));
        let body = serde_json::to_value(TableDataRequest {
            columns: query.columns.iter().map(|c| c.name.clone()).collect(),
            filters: request_filters(query, from, to),
            decimation: DecimationParams::new(
                query.columns,
                query.decimation_method,
                max_points,
            ),
        })?;
        debug!(table_id, "querying decimated table data");
        let response = self
            .transport
            .fetch(
                Method::POST,
                &self.url(&format!("tables/{table_id}/query-decimated-data")),
                Some(&body),
            )
            .await?;
        Ok(DecimatedTableData {
            table_id,
            rows: serde_json::from_value(response.data)?,
        })
    }

    /// Verify that the service is reachable. Any 2xx response counts.
    pub async fn test_connection(&self) -> Result<(), TableClientError> {
        self.transport
            .fetch(Method::GET, &self.url("tables?take=1"), None)
            .await?;
        Ok(())
    }
}

/// Convenience constructor for metadata values used across tests.
#[cfg(test)]
pub(crate) fn table_metadata(id: &str, name: &str) -> TableMetadata {
    TableMetadata {
        id: id.to_string(),
        name: name.to_string(),
        workspace: "ws".to_string(),
        columns: vec![],
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A [`Transport`] that records calls and answers them from a canned
    /// response.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        calls: Mutex<Vec<RecordedCall>>,
        response: Value,
        error: Option<(StatusCode, String)>,
    }

    #[derive(Clone, Debug)]
    pub(crate) struct RecordedCall {
        pub method: Method,
        pub url: String,
        pub body: Option<Value>,
    }

    impl MockTransport {
        pub fn respond_with(response: Value) -> Self {
            Self {
                response,
                ..Default::default()
            }
        }

        pub fn fail_with(status: StatusCode) -> Self {
            Self {
                error: Some((
                    status,
                    status.canonical_reason().unwrap_or_default().to_string(),
                )),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(
            &self,
            method: Method,
            url: &str,
            body: Option<&Value>,
        ) -> Result<FetchResponse, TableClientError> {
            self.calls.lock().unwrap().push(RecordedCall {
                method,
                url: url.to_string(),
                body: body.cloned(),
            });
            if let Some((status, status_text)) = &self.error {
                return Err(TableClientError::Http {
                    status: *status,
                    status_text: status_text.clone(),
                    data: Value::Null,
                });
            }
            Ok(FetchResponse {
                status: StatusCode::OK,
                status_text: "OK".to_string(),
                data: self.response.clone(),
            })
        }
    }
}
