//! The backend plugin: data, diagnostics and resource services.

use std::{convert::Infallible, sync::Arc};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::FuturesOrdered;
use grafana_plugin_sdk::{backend, data::Frame, prelude::GrafanaPlugin};
use http::{header, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    client::{ReqwestTransport, TableClient, TableClientError, Transport},
    convert::{to_frame, ConvertError},
    query::DataFrameQuery,
    search::DebouncerRegistry,
    variables::TemplateResolver,
};

/// The dataframe datasource plugin.
///
/// One instance serves every configured datasource; per-instance state
/// (the service URL) arrives with each request's plugin context.
#[derive(Clone, Debug, GrafanaPlugin)]
#[grafana_plugin(plugin_type = "datasource")]
pub struct DataFramePlugin {
    transport: Arc<dyn Transport>,
    resolver: TemplateResolver,
    search: Arc<DebouncerRegistry>,
}

impl DataFramePlugin {
    /// Create the plugin with the production HTTP transport.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            resolver: TemplateResolver,
            search: Arc::new(DebouncerRegistry::default()),
        }
    }
}

impl Default for DataFramePlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// What went wrong executing one query target.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The request carried no datasource instance settings.
    #[error("datasource instance settings missing")]
    MissingInstanceSettings,
    /// The target was scheduled without a table id or columns.
    #[error("query target has no table id or columns")]
    NotExecutable,
    /// The table service call failed.
    #[error(transparent)]
    Table(#[from] TableClientError),
    /// The response rows could not be converted to typed fields.
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// The converted frame failed the SDK's consistency check.
    #[error("invalid frame: {0}")]
    Frame(#[from] grafana_plugin_sdk::data::Error),
}

/// A [`TargetError`] tagged with the query it belongs to, so Grafana can
/// attach it to the right panel query while sibling targets still render.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct QueryError {
    ref_id: String,
    source: TargetError,
}

impl backend::DataQueryError for QueryError {
    fn ref_id(self) -> String {
        self.ref_id
    }

    fn status(&self) -> backend::DataQueryStatus {
        match &self.source {
            TargetError::Table(TableClientError::Http { status, .. }) => {
                backend::DataQueryStatus::Custom(*status)
            }
            TargetError::Table(_) => backend::DataQueryStatus::BadGateway,
            TargetError::NotExecutable => backend::DataQueryStatus::ValidationFailed,
            _ => backend::DataQueryStatus::Internal,
        }
    }
}

/// Execute one valid query target: fetch decimated rows and convert them
/// into a typed frame named after the resolved table id.
pub(crate) async fn run_target(
    transport: &dyn Transport,
    instance_url: Option<&str>,
    query: &DataFrameQuery,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    max_data_points: i64,
) -> Result<Frame, TargetError> {
    let instance_url = instance_url.ok_or(TargetError::MissingInstanceSettings)?;
    let Some(valid) = query.validate() else {
        // Callers filter invalid targets before scheduling.
        return Err(TargetError::NotExecutable);
    };
    let client = TableClient::new(transport, instance_url, &TemplateResolver);
    let max_points = u32::try_from(max_data_points).ok().filter(|n| *n > 0);
    let data = client
        .get_decimated_table_data(&valid, from, to, max_points)
        .await?;
    Ok(to_frame(&data.table_id, valid.columns, &data.rows)?)
}

#[backend::async_trait]
impl backend::DataService for DataFramePlugin {
    type Query = DataFrameQuery;
    type QueryError = QueryError;
    type Stream = backend::BoxDataResponseStream<Self::QueryError>;

    /// Execute every valid target concurrently; responses line up with
    /// their targets by position and `ref_id` regardless of completion
    /// order. Incomplete targets (the normal editing state) are skipped
    /// without an error.
    async fn query_data(
        &self,
        request: backend::QueryDataRequest<Self::Query, Self>,
    ) -> Self::Stream {
        let instance_url = request
            .plugin_context
            .instance_settings
            .map(|settings| settings.url);
        let transport = Arc::clone(&self.transport);
        Box::pin(
            request
                .queries
                .into_iter()
                .filter_map(move |query| {
                    if !query.query.is_valid() {
                        debug!(ref_id = %query.ref_id, "skipping incomplete query target");
                        return None;
                    }
                    let instance_url = instance_url.clone();
                    let transport = Arc::clone(&transport);
                    Some(async move {
                        run_target(
                            transport.as_ref(),
                            instance_url.as_deref(),
                            &query.query,
                            query.time_range.from,
                            query.time_range.to,
                            query.max_data_points,
                        )
                        .await
                        .and_then(|frame| {
                            let checked = frame.check()?;
                            Ok(backend::DataResponse::new(
                                query.ref_id.clone(),
                                vec![checked],
                            ))
                        })
                        .map_err(|source| QueryError {
                            ref_id: query.ref_id,
                            source,
                        })
                    })
                })
                .collect::<FuturesOrdered<_>>(),
        )
    }
}

#[backend::async_trait]
impl backend::DiagnosticsService for DataFramePlugin {
    type CheckHealthError = Infallible;

    /// Grafana's "Save & Test": one request against the table service.
    async fn check_health(
        &self,
        request: backend::CheckHealthRequest<Self>,
    ) -> Result<backend::CheckHealthResponse, Self::CheckHealthError> {
        let Some(settings) = request.plugin_context.instance_settings else {
            return Ok(backend::CheckHealthResponse::error(
                "datasource instance settings missing".to_string(),
            ));
        };
        let client = TableClient::new(self.transport.as_ref(), &settings.url, &self.resolver);
        Ok(match client.test_connection().await {
            Ok(()) => backend::CheckHealthResponse::ok(
                "Data source connected and authentication successful!".to_string(),
            ),
            Err(e) => backend::CheckHealthResponse::error(format!("Connection test failed: {e}")),
        })
    }

    type CollectMetricsError = Infallible;

    async fn collect_metrics(
        &self,
        _request: backend::CollectMetricsRequest<Self>,
    ) -> Result<backend::CollectMetricsResponse, Self::CollectMetricsError> {
        Ok(backend::CollectMetricsResponse::new(None))
    }
}

/// An error answering a query-editor resource request.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The request carried no datasource instance settings.
    #[error("datasource instance settings missing")]
    MissingInstanceSettings,
    /// The table service call failed.
    #[error(transparent)]
    Table(#[from] TableClientError),
    /// The response body could not be serialized.
    #[error("serializing response: {0}")]
    Body(#[from] serde_json::Error),
    /// The HTTP response could not be built.
    #[error("building response: {0}")]
    Http(#[from] http::Error),
    /// The requested path does not exist.
    #[error("no such resource")]
    NotFound,
}

impl backend::ErrIntoHttpResponse for ResourceError {
    fn into_http_response(self) -> Result<Response<Bytes>, Box<dyn std::error::Error>> {
        let status = match &self {
            Self::Table(TableClientError::Http { status, .. }) => *status,
            Self::Table(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Ok(Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(serde_json::to_vec(
                &serde_json::json!({"error": self.to_string()}),
            )?))?)
    }
}

fn json_response<T: Serialize>(value: &T) -> Result<Response<Bytes>, ResourceError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Bytes::from(serde_json::to_vec(value)?))?)
}

/// The `query` parameter of a search request's query string.
fn search_text(uri: &http::Uri) -> String {
    uri.query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "query")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

#[backend::async_trait]
impl backend::ResourceService for DataFramePlugin {
    type Error = ResourceError;
    type InitialResponse = Response<Bytes>;
    type Stream = backend::BoxResourceStream<Self::Error>;

    /// The query editor's HTTP surface: table metadata lookup and
    /// debounced table search.
    async fn call_resource(
        &self,
        r: backend::CallResourceRequest<Self>,
    ) -> Result<(Self::InitialResponse, Self::Stream), Self::Error> {
        let settings = r
            .plugin_context
            .instance_settings
            .ok_or(ResourceError::MissingInstanceSettings)?;
        let client = TableClient::new(self.transport.as_ref(), &settings.url, &self.resolver);

        let path = r.request.uri().path();
        let response = if let Some(id) = path.strip_prefix("/tables/") {
            // `None` here means the id resolved to empty: nothing selected
            // yet, serialized as JSON `null` for the editor.
            json_response(&client.get_table_metadata(id, None).await?)?
        } else if path == "/query-tables" {
            let search = self.search.get(&settings.uid);
            match search.debounce(&search_text(r.request.uri())).await {
                Some(text) => json_response(&client.query_tables(&text).await?)?,
                // Superseded by a newer keystroke; no request was made.
                None => json_response(&serde_json::Value::Null)?,
            }
        } else {
            return Err(ResourceError::NotFound);
        };

        Ok((
            response,
            Box::pin(futures_util::stream::empty()) as Self::Stream,
        ))
    }
}
