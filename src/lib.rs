/*! A Grafana backend datasource plugin for dataframe table storage.

The plugin queries tabular data from a remote table-storage HTTP API,
decimating it server-side to the dashboard's point budget, and converts the
raw row/column responses into typed Grafana [`Frame`][grafana_plugin_sdk::data::Frame]s.

It is organised around one core pipeline:

1. [`query`] validates and normalizes query targets; incomplete targets
   (the normal editing state) are skipped, never errors.
2. [`client`] talks to the table service: metadata lookup, name search,
   and the decimated-data query, with `${var}` references in table ids
   resolved through [`variables`] first.
3. [`filters`] and [`decimation`] assemble the column predicates and
   decimation parameters embedded in each data request.
4. [`convert`] parses the all-strings wire rows into typed fields.

[`plugin`] wires the pipeline into the SDK's data, diagnostics and
resource services; [`search`] debounces the query editor's table
typeahead.
*/
#![deny(missing_docs)]

pub mod client;
pub mod convert;
pub mod decimation;
pub mod filters;
pub mod plugin;
pub mod query;
pub mod search;
pub mod variables;

pub use plugin::DataFramePlugin;
