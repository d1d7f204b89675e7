//! Line-delimited JSON front end.
//!
//! Each input line is one request `{"id", "method", "params"}`; each output line is
//! `{"id", "result"}` or `{"id", "error": {"kind", "message"}}`. Requests run
//! concurrently and responses are written as they complete, so hosts match them up
//! by `id`.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{RwLock, mpsc};

use crate::cache::CachePlugin;
use crate::context::ContextMap;
use crate::error::MysqlPluginError;
use crate::executor::Backend;
use crate::plugin::{DbPlugin, MysqlPlugin};
use crate::query_builder::ReadQuery;
use crate::results::Row;
use crate::where_clause::Filter;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: JsonValue,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    #[must_use]
    pub fn ok(id: JsonValue, result: JsonValue) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn err(id: JsonValue, error: &MysqlPluginError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct InitParams {
    uri: String,
}

#[derive(Deserialize)]
struct TableGetParams {
    table: String,
    #[serde(flatten)]
    read: ReadQuery,
    #[serde(default)]
    context: Option<ContextMap>,
}

#[derive(Deserialize)]
struct TableCreateParams {
    table: String,
    data: Vec<Row>,
    #[serde(default)]
    context: Option<ContextMap>,
}

#[derive(Deserialize)]
struct TableUpdateParams {
    table: String,
    data: Map<String, JsonValue>,
    #[serde(default, rename = "where")]
    filter: Filter,
    #[serde(default)]
    context: Option<ContextMap>,
}

#[derive(Deserialize)]
struct TableDeleteParams {
    table: String,
    #[serde(default, rename = "where")]
    filter: Filter,
    #[serde(default)]
    context: Option<ContextMap>,
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    data: Map<String, JsonValue>,
    #[serde(default)]
    context: Option<ContextMap>,
}

#[derive(Deserialize)]
struct SchemaParams {
    #[serde(default)]
    context: Option<ContextMap>,
}

#[derive(Deserialize)]
struct CacheSetParams {
    key: String,
    value: String,
    /// Seconds.
    ttl: u64,
}

#[derive(Deserialize)]
struct CacheGetParams {
    key: String,
}

fn parse_params<T: DeserializeOwned>(params: JsonValue) -> Result<T, MysqlPluginError> {
    // A missing params member means "no arguments".
    let params = if params.is_null() {
        JsonValue::Object(Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| MysqlPluginError::ValidationError(format!("invalid params: {e}")))
}

fn to_json<T: Serialize>(value: T) -> Result<JsonValue, MysqlPluginError> {
    serde_json::to_value(value)
        .map_err(|e| MysqlPluginError::ExecutionError(format!("failed to encode result: {e}")))
}

/// Execute one request against the plugin.
pub async fn handle_request<B: Backend>(
    plugin: &RwLock<MysqlPlugin<B>>,
    request: Request,
) -> Response {
    let id = request.id.clone();
    match dispatch(plugin, request).await {
        Ok(result) => Response::ok(id, result),
        Err(err) => {
            tracing::debug!(error = %err, "request failed");
            Response::err(id, &err)
        }
    }
}

async fn dispatch<B: Backend>(
    plugin: &RwLock<MysqlPlugin<B>>,
    request: Request,
) -> Result<JsonValue, MysqlPluginError> {
    match request.method.as_str() {
        "init_connection" => {
            let p: InitParams = parse_params(request.params)?;
            plugin.write().await.init_connection(&p.uri).await?;
            Ok(JsonValue::Null)
        }
        "reload_routines" => {
            plugin.write().await.reload_routines().await?;
            Ok(JsonValue::Null)
        }
        "table_get" => {
            let p: TableGetParams = parse_params(request.params)?;
            let rows = plugin
                .read()
                .await
                .table_get(&p.table, &p.read, p.context.as_ref())
                .await?;
            to_json(rows)
        }
        "table_create" => {
            let p: TableCreateParams = parse_params(request.params)?;
            let rows = plugin
                .read()
                .await
                .table_create(&p.table, p.data, p.context.as_ref())
                .await?;
            to_json(rows)
        }
        "table_update" => {
            let p: TableUpdateParams = parse_params(request.params)?;
            let affected = plugin
                .read()
                .await
                .table_update(&p.table, &p.data, &p.filter, p.context.as_ref())
                .await?;
            Ok(JsonValue::from(affected))
        }
        "table_delete" => {
            let p: TableDeleteParams = parse_params(request.params)?;
            let affected = plugin
                .read()
                .await
                .table_delete(&p.table, &p.filter, p.context.as_ref())
                .await?;
            Ok(JsonValue::from(affected))
        }
        "call_function" => {
            let p: CallParams = parse_params(request.params)?;
            plugin
                .read()
                .await
                .call_function(&p.name, &p.data, p.context.as_ref())
                .await
        }
        "get_schema" => {
            let p: SchemaParams = parse_params(request.params)?;
            plugin.read().await.get_schema(p.context.as_ref()).await
        }
        "cache_set" => {
            let p: CacheSetParams = parse_params(request.params)?;
            plugin
                .read()
                .await
                .set(&p.key, &p.value, Duration::from_secs(p.ttl))
                .await?;
            Ok(JsonValue::Null)
        }
        "cache_get" => {
            let p: CacheGetParams = parse_params(request.params)?;
            let value = plugin.read().await.get(&p.key).await?;
            Ok(JsonValue::String(value))
        }
        other => Err(MysqlPluginError::Unimplemented(format!("method {other}"))),
    }
}

/// Parse and execute one input line.
pub async fn handle_line<B: Backend>(plugin: &RwLock<MysqlPlugin<B>>, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle_request(plugin, request).await,
        Err(e) => Response::err(
            JsonValue::Null,
            &MysqlPluginError::ValidationError(format!("invalid request: {e}")),
        ),
    }
}

fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            r#"{{"id":null,"error":{{"kind":"execution","message":"failed to encode response: {e}"}}}}"#
        )
    })
}

/// Serve requests from `reader` until EOF, writing responses to `writer`, then
/// close the plugin.
///
/// # Errors
/// Returns an I/O error if reading input or writing output fails.
pub async fn serve<B, R, W>(plugin: MysqlPlugin<B>, reader: R, mut writer: W) -> std::io::Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let plugin = Arc::new(RwLock::new(plugin));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let plugin = Arc::clone(&plugin);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_line(&plugin, &line).await;
            if tx.send(encode(&response)).is_err() {
                tracing::warn!("response dropped: output closed");
            }
        });
    }
    drop(tx);

    // The writer ends once every in-flight request has sent its response.
    writer_task.await.map_err(std::io::Error::other)??;

    if let Err(e) = plugin.write().await.close().await {
        tracing::warn!(error = %e, "failed to close MySQL pool");
    }
    Ok(())
}
