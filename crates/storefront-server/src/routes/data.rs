use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use storefront_core::catalog::{partition_string, Table};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDataQuery {
    pub table_name: String,
    pub key: Option<String>,
}

/// GET /api/get-data?tableName=..&key=.. — whole table, or one row (`null`
/// when absent) when `key` is given.
pub async fn get_data(
    State(app): State<AppState>,
    Query(q): Query<GetDataQuery>,
) -> Result<Json<Value>, AppError> {
    let table: Table = q.table_name.parse()?;
    let value = match q.key {
        Some(key) => app
            .catalog
            .get_item(table, &key)
            .await?
            .unwrap_or(Value::Null),
        None => Value::Array(app.catalog.load(table).await?),
    };
    Ok(Json(value))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDataBody {
    pub table_name: String,
    pub item: Value,
}

/// POST /api/save-data — upsert one row, then schedule a publish.
pub async fn save_data(
    State(app): State<AppState>,
    Json(body): Json<SaveDataBody>,
) -> Result<Json<Value>, AppError> {
    let table: Table = body.table_name.parse()?;
    if !body.item.is_object() {
        return Err(AppError::bad_request("item must be a JSON object"));
    }
    app.catalog.save_item(table, body.item).await?;
    tracing::info!(table = %table, "catalog row saved");

    app.scheduler.notify_content_changed().await;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDataBody {
    pub table_name: String,
    #[serde(default)]
    pub key: Value,
}

/// POST /api/delete-data — remove rows by partition value, then schedule a
/// publish.
pub async fn delete_data(
    State(app): State<AppState>,
    Json(body): Json<DeleteDataBody>,
) -> Result<Json<Value>, AppError> {
    let table: Table = body.table_name.parse()?;
    if body.key.is_null() {
        return Err(AppError::bad_request("key is required"));
    }
    let key = partition_string(&body.key);
    let removed = app.catalog.delete_item(table, &key).await?;
    tracing::info!(table = %table, key = %key, removed, "catalog rows deleted");

    app.scheduler.notify_content_changed().await;
    Ok(Json(serde_json::json!({ "success": true })))
}
