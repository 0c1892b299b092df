//! Generic HTTP handlers shared by every registered resource
//!
//! Read path: authorize, query, serialize. Write path: authorize, parse,
//! fill, validate, save, serialize. Every failure is an [`ApiError`] and is
//! rendered by its `IntoResponse` impl.

use crate::core::auth::AuthContext;
use crate::core::context::RequestContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::parse_json_object;
use crate::core::resource::Resource;
use crate::core::store::Document;
use crate::resources::User;
use crate::server::host::ServerHost;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Levels of references expanded when rendering a record
pub const MAX_RENDER_DEPTH: usize = 2;

/// `GET {prefix}/{collection}`
pub async fn index<R: Resource>(
    State(host): State<Arc<ServerHost>>,
    auth: AuthContext,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    tracing::debug!(collection = R::collection_name(), "index");
    let ctx = host.context(auth).with_query(query);
    R::allow_index(&ctx).await?.check()?;

    let records = R::index_query(&ctx).await?;
    let mut rendered = Vec::with_capacity(records.len());
    for record in &records {
        rendered.push(render(&host, record, MAX_RENDER_DEPTH).await?);
    }
    Ok(Json(Value::Array(rendered)))
}

/// `GET {prefix}/{collection}/{id}`
pub async fn item<R: Resource>(
    State(host): State<Arc<ServerHost>>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    tracing::debug!(collection = R::collection_name(), id = %id, "item");
    let ctx = host.context(auth).with_id(id);
    let record = R::item_query(&ctx).await?.ok_or(ApiError::NotFound)?;
    record.allow_show(&ctx).await?.check()?;

    Ok(Json(render(&host, &record, MAX_RENDER_DEPTH).await?))
}

/// `POST {prefix}/{collection}`
pub async fn create<R: Resource>(
    State(host): State<Arc<ServerHost>>,
    auth: AuthContext,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    tracing::debug!(collection = R::collection_name(), "create");
    let ctx = host.context(auth);
    R::allow_create(&ctx).await?.check()?;

    let body = parse_json_object(&body)?;
    let rendered = save_element(&host, &ctx, R::default(), &body).await?;
    Ok((StatusCode::CREATED, Json(rendered)))
}

/// `PUT {prefix}/{collection}/{id}`
pub async fn update<R: Resource>(
    State(host): State<Arc<ServerHost>>,
    auth: AuthContext,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    tracing::debug!(collection = R::collection_name(), id = %id, "update");
    let ctx = host.context(auth).with_id(id);
    let record = R::item_query(&ctx).await?.ok_or(ApiError::NotFound)?;
    record.allow_update(&ctx).await?.check()?;

    let body = parse_json_object(&body)?;
    Ok(Json(save_element(&host, &ctx, record, &body).await?))
}

/// `DELETE {prefix}/{collection}/{id}`
pub async fn delete<R: Resource>(
    State(host): State<Arc<ServerHost>>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::debug!(collection = R::collection_name(), id = %id, "delete");
    let ctx = host.context(auth).with_id(id);
    let record = R::item_query(&ctx).await?.ok_or(ApiError::NotFound)?;
    record.allow_delete(&ctx).await?.check()?;

    record.delete(&ctx.services).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Shared tail of create and update
async fn save_element<R: Resource>(
    host: &ServerHost,
    ctx: &RequestContext,
    mut record: R,
    body: &Document,
) -> ApiResult<Value> {
    record.fill(body)?;
    record.fill_from_request(ctx, body).await?;
    record.validate_fields(&ctx.services).await?;
    record.save(&ctx.services).await?;
    render(host, &record, MAX_RENDER_DEPTH).await
}

/// Safe JSON of a record with its references expanded
///
/// Each reference field holding an id is replaced by the referenced record's
/// own safe JSON while `depth` allows it. Dangling ids and references to
/// unregistered collections are left as they are.
pub async fn render<R: Resource>(host: &ServerHost, record: &R, depth: usize) -> ApiResult<Value> {
    let mut rendered = record.to_safe_json()?;
    if depth == 0 {
        return Ok(rendered);
    }

    if let Value::Object(fields) = &mut rendered {
        for reference in R::references() {
            let Some(id) = fields.get(reference.field).and_then(Value::as_str) else {
                continue;
            };
            let Some(descriptor) = host.registry.get(reference.collection) else {
                continue;
            };
            if let Some(nested) = descriptor.render_by_id(host, id, depth - 1).await? {
                fields.insert(reference.field.to_string(), nested);
            }
        }
    }

    Ok(rendered)
}

/// `POST {prefix}/auth`
pub async fn authenticate(State(host): State<Arc<ServerHost>>, body: Bytes) -> ApiResult<Json<Value>> {
    let credentials = parse_json_object(&body).map_err(|_| ApiError::wrong_credentials())?;
    let (user, token) = User::authenticate(&host.services, &credentials).await?;

    Ok(Json(json!({
        "user": user.to_profile_json()?,
        "token": token,
    })))
}

/// `GET {prefix}/me`
pub async fn me(State(host): State<Arc<ServerHost>>, auth: AuthContext) -> ApiResult<Json<Value>> {
    match auth.identity(&host.services).await? {
        Some(user) => Ok(Json(user.to_profile_json()?)),
        None => Ok(Json(Value::Null)),
    }
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
