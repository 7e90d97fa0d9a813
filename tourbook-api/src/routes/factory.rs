/// Generic CRUD handlers
///
/// Every resource exposes the same five operations. The handlers here are
/// generic over a [`Resource`], which ties an entity to its repository and
/// supplies the per-resource hooks: default list scope, related-entity
/// expansion, reference checks, dependent cleanup and post-write side
/// effects.
///
/// Routes instantiate them with the entity type:
///
/// ```ignore
/// Router::new()
///     .route("/", get(factory::get_all::<Tour>).post(factory::create_one::<Tour>))
///     .route("/:id", get(factory::get_one::<Tour>))
/// ```
///
/// Successful responses use the envelope
/// `{"status": "success", "data": {"data": ...}}`; lists add `results`.

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tourbook_shared::{
    query::{Filter, FilterValue, ListQuery},
    repository::{Entity, Repository},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extractors::{extract_validated_json, parse_id},
};

/// An entity served through the CRUD factory
#[async_trait]
pub trait Resource: Entity {
    /// Repository holding this entity
    fn repo(state: &AppState) -> Arc<dyn Repository<Self>>;

    /// Filters applied to every list and get-one request
    fn default_scope() -> Vec<Filter> {
        Vec::new()
    }

    /// Adds related entities to a get-one response
    async fn expand(_state: &AppState, _entity: &Self, document: Value) -> ApiResult<Value> {
        Ok(document)
    }

    /// Rejects inputs referring to missing records
    async fn check_create(_state: &AppState, _data: &Self::Create) -> ApiResult<()> {
        Ok(())
    }

    /// Rejects patches that are invalid against the stored entity
    async fn check_update(_state: &AppState, _current: &Self, _patch: &Self::Patch) -> ApiResult<()> {
        Ok(())
    }

    /// Removes records that depend on the entity about to be deleted
    async fn before_delete(_state: &AppState, _entity: &Self) -> ApiResult<()> {
        Ok(())
    }

    /// Runs after a successful create, update or delete
    async fn after_change(_state: &AppState, _entity: &Self) -> ApiResult<()> {
        Ok(())
    }
}

/// `{"status": "success", "data": {"data": data}}`
pub fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": { "data": data },
    }))
}

/// List envelope with a `results` count
pub fn success_list(documents: Vec<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "results": documents.len(),
        "data": { "data": documents },
    }))
}

pub fn to_document<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| ApiError::InternalError(format!("Serialization failed: {}", e)))
}

pub fn not_found<R: Resource>() -> ApiError {
    ApiError::NotFound(format!("No {} found with that ID", R::NAME))
}

/// Fetches by id within the resource's default scope
pub async fn find_visible<R: Resource>(state: &AppState, id: Uuid) -> ApiResult<R> {
    let filters = std::iter::once(Filter::eq("id", FilterValue::Uuid(id)))
        .chain(R::default_scope())
        .collect();

    R::repo(state)
        .find_first(filters)
        .await?
        .ok_or_else(not_found::<R>)
}

/// Runs a parsed list request with the default scope plus `scope`
///
/// Returns the projected documents of the requested page.
pub async fn list_documents<R: Resource>(
    state: &AppState,
    params: &[(String, String)],
    scope: Vec<Filter>,
) -> ApiResult<Vec<Value>> {
    let query = ListQuery::parse(R::COLUMNS, params)?
        .scoped(R::default_scope())
        .scoped(scope);

    R::repo(state)
        .find_many(&query)
        .await?
        .iter()
        .map(|entity| -> ApiResult<Value> { Ok(query.projection.apply(to_document(entity)?)) })
        .collect()
}

pub async fn insert<R: Resource>(state: &AppState, data: R::Create) -> ApiResult<R> {
    R::check_create(state, &data).await?;
    let created = R::repo(state).insert(data).await?;
    R::after_change(state, &created).await?;

    tracing::debug!(resource = R::NAME, id = %created.id(), "Created");
    Ok(created)
}

pub async fn update_by_id<R: Resource>(state: &AppState, id: Uuid, patch: R::Patch) -> ApiResult<R> {
    let repo = R::repo(state);
    let current = repo.find_by_id(id).await?.ok_or_else(not_found::<R>)?;
    R::check_update(state, &current, &patch).await?;

    let updated = repo.update(id, patch).await?.ok_or_else(not_found::<R>)?;
    R::after_change(state, &updated).await?;

    Ok(updated)
}

pub async fn delete_by_id<R: Resource>(state: &AppState, id: Uuid) -> ApiResult<()> {
    let repo = R::repo(state);
    let entity = repo.find_by_id(id).await?.ok_or_else(not_found::<R>)?;
    R::before_delete(state, &entity).await?;

    if !repo.delete(id).await? {
        return Err(not_found::<R>());
    }
    R::after_change(state, &entity).await?;

    tracing::debug!(resource = R::NAME, id = %id, "Deleted");
    Ok(())
}

/// Deletes every record matching `filter`, returning the removed records
///
/// Bypasses the resource hooks; callers handle the side effects.
pub async fn delete_where<R: Resource>(state: &AppState, filter: Filter) -> ApiResult<Vec<R>> {
    let repo = R::repo(state);
    let matching = repo.find_many(&ListQuery::all().filter(filter)).await?;

    let mut deleted = Vec::with_capacity(matching.len());
    for entity in matching {
        if repo.delete(entity.id()).await? {
            deleted.push(entity);
        }
    }
    Ok(deleted)
}

/// `POST /` handler
pub async fn create_one<R>(
    State(state): State<AppState>,
    body: Result<Json<R::Create>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)>
where
    R: Resource,
    R::Create: DeserializeOwned + Validate,
{
    let data = extract_validated_json(body)?;
    let created = insert::<R>(&state, data).await?;
    Ok((StatusCode::CREATED, success(created)))
}

/// `GET /:id` handler
pub async fn get_one<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let entity = find_visible::<R>(&state, parse_id(&id)?).await?;
    let document = R::expand(&state, &entity, to_document(&entity)?).await?;
    Ok(success(document))
}

/// `GET /` handler
pub async fn get_all<R: Resource>(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let documents = list_documents::<R>(&state, &params, Vec::new()).await?;
    Ok(success_list(documents))
}

/// `PATCH /:id` handler
pub async fn update_one<R>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<R::Patch>, JsonRejection>,
) -> ApiResult<Json<Value>>
where
    R: Resource,
    R::Patch: DeserializeOwned + Validate,
{
    let id = parse_id(&id)?;
    let patch = extract_validated_json(body)?;
    let updated = update_by_id::<R>(&state, id, patch).await?;
    Ok(success(updated))
}

/// `DELETE /:id` handler
pub async fn delete_one<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    delete_by_id::<R>(&state, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelopes() {
        let Json(single) = success(json!({ "name": "The Sea Explorer" }));
        assert_eq!(single["status"], "success");
        assert_eq!(single["data"]["data"]["name"], "The Sea Explorer");

        let Json(list) = success_list(vec![json!(1), json!(2)]);
        assert_eq!(list["results"], 2);
        assert_eq!(list["data"]["data"].as_array().unwrap().len(), 2);
    }
}
