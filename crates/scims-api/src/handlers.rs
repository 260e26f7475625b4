//! REST endpoint handlers.
//!
//! Every handler is generic over the [`ScimsStore`] in [`AppState`], so the
//! same router serves the in-memory and `PostgreSQL` backends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness probe |
//! | `POST` | `/api/items` | Create or replace an item |
//! | `GET` | `/api/items/{id}` | Single item |
//! | `DELETE` | `/api/items/{id}` | Delete an unreferenced item |
//! | `POST` | `/api/locations` | Create or replace a location |
//! | `GET` | `/api/locations/{id}` | Single location |
//! | `GET` | `/api/me/locations` | Locations the requester may draw on |
//! | `GET` | `/api/stock/{item_id}/{location_id}` | Stock row |
//! | `POST` | `/api/stock/adjust` | Manual stock adjustment |
//! | `POST` | `/api/blueprints` | Create or replace a blueprint |
//! | `GET` | `/api/blueprints/{id}` | Single blueprint |
//! | `GET` | `/api/blueprints/{id}/resolve` | Ingredient plan preview |
//! | `POST` | `/api/resource-sources` | Create or replace a source |
//! | `POST` | `/api/resource-sources/{id}/verify` | Record a verification |
//! | `POST` | `/api/crafts` | Plan a craft |
//! | `GET` | `/api/crafts/{id}` | Craft with ingredients |
//! | `POST` | `/api/crafts/{id}/start` | Reserve and start |
//! | `POST` | `/api/crafts/{id}/complete` | Consume and credit output |
//! | `POST` | `/api/crafts/{id}/cancel` | Release and cancel |
//! | `GET` | `/api/crafts/{id}/gaps` | Per-ingredient shortfall |
//! | `GET` | `/api/suggestions` | Ranked blueprints for a target |
//! | `GET` | `/api/stats` | Usage statistics (cached) |

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use scims_core::ScimsStore;
use scims_core::aggregator::aggregate_usage_stats;
use scims_types::{BlueprintId, CraftId, ItemId, LocationId, ResourceSourceId, UserId};

use crate::error::ApiError;
use crate::requests::{
    AdjustStockRequest, BlueprintRequest, CraftRequest, ItemRequest, LocationRequest,
    ResolveQuery, ResourceSourceRequest, SuggestQuery, VerifyRequest,
};
use crate::state::AppState;

/// Header carrying the authenticated user's id.
pub const REQUESTER_HEADER: &str = "x-scims-user";

/// The authenticated requester, taken from [`REQUESTER_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester(pub UserId);

impl<St: Send + Sync> FromRequestParts<St> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(REQUESTER_HEADER)
            .ok_or_else(|| ApiError::Requester(format!("{REQUESTER_HEADER} header is missing")))?;
        let text = value
            .to_str()
            .map_err(|e| ApiError::Requester(format!("{REQUESTER_HEADER} is not ASCII: {e}")))?;
        let user = text
            .parse::<UserId>()
            .map_err(|e| ApiError::Requester(format!("{text}: {e}")))?;
        Ok(Self(user))
    }
}

fn parse_id<T: FromStr<Err = uuid::Error>>(s: &str) -> Result<T, ApiError> {
    s.parse::<T>()
        .map_err(|e| ApiError::InvalidUuid(format!("{s}: {e}")))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// `POST /api/items`
pub async fn put_item<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let item = state.store.put_item(body.into_item(Utc::now())).await?;
    Ok(Json(item))
}

/// `GET /api/items/{id}`
pub async fn get_item<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<ItemId>(&id_str)?;
    Ok(Json(state.store.get_item(id).await?))
}

/// `DELETE /api/items/{id}`
pub async fn delete_item<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<ItemId>(&id_str)?;
    state.store.delete_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Locations and stock
// ---------------------------------------------------------------------------

/// `POST /api/locations`
pub async fn put_location<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<LocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let location = state
        .store
        .put_location(body.into_location(Utc::now()))
        .await?;
    Ok(Json(location))
}

/// `GET /api/locations/{id}`
pub async fn get_location<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<LocationId>(&id_str)?;
    Ok(Json(state.store.get_location(id).await?))
}

/// `GET /api/me/locations`
pub async fn my_locations<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Requester(user): Requester,
) -> Result<impl IntoResponse, ApiError> {
    let locations = state.store.accessible_locations(user).await?;
    Ok(Json(serde_json::json!({
        "count": locations.len(),
        "locations": locations,
    })))
}

/// `GET /api/stock/{item_id}/{location_id}`
pub async fn get_stock<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((item_str, location_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let item_id = parse_id::<ItemId>(&item_str)?;
    let location_id = parse_id::<LocationId>(&location_str)?;
    let stock = state.store.get_stock(item_id, location_id).await?;
    let available = stock.available_quantity();
    Ok(Json(serde_json::json!({
        "stock": stock,
        "available": available,
    })))
}

/// `POST /api/stock/adjust`
pub async fn adjust_stock<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let stock = state.store.adjust_stock(body.into()).await?;
    Ok(Json(stock))
}

// ---------------------------------------------------------------------------
// Blueprints and sources
// ---------------------------------------------------------------------------

/// `POST /api/blueprints`
pub async fn put_blueprint<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Requester(user): Requester,
    Json(body): Json<BlueprintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let blueprint = state
        .store
        .put_blueprint(body.into_blueprint(user, Utc::now()))
        .await?;
    Ok(Json(blueprint))
}

/// `GET /api/blueprints/{id}`
pub async fn get_blueprint<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<BlueprintId>(&id_str)?;
    Ok(Json(state.store.get_blueprint(id).await?))
}

/// `GET /api/blueprints/{id}/resolve?multiplier=`
pub async fn resolve_blueprint<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Requester(user): Requester,
    Path(id_str): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    query.validate()?;
    let id = parse_id::<BlueprintId>(&id_str)?;
    let plans = state.store.resolve(id, user, query.multiplier).await?;
    let short = plans.iter().filter(|p| !p.is_resolved()).count();
    Ok(Json(serde_json::json!({
        "blueprint_id": id,
        "multiplier": query.multiplier,
        "unsatisfied": short,
        "ingredients": plans,
    })))
}

/// `POST /api/resource-sources`
pub async fn put_resource_source<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ResourceSourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let source = state.store.put_resource_source(body.into_source()).await?;
    Ok(Json(source))
}

/// `POST /api/resource-sources/{id}/verify`
pub async fn verify_resource_source<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
    Json(body): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<ResourceSourceId>(&id_str)?;
    let source = state
        .store
        .verify_resource_source(id, body.confirmed, Utc::now())
        .await?;
    Ok(Json(source))
}

// ---------------------------------------------------------------------------
// Crafts
// ---------------------------------------------------------------------------

/// `POST /api/crafts`
pub async fn create_craft<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Requester(user): Requester,
    Json(body): Json<CraftRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let craft = state
        .store
        .create_craft(body.into_new_craft(user), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(craft)))
}

/// `GET /api/crafts/{id}`
pub async fn get_craft<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<CraftId>(&id_str)?;
    Ok(Json(state.store.get_craft(id).await?))
}

/// `POST /api/crafts/{id}/start`
pub async fn start_craft<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<CraftId>(&id_str)?;
    Ok(Json(state.store.start_craft(id, Utc::now()).await?))
}

/// `POST /api/crafts/{id}/complete`
pub async fn complete_craft<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<CraftId>(&id_str)?;
    Ok(Json(state.store.complete_craft(id, Utc::now()).await?))
}

/// `POST /api/crafts/{id}/cancel`
pub async fn cancel_craft<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<CraftId>(&id_str)?;
    Ok(Json(state.store.cancel_craft(id, Utc::now()).await?))
}

/// `GET /api/crafts/{id}/gaps`
pub async fn craft_gaps<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id::<CraftId>(&id_str)?;
    let gaps = state.store.analyze_gaps(id).await?;
    let total_shortfall = gaps
        .iter()
        .try_fold(Decimal::ZERO, |acc, g| acc.checked_add(g.gap));
    Ok(Json(serde_json::json!({
        "craft_id": id,
        "total_shortfall": total_shortfall,
        "gaps": gaps,
    })))
}

// ---------------------------------------------------------------------------
// Planning and stats
// ---------------------------------------------------------------------------

/// Raw query for `GET /api/suggestions`; ids arrive as plain strings.
#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    /// Target item id.
    pub item_id: String,
    /// Target quantity.
    pub quantity: Decimal,
}

/// `GET /api/suggestions?item_id=&quantity=`
pub async fn suggestions<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
    Requester(user): Requester,
    Query(params): Query<SuggestParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = SuggestQuery {
        item_id: parse_id(&params.item_id)?,
        quantity: params.quantity,
    };
    query.validate()?;
    let ranked = state
        .store
        .suggest(query.item_id, query.quantity, user)
        .await?;
    Ok(Json(serde_json::json!({
        "item_id": query.item_id,
        "quantity": query.quantity,
        "count": ranked.len(),
        "suggestions": ranked,
    })))
}

/// `GET /api/stats`
///
/// Served from the stats cache when a fresh snapshot exists. Otherwise the
/// snapshot is computed and written back. Cache failures only degrade to
/// computing every request.
pub async fn usage_stats<S: ScimsStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(cache) = &state.stats_cache {
        match cache.get_usage_stats().await {
            Ok(Some(stats)) => return Ok(Json(stats)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "stats cache read failed"),
        }
    }

    let stats = aggregate_usage_stats(state.store.as_ref(), Utc::now()).await?;

    if let Some(cache) = &state.stats_cache {
        if let Err(e) = cache.put_usage_stats(&stats, state.stats_ttl_secs).await {
            tracing::warn!(error = %e, "stats cache write failed");
        }
    }
    Ok(Json(stats))
}
