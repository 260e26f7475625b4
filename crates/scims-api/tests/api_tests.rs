//! Integration tests for the SCIMS API endpoints.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` over a
//! [`MemoryStore`], without a TCP listener or any external service.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

use scims_api::{AppState, REQUESTER_HEADER, build_router};
use scims_core::{MemoryStore, ScimsStore, StockAdjustment};
use scims_types::{
    Blueprint, BlueprintId, BlueprintIngredient, Item, ItemId, ItemRarity, Location, LocationId,
    LocationType, OwnerType, UserId, Visibility,
};

struct Fixture {
    router: Router,
    user: UserId,
    hangar: LocationId,
    metal: ItemId,
    widget: ItemId,
    blueprint: BlueprintId,
}

fn item(name: &str) -> Item {
    Item {
        id: ItemId::new(),
        name: name.to_owned(),
        category: String::from("component"),
        subcategory: None,
        rarity: ItemRarity::Common,
        attributes: BTreeMap::new(),
        created_at: Utc::now(),
    }
}

/// 100 Metal in the user's hangar; Widget needs 30 Metal.
async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let user = UserId::new();
    let hangar = store
        .put_location(Location {
            id: LocationId::new(),
            name: String::from("Hangar"),
            location_type: LocationType::Station,
            owner_type: OwnerType::User,
            owner_id: Some(user.into_inner()),
            parent_location_id: None,
            canonical_location_id: None,
            priority: 0,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
        .id;
    let metal = store.put_item(item("Metal")).await.unwrap().id;
    let widget = store.put_item(item("Widget")).await.unwrap().id;
    store
        .adjust_stock(StockAdjustment {
            item_id: metal,
            location_id: hangar,
            delta: dec!(100),
            reason: String::from("initial count"),
        })
        .await
        .unwrap();
    let blueprint = store
        .put_blueprint(Blueprint {
            id: BlueprintId::new(),
            name: String::from("Widget"),
            output_item_id: widget,
            output_quantity: dec!(1),
            crafting_time_minutes: 10,
            ingredients: vec![BlueprintIngredient {
                item_id: metal,
                quantity: dec!(30),
                optional: false,
            }],
            visibility: Visibility::Public,
            owner_id: Some(user),
            usage_count: 0,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
        .id;

    Fixture {
        router: build_router(Arc::new(AppState::new(store))),
        user,
        hangar,
        metal,
        widget,
        blueprint,
    }
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn get(uri: &str, user: Option<UserId>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(user) = user {
        builder = builder.header(REQUESTER_HEADER, user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user: Option<UserId>, body: &Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(REQUESTER_HEADER, user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_craft(f: &Fixture) -> String {
    let (status, json) = send(
        &f.router,
        post(
            "/api/crafts",
            Some(f.user),
            &json!({
                "blueprint_id": f.blueprint,
                "output_location_id": f.hangar,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["craft"]["id"].as_str().unwrap().to_owned()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn health_reports_ok() {
    let f = fixture().await;
    let response = f
        .router
        .clone()
        .oneshot(get("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn widget_craft_lifecycle_over_http() {
    let f = fixture().await;
    let id = create_craft(&f).await;

    let (status, json) = send(&f.router, get(&format!("/api/crafts/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["craft"]["status"], "planned");

    let (status, json) = send(
        &f.router,
        post(&format!("/api/crafts/{id}/start"), None, &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["craft"]["status"], "in_progress");

    let stock_uri = format!("/api/stock/{}/{}", f.metal, f.hangar);
    let (_, json) = send(&f.router, get(&stock_uri, None)).await;
    assert_eq!(decimal(&json["stock"]["reserved_quantity"]), dec!(30));
    assert_eq!(decimal(&json["available"]), dec!(70));

    let (status, json) = send(
        &f.router,
        post(&format!("/api/crafts/{id}/complete"), None, &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "completed");

    let (status, json) = send(
        &f.router,
        post(&format!("/api/crafts/{id}/complete"), None, &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "already_completed");

    let (_, json) = send(&f.router, get(&stock_uri, None)).await;
    assert_eq!(decimal(&json["stock"]["quantity"]), dec!(70));
    assert_eq!(decimal(&json["stock"]["reserved_quantity"]), Decimal::ZERO);

    let widget_uri = format!("/api/stock/{}/{}", f.widget, f.hangar);
    let (_, json) = send(&f.router, get(&widget_uri, None)).await;
    assert_eq!(decimal(&json["stock"]["quantity"]), dec!(1));
}

#[tokio::test]
async fn cancelling_completed_craft_conflicts() {
    let f = fixture().await;
    let id = create_craft(&f).await;
    for step in ["start", "complete"] {
        let (status, _) = send(
            &f.router,
            post(&format!("/api/crafts/{id}/{step}"), None, &Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(
        &f.router,
        post(&format!("/api/crafts/{id}/cancel"), None, &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], 409);
}

#[tokio::test]
async fn start_without_stock_is_unprocessable() {
    let f = fixture().await;
    let first = create_craft(&f).await;
    let (status, _) = send(
        &f.router,
        post(
            "/api/stock/adjust",
            None,
            &json!({
                "item_id": f.metal,
                "location_id": f.hangar,
                "delta": "-80",
                "reason": "spillage",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &f.router,
        post(&format!("/api/crafts/{first}/start"), None, &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, json) = send(&f.router, get(&format!("/api/crafts/{first}"), None)).await;
    assert_eq!(json["craft"]["status"], "planned");
}

#[tokio::test]
async fn craft_creation_requires_requester_header() {
    let f = fixture().await;
    let (status, json) = send(
        &f.router,
        post(
            "/api/crafts",
            None,
            &json!({
                "blueprint_id": f.blueprint,
                "output_location_id": f.hangar,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["status"], 401);
}

#[tokio::test]
async fn malformed_and_unknown_ids() {
    let f = fixture().await;
    let (status, _) = send(&f.router, get("/api/items/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = ItemId::new();
    let (status, _) = send(&f.router, get(&format!("/api/items/{missing}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zero_adjustment_is_rejected() {
    let f = fixture().await;
    let (status, _) = send(
        &f.router,
        post(
            "/api/stock/adjust",
            None,
            &json!({
                "item_id": f.metal,
                "location_id": f.hangar,
                "delta": "0",
                "reason": "noop",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stocked_item_cannot_be_deleted() {
    let f = fixture().await;
    let request = Request::delete(format!("/api/items/{}", f.metal))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&f.router, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn stocked_item_cannot_be_renamed() {
    let f = fixture().await;
    let body = json!({
        "id": f.metal,
        "name": "Scrap",
        "category": "component",
        "rarity": "common",
    });
    let (status, _) = send(&f.router, post("/api/items", None, &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = send(&f.router, get(&format!("/api/items/{}", f.metal), None)).await;
    assert_eq!(json["name"], "Metal");
}

fn widget_blueprint(f: &Fixture, name: &str, output_quantity: &str) -> Value {
    json!({
        "id": f.blueprint,
        "name": name,
        "output_item_id": f.widget,
        "output_quantity": output_quantity,
        "crafting_time_minutes": 10,
        "ingredients": [{ "item_id": f.metal, "quantity": "30" }],
        "visibility": "public",
    })
}

#[tokio::test]
async fn blueprint_writes_are_limited_to_owner_metadata() {
    let f = fixture().await;
    let stranger = UserId::new();

    let (status, _) = send(
        &f.router,
        post(
            "/api/blueprints",
            Some(stranger),
            &widget_blueprint(&f, "Widget", "1"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &f.router,
        post(
            "/api/blueprints",
            Some(f.user),
            &widget_blueprint(&f, "Widget", "1000"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(
        &f.router,
        post(
            "/api/blueprints",
            Some(f.user),
            &widget_blueprint(&f, "Widget Mk II", "1"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Widget Mk II");

    let (status, json) = send(
        &f.router,
        get(&format!("/api/blueprints/{}", f.blueprint), Some(f.user)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&json["output_quantity"]), dec!(1));
    assert_eq!(json["owner_id"], f.user.to_string());
}

#[tokio::test]
async fn items_can_be_created_and_fetched() {
    let f = fixture().await;
    let (status, json) = send(
        &f.router,
        post(
            "/api/items",
            None,
            &json!({
                "name": "Copper",
                "category": "ore",
                "rarity": "uncommon",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = json["id"].as_str().unwrap().to_owned();

    let (status, json) = send(&f.router, get(&format!("/api/items/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Copper");
}

#[tokio::test]
async fn resolve_previews_stock_allocation() {
    let f = fixture().await;
    let uri = format!("/api/blueprints/{}/resolve?multiplier=2", f.blueprint);
    let (status, json) = send(&f.router, get(&uri, Some(f.user))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["unsatisfied"], 0);
    assert_eq!(decimal(&json["ingredients"][0]["required_quantity"]), dec!(60));
}

#[tokio::test]
async fn suggestions_rank_the_widget_blueprint() {
    let f = fixture().await;
    let uri = format!("/api/suggestions?item_id={}&quantity=2", f.widget);
    let (status, json) = send(&f.router, get(&uri, Some(f.user))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["suggestions"][0]["feasible"], true);
}

#[tokio::test]
async fn fully_stocked_craft_has_no_gap() {
    let f = fixture().await;
    let id = create_craft(&f).await;
    let (status, json) = send(&f.router, get(&format!("/api/crafts/{id}/gaps"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&json["total_shortfall"]), Decimal::ZERO);
}

#[tokio::test]
async fn my_locations_lists_owned_hangar() {
    let f = fixture().await;
    let (status, json) = send(&f.router, get("/api/me/locations", Some(f.user))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["locations"][0], f.hangar.to_string());
}

#[tokio::test]
async fn stats_count_crafts_without_cache() {
    let f = fixture().await;
    create_craft(&f).await;
    let (status, json) = send(&f.router, get("/api/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["planned"], 1);
    assert_eq!(json["completed"], 0);
}
