//! Catalog persistence: items, locations, blueprints and resource sources.
//!
//! Functions take a `&mut PgConnection` so [`PgStore`](crate::PgStore) can
//! run them inside its transactions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

use scims_types::{
    Blueprint, BlueprintId, Item, ItemId, Location, LocationId, ResourceSource, ResourceSourceId,
};

use crate::error::DbError;
use crate::rows::{
    BlueprintIngredientRow, BlueprintRow, ItemRow, LocationRow, ResourceSourceRow, decode_all,
};

const BLUEPRINT_COLUMNS: &str = "id, name, output_item_id, output_quantity, crafting_time_minutes, visibility, owner_id, usage_count, created_at";

const SOURCE_COLUMNS: &str = "id, item_id, source_type, location_id, provider_id, available_quantity, cost_per_unit, reliability_score, last_verified";

// =============================================================================
// Items
// =============================================================================

/// Insert an item, or rewrite the descriptive columns of an existing one.
pub async fn upsert_item(conn: &mut PgConnection, item: &Item) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO items (id, name, category, subcategory, rarity, attributes, created_at)
          VALUES ($1, $2, $3, $4, $5, $6, $7)
          ON CONFLICT (id) DO UPDATE SET
              name = EXCLUDED.name,
              category = EXCLUDED.category,
              subcategory = EXCLUDED.subcategory,
              rarity = EXCLUDED.rarity,
              attributes = EXCLUDED.attributes",
    )
    .bind(item.id.into_inner())
    .bind(&item.name)
    .bind(&item.category)
    .bind(item.subcategory.as_deref())
    .bind(item.rarity.as_str())
    .bind(Json(&item.attributes))
    .bind(item.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Fetch an item.
pub async fn fetch_item(conn: &mut PgConnection, id: ItemId) -> Result<Option<Item>, DbError> {
    select_item(conn, id, "").await
}

/// Fetch an item and lock its row until the transaction ends.
pub async fn fetch_item_for_update(
    conn: &mut PgConnection,
    id: ItemId,
) -> Result<Option<Item>, DbError> {
    select_item(conn, id, " FOR UPDATE").await
}

async fn select_item(
    conn: &mut PgConnection,
    id: ItemId,
    lock: &str,
) -> Result<Option<Item>, DbError> {
    let sql = format!(
        "SELECT id, name, category, subcategory, rarity, attributes, created_at
         FROM items WHERE id = $1{lock}"
    );
    let row = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(id.into_inner())
        .fetch_optional(conn)
        .await?;
    row.map(Item::try_from).transpose()
}

/// Item IDs from `ids` that do not exist.
pub async fn missing_items(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<ItemId>, DbError> {
    let missing: Vec<Uuid> = sqlx::query_scalar(
        r"SELECT wanted.id
          FROM UNNEST($1::UUID[]) AS wanted (id)
          WHERE NOT EXISTS (SELECT 1 FROM items i WHERE i.id = wanted.id)",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(missing.into_iter().map(ItemId::from).collect())
}

/// What still references an item, if anything: `"stock row"`,
/// `"stock movement"`, `"blueprint"`, `"craft"` or `"resource source"`.
pub async fn item_reference(
    conn: &mut PgConnection,
    id: ItemId,
) -> Result<Option<String>, DbError> {
    let reference: Option<String> = sqlx::query_scalar(
        r"SELECT CASE
              WHEN EXISTS (SELECT 1 FROM item_stock WHERE item_id = $1) THEN 'stock row'
              WHEN EXISTS (SELECT 1 FROM stock_movements WHERE item_id = $1) THEN 'stock movement'
              WHEN EXISTS (SELECT 1 FROM blueprints WHERE output_item_id = $1)
                OR EXISTS (SELECT 1 FROM blueprint_ingredients WHERE item_id = $1) THEN 'blueprint'
              WHEN EXISTS (SELECT 1 FROM craft_ingredients WHERE item_id = $1) THEN 'craft'
              WHEN EXISTS (SELECT 1 FROM resource_sources WHERE item_id = $1) THEN 'resource source'
          END",
    )
    .bind(id.into_inner())
    .fetch_one(conn)
    .await?;
    Ok(reference)
}

/// Delete an item. Returns whether a row was removed.
pub async fn delete_item(conn: &mut PgConnection, id: ItemId) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM items WHERE id = $1")
        .bind(id.into_inner())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Locations
// =============================================================================

/// Serialize location writers so concurrent inserts cannot form a cycle
/// between them. Readers are not blocked.
pub async fn lock_locations(conn: &mut PgConnection) -> Result<(), DbError> {
    sqlx::query("LOCK TABLE locations IN SHARE ROW EXCLUSIVE MODE")
        .execute(conn)
        .await?;
    Ok(())
}

/// Every location.
pub async fn fetch_locations(conn: &mut PgConnection) -> Result<Vec<Location>, DbError> {
    let rows = sqlx::query_as::<_, LocationRow>(
        r"SELECT id, name, location_type, owner_type, owner_id, parent_location_id,
                 canonical_location_id, priority, created_at
          FROM locations",
    )
    .fetch_all(conn)
    .await?;
    decode_all(rows)
}

/// Fetch one location.
pub async fn fetch_location(
    conn: &mut PgConnection,
    id: LocationId,
) -> Result<Option<Location>, DbError> {
    let row = sqlx::query_as::<_, LocationRow>(
        r"SELECT id, name, location_type, owner_type, owner_id, parent_location_id,
                 canonical_location_id, priority, created_at
          FROM locations WHERE id = $1",
    )
    .bind(id.into_inner())
    .fetch_optional(conn)
    .await?;
    row.map(Location::try_from).transpose()
}

/// Insert or replace a location. The caller has already validated the
/// hierarchy.
pub async fn upsert_location(conn: &mut PgConnection, location: &Location) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO locations (id, name, location_type, owner_type, owner_id,
                                 parent_location_id, canonical_location_id, priority, created_at)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          ON CONFLICT (id) DO UPDATE SET
              name = EXCLUDED.name,
              location_type = EXCLUDED.location_type,
              owner_type = EXCLUDED.owner_type,
              owner_id = EXCLUDED.owner_id,
              parent_location_id = EXCLUDED.parent_location_id,
              canonical_location_id = EXCLUDED.canonical_location_id,
              priority = EXCLUDED.priority",
    )
    .bind(location.id.into_inner())
    .bind(&location.name)
    .bind(location.location_type.as_str())
    .bind(location.owner_type.as_str())
    .bind(location.owner_id)
    .bind(location.parent_location_id.map(LocationId::into_inner))
    .bind(location.canonical_location_id.map(LocationId::into_inner))
    .bind(location.priority)
    .bind(location.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Blueprints
// =============================================================================

/// Fetch one blueprint with its ingredients.
pub async fn fetch_blueprint(
    conn: &mut PgConnection,
    id: BlueprintId,
) -> Result<Option<Blueprint>, DbError> {
    select_blueprint(conn, id, "").await
}

/// Fetch one blueprint and lock its row until the transaction ends.
pub async fn fetch_blueprint_for_update(
    conn: &mut PgConnection,
    id: BlueprintId,
) -> Result<Option<Blueprint>, DbError> {
    select_blueprint(conn, id, " FOR UPDATE").await
}

async fn select_blueprint(
    conn: &mut PgConnection,
    id: BlueprintId,
    lock: &str,
) -> Result<Option<Blueprint>, DbError> {
    let sql = format!("SELECT {BLUEPRINT_COLUMNS} FROM blueprints WHERE id = $1{lock}");
    let row = sqlx::query_as::<_, BlueprintRow>(&sql)
        .bind(id.into_inner())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut blueprints = attach_ingredients(conn, vec![row]).await?;
    Ok(blueprints.pop())
}

/// Every blueprint producing `item_id`, ordered by ID.
pub async fn fetch_blueprints_for_output(
    conn: &mut PgConnection,
    item_id: ItemId,
) -> Result<Vec<Blueprint>, DbError> {
    let sql = format!(
        "SELECT {BLUEPRINT_COLUMNS} FROM blueprints WHERE output_item_id = $1 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, BlueprintRow>(&sql)
        .bind(item_id.into_inner())
        .fetch_all(&mut *conn)
        .await?;
    attach_ingredients(conn, rows).await
}

async fn attach_ingredients(
    conn: &mut PgConnection,
    rows: Vec<BlueprintRow>,
) -> Result<Vec<Blueprint>, DbError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let ingredient_rows = sqlx::query_as::<_, BlueprintIngredientRow>(
        r"SELECT blueprint_id, item_id, quantity, optional
          FROM blueprint_ingredients
          WHERE blueprint_id = ANY($1)
          ORDER BY blueprint_id, position",
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    let mut grouped: BTreeMap<Uuid, Vec<BlueprintIngredientRow>> = BTreeMap::new();
    for ingredient in ingredient_rows {
        grouped
            .entry(ingredient.blueprint_id)
            .or_default()
            .push(ingredient);
    }

    rows.into_iter()
        .map(|row| {
            let ingredients = grouped.remove(&row.id).unwrap_or_default();
            row.into_blueprint(ingredients)
        })
        .collect()
}

/// Insert a new blueprint and its ingredient list with a zero usage count.
pub async fn insert_blueprint(
    conn: &mut PgConnection,
    blueprint: &Blueprint,
) -> Result<(), DbError> {
    let minutes = i32::try_from(blueprint.crafting_time_minutes).map_err(|e| {
        DbError::Decode(format!(
            "crafting time {} does not fit in INTEGER: {e}",
            blueprint.crafting_time_minutes
        ))
    })?;
    sqlx::query(
        r"INSERT INTO blueprints (id, name, output_item_id, output_quantity,
                                  crafting_time_minutes, visibility, owner_id, usage_count, created_at)
          VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)",
    )
    .bind(blueprint.id.into_inner())
    .bind(&blueprint.name)
    .bind(blueprint.output_item_id.into_inner())
    .bind(blueprint.output_quantity)
    .bind(minutes)
    .bind(blueprint.visibility.as_str())
    .bind(blueprint.owner_id.map(scims_types::UserId::into_inner))
    .bind(blueprint.created_at)
    .execute(&mut *conn)
    .await?;

    let len = blueprint.ingredients.len();
    let mut positions = Vec::with_capacity(len);
    let mut items = Vec::with_capacity(len);
    let mut quantities = Vec::with_capacity(len);
    let mut optionals = Vec::with_capacity(len);
    for (position, ingredient) in (0_i32..).zip(&blueprint.ingredients) {
        positions.push(position);
        items.push(ingredient.item_id.into_inner());
        quantities.push(ingredient.quantity);
        optionals.push(ingredient.optional);
    }

    sqlx::query(
        r"INSERT INTO blueprint_ingredients (blueprint_id, position, item_id, quantity, optional)
          SELECT $1, * FROM UNNEST($2::INTEGER[], $3::UUID[], $4::NUMERIC[], $5::BOOLEAN[])",
    )
    .bind(blueprint.id.into_inner())
    .bind(&positions)
    .bind(&items)
    .bind(&quantities)
    .bind(&optionals)
    .execute(conn)
    .await?;

    Ok(())
}

/// Rewrite the mutable columns of a stored blueprint: `name` and
/// `visibility`.
pub async fn update_blueprint_metadata(
    conn: &mut PgConnection,
    blueprint: &Blueprint,
) -> Result<(), DbError> {
    sqlx::query("UPDATE blueprints SET name = $2, visibility = $3 WHERE id = $1")
        .bind(blueprint.id.into_inner())
        .bind(&blueprint.name)
        .bind(blueprint.visibility.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Bump a blueprint's usage count after a completion.
pub async fn increment_usage(conn: &mut PgConnection, id: BlueprintId) -> Result<(), DbError> {
    sqlx::query("UPDATE blueprints SET usage_count = usage_count + 1 WHERE id = $1")
        .bind(id.into_inner())
        .execute(conn)
        .await?;
    Ok(())
}

/// The most used blueprints as `(id, name, usage_count)`, usage descending.
pub async fn top_blueprints(
    conn: &mut PgConnection,
    limit: usize,
) -> Result<Vec<(Uuid, String, i64)>, DbError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = sqlx::query_as(
        r"SELECT id, name, usage_count
          FROM blueprints
          WHERE usage_count > 0
          ORDER BY usage_count DESC, id ASC
          LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

// =============================================================================
// Resource sources
// =============================================================================

/// Resource sources offering any of `items`.
pub async fn fetch_sources_for_items(
    conn: &mut PgConnection,
    items: &[Uuid],
) -> Result<Vec<ResourceSource>, DbError> {
    let sql =
        format!("SELECT {SOURCE_COLUMNS} FROM resource_sources WHERE item_id = ANY($1) ORDER BY id");
    let rows = sqlx::query_as::<_, ResourceSourceRow>(&sql)
        .bind(items)
        .fetch_all(conn)
        .await?;
    decode_all(rows)
}

/// Fetch one resource source, locking it for the rest of the transaction.
pub async fn fetch_source_for_update(
    conn: &mut PgConnection,
    id: ResourceSourceId,
) -> Result<Option<ResourceSource>, DbError> {
    let sql = format!("SELECT {SOURCE_COLUMNS} FROM resource_sources WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, ResourceSourceRow>(&sql)
        .bind(id.into_inner())
        .fetch_optional(conn)
        .await?;
    row.map(ResourceSource::try_from).transpose()
}

/// Insert or replace a resource source.
pub async fn upsert_source(conn: &mut PgConnection, source: &ResourceSource) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO resource_sources (id, item_id, source_type, location_id, provider_id,
                                        available_quantity, cost_per_unit, reliability_score, last_verified)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          ON CONFLICT (id) DO UPDATE SET
              item_id = EXCLUDED.item_id,
              source_type = EXCLUDED.source_type,
              location_id = EXCLUDED.location_id,
              provider_id = EXCLUDED.provider_id,
              available_quantity = EXCLUDED.available_quantity,
              cost_per_unit = EXCLUDED.cost_per_unit,
              reliability_score = EXCLUDED.reliability_score,
              last_verified = EXCLUDED.last_verified",
    )
    .bind(source.id.into_inner())
    .bind(source.item_id.into_inner())
    .bind(source.source_type.as_str())
    .bind(source.location_id.map(LocationId::into_inner))
    .bind(source.provider_id.map(scims_types::UserId::into_inner))
    .bind(source.available_quantity)
    .bind(source.cost_per_unit)
    .bind(source.reliability_score)
    .bind(source.last_verified)
    .execute(conn)
    .await?;
    Ok(())
}

/// Persist the result of a verification.
pub async fn update_verification(
    conn: &mut PgConnection,
    id: ResourceSourceId,
    reliability_score: Decimal,
    last_verified: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE resource_sources SET reliability_score = $2, last_verified = $3 WHERE id = $1",
    )
    .bind(id.into_inner())
    .bind(reliability_score)
    .bind(last_verified)
    .execute(conn)
    .await?;
    Ok(())
}
