//! Craft headers, ingredient rows and their allocations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use scims_core::{CraftRecord, ReadyCraft};
use scims_types::{Allocation, Craft, CraftId, CraftStatus, LocationId};

use crate::error::DbError;
use crate::rows::{AllocationRow, CraftIngredientRow, CraftRow};

/// Craft counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// `planned`.
    pub planned: u64,
    /// `in_progress`.
    pub in_progress: u64,
    /// `completed`.
    pub completed: u64,
    /// `cancelled`.
    pub cancelled: u64,
}

/// Fetch a craft with ingredients and allocations. With `lock`, the craft
/// row stays locked until the transaction ends.
pub async fn fetch_craft(
    conn: &mut PgConnection,
    id: CraftId,
    lock: bool,
) -> Result<Option<CraftRecord>, DbError> {
    let sql = if lock {
        "SELECT id, blueprint_id, requester_id, organization_id, status, priority, scheduled_start, started_at, completed_at, output_location_id, created_at, updated_at FROM crafts WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, blueprint_id, requester_id, organization_id, status, priority, scheduled_start, started_at, completed_at, output_location_id, created_at, updated_at FROM crafts WHERE id = $1"
    };
    let row = sqlx::query_as::<_, CraftRow>(sql)
        .bind(id.into_inner())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let craft = Craft::try_from(row)?;

    let ingredient_rows = sqlx::query_as::<_, CraftIngredientRow>(
        r"SELECT id, craft_id, item_id, required_quantity, source_location_id, source_type,
                 status, optional, shortfall
          FROM craft_ingredients
          WHERE craft_id = $1
          ORDER BY position",
    )
    .bind(id.into_inner())
    .fetch_all(&mut *conn)
    .await?;

    let allocation_rows = sqlx::query_as::<_, AllocationRow>(
        r"SELECT a.ingredient_id, a.source_type, a.location_id, a.resource_source_id, a.quantity
          FROM craft_ingredient_allocations a
          JOIN craft_ingredients i ON i.id = a.ingredient_id
          WHERE i.craft_id = $1
          ORDER BY a.ingredient_id, a.position",
    )
    .bind(id.into_inner())
    .fetch_all(conn)
    .await?;

    let mut allocations: BTreeMap<Uuid, Vec<Allocation>> = BTreeMap::new();
    for row in allocation_rows {
        let ingredient_id = row.ingredient_id;
        allocations
            .entry(ingredient_id)
            .or_default()
            .push(Allocation::try_from(row)?);
    }

    let ingredients = ingredient_rows
        .into_iter()
        .map(|row| {
            let slices = allocations.remove(&row.id).unwrap_or_default();
            row.into_ingredient(slices)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(CraftRecord { craft, ingredients }))
}

/// Insert a freshly planned craft with its ingredient rows and
/// allocations.
pub async fn insert_craft(conn: &mut PgConnection, record: &CraftRecord) -> Result<(), DbError> {
    let craft = &record.craft;
    sqlx::query(
        r"INSERT INTO crafts (id, blueprint_id, requester_id, organization_id, status, priority,
                              scheduled_start, started_at, completed_at, output_location_id,
                              created_at, updated_at)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(craft.id.into_inner())
    .bind(craft.blueprint_id.into_inner())
    .bind(craft.requester_id.into_inner())
    .bind(craft.organization_id.map(scims_types::OrganizationId::into_inner))
    .bind(craft.status.as_str())
    .bind(craft.priority)
    .bind(craft.scheduled_start)
    .bind(craft.started_at)
    .bind(craft.completed_at)
    .bind(craft.output_location_id.into_inner())
    .bind(craft.created_at)
    .bind(craft.updated_at)
    .execute(&mut *conn)
    .await?;

    let len = record.ingredients.len();
    let mut ids = Vec::with_capacity(len);
    let mut positions = Vec::with_capacity(len);
    let mut items = Vec::with_capacity(len);
    let mut required = Vec::with_capacity(len);
    let mut source_locations: Vec<Option<Uuid>> = Vec::with_capacity(len);
    let mut source_types: Vec<Option<String>> = Vec::with_capacity(len);
    let mut statuses = Vec::with_capacity(len);
    let mut optionals = Vec::with_capacity(len);
    let mut shortfalls = Vec::with_capacity(len);

    let mut alloc_ingredients = Vec::new();
    let mut alloc_positions = Vec::new();
    let mut alloc_types = Vec::new();
    let mut alloc_locations: Vec<Option<Uuid>> = Vec::new();
    let mut alloc_sources: Vec<Option<Uuid>> = Vec::new();
    let mut alloc_quantities = Vec::new();

    for (position, ingredient) in (0_i32..).zip(&record.ingredients) {
        ids.push(ingredient.id.into_inner());
        positions.push(position);
        items.push(ingredient.item_id.into_inner());
        required.push(ingredient.required_quantity);
        source_locations.push(ingredient.source_location_id.map(LocationId::into_inner));
        source_types.push(ingredient.source_type.map(|s| s.as_str().to_owned()));
        statuses.push(ingredient.status.as_str().to_owned());
        optionals.push(ingredient.optional);
        shortfalls.push(ingredient.shortfall);

        for (slot, allocation) in (0_i32..).zip(&ingredient.allocations) {
            alloc_ingredients.push(ingredient.id.into_inner());
            alloc_positions.push(slot);
            alloc_types.push(allocation.source_type.as_str().to_owned());
            alloc_locations.push(allocation.location_id.map(LocationId::into_inner));
            alloc_sources.push(
                allocation
                    .resource_source_id
                    .map(scims_types::ResourceSourceId::into_inner),
            );
            alloc_quantities.push(allocation.quantity);
        }
    }

    if !ids.is_empty() {
        sqlx::query(
            r"INSERT INTO craft_ingredients (id, craft_id, position, item_id, required_quantity,
                                             source_location_id, source_type, status, optional, shortfall)
              SELECT u.id, $1, u.position, u.item_id, u.required_quantity, u.source_location_id,
                     u.source_type, u.status, u.optional, u.shortfall
              FROM UNNEST($2::UUID[], $3::INTEGER[], $4::UUID[], $5::NUMERIC[], $6::UUID[],
                          $7::TEXT[], $8::TEXT[], $9::BOOLEAN[], $10::NUMERIC[])
                   AS u (id, position, item_id, required_quantity, source_location_id,
                         source_type, status, optional, shortfall)",
        )
        .bind(craft.id.into_inner())
        .bind(&ids)
        .bind(&positions)
        .bind(&items)
        .bind(&required)
        .bind(&source_locations)
        .bind(&source_types)
        .bind(&statuses)
        .bind(&optionals)
        .bind(&shortfalls)
        .execute(&mut *conn)
        .await?;
    }

    if !alloc_ingredients.is_empty() {
        sqlx::query(
            r"INSERT INTO craft_ingredient_allocations (ingredient_id, position, source_type,
                                                        location_id, resource_source_id, quantity)
              SELECT * FROM UNNEST($1::UUID[], $2::INTEGER[], $3::TEXT[], $4::UUID[], $5::UUID[], $6::NUMERIC[])",
        )
        .bind(&alloc_ingredients)
        .bind(&alloc_positions)
        .bind(&alloc_types)
        .bind(&alloc_locations)
        .bind(&alloc_sources)
        .bind(&alloc_quantities)
        .execute(conn)
        .await?;
    }

    Ok(())
}

/// Write back a transition. The header update only applies while the
/// stored status is still `expected`; returns `false` when it was not.
pub async fn update_craft(
    conn: &mut PgConnection,
    record: &CraftRecord,
    expected: CraftStatus,
) -> Result<bool, DbError> {
    let craft = &record.craft;
    let result = sqlx::query(
        r"UPDATE crafts
          SET status = $2, started_at = $3, completed_at = $4, updated_at = $5
          WHERE id = $1 AND status = $6",
    )
    .bind(craft.id.into_inner())
    .bind(craft.status.as_str())
    .bind(craft.started_at)
    .bind(craft.completed_at)
    .bind(craft.updated_at)
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }

    let (ids, statuses): (Vec<Uuid>, Vec<String>) = record
        .ingredients
        .iter()
        .map(|i| (i.id.into_inner(), i.status.as_str().to_owned()))
        .unzip();
    if !ids.is_empty() {
        sqlx::query(
            r"UPDATE craft_ingredients AS ci
              SET status = u.status
              FROM UNNEST($1::UUID[], $2::TEXT[]) AS u (id, status)
              WHERE ci.id = u.id",
        )
        .bind(&ids)
        .bind(&statuses)
        .execute(conn)
        .await?;
    }
    Ok(true)
}

/// In-progress crafts whose crafting time has elapsed at `now`, priority
/// descending then oldest ready time first.
pub async fn ready_crafts(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<ReadyCraft>, DbError> {
    let rows: Vec<(Uuid, i32, DateTime<Utc>)> = sqlx::query_as(
        r"SELECT c.id, c.priority,
                 COALESCE(c.scheduled_start, c.started_at)
                     + make_interval(mins => b.crafting_time_minutes) AS ready_at
          FROM crafts c
          JOIN blueprints b ON b.id = c.blueprint_id
          WHERE c.status = 'in_progress'
            AND COALESCE(c.scheduled_start, c.started_at) IS NOT NULL
            AND COALESCE(c.scheduled_start, c.started_at)
                + make_interval(mins => b.crafting_time_minutes) <= $1
          ORDER BY c.priority DESC, ready_at ASC, c.id ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, priority, ready_at)| ReadyCraft {
            craft_id: id.into(),
            priority,
            ready_at,
        })
        .collect())
}

/// Count crafts per status.
pub async fn status_counts(conn: &mut PgConnection) -> Result<StatusCounts, DbError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM crafts GROUP BY status")
            .fetch_all(conn)
            .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        let count = u64::try_from(count).unwrap_or(0);
        match status.parse::<CraftStatus>()? {
            CraftStatus::Planned => counts.planned = count,
            CraftStatus::InProgress => counts.in_progress = count,
            CraftStatus::Completed => counts.completed = count,
            CraftStatus::Cancelled => counts.cancelled = count,
        }
    }
    Ok(counts)
}

/// Number of crafts completed at or after `since`.
pub async fn completed_since(
    conn: &mut PgConnection,
    since: DateTime<Utc>,
) -> Result<u64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crafts WHERE status = 'completed' AND completed_at >= $1",
    )
    .bind(since)
    .fetch_one(conn)
    .await?;
    Ok(u64::try_from(count).unwrap_or(0))
}
