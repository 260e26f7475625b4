//! Stock rows and the movement journal.
//!
//! A craft transition loads the rows it touches with [`lock_rows`], runs
//! the ledger in memory, then writes back with [`write_rows`] and
//! [`insert_movements`] in the same transaction. Rows are always locked in
//! `(item_id, location_id)` order so concurrent transitions cannot
//! deadlock on each other.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use scims_ledger::StockKey;
use scims_types::{ItemId, ItemStock, LocationId, StockMovement};

use crate::error::DbError;
use crate::rows::{MovementRow, StockRow, decode_all};

fn split_keys(keys: &BTreeSet<StockKey>) -> (Vec<Uuid>, Vec<Uuid>) {
    keys.iter()
        .map(|k| (k.item_id.into_inner(), k.location_id.into_inner()))
        .unzip()
}

/// Fetch one stock row.
pub async fn fetch_stock(
    conn: &mut PgConnection,
    item_id: ItemId,
    location_id: LocationId,
) -> Result<Option<ItemStock>, DbError> {
    let row = sqlx::query_as::<_, StockRow>(
        r"SELECT item_id, location_id, quantity, reserved_quantity, updated_at
          FROM item_stock
          WHERE item_id = $1 AND location_id = $2",
    )
    .bind(item_id.into_inner())
    .bind(location_id.into_inner())
    .fetch_optional(conn)
    .await?;
    Ok(row.map(ItemStock::from))
}

/// Every stock row for any of `items`, without locking. Used for
/// read-only planning.
pub async fn fetch_stock_for_items(
    conn: &mut PgConnection,
    items: &[Uuid],
) -> Result<Vec<ItemStock>, DbError> {
    let rows = sqlx::query_as::<_, StockRow>(
        r"SELECT item_id, location_id, quantity, reserved_quantity, updated_at
          FROM item_stock
          WHERE item_id = ANY($1)
          ORDER BY item_id, location_id",
    )
    .bind(items)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(ItemStock::from).collect())
}

/// Create empty rows for any of `keys` that do not exist yet, so the
/// following [`lock_rows`] sees (and locks) every key.
pub async fn ensure_rows(
    conn: &mut PgConnection,
    keys: &BTreeSet<StockKey>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    if keys.is_empty() {
        return Ok(());
    }
    let (items, locations) = split_keys(keys);
    sqlx::query(
        r"INSERT INTO item_stock (item_id, location_id, quantity, reserved_quantity, updated_at)
          SELECT k.item_id, k.location_id, 0, 0, $3
          FROM UNNEST($1::UUID[], $2::UUID[]) AS k (item_id, location_id)
          ON CONFLICT (item_id, location_id) DO NOTHING",
    )
    .bind(&items)
    .bind(&locations)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Load and lock the rows for `keys`, in key order.
pub async fn lock_rows(
    conn: &mut PgConnection,
    keys: &BTreeSet<StockKey>,
) -> Result<Vec<ItemStock>, DbError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let (items, locations) = split_keys(keys);
    let rows = sqlx::query_as::<_, StockRow>(
        r"SELECT s.item_id, s.location_id, s.quantity, s.reserved_quantity, s.updated_at
          FROM item_stock s
          JOIN UNNEST($1::UUID[], $2::UUID[]) AS k (item_id, location_id)
            ON s.item_id = k.item_id AND s.location_id = k.location_id
          ORDER BY s.item_id, s.location_id
          FOR UPDATE OF s",
    )
    .bind(&items)
    .bind(&locations)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(ItemStock::from).collect())
}

/// Upsert rows back after a ledger step.
pub async fn write_rows<'a, I>(conn: &mut PgConnection, rows: I) -> Result<(), DbError>
where
    I: IntoIterator<Item = &'a ItemStock>,
{
    let mut items = Vec::new();
    let mut locations = Vec::new();
    let mut quantities: Vec<Decimal> = Vec::new();
    let mut reserved: Vec<Decimal> = Vec::new();
    let mut updated = Vec::new();
    for row in rows {
        items.push(row.item_id.into_inner());
        locations.push(row.location_id.into_inner());
        quantities.push(row.quantity);
        reserved.push(row.reserved_quantity);
        updated.push(row.updated_at);
    }
    if items.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r"INSERT INTO item_stock (item_id, location_id, quantity, reserved_quantity, updated_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::NUMERIC[], $4::NUMERIC[], $5::TIMESTAMPTZ[])
          ON CONFLICT (item_id, location_id) DO UPDATE SET
              quantity = EXCLUDED.quantity,
              reserved_quantity = EXCLUDED.reserved_quantity,
              updated_at = EXCLUDED.updated_at",
    )
    .bind(&items)
    .bind(&locations)
    .bind(&quantities)
    .bind(&reserved)
    .bind(&updated)
    .execute(conn)
    .await?;
    Ok(())
}

/// Append movements to the journal.
pub async fn insert_movements(
    conn: &mut PgConnection,
    movements: &[StockMovement],
) -> Result<(), DbError> {
    if movements.is_empty() {
        return Ok(());
    }

    let len = movements.len();
    let mut ids = Vec::with_capacity(len);
    let mut kinds = Vec::with_capacity(len);
    let mut items = Vec::with_capacity(len);
    let mut locations = Vec::with_capacity(len);
    let mut quantities = Vec::with_capacity(len);
    let mut crafts: Vec<Option<Uuid>> = Vec::with_capacity(len);
    let mut reasons = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);

    for movement in movements {
        ids.push(movement.id.into_inner());
        kinds.push(movement.kind.as_str().to_owned());
        items.push(movement.item_id.into_inner());
        locations.push(movement.location_id.into_inner());
        quantities.push(movement.quantity);
        crafts.push(movement.craft_id.map(scims_types::CraftId::into_inner));
        reasons.push(movement.reason.clone());
        timestamps.push(movement.created_at);
    }

    sqlx::query(
        r"INSERT INTO stock_movements (id, kind, item_id, location_id, quantity, craft_id, reason, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::UUID[], $4::UUID[], $5::NUMERIC[], $6::UUID[], $7::TEXT[], $8::TIMESTAMPTZ[])",
    )
    .bind(&ids)
    .bind(&kinds)
    .bind(&items)
    .bind(&locations)
    .bind(&quantities)
    .bind(&crafts)
    .bind(&reasons)
    .bind(&timestamps)
    .execute(conn)
    .await?;

    tracing::debug!(count = len, "Inserted stock movements (batch UNNEST)");
    Ok(())
}

/// Journal entries for one craft, oldest first.
pub async fn movements_for_craft(
    conn: &mut PgConnection,
    craft_id: Uuid,
) -> Result<Vec<StockMovement>, DbError> {
    let rows = sqlx::query_as::<_, MovementRow>(
        r"SELECT id, kind, item_id, location_id, quantity, craft_id, reason, created_at
          FROM stock_movements
          WHERE craft_id = $1
          ORDER BY created_at, id",
    )
    .bind(craft_id)
    .fetch_all(conn)
    .await?;
    decode_all(rows)
}

/// Sum of `reserved_quantity` over every row.
pub async fn total_reserved(conn: &mut PgConnection) -> Result<Decimal, DbError> {
    let total: Decimal =
        sqlx::query_scalar("SELECT COALESCE(SUM(reserved_quantity), 0) FROM item_stock")
            .fetch_one(conn)
            .await?;
    Ok(total)
}

/// Every stock row, in key order.
pub async fn fetch_all_stock(conn: &mut PgConnection) -> Result<Vec<ItemStock>, DbError> {
    let rows = sqlx::query_as::<_, StockRow>(
        r"SELECT item_id, location_id, quantity, reserved_quantity, updated_at
          FROM item_stock
          ORDER BY item_id, location_id",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(ItemStock::from).collect())
}
