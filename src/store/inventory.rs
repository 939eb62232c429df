//! Studio supplies and their stock movements.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Database, StoreError, clean, new_id, now, required};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub quantity: i64,
    pub min_quantity: i64,
    pub cost_cents: Option<i64>,
    pub supplier: Option<String>,
    /// Derived: quantity at or below `min_quantity`.
    pub low_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryItemInput {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub min_quantity: i64,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub supplier: Option<String>,
}

impl InventoryItemInput {
    fn validate(&self) -> Result<String, StoreError> {
        let name = required(&self.name, "name")?;
        if self.quantity < 0 || self.min_quantity < 0 {
            return Err(StoreError::Invalid("quantities can't be negative".into()));
        }
        if self.cost_cents.is_some_and(|c| c < 0) {
            return Err(StoreError::Invalid("cost can't be negative".into()));
        }
        Ok(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    In,
    Out,
    /// Sets the quantity to an absolute value (stock count).
    Adjustment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Adjustment => "adjustment",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "in" => Self::In,
            "out" => Self::Out,
            _ => Self::Adjustment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: String,
    pub item_id: String,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub resulting_quantity: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementInput {
    pub kind: MovementKind,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

const ITEM_COLUMNS: &str =
    "id, name, category, unit, quantity, min_quantity, cost_cents, supplier, created_at, updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    let quantity: i64 = row.get(4)?;
    let min_quantity: i64 = row.get(5)?;
    Ok(InventoryItem {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        unit: row.get(3)?,
        quantity,
        min_quantity,
        cost_cents: row.get(6)?,
        supplier: row.get(7)?,
        low_stock: quantity <= min_quantity,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn movement_from_row(row: &Row<'_>) -> rusqlite::Result<StockMovement> {
    Ok(StockMovement {
        id: row.get(0)?,
        item_id: row.get(1)?,
        kind: MovementKind::from_db(&row.get::<_, String>(2)?),
        quantity: row.get(3)?,
        reason: row.get(4)?,
        resulting_quantity: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn current_quantity(conn: &Connection, item_id: &str) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT quantity FROM inventory_items WHERE id = ?1",
        params![item_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("inventory item", item_id))
}

/// Apply a movement and write its ledger row. Runs inside the caller's transaction.
fn apply_movement(
    conn: &Connection,
    item_id: &str,
    movement: &MovementInput,
) -> Result<StockMovement, StoreError> {
    if movement.quantity < 0 || (movement.kind != MovementKind::Adjustment && movement.quantity == 0) {
        return Err(StoreError::Invalid("movement quantity must be positive".into()));
    }
    let current = current_quantity(conn, item_id)?;
    let resulting = match movement.kind {
        MovementKind::In => current + movement.quantity,
        MovementKind::Out => current - movement.quantity,
        MovementKind::Adjustment => movement.quantity,
    };
    if resulting < 0 {
        return Err(StoreError::Invalid(format!(
            "not enough stock: {current} available, {} requested",
            movement.quantity
        )));
    }

    let record = StockMovement {
        id: new_id(),
        item_id: item_id.to_string(),
        kind: movement.kind,
        quantity: movement.quantity,
        reason: clean(movement.reason.clone()),
        resulting_quantity: resulting,
        created_at: now(),
    };
    conn.execute(
        "UPDATE inventory_items SET quantity = ?2, updated_at = ?3 WHERE id = ?1",
        params![item_id, resulting, record.created_at],
    )?;
    conn.execute(
        "INSERT INTO stock_movements (id, item_id, kind, quantity, reason, resulting_quantity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.item_id,
            record.kind.as_str(),
            record.quantity,
            record.reason,
            record.resulting_quantity,
            record.created_at
        ],
    )?;
    Ok(record)
}

impl Database {
    pub fn create_inventory_item(&self, input: InventoryItemInput) -> Result<InventoryItem, StoreError> {
        let name = input.validate()?;
        let ts = now();
        let id = new_id();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO inventory_items (id, name, category, unit, quantity, min_quantity, cost_cents, supplier, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                name,
                clean(input.category),
                clean(input.unit).unwrap_or_else(|| "un".to_string()),
                input.min_quantity,
                input.cost_cents,
                clean(input.supplier),
                ts
            ],
        )?;
        if input.quantity > 0 {
            let opening = MovementInput {
                kind: MovementKind::In,
                quantity: input.quantity,
                reason: Some("estoque inicial".to_string()),
            };
            apply_movement(&tx, &id, &opening)?;
        }
        tx.commit()?;
        drop(conn);
        info!("Added inventory item {} ({})", name, id);
        self.get_inventory_item(&id)
    }

    pub fn get_inventory_item(&self, id: &str) -> Result<InventoryItem, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = ?1"),
            params![id],
            item_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("inventory item", id))
    }

    pub fn list_inventory(&self, low_stock_only: bool) -> Result<Vec<InventoryItem>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items
             WHERE ?1 = 0 OR quantity <= min_quantity
             ORDER BY name COLLATE NOCASE"
        ))?;
        let items = stmt
            .query_map(params![low_stock_only], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Edit an item. A changed quantity is booked as an adjustment so the
    /// movement ledger always explains the current stock.
    pub fn update_inventory_item(&self, id: &str, input: InventoryItemInput) -> Result<InventoryItem, StoreError> {
        let name = input.validate()?;
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let current = current_quantity(&tx, id)?;
            tx.execute(
                "UPDATE inventory_items SET name = ?2, category = ?3, unit = ?4, min_quantity = ?5, cost_cents = ?6,
                    supplier = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    name,
                    clean(input.category),
                    clean(input.unit).unwrap_or_else(|| "un".to_string()),
                    input.min_quantity,
                    input.cost_cents,
                    clean(input.supplier),
                    now()
                ],
            )?;
            if input.quantity != current {
                let adjustment = MovementInput {
                    kind: MovementKind::Adjustment,
                    quantity: input.quantity,
                    reason: Some("ajuste manual".to_string()),
                };
                apply_movement(&tx, id, &adjustment)?;
            }
            tx.commit()?;
        }
        self.get_inventory_item(id)
    }

    pub fn delete_inventory_item(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM inventory_items WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("inventory item", id));
        }
        tx.execute("DELETE FROM stock_movements WHERE item_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn record_movement(&self, item_id: &str, movement: MovementInput) -> Result<StockMovement, StoreError> {
        let record = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let record = apply_movement(&tx, item_id, &movement)?;
            tx.commit()?;
            record
        };
        let item = self.get_inventory_item(item_id)?;
        if item.low_stock {
            warn!(
                "Low stock: {} has {} {} (minimum {})",
                item.name, item.quantity, item.unit, item.min_quantity
            );
        }
        Ok(record)
    }

    /// Movements for an item, newest first.
    pub fn list_movements(&self, item_id: &str) -> Result<Vec<StockMovement>, StoreError> {
        let conn = self.conn()?;
        current_quantity(&conn, item_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, item_id, kind, quantity, reason, resulting_quantity, created_at
             FROM stock_movements WHERE item_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let movements = stmt
            .query_map(params![item_id], movement_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(movements)
    }

    pub fn low_stock_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inventory_items WHERE quantity <= min_quantity",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
