//! Portfolio pieces shown to clients.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use super::{Database, StoreError, clean, new_id, now, required};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub style: Option<String>,
    pub body_location: Option<String>,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortfolioInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_url: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub body_location: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

const PORTFOLIO_COLUMNS: &str =
    "id, title, description, image_url, style, body_location, featured, created_at, updated_at";

fn portfolio_from_row(row: &Row<'_>) -> rusqlite::Result<PortfolioItem> {
    Ok(PortfolioItem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image_url: row.get(3)?,
        style: row.get(4)?,
        body_location: row.get(5)?,
        featured: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn validated(input: &PortfolioInput) -> Result<(String, String), StoreError> {
    let title = required(&input.title, "title")?;
    let image_url = required(&input.image_url, "image_url")?;
    if !image_url.starts_with("http://") && !image_url.starts_with("https://") {
        return Err(StoreError::Invalid("image_url must be an http(s) URL".into()));
    }
    Ok((title, image_url))
}

impl Database {
    pub fn create_portfolio_item(&self, input: PortfolioInput) -> Result<PortfolioItem, StoreError> {
        let (title, image_url) = validated(&input)?;
        let ts = now();
        let item = PortfolioItem {
            id: new_id(),
            title,
            description: clean(input.description),
            image_url,
            style: clean(input.style),
            body_location: clean(input.body_location),
            featured: input.featured,
            created_at: ts,
            updated_at: ts,
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO portfolio_items (id, title, description, image_url, style, body_location, featured, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id,
                item.title,
                item.description,
                item.image_url,
                item.style,
                item.body_location,
                item.featured,
                item.created_at,
                item.updated_at
            ],
        )?;
        Ok(item)
    }

    pub fn get_portfolio_item(&self, id: &str) -> Result<PortfolioItem, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {PORTFOLIO_COLUMNS} FROM portfolio_items WHERE id = ?1"),
            params![id],
            portfolio_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("portfolio item", id))
    }

    /// Featured pieces first, then newest. `style` matches case-insensitively.
    pub fn list_portfolio(&self, style: Option<&str>, featured_only: bool) -> Result<Vec<PortfolioItem>, StoreError> {
        let style = style.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolio_items
             WHERE (?1 IS NULL OR LOWER(style) = ?1) AND (?2 = 0 OR featured = 1)
             ORDER BY featured DESC, created_at DESC"
        ))?;
        let items = stmt
            .query_map(params![style, featured_only], portfolio_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_portfolio_item(&self, id: &str, input: PortfolioInput) -> Result<PortfolioItem, StoreError> {
        let (title, image_url) = validated(&input)?;
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE portfolio_items SET title = ?2, description = ?3, image_url = ?4, style = ?5, body_location = ?6,
                    featured = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    title,
                    clean(input.description),
                    image_url,
                    clean(input.style),
                    clean(input.body_location),
                    input.featured,
                    now()
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("portfolio item", id));
            }
        }
        self.get_portfolio_item(id)
    }

    pub fn delete_portfolio_item(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM portfolio_items WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("portfolio item", id));
        }
        Ok(())
    }
}
