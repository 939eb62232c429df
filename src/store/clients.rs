//! Studio clients.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Database, StoreError, clean, new_id, now, required};
use crate::text::digits_only;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    /// Digits only, country code included when known.
    pub phone: Option<String>,
    pub email: Option<String>,
    pub instagram: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// Fields accepted when creating or editing a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientInput {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ClientInput {
    #[cfg(test)]
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    fn normalized(self) -> Result<Self, StoreError> {
        let name = required(&self.name, "name")?;
        let phone = clean(self.phone.map(|p| digits_only(&p)));
        if let Some(ref p) = phone
            && p.len() < 8
        {
            return Err(StoreError::Invalid(format!("phone '{p}' is too short")));
        }
        let email = clean(self.email);
        if let Some(ref e) = email
            && !e.contains('@')
        {
            return Err(StoreError::Invalid(format!("email '{e}' is not valid")));
        }
        Ok(Self {
            name,
            phone,
            email,
            instagram: clean(self.instagram).map(|i| i.trim_start_matches('@').to_string()),
            birth_date: self.birth_date,
            notes: clean(self.notes),
        })
    }
}

const CLIENT_COLUMNS: &str =
    "id, name, phone, email, instagram, birth_date, notes, created_at, updated_at";

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        instagram: row.get(4)?,
        birth_date: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl Database {
    pub fn create_client(&self, input: ClientInput) -> Result<Client, StoreError> {
        let input = input.normalized()?;
        let ts = now();
        let client = Client {
            id: new_id(),
            name: input.name,
            phone: input.phone,
            email: input.email,
            instagram: input.instagram,
            birth_date: input.birth_date,
            notes: input.notes,
            created_at: ts,
            updated_at: ts,
        };
        self.insert_client(&client)?;
        info!("Created client {} ({})", client.name, client.id);
        Ok(client)
    }

    /// Insert a fully-formed client record, keeping its id and timestamps.
    /// Returns `false` when a client with the same id already exists.
    pub fn insert_client(&self, client: &Client) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO clients (id, name, phone, email, instagram, birth_date, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                client.id,
                client.name,
                client.phone,
                client.email,
                client.instagram,
                client.birth_date,
                client.notes,
                client.created_at,
                client.updated_at
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_client(&self, id: &str) -> Result<Client, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"),
            params![id],
            client_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("client", id))
    }

    /// List clients by name; `search` matches name, phone or email (case-insensitive).
    pub fn list_clients(&self, search: Option<&str>) -> Result<Vec<Client>, StoreError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE ?1 IS NULL OR LOWER(name) LIKE ?1 OR phone LIKE ?1 OR LOWER(email) LIKE ?1
             ORDER BY name COLLATE NOCASE"
        ))?;
        let clients = stmt
            .query_map(params![pattern], client_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    pub fn update_client(&self, id: &str, input: ClientInput) -> Result<Client, StoreError> {
        let input = input.normalized()?;
        let ts = now();
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE clients SET name = ?2, phone = ?3, email = ?4, instagram = ?5, birth_date = ?6, notes = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![id, input.name, input.phone, input.email, input.instagram, input.birth_date, input.notes, ts],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("client", id));
            }
            // Keep the denormalised name on appointments in sync
            conn.execute(
                "UPDATE appointments SET client_name = ?2 WHERE client_id = ?1",
                params![id, input.name],
            )?;
        }
        self.get_client(id)
    }

    /// Delete a client. Clients with appointments on record can't be deleted.
    pub fn delete_client(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let appointments: i64 = conn.query_row(
            "SELECT COUNT(*) FROM appointments WHERE client_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if appointments > 0 {
            return Err(StoreError::Conflict(format!(
                "client has {appointments} appointment(s); cancel or delete them first"
            )));
        }
        let deleted = conn.execute("DELETE FROM clients WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("client", id));
        }
        info!("Deleted client {}", id);
        Ok(())
    }

    pub fn find_client_by_phone(&self, phone: &str) -> Result<Option<Client>, StoreError> {
        let digits = digits_only(phone);
        if digits.is_empty() {
            return Ok(None);
        }
        let conn = self.conn()?;
        let client = conn
            .query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE phone = ?1 LIMIT 1"),
                params![digits],
                client_from_row,
            )
            .optional()?;
        Ok(client)
    }

    /// Clients reachable over WhatsApp.
    pub fn clients_with_phone(&self) -> Result<Vec<Client>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE phone IS NOT NULL AND phone != '' ORDER BY name COLLATE NOCASE"
        ))?;
        let clients = stmt
            .query_map([], client_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    pub fn client_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, phone: Option<&str>) -> ClientInput {
        ClientInput {
            name: name.to_string(),
            phone: phone.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_normalizes_fields() {
        let db = Database::new().unwrap();
        let client = db
            .create_client(ClientInput {
                name: "  Marina Souza ".to_string(),
                phone: Some("+55 (11) 98765-4321".to_string()),
                email: Some(" marina@example.com ".to_string()),
                instagram: Some("@marina.ink".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(client.name, "Marina Souza");
        assert_eq!(client.phone.as_deref(), Some("5511987654321"));
        assert_eq!(client.email.as_deref(), Some("marina@example.com"));
        assert_eq!(client.instagram.as_deref(), Some("marina.ink"));
        assert_eq!(client.first_name(), "Marina");
        assert_eq!(db.get_client(&client.id).unwrap(), client);
    }

    #[test]
    fn test_blank_name_rejected() {
        let db = Database::new().unwrap();
        let err = db.create_client(input("   ", None)).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_bad_email_rejected() {
        let db = Database::new().unwrap();
        let mut bad = input("Ana", None);
        bad.email = Some("not-an-email".to_string());
        assert!(matches!(db.create_client(bad).unwrap_err(), StoreError::Invalid(_)));
    }

    #[test]
    fn test_search_by_name_and_phone() {
        let db = Database::new().unwrap();
        db.create_client(input("Bruno Lima", Some("11 91234-5678"))).unwrap();
        db.create_client(input("Carla Dias", None)).unwrap();

        assert_eq!(db.list_clients(None).unwrap().len(), 2);
        let found = db.list_clients(Some("bruno")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Bruno Lima");
        assert_eq!(db.list_clients(Some("912345")).unwrap().len(), 1);
        assert!(db.list_clients(Some("zzz")).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let db = Database::new().unwrap();
        let client = db.create_client(input("Davi", None)).unwrap();
        let updated = db.update_client(&client.id, input("Davi Rocha", Some("11999990000"))).unwrap();
        assert_eq!(updated.name, "Davi Rocha");
        assert!(updated.updated_at >= client.updated_at);

        db.delete_client(&client.id).unwrap();
        assert!(matches!(db.get_client(&client.id).unwrap_err(), StoreError::NotFound { .. }));
        assert!(matches!(db.delete_client(&client.id).unwrap_err(), StoreError::NotFound { .. }));
    }

    #[test]
    fn test_update_missing_client() {
        let db = Database::new().unwrap();
        let err = db.update_client("nope", input("X", None)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "client", .. }));
    }

    #[test]
    fn test_find_by_phone() {
        let db = Database::new().unwrap();
        let client = db.create_client(input("Eva", Some("5511988887777"))).unwrap();
        let found = db.find_client_by_phone("+55 11 98888-7777").unwrap().unwrap();
        assert_eq!(found.id, client.id);
        assert!(db.find_client_by_phone("000").unwrap().is_none());
        assert_eq!(db.clients_with_phone().unwrap().len(), 1);
    }
}
