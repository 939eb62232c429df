//! Import a client list exported from the old studio app into inkdesk.db
//!
//! Usage: cargo run --bin import_clients <clients.json> <inkdesk.db>
//!
//! clients.json is a JSON array of client records. Records that carry an
//! `id` keep it, so running the import twice does not duplicate anyone.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use inkdesk::store::{Client, ClientInput, Database};
use inkdesk::text::digits_only;

/// One record of the export. Field names follow the old app's camelCase.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedClient {
    id: Option<String>,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    instagram: Option<String>,
    birth_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ExportedClient {
    fn into_client(self, id: String) -> Client {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Client {
            id,
            name: self.name.trim().to_string(),
            phone: non_empty(self.phone.map(|p| digits_only(&p))),
            email: non_empty(self.email),
            instagram: non_empty(self.instagram).map(|i| i.trim_start_matches('@').to_string()),
            birth_date: self.birth_date,
            notes: non_empty(self.notes),
            created_at,
            updated_at: created_at,
        }
    }

    fn into_input(self) -> ClientInput {
        ClientInput {
            name: self.name,
            phone: self.phone,
            email: self.email,
            instagram: self.instagram,
            birth_date: self.birth_date,
            notes: self.notes,
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <clients.json> <inkdesk.db>", args[0]);
        std::process::exit(1);
    }

    let export_path = Path::new(&args[1]);
    let db_path = Path::new(&args[2]);

    println!("Reading export from {:?}...", export_path);
    let content = match std::fs::read_to_string(export_path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to read export: {e}");
            std::process::exit(1);
        }
    };
    let records: Vec<ExportedClient> = match serde_json::from_str(&content) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Failed to parse export: {e}");
            std::process::exit(1);
        }
    };
    println!("Found {} client records", records.len());

    let db = match Database::open(db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open {:?}: {e}", db_path);
            std::process::exit(1);
        }
    };

    let mut imported = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for record in records {
        if record.name.trim().is_empty() {
            skipped += 1;
            continue;
        }
        let label = record.name.clone();
        let result = match non_empty(record.id.clone()) {
            Some(id) => db.insert_client(&record.into_client(id)),
            None => db.create_client(record.into_input()).map(|_| true),
        };
        match result {
            Ok(true) => imported += 1,
            Ok(false) => skipped += 1,
            Err(e) => {
                eprintln!("  {label}: {e}");
                failed += 1;
            }
        }
    }

    println!("\nImport complete:");
    println!("  Imported: {imported}");
    println!("  Skipped (blank or already present): {skipped}");
    println!("  Failed: {failed}");
}
