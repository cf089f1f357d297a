//! Provider key repository: CRUD operations for the `provider_keys` table.
//!
//! Values stored here are already encrypted; this layer never sees plaintext.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// A raw provider key row from the database.
#[derive(Debug, Clone)]
pub struct ProviderKeyRow {
    pub provider: String,
    pub encrypted_key: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Inserts or replaces the key for a provider.
pub fn upsert(db: &Database, row: &ProviderKeyRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO provider_keys (provider, encrypted_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(provider) DO UPDATE SET
               encrypted_key = ?2,
               updated_at = ?4",
            params![row.provider, row.encrypted_key, row.created_at, row.updated_at],
        )?;
        Ok(())
    })
}

/// Finds the key row for a provider.
pub fn find(db: &Database, provider: &str) -> Result<Option<ProviderKeyRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT provider, encrypted_key, created_at, updated_at
                 FROM provider_keys WHERE provider = ?1",
                params![provider],
                |row| {
                    Ok(ProviderKeyRow {
                        provider: row.get(0)?,
                        encrypted_key: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Deletes the key for a provider. Returns whether a row was removed.
pub fn delete(db: &Database, provider: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM provider_keys WHERE provider = ?1",
            params![provider],
        )?;
        Ok(changed > 0)
    })
}

/// Lists providers that have a stored key, alphabetically.
pub fn list_providers(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT provider FROM provider_keys ORDER BY provider")?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_key(provider: &str, value: &str) -> ProviderKeyRow {
        ProviderKeyRow {
            provider: provider.to_string(),
            encrypted_key: value.to_string(),
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let db = test_db();
        upsert(&db, &sample_key("gemini", "cipher-1")).unwrap();

        let found = find(&db, "gemini").unwrap().unwrap();
        assert_eq!(found.encrypted_key, "cipher-1");
        assert!(find(&db, "mistral").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_key_but_keeps_created_at() {
        let db = test_db();
        upsert(&db, &sample_key("gemini", "cipher-1")).unwrap();

        let mut updated = sample_key("gemini", "cipher-2");
        updated.created_at = "2026-06-01T00:00:00.000000Z".to_string();
        updated.updated_at = "2026-06-01T00:00:00.000000Z".to_string();
        upsert(&db, &updated).unwrap();

        let found = find(&db, "gemini").unwrap().unwrap();
        assert_eq!(found.encrypted_key, "cipher-2");
        assert_eq!(found.created_at, "2026-01-01T00:00:00.000000Z");
        assert_eq!(found.updated_at, "2026-06-01T00:00:00.000000Z");
    }

    #[test]
    fn test_delete_and_list() {
        let db = test_db();
        upsert(&db, &sample_key("mistral", "m")).unwrap();
        upsert(&db, &sample_key("gemini", "g")).unwrap();
        assert_eq!(list_providers(&db).unwrap(), vec!["gemini", "mistral"]);

        assert!(delete(&db, "gemini").unwrap());
        assert!(!delete(&db, "gemini").unwrap());
        assert_eq!(list_providers(&db).unwrap(), vec!["mistral"]);
    }
}
