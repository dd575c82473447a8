use anyhow::Context;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

/// Document store over a single SQLite table. Documents are JSON objects
/// addressed by (collection, id); queries compare named top-level fields
/// via json_extract.
pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cmp {
    Eq,
    Ge,
    Le,
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub cmp: Cmp,
    pub value: Value,
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            cmp: Cmp::Eq,
            value: value.into(),
        }
    }

    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            cmp: Cmp::Ge,
            value: value.into(),
        }
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            cmp: Cmp::Le,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Order {
    Asc,
    Desc,
}

pub fn open_store(workspace: &Path) -> anyhow::Result<Store> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("schoold.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY(collection, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;

    Ok(Store { conn })
}

impl Store {
    pub fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ? AND id = ?",
                (collection, id),
                |r| r.get(0),
            )
            .optional()?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s).with_context(|| {
                format!("stored document {}/{} is not valid JSON", collection, id)
            })?)),
            None => Ok(None),
        }
    }

    /// Upsert. With merge=true only the top-level fields present in `body`
    /// are overlaid onto the existing document; each overlaid field replaces
    /// the stored value wholesale (a map field is never patched per entry).
    pub fn put(&self, collection: &str, id: &str, body: &Value, merge: bool) -> anyhow::Result<()> {
        if !merge {
            self.conn.execute(
                "INSERT INTO documents(collection, id, body) VALUES(?, ?, ?)
                 ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
                (collection, id, body.to_string()),
            )?;
            return Ok(());
        }

        // Read-modify-write inside one transaction.
        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ? AND id = ?",
                (collection, id),
                |r| r.get(0),
            )
            .optional()?;
        let merged = match existing {
            Some(raw) => {
                let mut base: Value = serde_json::from_str(&raw).with_context(|| {
                    format!("stored document {}/{} is not valid JSON", collection, id)
                })?;
                match (base.as_object_mut(), body.as_object()) {
                    (Some(base_map), Some(patch)) => {
                        for (k, v) in patch {
                            base_map.insert(k.clone(), v.clone());
                        }
                        base
                    }
                    _ => body.clone(),
                }
            }
            None => body.clone(),
        };
        tx.execute(
            "INSERT INTO documents(collection, id, body) VALUES(?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
            (collection, id, merged.to_string()),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a document without a natural key; returns the generated id.
    pub fn add(&self, collection: &str, body: &Value) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.put(collection, &id, body, false)?;
        Ok(id)
    }

    pub fn delete(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "DELETE FROM documents WHERE collection = ? AND id = ?",
            (collection, id),
        )?;
        Ok(())
    }

    /// Equality/range query on top-level fields. Fails if the underlying
    /// SQLite lacks json_extract; callers with a documented fallback scan
    /// the collection via `list` instead.
    pub fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<(&str, Order)>,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<(String, Value)>> {
        let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
        let mut params: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(collection.to_string())];
        for p in predicates {
            let cmp = match p.cmp {
                Cmp::Eq => "=",
                Cmp::Ge => ">=",
                Cmp::Le => "<=",
            };
            sql.push_str(&format!(
                " AND json_extract(body, '$.{}') {} ?",
                p.field, cmp
            ));
            params.push(bind_value(&p.value));
        }
        if let Some((field, order)) = order_by {
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY json_extract(body, '$.{}') {}", field, dir));
        }
        if let Some(n) = limit {
            if n > 0 {
                sql.push_str(&format!(" LIMIT {}", n));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, raw)| {
                let body: Value = serde_json::from_str(&raw).with_context(|| {
                    format!("stored document {}/{} is not valid JSON", collection, id)
                })?;
                Ok((id, body))
            })
            .collect()
    }

    /// Full collection scan, insertion order not guaranteed.
    pub fn list(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM documents WHERE collection = ?")?;
        let rows = stmt
            .query_map([collection], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, raw)| {
                let body: Value = serde_json::from_str(&raw).with_context(|| {
                    format!("stored document {}/{} is not valid JSON", collection, id)
                })?;
                Ok((id, body))
            })
            .collect()
    }
}

fn bind_value(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Store> {
    let conn = Connection::open_in_memory()?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY(collection, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;
    Ok(Store { conn })
}
