//! Catalog tables stored as JSON arrays in the key-value store.
//!
//! Each table lives under `data/<table>.json`. Rows are addressed by a
//! partition field: `itemName` for products, `sectionIndex` for page sections.
//! Partition values compare by their string form so `"2"` and `2` match.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, StorefrontError};
use crate::kv::{self, KvStore};

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    HomePage,
    AboutPage,
    ContactPage,
}

impl Table {
    pub fn all() -> &'static [Table] {
        &[
            Table::Products,
            Table::HomePage,
            Table::AboutPage,
            Table::ContactPage,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::HomePage => "home_page",
            Table::AboutPage => "about_page",
            Table::ContactPage => "contact_page",
        }
    }

    /// Store key holding the table's JSON array.
    pub fn kv_key(&self) -> String {
        format!("data/{}.json", self.as_str())
    }

    pub fn partition_field(&self) -> &'static str {
        match self {
            Table::Products => "itemName",
            _ => "sectionIndex",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StorefrontError::InvalidTable(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// String form of a partition value: strings verbatim, everything else as JSON.
pub fn partition_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_matches(row: &Value, field: &str, key: &str) -> bool {
    row.get(field)
        .map(|v| partition_string(v) == key)
        .unwrap_or(false)
}

pub fn find<'a>(rows: &'a [Value], table: Table, key: &str) -> Option<&'a Value> {
    rows.iter()
        .find(|r| row_matches(r, table.partition_field(), key))
}

/// Replace the row sharing `item`'s partition value, or append it.
pub fn upsert(rows: &mut Vec<Value>, table: Table, item: Value) -> Result<()> {
    let field = table.partition_field();
    let key = item
        .get(field)
        .filter(|v| !v.is_null())
        .map(partition_string)
        .ok_or_else(|| StorefrontError::MissingPartitionKey {
            table: table.to_string(),
            field: field.to_string(),
        })?;
    match rows.iter().position(|r| row_matches(r, field, &key)) {
        Some(i) => rows[i] = item,
        None => rows.push(item),
    }
    Ok(())
}

/// Drop every row whose partition value equals `key`. Returns rows removed.
pub fn remove(rows: &mut Vec<Value>, table: Table, key: &str) -> usize {
    let before = rows.len();
    rows.retain(|r| !row_matches(r, table.partition_field(), key));
    before - rows.len()
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

/// Table-level reads and writes over a [`KvStore`].
#[derive(Clone)]
pub struct CatalogStore {
    kv: Arc<dyn KvStore>,
}

impl CatalogStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// All rows of `table`. A missing or non-array value reads as empty.
    pub async fn load(&self, table: Table) -> Result<Vec<Value>> {
        let value: Option<Value> = kv::get_json(self.kv.as_ref(), &table.kv_key()).await?;
        Ok(match value {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        })
    }

    pub async fn get_item(&self, table: Table, key: &str) -> Result<Option<Value>> {
        let rows = self.load(table).await?;
        Ok(find(&rows, table, key).cloned())
    }

    /// Upsert `item` by its partition value and persist the table.
    pub async fn save_item(&self, table: Table, item: Value) -> Result<()> {
        let mut rows = self.load_for_write(table).await;
        upsert(&mut rows, table, item)?;
        self.store(table, &rows).await
    }

    /// Remove rows matching `key` and persist the table.
    pub async fn delete_item(&self, table: Table, key: &str) -> Result<usize> {
        let mut rows = self.load_for_write(table).await;
        let removed = remove(&mut rows, table, key);
        self.store(table, &rows).await?;
        Ok(removed)
    }

    /// Read before a write is best-effort: a failed read starts from empty.
    async fn load_for_write(&self, table: Table) -> Vec<Value> {
        match self.load(table).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(table = %table, error = %e, "catalog read failed before write");
                Vec::new()
            }
        }
    }

    async fn store(&self, table: Table, rows: &[Value]) -> Result<()> {
        kv::put_json(self.kv.as_ref(), &table.kv_key(), rows, None).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use serde_json::json;

    fn catalog() -> CatalogStore {
        CatalogStore::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn table_names_parse() {
        assert_eq!("products".parse::<Table>().unwrap(), Table::Products);
        assert_eq!("contact_page".parse::<Table>().unwrap(), Table::ContactPage);
        assert!(matches!(
            "users".parse::<Table>(),
            Err(StorefrontError::InvalidTable(_))
        ));
    }

    #[test]
    fn kv_keys_and_partition_fields() {
        assert_eq!(Table::Products.kv_key(), "data/products.json");
        assert_eq!(Table::Products.partition_field(), "itemName");
        assert_eq!(Table::HomePage.partition_field(), "sectionIndex");
    }

    #[test]
    fn numeric_and_string_partition_values_match() {
        let rows = vec![json!({"sectionIndex": 2, "title": "Hours"})];
        assert!(find(&rows, Table::AboutPage, "2").is_some());
        assert!(find(&rows, Table::AboutPage, "3").is_none());
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let mut rows = vec![
            json!({"itemName": "Latte", "price": 4}),
            json!({"itemName": "Mocha", "price": 5}),
        ];
        upsert(
            &mut rows,
            Table::Products,
            json!({"itemName": "Latte", "price": 6}),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["price"], 6);
    }

    #[test]
    fn upsert_appends_new_row() {
        let mut rows = vec![json!({"sectionIndex": "0"})];
        upsert(&mut rows, Table::HomePage, json!({"sectionIndex": 1})).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn upsert_requires_partition_field() {
        let mut rows = Vec::new();
        let err = upsert(&mut rows, Table::Products, json!({"price": 1})).unwrap_err();
        assert!(matches!(err, StorefrontError::MissingPartitionKey { .. }));
        assert!(rows.is_empty());
    }

    #[test]
    fn remove_filters_by_string_form() {
        let mut rows = vec![json!({"sectionIndex": 1}), json!({"sectionIndex": 2})];
        assert_eq!(remove(&mut rows, Table::ContactPage, "1"), 1);
        assert_eq!(rows, vec![json!({"sectionIndex": 2})]);
        assert_eq!(remove(&mut rows, Table::ContactPage, "9"), 0);
    }

    #[tokio::test]
    async fn save_then_get_item() {
        let c = catalog();
        c.save_item(Table::Products, json!({"itemName": "Scone", "price": 3}))
            .await
            .unwrap();
        let item = c.get_item(Table::Products, "Scone").await.unwrap().unwrap();
        assert_eq!(item["price"], 3);
        assert!(c.get_item(Table::Products, "Bagel").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_item_persists() {
        let c = catalog();
        c.save_item(Table::Products, json!({"itemName": "A"}))
            .await
            .unwrap();
        c.save_item(Table::Products, json!({"itemName": "B"}))
            .await
            .unwrap();
        assert_eq!(c.delete_item(Table::Products, "A").await.unwrap(), 1);
        let rows = c.load(Table::Products).await.unwrap();
        assert_eq!(rows, vec![json!({"itemName": "B"})]);
    }

    #[tokio::test]
    async fn non_array_value_loads_as_empty() {
        let c = catalog();
        c.kv()
            .put("data/products.json", br#"{"oops":true}"#, None)
            .await
            .unwrap();
        assert!(c.load(Table::Products).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_table_is_replaced_on_write() {
        let c = catalog();
        c.kv()
            .put("data/home_page.json", b"{{not json", None)
            .await
            .unwrap();
        assert!(c.load(Table::HomePage).await.is_err());
        c.save_item(Table::HomePage, json!({"sectionIndex": 0}))
            .await
            .unwrap();
        assert_eq!(c.load(Table::HomePage).await.unwrap().len(), 1);
    }
}
