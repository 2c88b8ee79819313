//! Collection Subtable Engine + Accessors (C9). Child-table DDL lives in
//! [`crate::migration`]; this module owns reading, wholesale replacement,
//! cascade delete, and the live mutable accessor views over `List`/`Set`/
//! `Map` fields.

use std::collections::HashMap;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::metadata::{CollectionFieldDescriptor, CollectionKind, CollectionValue, EntityDescriptor};
use crate::pool::AnyPool;
use crate::value::{bind_arguments, ColumnKind, Value};

fn parent_column(pk_column: &str) -> String {
    format!("parent_{pk_column}")
}

/// Deletes and re-inserts every row for one collection field under
/// `parent_pk` — the "replace all" rule for `update` (§4.9).
pub async fn replace_all(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    field: &CollectionFieldDescriptor,
    parent_pk_column: &str,
    parent_pk: &Value,
    value: &CollectionValue,
) -> Result<()> {
    delete_for_parent(pool, dialect, &field.child_table, parent_pk_column, parent_pk).await?;

    let quote = dialect.quote_char();
    let parent_col = parent_column(parent_pk_column);
    match value {
        CollectionValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let sql = format!(
                    "INSERT INTO {quote}{}{quote} ({quote}{parent_col}{quote}, {quote}value{quote}, {quote}sort_order{quote}) VALUES ({}, {}, {})",
                    field.child_table,
                    dialect.placeholder(1),
                    dialect.placeholder(2),
                    dialect.placeholder(3)
                );
                let args = bind_arguments(&[parent_pk.clone(), item.clone(), Value::I64(i as i64)])?;
                crate::pool::Exec::current(pool).execute(&sql, args).await?;
            }
        }
        CollectionValue::Set(items) => {
            let mut seen: Vec<String> = Vec::new();
            for item in items {
                let fp = item.fingerprint();
                if seen.contains(&fp) {
                    continue;
                }
                seen.push(fp);
                let sql = format!(
                    "INSERT INTO {quote}{}{quote} ({quote}{parent_col}{quote}, {quote}value{quote}) VALUES ({}, {})",
                    field.child_table,
                    dialect.placeholder(1),
                    dialect.placeholder(2)
                );
                let args = bind_arguments(&[parent_pk.clone(), item.clone()])?;
                crate::pool::Exec::current(pool).execute(&sql, args).await?;
            }
        }
        CollectionValue::Map(pairs) => {
            for (k, v) in pairs {
                let sql = format!(
                    "INSERT INTO {quote}{}{quote} ({quote}{parent_col}{quote}, {quote}map_key{quote}, {quote}map_value{quote}) VALUES ({}, {}, {})",
                    field.child_table,
                    dialect.placeholder(1),
                    dialect.placeholder(2),
                    dialect.placeholder(3)
                );
                let args = bind_arguments(&[parent_pk.clone(), k.clone(), v.clone()])?;
                crate::pool::Exec::current(pool).execute(&sql, args).await?;
            }
        }
    }
    Ok(())
}

async fn delete_for_parent(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    child_table: &str,
    parent_pk_column: &str,
    parent_pk: &Value,
) -> Result<()> {
    let quote = dialect.quote_char();
    let parent_col = parent_column(parent_pk_column);
    let sql = format!(
        "DELETE FROM {quote}{child_table}{quote} WHERE {quote}{parent_col}{quote} = {}",
        dialect.placeholder(1)
    );
    let args = bind_arguments(std::slice::from_ref(parent_pk))?;
    crate::pool::Exec::current(pool).execute(&sql, args).await?;
    Ok(())
}

/// Deletes every collection field's child rows for one parent — part of
/// `delete_by_id`/`delete_where` cascade (§4.9 Delete).
pub async fn cascade_delete(pool: &AnyPool, dialect: &dyn Dialect, descriptor: &EntityDescriptor, parent_pk: &Value) -> Result<()> {
    let Some(pk_col) = descriptor.primary_key_column() else { return Ok(()) };
    for field in &descriptor.collection_fields {
        delete_for_parent(pool, dialect, &field.child_table, &pk_col.column_name, parent_pk).await?;
    }
    Ok(())
}

/// Loads one collection field for every parent key in one round-trip via
/// `WHERE parent_<pk> IN (...)`, keyed by each parent's `Value::fingerprint`.
pub async fn load_all(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    field: &CollectionFieldDescriptor,
    parent_pk_column: &str,
    parent_pks: &[Value],
) -> Result<HashMap<String, CollectionValue>> {
    let mut out: HashMap<String, CollectionValue> = HashMap::new();
    if parent_pks.is_empty() {
        return Ok(out);
    }

    let quote = dialect.quote_char();
    let parent_col = parent_column(parent_pk_column);
    let placeholders: Vec<String> = (1..=parent_pks.len()).map(|n| dialect.placeholder(n)).collect();

    let select_cols = match field.kind {
        CollectionKind::List => format!("{quote}{parent_col}{quote}, {quote}value{quote}, {quote}sort_order{quote}"),
        CollectionKind::Set => format!("{quote}{parent_col}{quote}, {quote}value{quote}"),
        CollectionKind::Map => format!("{quote}{parent_col}{quote}, {quote}map_key{quote}, {quote}map_value{quote}"),
    };
    let sql = format!(
        "SELECT {select_cols} FROM {quote}{}{quote} WHERE {quote}{parent_col}{quote} IN ({}) ORDER BY {quote}{parent_col}{quote}{}",
        field.child_table,
        placeholders.join(", "),
        if field.kind == CollectionKind::List { format!(", {quote}sort_order{quote}") } else { String::new() }
    );
    let args = bind_arguments(parent_pks)?;
    let rows = crate::pool::Exec::current(pool).fetch_all(&sql, args).await?;

    use sqlx::Row;
    for row in rows {
        let parent_kind = parent_pk_column_kind(parent_pk_column, parent_pks);
        let parent_value = parent_kind.decode(&row, &parent_col)?;
        let entry = out.entry(parent_value.fingerprint()).or_insert_with(|| empty_collection(field.kind));
        let value = field.element_kind.decode(&row, "value")?;
        match (entry, field.kind) {
            (CollectionValue::List(items), CollectionKind::List) => {
                let _: i64 = row.try_get::<i64, _>("sort_order").unwrap_or(items.len() as i64);
                items.push(value);
            }
            (CollectionValue::Set(items), CollectionKind::Set) => items.push(value),
            (CollectionValue::Map(pairs), CollectionKind::Map) => {
                let key_kind = field.key_kind.unwrap_or(ColumnKind::Str);
                let key = key_kind.decode(&row, "map_key")?;
                pairs.push((key, value));
            }
            _ => unreachable!("field.kind is fixed per descriptor"),
        }
    }
    Ok(out)
}

pub(crate) fn empty_collection(kind: CollectionKind) -> CollectionValue {
    match kind {
        CollectionKind::List => CollectionValue::List(Vec::new()),
        CollectionKind::Set => CollectionValue::Set(Vec::new()),
        CollectionKind::Map => CollectionValue::Map(Vec::new()),
    }
}

fn parent_pk_column_kind(_parent_pk_column: &str, parent_pks: &[Value]) -> ColumnKind {
    match parent_pks.first() {
        Some(Value::Str(_)) => ColumnKind::Str,
        Some(Value::F64(_)) => ColumnKind::F64,
        Some(Value::Bool(_)) => ColumnKind::Bool,
        Some(Value::Bytes(_)) => ColumnKind::Bytes,
        _ => ColumnKind::I64,
    }
}

/// A live mutable view over one `List` field's child table (§4.9 Accessor
/// views). Every operation executes immediately against the child table.
pub struct ListAccessor<'a> {
    pub pool: &'a AnyPool,
    pub dialect: &'a dyn Dialect,
    pub child_table: String,
    pub parent_column: String,
    pub parent_pk: Value,
    pub element_kind: ColumnKind,
}

impl<'a> ListAccessor<'a> {
    pub async fn all(&self) -> Result<Vec<Value>> {
        let quote = self.dialect.quote_char();
        let sql = format!(
            "SELECT {quote}value{quote} FROM {quote}{}{quote} WHERE {quote}{}{quote} = {} ORDER BY {quote}sort_order{quote}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1)
        );
        let args = bind_arguments(std::slice::from_ref(&self.parent_pk))?;
        let rows = crate::pool::Exec::current(self.pool).fetch_all(&sql, args).await?;
        use sqlx::Row;
        rows.iter().map(|r| self.element_kind.decode(r, "value")).collect::<Result<Vec<_>>>()
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.all().await?.len())
    }

    /// Appends to the end, assigning the next densely-packed `sort_order`.
    pub async fn push(&self, value: Value) -> Result<()> {
        let next = self.len().await? as i64;
        self.insert_at(next as usize, value).await
    }

    /// Shifts every row with `sort_order >= index` up by one, then inserts.
    pub async fn insert_at(&self, index: usize, value: Value) -> Result<()> {
        let quote = self.dialect.quote_char();
        let shift_sql = format!(
            "UPDATE {quote}{}{quote} SET {quote}sort_order{quote} = {quote}sort_order{quote} + 1 WHERE {quote}{}{quote} = {} AND {quote}sort_order{quote} >= {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), Value::I64(index as i64)])?;
        crate::pool::Exec::current(self.pool).execute(&shift_sql, args).await?;

        let insert_sql = format!(
            "INSERT INTO {quote}{}{quote} ({quote}{}{quote}, {quote}value{quote}, {quote}sort_order{quote}) VALUES ({}, {}, {})",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), value, Value::I64(index as i64)])?;
        crate::pool::Exec::current(self.pool).execute(&insert_sql, args).await?;
        Ok(())
    }

    /// Deletes the row at `index`, then decrements `sort_order` for every
    /// row above it.
    pub async fn remove_at(&self, index: usize) -> Result<()> {
        let quote = self.dialect.quote_char();
        let delete_sql = format!(
            "DELETE FROM {quote}{}{quote} WHERE {quote}{}{quote} = {} AND {quote}sort_order{quote} = {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), Value::I64(index as i64)])?;
        crate::pool::Exec::current(self.pool).execute(&delete_sql, args).await?;

        let shift_sql = format!(
            "UPDATE {quote}{}{quote} SET {quote}sort_order{quote} = {quote}sort_order{quote} - 1 WHERE {quote}{}{quote} = {} AND {quote}sort_order{quote} > {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), Value::I64(index as i64)])?;
        crate::pool::Exec::current(self.pool).execute(&shift_sql, args).await?;
        Ok(())
    }
}

/// A live mutable view over one `Set` field's child table.
pub struct SetAccessor<'a> {
    pub pool: &'a AnyPool,
    pub dialect: &'a dyn Dialect,
    pub child_table: String,
    pub parent_column: String,
    pub parent_pk: Value,
    pub element_kind: ColumnKind,
}

impl<'a> SetAccessor<'a> {
    pub async fn all(&self) -> Result<Vec<Value>> {
        let quote = self.dialect.quote_char();
        let sql = format!(
            "SELECT {quote}value{quote} FROM {quote}{}{quote} WHERE {quote}{}{quote} = {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1)
        );
        let args = bind_arguments(std::slice::from_ref(&self.parent_pk))?;
        let rows = crate::pool::Exec::current(self.pool).fetch_all(&sql, args).await?;
        use sqlx::Row;
        rows.iter().map(|r| self.element_kind.decode(r, "value")).collect::<Result<Vec<_>>>()
    }

    pub async fn contains(&self, value: &Value) -> Result<bool> {
        Ok(self.all().await?.iter().any(|v| v.fingerprint() == value.fingerprint()))
    }

    /// No-op if `value` is already present (§4.9 Accessor views).
    pub async fn add(&self, value: Value) -> Result<()> {
        if self.contains(&value).await? {
            return Ok(());
        }
        let quote = self.dialect.quote_char();
        let sql = format!(
            "INSERT INTO {quote}{}{quote} ({quote}{}{quote}, {quote}value{quote}) VALUES ({}, {})",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), value])?;
        crate::pool::Exec::current(self.pool).execute(&sql, args).await?;
        Ok(())
    }

    pub async fn remove(&self, value: &Value) -> Result<()> {
        let quote = self.dialect.quote_char();
        let sql = format!(
            "DELETE FROM {quote}{}{quote} WHERE {quote}{}{quote} = {} AND {quote}value{quote} = {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), value.clone()])?;
        crate::pool::Exec::current(self.pool).execute(&sql, args).await?;
        Ok(())
    }
}

/// A live mutable view over one `Map` field's child table.
pub struct MapAccessor<'a> {
    pub pool: &'a AnyPool,
    pub dialect: &'a dyn Dialect,
    pub child_table: String,
    pub parent_column: String,
    pub parent_pk: Value,
    pub key_kind: ColumnKind,
    pub value_kind: ColumnKind,
}

impl<'a> MapAccessor<'a> {
    pub async fn all(&self) -> Result<Vec<(Value, Value)>> {
        let quote = self.dialect.quote_char();
        let sql = format!(
            "SELECT {quote}map_key{quote}, {quote}map_value{quote} FROM {quote}{}{quote} WHERE {quote}{}{quote} = {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1)
        );
        let args = bind_arguments(std::slice::from_ref(&self.parent_pk))?;
        let rows = crate::pool::Exec::current(self.pool).fetch_all(&sql, args).await?;
        use sqlx::Row;
        rows.iter()
            .map(|r| Ok((self.key_kind.decode(r, "map_key")?, self.value_kind.decode(r, "map_value")?)))
            .collect::<Result<Vec<_>>>()
    }

    pub async fn get(&self, key: &Value) -> Result<Option<Value>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .find(|(k, _)| k.fingerprint() == key.fingerprint())
            .map(|(_, v)| v))
    }

    /// Replaces any existing value under `key` (§4.9 Accessor views).
    pub async fn put(&self, key: Value, value: Value) -> Result<()> {
        self.remove(&key).await?;
        let quote = self.dialect.quote_char();
        let sql = format!(
            "INSERT INTO {quote}{}{quote} ({quote}{}{quote}, {quote}map_key{quote}, {quote}map_value{quote}) VALUES ({}, {}, {})",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), key, value])?;
        crate::pool::Exec::current(self.pool).execute(&sql, args).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &Value) -> Result<()> {
        let quote = self.dialect.quote_char();
        let sql = format!(
            "DELETE FROM {quote}{}{quote} WHERE {quote}{}{quote} = {} AND {quote}map_key{quote} = {}",
            self.child_table,
            self.parent_column,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        let args = bind_arguments(&[self.parent_pk.clone(), key.clone()])?;
        crate::pool::Exec::current(self.pool).execute(&sql, args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceConfig;
    use crate::dialect::SqliteDialect;
    use crate::pool::get_pool;

    async fn memory_pool(name: &str) -> AnyPool {
        let config = DataSourceConfig::sqlite_file(format!("file:{name}?mode=memory&cache=shared"));
        get_pool(&config, "").await.expect("pool creation")
    }

    fn list_field(child_table: &str) -> CollectionFieldDescriptor {
        CollectionFieldDescriptor {
            field_name: "tags",
            child_table: child_table.to_string(),
            kind: CollectionKind::List,
            element_kind: ColumnKind::Str,
            key_kind: None,
        }
    }

    fn set_field(child_table: &str) -> CollectionFieldDescriptor {
        CollectionFieldDescriptor {
            field_name: "labels",
            child_table: child_table.to_string(),
            kind: CollectionKind::Set,
            element_kind: ColumnKind::Str,
            key_kind: None,
        }
    }

    fn map_field(child_table: &str) -> CollectionFieldDescriptor {
        CollectionFieldDescriptor {
            field_name: "attrs",
            child_table: child_table.to_string(),
            kind: CollectionKind::Map,
            element_kind: ColumnKind::Str,
            key_kind: Some(ColumnKind::Str),
        }
    }

    async fn create_list_table(pool: &AnyPool, table: &str) {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, parent_id INTEGER NOT NULL, value TEXT NOT NULL, sort_order INTEGER NOT NULL)"
        );
        sqlx::query(&sql).execute(pool).await.expect("create list child table");
    }

    async fn create_set_table(pool: &AnyPool, table: &str) {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, parent_id INTEGER NOT NULL, value TEXT NOT NULL)"
        );
        sqlx::query(&sql).execute(pool).await.expect("create set child table");
    }

    async fn create_map_table(pool: &AnyPool, table: &str) {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, parent_id INTEGER NOT NULL, map_key TEXT NOT NULL, map_value TEXT NOT NULL)"
        );
        sqlx::query(&sql).execute(pool).await.expect("create map child table");
    }

    #[tokio::test]
    async fn replace_all_list_wipes_prior_rows_and_preserves_order() {
        let pool = memory_pool("collection_list_replace").await;
        create_list_table(&pool, "widget_tags").await;
        let field = list_field("widget_tags");
        let parent_pk = Value::I64(1);

        let first = CollectionValue::List(vec![Value::Str("a".into()), Value::Str("b".into())]);
        replace_all(&pool, &SqliteDialect, &field, "id", &parent_pk, &first).await.unwrap();
        let loaded = load_all(&pool, &SqliteDialect, &field, "id", &[parent_pk.clone()]).await.unwrap();
        match &loaded[&parent_pk.fingerprint()] {
            CollectionValue::List(items) => assert_eq!(items, &first_items()),
            _ => panic!("expected list"),
        }

        let second = CollectionValue::List(vec![Value::Str("z".into())]);
        replace_all(&pool, &SqliteDialect, &field, "id", &parent_pk, &second).await.unwrap();
        let loaded = load_all(&pool, &SqliteDialect, &field, "id", &[parent_pk.clone()]).await.unwrap();
        match &loaded[&parent_pk.fingerprint()] {
            CollectionValue::List(items) => assert_eq!(items, &[Value::Str("z".into())]),
            _ => panic!("expected list"),
        }

        fn first_items() -> Vec<Value> {
            vec![Value::Str("a".into()), Value::Str("b".into())]
        }
    }

    #[tokio::test]
    async fn replace_all_set_deduplicates_by_fingerprint() {
        let pool = memory_pool("collection_set_replace").await;
        create_set_table(&pool, "widget_labels").await;
        let field = set_field("widget_labels");
        let parent_pk = Value::I64(7);

        let value = CollectionValue::Set(vec![Value::Str("x".into()), Value::Str("x".into()), Value::Str("y".into())]);
        replace_all(&pool, &SqliteDialect, &field, "id", &parent_pk, &value).await.unwrap();
        let loaded = load_all(&pool, &SqliteDialect, &field, "id", &[parent_pk.clone()]).await.unwrap();
        match &loaded[&parent_pk.fingerprint()] {
            CollectionValue::Set(items) => assert_eq!(items.len(), 2),
            _ => panic!("expected set"),
        }
    }

    #[tokio::test]
    async fn cascade_delete_removes_every_collection_field_for_parent() {
        let pool = memory_pool("collection_cascade_delete").await;
        create_list_table(&pool, "widget_tags_cd").await;
        create_set_table(&pool, "widget_labels_cd").await;

        let list = list_field("widget_tags_cd");
        let set = set_field("widget_labels_cd");
        let parent_pk = Value::I64(3);

        replace_all(&pool, &SqliteDialect, &list, "id", &parent_pk, &CollectionValue::List(vec![Value::Str("a".into())]))
            .await
            .unwrap();
        replace_all(&pool, &SqliteDialect, &set, "id", &parent_pk, &CollectionValue::Set(vec![Value::Str("b".into())]))
            .await
            .unwrap();

        let descriptor = EntityDescriptor {
            entity_name: "Widget",
            table_name: "widget".into(),
            schema: None,
            columns: vec![crate::metadata::ColumnDescriptor {
                field_name: "id",
                column_name: "id".into(),
                kind: ColumnKind::I64,
                sql_type: "BIGINT".into(),
                sqlite_type: "INTEGER".into(),
                length: None,
                nullable: false,
                is_primary_key: true,
                is_secondary_key: false,
                is_auto_key: true,
                is_mutable: false,
                is_synthetic: false,
            }],
            primary_key: Some(0),
            secondary_keys: vec![],
            link_fields: vec![],
            collection_fields: vec![list.clone(), set.clone()],
            migrations: vec![],
            manual_ddl: None,
        };
        cascade_delete(&pool, &SqliteDialect, &descriptor, &parent_pk).await.unwrap();

        let loaded = load_all(&pool, &SqliteDialect, &list, "id", &[parent_pk.clone()]).await.unwrap();
        assert!(loaded.is_empty());
        let loaded = load_all(&pool, &SqliteDialect, &set, "id", &[parent_pk]).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn list_accessor_push_insert_and_remove_are_immediately_visible() {
        let pool = memory_pool("collection_list_accessor").await;
        create_list_table(&pool, "accessor_tags").await;
        let parent_pk = Value::I64(5);
        let accessor = ListAccessor {
            pool: &pool,
            dialect: &SqliteDialect,
            child_table: "accessor_tags".to_string(),
            parent_column: "parent_id".to_string(),
            parent_pk: parent_pk.clone(),
            element_kind: ColumnKind::Str,
        };

        accessor.push(Value::Str("one".into())).await.unwrap();
        accessor.push(Value::Str("two".into())).await.unwrap();
        assert_eq!(accessor.len().await.unwrap(), 2);

        accessor.insert_at(1, Value::Str("middle".into())).await.unwrap();
        let all = accessor.all().await.unwrap();
        assert_eq!(all, vec![Value::Str("one".into()), Value::Str("middle".into()), Value::Str("two".into())]);

        accessor.remove_at(0).await.unwrap();
        let all = accessor.all().await.unwrap();
        assert_eq!(all, vec![Value::Str("middle".into()), Value::Str("two".into())]);
    }

    #[tokio::test]
    async fn set_accessor_add_is_idempotent_and_remove_deletes() {
        let pool = memory_pool("collection_set_accessor").await;
        create_set_table(&pool, "accessor_labels").await;
        let parent_pk = Value::I64(9);
        let accessor = SetAccessor {
            pool: &pool,
            dialect: &SqliteDialect,
            child_table: "accessor_labels".to_string(),
            parent_column: "parent_id".to_string(),
            parent_pk: parent_pk.clone(),
            element_kind: ColumnKind::Str,
        };

        accessor.add(Value::Str("vip".into())).await.unwrap();
        accessor.add(Value::Str("vip".into())).await.unwrap();
        assert_eq!(accessor.all().await.unwrap().len(), 1);
        assert!(accessor.contains(&Value::Str("vip".into())).await.unwrap());

        accessor.remove(&Value::Str("vip".into())).await.unwrap();
        assert!(accessor.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn map_accessor_put_replaces_existing_key() {
        let pool = memory_pool("collection_map_accessor").await;
        create_map_table(&pool, "accessor_attrs").await;
        let parent_pk = Value::I64(11);
        let accessor = MapAccessor {
            pool: &pool,
            dialect: &SqliteDialect,
            child_table: "accessor_attrs".to_string(),
            parent_column: "parent_id".to_string(),
            parent_pk: parent_pk.clone(),
            key_kind: ColumnKind::Str,
            value_kind: ColumnKind::Str,
        };

        accessor.put(Value::Str("color".into()), Value::Str("red".into())).await.unwrap();
        assert_eq!(accessor.get(&Value::Str("color".into())).await.unwrap(), Some(Value::Str("red".into())));

        accessor.put(Value::Str("color".into()), Value::Str("blue".into())).await.unwrap();
        let all = accessor.all().await.unwrap();
        assert_eq!(all, vec![(Value::Str("color".into()), Value::Str("blue".into()))]);

        accessor.remove(&Value::Str("color".into())).await.unwrap();
        assert!(accessor.all().await.unwrap().is_empty());
    }
}
