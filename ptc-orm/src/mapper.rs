//! DataMapper Core (C7): the public, per-entity façade. Orchestrates the
//! dialect (C3), condition/query builder (C4), migration engine (C5),
//! connection pool/transaction manager (C6), link engine (C8), collection
//! engine (C9), and cache layer (C10) behind one handle type per record type.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

use crate::cache::{fingerprint_query, CacheConfig, MapperCache};
use crate::collection;
use crate::config::DataSourceConfig;
use crate::dialect::{dialect_for, Dialect, GeneratedKeysBehavior};
use crate::error::{Error, Result};
use crate::link;
use crate::metadata::{AnyEntity, BundleMap, Entity, EntityDescriptor};
use crate::migration;
use crate::pool::{self, AnyPool, Exec, TxHandle};
use crate::query::{render_condition, render_select, Condition, Join, Query, SelectAs};
use crate::value::{bind_arguments, Value};

/// Construction-time options for a [`DataMapper`] handle.
#[derive(Clone)]
pub struct MapperConfig {
    /// `None` disables both the bean and query caches entirely.
    pub cache: Option<CacheConfig>,
    /// Used only when the data source falls back to SQLite (`enable: false`
    /// or a bare `SqliteFile` path is given), per §6.
    pub fallback_sqlite_path: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig { cache: Some(CacheConfig::default()), fallback_sqlite_path: "ptc_orm.sqlite3".into() }
    }
}

/// One page of a `find_page`/`sort_page` result, with `total` always
/// reflecting the full matching count even when `items` is short or empty
/// (§4.7 "a page beyond the last is an empty list with `total` still
/// reflecting the full count").
#[derive(Debug, Clone)]
pub struct Page<E> {
    pub items: Vec<E>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// A buffered cursor over a `sort_cursor` result. Requires an active
/// transaction to obtain (§5); holds a clone of that transaction's handle
/// only to keep the invariant visible, releasing it on [`Cursor::close`] or
/// `Drop` without itself committing or rolling back anything — the
/// enclosing `transaction { … }` remains sole commit authority.
pub struct Cursor<E> {
    tx: Option<TxHandle>,
    rows: VecDeque<E>,
}

impl<E> Cursor<E> {
    pub fn next(&mut self) -> Option<E> {
        self.rows.pop_front()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn close(mut self) {
        self.tx.take();
    }
}

/// The per-entity handle (C7). Cheaply `Clone`-able: the pool is an
/// `sqlx::Pool` handle and the cache is shared behind `moka`'s own
/// concurrency control.
pub struct DataMapper<E: Entity + Clone> {
    pool: AnyPool,
    dialect: Box<dyn Dialect>,
    cache: Option<MapperCache<E>>,
}

impl<E: Entity + Clone> DataMapper<E> {
    /// Connects (or reuses a cached connection pool for) `source`, ensures
    /// this entity's table, child tables, and link targets exist, and runs
    /// any pending migrations.
    pub async fn new(source: &DataSourceConfig, config: MapperConfig) -> Result<Self> {
        let pool = pool::get_pool(source, &config.fallback_sqlite_path).await?;
        let dialect = dialect_for(source.kind());
        let descriptor = E::descriptor();
        let mut visited = HashSet::new();
        migration::ensure_schema(&descriptor, &pool, dialect.as_ref(), &mut visited).await?;

        let cache = config.cache.as_ref().map(MapperCache::new);
        Ok(DataMapper { pool, dialect, cache })
    }

    fn descriptor(&self) -> Arc<EntityDescriptor> {
        E::descriptor()
    }

    /// The pool, or the calling task's active transaction if one exists
    /// (§5 "Shared-resource policy").
    fn exec(&self) -> Exec<'_> {
        Exec::current(&self.pool)
    }

    // ---- internal read path: cascade projection + collection hydration ----

    async fn fetch_entities(&self, mut query: Query) -> Result<Vec<E>> {
        let descriptor = self.descriptor();
        let mut select_as = Vec::new();
        let mut joins = Vec::new();
        let mut decoders = Vec::new();
        let mut counter = 0usize;
        link::build_cascade_projection(
            &descriptor,
            &descriptor.table_name,
            "",
            self.dialect.as_ref(),
            &mut select_as,
            &mut joins,
            &mut decoders,
            &mut counter,
        );

        query.from = descriptor.table_name.clone();
        query.select_as = select_as.into_iter().map(|(c, a)| SelectAs { column: c, alias: a }).collect();
        query.joins.extend(joins);

        let rendered = render_select(&query, self.dialect.as_ref());
        let args = bind_arguments(&rendered.params)?;
        let rows = self.exec().fetch_all(&rendered.sql, args).await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut bundle = BundleMap::new();
            for (alias, kind) in &decoders {
                bundle.insert(alias.clone(), kind.decode(row, alias)?);
            }
            entities.push(E::from_bundle(&bundle, "")?);
        }

        self.hydrate_collections(&mut entities, &descriptor).await?;
        Ok(entities)
    }

    /// Cache-aware variant of [`Self::fetch_entities`], used by read
    /// operations that accept an arbitrary predicate (§4.10 query cache).
    async fn fetch_entities_cached(&self, query: Query) -> Result<Vec<E>> {
        let Some(cache) = &self.cache else {
            return self.fetch_entities(query).await;
        };

        // Render once up front purely to compute the cache key; the same
        // render happens again inside `fetch_entities` on a miss, which is
        // cheap relative to the round-trip it might save.
        let mut probe = query.clone();
        probe.from = self.descriptor().table_name.clone();
        let rendered = render_select(&probe, self.dialect.as_ref());
        let projection: Vec<String> = probe.select_as.iter().map(|s| s.alias.clone()).collect();
        let key = fingerprint_query(&rendered.sql, &rendered.params, &projection);

        if let Some(hit) = cache.get_query(key).await {
            return Ok((*hit).clone());
        }

        let rows = self.fetch_entities(query).await?;
        cache.put_query(key, Arc::new(rows.clone())).await;
        Ok(rows)
    }

    async fn hydrate_collections(&self, entities: &mut [E], descriptor: &EntityDescriptor) -> Result<()> {
        if descriptor.collection_fields.is_empty() || entities.is_empty() {
            return Ok(());
        }
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "collection fields require a primary key".into()))?;
        let pks: Vec<Value> = entities.iter().filter_map(|e| e.primary_key_value()).collect();

        for field in &descriptor.collection_fields {
            let loaded = collection::load_all(&self.pool, self.dialect.as_ref(), field, &pk_col.column_name, &pks).await?;
            for entity in entities.iter_mut() {
                let value = entity
                    .primary_key_value()
                    .and_then(|pk| loaded.get(&pk.fingerprint()).cloned())
                    .unwrap_or_else(|| collection::empty_collection(field.kind));
                entity.set_collection(field.field_name, value)?;
            }
        }
        Ok(())
    }

    async fn write_collections(&self, descriptor: &EntityDescriptor, entity: &E, pk_value: &Value) -> Result<()> {
        for (field_name, value) in entity.collection_values() {
            let field = descriptor
                .collection_fields
                .iter()
                .find(|f| f.field_name == field_name)
                .ok_or_else(|| Error::UnknownField(field_name.to_string(), descriptor.entity_name))?;
            let pk_col = descriptor
                .primary_key_column()
                .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "collection fields require a primary key".into()))?;
            collection::replace_all(&self.pool, self.dialect.as_ref(), field, &pk_col.column_name, pk_value, &value).await?;
        }
        Ok(())
    }

    // ------------------------------- CRUD -------------------------------

    pub async fn insert(&self, entity: &mut E) -> Result<()> {
        self.insert_and_get_key(entity).await?;
        Ok(())
    }

    pub async fn insert_and_get_key(&self, entity: &mut E) -> Result<i64> {
        let descriptor = self.descriptor();
        link::cascade_write_links(entity, &self.pool, self.dialect.as_ref()).await?;

        let columns = entity.to_columns();
        let pk_value = link::insert_columns(&descriptor, &columns, &self.pool, self.dialect.as_ref()).await?;
        if let Some(pk_col) = descriptor.primary_key_column() {
            if !pk_col.is_synthetic {
                entity.set_column(&pk_col.column_name, pk_value.clone())?;
            }
        }
        self.write_collections(&descriptor, entity, &pk_value).await?;

        if let Some(cache) = &self.cache {
            cache.clear_query_cache();
        }
        log::debug!("inserted row into `{}`", descriptor.table_name);
        pk_value
            .as_i64()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "primary key is not an integer".into()))
    }

    pub async fn find_by_id(&self, pk: &Value) -> Result<Option<E>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get_bean(pk).await {
                return Ok(Some((*hit).clone()));
            }
        }

        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "find_by_id requires a primary key".into()))?;
        let query = Query::from(descriptor.table_name.clone()).where_(Condition::eq(pk_col.column_name.clone(), pk.clone()));
        let found = self.fetch_entities(query).await?.into_iter().next();

        if let (Some(cache), Some(entity)) = (&self.cache, &found) {
            cache.put_bean(pk, Arc::new(entity.clone())).await;
        }
        Ok(found)
    }

    pub async fn find_all(&self, pred: Option<Condition>) -> Result<Vec<E>> {
        let mut query = Query::from(self.descriptor().table_name.clone());
        if let Some(pred) = pred {
            query = query.where_(pred);
        }
        self.fetch_entities_cached(query).await
    }

    pub async fn update(&self, entity: &mut E) -> Result<()> {
        let descriptor = self.descriptor();
        let pk_value = entity
            .primary_key_value()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "update requires a primary key value".into()))?;

        link::cascade_write_links(entity, &self.pool, self.dialect.as_ref()).await?;
        let columns = entity.to_columns();
        link::update_columns(&descriptor, &columns, &self.pool, self.dialect.as_ref(), pk_value.clone()).await?;
        self.write_collections(&descriptor, entity, &pk_value).await?;

        if let Some(cache) = &self.cache {
            cache.evict_bean(&pk_value).await;
            cache.clear_query_cache();
        }
        log::debug!("updated row in `{}`", descriptor.table_name);
        Ok(())
    }

    pub async fn exists(&self, pk: &Value) -> Result<bool> {
        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "exists requires a primary key".into()))?;
        link::row_exists(&self.pool, self.dialect.as_ref(), &descriptor, &pk_col.column_name, pk).await
    }

    pub async fn exists_where(&self, pred: Condition) -> Result<bool> {
        Ok(self.count(Some(pred)).await? > 0)
    }

    pub async fn delete_by_id(&self, pk: &Value) -> Result<()> {
        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "delete_by_id requires a primary key".into()))?;

        collection::cascade_delete(&self.pool, self.dialect.as_ref(), &descriptor, pk).await?;

        let quote = self.dialect.quote_char();
        let sql = format!(
            "DELETE FROM {} WHERE {quote}{}{quote} = {}",
            descriptor.quoted_table(quote),
            pk_col.column_name,
            self.dialect.placeholder(1)
        );
        let args = bind_arguments(std::slice::from_ref(pk))?;
        self.exec().execute(&sql, args).await?;

        if let Some(cache) = &self.cache {
            cache.evict_bean(pk).await;
            cache.clear_query_cache();
        }
        log::debug!("deleted row from `{}`", descriptor.table_name);
        Ok(())
    }

    pub async fn delete_where(&self, pred: Condition) -> Result<u64> {
        let descriptor = self.descriptor();
        if !descriptor.collection_fields.is_empty() {
            if let Some(pk_col) = descriptor.primary_key_column() {
                let select = Query::from(descriptor.table_name.clone())
                    .rows([pk_col.column_name.clone()])
                    .where_(pred.clone());
                let rendered = render_select(&select, self.dialect.as_ref());
                let args = bind_arguments(&rendered.params)?;
                let rows = self.exec().fetch_all(&rendered.sql, args).await?;
                for row in &rows {
                    let pk_value = pk_col.kind.decode(row, &pk_col.column_name)?;
                    collection::cascade_delete(&self.pool, self.dialect.as_ref(), &descriptor, &pk_value).await?;
                }
            }
        }

        let quote = self.dialect.quote_char();
        let rendered = render_condition(&pred, self.dialect.as_ref());
        let sql = format!("DELETE FROM {} WHERE {}", descriptor.quoted_table(quote), rendered.sql);
        let args = bind_arguments(&rendered.params)?;
        let result = self.exec().execute(&sql, args).await?;

        if let Some(cache) = &self.cache {
            cache.clear_all();
        }
        Ok(result.rows_affected())
    }

    // ------------------------------ Keyed -------------------------------

    /// Builds an AND-combined equality predicate over the primary key plus
    /// any secondary keys, reading the compared values off `probe`.
    fn key_condition(&self, probe: &E) -> Result<Condition> {
        let descriptor = self.descriptor();
        let mut key_cols = Vec::new();
        key_cols.extend(descriptor.primary_key_column());
        key_cols.extend(descriptor.secondary_key_columns());
        if key_cols.is_empty() {
            return Err(Error::Descriptor(descriptor.entity_name, "no key columns declared".into()));
        }

        let columns = probe.to_columns();
        let locator = descriptor.locate_key_values(&key_cols, &columns)?;
        let mut cond: Option<Condition> = None;
        for (column_name, value) in locator {
            let clause = Condition::eq(column_name, value);
            cond = Some(match cond {
                Some(existing) => existing.and(clause),
                None => clause,
            });
        }
        Ok(cond.expect("key_cols checked non-empty above"))
    }

    pub async fn find_by_key(&self, probe: &E) -> Result<Option<E>> {
        let cond = self.key_condition(probe)?;
        let query = Query::from(self.descriptor().table_name.clone()).where_(cond);
        Ok(self.fetch_entities(query).await?.into_iter().next())
    }

    pub async fn exists_by_key(&self, probe: &E) -> Result<bool> {
        let cond = self.key_condition(probe)?;
        self.exists_where(cond).await
    }

    /// Single-row invalidation (§4.10), unlike `delete_where`'s clear-all —
    /// looks the row up by key first so it can evict exactly that bean.
    pub async fn delete_by_key(&self, probe: &E) -> Result<()> {
        let cond = self.key_condition(probe)?;
        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "delete_by_key requires a primary key".into()))?;

        let select = Query::from(descriptor.table_name.clone()).rows([pk_col.column_name.clone()]).where_(cond);
        let rendered = render_select(&select, self.dialect.as_ref());
        let args = bind_arguments(&rendered.params)?;
        let rows = self.exec().fetch_all(&rendered.sql, args).await?;
        let Some(row) = rows.first() else {
            return Ok(());
        };
        let pk_value = pk_col.kind.decode(row, &pk_col.column_name)?;
        self.delete_by_id(&pk_value).await
    }

    // ------------------------------ Rowid --------------------------------

    pub async fn find_by_row_id(&self, row_id: i64) -> Result<Option<E>> {
        let descriptor = self.descriptor();
        descriptor
            .primary_key_column()
            .filter(|c| c.is_auto_key)
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "no auto-increment row id column".into()))?;
        self.find_by_id(&Value::I64(row_id)).await
    }

    pub async fn delete_by_row_id(&self, row_id: i64) -> Result<()> {
        self.delete_by_id(&Value::I64(row_id)).await
    }

    // ------------------------------ Batch ---------------------------------

    /// Inserts every row in one multi-row `INSERT`, cascading link writes
    /// per entity first. The generated-key list is subject to the backend's
    /// [`GeneratedKeysBehavior`] — SQLite reports only its last assigned key
    /// regardless of batch size (§9 Open Questions).
    pub async fn insert_batch(&self, entities: &mut [E]) -> Result<Vec<i64>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let descriptor = self.descriptor();
        for entity in entities.iter_mut() {
            link::cascade_write_links(entity, &self.pool, self.dialect.as_ref()).await?;
        }

        let quote = self.dialect.quote_char();
        let sample = entities[0].to_columns();
        let writable_names: Vec<&'static str> = sample
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !descriptor.column(name).map(|c| c.is_auto_key).unwrap_or(false))
            .collect();

        let mut values = Vec::new();
        let mut row_tuples = Vec::new();
        let mut n = 0usize;
        for entity in entities.iter() {
            let cols = entity.to_columns();
            let mut placeholders = Vec::with_capacity(writable_names.len());
            for name in &writable_names {
                let value = cols.iter().find(|(c, _)| c == name).map(|(_, v)| v.clone()).unwrap_or(Value::Null);
                n += 1;
                placeholders.push(self.dialect.placeholder(n));
                values.push(value);
            }
            row_tuples.push(format!("({})", placeholders.join(", ")));
        }

        let col_list: Vec<String> = writable_names
            .iter()
            .map(|name| {
                let column_name = descriptor.column(name).expect("filtered above").column_name.as_str();
                format!("{quote}{column_name}{quote}")
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            descriptor.quoted_table(quote),
            col_list.join(", "),
            row_tuples.join(", ")
        );
        let args = bind_arguments(&values)?;
        let result = self.exec().execute(&sql, args).await?;

        let keys: Vec<i64> = match descriptor.primary_key_column() {
            Some(pk_col) if pk_col.is_auto_key => {
                let last = result.last_insert_id().unwrap_or_default();
                match self.dialect.generated_keys_behavior() {
                    GeneratedKeysBehavior::AllRows => {
                        let first = last - entities.len() as i64 + 1;
                        (first..=last).collect()
                    }
                    GeneratedKeysBehavior::LastRowOnly => vec![last],
                }
            }
            Some(_) => entities.iter().filter_map(|e| e.primary_key_value()).filter_map(|v| v.as_i64()).collect(),
            None => Vec::new(),
        };

        if let (Some(pk_col), GeneratedKeysBehavior::AllRows) =
            (descriptor.primary_key_column(), self.dialect.generated_keys_behavior())
        {
            if pk_col.is_auto_key && !pk_col.is_synthetic {
                for (entity, key) in entities.iter_mut().zip(keys.iter()) {
                    entity.set_column(&pk_col.column_name, Value::I64(*key))?;
                }
            }
        }

        for (entity, key) in entities.iter().zip(keys.iter()) {
            self.write_collections(&descriptor, entity, &Value::I64(*key)).await?;
        }

        if let Some(cache) = &self.cache {
            cache.clear_query_cache();
        }
        Ok(keys)
    }

    pub async fn update_batch(&self, entities: &mut [E]) -> Result<()> {
        let descriptor = self.descriptor();
        for entity in entities.iter_mut() {
            let pk_value = entity
                .primary_key_value()
                .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "update_batch requires primary keys".into()))?;
            link::cascade_write_links(entity, &self.pool, self.dialect.as_ref()).await?;
            let columns = entity.to_columns();
            link::update_columns(&descriptor, &columns, &self.pool, self.dialect.as_ref(), pk_value.clone()).await?;
            self.write_collections(&descriptor, entity, &pk_value).await?;
        }
        if let Some(cache) = &self.cache {
            cache.clear_all();
        }
        Ok(())
    }

    pub async fn find_by_ids(&self, pks: &[Value]) -> Result<Vec<E>> {
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "find_by_ids requires a primary key".into()))?;
        let query = Query::from(descriptor.table_name.clone())
            .where_(Condition::in_(pk_col.column_name.clone(), pks.to_vec()));
        self.fetch_entities(query).await
    }

    pub async fn delete_by_ids(&self, pks: &[Value]) -> Result<u64> {
        if pks.is_empty() {
            return Ok(0);
        }
        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "delete_by_ids requires a primary key".into()))?;
        for pk in pks {
            collection::cascade_delete(&self.pool, self.dialect.as_ref(), &descriptor, pk).await?;
        }

        let quote = self.dialect.quote_char();
        let rendered = render_condition(&Condition::in_(pk_col.column_name.clone(), pks.to_vec()), self.dialect.as_ref());
        let sql = format!("DELETE FROM {} WHERE {}", descriptor.quoted_table(quote), rendered.sql);
        let args = bind_arguments(&rendered.params)?;
        let result = self.exec().execute(&sql, args).await?;

        if let Some(cache) = &self.cache {
            cache.clear_all();
        }
        Ok(result.rows_affected())
    }

    pub async fn upsert_batch(&self, entities: &mut [E]) -> Result<()> {
        let descriptor = self.descriptor();
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "upsert_batch requires a primary key".into()))?;
        for entity in entities.iter_mut() {
            let existing_pk = entity.primary_key_value();
            let exists = match &existing_pk {
                Some(pk) if !pk.is_null() => {
                    link::row_exists(&self.pool, self.dialect.as_ref(), &descriptor, &pk_col.column_name, pk).await?
                }
                _ => false,
            };
            if exists {
                self.update(entity).await?;
            } else {
                self.insert(entity).await?;
            }
        }
        Ok(())
    }

    // ------------------------- Count/Sort/Page/Cursor ---------------------

    pub async fn count(&self, pred: Option<Condition>) -> Result<i64> {
        let descriptor = self.descriptor();
        let quote = self.dialect.quote_char();
        let (where_sql, params) = match &pred {
            Some(cond) => {
                let r = render_condition(cond, self.dialect.as_ref());
                (format!(" WHERE {}", r.sql), r.params)
            }
            None => (String::new(), Vec::new()),
        };
        let sql = format!("SELECT COUNT(1) FROM {}{where_sql}", descriptor.quoted_table(quote));
        let args = bind_arguments(&params)?;
        let rows = self.exec().fetch_all(&sql, args).await?;
        Ok(rows.first().and_then(|r| r.try_get::<i64, _>(0).ok()).unwrap_or(0))
    }

    /// `ORDER BY col ASC LIMIT n`; ties fall back to backend default order
    /// (§4.7 "Sort/limit semantics").
    pub async fn sort(&self, column: &str, n: i64) -> Result<Vec<E>> {
        let query = Query::from(self.descriptor().table_name.clone()).order_by_asc(column).limit(n);
        self.fetch_entities_cached(query).await
    }

    pub async fn sort_descending(&self, column: &str, n: i64) -> Result<Vec<E>> {
        let query = Query::from(self.descriptor().table_name.clone()).order_by_desc(column).limit(n);
        self.fetch_entities_cached(query).await
    }

    pub async fn find_page(&self, page: i64, size: i64) -> Result<Page<E>> {
        let total = self.count(None).await?;
        let offset = (page - 1).max(0) * size;
        let query = Query::from(self.descriptor().table_name.clone()).limit(size).offset(offset);
        let items = self.fetch_entities_cached(query).await?;
        Ok(Page { items, total, page, page_size: size })
    }

    pub async fn sort_page(&self, column: &str, ascending: bool, page: i64, size: i64) -> Result<Page<E>> {
        let total = self.count(None).await?;
        let offset = (page - 1).max(0) * size;
        let mut query = Query::from(self.descriptor().table_name.clone());
        query = if ascending { query.order_by_asc(column) } else { query.order_by_desc(column) };
        query = query.limit(size).offset(offset);
        let items = self.fetch_entities_cached(query).await?;
        Ok(Page { items, total, page, page_size: size })
    }

    /// Requires an active transaction on the calling task (§5); fails with
    /// [`Error::CursorWithoutTransaction`] otherwise.
    pub async fn sort_cursor(&self, column: &str, ascending: bool) -> Result<Cursor<E>> {
        let tx = pool::require_current_transaction()?;
        let mut query = Query::from(self.descriptor().table_name.clone());
        query = if ascending { query.order_by_asc(column) } else { query.order_by_desc(column) };
        let rows = self.fetch_entities(query).await?;
        Ok(Cursor { tx: Some(tx), rows: rows.into() })
    }

    // ------------------------------ Custom SQL -----------------------------

    pub async fn query(&self, query: Query) -> Result<Vec<E>> {
        self.fetch_entities(query).await
    }

    pub async fn query_one(&self, query: Query) -> Result<Option<E>> {
        Ok(self.fetch_entities(query).await?.into_iter().next())
    }

    pub async fn raw_query(&self, sql: &str, params: &[Value]) -> Result<Vec<BundleMap>> {
        let args = bind_arguments(params)?;
        let rows = self.exec().fetch_all(sql, args).await?;
        rows.iter().map(decode_bundle_row).collect()
    }

    pub async fn raw_update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let args = bind_arguments(params)?;
        let result = self.exec().execute(sql, args).await?;
        if let Some(cache) = &self.cache {
            cache.clear_all();
        }
        Ok(result.rows_affected())
    }

    /// Distinct name from [`Self::raw_update`] for call-site clarity (§4.7);
    /// invalidation is identical.
    pub async fn raw_delete(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.raw_update(sql, params).await
    }

    // -------------------------------- Join ----------------------------------

    pub fn join(&self) -> JoinQuery<'_, E> {
        JoinQuery { mapper: self, query: Query::from(self.descriptor().table_name.clone()) }
    }

    // ---------------------------- Accessor views ----------------------------

    pub fn list_of(&self, field_name: &str, parent_pk: Value) -> Result<collection::ListAccessor<'_>> {
        let descriptor = self.descriptor();
        let field = descriptor
            .collection_fields
            .iter()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| Error::UnknownField(field_name.to_string(), descriptor.entity_name))?;
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "collection fields require a primary key".into()))?;
        Ok(collection::ListAccessor {
            pool: &self.pool,
            dialect: self.dialect.as_ref(),
            child_table: field.child_table.clone(),
            parent_column: format!("parent_{}", pk_col.column_name),
            parent_pk,
            element_kind: field.element_kind,
        })
    }

    pub fn set_of(&self, field_name: &str, parent_pk: Value) -> Result<collection::SetAccessor<'_>> {
        let descriptor = self.descriptor();
        let field = descriptor
            .collection_fields
            .iter()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| Error::UnknownField(field_name.to_string(), descriptor.entity_name))?;
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "collection fields require a primary key".into()))?;
        Ok(collection::SetAccessor {
            pool: &self.pool,
            dialect: self.dialect.as_ref(),
            child_table: field.child_table.clone(),
            parent_column: format!("parent_{}", pk_col.column_name),
            parent_pk,
            element_kind: field.element_kind,
        })
    }

    pub fn map_of(&self, field_name: &str, parent_pk: Value) -> Result<collection::MapAccessor<'_>> {
        let descriptor = self.descriptor();
        let field = descriptor
            .collection_fields
            .iter()
            .find(|f| f.field_name == field_name)
            .ok_or_else(|| Error::UnknownField(field_name.to_string(), descriptor.entity_name))?;
        let pk_col = descriptor
            .primary_key_column()
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "collection fields require a primary key".into()))?;
        let key_kind = field
            .key_kind
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "not a Map field".into()))?;
        Ok(collection::MapAccessor {
            pool: &self.pool,
            dialect: self.dialect.as_ref(),
            child_table: field.child_table.clone(),
            parent_column: format!("parent_{}", pk_col.column_name),
            parent_pk,
            key_kind,
            value_kind: field.element_kind,
        })
    }

    // ---------------------------- Transaction -------------------------------

    pub async fn transaction<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(TxHandle) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        pool::transaction(&self.pool, f).await
    }
}

/// The `join().execute()` entry point (§4.7): an arbitrary multi-table
/// query whose result rows are untyped `BundleMap`s, not `E` instances.
pub struct JoinQuery<'a, E: Entity + Clone> {
    mapper: &'a DataMapper<E>,
    query: Query,
}

impl<'a, E: Entity + Clone> JoinQuery<'a, E> {
    pub fn join(mut self, join: Join) -> Self {
        self.query = self.query.join(join);
        self
    }

    pub fn where_(mut self, cond: Condition) -> Self {
        self.query = self.query.where_(cond);
        self
    }

    pub fn select_as(mut self, pairs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.query = self.query.select_as(pairs);
        self
    }

    pub fn order_by_asc(mut self, col: impl Into<String>) -> Self {
        self.query = self.query.order_by_asc(col);
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.query = self.query.limit(n);
        self
    }

    pub async fn execute(self) -> Result<Vec<BundleMap>> {
        let rendered = render_select(&self.query, self.mapper.dialect.as_ref());
        let args = bind_arguments(&rendered.params)?;
        let rows = self.mapper.exec().fetch_all(&rendered.sql, args).await?;
        rows.iter().map(decode_bundle_row).collect()
    }
}

/// Decodes every column of an arbitrary (non-entity-shaped) row into a
/// [`BundleMap`], inferring the [`crate::value::ColumnKind`] from the
/// backend-reported type name — used only by the untyped escape hatches
/// (`join().execute()`, `raw_query`) where no [`EntityDescriptor`] exists to
/// consult.
fn decode_bundle_row(row: &AnyRow) -> Result<BundleMap> {
    let mut bundle = BundleMap::new();
    for col in row.columns() {
        let type_name = col.type_info().name().to_uppercase();
        let value = if type_name.contains("BOOL") {
            row.try_get::<Option<bool>, _>(col.ordinal()).map_err(Error::Database)?.map(Value::Bool)
        } else if type_name.contains("INT") {
            row.try_get::<Option<i64>, _>(col.ordinal()).map_err(Error::Database)?.map(Value::I64)
        } else if type_name.contains("REAL") || type_name.contains("DOUBLE") || type_name.contains("FLOAT") || type_name.contains("NUMERIC") || type_name.contains("DECIMAL") {
            row.try_get::<Option<f64>, _>(col.ordinal()).map_err(Error::Database)?.map(Value::F64)
        } else if type_name.contains("BLOB") || type_name.contains("BYTEA") {
            row.try_get::<Option<Vec<u8>>, _>(col.ordinal()).map_err(Error::Database)?.map(Value::Bytes)
        } else {
            row.try_get::<Option<String>, _>(col.ordinal()).map_err(Error::Database)?.map(Value::Str)
        }
        .unwrap_or(Value::Null);
        bundle.insert(col.name().to_string(), value);
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnDescriptor, CollectionValue};
    use crate::value::ColumnKind;
    use once_cell::sync::OnceCell;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: i64,
        name: String,
    }

    impl Entity for Widget {
        fn descriptor() -> Arc<EntityDescriptor> {
            static DESCRIPTOR: OnceCell<Arc<EntityDescriptor>> = OnceCell::new();
            DESCRIPTOR
                .get_or_init(|| {
                    Arc::new(EntityDescriptor {
                        entity_name: "Widget",
                        table_name: "widget".into(),
                        schema: None,
                        columns: vec![
                            ColumnDescriptor {
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
                            },
                            ColumnDescriptor {
                                field_name: "name",
                                column_name: "name".into(),
                                kind: ColumnKind::Str,
                                sql_type: "VARCHAR".into(),
                                sqlite_type: "TEXT".into(),
                                length: Some(64),
                                nullable: false,
                                is_primary_key: false,
                                is_secondary_key: false,
                                is_auto_key: false,
                                is_mutable: true,
                                is_synthetic: false,
                            },
                        ],
                        primary_key: Some(0),
                        secondary_keys: vec![],
                        link_fields: vec![],
                        collection_fields: vec![],
                        migrations: vec![],
                        manual_ddl: None,
                    })
                })
                .clone()
        }

        fn to_columns(&self) -> Vec<(&'static str, Value)> {
            vec![("id", Value::I64(self.id)), ("name", Value::Str(self.name.clone()))]
        }

        fn from_bundle(bundle: &BundleMap, prefix: &str) -> Result<Self> {
            let id = bundle
                .get(&format!("{prefix}id"))
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::Codec("id".into(), "missing".into()))?;
            let name = bundle
                .get(&format!("{prefix}name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Widget { id, name })
        }

        fn set_column(&mut self, column: &str, value: Value) -> Result<()> {
            match column {
                "id" => self.id = value.as_i64().unwrap_or_default(),
                "name" => self.name = value.as_str().unwrap_or_default().to_string(),
                _ => return Err(Error::UnknownField(column.to_string(), "Widget")),
            }
            Ok(())
        }

        fn primary_key_value(&self) -> Option<Value> {
            Some(Value::I64(self.id))
        }

        fn linked_entities_mut(&mut self) -> Vec<(&'static str, Option<&mut dyn AnyEntity>)> {
            Vec::new()
        }

        fn collection_values(&self) -> Vec<(&'static str, CollectionValue)> {
            Vec::new()
        }

        fn set_collection(&mut self, field_name: &str, _value: CollectionValue) -> Result<()> {
            Err(Error::UnknownField(field_name.to_string(), "Widget"))
        }
    }

    async fn mapper() -> DataMapper<Widget> {
        let source = DataSourceConfig::sqlite_file(format!("file:mapper_test_{}?mode=memory&cache=shared", uuid_like()));
        DataMapper::new(&source, MapperConfig { cache: Some(CacheConfig::default()), fallback_sqlite_path: String::new() })
            .await
            .expect("mapper construction")
    }

    fn uuid_like() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    #[tokio::test]
    async fn insert_and_find_by_id_round_trip() {
        let mapper = mapper().await;
        let mut widget = Widget { id: 0, name: "bolt".into() };
        mapper.insert(&mut widget).await.expect("insert");
        assert!(widget.id > 0);

        let found = mapper.find_by_id(&Value::I64(widget.id)).await.expect("find");
        assert_eq!(found, Some(widget));
    }

    #[tokio::test]
    async fn update_changes_only_mutable_columns() {
        let mapper = mapper().await;
        let mut widget = Widget { id: 0, name: "bolt".into() };
        mapper.insert(&mut widget).await.expect("insert");
        let original_id = widget.id;

        widget.name = "renamed-bolt".into();
        mapper.update(&mut widget).await.expect("update");

        let found = mapper.find_by_id(&Value::I64(original_id)).await.expect("find").expect("present");
        assert_eq!(found.id, original_id);
        assert_eq!(found.name, "renamed-bolt");
    }

    #[tokio::test]
    async fn delete_by_id_removes_row() {
        let mapper = mapper().await;
        let mut widget = Widget { id: 0, name: "bolt".into() };
        mapper.insert(&mut widget).await.expect("insert");

        mapper.delete_by_id(&Value::I64(widget.id)).await.expect("delete");
        assert_eq!(mapper.find_by_id(&Value::I64(widget.id)).await.expect("find"), None);
    }

    #[tokio::test]
    async fn count_reflects_predicate() {
        let mapper = mapper().await;
        for name in ["a", "b", "c"] {
            let mut widget = Widget { id: 0, name: name.into() };
            mapper.insert(&mut widget).await.expect("insert");
        }
        assert_eq!(mapper.count(None).await.expect("count"), 3);
        assert_eq!(mapper.count(Some(Condition::eq("name", "b"))).await.expect("count"), 1);
    }

    /// S2's shape: `username` is the declared primary key but is *not*
    /// unique by itself — `server` is a `@Key` secondary key, so three rows
    /// can legitimately share a `username`. The manual DDL below skips the
    /// literal SQL `PRIMARY KEY` constraint the auto-generated `CREATE
    /// TABLE` would otherwise put on `username` alone, which is exactly the
    /// shape that must stay writable for this scenario.
    #[derive(Debug, Clone, PartialEq)]
    struct PlayerHome {
        username: String,
        server: String,
        world: String,
    }

    impl Entity for PlayerHome {
        fn descriptor() -> Arc<EntityDescriptor> {
            static DESCRIPTOR: OnceCell<Arc<EntityDescriptor>> = OnceCell::new();
            DESCRIPTOR
                .get_or_init(|| {
                    Arc::new(EntityDescriptor {
                        entity_name: "PlayerHome",
                        table_name: "player_home".into(),
                        schema: None,
                        columns: vec![
                            ColumnDescriptor {
                                field_name: "username",
                                column_name: "username".into(),
                                kind: ColumnKind::Str,
                                sql_type: "VARCHAR".into(),
                                sqlite_type: "TEXT".into(),
                                length: Some(64),
                                nullable: false,
                                is_primary_key: true,
                                is_secondary_key: false,
                                is_auto_key: false,
                                is_mutable: false,
                                is_synthetic: false,
                            },
                            ColumnDescriptor {
                                field_name: "server",
                                column_name: "server".into(),
                                kind: ColumnKind::Str,
                                sql_type: "VARCHAR".into(),
                                sqlite_type: "TEXT".into(),
                                length: Some(64),
                                nullable: false,
                                is_primary_key: false,
                                is_secondary_key: true,
                                is_auto_key: false,
                                is_mutable: false,
                                is_synthetic: false,
                            },
                            ColumnDescriptor {
                                field_name: "world",
                                column_name: "world".into(),
                                kind: ColumnKind::Str,
                                sql_type: "VARCHAR".into(),
                                sqlite_type: "TEXT".into(),
                                length: Some(64),
                                nullable: false,
                                is_primary_key: false,
                                is_secondary_key: false,
                                is_auto_key: false,
                                is_mutable: true,
                                is_synthetic: false,
                            },
                        ],
                        primary_key: Some(0),
                        secondary_keys: vec![1],
                        link_fields: vec![],
                        collection_fields: vec![],
                        migrations: vec![],
                        manual_ddl: Some(vec![
                            "CREATE TABLE IF NOT EXISTS `player_home` (`username` TEXT NOT NULL, `server` TEXT NOT NULL, `world` TEXT NOT NULL)".into(),
                        ]),
                    })
                })
                .clone()
        }

        fn to_columns(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("username", Value::Str(self.username.clone())),
                ("server", Value::Str(self.server.clone())),
                ("world", Value::Str(self.world.clone())),
            ]
        }

        fn from_bundle(bundle: &BundleMap, prefix: &str) -> Result<Self> {
            let username = bundle
                .get(&format!("{prefix}username"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let server = bundle
                .get(&format!("{prefix}server"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let world = bundle
                .get(&format!("{prefix}world"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(PlayerHome { username, server, world })
        }

        fn set_column(&mut self, column: &str, value: Value) -> Result<()> {
            match column {
                "username" => self.username = value.as_str().unwrap_or_default().to_string(),
                "server" => self.server = value.as_str().unwrap_or_default().to_string(),
                "world" => self.world = value.as_str().unwrap_or_default().to_string(),
                _ => return Err(Error::UnknownField(column.to_string(), "PlayerHome")),
            }
            Ok(())
        }

        fn primary_key_value(&self) -> Option<Value> {
            Some(Value::Str(self.username.clone()))
        }

        fn linked_entities_mut(&mut self) -> Vec<(&'static str, Option<&mut dyn AnyEntity>)> {
            Vec::new()
        }

        fn collection_values(&self) -> Vec<(&'static str, CollectionValue)> {
            Vec::new()
        }

        fn set_collection(&mut self, field_name: &str, _value: CollectionValue) -> Result<()> {
            Err(Error::UnknownField(field_name.to_string(), "PlayerHome"))
        }
    }

    async fn player_home_mapper() -> DataMapper<PlayerHome> {
        let source = DataSourceConfig::sqlite_file(format!("file:player_home_test_{}?mode=memory&cache=shared", uuid_like()));
        DataMapper::new(&source, MapperConfig { cache: Some(CacheConfig::default()), fallback_sqlite_path: String::new() })
            .await
            .expect("mapper construction")
    }

    #[tokio::test]
    async fn update_on_a_secondary_keyed_entity_does_not_touch_sibling_rows() {
        let mapper = player_home_mapper().await;

        let mut lobby = PlayerHome { username: "u".into(), server: "lobby".into(), world: "overworld".into() };
        let mut survival = PlayerHome { username: "u".into(), server: "survival".into(), world: "overworld".into() };
        mapper.insert(&mut lobby).await.expect("insert lobby");
        mapper.insert(&mut survival).await.expect("insert survival");

        survival.world = "nether".into();
        mapper.update(&mut survival).await.expect("update survival");

        let rows = mapper.find_all(Some(Condition::eq("username", "u"))).await.expect("find_all");
        let lobby_row = rows.iter().find(|r| r.server == "lobby").expect("lobby row present");
        let survival_row = rows.iter().find(|r| r.server == "survival").expect("survival row present");
        assert_eq!(lobby_row.world, "overworld", "sibling row sharing the primary key must be untouched");
        assert_eq!(survival_row.world, "nether");
    }
}
