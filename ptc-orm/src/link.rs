//! Link Engine (C8): recursive cascade writes over type-erased link targets,
//! and the small naming conventions the read side (auto `LEFT JOIN`,
//! namespaced column prefixes) is built from.

use std::future::Future;
use std::pin::Pin;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::{AnyEntity, EntityDescriptor};
use crate::migration;
use crate::pool::AnyPool;
use crate::query::{pre, Condition, Join, JoinKind};
use crate::value::{bind_arguments, ColumnKind, Value};

/// The join alias assigned to the `n`-th link encountered in descriptor
/// traversal order (§4.8: `__t0, __t1, …`).
pub fn join_alias(index: usize) -> String {
    format!("__t{index}")
}

/// The column-namespace prefix for a link's foreign-key column. Nesting
/// concatenates prefixes, e.g. `__link__author_id____link__country_id__`.
pub fn link_prefix(fk_column: &str) -> String {
    format!("__link__{fk_column}__")
}

/// Recursively walks `descriptor`'s link fields, building the auto-join
/// projection for cascade reads (§4.8 Read): a `select_as` entry and a
/// decoder per reachable column (own table first, then each link target in
/// descriptor order), plus the `LEFT JOIN`s that reach them. `table_ref` is
/// the *unquoted* table name or join alias this call should qualify its own
/// columns against (quoting happens once, at render time); `prefix` is the
/// namespace already accumulated by outer link hops (`""` at the top level).
#[allow(clippy::too_many_arguments)]
pub fn build_cascade_projection(
    descriptor: &EntityDescriptor,
    table_ref: &str,
    prefix: &str,
    dialect: &dyn Dialect,
    select_as: &mut Vec<(String, String)>,
    joins: &mut Vec<Join>,
    decoders: &mut Vec<(String, ColumnKind)>,
    counter: &mut usize,
) {
    for col in &descriptor.columns {
        let alias = format!("{prefix}{}", col.column_name);
        select_as.push((format!("{table_ref}.{}", col.column_name), alias.clone()));
        decoders.push((alias, col.kind));
    }

    for link in &descriptor.link_fields {
        let target = (link.target)();
        let target_pk = match target.primary_key_column() {
            Some(pk) => pk,
            None => continue,
        };

        let alias_table = join_alias(*counter);
        *counter += 1;
        let quote = dialect.quote_char();
        let join_source = format!(
            "{} AS {quote}{alias_table}{quote}",
            target.quoted_table(quote)
        );
        let on = Condition::eq(
            format!("{alias_table}.{}", target_pk.column_name),
            pre(format!("{table_ref}.{}", link.fk_column)),
        );
        joins.push(Join::raw(JoinKind::Left, join_source).on(on));

        let nested_prefix = format!("{prefix}{}", link_prefix(&link.fk_column));
        build_cascade_projection(&target, &alias_table, &nested_prefix, dialect, select_as, joins, decoders, counter);
    }
}

/// Depth-first cascade write (§4.8 Write): resolves every link field's
/// target before writing this row's own columns, then copies each resolved
/// target's primary key into this row's foreign-key column.
pub fn cascade_write_links<'a>(
    entity: &'a mut dyn AnyEntity,
    pool: &'a AnyPool,
    dialect: &'a dyn Dialect,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let fk_columns: Vec<&'static str> = entity
            .linked_entities_mut_dyn()
            .into_iter()
            .map(|(fk, _)| fk)
            .collect();

        for fk_column in fk_columns {
            let mut resolved: Option<Value> = None;
            {
                let mut links = entity.linked_entities_mut_dyn();
                if let Some((_, slot)) = links.iter_mut().find(|(fk, _)| *fk == fk_column) {
                    if let Some(target) = std::mem::take(slot) {
                        cascade_write_links(target, pool, dialect).await?;
                        resolved = Some(save_or_update_any(target, pool, dialect).await?);
                    }
                }
            }
            if let Some(pk_value) = resolved {
                entity.set_column_dyn(fk_column, pk_value)?;
            }
        }
        Ok(())
    })
}

/// Inserts `entity` if its primary key is absent from its table, otherwise
/// updates it, and returns the resolved primary-key value.
async fn save_or_update_any(entity: &mut dyn AnyEntity, pool: &AnyPool, dialect: &dyn Dialect) -> Result<Value> {
    let descriptor = entity.descriptor_dyn();
    migration::ensure_schema(&descriptor, pool, dialect, &mut std::collections::HashSet::new()).await?;

    let columns = entity.to_columns_dyn();
    let pk_col = descriptor
        .primary_key_column()
        .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "linked entity has no primary key".into()))?;

    let existing_pk = entity.primary_key_value_dyn();
    let exists = match &existing_pk {
        Some(pk) if !pk.is_null() => row_exists(pool, dialect, &descriptor, pk_col.column_name.as_str(), pk).await?,
        _ => false,
    };

    if exists {
        let pk_value = existing_pk.expect("checked non-null above");
        update_columns(&descriptor, &columns, pool, dialect, pk_value.clone()).await?;
        Ok(pk_value)
    } else {
        insert_columns(&descriptor, &columns, pool, dialect).await
    }
}

pub(crate) async fn row_exists(
    pool: &AnyPool,
    dialect: &dyn Dialect,
    descriptor: &crate::metadata::EntityDescriptor,
    pk_column: &str,
    pk_value: &Value,
) -> Result<bool> {
    let quote = dialect.quote_char();
    let sql = format!(
        "SELECT 1 FROM {} WHERE {quote}{pk_column}{quote} = {} LIMIT 1",
        descriptor.quoted_table(quote),
        dialect.placeholder(1)
    );
    let args = bind_arguments(std::slice::from_ref(pk_value))?;
    let row = crate::pool::Exec::current(pool).fetch_optional(&sql, args).await?;
    Ok(row.is_some())
}

pub(crate) async fn insert_columns(
    descriptor: &crate::metadata::EntityDescriptor,
    columns: &[(&'static str, Value)],
    pool: &AnyPool,
    dialect: &dyn Dialect,
) -> Result<Value> {
    let quote = dialect.quote_char();
    let writable: Vec<&(&'static str, Value)> = columns
        .iter()
        .filter(|(name, _)| !descriptor.column(name).map(|c| c.is_auto_key).unwrap_or(false))
        .collect();

    let col_list: Vec<String> = writable
        .iter()
        .map(|(name, _)| {
            let column_name = descriptor.column(name).expect("filtered above").column_name.as_str();
            format!("{quote}{column_name}{quote}")
        })
        .collect();
    let placeholders: Vec<String> = (1..=writable.len()).map(|n| dialect.placeholder(n)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        descriptor.quoted_table(quote),
        col_list.join(", "),
        placeholders.join(", ")
    );
    let values: Vec<Value> = writable.iter().map(|(_, v)| v.clone()).collect();
    let args = bind_arguments(&values)?;
    let result = crate::pool::Exec::current(pool).execute(&sql, args).await?;

    match descriptor.primary_key_column() {
        Some(pk_col) if pk_col.is_auto_key => Ok(Value::I64(result.last_insert_id().unwrap_or_default())),
        Some(pk_col) => columns
            .iter()
            .find(|(name, _)| *name == pk_col.field_name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "primary key column missing from written columns".into())),
        None => Ok(Value::Null),
    }
}

pub(crate) async fn update_columns(
    descriptor: &crate::metadata::EntityDescriptor,
    columns: &[(&'static str, Value)],
    pool: &AnyPool,
    dialect: &dyn Dialect,
    pk_value: Value,
) -> Result<()> {
    let quote = dialect.quote_char();
    let pk_col = descriptor
        .primary_key_column()
        .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "update requires a primary key".into()))?;

    let mutable: Vec<&(&'static str, Value)> = columns
        .iter()
        .filter(|(name, _)| descriptor.column(name).map(|c| c.is_mutable).unwrap_or(false))
        .collect();
    if mutable.is_empty() {
        return Ok(());
    }

    let assignments: Vec<String> = mutable
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            let column_name = descriptor.column(name).expect("filtered above").column_name.as_str();
            format!("{quote}{column_name}{quote} = {}", dialect.placeholder(i + 1))
        })
        .collect();

    // Locate by primary key + secondary key (§4.7) — when a secondary key is
    // declared, the primary key alone is not unique (S2), so every locator
    // column must land in the WHERE clause or this would rewrite sibling
    // rows sharing the same primary key.
    let secondary_key_cols = descriptor.secondary_key_columns();
    let secondary_locator = descriptor.locate_key_values(&secondary_key_cols, columns)?;
    let mut where_clauses = vec![format!("{quote}{}{quote} = {}", pk_col.column_name, dialect.placeholder(mutable.len() + 1))];
    where_clauses.extend(
        secondary_locator
            .iter()
            .enumerate()
            .map(|(i, (column_name, _))| format!("{quote}{column_name}{quote} = {}", dialect.placeholder(mutable.len() + 2 + i))),
    );

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        descriptor.quoted_table(quote),
        assignments.join(", "),
        where_clauses.join(" AND "),
    );

    let mut values: Vec<Value> = mutable.iter().map(|(_, v)| v.clone()).collect();
    values.push(pk_value);
    values.extend(secondary_locator.into_iter().map(|(_, v)| v));
    let args = bind_arguments(&values)?;
    crate::pool::Exec::current(pool).execute(&sql, args).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_alias_and_prefix_naming() {
        assert_eq!(join_alias(0), "__t0");
        assert_eq!(join_alias(1), "__t1");
        assert_eq!(link_prefix("author_id"), "__link__author_id__");
    }
}
