use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::value::{ColumnKind, Value};

/// Untyped row shape keyed by selection alias — used by arbitrary joins
/// (`DataMapper::join`, C7/C8) and as the intermediate form every `Entity`
/// hydrates itself from.
pub type BundleMap = BTreeMap<String, Value>;

/// A single column in an [`EntityDescriptor`] (§3).
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub field_name: &'static str,
    pub column_name: String,
    pub kind: ColumnKind,
    pub sql_type: String,
    pub sqlite_type: String,
    pub length: Option<u32>,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_secondary_key: bool,
    pub is_auto_key: bool,
    pub is_mutable: bool,
    /// Injected by `#[derive(Entity)]` when no field is marked
    /// `#[entity(primary_key)]` (§3). Never backed by a struct field: absent
    /// from `to_columns`/`from_bundle`, and `set_column` is a no-op for it.
    pub is_synthetic: bool,
}

/// A `List`/`Set`/`Map` field backed by a child table (C9), unless a
/// collection custom type intercepts it (in which case the field shows up in
/// `columns` instead and never appears here).
#[derive(Debug, Clone)]
pub struct CollectionFieldDescriptor {
    pub field_name: &'static str,
    pub child_table: String,
    pub kind: CollectionKind,
    /// How each element/value is encoded into a `Value` (registry lookup
    /// happens once, at descriptor build time).
    pub element_kind: ColumnKind,
    pub key_kind: Option<ColumnKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

/// A one-to-one link field (C8): a foreign-key column in this table pointing
/// at the target entity's primary key.
#[derive(Debug, Clone)]
pub struct LinkFieldDescriptor {
    pub field_name: &'static str,
    pub fk_column: String,
    pub target: fn() -> Arc<EntityDescriptor>,
}

/// One migration step: `ALTER TABLE ...` statements gated behind a version
/// number (C5).
#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub version: i64,
    pub statements: Vec<String>,
}

/// Frozen, process-wide metadata for one record type (§3). Built once by the
/// `#[derive(Entity)]` macro's generated `Entity::descriptor()` and cached
/// behind a `OnceCell` in the generated code — this struct itself holds no
/// caching logic.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub entity_name: &'static str,
    pub table_name: String,
    pub schema: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    /// Index into `columns`. `#[derive(Entity)]` always populates this —
    /// either the explicit `#[entity(primary_key)]` column, or an injected
    /// synthetic auto-increment `id` column (`ColumnDescriptor::is_synthetic`)
    /// when none was declared. `None` is reachable only through a
    /// hand-written `Entity` impl that omits a primary key entirely.
    pub primary_key: Option<usize>,
    pub secondary_keys: Vec<usize>,
    pub link_fields: Vec<LinkFieldDescriptor>,
    pub collection_fields: Vec<CollectionFieldDescriptor>,
    pub migrations: Vec<MigrationStep>,
    /// Verbatim `CREATE TABLE` override (§4.5 step 1); when set, DDL
    /// generation from `columns` is skipped entirely.
    pub manual_ddl: Option<Vec<String>>,
}

impl EntityDescriptor {
    pub fn quoted_table(&self, quote: char) -> String {
        match &self.schema {
            Some(schema) => format!("{quote}{schema}{quote}.{quote}{}{quote}", self.table_name),
            None => format!("{quote}{}{quote}", self.table_name),
        }
    }

    pub fn primary_key_column(&self) -> Option<&ColumnDescriptor> {
        self.primary_key.map(|i| &self.columns[i])
    }

    pub fn secondary_key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.secondary_keys.iter().map(|&i| &self.columns[i]).collect()
    }

    pub fn mutable_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_mutable).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.column_name == name || c.field_name == name)
    }

    pub fn child_table_name(&self, field_name: &str) -> Result<&str, Error> {
        self.collection_fields
            .iter()
            .find(|c| c.field_name == field_name)
            .map(|c| c.child_table.as_str())
            .ok_or_else(|| Error::UnknownField(field_name.to_string(), self.entity_name))
    }

    /// Pairs each of `key_cols` with its bound value read off `columns`
    /// (typically `entity.to_columns()` or a probe's), matched by field
    /// name. Shared by `update`'s secondary-key `WHERE` locator (C8/C7) and
    /// the keyed (`find_by_key`/`exists_by_key`/`delete_by_key`) family's
    /// `(primary_key, secondary_key…)` predicate (§4.7).
    pub(crate) fn locate_key_values(
        &self,
        key_cols: &[&ColumnDescriptor],
        columns: &[(&'static str, Value)],
    ) -> Result<Vec<(String, Value)>, Error> {
        key_cols
            .iter()
            .map(|key_col| {
                columns
                    .iter()
                    .find(|(name, _)| *name == key_col.field_name)
                    .map(|(_, v)| (key_col.column_name.clone(), v.clone()))
                    .ok_or_else(|| Error::Descriptor(self.entity_name, "key column missing from written columns".into()))
            })
            .collect()
    }
}

/// Trait produced by `#[derive(Entity)]`. Hand-implementing this is possible
/// but discouraged — the macro is the compile-time substitute for the
/// original's reflective field enumeration (§9).
pub trait Entity: Sized + Send + Sync + 'static {
    /// The frozen descriptor for this type, built once and cached.
    fn descriptor() -> Arc<EntityDescriptor>;

    /// All column values for this instance, in descriptor column order.
    fn to_columns(&self) -> Vec<(&'static str, Value)>;

    /// Rehydrates one instance from a row bundle. `prefix` is `""` for a
    /// top-level fetch and `__link__<fk>__` (possibly nested) when called as
    /// a cascade-read target (§4.8).
    fn from_bundle(bundle: &BundleMap, prefix: &str) -> Result<Self, Error>;

    /// Sets a single column by its storage name — used by cascade writes to
    /// copy a resolved link target's primary key into this row's foreign key
    /// (§4.8) after the target has been saved.
    fn set_column(&mut self, column: &str, value: Value) -> Result<(), Error>;

    fn primary_key_value(&self) -> Option<Value>;

    /// Link fields as type-erased entities, for generic cascade writes (C8).
    /// Each entry pairs the foreign-key column with the linked value, or
    /// `None` if absent.
    fn linked_entities_mut(&mut self) -> Vec<(&'static str, Option<&mut dyn AnyEntity>)>;

    /// Collection field values for writes (C9).
    fn collection_values(&self) -> Vec<(&'static str, CollectionValue)>;

    /// Installs rehydrated collection rows back onto `self` (C9 read path).
    fn set_collection(&mut self, field_name: &str, value: CollectionValue) -> Result<(), Error>;
}

/// Type-erased entity, used only for cascade writes where a link field's
/// concrete target type differs per field (C8).
pub trait AnyEntity: Send + Sync {
    fn descriptor_dyn(&self) -> Arc<EntityDescriptor>;
    fn to_columns_dyn(&self) -> Vec<(&'static str, Value)>;
    fn primary_key_value_dyn(&self) -> Option<Value>;
    fn set_column_dyn(&mut self, column: &str, value: Value) -> Result<(), Error>;
    /// Type-erased recursion point: lets a generic cascade walk a link
    /// target's own link fields without knowing its concrete type, so the
    /// depth-first write order in §4.8 is not bounded to one level.
    fn linked_entities_mut_dyn(&mut self) -> Vec<(&'static str, Option<&mut dyn AnyEntity>)>;
}

impl<T: Entity> AnyEntity for T {
    fn descriptor_dyn(&self) -> Arc<EntityDescriptor> {
        T::descriptor()
    }
    fn to_columns_dyn(&self) -> Vec<(&'static str, Value)> {
        self.to_columns()
    }
    fn primary_key_value_dyn(&self) -> Option<Value> {
        self.primary_key_value()
    }
    fn set_column_dyn(&mut self, column: &str, value: Value) -> Result<(), Error> {
        self.set_column(column, value)
    }
    fn linked_entities_mut_dyn(&mut self) -> Vec<(&'static str, Option<&mut dyn AnyEntity>)> {
        self.linked_entities_mut()
    }
}

/// The materialized value of a collection field, ready either to be written
/// to its child table or to have been just read from it (C9).
#[derive(Debug, Clone)]
pub enum CollectionValue {
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}
