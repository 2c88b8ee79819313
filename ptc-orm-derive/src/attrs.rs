//! `#[entity(...)]` attribute parsing, struct- and field-level. Flat options
//! only — mirrors the teacher's own `orm(...)` surface in spirit (one
//! attribute namespace, darling-parsed) but keeps every option a scalar
//! string/bool/int rather than nested meta, since nothing here needs it.

use darling::{FromDeriveInput, FromField, FromMeta};

#[derive(Debug, FromDeriveInput)]
#[darling(attributes(entity), supports(struct_named))]
pub struct EntityOpts {
    pub ident: syn::Ident,
    pub data: darling::ast::Data<darling::util::Ignored, FieldOpts>,

    /// Table name. Defaults to the struct name, snake_cased.
    #[darling(default)]
    pub table: Option<String>,
    #[darling(default)]
    pub schema: Option<String>,

    /// Verbatim `CREATE TABLE` statement(s), semicolon-separated. When
    /// present, schema creation (C5) skips column-derived DDL entirely.
    #[darling(default)]
    pub ddl: Option<String>,

    /// Repeated `#[entity(migration(version = N, sql = "..."))]`, applied in
    /// ascending version order against the stored schema version (C5).
    #[darling(default, multiple, rename = "migration")]
    pub migrations: Vec<MigrationOpt>,
}

#[derive(Debug, FromMeta)]
pub struct MigrationOpt {
    pub version: i64,
    /// One or more `;`-separated statements run together under this version.
    pub sql: String,
}

#[derive(Debug, FromField)]
#[darling(attributes(entity))]
pub struct FieldOpts {
    pub ident: Option<syn::Ident>,
    pub ty: syn::Type,

    #[darling(default)]
    pub column: Option<String>,
    #[darling(default)]
    pub length: Option<u32>,

    /// Overrides the inferred SQL column type for non-SQLite backends.
    /// Requires `sqlite_type` to be set alongside it.
    #[darling(default)]
    pub sql_type: Option<String>,
    /// Overrides the inferred SQLite column type. Requires `sql_type`.
    #[darling(default)]
    pub sqlite_type: Option<String>,

    #[darling(default)]
    pub primary_key: bool,
    #[darling(default)]
    pub auto: bool,
    #[darling(default)]
    pub secondary_key: bool,
    /// Excluded from `UPDATE ... SET` — set on insert only.
    #[darling(default)]
    pub immutable: bool,

    /// Enum field stored as the integer `IndexedEnum::index()`.
    #[darling(default)]
    pub indexed_enum: bool,

    /// Dropped entirely from columns/SQL; the field must implement
    /// `Default` (§9 Open Question: non-`Option`, no-default fields refuse
    /// to compile — enforced in `model.rs`).
    #[darling(default)]
    pub ignore: bool,
    /// Expression spliced into the generated `from_bundle` as this field's
    /// value, parsed as a Rust expression, e.g. `default = "Vec::new()"`.
    /// Required by `ignore` on fields that aren't `Option<T>` (§9).
    #[darling(default)]
    pub default: Option<String>,

    /// Marks this field as a one-to-one link. Value is the target entity's
    /// type path, e.g. `#[entity(link = "Author")]`. The backing foreign key
    /// is a *separate* plain column field, named by `link_fk` or defaulted
    /// to `<field>_id`; this field itself never appears in `columns`.
    #[darling(default)]
    pub link: Option<String>,
    #[darling(default)]
    pub link_fk: Option<String>,

    /// Child table name override for a collection field (`Vec`/`HashSet`/
    /// `BTreeSet`/`HashMap`/`BTreeMap`, auto-detected from the field type).
    /// Defaults to `<table>_<field>`.
    #[darling(default)]
    pub child_table: Option<String>,
}
