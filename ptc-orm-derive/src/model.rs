//! Classifies each field of a `#[derive(Entity)]` struct into a column, a
//! link, a collection, or an ignored field, resolving the compile-time shape
//! (`Option<T>`, `Vec<T>`, `HashMap<K, V>`, …) into the enums `ptc_orm`
//! already defines at runtime (`ColumnKind`, `CollectionKind`).

use convert_case::{Case, Casing};
use syn::{GenericArgument, PathArguments, Type};

use crate::attrs::{EntityOpts, FieldOpts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    I64,
    F64,
    Str,
    Bytes,
    /// Not one of the built-ins above — resolved through the type registry
    /// at descriptor-build time (C1's "custom type" mechanism).
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    List,
    Set,
    Map,
}

pub struct ColumnPlan {
    pub field_ident: syn::Ident,
    pub field_name: String,
    pub column_name: String,
    pub length: Option<u32>,
    /// `Some((sql_type, sqlite_type))` when `#[entity(sql_type = ..., sqlite_type = ...)]`
    /// overrides the type the scalar kind would otherwise infer.
    pub type_override: Option<(String, String)>,
    pub nullable: bool,
    /// `Some(inner)` when the field is `Option<inner>`.
    pub inner_ty: Type,
    pub full_ty: Type,
    pub scalar: ScalarKind,
    pub indexed_enum: bool,
    pub is_primary_key: bool,
    pub is_secondary_key: bool,
    pub is_auto_key: bool,
    pub is_mutable: bool,
}

pub struct LinkPlan {
    pub field_ident: syn::Ident,
    pub field_name: String,
    pub fk_column: String,
    /// The Rust type the target is boxed as, i.e. the `T` in `Option<Box<T>>`.
    pub target_elem: Type,
}

pub struct CollectionPlan {
    pub field_ident: syn::Ident,
    pub field_name: String,
    pub child_table: String,
    pub shape: CollectionShape,
    pub element_ty: Type,
    pub element_scalar: ScalarKind,
    /// `Some` only for `Map`.
    pub key_ty: Option<Type>,
    pub key_scalar: Option<ScalarKind>,
}

pub struct IgnoredPlan {
    pub field_ident: syn::Ident,
    pub field_ty: Type,
    /// Parsed `default = "expr"` override, or `None` to use `Default::default()`.
    pub default_expr: Option<syn::Expr>,
}

pub enum FieldPlan {
    Column(ColumnPlan),
    Link(LinkPlan),
    Collection(CollectionPlan),
    Ignored(IgnoredPlan),
}

pub struct EntityModel {
    pub ident: syn::Ident,
    pub table_name: String,
    pub schema: Option<String>,
    pub fields: Vec<FieldPlan>,
    pub manual_ddl: Option<Vec<String>>,
    pub migrations: Vec<(i64, Vec<String>)>,
}

/// Strips one layer of `Option<...>`, returning the inner type if present.
fn option_inner(ty: &Type) -> Option<&Type> {
    last_segment_args(ty, "Option").and_then(|args| single_type_arg(args))
}

fn last_segment_args(ty: &Type, name: &str) -> Option<&PathArguments> {
    let Type::Path(p) = ty else { return None };
    let seg = p.path.segments.last()?;
    if seg.ident != name {
        return None;
    }
    Some(&seg.arguments)
}

fn single_type_arg(args: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(ab) = args else { return None };
    ab.args.iter().find_map(|a| match a {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

fn type_args(args: &PathArguments) -> Vec<&Type> {
    let PathArguments::AngleBracketed(ab) = args else { return Vec::new() };
    ab.args
        .iter()
        .filter_map(|a| match a {
            GenericArgument::Type(t) => Some(t),
            _ => None,
        })
        .collect()
}

fn type_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn scalar_kind_of(ty: &Type) -> ScalarKind {
    match type_ident(ty).as_deref() {
        Some("bool") => ScalarKind::Bool,
        Some("i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize") => ScalarKind::I64,
        Some("f32" | "f64") => ScalarKind::F64,
        Some("String") => ScalarKind::Str,
        Some("Vec") => {
            let Type::Path(p) = ty else { return ScalarKind::Custom };
            let seg = p.path.segments.last().unwrap();
            let elem = single_type_arg(&seg.arguments).and_then(type_ident);
            if elem.as_deref() == Some("u8") {
                ScalarKind::Bytes
            } else {
                ScalarKind::Custom
            }
        }
        _ => ScalarKind::Custom,
    }
}

/// Recognizes the collection container shape from the (already
/// `Option`-stripped) field type, if any. `Vec<u8>` is deliberately excluded
/// — it is the `Bytes` scalar column, not a collection field.
fn collection_shape_of(ty: &Type) -> Option<(CollectionShape, Vec<&Type>)> {
    let name = type_ident(ty)?;
    let args = last_segment_args(ty, &name)?;
    match name.as_str() {
        "Vec" => {
            let args = type_args(args);
            if args.len() == 1 && type_ident(args[0]).as_deref() != Some("u8") {
                Some((CollectionShape::List, args))
            } else {
                None
            }
        }
        "HashSet" | "BTreeSet" => {
            let args = type_args(args);
            (args.len() == 1).then_some((CollectionShape::Set, args))
        }
        "HashMap" | "BTreeMap" => {
            let args = type_args(args);
            (args.len() == 2).then_some((CollectionShape::Map, args))
        }
        _ => None,
    }
}

pub fn build_model(opts: EntityOpts) -> Result<EntityModel, syn::Error> {
    let struct_ident = opts.ident.clone();
    let table_name = opts
        .table
        .clone()
        .unwrap_or_else(|| struct_ident.to_string().to_case(Case::Snake));
    let manual_ddl = opts.ddl.as_ref().map(|sql| split_statements(sql));
    let mut migrations: Vec<(i64, Vec<String>)> = opts
        .migrations
        .iter()
        .map(|m| (m.version, split_statements(&m.sql)))
        .collect();
    migrations.sort_by_key(|(version, _)| *version);

    let fields = opts
        .data
        .take_struct()
        .expect("supports(struct_named) guarantees a struct")
        .fields;

    let mut plans = Vec::with_capacity(fields.len());
    let mut seen_primary_key = false;

    for f in fields {
        let field_ident = f.ident.clone().expect("named field");
        let field_name = field_ident.to_string();

        if f.ignore {
            let default_expr = match &f.default {
                Some(src) => Some(syn::parse_str::<syn::Expr>(src).map_err(|e| {
                    syn::Error::new_spanned(&field_ident, format!("`default` is not a valid Rust expression: {e}"))
                })?),
                None => None,
            };
            if option_inner(&f.ty).is_none() && default_expr.is_none() {
                return Err(syn::Error::new_spanned(
                    &field_ident,
                    "#[entity(ignore)] fields that aren't `Option<T>` must supply \
                     `#[entity(ignore, default = \"expr\")]`; ptc_orm refuses to build a descriptor \
                     that can't materialize this field on read",
                ));
            }
            plans.push(FieldPlan::Ignored(IgnoredPlan { field_ident, field_ty: f.ty.clone(), default_expr }));
            continue;
        }

        if f.link.is_some() {
            let inner = option_inner(&f.ty).ok_or_else(|| {
                syn::Error::new_spanned(&field_ident, "link fields must be `Option<Box<Target>>`")
            })?;
            let target_elem = unwrap_box(inner).ok_or_else(|| {
                syn::Error::new_spanned(&field_ident, "link fields must be `Option<Box<Target>>`")
            })?;
            let fk_column = f
                .link_fk
                .clone()
                .unwrap_or_else(|| format!("{}_id", field_name.to_case(Case::Snake)));
            plans.push(FieldPlan::Link(LinkPlan {
                field_ident,
                field_name,
                fk_column,
                target_elem: target_elem.clone(),
            }));
            continue;
        }

        let nullable_ty = option_inner(&f.ty);
        let bare_ty = nullable_ty.unwrap_or(&f.ty);

        if let Some((shape, args)) = collection_shape_of(bare_ty) {
            let child_table = f
                .child_table
                .clone()
                .unwrap_or_else(|| format!("{table_name}_{}", field_name.to_case(Case::Snake)));
            let (key_ty, element_ty) = match shape {
                CollectionShape::Map => (Some(args[0].clone()), args[1].clone()),
                _ => (None, args[0].clone()),
            };
            let element_scalar = scalar_kind_of(&element_ty);
            let key_scalar = key_ty.as_ref().map(scalar_kind_of);
            plans.push(FieldPlan::Collection(CollectionPlan {
                field_ident,
                field_name,
                child_table,
                shape,
                element_ty,
                element_scalar,
                key_ty,
                key_scalar,
            }));
            continue;
        }

        let column_name = f.column.clone().unwrap_or_else(|| field_name.to_case(Case::Snake));
        let is_primary_key = f.primary_key;
        if is_primary_key {
            if seen_primary_key {
                return Err(syn::Error::new_spanned(&field_ident, "only one field may be #[entity(primary_key)]"));
            }
            seen_primary_key = true;
        }
        let type_override = match (&f.sql_type, &f.sqlite_type) {
            (Some(sql), Some(sqlite)) => Some((sql.clone(), sqlite.clone())),
            (None, None) => None,
            _ => {
                return Err(syn::Error::new_spanned(
                    &field_ident,
                    "#[entity(sql_type = ..., sqlite_type = ...)] must be set together",
                ))
            }
        };
        plans.push(FieldPlan::Column(ColumnPlan {
            field_ident,
            field_name,
            column_name,
            length: f.length,
            type_override,
            nullable: nullable_ty.is_some(),
            inner_ty: bare_ty.clone(),
            full_ty: f.ty.clone(),
            scalar: scalar_kind_of(bare_ty),
            indexed_enum: f.indexed_enum,
            is_primary_key,
            is_secondary_key: f.secondary_key,
            is_auto_key: f.auto,
            is_mutable: !f.immutable && !is_primary_key && !f.secondary_key,
        }));
    }

    Ok(EntityModel { ident: struct_ident, table_name, schema: opts.schema, fields: plans, manual_ddl, migrations })
}

fn unwrap_box(ty: &Type) -> Option<&Type> {
    single_type_arg(last_segment_args(ty, "Box")?)
}

/// Splits a `;`-separated DDL/migration string into trimmed, non-empty
/// statements, preserving source order.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
