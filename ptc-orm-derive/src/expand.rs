//! Code generation: turns an [`EntityModel`] into the `impl Entity for ...`
//! block. `ptc-orm-derive` does not depend on `ptc-orm` (it would create a
//! cycle), so every generated path is fully qualified under `::ptc_orm::…`,
//! the same convention `serde`/`serde_derive` use for their companion crate.

use proc_macro2::TokenStream;
use quote::quote;
use syn::Ident;

use crate::model::{CollectionPlan, CollectionShape, ColumnPlan, EntityModel, FieldPlan, LinkPlan, ScalarKind};

pub fn expand(model: EntityModel) -> TokenStream {
    let ident = &model.ident;
    let entity_name = ident.to_string();

    let columns: Vec<&ColumnPlan> = model.fields.iter().filter_map(|f| match f {
        FieldPlan::Column(c) => Some(c),
        _ => None,
    }).collect();
    let links: Vec<&LinkPlan> = model.fields.iter().filter_map(|f| match f {
        FieldPlan::Link(l) => Some(l),
        _ => None,
    }).collect();
    let collections: Vec<&CollectionPlan> = model.fields.iter().filter_map(|f| match f {
        FieldPlan::Collection(c) => Some(c),
        _ => None,
    }).collect();

    if let Some(bad) = collections.iter().find(|c| {
        c.element_scalar == ScalarKind::Custom || c.key_scalar == Some(ScalarKind::Custom)
    }) {
        let msg = format!(
            "collection field `{}` has an element/key type the derive macro doesn't recognize; \
             only bool, integers, floats, String and Vec<u8> are supported inside a List/Set/Map \
             (custom element codecs require a hand-written Entity impl)",
            bad.field_name
        );
        return quote! { compile_error!(#msg); };
    }

    let descriptor_fn = descriptor_fn(&entity_name, &model, &columns, &links, &collections);
    let to_columns_fn = to_columns_fn(&columns);
    let from_bundle_fn = from_bundle_fn(&model, &columns, &links);
    let set_column_fn = set_column_fn(&entity_name, &columns);
    let primary_key_value_fn = primary_key_value_fn(&columns);
    let linked_entities_mut_fn = linked_entities_mut_fn(&links);
    let collection_values_fn = collection_values_fn(&collections);
    let set_collection_fn = set_collection_fn(&entity_name, &collections);

    quote! {
        #[automatically_derived]
        impl ::ptc_orm::metadata::Entity for #ident {
            #descriptor_fn
            #to_columns_fn
            #from_bundle_fn
            #set_column_fn
            #primary_key_value_fn
            #linked_entities_mut_fn
            #collection_values_fn
            #set_collection_fn
        }
    }
}

fn column_kind_tokens(scalar: ScalarKind) -> TokenStream {
    match scalar {
        ScalarKind::Bool => quote!(::ptc_orm::value::ColumnKind::Bool),
        ScalarKind::I64 => quote!(::ptc_orm::value::ColumnKind::I64),
        ScalarKind::F64 => quote!(::ptc_orm::value::ColumnKind::F64),
        ScalarKind::Str => quote!(::ptc_orm::value::ColumnKind::Str),
        ScalarKind::Bytes => quote!(::ptc_orm::value::ColumnKind::Bytes),
        ScalarKind::Custom => unreachable!("custom columns resolve kind through the registry, not a literal"),
    }
}

fn default_sql_types(scalar: ScalarKind) -> (&'static str, &'static str) {
    match scalar {
        ScalarKind::Bool => ("TINYINT(1)", "INTEGER"),
        ScalarKind::I64 => ("BIGINT", "INTEGER"),
        ScalarKind::F64 => ("DOUBLE", "REAL"),
        ScalarKind::Str => ("VARCHAR", "TEXT"),
        ScalarKind::Bytes => ("BLOB", "BLOB"),
        ScalarKind::Custom => unreachable!(),
    }
}

fn column_descriptor_push(col: &ColumnPlan) -> TokenStream {
    let field_name = &col.field_name;
    let column_name = &col.column_name;
    let is_pk = col.is_primary_key;
    let is_sk = col.is_secondary_key;
    let is_auto = col.is_auto_key;
    let is_mut = col.is_mutable;
    let nullable = col.nullable;

    if col.indexed_enum {
        return quote! {
            columns.push(::ptc_orm::metadata::ColumnDescriptor {
                field_name: #field_name,
                column_name: #column_name.to_string(),
                kind: ::ptc_orm::value::ColumnKind::IndexedEnum,
                sql_type: "BIGINT".to_string(),
                sqlite_type: "INTEGER".to_string(),
                length: None,
                nullable: #nullable,
                is_primary_key: #is_pk,
                is_secondary_key: #is_sk,
                is_auto_key: #is_auto,
                is_mutable: #is_mut,
                is_synthetic: false,
            });
        };
    }

    if col.scalar == ScalarKind::Custom {
        let ty = &col.inner_ty;
        return quote! {
            {
                let codec = ::ptc_orm::registry::lookup_single(::std::any::TypeId::of::<#ty>())
                    .unwrap_or_else(|| panic!(
                        "no codec registered for field `{}`; call ptc_orm::registry::register_single before building the descriptor",
                        #field_name,
                    ));
                columns.push(::ptc_orm::metadata::ColumnDescriptor {
                    field_name: #field_name,
                    column_name: #column_name.to_string(),
                    kind: codec.kind,
                    sql_type: codec.sql_type.clone(),
                    sqlite_type: codec.sqlite_type.clone(),
                    length: codec.length,
                    nullable: #nullable,
                    is_primary_key: #is_pk,
                    is_secondary_key: #is_sk,
                    is_auto_key: #is_auto,
                    is_mutable: #is_mut,
                    is_synthetic: false,
                });
            }
        };
    }

    let (default_sql, default_sqlite) = default_sql_types(col.scalar);
    let (sql_type, sqlite_type): (TokenStream, TokenStream) = match &col.type_override {
        Some((sql, sqlite)) => (quote!(#sql.to_string()), quote!(#sqlite.to_string())),
        None => (quote!(#default_sql.to_string()), quote!(#default_sqlite.to_string())),
    };
    let kind = column_kind_tokens(col.scalar);
    let length = match (col.scalar, col.length) {
        (_, Some(n)) => quote!(Some(#n)),
        (ScalarKind::Str, None) => quote!(Some(::ptc_orm::registry::DEFAULT_STRING_LENGTH)),
        (_, None) => quote!(None),
    };
    quote! {
        columns.push(::ptc_orm::metadata::ColumnDescriptor {
            field_name: #field_name,
            column_name: #column_name.to_string(),
            kind: #kind,
            sql_type: #sql_type,
            sqlite_type: #sqlite_type,
            length: #length,
            nullable: #nullable,
            is_primary_key: #is_pk,
            is_secondary_key: #is_sk,
            is_auto_key: #is_auto,
            is_mutable: #is_mut,
            is_synthetic: false,
        });
    }
}

fn collection_kind_tokens(shape: CollectionShape) -> TokenStream {
    match shape {
        CollectionShape::List => quote!(::ptc_orm::metadata::CollectionKind::List),
        CollectionShape::Set => quote!(::ptc_orm::metadata::CollectionKind::Set),
        CollectionShape::Map => quote!(::ptc_orm::metadata::CollectionKind::Map),
    }
}

fn collection_descriptor_push(col: &CollectionPlan) -> TokenStream {
    let field_name = &col.field_name;
    let child_table = &col.child_table;
    let kind = collection_kind_tokens(col.shape);
    let element_kind = column_kind_tokens(col.element_scalar);
    let key_kind = match col.key_scalar {
        Some(k) => {
            let k = column_kind_tokens(k);
            quote!(Some(#k))
        }
        None => quote!(None),
    };
    quote! {
        collection_fields.push(::ptc_orm::metadata::CollectionFieldDescriptor {
            field_name: #field_name,
            child_table: #child_table.to_string(),
            kind: #kind,
            element_kind: #element_kind,
            key_kind: #key_kind,
        });
    }
}

fn link_descriptor_entry(link: &LinkPlan) -> TokenStream {
    let field_name = &link.field_name;
    let fk_column = &link.fk_column;
    let target = &link.target_elem;
    quote! {
        ::ptc_orm::metadata::LinkFieldDescriptor {
            field_name: #field_name,
            fk_column: #fk_column.to_string(),
            target: || <#target as ::ptc_orm::metadata::Entity>::descriptor(),
        }
    }
}

fn descriptor_fn(
    entity_name: &str,
    model: &EntityModel,
    columns: &[&ColumnPlan],
    links: &[&LinkPlan],
    collections: &[&CollectionPlan],
) -> TokenStream {
    let table_name = &model.table_name;
    let schema = match &model.schema {
        Some(s) => quote!(Some(#s.to_string())),
        None => quote!(None),
    };
    let column_pushes: Vec<TokenStream> = columns.iter().map(|c| column_descriptor_push(c)).collect();
    let synthetic_pk_push = if columns.iter().any(|c| c.is_primary_key) {
        quote!()
    } else {
        // No `#[entity(primary_key)]` field — inject the synthetic auto-increment
        // `id` column §3 requires. `field_name: ""` marks it unbacked by a struct
        // field; `to_columns`/`from_bundle`/`set_column` never reference it.
        quote! {
            columns.push(::ptc_orm::metadata::ColumnDescriptor {
                field_name: "",
                column_name: "id".to_string(),
                kind: ::ptc_orm::value::ColumnKind::I64,
                sql_type: "BIGINT".to_string(),
                sqlite_type: "INTEGER".to_string(),
                length: None,
                nullable: false,
                is_primary_key: true,
                is_secondary_key: false,
                is_auto_key: true,
                is_mutable: false,
                is_synthetic: true,
            });
        }
    };
    let collection_pushes: Vec<TokenStream> = collections.iter().map(|c| collection_descriptor_push(c)).collect();
    let link_entries: Vec<TokenStream> = links.iter().map(|l| link_descriptor_entry(l)).collect();
    let manual_ddl = match &model.manual_ddl {
        Some(statements) => quote!(Some(vec![#(#statements.to_string()),*])),
        None => quote!(None),
    };
    let migration_entries: Vec<TokenStream> = model
        .migrations
        .iter()
        .map(|(version, statements)| {
            quote! {
                ::ptc_orm::metadata::MigrationStep {
                    version: #version,
                    statements: vec![#(#statements.to_string()),*],
                }
            }
        })
        .collect();

    quote! {
        fn descriptor() -> ::std::sync::Arc<::ptc_orm::metadata::EntityDescriptor> {
            static CELL: ::std::sync::OnceLock<::std::sync::Arc<::ptc_orm::metadata::EntityDescriptor>> =
                ::std::sync::OnceLock::new();
            CELL.get_or_init(|| {
                let mut columns: Vec<::ptc_orm::metadata::ColumnDescriptor> = Vec::new();
                #synthetic_pk_push
                #(#column_pushes)*
                let primary_key = columns.iter().position(|c| c.is_primary_key);
                let secondary_keys: Vec<usize> = columns
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.is_secondary_key)
                    .map(|(i, _)| i)
                    .collect();

                let mut collection_fields: Vec<::ptc_orm::metadata::CollectionFieldDescriptor> = Vec::new();
                #(#collection_pushes)*

                let link_fields: Vec<::ptc_orm::metadata::LinkFieldDescriptor> = vec![#(#link_entries),*];

                ::std::sync::Arc::new(::ptc_orm::metadata::EntityDescriptor {
                    entity_name: #entity_name,
                    table_name: #table_name.to_string(),
                    schema: #schema,
                    columns,
                    primary_key,
                    secondary_keys,
                    link_fields,
                    collection_fields,
                    migrations: vec![#(#migration_entries),*],
                    manual_ddl: #manual_ddl,
                })
            }).clone()
        }
    }
}

/// The expression (operating on a `&T`/`&InnerT` named `v`) that encodes one
/// scalar field into a `Value`.
fn encode_scalar(col: &ColumnPlan) -> TokenStream {
    if col.indexed_enum {
        return quote! { ::ptc_orm::value::Value::I64(::ptc_orm::registry::IndexedEnum::index(v)) };
    }
    match col.scalar {
        ScalarKind::Bool => quote! { ::ptc_orm::value::Value::Bool(*v) },
        ScalarKind::I64 => quote! { ::ptc_orm::value::Value::I64((*v) as i64) },
        ScalarKind::F64 => quote! { ::ptc_orm::value::Value::F64((*v) as f64) },
        ScalarKind::Str => quote! { ::ptc_orm::value::Value::Str(v.clone()) },
        ScalarKind::Bytes => quote! { ::ptc_orm::value::Value::Bytes(v.clone()) },
        ScalarKind::Custom => {
            let ty = &col.inner_ty;
            quote! {
                {
                    let codec = ::ptc_orm::registry::lookup_single(::std::any::TypeId::of::<#ty>())
                        .expect("codec registered (checked when the descriptor was first built)");
                    (codec.serialize)(v as &dyn ::std::any::Any)
                }
            }
        }
    }
}

fn to_columns_fn(columns: &[&ColumnPlan]) -> TokenStream {
    // Keyed by `field_name`, not `column_name` — `DataMapper::key_condition`
    // matches a probe's `to_columns()` entries against
    // `ColumnDescriptor::field_name` directly. Callers that need the SQL
    // identifier resolve it through `descriptor.column(name)`, which accepts
    // either name, so this is the one convention that satisfies both sides.
    let pushes: Vec<TokenStream> = columns
        .iter()
        .map(|col| {
            let field_ident = &col.field_ident;
            let field_name = &col.field_name;
            let encode = encode_scalar(col);
            if col.nullable {
                quote! {
                    match &self.#field_ident {
                        Some(v) => out.push((#field_name, #encode)),
                        None => out.push((#field_name, ::ptc_orm::value::Value::Null)),
                    }
                }
            } else {
                quote! {
                    {
                        let v = &self.#field_ident;
                        out.push((#field_name, #encode));
                    }
                }
            }
        })
        .collect();

    quote! {
        fn to_columns(&self) -> Vec<(&'static str, ::ptc_orm::value::Value)> {
            let mut out = Vec::new();
            #(#pushes)*
            out
        }
    }
}

/// The expression decoding an owned `Value` (bound to `value`) into the
/// field's inner (non-`Option`) type. May use `?` — only valid spliced into
/// a block that is itself inside a function returning `Result`.
fn decode_scalar(col: &ColumnPlan) -> TokenStream {
    let field_name = &col.field_name;
    if col.indexed_enum {
        let ty = &col.inner_ty;
        return quote! {
            {
                let i = value.as_i64().ok_or_else(|| ::ptc_orm::error::Error::Codec(
                    #field_name.to_string(), "expected integer for indexed enum".to_string(),
                ))?;
                <#ty as ::ptc_orm::registry::IndexedEnum>::from_index(i).ok_or_else(|| {
                    ::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("unknown enum index {i}"))
                })?
            }
        };
    }
    match col.scalar {
        ScalarKind::Bool => quote! {
            match value {
                ::ptc_orm::value::Value::Bool(b) => b,
                ::ptc_orm::value::Value::I64(i) => i != 0,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected bool, found {other:?}"))),
            }
        },
        ScalarKind::I64 => {
            let ty = &col.inner_ty;
            quote! {
                (value.as_i64().ok_or_else(|| ::ptc_orm::error::Error::Codec(
                    #field_name.to_string(), "expected integer".to_string(),
                ))?) as #ty
            }
        }
        ScalarKind::F64 => {
            let ty = &col.inner_ty;
            quote! {
                match value {
                    ::ptc_orm::value::Value::F64(f) => f as #ty,
                    other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected float, found {other:?}"))),
                }
            }
        }
        ScalarKind::Str => quote! {
            match value {
                ::ptc_orm::value::Value::Str(s) => s,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected string, found {other:?}"))),
            }
        },
        ScalarKind::Bytes => quote! {
            match value {
                ::ptc_orm::value::Value::Bytes(b) => b,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected bytes, found {other:?}"))),
            }
        },
        ScalarKind::Custom => {
            let ty = &col.inner_ty;
            quote! {
                {
                    let codec = ::ptc_orm::registry::lookup_single(::std::any::TypeId::of::<#ty>())
                        .ok_or_else(|| ::ptc_orm::error::Error::Codec(#field_name.to_string(), "no codec registered".to_string()))?;
                    *(codec.deserialize)(&value)?
                        .downcast::<#ty>()
                        .map_err(|_| ::ptc_orm::error::Error::Codec(#field_name.to_string(), "codec downcast mismatch".to_string()))?
                }
            }
        }
    }
}

fn from_bundle_fn(model: &EntityModel, columns: &[&ColumnPlan], links: &[&LinkPlan]) -> TokenStream {
    let column_lets: Vec<TokenStream> = columns
        .iter()
        .map(|col| {
            let field_ident = &col.field_ident;
            let column_name = &col.column_name;
            let decode = decode_scalar(col);
            if col.nullable {
                quote! {
                    let #field_ident = {
                        let value = bundle.get(&format!("{prefix}{}", #column_name)).cloned().unwrap_or(::ptc_orm::value::Value::Null);
                        if value.is_null() { None } else { Some(#decode) }
                    };
                }
            } else {
                quote! {
                    let #field_ident = {
                        let value = bundle.get(&format!("{prefix}{}", #column_name)).cloned().unwrap_or(::ptc_orm::value::Value::Null);
                        #decode
                    };
                }
            }
        })
        .collect();

    let link_lets: Vec<TokenStream> = links
        .iter()
        .map(|link| {
            let field_ident = &link.field_ident;
            let fk_column = &link.fk_column;
            let target = &link.target_elem;
            quote! {
                let #field_ident = {
                    let target_descriptor = <#target as ::ptc_orm::metadata::Entity>::descriptor();
                    let nested_prefix = format!("{prefix}{}", ::ptc_orm::link::link_prefix(#fk_column));
                    let present = target_descriptor
                        .primary_key_column()
                        .and_then(|pk| bundle.get(&format!("{nested_prefix}{}", pk.column_name)))
                        .map(|v| !v.is_null())
                        .unwrap_or(false);
                    if present {
                        Some(Box::new(<#target as ::ptc_orm::metadata::Entity>::from_bundle(bundle, &nested_prefix)?))
                    } else {
                        None
                    }
                };
            }
        })
        .collect();

    let collection_lets: Vec<TokenStream> = model
        .fields
        .iter()
        .filter_map(|f| match f {
            FieldPlan::Collection(c) => {
                let field_ident = &c.field_ident;
                Some(quote! { let #field_ident = ::std::default::Default::default(); })
            }
            _ => None,
        })
        .collect();

    let ignored_lets: Vec<TokenStream> = model
        .fields
        .iter()
        .filter_map(|f| match f {
            FieldPlan::Ignored(ig) => {
                let field_ident = &ig.field_ident;
                match &ig.default_expr {
                    Some(expr) => Some(quote! { let #field_ident = #expr; }),
                    None => Some(quote! { let #field_ident = ::std::default::Default::default(); }),
                }
            }
            _ => None,
        })
        .collect();

    let field_idents: Vec<&Ident> = model
        .fields
        .iter()
        .map(|f| match f {
            FieldPlan::Column(c) => &c.field_ident,
            FieldPlan::Link(l) => &l.field_ident,
            FieldPlan::Collection(c) => &c.field_ident,
            FieldPlan::Ignored(i) => &i.field_ident,
        })
        .collect();

    quote! {
        fn from_bundle(bundle: &::ptc_orm::metadata::BundleMap, prefix: &str) -> ::ptc_orm::error::Result<Self> {
            #(#column_lets)*
            #(#link_lets)*
            #(#collection_lets)*
            #(#ignored_lets)*
            Ok(Self { #(#field_idents),* })
        }
    }
}

fn set_column_fn(entity_name: &str, columns: &[&ColumnPlan]) -> TokenStream {
    let arms: Vec<TokenStream> = columns
        .iter()
        .map(|col| {
            let field_ident = &col.field_ident;
            let column_name = &col.column_name;
            let decode = decode_scalar(col);
            if col.nullable {
                quote! {
                    #column_name => {
                        self.#field_ident = if value.is_null() { None } else { Some(#decode) };
                    }
                }
            } else {
                quote! {
                    #column_name => {
                        self.#field_ident = #decode;
                    }
                }
            }
        })
        .collect();

    quote! {
        fn set_column(&mut self, column: &str, value: ::ptc_orm::value::Value) -> ::ptc_orm::error::Result<()> {
            match column {
                #(#arms)*
                _ => return Err(::ptc_orm::error::Error::UnknownField(column.to_string(), #entity_name)),
            }
            Ok(())
        }
    }
}

fn primary_key_value_fn(columns: &[&ColumnPlan]) -> TokenStream {
    let pk = columns.iter().find(|c| c.is_primary_key);
    match pk {
        None => quote! {
            fn primary_key_value(&self) -> Option<::ptc_orm::value::Value> {
                None
            }
        },
        Some(col) => {
            let field_ident = &col.field_ident;
            let encode = encode_scalar(col);
            if col.nullable {
                quote! {
                    fn primary_key_value(&self) -> Option<::ptc_orm::value::Value> {
                        match &self.#field_ident {
                            Some(v) => Some(#encode),
                            None => None,
                        }
                    }
                }
            } else {
                quote! {
                    fn primary_key_value(&self) -> Option<::ptc_orm::value::Value> {
                        let v = &self.#field_ident;
                        Some(#encode)
                    }
                }
            }
        }
    }
}

fn linked_entities_mut_fn(links: &[&LinkPlan]) -> TokenStream {
    let entries: Vec<TokenStream> = links
        .iter()
        .map(|link| {
            let field_ident = &link.field_ident;
            let fk_column = &link.fk_column;
            quote! {
                (#fk_column, self.#field_ident.as_mut().map(|b| b.as_mut() as &mut dyn ::ptc_orm::metadata::AnyEntity))
            }
        })
        .collect();

    quote! {
        fn linked_entities_mut(&mut self) -> Vec<(&'static str, Option<&mut dyn ::ptc_orm::metadata::AnyEntity>)> {
            vec![#(#entries),*]
        }
    }
}

fn collection_element_ty_encode(ty: &syn::Type, scalar: ScalarKind, var: &TokenStream) -> TokenStream {
    match scalar {
        ScalarKind::Bool => quote! { ::ptc_orm::value::Value::Bool(*#var) },
        ScalarKind::I64 => quote! { ::ptc_orm::value::Value::I64((*#var) as i64) },
        ScalarKind::F64 => quote! { ::ptc_orm::value::Value::F64((*#var) as f64) },
        ScalarKind::Str => quote! { ::ptc_orm::value::Value::Str(#var.clone()) },
        ScalarKind::Bytes => quote! { ::ptc_orm::value::Value::Bytes(#var.clone()) },
        ScalarKind::Custom => {
            let _ = ty;
            unreachable!("custom collection elements are rejected before codegen")
        }
    }
}

fn collection_element_ty_decode(field_name: &str, ty: &syn::Type, scalar: ScalarKind, var: &TokenStream) -> TokenStream {
    match scalar {
        ScalarKind::Bool => quote! {
            match #var {
                ::ptc_orm::value::Value::Bool(b) => b,
                ::ptc_orm::value::Value::I64(i) => i != 0,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected bool element, found {other:?}"))),
            }
        },
        ScalarKind::I64 => quote! {
            (#var.as_i64().ok_or_else(|| ::ptc_orm::error::Error::Codec(#field_name.to_string(), "expected integer element".to_string()))?) as #ty
        },
        ScalarKind::F64 => quote! {
            match #var {
                ::ptc_orm::value::Value::F64(f) => f as #ty,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected float element, found {other:?}"))),
            }
        },
        ScalarKind::Str => quote! {
            match #var {
                ::ptc_orm::value::Value::Str(s) => s,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected string element, found {other:?}"))),
            }
        },
        ScalarKind::Bytes => quote! {
            match #var {
                ::ptc_orm::value::Value::Bytes(b) => b,
                other => return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), format!("expected bytes element, found {other:?}"))),
            }
        },
        ScalarKind::Custom => unreachable!("custom collection elements are rejected before codegen"),
    }
}

fn collection_values_fn(collections: &[&CollectionPlan]) -> TokenStream {
    let entries: Vec<TokenStream> = collections
        .iter()
        .map(|col| {
            let field_ident = &col.field_ident;
            let field_name = &col.field_name;
            let elem_ty = &col.element_ty;
            match col.shape {
                CollectionShape::List | CollectionShape::Set => {
                    let var = quote!(v);
                    let encode = collection_element_ty_encode(elem_ty, col.element_scalar, &var);
                    let variant = if col.shape == CollectionShape::List {
                        quote!(List)
                    } else {
                        quote!(Set)
                    };
                    quote! {
                        (#field_name, ::ptc_orm::metadata::CollectionValue::#variant(
                            self.#field_ident.iter().map(|v| #encode).collect()
                        ))
                    }
                }
                CollectionShape::Map => {
                    let key_ty = col.key_ty.as_ref().expect("map collection always carries a key type");
                    let key_scalar = col.key_scalar.expect("map collection always carries a key scalar kind");
                    let key_var = quote!(k);
                    let val_var = quote!(v);
                    let key_encode = collection_element_ty_encode(key_ty, key_scalar, &key_var);
                    let val_encode = collection_element_ty_encode(elem_ty, col.element_scalar, &val_var);
                    quote! {
                        (#field_name, ::ptc_orm::metadata::CollectionValue::Map(
                            self.#field_ident.iter().map(|(k, v)| (#key_encode, #val_encode)).collect()
                        ))
                    }
                }
            }
        })
        .collect();

    quote! {
        fn collection_values(&self) -> Vec<(&'static str, ::ptc_orm::metadata::CollectionValue)> {
            vec![#(#entries),*]
        }
    }
}

fn set_collection_fn(entity_name: &str, collections: &[&CollectionPlan]) -> TokenStream {
    let arms: Vec<TokenStream> = collections
        .iter()
        .map(|col| {
            let field_ident = &col.field_ident;
            let field_name = &col.field_name;
            let elem_ty = &col.element_ty;
            let var = quote!(value);
            let elem_decode = collection_element_ty_decode(field_name, elem_ty, col.element_scalar, &var);

            match col.shape {
                CollectionShape::List => quote! {
                    #field_name => {
                        let ::ptc_orm::metadata::CollectionValue::List(items) = value else {
                            return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), "expected List".to_string()));
                        };
                        let mut out = Vec::with_capacity(items.len());
                        for value in items {
                            out.push(#elem_decode);
                        }
                        self.#field_ident = out;
                    }
                },
                CollectionShape::Set => quote! {
                    #field_name => {
                        let ::ptc_orm::metadata::CollectionValue::Set(items) = value else {
                            return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), "expected Set".to_string()));
                        };
                        let mut out = ::std::collections::HashSet::new();
                        for value in items {
                            out.insert(#elem_decode);
                        }
                        self.#field_ident = out.into_iter().collect();
                    }
                },
                CollectionShape::Map => {
                    let key_ty = col.key_ty.as_ref().expect("map collection always carries a key type");
                    let key_scalar = col.key_scalar.expect("map collection always carries a key scalar kind");
                    let key_var = quote!(key);
                    let key_decode = collection_element_ty_decode(field_name, key_ty, key_scalar, &key_var);
                    quote! {
                        #field_name => {
                            let ::ptc_orm::metadata::CollectionValue::Map(pairs) = value else {
                                return Err(::ptc_orm::error::Error::Codec(#field_name.to_string(), "expected Map".to_string()));
                            };
                            let mut out = ::std::collections::HashMap::new();
                            for (key, value) in pairs {
                                out.insert(#key_decode, #elem_decode);
                            }
                            self.#field_ident = out.into_iter().collect();
                        }
                    }
                }
            }
        })
        .collect();

    quote! {
        fn set_collection(&mut self, field_name: &str, value: ::ptc_orm::metadata::CollectionValue) -> ::ptc_orm::error::Result<()> {
            match field_name {
                #(#arms)*
                _ => return Err(::ptc_orm::error::Error::UnknownField(field_name.to_string(), #entity_name)),
            }
            Ok(())
        }
    }
}
