//! `#[derive(Entity)]` — compiles a struct annotated with `#[entity(...)]`
//! attributes into an `impl Entity` that builds its [`EntityDescriptor`] once
//! (behind a `OnceLock`) and encodes/decodes itself against it. This is the
//! compile-time substitute for the reflective field enumeration the original
//! system does at runtime (§9 Open Questions).
//!
//! [`EntityDescriptor`]: https://docs.rs/ptc-orm/latest/ptc_orm/metadata/struct.EntityDescriptor.html

mod attrs;
mod expand;
mod model;

use darling::FromDeriveInput;
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

use attrs::EntityOpts;

/// Derives `ptc_orm::metadata::Entity` for a named-field struct.
///
/// ```ignore
/// #[derive(Entity, Clone)]
/// #[entity(table = "articles")]
/// struct Article {
///     #[entity(primary_key, auto)]
///     id: i64,
///     title: String,
///     #[entity(link = "Author")]
///     author: Option<Box<Author>>,
///     author_id: i64,
///     tags: Vec<String>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let opts = match EntityOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };
    let model = match model::build_model(opts) {
        Ok(model) => model,
        Err(e) => return e.to_compile_error().into(),
    };
    expand::expand(model).into()
}
