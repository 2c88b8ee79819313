//! `ptc_orm` — an object-relational mapper core over `sqlx`'s `Any`-erased
//! driver family (SQLite, MySQL, PostgreSQL). A record type annotated with
//! `#[derive(Entity)]` gets schema inference, DDL/migrations, a typed
//! condition/query builder, cascading link and collection engines,
//! thread-scoped transactions, and an optional two-layer cache — all behind
//! one [`mapper::DataMapper`] handle per record type.
//!
//! ```ignore
//! use ptc_orm::{DataMapper, MapperConfig, DataSourceConfig};
//!
//! #[derive(ptc_orm::Entity, Clone)]
//! struct Article {
//!     #[entity(primary_key, auto)]
//!     id: i64,
//!     title: String,
//! }
//!
//! # async fn run() -> ptc_orm::Result<()> {
//! let source = DataSourceConfig::sqlite_file("articles.db");
//! let mapper: DataMapper<Article> = DataMapper::new(&source, MapperConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collection;
pub mod config;
pub mod dialect;
pub mod error;
pub mod link;
pub mod mapper;
pub mod metadata;
pub mod migration;
pub mod pool;
pub mod query;
pub mod registry;
pub mod value;

pub use config::{BackendKind, DataSourceConfig, StructuredConfig};
pub use error::{Error, Result};
pub use mapper::{Cursor, DataMapper, JoinQuery, MapperConfig, Page};
pub use metadata::{
    AnyEntity, BundleMap, CollectionFieldDescriptor, CollectionKind, CollectionValue,
    ColumnDescriptor, Entity, EntityDescriptor, LinkFieldDescriptor, MigrationStep,
};
pub use query::{pre, render_condition, render_select, CmpOp, Condition, Join, JoinKind, JoinSource, Operand, Query, Rendered, SelectAs};
pub use registry::{register_collection, register_single, CollectionCodec, IndexedEnum, SingleValueCodec};
pub use value::{bind_arguments, ColumnKind, Value};

pub use ptc_orm_derive::Entity;
