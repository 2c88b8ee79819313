use thiserror::Error;

/// Every fallible surface of the core funnels into this enum (§7).
#[derive(Debug, Error)]
pub enum Error {
    /// The entity descriptor could not be built — invalid markers, or an
    /// `#[entity(ignore)]` field with no declared default (§9 Open Questions).
    #[error("entity descriptor for `{0}` is invalid: {1}")]
    Descriptor(&'static str, String),

    /// DDL generation or execution failed during table creation.
    #[error("DDL error on table `{0}`: {1}")]
    Ddl(String, String),

    /// A migration step failed; the table is pinned at its pre-migration
    /// version for the remainder of the process (§4.5, §7).
    #[error("migration to version {1} failed for table `{0}`: {2}")]
    Migration(String, i64, String),

    /// A cursor operation was attempted without an active transaction on the
    /// calling task (§5).
    #[error("cursor operations require an active transaction")]
    CursorWithoutTransaction,

    /// The connection pool could not hand out a connection.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Wraps any lower-level `sqlx` failure (constraint violations, syntax
    /// errors in raw SQL escape hatches, etc.).
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A value could not be converted to or from its declared column type.
    #[error("codec error on column `{0}`: {1}")]
    Codec(String, String),

    /// The requested column, link field, or collection field does not exist
    /// on this entity's descriptor.
    #[error("no such field `{0}` on entity `{1}`")]
    UnknownField(String, &'static str),

    /// A row was required but not found (used by keyed/rowid lookups that
    /// have no `Option`-returning contract, e.g. accessor views).
    #[error("row not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
