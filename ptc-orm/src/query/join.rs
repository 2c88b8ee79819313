use crate::metadata::Entity;
use crate::query::condition::Condition;
use crate::query::builder::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// The three join forms of §4.4: a typed entity join, a raw string form for
/// self-joins (two aliased copies of the same table), and a subquery join.
#[derive(Debug, Clone)]
pub enum JoinSource {
    Typed { table: String },
    Raw(String),
    SubQuery { alias: String, query: Box<Query> },
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub source: JoinSource,
    /// AND-combined `ON` clauses — `.on(pred)` may be called more than once.
    pub on: Vec<Condition>,
}

impl Join {
    pub fn typed<E: Entity>(kind: JoinKind) -> Self {
        Join {
            kind,
            source: JoinSource::Typed { table: E::descriptor().table_name.clone() },
            on: Vec::new(),
        }
    }

    pub fn raw(kind: JoinKind, qualified_with_alias: impl Into<String>) -> Self {
        Join { kind, source: JoinSource::Raw(qualified_with_alias.into()), on: Vec::new() }
    }

    pub fn sub_query(kind: JoinKind, alias: impl Into<String>, query: Query) -> Self {
        Join {
            kind,
            source: JoinSource::SubQuery { alias: alias.into(), query: Box::new(query) },
            on: Vec::new(),
        }
    }

    pub fn on(mut self, pred: Condition) -> Self {
        self.on.push(pred);
        self
    }
}

/// A single `col AS alias` projection entry, resolving same-name conflicts
/// across joined sides (§4.4 `selectAs`).
#[derive(Debug, Clone)]
pub struct SelectAs {
    pub column: String,
    pub alias: String,
}
