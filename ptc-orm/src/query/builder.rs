use crate::query::condition::Condition;
use crate::query::join::{Join, JoinKind, SelectAs};

/// The query AST (C4): projection, joins, predicate, grouping/ordering,
/// limit/offset. An immutable builder chain — each method consumes and
/// returns `Self` — serialized to SQL text only at submission time.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub from: String,
    pub projection: Vec<String>,
    pub select_as: Vec<SelectAs>,
    pub joins: Vec<Join>,
    pub where_: Option<Condition>,
    pub group_by: Vec<String>,
    pub order_by: Vec<(String, bool)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Query {
    pub fn from(table: impl Into<String>) -> Self {
        Query { from: table.into(), ..Default::default() }
    }

    pub fn rows(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn select_as(mut self, pairs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.select_as = pairs
            .into_iter()
            .map(|(c, a)| SelectAs { column: c.into(), alias: a.into() })
            .collect();
        self
    }

    pub fn where_(mut self, cond: Condition) -> Self {
        self.where_ = Some(match self.where_ {
            Some(existing) => existing.and(cond),
            None => cond,
        });
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(self, join: Join) -> Self {
        self.join(Join { kind: JoinKind::Inner, ..join })
    }

    pub fn left_join(self, join: Join) -> Self {
        self.join(Join { kind: JoinKind::Left, ..join })
    }

    pub fn group_by(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.group_by = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by_asc(mut self, col: impl Into<String>) -> Self {
        self.order_by.push((col.into(), true));
        self
    }

    pub fn order_by_desc(mut self, col: impl Into<String>) -> Self {
        self.order_by.push((col.into(), false));
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }
}
