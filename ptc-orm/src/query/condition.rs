use crate::value::Value;

/// The right-hand side of a comparison: either a bound parameter (the
/// common case) or another column reference, obtained via [`pre`] (§4.4).
#[derive(Debug, Clone)]
pub enum Operand {
    Literal(Value),
    Column(String),
}

pub fn pre(column_name: impl Into<String>) -> Operand {
    Operand::Column(column_name.into())
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(v: T) -> Self {
        Operand::Literal(v.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

/// Predicate AST node (C4). Rendered to SQL text + bound parameters only at
/// submission time (§9 "the SQL AST itself should be a tagged variant,
/// serialized only at submission time").
#[derive(Debug, Clone)]
pub enum Condition {
    Cmp {
        column: String,
        op: CmpOp,
        rhs: Operand,
    },
    Like {
        column: String,
        pattern: Operand,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    Between {
        column: String,
        lo: Value,
        hi: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Escape hatch for `raw_query`/`raw_update`/`raw_delete` (C7).
    Raw(String, Vec<Value>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, rhs: impl Into<Operand>) -> Self {
        Condition::Cmp { column: column.into(), op: CmpOp::Eq, rhs: rhs.into() }
    }
    pub fn ne(column: impl Into<String>, rhs: impl Into<Operand>) -> Self {
        Condition::Cmp { column: column.into(), op: CmpOp::Ne, rhs: rhs.into() }
    }
    pub fn gt(column: impl Into<String>, rhs: impl Into<Operand>) -> Self {
        Condition::Cmp { column: column.into(), op: CmpOp::Gt, rhs: rhs.into() }
    }
    pub fn ge(column: impl Into<String>, rhs: impl Into<Operand>) -> Self {
        Condition::Cmp { column: column.into(), op: CmpOp::Ge, rhs: rhs.into() }
    }
    pub fn lt(column: impl Into<String>, rhs: impl Into<Operand>) -> Self {
        Condition::Cmp { column: column.into(), op: CmpOp::Lt, rhs: rhs.into() }
    }
    pub fn le(column: impl Into<String>, rhs: impl Into<Operand>) -> Self {
        Condition::Cmp { column: column.into(), op: CmpOp::Le, rhs: rhs.into() }
    }
    pub fn like(column: impl Into<String>, pattern: impl Into<Operand>) -> Self {
        Condition::Like { column: column.into(), pattern: pattern.into() }
    }
    pub fn in_(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In { column: column.into(), values }
    }
    pub fn between(column: impl Into<String>, lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        Condition::Between { column: column.into(), lo: lo.into(), hi: hi.into() }
    }

    pub fn and(self, other: Condition) -> Condition {
        match self {
            Condition::And(mut clauses) => {
                clauses.push(other);
                Condition::And(clauses)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Condition {
        match self {
            Condition::Or(mut clauses) => {
                clauses.push(other);
                Condition::Or(clauses)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    pub fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

macro_rules! impl_value_from {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Value {
                Value::$variant(v.into())
            }
        }
    };
}

impl_value_from!(bool, Bool);
impl_value_from!(i32, I64);
impl_value_from!(i64, I64);
impl_value_from!(f64, F64);
impl_value_from!(f32, F64);
impl_value_from!(String, Str);

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_and_flattens_into_one_variadic_clause() {
        let cond = Condition::eq("world", "w").and(Condition::gt("x", 10i64)).and(Condition::lt("x", 50i64));
        match cond {
            Condition::And(clauses) => assert_eq!(clauses.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn and_then_or_does_not_flatten_across_operators() {
        let cond = Condition::eq("a", 1i64).and(Condition::eq("b", 2i64)).or(Condition::eq("c", 3i64));
        match cond {
            Condition::Or(clauses) => assert_eq!(clauses.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn pre_builds_a_column_operand_not_a_literal() {
        match pre("other_col") {
            Operand::Column(name) => assert_eq!(name, "other_col"),
            Operand::Literal(_) => panic!("pre() must not bind as a parameter"),
        }
    }

    #[test]
    fn bare_values_bind_as_literals() {
        match Operand::from(5i64) {
            Operand::Literal(Value::I64(5)) => {}
            other => panic!("expected Literal(I64(5)), got {other:?}"),
        }
    }
}
