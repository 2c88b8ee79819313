//! Renders the Condition/Query AST (C4) to SQL text plus an ordered parameter
//! vector, against a chosen [`Dialect`]. Kept as a pure function module —
//! the AST itself carries no dialect knowledge, matching the intent behind
//! keeping C3 and C4 as separate, independently testable concerns.

use crate::dialect::Dialect;
use crate::query::builder::Query;
use crate::query::condition::{CmpOp, Condition, Operand};
use crate::query::join::JoinSource;
use crate::value::Value;

/// A fully rendered statement: SQL text with dialect placeholders already
/// substituted, and the bound parameters in the exact order those
/// placeholders appear.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quotes each `.`-separated segment of a possibly-qualified identifier
/// (`alias.column`) independently — plain column names pass through quoted
/// once, same as before.
fn quote_qualified(dialect: &dyn Dialect, ident: &str) -> String {
    ident.split('.').map(|part| dialect.quote_ident(part)).collect::<Vec<_>>().join(".")
}

pub fn render_select(query: &Query, dialect: &dyn Dialect) -> Rendered {
    let mut params = Vec::new();
    let sql = render_select_inner(query, dialect, &mut params);
    Rendered { sql, params }
}

/// Renders a standalone predicate (used by `raw_query`/cache fingerprinting
/// call sites that already have a `Condition` in hand without a full
/// [`Query`] wrapped around it).
pub fn render_condition(cond: &Condition, dialect: &dyn Dialect) -> Rendered {
    let mut params = Vec::new();
    let sql = render_term(cond, dialect, &mut params);
    Rendered { sql, params }
}

fn render_select_inner(query: &Query, dialect: &dyn Dialect, params: &mut Vec<Value>) -> String {
    let mut sql = String::from("SELECT ");

    if !query.select_as.is_empty() {
        let cols: Vec<String> = query
            .select_as
            .iter()
            .map(|s| format!("{} AS {}", quote_qualified(dialect, &s.column), dialect.quote_ident(&s.alias)))
            .collect();
        sql.push_str(&cols.join(", "));
    } else if !query.projection.is_empty() {
        let cols: Vec<String> = query.projection.iter().map(|c| quote_qualified(dialect, c)).collect();
        sql.push_str(&cols.join(", "));
    } else {
        sql.push('*');
    }

    sql.push_str(" FROM ");
    sql.push_str(&dialect.quote_ident(&query.from));

    for join in &query.joins {
        sql.push(' ');
        sql.push_str(join.kind.as_sql());
        sql.push(' ');
        match &join.source {
            JoinSource::Typed { table } => sql.push_str(&dialect.quote_ident(table)),
            JoinSource::Raw(text) => sql.push_str(text),
            JoinSource::SubQuery { alias, query: sub } => {
                // Rendered before this join's ON clauses and before the
                // outer WHERE, so its params land first in the final order.
                sql.push('(');
                sql.push_str(&render_select_inner(sub, dialect, params));
                sql.push(')');
                sql.push_str(" AS ");
                sql.push_str(&dialect.quote_ident(alias));
            }
        }
        if !join.on.is_empty() {
            sql.push_str(" ON ");
            let parts: Vec<String> = join.on.iter().map(|c| render_term(c, dialect, params)).collect();
            sql.push_str(&parts.join(" AND "));
        }
    }

    if let Some(where_) = &query.where_ {
        sql.push_str(" WHERE ");
        sql.push_str(&render_term(where_, dialect, params));
    }

    if !query.group_by.is_empty() {
        let cols: Vec<String> = query.group_by.iter().map(|c| quote_qualified(dialect, c)).collect();
        sql.push_str(" GROUP BY ");
        sql.push_str(&cols.join(", "));
    }

    if !query.order_by.is_empty() {
        let parts: Vec<String> = query
            .order_by
            .iter()
            .map(|(c, asc)| format!("{} {}", quote_qualified(dialect, c), if *asc { "ASC" } else { "DESC" }))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&parts.join(", "));
    }

    sql.push_str(&dialect.limit_offset(query.limit, query.offset));

    sql
}

/// Renders one AST node, wrapping it in parens when it is a multi-clause
/// `And`/`Or` nested inside another boolean combinator — explicit
/// parenthesization rather than relying on SQL operator precedence.
fn render_term(cond: &Condition, dialect: &dyn Dialect, params: &mut Vec<Value>) -> String {
    let rendered = render_condition_inner(cond, dialect, params);
    match cond {
        Condition::And(clauses) | Condition::Or(clauses) if clauses.len() > 1 => format!("({rendered})"),
        _ => rendered,
    }
}

fn render_operand(op: &Operand, dialect: &dyn Dialect, params: &mut Vec<Value>) -> String {
    match op {
        Operand::Column(name) => quote_qualified(dialect, name),
        Operand::Literal(value) => {
            params.push(value.clone());
            dialect.placeholder(params.len())
        }
    }
}

fn render_condition_inner(cond: &Condition, dialect: &dyn Dialect, params: &mut Vec<Value>) -> String {
    match cond {
        Condition::Cmp { column, op, rhs } => {
            let op_sql: &str = match op {
                CmpOp::Eq => "=",
                CmpOp::Ne => "<>",
                CmpOp::Gt => ">",
                CmpOp::Ge => ">=",
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
            };
            format!(
                "{} {} {}",
                quote_qualified(dialect, column),
                op_sql,
                render_operand(rhs, dialect, params)
            )
        }
        Condition::Like { column, pattern } => {
            format!(
                "{} LIKE {}",
                quote_qualified(dialect, column),
                render_operand(pattern, dialect, params)
            )
        }
        Condition::In { column, values } => {
            if values.is_empty() {
                // An empty IN list matches nothing, by definition.
                return "1 = 0".to_string();
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| {
                    params.push(v.clone());
                    dialect.placeholder(params.len())
                })
                .collect();
            format!("{} IN ({})", quote_qualified(dialect, column), placeholders.join(", "))
        }
        Condition::Between { column, lo, hi } => {
            params.push(lo.clone());
            let lo_p = dialect.placeholder(params.len());
            params.push(hi.clone());
            let hi_p = dialect.placeholder(params.len());
            format!("{} BETWEEN {} AND {}", quote_qualified(dialect, column), lo_p, hi_p)
        }
        Condition::And(clauses) => {
            let parts: Vec<String> = clauses.iter().map(|c| render_term(c, dialect, params)).collect();
            parts.join(" AND ")
        }
        Condition::Or(clauses) => {
            let parts: Vec<String> = clauses.iter().map(|c| render_term(c, dialect, params)).collect();
            parts.join(" OR ")
        }
        Condition::Not(inner) => format!("NOT ({})", render_term(inner, dialect, params)),
        Condition::Raw(sql, values) => {
            params.extend(values.iter().cloned());
            sql.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::query::condition::pre;
    use crate::query::join::{Join, JoinKind};

    #[test]
    fn simple_select_quotes_identifiers_and_binds_the_where_literal() {
        let query = Query::from("player_home").where_(Condition::eq("username", "u"));
        let rendered = render_select(&query, &SqliteDialect);
        assert_eq!(rendered.sql, "SELECT * FROM `player_home` WHERE `username` = ?");
        assert_eq!(rendered.params, vec![Value::Str("u".into())]);
    }

    #[test]
    fn like_in_and_between_all_bind_through_placeholders() {
        let query = Query::from("t").where_(
            Condition::like("name", "a%")
                .and(Condition::in_("id", vec![Value::I64(1), Value::I64(2)]))
                .and(Condition::between("x", 1.0, 9.0)),
        );
        let rendered = render_select(&query, &SqliteDialect);
        assert_eq!(
            rendered.sql,
            "SELECT * FROM `t` WHERE (`name` LIKE ? AND `id` IN (?, ?) AND `x` BETWEEN ? AND ?)"
        );
        assert_eq!(
            rendered.params,
            vec![Value::Str("a%".into()), Value::I64(1), Value::I64(2), Value::F64(1.0), Value::F64(9.0)]
        );
    }

    #[test]
    fn empty_in_list_matches_nothing_without_binding_a_param() {
        let query = Query::from("t").where_(Condition::in_("id", vec![]));
        let rendered = render_select(&query, &SqliteDialect);
        assert_eq!(rendered.sql, "SELECT * FROM `t` WHERE 1 = 0");
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn postgres_placeholders_are_numbered_across_the_whole_statement() {
        let query = Query::from("t").where_(Condition::eq("a", 1i64).and(Condition::eq("b", 2i64)));
        let rendered = render_select(&query, &PostgresDialect);
        assert_eq!(rendered.sql, "SELECT * FROM \"t\" WHERE (\"a\" = $1 AND \"b\" = $2)");
    }

    #[test]
    fn self_join_uses_the_raw_aliased_form_for_the_second_side() {
        // S4: the main table stands in for "h1" unaliased, a raw string-form
        // join introduces the second copy of the same table under its own
        // alias, joined on a pair of columns from each side.
        let query = Query::from("player_home").join(
            Join::raw(JoinKind::Inner, "player_home AS h2")
                .on(Condition::Cmp {
                    column: "player_home.world".into(),
                    op: CmpOp::Eq,
                    rhs: Operand::Column("h2.world".into()),
                })
                .on(Condition::Cmp {
                    column: "player_home.username".into(),
                    op: CmpOp::Lt,
                    rhs: Operand::Column("h2.username".into()),
                }),
        );
        let rendered = render_select(&query, &SqliteDialect);
        assert_eq!(
            rendered.sql,
            "SELECT * FROM `player_home` INNER JOIN player_home AS h2 ON `player_home`.`world` = `h2`.`world` AND `player_home`.`username` < `h2`.`username`"
        );
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn subquery_params_precede_on_params_which_precede_outer_where_params() {
        // Testable Property #10: final bound order is [p_sub, p_on, p_where].
        let sub = Query::from("accounts").where_(Condition::eq("active", true));
        let outer = Query::from("orders")
            .join(
                Join::sub_query(JoinKind::Inner, "a", sub)
                    .on(Condition::eq("orders.account_id", pre("a.id")).and(Condition::eq("a.region", "us"))),
            )
            .where_(Condition::gt("orders.total", 100i64));
        let rendered = render_select(&outer, &SqliteDialect);

        assert_eq!(
            rendered.sql,
            "SELECT * FROM `orders` INNER JOIN (SELECT * FROM `accounts` WHERE `active` = ?) AS `a` \
ON (`orders`.`account_id` = `a`.`id` AND `a`.`region` = ?) WHERE `orders`.`total` > ?"
        );
        assert_eq!(
            rendered.params,
            vec![Value::Bool(true), Value::Str("us".into()), Value::I64(100)]
        );
    }

    #[test]
    fn not_wraps_its_inner_clause_in_parens() {
        let rendered = render_condition(&Condition::eq("a", 1i64).and(Condition::eq("b", 2i64)).not(), &SqliteDialect);
        assert_eq!(rendered.sql, "NOT ((`a` = ? AND `b` = ?))");
    }
}
