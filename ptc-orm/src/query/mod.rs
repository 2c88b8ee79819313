//! The Condition/Query Builder (C4): an AST built via chained methods,
//! rendered to dialect-specific SQL text only when a [`crate::mapper`]
//! operation submits it.

pub mod builder;
pub mod condition;
pub mod join;
pub mod render;

pub use builder::Query;
pub use condition::{pre, CmpOp, Condition, Operand};
pub use join::{Join, JoinKind, JoinSource, SelectAs};
pub use render::{render_condition, render_select, Rendered};
