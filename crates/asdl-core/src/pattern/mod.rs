//! Pattern expression service: parsing, axis algebra, expansion, binding.
//!
//! Expressions live in a per-module [`ExprRegistry`] keyed by [`ExprId`];
//! graph nodes hold the numeric ID, never the expression itself. All
//! functions here are pure over the registry and an [`AxisTable`].

mod bind;
mod expand;
mod parse;

pub use bind::{bind, BindError, BindingPlan};
pub use expand::{
    expand, range_labels, shape, AxisDef, AxisInsert, AxisKind, AxisTable, ExpandError,
    ExprShape, ShapeAxis,
};
pub use parse::{parse_pattern, Group, GroupBody, PatternError, PatternExpr, Token};

use crate::ids::ExprId;

/// Hard bound on the number of atoms a single expression may expand to.
pub const DEFAULT_MAX_EXPANSION: usize = 10_000;

/// Where an expression was authored; decides which atoms are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    /// Net, instance or port name: atoms must be plain identifiers.
    Name,
    /// Endpoint token: atoms must split into `instance.pin`, and the
    /// instance side may be a `*` glob.
    Endpoint,
    /// Instance parameter value: atoms are free-form.
    Param,
}

/// A parsed expression together with its registration context.
#[derive(Debug, Clone)]
pub struct RegisteredExpr {
    pub id: ExprId,
    pub ctx: ExprContext,
    pub expr: PatternExpr,
}

impl RegisteredExpr {
    pub fn raw(&self) -> &str {
        &self.expr.raw
    }
}

/// Module-local arena of parsed pattern expressions.
#[derive(Debug, Default)]
pub struct ExprRegistry {
    exprs: Vec<RegisteredExpr>,
}

impl ExprRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and intern `raw`. Tokens without any pattern syntax short-cut
    /// to a trivial single-literal parse, so every authored token gets an
    /// `ExprId` whether or not it uses patterns.
    pub fn register(&mut self, raw: &str, ctx: ExprContext) -> Result<ExprId, PatternError> {
        let expr = if raw.contains(['<', '>', ';', '*']) {
            parse_pattern(raw)?
        } else {
            PatternExpr::trivial(raw)
        };
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(RegisteredExpr { id, ctx, expr });
        Ok(id)
    }

    pub fn get(&self, id: ExprId) -> &RegisteredExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredExpr> {
        self.exprs.iter()
    }
}
