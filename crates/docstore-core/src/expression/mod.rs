//! The expression language: condition, update and projection expressions.
//!
//! Text goes through three stages:
//!
//! 1. **Parsing**: the lexer and recursive-descent parser build an AST.
//! 2. **Binding**: placeholders are checked against the caller's name and
//!    value maps and local type checks run ([`binder`]).
//! 3. **Evaluation**: the store walks the AST against stored items
//!    ([`evaluator`]).

pub mod ast;
pub mod binder;
pub mod evaluator;
pub mod parser;

pub use ast::{AttributePath, Expr, Operand, PathElement, Projection, UpdateExpr};
pub use binder::{AttributeTypes, Binder, BoundExpression, Grammar, NameMap, ValueMap, bind};
pub use evaluator::EvalContext;
pub use parser::{ExpressionError, parse_condition, parse_projection, parse_update};
