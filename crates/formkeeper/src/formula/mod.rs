//! Formula evaluation for calculated fields.
//!
//! Formulas are small arithmetic expressions over field ids, such as
//! `annual_loan_cost + maintenance_fee_annual`. They are never executed as
//! code: the expression is sanitized, parsed into an [`Expr`] tree and
//! evaluated against a [`Scope`] of field values.
//!
//! - **Sanitizing** drops every character outside
//!   `[A-Za-z0-9_]`, whitespace and `+ - * / ( ) .`.
//!
//! - **Resolution** treats missing or non-numeric variables as 0.
//!
//! - **Failure** of any kind (empty input, syntax error, division by zero,
//!   other non-finite results) yields `None` rather than an error. Formulas
//!   beyond [`MAX_TOKENS`] tokens or [`MAX_NESTING`] levels of parentheses
//!   count as syntax errors.

mod eval;
mod parser;

pub use eval::{eval_expr, evaluate, sanitize, to_number, Scope};
pub use parser::{parse, Expr, FormulaError, Op, MAX_NESTING, MAX_TOKENS};
