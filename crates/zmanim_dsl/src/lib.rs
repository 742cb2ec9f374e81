//! Formula language for zmanim.
//!
//! A formula is a small expression over astronomical primitives
//! (`visible_sunrise`, `solar_noon`, ...), built-in functions
//! (`solar`, `proportional_hours`, `first_valid`, ...), durations and
//! references to other entries (`@alos`). This crate provides:
//! - [`parse`]: text to syntax tree, with line/column errors
//! - [`validate`] / [`validate_formula`]: authoring-time checks
//! - [`calculation_order`]: dependency ordering with cycle isolation
//! - [`evaluate`] / [`evaluate_with_breakdown`]: tree to instant
//!
//! ```
//! use chrono::{FixedOffset, NaiveDate};
//! use zmanim_astro::GeoLocation;
//! use zmanim_dsl::{EvaluationContext, References, evaluate_formula};
//!
//! let ctx = EvaluationContext::new(
//!     NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
//!     GeoLocation::new(31.778, 35.235, 754.0),
//!     FixedOffset::east_opt(2 * 3600).unwrap(),
//! )
//! .unwrap();
//! let alos = evaluate_formula("solar(16.1, before_sunrise)", &ctx, &References::new(), false)
//!     .unwrap();
//! assert!(alos.instant < ctx.sun().visible_sunrise.instant().unwrap());
//! ```

pub mod ast;
pub mod catalog;
pub mod context;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod validator;
pub mod value;

pub use ast::{Base, BinaryOp, Call, CompareOp, Cond, Expr};
pub use catalog::{ConditionVar, DayBase, DayBounds, Direction, Function, NamedMethod, Primitive};
pub use context::{EvaluationContext, NoCrossingPolicy};
pub use error::{DslError, ErrorKind};
pub use eval::{
    Evaluation, Evaluator, References, Step, evaluate, evaluate_formula, evaluate_with_breakdown,
};
pub use lexer::tokenize;
pub use parser::parse;
pub use validator::{
    CalculationOrder, ValidationIssue, calculation_order, extract_references, formula_references,
    order_formulas, validate, validate_formula,
};
pub use value::{Value, ValueType};
