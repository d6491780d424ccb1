//! Rego policy validation
//!
//! Two strategies sit behind the [`PolicyValidator`] trait: one shells out
//! to the OPA binary, the other performs a reduced-confidence textual check
//! when OPA is not installed. [`select_validator`] picks one at startup.

pub mod error;
pub mod validator;

pub use error::ValidatorError;
pub use validator::{
    select_validator, BasicValidator, EvaluationReport, OpaValidator, PolicyValidator,
    ValidationReport,
};
