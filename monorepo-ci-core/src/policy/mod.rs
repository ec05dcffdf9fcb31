// opa/rego policy tooling: module validation and rego unit tests

pub mod opa;
pub mod validator;
pub mod verdict;

pub use rego_test::{run_rego_tests, RegoTestArgs};
pub use validator::{validate_module, ValidateModuleArgs};
pub use verdict::{interpret_eval_output, RuleOutcome, Violation};
