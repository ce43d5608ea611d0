//! Command implementations.

mod list;
mod run;
mod validate;

pub use list::{list_backends, list_devices};
pub use run::run_scenario;
pub use validate::run_validate;
