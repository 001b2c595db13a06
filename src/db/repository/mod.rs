//! Repository layer: entity-scoped database operations.

mod lab_test;
mod run_log;
mod settings;

pub use lab_test::*;
pub use run_log::*;
pub use settings::*;
