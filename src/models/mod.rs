pub mod enums;
pub mod run_log;

pub use lab_test::*;
pub use run_log::*;
