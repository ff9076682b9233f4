//! CLI command implementations.
//!
//! | Module    | Commands handled    |
//! |-----------|---------------------|
//! | `run`     | `Run`               |
//! | `history` | `History`           |
//! | `report`  | `Report`, `Fixit`   |

pub mod history;
pub mod report;
pub mod run;

pub use history::cmd_history;
pub use report::{cmd_fixit, cmd_report};
pub use run::cmd_run;
