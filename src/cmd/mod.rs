//! CLI command implementations.
//!
//! | Module   | Commands handled   |
//! |----------|--------------------|
//! | `config` | `Init`, `Config`   |
//! | `plan`   | `Plan`             |
//! | `run`    | `Run`              |
//! | `memory` | `Memory`           |

pub mod config;
pub mod memory;
pub mod plan;
pub mod run;

pub use config::{cmd_config, cmd_init};
pub use memory::cmd_memory;
pub use plan::cmd_plan;
pub use run::{RunOptions, cmd_run};
