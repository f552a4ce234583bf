//! CLI command handlers, one file per command.

mod cancel;
mod check;
mod checksum;
mod health;
mod process;
mod transfer;
mod transfers;

pub use cancel::run_cancel;
pub use check::run_check;
pub use checksum::run_checksum;
pub use health::run_health;
pub use process::run_process;
pub use transfer::{run_fetch, run_push};
pub use transfers::run_transfers;
