//! CLI command handlers, one per file, mirroring `ddm_cli::cli::commands`.

mod create;
mod delete;
mod get;
mod list;
mod pause;
mod resume;
mod watch;

pub use create::{run_create, SinfArg};
pub use delete::run_delete;
pub use get::run_get;
pub use list::run_list;
pub use pause::run_pause;
pub use resume::run_resume;
pub use watch::run_watch;
