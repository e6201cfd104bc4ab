pub mod columns;
pub mod common;
pub mod completions;
pub mod create;
pub mod rows;
pub mod show;
pub mod watch;
