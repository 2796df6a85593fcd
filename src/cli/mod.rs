pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CleanArgs, CliArgs, Commands, ListArgs};
pub use output::{OutputFormat, OutputFormatter};
