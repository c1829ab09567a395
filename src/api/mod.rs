pub mod cli;

pub use cli::{Cli, CliError, CliHandler, Commands};
