pub mod cli;
pub mod dav;
pub mod load_config;
pub mod share;
pub mod token_store;

pub use cli::{run, Cli, Commands};
