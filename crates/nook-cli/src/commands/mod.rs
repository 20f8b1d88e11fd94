pub mod config;
pub mod context;
pub mod stats;
pub mod task;
pub mod timer;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;
