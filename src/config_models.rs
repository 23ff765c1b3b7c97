pub mod cli_args;
pub mod constants;
pub mod data_directory;
pub mod network;
pub mod paywall_config;
