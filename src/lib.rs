pub mod build_params;
pub mod config;
pub mod logging;
pub mod provision;
pub mod remote;
