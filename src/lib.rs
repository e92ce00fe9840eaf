pub mod config;
pub mod error;
pub mod helper;
pub mod logger;
pub mod modules;
pub mod pipeline;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
