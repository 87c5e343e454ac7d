//! beans-mcp core library: exposes a beans workspace to automated clients through
//! typed operations, fulfilled by the beans CLI.

pub mod backend;
pub mod bean;
pub mod config;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod guard;
pub mod ops;
pub mod query;
pub mod workspace;

pub use error::BeansError;
