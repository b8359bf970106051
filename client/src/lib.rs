pub mod auth_repository;
pub mod config;
mod error;
pub mod pipeline;
pub mod reissue;
pub mod running_repository;
pub mod token_store;

pub use error::*;
