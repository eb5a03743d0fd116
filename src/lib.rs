#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod engine;
pub mod error;
pub mod models;

pub use error::{BergamotError, Result};
