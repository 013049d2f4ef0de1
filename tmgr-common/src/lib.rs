//! # TMGR Common Library
//!
//! Shared code for the transformer-manager services:
//! - Error taxonomy
//! - Root folder and configuration resolution
//! - SQLite pool initialization

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
