//! ScalpelLab recording tools.
//!
//! - [`inventory`]: scan recording trees and reconcile status tables
//! - [`path_mapper`]: turn query rows into recording directories
//! - [`dedupe`]: clean up duplicate camera exports
//! - [`dashboard`]: HTTP API over the database
//!
//! Database access lives in the `scalpel_db` crate.

pub mod config;
pub mod dashboard;
pub mod dedupe;
pub mod inventory;
pub mod path_mapper;

pub use config::ScalpelConfig;
