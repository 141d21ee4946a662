//! stepmigrate - ordered, reversible, version-tracked database migrations
//!
//! A registry of versioned units, a persistent version record and a runner
//! that moves the database between versions one unit at a time, optionally
//! taking a backup first.

pub mod backup;
pub mod cli;
pub mod config;
pub mod config_validator;
pub mod logging;
pub mod migrations;
