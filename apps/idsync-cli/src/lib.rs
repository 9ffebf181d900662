//! idsync CLI library
//!
//! Configuration loading, logging setup and command implementations for the
//! `idsync` binary.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
