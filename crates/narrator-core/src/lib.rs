//! Core types, config, errors, and wire protocol for Narrator.

pub mod config;
pub mod error;
pub mod protocol;
pub mod request;
