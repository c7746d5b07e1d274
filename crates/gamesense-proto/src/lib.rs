//! Shared types for the GameSense essentials daemon: engine wire protocol,
//! HTTP client, configuration and preferences, track parsing.

pub mod client;
pub mod config;
pub mod platform;
pub mod protocol;
pub mod songs;
