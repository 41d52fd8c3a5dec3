//! Runtime glue: configuration, collaborator traits, logging and telemetry.

pub mod config;
pub mod handler;
pub mod logger;
pub mod telemetry;
