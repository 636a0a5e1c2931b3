//! Featurewatch — feature stars and the notification email pipeline.

pub mod api;
pub mod config;
pub mod error;
pub mod mail;
pub mod store;
pub mod tasks;
