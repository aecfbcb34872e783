//! LinkData Formatter backend: accepts a LinkedIn profile URL, forwards it
//! to a scraping webhook, normalizes the raw result into a fixed table via
//! a generative model, and serves the result to the dashboard UI.

pub mod auth;
pub mod config;
pub mod database;
pub mod export;
pub mod pipeline;
pub mod user_cli;
pub mod web;

pub use config::ConfigManager;
pub use web::start_web_server;
