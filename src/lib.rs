pub mod actions;
pub mod api;
pub mod app;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod global;
pub mod google;
pub mod meeting;
pub mod transcription;
