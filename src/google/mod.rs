//! Google Meet REST API backend.

pub mod auth;
pub mod client;
pub mod service;
pub mod types;

pub use auth::GoogleAuth;
pub use client::MeetApiClient;
pub use service::ApiMeetService;
pub use types::AccessType;
