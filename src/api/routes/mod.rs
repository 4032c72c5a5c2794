//! API route modules.

pub mod actions;
pub mod controls;
pub mod meetings;
