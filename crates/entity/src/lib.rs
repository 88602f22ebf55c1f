//! sea-orm entities for the attendance tracker.

pub mod project;
pub mod time_entry;
pub mod user;
pub mod user_secret;
pub mod user_session;
