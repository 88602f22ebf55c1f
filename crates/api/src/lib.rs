//! GraphQL API of the attendance tracker: authentication, time entries,
//! monthly history and administration.

pub mod auth;
pub mod error;
pub mod history;
pub mod navigation;
pub mod report;
pub mod schema;
pub mod seed;
pub mod session;
pub mod store;
pub mod timesheet;

pub use schema::{build_schema, build_schema_with_hub, AppSchema, AttendanceSchema};
