//! CRM record service.
//!
//! Leads, deals and documents behind one facade that works against a remote
//! Postgres store when one is configured and against an in-process fallback
//! store otherwise, or whenever the remote store fails.

pub mod blob;
pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod records;
pub mod service;
pub mod session;
pub mod settings;

pub use error::{ConfigError, DatabaseError, ServiceError, ValidationError};
pub use service::{CrmServices, Envelope, Outcome, RecordService};
