//! Label Studio integration: result write-back over the REST API and
//! configuration health reporting.

pub mod config;
pub mod http;

pub use config::{HealthReport, LabelStudioConfig};
pub use http::{LabelStudioClient, SyncError};
