//! Format-specific parsers normalizing on-disk telemetry into typed
//! intermediate records.

pub mod junit;
pub mod metadata;
