//! `puckbot-memory` – On-device usage records.
//!
//! # Modules
//!
//! - [`usage_log`] – [`UsageLog`][usage_log::UsageLog]: append-only CSV of
//!   battery level, active state, odometry and dispatched output, one
//!   [`UsageRow`][usage_log::UsageRow] per sampling tick.

pub mod usage_log;

pub use usage_log::{USAGE_HEADER, UsageLog, UsageLogError, UsageRow, format_decimal};
