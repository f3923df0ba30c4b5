//! labdesk - practice-management backend for diagnostic labs and clinics
//!
//! Multi-branch patient registration with duplicate detection, visits,
//! billing, lab orders and results, immutable finalized reports, and
//! referral/clinic doctor payout ledgers, served as a JSON API.
//!
//! # Architecture
//! - `config`: Layered TOML + env configuration
//! - `storage`: SeaORM connection, locks and stored enums
//! - `services`: Business operations, one service per area
//! - `api`: HTTP services and middleware
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: Logging

pub mod api;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
