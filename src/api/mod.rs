//! HTTP surface: `/health` probes and the `/api/v1` JSON API

pub mod middleware;
pub mod services;
