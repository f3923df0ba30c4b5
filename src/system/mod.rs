//! System-level modules
//!
//! Process-wide concerns that sit below the HTTP layer.

pub mod logging;

pub use logging::init_logging;
