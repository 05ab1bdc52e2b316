pub mod api;
pub mod config;
pub mod definitions;
pub mod flags;
pub mod logging;
pub mod metrics_consts;
pub mod persistence;
pub mod router;
pub mod server;

// Shared by unit tests and the integration tests under tests/, so it is compiled
// into the library as well.
pub mod test_utils;
