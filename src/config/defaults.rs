//! Default constants for unicontact configuration.
//!
//! All magic numbers are centralized here with documentation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

// =============================================================================
// Network Defaults
// =============================================================================

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 8000;

/// Default HTTP listen address (`127.0.0.1:8000`)
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);

/// Maximum accepted request body in bytes
/// Identify requests are two short strings; anything larger is rejected.
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024;

// =============================================================================
// Storage Defaults (RocksDB)
// =============================================================================

/// Default number of contacts held in the read cache of the persistent store
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

// =============================================================================
// Logging Defaults
// =============================================================================

/// Default tracing filter directive when neither config nor `RUST_LOG` set one
pub const DEFAULT_LOG_FILTER: &str = "info";

// =============================================================================
// Seeding Defaults
// =============================================================================

/// Default number of demo contacts written by the seeding tool
pub const DEFAULT_SEED_CONTACTS: usize = 6;

/// Default RNG seed so demo data is reproducible
pub const DEFAULT_SEED: u64 = 42;
