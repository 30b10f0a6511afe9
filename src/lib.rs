//! Node Ranker - Proxy Node Parser and Latency Ranker
//!
//! This crate parses proxy node links (vmess, ss, trojan, vless), checks
//! which nodes accept TCP connections and ranks the reachable ones by
//! connect latency.

pub mod config;
pub mod node;

pub use config::Config;
pub use node::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
