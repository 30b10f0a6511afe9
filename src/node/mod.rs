//! Node module for parsing, probing and ranking proxy node links
//!
//! This module provides functionality for:
//! - Parsing vmess, ss, trojan and vless links into descriptors
//! - Probing TCP reachability with bounded concurrency
//! - Ranking alive nodes by connect latency
//! - Loading node lists from files or HTTP and saving ranked output

pub mod models;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod prober;
pub mod ranker;
pub mod source;

pub use models::{
    NodeDescriptor, ParseError, ParseOutcome, ProbeError, ProbeResult, ProbeStatus, Protocol,
};
pub use output::OutputFormat;
pub use parser::NodeParser;
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, RunReport};
pub use prober::{NodeProber, ProbeLimiter, ProberConfig};
pub use ranker::{aggregate, rank, RankedNode, Ranking};
pub use source::{FetchResult, FetcherConfig, SourceFetcher};
