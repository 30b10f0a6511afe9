//! Ranking of probe results by connect latency

use crate::node::models::{ProbeResult, Protocol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An alive node in ranked position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    pub raw: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub latency_ms: f64,
}

/// Alive nodes ordered by latency, fastest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ranking {
    pub nodes: Vec<RankedNode>,
    /// Alive results dropped because an identical link ranked earlier
    pub duplicates: usize,
}

impl Ranking {
    /// The raw links in ranked order
    pub fn raw_lines(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.raw.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Rank alive results by latency
///
/// The sort is stable, so results with equal latency keep their input order.
/// When the same raw link was probed more than once only its fastest copy is kept.
pub fn rank(results: &[ProbeResult]) -> Ranking {
    let mut alive: Vec<RankedNode> = results
        .iter()
        .filter(|r| r.is_alive())
        .filter_map(|r| {
            let latency_ms = r.latency_ms?;
            Some(RankedNode {
                raw: r.descriptor.raw.clone(),
                protocol: r.descriptor.protocol,
                host: r.descriptor.host.clone(),
                port: r.descriptor.port,
                latency_ms,
            })
        })
        .collect();

    alive.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));

    let before = alive.len();
    let mut seen = HashSet::new();
    alive.retain(|n| seen.insert(n.raw.clone()));

    Ranking {
        duplicates: before - alive.len(),
        nodes: alive,
    }
}

/// Rank alive results and return their raw links, fastest first
pub fn aggregate(results: &[ProbeResult]) -> Vec<String> {
    rank(results).raw_lines()
}
