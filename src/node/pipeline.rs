//! Pipeline that filters, parses, probes and ranks node links

use crate::node::models::{NodeDescriptor, ParseError, ProbeResult, Protocol};
use crate::node::parser::NodeParser;
use crate::node::prober::{
    LimiterClosed, NodeProber, ProberConfig, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_MS,
};
use crate::node::ranker::{self, RankedNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

/// Failures that abort a whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not start probing: {0}")]
    LimiterClosed(#[from] LimiterClosed),
    #[error("probe task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Protocols eligible for probing
    pub allowed_protocols: Vec<Protocol>,
    /// Maximum number of probes in flight
    pub concurrency: usize,
    /// Timeout for each probe
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_protocols: Protocol::ALL.to_vec(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.allowed_protocols = protocols;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn prober_config(&self) -> ProberConfig {
        ProberConfig::new()
            .with_concurrency(self.concurrency)
            .with_timeout(self.timeout)
    }
}

/// Ranked output of a run with summary counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Alive nodes, fastest first
    pub nodes: Vec<RankedNode>,
    /// Lines handed to the run
    pub total_lines: usize,
    /// Lines whose prefix matched an allowed protocol
    pub eligible: usize,
    /// Eligible lines that failed to parse
    pub malformed: usize,
    /// Descriptors handed to the prober
    pub probed: usize,
    pub alive: usize,
    pub dead: usize,
    /// Alive links dropped because an identical link ranked earlier
    pub duplicates: usize,
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    fn empty(total_lines: usize) -> Self {
        Self {
            nodes: Vec::new(),
            total_lines,
            eligible: 0,
            malformed: 0,
            probed: 0,
            alive: 0,
            dead: 0,
            duplicates: 0,
            generated_at: Utc::now(),
        }
    }

    /// The raw links in ranked order
    pub fn raw_lines(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.raw.clone()).collect()
    }
}

/// Drives a run: filter, parse, probe under the limiter, then rank
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    prober: NodeProber,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let prober = NodeProber::with_config(config.prober_config());
        Self { config, prober }
    }

    /// Create a pipeline around an existing prober and its limiter
    pub fn with_prober(config: PipelineConfig, prober: NodeProber) -> Self {
        Self { config, prober }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Keep only lines whose prefix is an allowed protocol
    pub fn filter_eligible<'a, S: AsRef<str>>(&self, lines: &'a [S]) -> Vec<&'a str> {
        lines
            .iter()
            .map(AsRef::as_ref)
            .filter(|line| {
                Protocol::detect(line).is_some_and(|p| self.config.allowed_protocols.contains(&p))
            })
            .collect()
    }

    /// Run the whole pipeline over a list of lines
    ///
    /// Parse failures and dead nodes are counted, never fatal. The only error
    /// is failing to run the probing phase itself, in which case nothing is
    /// returned.
    pub async fn run<S: AsRef<str>>(&self, lines: &[S]) -> Result<RunReport, PipelineError> {
        if lines.is_empty() {
            return Ok(RunReport::empty(0));
        }

        let eligible = self.filter_eligible(lines);
        log::info!(
            "{} of {} lines match an allowed protocol",
            eligible.len(),
            lines.len()
        );

        let mut descriptors = Vec::with_capacity(eligible.len());
        let mut malformed = 0;
        for line in &eligible {
            match NodeParser::parse_line(line) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(ParseError::Malformed { protocol, reason }) => {
                    malformed += 1;
                    log::debug!("skipping malformed {} link: {}", protocol, reason);
                }
                Err(ParseError::UnsupportedProtocol) => {}
            }
        }
        if malformed > 0 {
            log::warn!("{} links could not be parsed", malformed);
        }

        let probed = descriptors.len();
        let results = if descriptors.is_empty() {
            Vec::new()
        } else {
            log::info!(
                "Probing {} nodes with concurrency {}, timeout {:?}",
                probed,
                self.prober.limiter().capacity(),
                self.prober.config().timeout
            );
            self.probe_all(descriptors).await?
        };

        let alive = results.iter().filter(|r| r.is_alive()).count();
        let ranking = ranker::rank(&results);
        log::info!("Alive nodes: {} / {}", alive, probed);

        Ok(RunReport {
            nodes: ranking.nodes,
            total_lines: lines.len(),
            eligible: eligible.len(),
            malformed,
            probed,
            alive,
            dead: probed - alive,
            duplicates: ranking.duplicates,
            generated_at: Utc::now(),
        })
    }

    /// Probe every descriptor and return results in input order
    ///
    /// A permit is taken before each task is spawned, so the task set never
    /// holds more live probes than the limiter allows.
    pub async fn probe_all(
        &self,
        descriptors: Vec<NodeDescriptor>,
    ) -> Result<Vec<ProbeResult>, PipelineError> {
        let total = descriptors.len();
        let mut tasks = JoinSet::new();

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let permit = self.prober.limiter().acquire().await?;
            let prober = self.prober.clone();
            tasks.spawn(async move {
                let result = prober.probe(descriptor).await;
                drop(permit);
                (index, result)
            });
        }

        let mut indexed = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            indexed.push(joined?);
        }
        indexed.sort_by_key(|(index, _)| *index);

        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
