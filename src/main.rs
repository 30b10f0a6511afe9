use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use node_ranker::{
    config::Config,
    node::{output, source, NodeParser, OutputFormat, ParseError, Pipeline, Protocol, SourceFetcher},
};
use std::path::PathBuf;

/// A proxy node link parser and TCP latency ranker
#[derive(Parser)]
#[command(name = "node-ranker")]
#[command(version, about = "A proxy node link parser and TCP latency ranker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Verbose output, same as --log-level debug
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse node links from a file and print their addresses
    Parse {
        /// Input file containing node links
        input: PathBuf,
    },
    /// Probe node links and save the reachable ones ranked by latency
    Check {
        /// Input files containing node links (can specify multiple)
        #[arg(short, long)]
        input: Vec<PathBuf>,
        /// URLs serving normalized node lists (can specify multiple)
        #[arg(short, long)]
        url: Vec<String>,
        /// File containing list of source URLs (one URL per line)
        #[arg(short, long)]
        sources: Option<PathBuf>,
        /// Output file for ranked nodes
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format (base64, plain)
        #[arg(short, long)]
        format: Option<String>,
        /// Number of concurrent probes
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
        /// Probe timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Comma-separated protocols to probe (vmess, ss, trojan, vless)
        #[arg(short, long)]
        protocols: Option<String>,
        /// Write a JSON report of the run to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = if cli.config.exists() {
        Some(Config::load_from_file(&cli.config))
    } else {
        None
    };

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cli.log_level
            .clone()
            .or_else(|| {
                loaded
                    .as_ref()
                    .and_then(|r| r.as_ref().ok())
                    .map(|c| c.log_level.clone())
            })
            .unwrap_or_else(|| "info".to_string())
    };
    init_logging(&level);

    let mut config = match loaded {
        Some(Ok(config)) => {
            log::info!("Loaded settings from {:?}", cli.config);
            config
        }
        Some(Err(e)) => {
            log::warn!(
                "Failed to load settings from {:?}: {}, using defaults",
                cli.config,
                e
            );
            Config::default()
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::Parse { input } => {
            let lines = source::load_file(&input)?;
            let mut parsed = 0;
            let mut malformed = 0;
            let mut unsupported = 0;

            for outcome in NodeParser::parse_lines(lines.iter().map(String::as_str)) {
                match outcome {
                    Ok(node) => {
                        parsed += 1;
                        println!("{:<7} {}", node.protocol.to_string(), node.address());
                    }
                    Err(e @ ParseError::Malformed { .. }) => {
                        malformed += 1;
                        eprintln!("{}", e);
                    }
                    Err(ParseError::UnsupportedProtocol) => unsupported += 1,
                }
            }

            println!(
                "Parsed {} nodes from {:?} ({} malformed, {} unsupported)",
                parsed, input, malformed, unsupported
            );
        }
        Commands::Check {
            input,
            url,
            sources,
            output,
            format,
            concurrency,
            timeout,
            protocols,
            report,
        } => {
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(timeout) = timeout {
                config.timeout = timeout;
            }
            if let Some(protocols) = protocols {
                config.protocols = parse_protocols(&protocols)?;
            }
            if let Some(format) = format {
                config.output_format = format.parse::<OutputFormat>()?;
            }
            if let Some(output) = output {
                config.output = output.to_string_lossy().to_string();
            }
            if let Some(report) = report {
                config.report = Some(report.to_string_lossy().to_string());
            }
            if let Some(sources_path) = sources {
                config.sources.extend(source::read_source_list(&sources_path)?);
            }
            config.sources.extend(url);

            let lines = collect_lines(&config, &input).await?;
            if lines.is_empty() {
                println!("No node links found.");
                return Ok(());
            }
            println!("Loaded {} lines", lines.len());
            println!(
                "Checking with concurrency {}, timeout: {}ms",
                config.concurrency, config.timeout
            );
            println!();

            let pipeline = Pipeline::new(config.pipeline_config());
            let report = pipeline.run(&lines).await?;

            println!("Alive nodes: {} / {}", report.alive, report.eligible);
            if report.malformed > 0 {
                println!("Malformed links skipped: {}", report.malformed);
            }

            if report.nodes.is_empty() {
                log::warn!("All nodes are dead, nothing saved");
            } else {
                println!("\nRanked nodes:");
                for node in &report.nodes {
                    println!(
                        "  {:>8.1}ms  {:<7} {}:{}",
                        node.latency_ms,
                        node.protocol.to_string(),
                        node.host,
                        node.port
                    );
                }

                output::save_to_file(&report.raw_lines(), &config.output, config.output_format)?;
                println!(
                    "\nSaved {} nodes to {} ({})",
                    report.nodes.len(),
                    config.output,
                    config.output_format
                );
            }

            if let Some(report_path) = &config.report {
                output::save_report(&report, report_path)?;
                println!("Saved report to {}", report_path);
            }
        }
    }

    Ok(())
}

async fn collect_lines(config: &Config, inputs: &[PathBuf]) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    for path in inputs {
        let loaded = source::load_file(path)?;
        log::info!("Loaded {} lines from {:?}", loaded.len(), path);
        lines.extend(loaded);
    }

    if !config.sources.is_empty() {
        let fetcher = SourceFetcher::with_config(config.fetcher_config())?;
        for result in fetcher.fetch_all(&config.sources).await {
            if let Some(error) = result.error {
                eprintln!("Error fetching {}: {}", result.source, error);
            } else {
                lines.extend(result.lines);
            }
        }
    }

    Ok(lines)
}

fn parse_protocols(s: &str) -> Result<Vec<Protocol>> {
    let protocols = s
        .split(',')
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<Protocol>)
        .collect::<Result<Vec<_>>>()?;

    if protocols.is_empty() {
        return Err(anyhow!("No protocols given. Use: vmess, ss, trojan, vless"));
    }
    Ok(protocols)
}
