//! Rendering and saving ranked node lists

use crate::node::pipeline::RunReport;
use crate::Result;
use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Encoding of the saved node list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Newline-joined links, base64-encoded as a whole
    #[default]
    Base64,
    /// Newline-joined links
    Plain,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Base64 => write!(f, "base64"),
            OutputFormat::Plain => write!(f, "plain"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base64" => Ok(OutputFormat::Base64),
            "plain" | "text" => Ok(OutputFormat::Plain),
            _ => Err(anyhow::anyhow!(
                "Invalid output format: {}. Use: base64, plain",
                s
            )),
        }
    }
}

/// Join links with newlines and apply the output encoding
pub fn render<S: AsRef<str>>(lines: &[S], format: OutputFormat) -> String {
    let joined = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join("\n");

    match format {
        OutputFormat::Base64 => STANDARD.encode(joined),
        OutputFormat::Plain => joined,
    }
}

/// Save links to a file
pub fn save_to_file<S: AsRef<str>, P: AsRef<Path>>(
    lines: &[S],
    path: P,
    format: OutputFormat,
) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, render(lines, format))
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

/// Save a run report as pretty-printed JSON
pub fn save_report<P: AsRef<Path>>(report: &RunReport, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(report)?;
    fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}
