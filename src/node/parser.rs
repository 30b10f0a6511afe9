//! Node link parser for vmess, ss, trojan and vless URIs

use crate::node::models::{NodeDescriptor, ParseError, ParseOutcome, Protocol};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde_json::Value;

/// Parser for turning node links into descriptors
pub struct NodeParser;

impl NodeParser {
    /// Parse a single node link
    ///
    /// Supports formats:
    /// - vmess://BASE64(JSON)
    /// - ss://METHOD:PASS@HOST:PORT
    /// - ss://BASE64(METHOD:PASS@HOST:PORT)
    /// - trojan://PASS@HOST:PORT[?PARAMS]
    /// - vless://ID@HOST:PORT[?PARAMS]
    ///
    /// A trailing `#name` fragment is ignored but kept in `raw`.
    pub fn parse_line(line: &str) -> ParseOutcome {
        let body = line.trim();
        let body = body.split_once('#').map_or(body, |(link, _)| link);

        let protocol = Protocol::detect(body).ok_or(ParseError::UnsupportedProtocol)?;
        let rest = &body[protocol.prefix().len()..];

        let (host, port) = match protocol {
            Protocol::VMess => Self::parse_vmess(rest)?,
            Protocol::ShadowSocks => Self::parse_ss(rest)?,
            Protocol::Trojan | Protocol::VLess => Self::parse_credential_link(rest, protocol)?,
        };

        Ok(NodeDescriptor::new(line.to_string(), protocol, host, port))
    }

    /// Parse many lines, keeping one outcome per line
    pub fn parse_lines<'a, I>(lines: I) -> Vec<ParseOutcome>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines.into_iter().map(Self::parse_line).collect()
    }

    fn parse_vmess(rest: &str) -> Result<(String, u16), ParseError> {
        let malformed = |reason: &str| ParseError::malformed(Protocol::VMess, reason);

        let decoded = decode_base64(rest).ok_or_else(|| malformed("invalid base64 payload"))?;
        let text = String::from_utf8(decoded).map_err(|_| malformed("payload is not utf-8"))?;
        let info: Value =
            serde_json::from_str(&text).map_err(|e| malformed(&format!("invalid json: {}", e)))?;

        let host = info
            .get("add")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| malformed("missing address"))?;

        let port = match info.get("port") {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
            _ => None,
        }
        .filter(|p| *p > 0)
        .ok_or_else(|| malformed("invalid port"))?;

        Ok((strip_brackets(host).to_string(), port))
    }

    fn parse_ss(rest: &str) -> Result<(String, u16), ParseError> {
        let protocol = Protocol::ShadowSocks;

        if rest.contains('@') {
            return split_userinfo(rest, protocol);
        }

        let decoded = decode_base64(rest)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| ParseError::malformed(protocol, "invalid base64 payload"))?;

        if !decoded.contains('@') {
            return Err(ParseError::malformed(protocol, "missing '@' in decoded payload"));
        }
        split_userinfo(decoded.trim(), protocol)
    }

    fn parse_credential_link(rest: &str, protocol: Protocol) -> Result<(String, u16), ParseError> {
        if !rest.contains('@') {
            return Err(ParseError::malformed(protocol, "missing credential"));
        }
        split_userinfo(rest, protocol)
    }
}

/// Split `USERINFO@HOST:PORT[/][?PARAMS]` into host and port
///
/// Params are cut off before looking for `@`, so an `@` inside a query value
/// never lands in the address.
fn split_userinfo(text: &str, protocol: Protocol) -> Result<(String, u16), ParseError> {
    let text = text.split_once('?').map_or(text, |(link, _)| link);
    let text = text.trim_end_matches('/');

    let (_, address) = text
        .rsplit_once('@')
        .ok_or_else(|| ParseError::malformed(protocol, "missing '@'"))?;

    split_host_port(address, protocol)
}

fn split_host_port(address: &str, protocol: Protocol) -> Result<(String, u16), ParseError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ParseError::malformed(protocol, "missing port"))?;

    let host = strip_brackets(host);
    if host.is_empty() {
        return Err(ParseError::malformed(protocol, "missing host"));
    }

    let port = parse_port(port).ok_or_else(|| ParseError::malformed(protocol, "invalid port"))?;

    Ok((host.to_string(), port))
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|p| *p > 0)
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Decode base64 after padding to a multiple of four, trying the URL-safe alphabet second
pub(crate) fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let mut padded: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if padded.is_empty() {
        return None;
    }
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    STANDARD
        .decode(&padded)
        .or_else(|_| URL_SAFE.decode(&padded))
        .ok()
}
