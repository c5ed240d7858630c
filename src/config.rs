//! Configuration file loading and validation (spec §6).
//!
//! Not part of the RIP core (spec §1 lists config loading as an
//! external collaborator), but needed to produce the `Config` the core
//! takes as input. Ported from `configmanager.py`'s INI-section reader
//! rather than translated line-by-line: the wire format (one
//! `[SETTINGS]` section, three keys) doesn't warrant pulling in an INI
//! crate, so this is a small hand-rolled reader in the same style as
//! the rest of the crate's fallible operations (`RouteError::Config`).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::{RouteError, RouteResult};
use crate::wire::{router_id_is_valid, MIN_ROUTER_ID};

/// A configured neighbour: the local port we send to it on, and the
/// link metric to reach it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub port: u16,
    pub metric: u8,
}

/// A validated router configuration, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub router_id: u16,
    pub input_ports: Vec<u16>,
    pub outputs: HashMap<u16, Output>,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CONFIG:")?;
        writeln!(f, "    router id: {}", self.router_id)?;
        writeln!(f, "    input ports: {:?}", self.input_ports)?;
        writeln!(f, "    outputs:")?;
        let mut ids: Vec<_> = self.outputs.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let out = self.outputs[&id];
            writeln!(
                f,
                "        router-id: {id} port: {} metric: {}",
                out.port, out.metric
            )?;
        }
        Ok(())
    }
}

fn is_port_valid(port: u32) -> bool {
    (1024..=64000).contains(&port)
}

fn parse_router_id(raw: &str) -> RouteResult<u16> {
    let raw = raw.trim();
    let value: u32 = raw
        .parse()
        .map_err(|_| RouteError::Config(format!("router-id must be a number between 1 and 64000. Got \"{raw}\"")))?;
    if value < MIN_ROUTER_ID as u32 || !router_id_is_valid(value as u16) {
        return Err(RouteError::Config(format!(
            "router-id must be a number between 1 and 64000. Got \"{raw}\""
        )));
    }
    Ok(value as u16)
}

fn parse_port(raw: &str) -> RouteResult<u16> {
    let raw = raw.trim();
    let value: u32 = raw
        .parse()
        .map_err(|_| RouteError::Config(format!("port must be a number between 1024 and 64000. Got \"{raw}\"")))?;
    if !is_port_valid(value) {
        return Err(RouteError::Config(format!(
            "port must be a number between 1024 and 64000. Got \"{raw}\""
        )));
    }
    Ok(value as u16)
}

fn parse_metric(raw: &str) -> RouteResult<u8> {
    let raw = raw.trim();
    let value: u32 = raw
        .parse()
        .map_err(|_| RouteError::Config(format!("metric must be a number between 1 and 16. Got \"{raw}\"")))?;
    if !(1..=16).contains(&value) {
        return Err(RouteError::Config(format!(
            "metric must be a number between 1 and 16. Got \"{raw}\""
        )));
    }
    Ok(value as u8)
}

/// Read the lone `[SETTINGS]` section of an INI-style config file into
/// `key -> value` pairs. Anything outside the section, blank lines, and
/// `;`/`#`-prefixed comments are ignored.
fn read_settings_section(contents: &str) -> HashMap<String, String> {
    let mut settings = HashMap::new();
    let mut in_settings = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_settings = line.eq_ignore_ascii_case("[SETTINGS]");
            continue;
        }
        if !in_settings {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            settings.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    settings
}

impl Config {
    /// Parse and validate a config from raw file contents.
    pub fn from_str(contents: &str) -> RouteResult<Self> {
        let settings = read_settings_section(contents);
        if settings.is_empty() && !contents.to_lowercase().contains("[settings]") {
            return Err(RouteError::Config("SETTINGS header not found".to_string()));
        }

        for key in ["router-id", "input-ports", "outputs"] {
            if !settings.contains_key(key) {
                return Err(RouteError::Config(format!("\"{key}\" parameter not found")));
            }
        }

        let router_id = parse_router_id(&settings["router-id"])?;

        let mut input_ports = Vec::new();
        for raw in settings["input-ports"].split(',') {
            let port = parse_port(raw)?;
            if input_ports.contains(&port) {
                return Err(RouteError::Config(format!(
                    "\"{port}\" is a duplicate port number"
                )));
            }
            input_ports.push(port);
        }
        if input_ports.is_empty() {
            return Err(RouteError::Config(
                "There must be at least one input port".to_string(),
            ));
        }

        let mut outputs = HashMap::new();
        for raw in settings["outputs"].split(',') {
            let parts: Vec<&str> = raw.trim().split('-').collect();
            if parts.len() != 3 {
                return Err(RouteError::Config(format!(
                    "malformed output triple \"{raw}\", expected PORT-METRIC-ROUTERID"
                )));
            }
            let port = parse_port(parts[0])?;
            if input_ports.contains(&port) {
                return Err(RouteError::Config(format!(
                    "\"{port}\" is already defined as an input port"
                )));
            }
            let metric = parse_metric(parts[1])?;
            let out_router_id = parse_router_id(parts[2])?;
            outputs.insert(out_router_id, Output { port, metric });
        }
        if outputs.is_empty() {
            return Err(RouteError::Config(
                "There must be at least one output".to_string(),
            ));
        }

        Ok(Config {
            router_id,
            input_ports,
            outputs,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> RouteResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RouteError::Config(format!("{}: {e}", path.display())))?;
        Self::from_str(&contents).map_err(|e| match e {
            RouteError::Config(msg) => RouteError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }
}

/// Cross-check a fleet of configs (spec §6): unique router-ids, every
/// port used as exactly one input and one output, peer router-ids
/// agree, and metrics agree on both ends. Used by the test harness, not
/// by a single daemon process.
pub fn validate_fleet(configs: &[Config]) -> RouteResult<()> {
    for i in 0..configs.len() {
        for j in (i + 1)..configs.len() {
            if configs[i].router_id == configs[j].router_id {
                return Err(RouteError::Config(format!(
                    "same router-id: {}",
                    configs[i].router_id
                )));
            }
        }
    }

    // port -> (input router-id, output router-id)
    let mut port_ids: HashMap<u16, (Option<u16>, Option<u16>)> = HashMap::new();
    let mut metrics: HashMap<(u16, u16), u8> = HashMap::new();

    for config in configs {
        for &port in &config.input_ports {
            let entry = port_ids.entry(port).or_insert((None, None));
            if entry.0.is_some() {
                return Err(RouteError::Config(format!(
                    "port {port} already an input for router {}",
                    entry.0.unwrap()
                )));
            }
            entry.0 = Some(config.router_id);
        }

        for (&router_id, out) in &config.outputs {
            let entry = port_ids.entry(out.port).or_insert((None, None));
            if entry.1.is_some() {
                return Err(RouteError::Config(format!(
                    "port {} is already an output to router {}",
                    out.port,
                    entry.1.unwrap()
                )));
            }
            entry.1 = Some(router_id);

            let (lower, upper) = if config.router_id < router_id {
                (config.router_id, router_id)
            } else {
                (router_id, config.router_id)
            };
            if let Some(&existing) = metrics.get(&(lower, upper)) {
                if existing != out.metric {
                    return Err(RouteError::Config(format!(
                        "metric mismatch between routers {lower} and {upper}"
                    )));
                }
            }
            metrics.insert((lower, upper), out.metric);
        }
    }

    for (port, (in_id, out_id)) in &port_ids {
        let out_id = out_id.ok_or_else(|| {
            RouteError::Config(format!(
                "router {} listening on port {port} but no sender",
                in_id.unwrap()
            ))
        })?;
        let in_id = in_id.ok_or_else(|| {
            RouteError::Config(format!("sending to router {out_id} on port {port} but no receiver"))
        })?;
        if in_id != out_id {
            return Err(RouteError::Config(format!(
                "router-id mismatch between routers {in_id} and {out_id} on port {port}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn from_file_reads_and_parses_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[SETTINGS]\nrouter-id=7\ninput-ports=2000\noutputs=3000-4-3\n").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.router_id, 7);
        assert_eq!(config.outputs[&3], Output { port: 3000, metric: 4 });
    }

    #[test]
    fn from_file_prefixes_errors_with_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[SETTINGS]\nrouter-id=not-a-number\n").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RouteError::Config(msg) if msg.contains(&file.path().display().to_string())));
    }

    #[test]
    fn parses_minimal_config() {
        let contents = "[SETTINGS]\nrouter-id=2\ninput-ports=2000\noutputs=3000-1-3\n";
        let config = Config::from_str(contents).unwrap();
        assert_eq!(config.router_id, 2);
        assert_eq!(config.input_ports, vec![2000]);
        assert_eq!(config.outputs[&3], Output { port: 3000, metric: 1 });
    }

    #[test]
    fn trims_whitespace_and_leading_zeros() {
        let contents = "[SETTINGS]\nrouter-id= 01 \ninput-ports= 01024 , 01025\noutputs= 064000 - 011 - 01 , 05000 - 012 - 02\n";
        let config = Config::from_str(contents).unwrap();
        assert_eq!(config.router_id, 1);
        assert_eq!(config.input_ports, vec![1024, 1025]);
        assert_eq!(config.outputs[&1], Output { port: 64000, metric: 11 });
        assert_eq!(config.outputs[&2], Output { port: 5000, metric: 12 });
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = Config::from_str("router-id=1\n").unwrap_err();
        assert!(matches!(err, RouteError::Config(_)));
    }

    #[test]
    fn missing_key_is_an_error() {
        let contents = "[SETTINGS]\nrouter-id=1\noutputs=64000-1-1\n";
        assert!(Config::from_str(contents).is_err());
    }

    #[test]
    fn duplicate_input_port_is_an_error() {
        let contents = "[SETTINGS]\nrouter-id=1\ninput-ports=2000,2000\noutputs=5000-15-1\n";
        assert!(Config::from_str(contents).is_err());
    }

    #[test]
    fn output_port_reused_as_input_is_an_error() {
        let contents = "[SETTINGS]\nrouter-id=1\ninput-ports=2000\noutputs=2000-15-1\n";
        assert!(Config::from_str(contents).is_err());
    }

    #[test]
    fn validate_fleet_accepts_matching_pair() {
        let c1 = Config::from_str("[SETTINGS]\nrouter-id=2\ninput-ports=2000\noutputs=3000-1-3\n").unwrap();
        let c2 = Config::from_str("[SETTINGS]\nrouter-id=3\ninput-ports=3000\noutputs=2000-1-2\n").unwrap();
        assert!(validate_fleet(&[c1, c2]).is_ok());
    }

    #[test]
    fn validate_fleet_rejects_duplicate_router_id() {
        let c1 = Config::from_str("[SETTINGS]\nrouter-id=2\ninput-ports=2000\noutputs=3000-1-3\n").unwrap();
        let c2 = Config::from_str("[SETTINGS]\nrouter-id=2\ninput-ports=3000\noutputs=2000-1-2\n").unwrap();
        assert!(validate_fleet(&[c1, c2]).is_err());
    }

    #[test]
    fn validate_fleet_rejects_metric_mismatch() {
        let c1 = Config::from_str("[SETTINGS]\nrouter-id=2\ninput-ports=2000\noutputs=3000-1-3\n").unwrap();
        let c2 = Config::from_str("[SETTINGS]\nrouter-id=3\ninput-ports=3000\noutputs=2000-2-2\n").unwrap();
        assert!(validate_fleet(&[c1, c2]).is_err());
    }

    #[test]
    fn validate_fleet_rejects_router_id_mismatch() {
        let c1 = Config::from_str("[SETTINGS]\nrouter-id=2\ninput-ports=2000\noutputs=3000-1-3\n").unwrap();
        let c2 = Config::from_str("[SETTINGS]\nrouter-id=3\ninput-ports=3000\noutputs=2000-1-3\n").unwrap();
        assert!(validate_fleet(&[c1, c2]).is_err());
    }

    #[test]
    fn validate_fleet_accepts_three_router_ring() {
        let c1 = Config::from_str(
            "[SETTINGS]\nrouter-id=2\ninput-ports=2000,2001\noutputs=3000-1-3,4000-2-4\n",
        )
        .unwrap();
        let c2 = Config::from_str(
            "[SETTINGS]\nrouter-id=3\ninput-ports=3000,3001\noutputs=2000-1-2,4001-3-4\n",
        )
        .unwrap();
        let c3 = Config::from_str(
            "[SETTINGS]\nrouter-id=4\ninput-ports=4000,4001\noutputs=2001-2-2,3001-3-3\n",
        )
        .unwrap();
        assert!(validate_fleet(&[c1, c2, c3]).is_ok());
    }
}
