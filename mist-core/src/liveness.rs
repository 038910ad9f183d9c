//! Liveness beacons and health checks.
//!
//! Each worker touches a marker file after every successful iteration; an
//! external probe compares the marker age against the worker's interval.
//! File mtimes survive process restarts and are independent of the runtime,
//! which is why this stays file-based rather than an in-process endpoint.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::footprint;

/// Stale tolerance: a marker may lag its interval by this factor before the
/// worker counts as dead (slow iterations, scheduling jitter).
const LIVENESS_MARGIN: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct HealthzTarget {
    pub name: String,
    pub liveness_file: PathBuf,
    pub interval_sec: u32,
}

impl HealthzTarget {
    pub fn new(name: impl Into<String>, liveness_file: impl Into<PathBuf>, interval_sec: u32) -> Self {
        Self {
            name: name.into(),
            liveness_file: liveness_file.into(),
            interval_sec,
        }
    }

    pub fn is_alive(&self) -> bool {
        if !footprint::exists(&self.liveness_file) {
            warn!("{}: liveness marker missing ({:?})", self.name, self.liveness_file);
            return false;
        }

        let age = footprint::elapsed(&self.liveness_file);
        let limit = f64::from(self.interval_sec) * LIVENESS_MARGIN;
        if age > limit {
            warn!("{}: liveness marker stale ({age:.0} s > {limit:.0} s)", self.name);
            return false;
        }

        debug!("{}: alive ({age:.0} s)", self.name);
        true
    }
}

/// Check every target; returns the names of dead workers.
pub fn check_liveness_all(targets: &[HealthzTarget]) -> Vec<String> {
    targets
        .iter()
        .filter(|t| !t.is_alive())
        .map(|t| t.name.clone())
        .collect()
}

/// Probe that something is accepting connections on the port.
pub fn check_http_port(host: &str, port: u16) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!("Cannot resolve {host}:{port}: {e}");
            return false;
        }
    };

    for addr in addrs {
        if TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok() {
            return true;
        }
    }
    warn!("Port {host}:{port} not reachable");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_marker_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("controller");
        footprint::update(&marker).unwrap();

        let target = HealthzTarget::new("controller", &marker, 60);
        assert!(target.is_alive());
    }

    #[test]
    fn test_missing_marker_is_dead() {
        let dir = tempfile::tempdir().unwrap();
        let target = HealthzTarget::new("controller", dir.path().join("never"), 60);
        assert!(!target.is_alive());
        assert_eq!(check_liveness_all(&[target]), vec!["controller".to_string()]);
    }

    #[test]
    fn test_port_probe() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(check_http_port("127.0.0.1", port));
        drop(listener);
        assert!(!check_http_port("127.0.0.1", port));
    }
}
