use std::net::SocketAddr;
use std::time::Duration;

use crate::dispatch::{BackendKind, LoadModel, SelectionPolicy};
use crate::error::{BalancerError, Result};

/// One pool member as configured at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub endpoint: String, // host:port format, supports both IP and hostnames
    pub kind: BackendKind,
}

#[derive(Debug, Clone)]
pub struct BalancerConfig {
    pub listen_addr: SocketAddr,
    pub backends: Vec<BackendConfig>,
    pub policy: SelectionPolicy,
    pub load_model: LoadModel,
    /// Upper bound on waiting for a backend reply, queueing included.
    pub forward_timeout: Duration,
    /// Upper bound on waiting for a client to send its request.
    pub client_read_timeout: Duration,
    /// Wall-clock time one cost unit is expected to take. Job sizes are
    /// seconds of work, so this defaults to one second.
    pub cost_unit: Duration,
    pub dashboard_addr: Option<SocketAddr>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
            backends: Vec::new(),
            policy: SelectionPolicy::FullScan,
            load_model: LoadModel::Drain,
            forward_timeout: Duration::from_secs(60),
            client_read_timeout: Duration::from_secs(10),
            cost_unit: Duration::from_secs(1),
            dashboard_addr: None,
        }
    }
}

impl BalancerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, kind: BackendKind, endpoint: impl Into<String>) -> Self {
        self.backends.push(BackendConfig {
            endpoint: endpoint.into(),
            kind,
        });
        self
    }

    pub fn with_policy(mut self, policy: SelectionPolicy, load_model: LoadModel) -> Self {
        self.policy = policy;
        self.load_model = load_model;
        self
    }

    /// Rejects configurations the balancer cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(BalancerError::Configuration(
                "at least one backend is required".to_string(),
            ));
        }
        if let Some(b) = self.backends.iter().find(|b| b.endpoint.trim().is_empty()) {
            return Err(BalancerError::Configuration(format!(
                "{} backend has an empty endpoint",
                b.kind
            )));
        }
        if self.cost_unit.is_zero() {
            return Err(BalancerError::Configuration(
                "cost unit must be positive".to_string(),
            ));
        }
        if self.forward_timeout.is_zero() || self.client_read_timeout.is_zero() {
            return Err(BalancerError::Configuration(
                "timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a comma-separated backend list, format `KIND:host:port`.
///
/// Example: `"V:192.168.0.101:80,M:192.168.0.103:80"`. Any invalid entry
/// fails the whole list.
pub fn parse_backends(list: &str) -> Result<Vec<BackendConfig>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<BackendConfig> {
            let (kind, endpoint) = entry.split_once(':').ok_or_else(|| {
                BalancerError::Configuration(format!(
                    "Invalid backend {:?}, expected KIND:host:port",
                    entry
                ))
            })?;
            let kind: BackendKind = kind.parse()?;
            let valid_endpoint = endpoint
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid_endpoint {
                return Err(BalancerError::Configuration(format!(
                    "Invalid backend endpoint {:?}, expected host:port",
                    endpoint
                )));
            }
            Ok(BackendConfig {
                endpoint: endpoint.to_string(),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balancer_config_default() {
        let cfg = BalancerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:80");
        assert!(cfg.backends.is_empty());
        assert_eq!(cfg.policy, SelectionPolicy::FullScan);
        assert_eq!(cfg.load_model, LoadModel::Drain);
        assert_eq!(cfg.forward_timeout, Duration::from_secs(60));
        assert_eq!(cfg.client_read_timeout, Duration::from_secs(10));
        assert_eq!(cfg.cost_unit, Duration::from_secs(1));
        assert!(cfg.dashboard_addr.is_none());
    }

    #[test]
    fn balancer_config_builder() {
        let addr: SocketAddr = "10.0.0.1:8080".parse().unwrap();
        let cfg = BalancerConfig::new(addr)
            .with_backend(BackendKind::Video, "192.168.0.101:80")
            .with_backend(BackendKind::Music, "192.168.0.103:80")
            .with_policy(SelectionPolicy::PowerOfTwo, LoadModel::Outstanding);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.backends.len(), 2);
        assert_eq!(cfg.backends[1].kind, BackendKind::Music);
        assert_eq!(cfg.policy, SelectionPolicy::PowerOfTwo);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_pool_fails_validation() {
        let err = BalancerConfig::default().validate().unwrap_err();
        assert!(matches!(err, BalancerError::Configuration(_)));
    }

    #[test]
    fn zero_cost_unit_fails_validation() {
        let mut cfg = BalancerConfig::default().with_backend(BackendKind::Video, "a:80");
        cfg.cost_unit = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_backends_accepts_kind_host_port() {
        let backends = parse_backends("V:192.168.0.101:80, M:music.local:9000").unwrap();
        assert_eq!(
            backends,
            vec![
                BackendConfig {
                    endpoint: "192.168.0.101:80".to_string(),
                    kind: BackendKind::Video,
                },
                BackendConfig {
                    endpoint: "music.local:9000".to_string(),
                    kind: BackendKind::Music,
                },
            ]
        );
    }

    #[test]
    fn parse_backends_empty_string_is_empty_list() {
        assert!(parse_backends("").unwrap().is_empty());
    }

    #[test]
    fn parse_backends_rejects_unknown_type() {
        let err = parse_backends("V:a:80,P:b:80").unwrap_err();
        assert!(matches!(err, BalancerError::Configuration(_)));
    }

    #[test]
    fn parse_backends_rejects_bad_endpoint() {
        assert!(parse_backends("V:nohost").is_err());
        assert!(parse_backends("V:host:notaport").is_err());
        assert!(parse_backends("V").is_err());
    }
}
