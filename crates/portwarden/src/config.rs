//! Supervisor configuration from the process environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use portwarden_access::AccessConfig;
use portwarden_idle::{IdleConfig, ProbeFailurePolicy};

use crate::PortwardenError;
use crate::signature::SignatureVerifier;

/// Everything the `portwarden` binary needs to start.
///
/// Read with [`SupervisorConfig::from_env`]. Recognised variables:
///
/// | Variable | Default |
/// |---|---|
/// | `PORT` | `5001` |
/// | `AUTH_SECRET` | required unless `DRY_RUN` |
/// | `SIGNATURE_MAX_AGE_SECS` | `300` |
/// | `GRANT_WINDOW_SECS` / `GRACE_WINDOW_SECS` | `300` |
/// | `MAX_ALIASES` | `2` |
/// | `IDLE_POLL_SECS` | `180` |
/// | `IDLE_THRESHOLD` | `3` |
/// | `PROBE_URL` | `http://127.0.0.1:27111/online` |
/// | `PROBE_FAILURE_POLICY` | `empty` (or `occupied`) |
/// | `FIREWALL_URL` | required unless `DRY_RUN` |
/// | `STOP_COMMAND` | required unless `DRY_RUN` |
/// | `GAME_PORT` | `24111` |
/// | `DRY_RUN` | off |
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub bind: SocketAddr,
    /// Shared secret for `/authorize`. `None` only in dry-run mode, where
    /// signatures are not checked.
    pub auth_secret: Option<String>,
    pub signature_max_age: Duration,
    pub access: AccessConfig,
    pub idle: IdleConfig,
    pub probe_url: String,
    pub firewall_url: Option<String>,
    pub stop_command: Option<String>,
    /// Reported by `/status` when the probe doesn't say.
    pub game_port: u16,
    pub dry_run: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5001)),
            auth_secret: None,
            signature_max_age: SignatureVerifier::DEFAULT_MAX_AGE,
            access: AccessConfig::default(),
            idle: IdleConfig::default(),
            probe_url: "http://127.0.0.1:27111/online".to_string(),
            firewall_url: None,
            stop_command: None,
            game_port: 24111,
            dry_run: false,
        }
    }
}

impl SupervisorConfig {
    /// Reads the configuration from environment variables.
    ///
    /// # Errors
    /// [`PortwardenError::Config`] if a variable doesn't parse, or if a
    /// required one is missing outside dry-run mode.
    pub fn from_env() -> Result<Self, PortwardenError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PortwardenError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.dry_run = get("DRY_RUN").is_some_and(|v| parse_flag(&v));

        if let Some(port) = parse_opt::<u16>(&get, "PORT")? {
            config.bind.set_port(port);
        }
        config.auth_secret = get("AUTH_SECRET");
        if let Some(secs) = parse_opt::<u64>(&get, "SIGNATURE_MAX_AGE_SECS")? {
            config.signature_max_age = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_opt::<u64>(&get, "GRANT_WINDOW_SECS")? {
            config.access.grant_window = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_opt::<u64>(&get, "GRACE_WINDOW_SECS")? {
            config.access.grace_window = Duration::from_secs(secs);
        }
        if let Some(n) = parse_opt::<u8>(&get, "MAX_ALIASES")? {
            config.access.max_aliases = n;
            config.access.max_active_slots = config.access.slot_count();
        }

        if let Some(secs) = parse_opt::<u64>(&get, "IDLE_POLL_SECS")? {
            config.idle.poll_interval = Duration::from_secs(secs);
        }
        if let Some(n) = parse_opt::<u32>(&get, "IDLE_THRESHOLD")? {
            config.idle.empty_poll_threshold = n;
        }
        if let Some(raw) = get("PROBE_FAILURE_POLICY") {
            config.idle.probe_failure = ProbeFailurePolicy::parse(&raw).ok_or_else(|| {
                PortwardenError::Config(format!(
                    "PROBE_FAILURE_POLICY must be `empty` or `occupied`, got {raw:?}"
                ))
            })?;
        }

        if let Some(url) = get("PROBE_URL") {
            config.probe_url = url;
        }
        config.firewall_url = get("FIREWALL_URL");
        config.stop_command = get("STOP_COMMAND");
        if let Some(port) = parse_opt::<u16>(&get, "GAME_PORT")? {
            config.game_port = port;
        }

        config.check()?;
        Ok(config)
    }

    /// The verifier for `/authorize`, if a secret is configured.
    pub fn verifier(&self) -> Option<SignatureVerifier> {
        self.auth_secret
            .as_ref()
            .map(|secret| SignatureVerifier::new(secret, self.signature_max_age))
    }

    fn check(&self) -> Result<(), PortwardenError> {
        if self.dry_run {
            return Ok(());
        }
        let required = [
            ("AUTH_SECRET", self.auth_secret.is_some()),
            ("FIREWALL_URL", self.firewall_url.is_some()),
            ("STOP_COMMAND", self.stop_command.is_some()),
        ];
        for (key, present) in required {
            if !present {
                return Err(PortwardenError::Config(format!(
                    "{key} is required unless DRY_RUN is set"
                )));
            }
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_opt<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, PortwardenError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| PortwardenError::Config(format!("{key} has invalid value {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<SupervisorConfig, PortwardenError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SupervisorConfig::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("AUTH_SECRET", "s3cret"),
        ("FIREWALL_URL", "http://fw.internal/rules"),
        ("STOP_COMMAND", "systemctl stop game"),
    ];

    #[test]
    fn test_from_lookup_required_only_uses_defaults() {
        let cfg = load(&REQUIRED).unwrap();
        assert_eq!(cfg.bind.port(), 5001);
        assert_eq!(cfg.access, AccessConfig::default());
        assert_eq!(cfg.idle, IdleConfig::default());
        assert_eq!(cfg.game_port, 24111);
        assert!(!cfg.dry_run);
        assert!(cfg.verifier().is_some());
    }

    #[test]
    fn test_from_lookup_missing_secret_is_error() {
        let err = load(&REQUIRED[1..]).unwrap_err();
        assert!(matches!(err, PortwardenError::Config(ref m) if m.contains("AUTH_SECRET")));
    }

    #[test]
    fn test_from_lookup_dry_run_needs_nothing() {
        let cfg = load(&[("DRY_RUN", "1")]).unwrap();
        assert!(cfg.dry_run);
        assert!(cfg.verifier().is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PORT", "8080"),
            ("GRANT_WINDOW_SECS", "60"),
            ("GRACE_WINDOW_SECS", "120"),
            ("MAX_ALIASES", "4"),
            ("IDLE_POLL_SECS", "30"),
            ("IDLE_THRESHOLD", "5"),
            ("PROBE_FAILURE_POLICY", "occupied"),
            ("SIGNATURE_MAX_AGE_SECS", "10"),
            ("GAME_PORT", "25565"),
        ]);

        let cfg = load(&vars).unwrap();

        assert_eq!(cfg.bind.port(), 8080);
        assert_eq!(cfg.access.grant_window, Duration::from_secs(60));
        assert_eq!(cfg.access.grace_window, Duration::from_secs(120));
        assert_eq!(cfg.access.max_aliases, 4);
        assert_eq!(cfg.access.max_active_slots, 5);
        assert_eq!(cfg.idle.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.idle.empty_poll_threshold, 5);
        assert_eq!(cfg.idle.probe_failure, ProbeFailurePolicy::CountAsOccupied);
        assert_eq!(cfg.signature_max_age, Duration::from_secs(10));
        assert_eq!(cfg.game_port, 25565);
    }

    #[test]
    fn test_from_lookup_bad_number_names_variable() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("IDLE_THRESHOLD", "three"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("IDLE_THRESHOLD"));
    }

    #[test]
    fn test_from_lookup_bad_policy_is_error() {
        let err = load(&[("DRY_RUN", "true"), ("PROBE_FAILURE_POLICY", "sometimes")]).unwrap_err();
        assert!(err.to_string().contains("PROBE_FAILURE_POLICY"));
    }

    #[test]
    fn test_from_lookup_blank_values_count_as_unset() {
        let err = load(&[("AUTH_SECRET", "  "), ("FIREWALL_URL", "x"), ("STOP_COMMAND", "y")])
            .unwrap_err();
        assert!(err.to_string().contains("AUTH_SECRET"));
    }
}
