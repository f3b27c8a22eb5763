use std::{
    env,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::Identity, errors::Error, Result};

/// Typed configuration, loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // HTTP
    pub bind_addr: SocketAddr,
    pub upload_limit_bytes: usize,

    // Sessions
    pub sessions_dir: PathBuf,
    pub min_identity_digits: usize,
    pub reconnect: ReconnectPolicy,

    // Protocol sidecar
    pub bridge_url: String,
    pub bridge_timeout: Duration,
    pub bridge_poll_interval: Duration,

    // Bulk sends
    pub max_delay: Duration,
    pub exclusive_sender: bool,
    /// Prefixed to contact-list numbers that do not already start with it.
    pub default_country_code: Option<String>,
}

/// When and how often a dropped (non-terminal) session is re-opened.
///
/// The default is a fixed 3s delay with no attempt cap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// `1.0` keeps the delay fixed.
    pub multiplier: f64,
    /// Consecutive failed re-opens before the identity is dropped. `None` = retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor).min(u64::MAX as f64) as u64;
        Duration::from_millis(millis).min(self.max_delay.max(self.base_delay))
    }

    pub fn exhausted(&self, failed_attempts: u32) -> bool {
        self.max_attempts
            .map(|max| failed_attempts >= max)
            .unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            upload_limit_bytes: 100 * 1024 * 1024,
            sessions_dir: PathBuf::from("sessions"),
            min_identity_digits: 10,
            reconnect: ReconnectPolicy::default(),
            bridge_url: "http://127.0.0.1:3000".to_string(),
            bridge_timeout: Duration::from_secs(30),
            bridge_poll_interval: Duration::from_millis(1000),
            max_delay: Duration::from_secs(3600),
            exclusive_sender: false,
            default_country_code: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let defaults = Self::default();

        let bind_addr = match env_str("COURIER_BIND").and_then(non_empty) {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("COURIER_BIND `{raw}`: {e}")))?,
            None => defaults.bind_addr,
        };
        let upload_limit_bytes =
            env_usize("COURIER_UPLOAD_LIMIT_BYTES").unwrap_or(defaults.upload_limit_bytes);

        let sessions_dir = env_path("COURIER_SESSIONS_DIR").unwrap_or(defaults.sessions_dir);
        fs::create_dir_all(&sessions_dir)?;
        let min_identity_digits =
            env_usize("COURIER_MIN_IDENTITY_DIGITS").unwrap_or(defaults.min_identity_digits);

        let reconnect = ReconnectPolicy {
            base_delay: env_u64("COURIER_RECONNECT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.base_delay),
            max_delay: env_u64("COURIER_RECONNECT_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.max_delay),
            multiplier: env_f64("COURIER_RECONNECT_BACKOFF")
                .filter(|m| m.is_finite() && *m >= 1.0)
                .unwrap_or(defaults.reconnect.multiplier),
            max_attempts: env_u32("COURIER_RECONNECT_MAX_ATTEMPTS").filter(|n| *n > 0),
        };

        let bridge_url = env_str("COURIER_BRIDGE_URL")
            .and_then(non_empty)
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.bridge_url);
        let bridge_timeout = env_u64("COURIER_BRIDGE_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.bridge_timeout);
        let bridge_poll_interval = env_u64("COURIER_BRIDGE_POLL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.bridge_poll_interval);

        let max_delay = env_u64("COURIER_MAX_DELAY_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_delay);
        let exclusive_sender = env_bool("COURIER_EXCLUSIVE_SENDER").unwrap_or(false);
        let default_country_code = env_str("COURIER_DEFAULT_COUNTRY_CODE")
            .map(|c| c.chars().filter(|ch| ch.is_ascii_digit()).collect::<String>())
            .filter(|c| !c.is_empty());

        Ok(Self {
            bind_addr,
            upload_limit_bytes,
            sessions_dir,
            min_identity_digits,
            reconnect,
            bridge_url,
            bridge_timeout,
            bridge_poll_interval,
            max_delay,
            exclusive_sender,
            default_country_code,
        })
    }

    /// Credential directory owned by the transport for one identity.
    pub fn credential_dir(&self, identity: &Identity) -> PathBuf {
        self.sessions_dir.join(identity.as_str())
    }

    /// Inter-message delay, clamped into `1s..=max_delay`.
    pub fn clamp_delay(&self, delay_secs: u64) -> Duration {
        let max = self.max_delay.as_secs().max(1);
        Duration::from_secs(delay_secs.clamp(1, max))
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key).and_then(|s| s.trim().parse::<f64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_is_fixed_and_unbounded() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay_for(0), Duration::from_secs(3));
        assert_eq!(p.delay_for(10), Duration::from_secs(3));
        assert!(!p.exhausted(1_000));
    }

    #[test]
    fn backoff_grows_to_ceiling() {
        let p = ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: Some(3),
        };
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(8), Duration::from_secs(10));
        assert!(!p.exhausted(2));
        assert!(p.exhausted(3));
    }

    #[test]
    fn clamp_delay_bounds_both_ends() {
        let cfg = Config {
            max_delay: Duration::from_secs(30),
            ..Config::default()
        };
        assert_eq!(cfg.clamp_delay(0), Duration::from_secs(1));
        assert_eq!(cfg.clamp_delay(5), Duration::from_secs(5));
        assert_eq!(cfg.clamp_delay(10_000), Duration::from_secs(30));
    }

    #[test]
    fn credential_dir_is_per_identity() {
        let cfg = Config::default();
        let id = Identity::parse("15551234567", 10).unwrap();
        assert_eq!(
            cfg.credential_dir(&id),
            PathBuf::from("sessions").join("15551234567")
        );
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
    }
}
