/*!
 * Device discovery for mibridge.
 *
 * A single discovery attempt, the options it runs with, and the fixed-delay
 * retry policy the session manager applies between attempts.
 */
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn, Level};

use mibridge_core::config::DiscoveryConfig;
use mibridge_core::utils::with_timeout;

use crate::device::{DeviceError, Result};
use crate::protocol::{DeviceClient, DeviceSession};

/// What to connect to
#[derive(Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Network address of the device
    pub address: String,
    /// Shared-secret token
    pub token: String,
    /// Model the device must report, if the profile requires one
    pub model: Option<String>,
}

impl DiscoveryOptions {
    /// Create discovery options for an address and token
    pub fn new<A: Into<String>, T: Into<String>>(address: A, token: T) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            model: None,
        }
    }

    /// Require the device to report `model`
    pub fn with_model<M: Into<String>>(mut self, model: M) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl fmt::Debug for DiscoveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryOptions")
            .field("address", &self.address)
            .field("token", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// How discovery is retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts; never grows
    pub interval: Duration,
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// During a failure streak, log one warning every this many failures
    pub failure_log_every: u32,
    /// Drop the session and rediscover when a command reports a lost connection
    pub rediscover_on_connection_loss: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for RetryPolicy {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            interval: config.retry_interval(),
            connect_timeout: config.connect_timeout(),
            failure_log_every: config.failure_log_every.max(1),
            rediscover_on_connection_loss: config.rediscover_on_connection_loss,
        }
    }
}

/// Tracks consecutive discovery failures and decides how loudly to log them
#[derive(Debug, Default)]
pub(crate) struct FailureStreak {
    failures: u32,
}

impl FailureStreak {
    /// Record one failure and log it at the level the streak length calls
    /// for. Returns that level.
    pub(crate) fn record(
        &mut self,
        address: &str,
        err: &DeviceError,
        policy: &RetryPolicy,
    ) -> Level {
        self.failures = self.failures.saturating_add(1);
        let retry_secs = policy.interval.as_secs();
        // A zero cadence means every failure warns
        let every = policy.failure_log_every.max(1);

        if self.failures == 1 {
            error!(
                "discover: failed at {} with {}, retry in {}s",
                address, err, retry_secs
            );
            Level::ERROR
        } else if self.failures % every == 0 {
            warn!(
                "discover: still failing at {} after {} attempts ({}), retry in {}s",
                address, self.failures, err, retry_secs
            );
            Level::WARN
        } else {
            debug!(
                "discover: attempt {} failed at {} with {}",
                self.failures, address, err
            );
            Level::DEBUG
        }
    }

    /// Number of failures in the current streak
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run one discovery attempt: connect, bounded by the policy's timeout, then
/// check the reported model.
pub async fn discover_once(
    client: &dyn DeviceClient,
    options: &DiscoveryOptions,
    policy: &RetryPolicy,
) -> Result<Arc<dyn DeviceSession>> {
    debug!("discover: connecting to {} via {}", options.address, client.name());

    let session = with_timeout(policy.connect_timeout, client.connect(options)).await??;

    if let Some(expected) = options.model.as_deref() {
        if session.model() != expected {
            return Err(DeviceError::UnexpectedModel {
                expected: expected.to_string(),
                actual: session.model().to_string(),
            });
        }
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::simulated::{SimulatedClient, SimulatedDevice};

    #[test]
    fn test_options_debug_redacts_token() {
        let options = DiscoveryOptions::new("192.168.1.20", "supersecret");
        let rendered = format!("{:?}", options);
        assert!(rendered.contains("192.168.1.20"));
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_policy_from_config() {
        let config = DiscoveryConfig {
            retry_interval_secs: 7,
            connect_timeout_secs: 3,
            failure_log_every: 0,
            rediscover_on_connection_loss: true,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_secs(7));
        assert_eq!(policy.connect_timeout, Duration::from_secs(3));
        assert_eq!(policy.failure_log_every, 1);
        assert!(policy.rediscover_on_connection_loss);
    }

    #[test]
    fn test_failure_streak_caps_log_volume() {
        let policy = RetryPolicy::default();
        let mut streak = FailureStreak::default();
        let err = DeviceError::Timeout("no reply".into());

        let levels: Vec<Level> = (0..11)
            .map(|_| streak.record("10.0.0.1", &err, &policy))
            .collect();

        assert_eq!(levels[0], Level::ERROR);
        assert!(levels[1..9].iter().all(|level| *level == Level::DEBUG));
        assert_eq!(levels[9], Level::WARN);
        assert_eq!(levels[10], Level::DEBUG);
        assert_eq!(streak.failures(), 11);
    }

    #[test]
    fn test_failure_streak_with_zero_cadence() {
        let policy = RetryPolicy {
            failure_log_every: 0,
            ..RetryPolicy::default()
        };
        let mut streak = FailureStreak::default();
        let err = DeviceError::Timeout("no reply".into());

        assert_eq!(streak.record("10.0.0.2", &err, &policy), Level::ERROR);
        assert_eq!(streak.record("10.0.0.2", &err, &policy), Level::WARN);
        assert_eq!(streak.record("10.0.0.2", &err, &policy), Level::WARN);
        assert_eq!(streak.failures(), 3);
    }

    #[tokio::test]
    async fn test_discover_once_checks_model() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::air_purifier("10.0.0.5"));

        let options = DiscoveryOptions::new("10.0.0.5", "token").with_model("chuangmi.camera.xiaobai");
        let err = discover_once(&client, &options, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::UnexpectedModel { .. }));
    }

    #[tokio::test]
    async fn test_discover_once_connects() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::camera("10.0.0.6"));

        let options = DiscoveryOptions::new("10.0.0.6", "token").with_model("chuangmi.camera.xiaobai");
        let session = discover_once(&client, &options, &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(session.address(), "10.0.0.6");
        assert_eq!(session.model(), "chuangmi.camera.xiaobai");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_once_times_out() {
        let client = SimulatedClient::new();
        let device = SimulatedDevice::air_purifier("10.0.0.7");
        device.set_connect_delay(Duration::from_secs(60));
        client.add_device(device);

        let policy = RetryPolicy {
            connect_timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        let err = discover_once(&client, &DiscoveryOptions::new("10.0.0.7", "t"), &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Timeout(_)));
    }
}
