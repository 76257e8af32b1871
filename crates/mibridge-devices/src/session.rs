/*!
 * Device session manager.
 *
 * Owns the one live session of an accessory. Discovery is retried after a
 * fixed delay until it succeeds; there is no backoff growth and no attempt
 * cap. Until a session exists, [`SessionManager::session`] fails fast so
 * callers never block or queue.
 */
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use mibridge_core::logging::component_span;

use crate::device::{DeviceError, DeviceState, Result};
use crate::discovery::{discover_once, DiscoveryOptions, FailureStreak, RetryPolicy};
use crate::protocol::{DeviceClient, DeviceSession};

/// Callback run every time a session is established
pub type DiscoveryHook = Arc<dyn Fn(Arc<dyn DeviceSession>) + Send + Sync>;

struct Shared {
    client: Arc<dyn DeviceClient>,
    options: DiscoveryOptions,
    policy: RetryPolicy,
    session: RwLock<Option<Arc<dyn DeviceSession>>>,
    state: watch::Sender<DeviceState>,
    hook: RwLock<Option<DiscoveryHook>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Discovers a device and holds its session
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("client", &self.shared.client.name())
            .field("options", &self.shared.options)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionManager {
    /// Create a session manager; nothing happens until [`start`](Self::start)
    pub fn new(
        client: Arc<dyn DeviceClient>,
        options: DiscoveryOptions,
        policy: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(DeviceState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                client,
                options,
                policy,
                session: RwLock::new(None),
                state,
                hook: RwLock::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Register the callback run after each successful discovery
    pub fn on_discovered<F>(&self, hook: F)
    where
        F: Fn(Arc<dyn DeviceSession>) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.shared.hook.write() {
            *slot = Some(Arc::new(hook));
        }
    }

    /// Network address of the managed device
    pub fn address(&self) -> &str {
        &self.shared.options.address
    }

    /// Retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.shared.policy
    }

    /// Current connection status
    pub fn state(&self) -> DeviceState {
        *self.shared.state.borrow()
    }

    /// Watch connection status changes
    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.shared.state.subscribe()
    }

    /// The live session, or [`DeviceError::NotConnected`] if there is none
    pub fn session(&self) -> Result<Arc<dyn DeviceSession>> {
        self.shared
            .session
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(DeviceError::NotConnected)
    }

    /// Spawn the discovery loop unless one is already running or a session exists
    pub fn start(&self) {
        if self.session().is_ok() {
            return;
        }

        let Ok(mut task) = self.shared.task.lock() else {
            return;
        };
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let manager = self.clone();
        let span = component_span("session", Some(self.address()));
        *task = Some(tokio::spawn(async move { manager.discover().await }.instrument(span)));
    }

    /// Try to discover the device until it succeeds.
    ///
    /// Each failure is logged and followed by the policy's fixed delay. On
    /// success the session is stored and the discovery hook is run.
    pub async fn discover(&self) {
        let shared = &self.shared;
        let mut streak = FailureStreak::default();

        loop {
            shared.state.send_replace(DeviceState::Connecting);

            match discover_once(shared.client.as_ref(), &shared.options, &shared.policy).await {
                Ok(session) => {
                    if streak.failures() > 0 {
                        info!(
                            "discover: recovered at {} after {} failed attempts",
                            shared.options.address,
                            streak.failures()
                        );
                    }
                    self.install(session);
                    return;
                }
                Err(err) => {
                    shared.state.send_replace(DeviceState::Disconnected);
                    streak.record(&shared.options.address, &err, &shared.policy);
                    tokio::time::sleep(shared.policy.interval).await;
                }
            }
        }
    }

    fn install(&self, session: Arc<dyn DeviceSession>) {
        info!("discover: discovered at {}", self.shared.options.address);

        let mut snapshot: Vec<_> = session.properties().into_iter().collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        let rendered = snapshot
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        debug!(model = %session.model(), "discover: properties {}", rendered);

        {
            // This loop is done; release the slot so a failure reported from
            // the hook can start a fresh one
            let task = self.shared.task.lock().ok().and_then(|mut task| task.take());
            drop(task);
            if let Ok(mut slot) = self.shared.session.write() {
                *slot = Some(session.clone());
            }
        }
        self.shared.state.send_replace(DeviceState::Connected);

        let hook = self.shared.hook.read().ok().and_then(|hook| hook.clone());
        if let Some(hook) = hook {
            hook(session);
        }
    }

    /// Wait until a session is available and return it
    pub async fn wait_connected(&self) -> Arc<dyn DeviceSession> {
        let mut state = self.subscribe_state();
        loop {
            if let Ok(session) = self.session() {
                return session;
            }
            if state.changed().await.is_err() {
                // The sender lives in `self`, so this cannot happen while we hold it
                tokio::task::yield_now().await;
            }
        }
    }

    /// Tell the manager a command failed.
    ///
    /// There is no heartbeat, so this is the only way session loss is
    /// noticed. When the policy allows it and the error is a lost connection,
    /// the session is dropped and discovery restarts. Returns whether that
    /// happened.
    pub fn report_failure(&self, err: &DeviceError) -> bool {
        if !self.shared.policy.rediscover_on_connection_loss || !err.is_connection_loss() {
            return false;
        }

        let dropped = self
            .shared
            .session
            .write()
            .ok()
            .and_then(|mut slot| slot.take())
            .is_some();
        if !dropped {
            return false;
        }

        warn!(
            "session: lost connection to {} ({}), rediscovering",
            self.shared.options.address, err
        );
        self.shared.state.send_replace(DeviceState::Disconnected);
        self.start();
        true
    }

    /// Stop discovery and drop the session
    pub fn shutdown(&self) {
        if let Ok(mut task) = self.shared.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        if let Ok(mut slot) = self.shared.session.write() {
            slot.take();
        }
        self.shared.state.send_replace(DeviceState::Disconnected);
        debug!("session: shut down {}", self.shared.options.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::devices::simulated::{SimulatedClient, SimulatedDevice};

    fn manager_for(client: &SimulatedClient, address: &str, policy: RetryPolicy) -> SessionManager {
        SessionManager::new(
            Arc::new(client.clone()),
            DiscoveryOptions::new(address, "token"),
            policy,
        )
    }

    #[tokio::test]
    async fn test_no_session_before_discovery() {
        let client = SimulatedClient::new();
        let manager = manager_for(&client, "10.0.0.1", RetryPolicy::default());

        assert!(matches!(manager.session(), Err(DeviceError::NotConnected)));
        assert_eq!(manager.state(), DeviceState::Disconnected);
        assert_eq!(client.connect_attempts(), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_retries_with_fixed_delay() {
        let client = SimulatedClient::new();
        let device = SimulatedDevice::air_purifier("10.0.0.2");
        client.add_device(device);
        client.refuse_connections(3);

        let manager = manager_for(&client, "10.0.0.2", RetryPolicy::default());
        let started = tokio::time::Instant::now();
        manager.start();

        let session = manager.wait_connected().await;

        assert_eq!(session.address(), "10.0.0.2");
        assert_eq!(client.connect_attempts(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(90));
        assert_eq!(manager.state(), DeviceState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_device_keeps_retrying() {
        let client = SimulatedClient::new();
        let manager = manager_for(&client, "10.0.0.3", RetryPolicy::default());
        manager.start();

        tokio::time::sleep(Duration::from_secs(30 * 5 + 1)).await;
        assert_eq!(client.connect_attempts(), 6);
        assert!(manager.session().is_err());

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_hook_runs_on_discovery() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::air_purifier("10.0.0.4"));
        let manager = manager_for(&client, "10.0.0.4", RetryPolicy::default());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.on_discovered(move |session| {
            assert_eq!(session.address(), "10.0.0.4");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.discover().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.session().is_ok());
    }

    #[tokio::test]
    async fn test_connection_loss_ignored_by_default() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::air_purifier("10.0.0.5"));
        let manager = manager_for(&client, "10.0.0.5", RetryPolicy::default());
        manager.discover().await;

        let rediscovering = manager.report_failure(&DeviceError::ConnectionLost("gone".into()));

        assert!(!rediscovering);
        assert!(manager.session().is_ok());
    }

    #[tokio::test]
    async fn test_connection_loss_triggers_rediscovery_when_enabled() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::air_purifier("10.0.0.6"));
        let policy = RetryPolicy {
            rediscover_on_connection_loss: true,
            ..RetryPolicy::default()
        };
        let manager = manager_for(&client, "10.0.0.6", policy);
        manager.discover().await;

        assert!(!manager.report_failure(&DeviceError::rejected("set_mode", "busy")));
        assert!(manager.report_failure(&DeviceError::ConnectionLost("gone".into())));

        manager.wait_connected().await;
        assert_eq!(client.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_connection_loss_right_after_discovery_restarts_loop() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::air_purifier("10.0.0.8"));
        let policy = RetryPolicy {
            rediscover_on_connection_loss: true,
            ..RetryPolicy::default()
        };
        let manager = manager_for(&client, "10.0.0.8", policy);

        // Fail the first session from inside the discovery task itself
        let lost_once = Arc::new(AtomicBool::new(false));
        let reporter = manager.clone();
        let flag = lost_once.clone();
        manager.on_discovered(move |_| {
            if !flag.swap(true, Ordering::SeqCst) {
                assert!(reporter.report_failure(&DeviceError::ConnectionLost("reset".into())));
            }
        });
        manager.start();

        let rediscovered = tokio::time::timeout(Duration::from_secs(5), async {
            while client.connect_attempts() < 2 || manager.session().is_err() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(rediscovered.is_ok());
        assert!(lost_once.load(Ordering::SeqCst));
        assert_eq!(client.connect_attempts(), 2);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_drops_session() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::camera("10.0.0.7"));
        let manager = manager_for(&client, "10.0.0.7", RetryPolicy::default());
        manager.discover().await;

        manager.shutdown();

        assert!(matches!(manager.session(), Err(DeviceError::NotConnected)));
        assert_eq!(manager.state(), DeviceState::Disconnected);
    }
}
