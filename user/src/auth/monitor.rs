//! Proactive session refresh monitor
//!
//! One monitor instance watches one client session. A background task
//! polls the session introspector on a fixed interval and refreshes the
//! session before it expires, independent of request traffic. The task is
//! owned by the monitor and cancelled through a watch channel, so its
//! lifetime is tied deterministically to the monitored session's.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tower_sessions::Session;
use tracing::{debug, info, warn};

use super::session::SessionManager;
use super::types::TokenStatus;
use crate::database::UserDatabase;
use crate::error::Result;

/// Source of truth the monitor polls on every tick.
///
/// Implementations introspect and refresh the monitored session; the
/// monitor itself keeps no session state, so a session invalidated
/// out-of-band (logout from another flow) is observed on the next tick.
#[async_trait]
pub trait SessionProbe: Send + Sync + 'static {
    /// Current session state, never erroring on absent/expired sessions
    async fn status(&self) -> Result<TokenStatus>;

    /// Re-issue the session with a fresh expiry
    async fn refresh(&self) -> Result<TokenStatus>;
}

/// Notifications emitted by the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The session was refreshed before expiry
    Refreshed { expires_at: Option<DateTime<Utc>> },
    /// A refresh attempt failed; monitoring continues and retries next tick
    RefreshFailed { reason: String },
    /// The session is gone; monitoring has stopped
    Expired,
}

/// Monitor timing configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between ticks
    pub interval: Duration,
    /// Upper bound for a single tick (introspect + conditional refresh)
    pub tick_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            tick_timeout: Duration::from_secs(10),
        }
    }
}

struct MonitorTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps one session alive by refreshing it shortly before expiry
pub struct RefreshMonitor {
    probe: Arc<dyn SessionProbe>,
    config: MonitorConfig,
    events: mpsc::UnboundedSender<MonitorEvent>,
    task: Mutex<Option<MonitorTask>>,
}

impl RefreshMonitor {
    /// Create a monitor for the given probe. The returned receiver yields
    /// the monitor's notifications.
    pub fn new(
        probe: Arc<dyn SessionProbe>,
        config: MonitorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        (
            Self {
                probe,
                config,
                events,
                task: Mutex::new(None),
            },
            receiver,
        )
    }

    /// Start the recurring tick loop. Calling while already running is a
    /// no-op; a monitor whose loop has terminated can be started again.
    pub async fn start(&self) {
        let mut slot = self.task.lock().await;

        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                debug!("Refresh monitor already running");
                return;
            }
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let probe = Arc::clone(&self.probe);
        let events = self.events.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick completes immediately; consume it so
            // the first real check happens one interval after start.
            ticker.tick().await;

            info!("Refresh monitor started");

            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            debug!("Refresh monitor cancelled");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let event = run_tick(probe.as_ref(), config.tick_timeout).await;

                        let terminal = matches!(event, Some(MonitorEvent::Expired));

                        if let Some(event) = event {
                            let _ = events.send(event);
                        }

                        if terminal {
                            info!("Monitored session expired; stopping monitor");
                            break;
                        }
                    }
                }
            }
        });

        *slot = Some(MonitorTask {
            cancel: cancel_tx,
            handle,
        });
    }

    /// Cancel the tick loop and release the task. Safe to call multiple
    /// times and before `start`.
    pub async fn stop(&self) {
        let task = {
            let mut slot = self.task.lock().await;
            slot.take()
        };

        let Some(task) = task else {
            return;
        };

        let _ = task.cancel.send(true);
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                warn!("Refresh monitor task ended abnormally: {}", e);
            }
        }

        debug!("Refresh monitor stopped");
    }

    /// Whether the tick loop is currently running
    pub async fn is_running(&self) -> bool {
        let slot = self.task.lock().await;
        slot.as_ref().is_some_and(|task| !task.handle.is_finished())
    }

    /// Run one check immediately, refreshing if the session is expiring
    /// soon. Useful before an action that must not hit an expired
    /// session. Emits the resulting notification like a regular tick.
    pub async fn check_and_refresh(&self) -> Option<MonitorEvent> {
        let event = run_tick(self.probe.as_ref(), self.config.tick_timeout).await;

        if let Some(ref event) = event {
            let _ = self.events.send(event.clone());
        }

        event
    }
}

/// Probe over an in-process session handle.
///
/// Introspects and refreshes through the session manager, so the monitor
/// sees exactly what the session endpoints would report.
pub struct SessionHandleProbe {
    manager: SessionManager,
    db: Arc<UserDatabase>,
    session: Session,
}

impl SessionHandleProbe {
    pub fn new(manager: SessionManager, db: Arc<UserDatabase>, session: Session) -> Self {
        Self {
            manager,
            db,
            session,
        }
    }
}

#[async_trait]
impl SessionProbe for SessionHandleProbe {
    async fn status(&self) -> Result<TokenStatus> {
        self.manager.token_status(&self.session).await
    }

    async fn refresh(&self) -> Result<TokenStatus> {
        let assertion = self.manager.refresh(&self.db, &self.session).await?;
        Ok(TokenStatus::from_assertion(
            &assertion,
            self.manager.config().expiring_soon_threshold(),
        ))
    }
}

/// One bounded tick: introspect, then refresh when expiring soon.
///
/// A timed-out or failed tick is a refresh failure, never an expiry; only
/// the introspector saying "not authenticated" is terminal.
async fn run_tick(probe: &dyn SessionProbe, tick_timeout: Duration) -> Option<MonitorEvent> {
    match tokio::time::timeout(tick_timeout, check_once(probe)).await {
        Ok(event) => event,
        Err(_) => Some(MonitorEvent::RefreshFailed {
            reason: "tick timed out".to_string(),
        }),
    }
}

async fn check_once(probe: &dyn SessionProbe) -> Option<MonitorEvent> {
    let status = match probe.status().await {
        Ok(status) => status,
        Err(e) => {
            warn!("Session introspection failed: {}", e);
            return Some(MonitorEvent::RefreshFailed {
                reason: e.to_string(),
            });
        }
    };

    if !status.is_authenticated {
        return Some(MonitorEvent::Expired);
    }

    if !status.is_expiring_soon {
        return None;
    }

    match probe.refresh().await {
        Ok(refreshed) => {
            info!("Session refreshed; expires_at={:?}", refreshed.expires_at);
            Some(MonitorEvent::Refreshed {
                expires_at: refreshed.expires_at,
            })
        }
        Err(e) => {
            warn!("Session refresh failed: {}", e);
            Some(MonitorEvent::RefreshFailed {
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UserError;
    use chrono::Duration as ChronoDuration;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status(expires_in_minutes: i64, threshold_minutes: i64) -> TokenStatus {
        let now = Utc::now();
        let remaining = ChronoDuration::minutes(expires_in_minutes);
        TokenStatus {
            is_authenticated: true,
            username: Some("alice".to_string()),
            issued_at: Some(now),
            expires_at: Some(now + remaining),
            time_remaining_secs: remaining.num_seconds(),
            is_expiring_soon: expires_in_minutes < threshold_minutes,
        }
    }

    /// Probe that replays a scripted sequence of introspection results,
    /// repeating the last one when the script runs out.
    struct ScriptedProbe {
        statuses: Mutex<VecDeque<TokenStatus>>,
        refresh_ok: bool,
        status_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedProbe {
        fn new(statuses: Vec<TokenStatus>, refresh_ok: bool) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                refresh_ok,
                status_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl SessionProbe for ScriptedProbe {
        async fn status(&self) -> Result<TokenStatus> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.status_calls.fetch_add(1, Ordering::SeqCst);

            let mut statuses = self.statuses.lock().await;
            let status = if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses
                    .front()
                    .cloned()
                    .unwrap_or_else(TokenStatus::unauthenticated)
            };

            Ok(status)
        }

        async fn refresh(&self) -> Result<TokenStatus> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);

            if self.refresh_ok {
                Ok(status(60, 10))
            } else {
                Err(UserError::NotAuthenticated)
            }
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_millis(50),
            tick_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_session_is_refreshed() {
        // 8 minutes remaining with a 10 minute threshold: expiring soon
        let probe = Arc::new(ScriptedProbe::new(vec![status(8, 10)], true));
        let (monitor, mut events) = RefreshMonitor::new(probe.clone(), fast_config());

        monitor.start().await;

        let event = events.recv().await.unwrap();
        match event {
            MonitorEvent::Refreshed { expires_at } => {
                assert!(expires_at.unwrap() > Utc::now());
            }
            other => panic!("expected Refreshed, got {:?}", other),
        }

        assert_eq!(probe.refresh_calls.load(Ordering::SeqCst), 1);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_session_is_left_alone() {
        let probe = Arc::new(ScriptedProbe::new(vec![status(50, 10)], true));
        let (monitor, mut events) = RefreshMonitor::new(probe.clone(), fast_config());

        monitor.start().await;

        // Let several ticks elapse
        tokio::time::sleep(Duration::from_millis(300)).await;

        monitor.stop().await;

        assert!(probe.status_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(probe.refresh_calls.load(Ordering::SeqCst), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_is_terminal() {
        let probe = Arc::new(ScriptedProbe::new(
            vec![TokenStatus::unauthenticated()],
            true,
        ));
        let (monitor, mut events) = RefreshMonitor::new(probe.clone(), fast_config());

        monitor.start().await;

        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Expired);

        // The loop has exited; no further ticks poll the probe
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(probe.status_calls.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running().await);

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_is_not_fatal() {
        let probe = Arc::new(ScriptedProbe::new(vec![status(5, 10)], false));
        let (monitor, mut events) = RefreshMonitor::new(probe.clone(), fast_config());

        monitor.start().await;

        // Two consecutive failures: the monitor kept ticking after the first
        for _ in 0..2 {
            match events.recv().await.unwrap() {
                MonitorEvent::RefreshFailed { .. } => {}
                other => panic!("expected RefreshFailed, got {:?}", other),
            }
        }

        assert!(probe.refresh_calls.load(Ordering::SeqCst) >= 2);
        assert!(monitor.is_running().await);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_tick_reports_refresh_failure() {
        let probe = Arc::new(
            ScriptedProbe::new(vec![status(5, 10)], true)
                .with_delay(Duration::from_secs(5)),
        );
        let config = MonitorConfig {
            interval: Duration::from_millis(50),
            tick_timeout: Duration::from_millis(100),
        };
        let (monitor, mut events) = RefreshMonitor::new(probe, config);

        monitor.start().await;

        match events.recv().await.unwrap() {
            MonitorEvent::RefreshFailed { reason } => {
                assert_eq!(reason, "tick timed out");
            }
            other => panic!("expected RefreshFailed, got {:?}", other),
        }

        // A slow tick is never an expiry
        assert!(monitor.is_running().await);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let probe = Arc::new(ScriptedProbe::new(vec![status(50, 10)], true));
        let (monitor, _events) = RefreshMonitor::new(probe, fast_config());

        // Stop before start is a no-op
        monitor.stop().await;

        monitor.start().await;
        assert!(monitor.is_running().await);

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_noop() {
        // An unauthenticated probe makes each loop emit exactly one
        // Expired event, so a double-registered timer would emit two.
        let probe = Arc::new(ScriptedProbe::new(
            vec![TokenStatus::unauthenticated()],
            true,
        ));
        let (monitor, mut events) = RefreshMonitor::new(probe, fast_config());

        monitor.start().await;
        monitor.start().await;

        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Expired);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(events.try_recv().is_err());

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_check_and_refresh_on_demand() {
        let probe = Arc::new(ScriptedProbe::new(vec![status(5, 10)], true));
        let (monitor, mut events) = RefreshMonitor::new(probe.clone(), MonitorConfig::default());

        // No background task needed
        let event = monitor.check_and_refresh().await;
        assert!(matches!(event, Some(MonitorEvent::Refreshed { .. })));
        assert_eq!(probe.refresh_calls.load(Ordering::SeqCst), 1);

        // The notification also reaches the event stream
        assert!(matches!(
            events.try_recv().unwrap(),
            MonitorEvent::Refreshed { .. }
        ));
    }

    #[tokio::test]
    async fn test_session_handle_probe_refreshes_real_session() {
        use crate::audit_log::AuditLogConfig;
        use crate::auth::store::SessionConfig;
        use crate::auth::types::AuthenticatedUser;
        use crate::database::UserDatabaseConfig;
        use tempfile::TempDir;
        use tower_sessions::MemoryStore;

        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            UserDatabase::new(UserDatabaseConfig {
                database_path: temp_dir.path().join("test_user.db"),
                max_connections: 5,
                connection_timeout: 30,
                audit_log_config: AuditLogConfig {
                    log_path: temp_dir.path().join("test_audit.log"),
                    max_size_mb: 10,
                    max_rotations: 5,
                    enable_verification: true,
                },
            })
            .await
            .unwrap(),
        );

        let user = db
            .create_user("dave", "dave@example.com", "Dave", "s3cret!")
            .await
            .unwrap();

        let session = Session::new(
            None,
            std::sync::Arc::new(MemoryStore::default()),
            None,
        );

        // Issue with 8 minutes of lifetime: inside the 10 minute
        // expiring-soon window from the start
        let short_manager = SessionManager::new(SessionConfig {
            lifetime_seconds: 8 * 60,
            ..SessionConfig::default()
        });
        let original = short_manager
            .issue(&session, &user, Vec::new())
            .await
            .unwrap();

        // The probe refreshes with the full one hour lifetime
        let full_manager = SessionManager::new(SessionConfig {
            lifetime_seconds: 3600,
            ..SessionConfig::default()
        });
        let probe = Arc::new(SessionHandleProbe::new(
            full_manager.clone(),
            db.clone(),
            session.clone(),
        ));

        let (monitor, _events) = RefreshMonitor::new(probe, MonitorConfig::default());

        let event = monitor.check_and_refresh().await;
        match event {
            Some(MonitorEvent::Refreshed { expires_at }) => {
                // Fresh expiry counts from the refresh time, not the
                // original issue time
                assert!(expires_at.unwrap() > original.expires_at);
            }
            other => panic!("expected Refreshed, got {:?}", other),
        }

        let status = full_manager.token_status(&session).await.unwrap();
        assert!(status.is_authenticated);
        assert!(!status.is_expiring_soon);
        assert!(status.time_remaining_secs > 3500);
    }

    #[tokio::test]
    async fn test_check_and_refresh_healthy_session() {
        let probe = Arc::new(ScriptedProbe::new(vec![status(50, 10)], true));
        let (monitor, _events) = RefreshMonitor::new(probe.clone(), MonitorConfig::default());

        let event = monitor.check_and_refresh().await;
        assert!(event.is_none());
        assert_eq!(probe.refresh_calls.load(Ordering::SeqCst), 0);
    }
}
