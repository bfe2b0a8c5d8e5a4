//! Conditioner lifecycle and tick scheduling
//!
//! A single tokio task drives ticks. Lifecycle calls and ticks share one
//! mutex, so only one of them touches session state at a time. Each started
//! or resumed timer carries an epoch; stop and pause bump the epoch under the
//! lock, so once they return no further tick can begin.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::camera::CameraCapabilities;
use crate::config::ConditionerConfig;
use crate::error::ConditionerError;
use crate::state::{ConditionerSnapshot, ConditionerState};
use crate::transport::{ConnectionId, Transport};

struct Session {
    state: ConditionerState,
    started_at: Instant,
}

impl Session {
    fn now(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    epoch: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_ticker(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.ticker.is_some()
    }
}

/// Owns the conditioner for one outbound stream
pub struct ConditionerSupervisor {
    config: ConditionerConfig,
    camera: CameraCapabilities,
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<Inner>>,
}

impl ConditionerSupervisor {
    pub fn new(
        config: ConditionerConfig,
        camera: CameraCapabilities,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConditionerError> {
        config.validate()?;
        Ok(Self {
            config,
            camera,
            transport,
            inner: Arc::new(Mutex::new(Inner::default())),
        })
    }

    /// Begin a session at `full_bitrate` bits/sec.
    ///
    /// Any previous session is discarded along with its connections; register
    /// connections after this returns.
    pub async fn start(&self, full_bitrate: u32) -> Result<(), ConditionerError> {
        if full_bitrate == 0 {
            return Err(ConditionerError::InvalidBitrate(full_bitrate));
        }

        let mut inner = self.inner.lock().await;
        inner.cancel_ticker();

        let state = ConditionerState::new(
            &self.config,
            self.camera.clone(),
            full_bitrate,
            Duration::ZERO,
        );
        let initial = state.current_bitrate();
        self.transport.change_bitrate(initial);
        inner.session = Some(Session {
            state,
            started_at: Instant::now(),
        });

        tracing::info!(full_bitrate, initial_bitrate = initial, "Conditioner started");
        self.spawn_ticker(&mut inner);
        Ok(())
    }

    /// End the session. Restores the camera frame rate if it was reduced.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.cancel_ticker();

        let Some(mut session) = inner.session.take() else {
            tracing::debug!("Conditioner stop without active session");
            return;
        };
        if session.state.restore_full_fps(self.transport.as_ref()) {
            tracing::info!("Restored full frame rate");
        }
        session.state.clear_connections();
        tracing::info!(
            bitrate = session.state.current_bitrate(),
            "Conditioner stopped"
        );
    }

    /// Suspend ticks, keeping all session state
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        if inner.session.is_none() {
            tracing::warn!("Conditioner pause without active session");
            return;
        }
        inner.cancel_ticker();
        tracing::info!("Conditioner paused");
    }

    /// Continue a paused session: frame rate is assumed back at the camera
    /// maximum and the last bitrate is sent to the transport again.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.session.as_mut() else {
            tracing::warn!("Conditioner resume without active session");
            return;
        };

        session.state.reset_fps();
        let bitrate = session.state.current_bitrate();
        self.transport.change_bitrate(bitrate);

        inner.cancel_ticker();
        self.spawn_ticker(&mut inner);
        tracing::info!(bitrate, "Conditioner resumed");
    }

    /// Register a connection. Its current loss counters become the baseline.
    /// Returns false if it was already registered or no session is active.
    pub async fn add_connection(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.session.as_mut() else {
            tracing::warn!(connection = %id, "Connection added without active session");
            return false;
        };
        let now = session.now();
        let added = session
            .state
            .add_connection(id, now, self.transport.as_ref());
        if added {
            tracing::info!(connection = %id, "Connection registered");
        }
        added
    }

    /// Returns false if the connection was not registered
    pub async fn remove_connection(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.session.as_mut() else {
            return false;
        };
        let removed = session.state.remove_connection(id);
        if removed {
            tracing::info!(connection = %id, "Connection unregistered");
        }
        removed
    }

    /// Current session view, `None` when no session is active
    pub async fn snapshot(&self) -> Option<ConditionerSnapshot> {
        let inner = self.inner.lock().await;
        let running = inner.is_running();
        inner
            .session
            .as_ref()
            .map(|session| session.state.snapshot(running))
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_running()
    }

    fn spawn_ticker(&self, inner: &mut Inner) {
        let handle = tokio::spawn(run_ticker(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.transport),
            inner.epoch,
            self.config.tick_delay(),
            self.config.tick_interval(),
        ));
        inner.ticker = Some(handle);
    }
}

impl Drop for ConditionerSupervisor {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.cancel_ticker();
        }
    }
}

/// The next tick is scheduled only after the current one completes
async fn run_ticker(
    inner: Weak<Mutex<Inner>>,
    transport: Arc<dyn Transport>,
    epoch: u64,
    delay: Duration,
    interval: Duration,
) {
    tokio::time::sleep(delay).await;
    loop {
        let Some(shared) = inner.upgrade() else {
            break;
        };
        {
            let mut guard = shared.lock().await;
            if guard.epoch != epoch {
                break;
            }
            let Some(session) = guard.session.as_mut() else {
                break;
            };
            let now = session.now();
            session.state.tick(now, transport.as_ref());
        }
        drop(shared);
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FpsRange;
    use crate::transport::ConnectionStats;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct QuietTransport {
        bitrates: StdMutex<Vec<u32>>,
        ranges: StdMutex<Vec<FpsRange>>,
    }

    impl Transport for QuietTransport {
        fn connection_stats(&self, _id: ConnectionId) -> Option<ConnectionStats> {
            Some(ConnectionStats::Tcp {
                audio_frames_skipped: 0,
                video_frames_skipped: 0,
                bytes_sent: 0,
            })
        }

        fn change_bitrate(&self, bits_per_second: u32) {
            self.bitrates.lock().unwrap().push(bits_per_second);
        }

        fn change_fps_range(&self, range: FpsRange) {
            self.ranges.lock().unwrap().push(range);
        }
    }

    fn supervisor(transport: Arc<QuietTransport>) -> ConditionerSupervisor {
        let camera = CameraCapabilities::new(30.0, vec![FpsRange::new(15, 30), FpsRange::new(30, 30)]);
        ConditionerSupervisor::new(ConditionerConfig::default(), camera, transport).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sets_initial_bitrate() {
        let transport = Arc::new(QuietTransport::default());
        let supervisor = supervisor(Arc::clone(&transport));

        supervisor.start(3_000_000).await.unwrap();
        let snapshot = supervisor.snapshot().await.unwrap();
        assert_eq!(snapshot.bitrate, 1_000_000);
        assert_eq!(snapshot.ladder_index, 2);
        assert!(snapshot.running);
        assert_eq!(*transport.bitrates.lock().unwrap(), vec![1_000_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_bitrate_rejected() {
        let supervisor = supervisor(Arc::new(QuietTransport::default()));
        assert!(matches!(
            supervisor.start(0).await,
            Err(ConditionerError::InvalidBitrate(0))
        ));
        assert!(supervisor.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_connection_twice_tracks_one() {
        let supervisor = supervisor(Arc::new(QuietTransport::default()));
        supervisor.start(3_000_000).await.unwrap();

        assert!(supervisor.add_connection(ConnectionId(4)).await);
        assert!(!supervisor.add_connection(ConnectionId(4)).await);
        assert_eq!(supervisor.snapshot().await.unwrap().connections.len(), 1);

        assert!(supervisor.remove_connection(ConnectionId(4)).await);
        assert!(supervisor.snapshot().await.unwrap().connections.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_before_start_is_rejected() {
        let supervisor = supervisor(Arc::new(QuietTransport::default()));
        assert!(!supervisor.add_connection(ConnectionId(1)).await);
        assert!(!supervisor.remove_connection(ConnectionId(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_connections() {
        let supervisor = supervisor(Arc::new(QuietTransport::default()));
        supervisor.stop().await;
        supervisor.start(3_000_000).await.unwrap();
        supervisor.stop().await;
        assert!(!supervisor.is_running().await);
        assert!(supervisor.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_ticks_and_keeps_state() {
        let transport = Arc::new(QuietTransport::default());
        let supervisor = supervisor(Arc::clone(&transport));
        supervisor.start(3_000_000).await.unwrap();
        supervisor.add_connection(ConnectionId(1)).await;

        tokio::time::sleep(Duration::from_millis(4_100)).await;
        let before = supervisor.snapshot().await.unwrap();
        assert_eq!(before.loss_samples, 3);

        supervisor.pause().await;
        assert!(!supervisor.is_running().await);
        tokio::time::sleep(Duration::from_secs(20)).await;
        let paused = supervisor.snapshot().await.unwrap();
        assert_eq!(paused.loss_samples, before.loss_samples);
        assert_eq!(paused.connections.len(), 1);

        supervisor.resume().await;
        assert_eq!(
            transport.bitrates.lock().unwrap().last(),
            Some(&paused.bitrate)
        );
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let resumed = supervisor.snapshot().await.unwrap();
        assert_eq!(resumed.loss_samples, before.loss_samples + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_without_session_is_noop() {
        let transport = Arc::new(QuietTransport::default());
        let supervisor = supervisor(Arc::clone(&transport));
        supervisor.resume().await;
        assert!(!supervisor.is_running().await);
        assert!(transport.bitrates.lock().unwrap().is_empty());
    }
}
