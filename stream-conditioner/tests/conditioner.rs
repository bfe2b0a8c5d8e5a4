use std::sync::{Arc, Mutex};
use std::time::Duration;

use stream_conditioner::{
    CameraCapabilities, ConditionerConfig, ConditionerSupervisor, ConnectionId, ConnectionStats,
    FpsRange, Transport,
};

/// Records every call; each stats query reports `loss_per_query` more
/// skipped video frames than the last.
#[derive(Default)]
struct RecordingTransport {
    loss_per_query: u64,
    skipped: Mutex<u64>,
    bitrates: Mutex<Vec<u32>>,
    ranges: Mutex<Vec<FpsRange>>,
}

impl RecordingTransport {
    fn lossy(loss_per_query: u64) -> Self {
        Self {
            loss_per_query,
            ..Default::default()
        }
    }

    fn bitrates(&self) -> Vec<u32> {
        self.bitrates.lock().unwrap().clone()
    }

    fn ranges(&self) -> Vec<FpsRange> {
        self.ranges.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn connection_stats(&self, _id: ConnectionId) -> Option<ConnectionStats> {
        let mut skipped = self.skipped.lock().unwrap();
        *skipped += self.loss_per_query;
        Some(ConnectionStats::Tcp {
            audio_frames_skipped: 0,
            video_frames_skipped: *skipped,
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

fn camera() -> CameraCapabilities {
    CameraCapabilities::new(30.0, vec![FpsRange::new(15, 30), FpsRange::new(30, 30)])
}

fn supervisor(transport: &Arc<RecordingTransport>) -> ConditionerSupervisor {
    ConditionerSupervisor::new(ConditionerConfig::default(), camera(), transport.clone()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_start_applies_initial_rung() {
    let transport = Arc::new(RecordingTransport::default());
    let supervisor = supervisor(&transport);

    supervisor.start(3_000_000).await.unwrap();

    assert_eq!(transport.bitrates(), vec![1_000_000]);
    let snapshot = supervisor.snapshot().await.unwrap();
    assert_eq!(snapshot.full_bitrate, 3_000_000);
    assert_eq!(snapshot.fps_range, FpsRange::new(30, 30));
    assert_eq!(snapshot.bitrate_changes, 1);
    supervisor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sustained_loss_walks_to_lowest_rung() {
    let transport = Arc::new(RecordingTransport::lossy(10));
    let supervisor = supervisor(&transport);
    supervisor.start(3_000_000).await.unwrap();
    assert!(supervisor.add_connection(ConnectionId(7)).await);

    tokio::time::sleep(Duration::from_millis(10_100)).await;

    let snapshot = supervisor.snapshot().await.unwrap();
    assert_eq!(snapshot.ladder_index, 0);
    assert_eq!(snapshot.bitrate, 600_000);
    assert_eq!(transport.bitrates(), vec![1_000_000, 750_000, 600_000]);
    assert_eq!(transport.ranges(), vec![FpsRange::new(15, 30)]);
    assert_eq!(snapshot.fps_range, FpsRange::new(15, 30));
}

#[tokio::test(start_paused = true)]
async fn test_stop_restores_full_frame_rate() {
    let transport = Arc::new(RecordingTransport::lossy(10));
    let supervisor = supervisor(&transport);
    supervisor.start(3_000_000).await.unwrap();
    supervisor.add_connection(ConnectionId(1)).await;

    tokio::time::sleep(Duration::from_millis(4_100)).await;
    supervisor.stop().await;

    assert_eq!(
        transport.ranges(),
        vec![FpsRange::new(15, 30), FpsRange::new(30, 30)]
    );
    assert!(supervisor.snapshot().await.is_none());

    // No further ticks after stop
    let calls = transport.bitrates().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.bitrates().len(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_one_loss_sample_per_tick() {
    let transport = Arc::new(RecordingTransport::default());
    let supervisor = supervisor(&transport);
    supervisor.start(3_000_000).await.unwrap();
    supervisor.add_connection(ConnectionId(1)).await;
    assert!(!supervisor.add_connection(ConnectionId(1)).await);

    tokio::time::sleep(Duration::from_millis(8_100)).await;

    let snapshot = supervisor.snapshot().await.unwrap();
    // Seed sample plus ticks at 2, 4, 6 and 8 seconds
    assert_eq!(snapshot.loss_samples, 5);
    assert_eq!(snapshot.connections.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_without_connections_change_nothing() {
    let transport = Arc::new(RecordingTransport::lossy(10));
    let supervisor = supervisor(&transport);
    supervisor.start(3_000_000).await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;

    let snapshot = supervisor.snapshot().await.unwrap();
    assert_eq!(snapshot.loss_samples, 1);
    assert_eq!(transport.bitrates(), vec![1_000_000]);
    supervisor.stop().await;
    assert!(transport.ranges().is_empty());
}
