//! Real-time driver.
//!
//! Runs a [`Cluster`] on a tokio task against the wall clock: the task
//! sleeps until the next deadline (or the next audio block), catches the
//! virtual timeline up to real time, and pushes the rendered audio into an
//! [`AudioSink`]. Control inputs travel in on a `watch` channel, snapshots
//! travel out on another, and one-off actions go through an `mpsc` queue.
//!
//! Sample assets are decoded on the blocking pool so the clock starts
//! immediately; the engine's load timeout covers slow or failed loads.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::dsp::assets::SampleBank;
use crate::dsp::engine::EngineStats;
use crate::dsp::output::AudioSink;
use crate::error::ClusterError;
use crate::session::{Cluster, ClusterSnapshot};
use crate::vehicle::ControlInputs;

/// Longest gap between rendered audio blocks.
pub const BLOCK_MS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Horn,
    UserInteraction,
    DashboardReady,
    Shutdown,
}

/// What woke the driver.
enum Wake {
    Deadline,
    Controls,
    Command(Command),
    Samples(SampleBank),
    Disconnected,
}

/// Control surface of a running cluster. Dropping it stops the task.
pub struct ClusterHandle {
    controls: watch::Sender<ControlInputs>,
    snapshots: watch::Receiver<ClusterSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<EngineStats>,
}

impl ClusterHandle {
    pub fn set_controls(&self, controls: ControlInputs) {
        self.controls.send_replace(controls);
    }

    pub fn horn(&self) {
        self.send(Command::Horn);
    }

    pub fn user_interaction(&self) {
        self.send(Command::UserInteraction);
    }

    pub fn dashboard_ready(&self) {
        self.send(Command::DashboardReady);
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ClusterSnapshot {
        *self.snapshots.borrow()
    }

    /// A receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ClusterSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the driver and wait for it, returning what the engine played.
    pub async fn shutdown(self) -> EngineStats {
        self.send(Command::Shutdown);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Cluster task ended abnormally: {e}");
                EngineStats::default()
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "Cluster task already stopped");
        }
    }
}

/// Start a cluster on the current tokio runtime.
pub fn spawn<S: AudioSink + 'static>(config: ClusterConfig, sink: S) -> Result<ClusterHandle, ClusterError> {
    let assets = config.assets.clone();
    let cluster = Cluster::without_samples(config)?;

    let (controls_tx, controls_rx) = watch::channel(cluster.controls());
    let (snapshots_tx, snapshots_rx) = watch::channel(cluster.snapshot());
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let loader = tokio::task::spawn_blocking(move || SampleBank::load(&assets));

    let task = tokio::spawn(drive(cluster, sink, controls_rx, snapshots_tx, commands_rx, loader));
    Ok(ClusterHandle {
        controls: controls_tx,
        snapshots: snapshots_rx,
        commands: commands_tx,
        task,
    })
}

async fn drive<S: AudioSink>(
    mut cluster: Cluster,
    mut sink: S,
    mut controls: watch::Receiver<ControlInputs>,
    snapshots: watch::Sender<ClusterSnapshot>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut loader: JoinHandle<SampleBank>,
) -> EngineStats {
    info!("Cluster driver started");
    let start = Instant::now();
    let mut loading = true;
    let mut block = Vec::new();

    loop {
        let now = cluster.now_ms();
        let wake_at = cluster
            .next_deadline()
            .map_or(now + BLOCK_MS, |d| d.min(now + BLOCK_MS));

        let wake = tokio::select! {
            _ = sleep_until(start + Duration::from_millis(wake_at)) => Wake::Deadline,
            changed = controls.changed() => match changed {
                Ok(()) => Wake::Controls,
                Err(_) => Wake::Disconnected,
            },
            command = commands.recv() => match command {
                Some(command) => Wake::Command(command),
                None => Wake::Disconnected,
            },
            loaded = &mut loader, if loading => {
                loading = false;
                match loaded {
                    Ok(bank) => Wake::Samples(bank),
                    Err(e) => {
                        warn!("Sample loading task failed: {e}");
                        Wake::Deadline
                    }
                }
            }
        };

        // Catch the timeline up to real time before acting.
        let elapsed = start.elapsed().as_millis() as u64;
        if elapsed > cluster.now_ms() {
            cluster.advance(elapsed - cluster.now_ms(), &mut block);
            sink.write(&block);
            block.clear();
        }

        match wake {
            Wake::Deadline => {}
            Wake::Controls => cluster.set_controls(*controls.borrow_and_update()),
            Wake::Samples(bank) => cluster.install_samples(&bank),
            Wake::Command(Command::Horn) => cluster.horn(),
            Wake::Command(Command::UserInteraction) => cluster.user_interaction(),
            Wake::Command(Command::DashboardReady) => cluster.dashboard_ready(),
            Wake::Command(Command::Shutdown) | Wake::Disconnected => break,
        }
        snapshots.send_replace(cluster.snapshot());
    }

    if loading {
        loader.abort();
    }
    let stats = cluster.stats();
    cluster.shutdown();
    snapshots.send_replace(cluster.snapshot());
    info!(?stats, "Cluster driver stopped");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::output::NullSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> ClusterConfig {
        let mut c = ClusterConfig::default();
        c.audio.sample_rate = 8000;
        c
    }

    #[derive(Clone, Default)]
    struct CountingSink(Arc<AtomicUsize>);

    impl AudioSink for CountingSink {
        fn write(&mut self, samples: &[f32]) {
            self.0.fetch_add(samples.len(), Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_moves_the_needle() {
        let handle = spawn(config(), NullSink).unwrap();
        handle.set_controls(ControlInputs {
            throttle_on: true,
            ..ControlInputs::default()
        });
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let snap = handle.snapshot();
        assert!(snap.vehicle.speed > 0.0);
        assert!(snap.controls.throttle_on);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn renders_audio_at_wall_clock_rate() {
        let sink = CountingSink::default();
        let rendered = Arc::clone(&sink.0);
        let handle = spawn(config(), sink).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.shutdown().await;
        let frames = rendered.load(Ordering::SeqCst);
        assert!((3800..=4200).contains(&frames), "rendered {frames} frames");
    }

    #[tokio::test(start_paused = true)]
    async fn horn_and_turn_signal_reach_the_engine() {
        let handle = spawn(config(), NullSink).unwrap();
        handle.horn();
        handle.set_controls(ControlInputs {
            turn_left_on: true,
            ..ControlInputs::default()
        });
        tokio::time::sleep(Duration::from_millis(1600)).await;
        let stats = handle.shutdown().await;
        assert_eq!(stats.synthesized_horns, 1);
        assert_eq!(stats.turn_clicks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_published() {
        let handle = spawn(config(), NullSink).unwrap();
        let mut rx = handle.subscribe();
        rx.changed().await.unwrap();
        assert!(rx.borrow().at_ms <= BLOCK_MS);
        handle.shutdown().await;
    }
}
