//! Track discovery.
//!
//! Drives the vehicle around one lap at a fixed speed and turns the stream of
//! localization readings into a lap description: one entry per distinct
//! reading, in driving order, closed by a canonical pre-finish and
//! start/finish pair.
//!
//! The scan owns its telemetry queue for the whole run and suspends on it, so
//! the only state shared with the session is the queue itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use super::protocol::{Command, TelemetryEvent};
use super::session::VehicleLink;
use super::track::{TrackLogEntry, TrackPieceKind};
use crate::config::ScanConfig;
use crate::error::{AbortReason, Error, Result};

/// Stops a running scan from another task.
///
/// Cancelling while no scan runs has no effect on later scans.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(());
    }
}

/// Marks a scan as running until dropped.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(Error::ScanAlreadyInProgress);
        }
        Ok(Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Discovers the layout of the loop a vehicle is placed on.
pub struct TrackScanner<L> {
    link: Arc<L>,
    config: ScanConfig,
    scanning: AtomicBool,
    cancel: Arc<watch::Sender<()>>,
    track_log: Mutex<Vec<TrackLogEntry>>,
}

impl<L: VehicleLink> TrackScanner<L> {
    pub fn new(link: Arc<L>, config: ScanConfig) -> Self {
        let (cancel, _) = watch::channel(());
        Self {
            link,
            config,
            scanning: AtomicBool::new(false),
            cancel: Arc::new(cancel),
            track_log: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// The lap stored by the last successful scan.
    pub async fn track_log(&self) -> Vec<TrackLogEntry> {
        self.track_log.lock().await.clone()
    }

    /// Drive one lap and return its topology.
    ///
    /// The session must be active. A failed scan leaves the stored lap
    /// untouched.
    pub async fn scan_track(&self) -> Result<Vec<TrackLogEntry>> {
        let _guard = ScanGuard::acquire(&self.scanning)?;
        let mut events = self.link.subscribe(self.config.event_queue_capacity).await?;
        let mut cancel = self.cancel.subscribe();

        info!(speed = self.config.scan_speed, "starting track scan");
        self.link
            .send_command(Command::SetSpeed {
                speed: self.config.scan_speed,
                accel: self.config.scan_accel,
            })
            .await
            .map_err(|_| Error::ScanAborted(AbortReason::LinkLost))?;

        let lap = match self.capture_lap(&mut events, &mut cancel).await {
            Ok(lap) => lap,
            Err(e) => {
                warn!("track scan failed: {}", e);
                if !matches!(e, Error::ScanAborted(AbortReason::LinkLost)) {
                    let _ = self.link.send_command(self.stop_command()).await;
                }
                return Err(e);
            }
        };

        let track_log = assemble_lap(lap);
        info!(pieces = track_log.len(), "track scan complete");
        *self.track_log.lock().await = track_log.clone();
        Ok(track_log)
    }

    fn stop_command(&self) -> Command {
        Command::SetSpeed {
            speed: 0,
            accel: self.config.stop_accel,
        }
    }

    /// Consume telemetry until the lap is complete.
    ///
    /// The first start/finish crossing marks lap zero; the lap ends at the
    /// following pre-finish line. The vehicle is stopped when the lap ends or
    /// the crossing limit is hit.
    async fn capture_lap(
        &self,
        events: &mut mpsc::Receiver<TelemetryEvent>,
        cancel: &mut watch::Receiver<()>,
    ) -> Result<Vec<TrackLogEntry>> {
        let timeout = self.config.progress_timeout();
        let mut deadline = Instant::now() + timeout;

        let mut raw_log: Vec<TrackLogEntry> = Vec::new();
        let mut lap = Vec::new();
        let mut last_position: Option<u8> = None;
        let mut start_finish_count = 0u32;
        let mut reached_pre_finish = false;

        while start_finish_count < self.config.max_start_finish_crossings {
            let event = tokio::select! {
                biased;
                _ = cancel.changed() => return Err(Error::ScanAborted(AbortReason::Cancelled)),
                event = events.recv() => event.ok_or(Error::ScanAborted(AbortReason::LinkLost))?,
                _ = time::sleep_until(deadline) => return Err(Error::ScanTimedOut(timeout)),
            };

            let TelemetryEvent::PositionUpdate(update) = event else {
                continue;
            };
            let entry = TrackLogEntry::from(&update);

            // Same marker again is the same physical read delivered twice.
            if last_position == Some(entry.position) {
                continue;
            }
            last_position = Some(entry.position);
            deadline = Instant::now() + timeout;
            trace!(%entry, "reading");

            raw_log.push(entry);
            if start_finish_count == 1 {
                lap.push(entry);
            }

            if entry.kind == TrackPieceKind::StartFinish {
                start_finish_count += 1;
                debug!(start_finish_count, discarded = raw_log.len() - 1, "crossed start/finish");
                if start_finish_count == 1 {
                    raw_log.clear();
                }
            }

            if start_finish_count == 1 && entry.kind == TrackPieceKind::PreFinishLine {
                debug!(readings = raw_log.len(), "reached pre-finish line, stopping");
                reached_pre_finish = true;
                break;
            }
        }

        if !reached_pre_finish {
            warn!(start_finish_count, "pre-finish marker missed, stopping at crossing limit");
        }
        self.link
            .send_command(self.stop_command())
            .await
            .map_err(|_| Error::ScanAborted(AbortReason::LinkLost))?;

        Ok(lap)
    }
}

/// Close a captured lap: drop the boundary readings, append the canonical
/// finish pair in the lap's direction and remove duplicate readings.
pub fn assemble_lap(mut lap: Vec<TrackLogEntry>) -> Vec<TrackLogEntry> {
    let finish_clockwise = lap.last().map(|entry| entry.clockwise).unwrap_or(false);

    lap.retain(|entry| !entry.kind.is_lap_boundary());
    lap.push(TrackLogEntry::new(TrackPieceKind::PreFinishLine, finish_clockwise, 0));
    lap.push(TrackLogEntry::new(TrackPieceKind::StartFinish, finish_clockwise, 0));

    filter_duplicates(&lap)
}

/// Collapse runs of same-kind readings whose markers go backwards.
///
/// Within a run, a reading with a marker at or past the last kept one is
/// genuine progress and is kept. A reading with a smaller marker replaces
/// every kept entry of the run whose marker is above it. A kind that comes
/// back after a different kind starts a new run.
pub fn filter_duplicates(readings: &[TrackLogEntry]) -> Vec<TrackLogEntry> {
    let mut filtered: Vec<TrackLogEntry> = Vec::with_capacity(readings.len());

    for &reading in readings {
        while let Some(last) = filtered.last() {
            if last.kind != reading.kind || last.position <= reading.position {
                break;
            }
            filtered.pop();
        }
        filtered.push(reading);
    }

    filtered
}
