//! Streaming pump
//!
//! Reads chunks from a media source, splits them into NAL units, and writes
//! one unit per tick to the track sink. Loops the source on exhaustion and
//! stops itself after too many consecutive send failures.

use crate::media::{MediaSource, TrackSink};
use crate::nal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A send error streak this long terminates the pump
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Handle to a running pump task
///
/// Stopping is signal-then-join: the cancel flag is observed at unit
/// granularity, so `stop` returns within roughly one tick.
pub struct PumpHandle {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl PumpHandle {
    /// Spawn the pump over a sink and source
    pub fn spawn(peer_id: &str, sink: Arc<dyn TrackSink>, source: Box<dyn MediaSource>) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let peer = peer_id.to_string();

        let join = tokio::spawn(async move {
            run(&peer, sink, source, flag).await;
        });

        Self { cancel, join }
    }

    /// Whether the task has already finished on its own
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal cancellation and wait for the task to exit
    pub async fn stop(self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.join.await;
    }
}

async fn run(
    peer_id: &str,
    sink: Arc<dyn TrackSink>,
    mut source: Box<dyn MediaSource>,
    cancel: Arc<AtomicBool>,
) {
    let tick = source.cadence();
    info!(peer_id, source = %source.describe(), tick_ms = tick.as_millis() as u64, "pump started");

    let mut failures: u32 = 0;
    let mut units_sent: u64 = 0;
    let mut just_reset = false;

    'outer: loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let chunk = match source.next_chunk() {
            Ok(Some(chunk)) => {
                just_reset = false;
                chunk
            }
            Ok(None) => {
                // One full pass done; rewind. An empty source right after a
                // rewind would spin, so bail instead.
                if just_reset {
                    warn!(peer_id, "media source yielded nothing after rewind, stopping pump");
                    break;
                }
                if let Err(e) = source.reset() {
                    warn!(peer_id, error = %e, "media source rewind failed, stopping pump");
                    break;
                }
                debug!(peer_id, units_sent, "media source looped");
                just_reset = true;
                continue;
            }
            Err(e) => {
                warn!(peer_id, error = %e, "media source read failed, stopping pump");
                break;
            }
        };

        for unit in nal::extract(&chunk) {
            if cancel.load(Ordering::SeqCst) {
                break 'outer;
            }

            if unit.is_keyframe() {
                debug!(peer_id, units_sent, len = unit.len(), "keyframe unit");
            }

            match sink.send(unit.into_bytes(), tick).await {
                Ok(()) => {
                    failures = 0;
                    units_sent += 1;
                }
                Err(e) => {
                    failures += 1;
                    warn!(peer_id, failures, error = %e, "track send failed");
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        warn!(peer_id, units_sent, "too many consecutive send failures, stopping pump");
                        break 'outer;
                    }
                }
            }

            tokio::time::sleep(tick).await;
        }
    }

    info!(peer_id, units_sent, "pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::Result;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSink {
        sent: AtomicUsize,
        fail_from: Option<usize>,
    }

    #[async_trait]
    impl TrackSink for CountingSink {
        async fn send(&self, _unit: Bytes, _duration: Duration) -> Result<()> {
            let n = self.sent.fetch_add(1, Ordering::SeqCst);
            if let Some(from) = self.fail_from {
                if n >= from {
                    return Err(Error::StreamSend("sink down".to_string()));
                }
            }
            Ok(())
        }
    }

    struct ChunkSource {
        chunks: Vec<Bytes>,
        next: usize,
        resets: Arc<AtomicUsize>,
    }

    impl MediaSource for ChunkSource {
        fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            if self.next < self.chunks.len() {
                let c = self.chunks[self.next].clone();
                self.next += 1;
                Ok(Some(c))
            } else {
                Ok(None)
            }
        }

        fn reset(&mut self) -> Result<()> {
            self.next = 0;
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn cadence(&self) -> Duration {
            Duration::from_millis(1)
        }

        fn describe(&self) -> String {
            "test chunks".to_string()
        }
    }

    fn annex_b_two_units() -> Bytes {
        Bytes::from_static(&[0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x68])
    }

    #[tokio::test]
    async fn test_pump_loops_source_on_exhaustion() {
        let resets = Arc::new(AtomicUsize::new(0));
        let source = Box::new(ChunkSource {
            chunks: vec![annex_b_two_units()],
            next: 0,
            resets: resets.clone(),
        });
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            fail_from: None,
        });

        let handle = PumpHandle::spawn("p1", sink.clone(), source);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        assert!(resets.load(Ordering::SeqCst) >= 1);
        assert!(sink.sent.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test]
    async fn test_pump_stops_after_consecutive_failures() {
        let resets = Arc::new(AtomicUsize::new(0));
        let source = Box::new(ChunkSource {
            chunks: vec![annex_b_two_units()],
            next: 0,
            resets,
        });
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            fail_from: Some(0),
        });

        let handle = PumpHandle::spawn("p1", sink.clone(), source);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(handle.is_finished());
        assert_eq!(
            sink.sent.load(Ordering::SeqCst),
            MAX_CONSECUTIVE_FAILURES as usize
        );
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_pump_cancellation_is_prompt() {
        let resets = Arc::new(AtomicUsize::new(0));
        let source = Box::new(ChunkSource {
            chunks: vec![annex_b_two_units()],
            next: 0,
            resets,
        });
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            fail_from: None,
        });

        let handle = PumpHandle::spawn("p1", sink, source);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let start = std::time::Instant::now();
        handle.stop().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pump_bails_on_empty_source() {
        let resets = Arc::new(AtomicUsize::new(0));
        let source = Box::new(ChunkSource {
            chunks: vec![],
            next: 0,
            resets: resets.clone(),
        });
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            fail_from: None,
        });

        let handle = PumpHandle::spawn("p1", sink, source);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(handle.is_finished());
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        handle.stop().await;
    }
}
