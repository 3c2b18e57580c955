// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The batching log shipper.
//!
//! Producers push lines through a cheap [`LogHandle`]; a single
//! background transmitter batches them and ships over whichever sink
//! the version probe selected. Lines are delivered in submission order.
//! [`LogShipper::close`] drains everything still queued before the
//! worker exits, so a crashing caller can flush its last words.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::probe::{probe, ProtocolVersion};
use super::v1::V1Sink;
use super::v2::V2Sink;
use super::{LogLine, LogSink};
use crate::config::ControlPlaneConfig;
use crate::error::UplinkError;
use crate::retry;

/// Ship at this many buffered lines even between ticks.
const MAX_BATCH_LINES: usize = 100;
/// How often partially filled batches are flushed.
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);
/// How long [`LogShipper::close`] waits for the final drain.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Stats {
    shipped: AtomicUsize,
    dropped: AtomicUsize,
}

/// Final delivery tally returned by [`LogShipper::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub shipped: usize,
    pub dropped: usize,
}

/// Cheap, cloneable producer handle. Pushing a line never blocks and
/// never fails; lines submitted after shutdown are counted as dropped.
#[derive(Clone)]
pub struct LogHandle {
    tx: mpsc::UnboundedSender<LogLine>,
    stats: Arc<Stats>,
}

impl LogHandle {
    pub fn log(&self, level: super::LogLevel, output: impl Into<String>) {
        self.push(LogLine::new(level, output));
    }

    pub fn push(&self, line: LogLine) {
        if self.tx.send(line).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Owner of the background transmitter.
pub struct LogShipper {
    handle: LogHandle,
    worker: JoinHandle<()>,
    cancel: CancellationToken,
    stats: Arc<Stats>,
    error: Arc<Mutex<Option<UplinkError>>>,
    protocol: ProtocolVersion,
}

async fn connect_once(
    http: &reqwest::Client,
    control_plane: &ControlPlaneConfig,
) -> Result<(ProtocolVersion, Box<dyn LogSink>), UplinkError> {
    let protocol = probe(http, &control_plane.url).await?;
    let sink: Box<dyn LogSink> = match protocol {
        ProtocolVersion::V1 => Box::new(V1Sink::new(http.clone(), control_plane)),
        ProtocolVersion::V2 => Box::new(V2Sink::connect(control_plane).await?),
    };
    Ok((protocol, sink))
}

impl LogShipper {
    /// Probe the control plane, open the right sink and start the
    /// transmitter. Retries with backoff while the control plane says
    /// the session is not ready; `cancel` aborts both the retry loop
    /// and, later, the running transmitter.
    pub async fn connect(
        control_plane: &ControlPlaneConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, UplinkError> {
        let http = reqwest::Client::new();
        let (protocol, sink) =
            retry::retry_not_ready(cancel, || connect_once(&http, control_plane)).await?;
        tracing::info!(protocol = ?protocol, "log shipper connected");
        Ok(Self::start(sink, protocol, cancel.child_token()))
    }

    pub(crate) fn start(
        sink: Box<dyn LogSink>,
        protocol: ProtocolVersion,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Stats::default());
        let error = Arc::new(Mutex::new(None));
        let worker = tokio::spawn(transmit_loop(
            sink,
            rx,
            cancel.clone(),
            Arc::clone(&stats),
            Arc::clone(&error),
        ));
        Self {
            handle: LogHandle {
                tx,
                stats: Arc::clone(&stats),
            },
            worker,
            cancel,
            stats,
            error,
            protocol,
        }
    }

    /// Producer handle; clone freely.
    pub fn handle(&self) -> LogHandle {
        self.handle.clone()
    }

    /// Convenience for callers that keep the shipper itself around.
    pub fn log(&self, level: super::LogLevel, output: impl Into<String>) {
        self.handle.log(level, output);
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Stop accepting lines, drain everything already queued, tear the
    /// sink down and report the tally.
    ///
    /// Returns the first permanent sink error if the stream broke (its
    /// message carries the final shipped/dropped tally), or
    /// [`UplinkError::Cancelled`] if the drain misses its deadline.
    pub async fn close(mut self) -> Result<DrainReport, UplinkError> {
        self.cancel.cancel();
        match tokio::time::timeout(DRAIN_DEADLINE, &mut self.worker).await {
            Ok(_) => {
                let report = DrainReport {
                    shipped: self.stats.shipped.load(Ordering::Relaxed),
                    dropped: self.stats.dropped.load(Ordering::Relaxed),
                };
                let stored = self
                    .error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(e) = stored {
                    tracing::warn!(
                        shipped = report.shipped,
                        dropped = report.dropped,
                        error = %e,
                        "log session ended with a broken sink"
                    );
                    let detail = match &e {
                        UplinkError::Protocol(msg) => msg.clone(),
                        other => other.to_string(),
                    };
                    return Err(UplinkError::Protocol(format!(
                        "{detail} ({} lines shipped, {} dropped)",
                        report.shipped, report.dropped
                    )));
                }
                Ok(report)
            }
            Err(_) => {
                tracing::warn!("log drain missed its deadline, aborting transmitter");
                self.worker.abort();
                Err(UplinkError::Cancelled)
            }
        }
    }
}

impl Drop for LogShipper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn transmit_loop(
    mut sink: Box<dyn LogSink>,
    mut rx: mpsc::UnboundedReceiver<LogLine>,
    cancel: CancellationToken,
    stats: Arc<Stats>,
    error: Arc<Mutex<Option<UplinkError>>>,
) {
    let mut pending: Vec<LogLine> = Vec::new();
    let mut tick = tokio::time::interval(FLUSH_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => {
                    pending.push(line);
                    if pending.len() >= MAX_BATCH_LINES {
                        flush(&mut sink, &mut pending, &stats, &error).await;
                    }
                }
                None => break,
            },
            _ = tick.tick() => {
                flush(&mut sink, &mut pending, &stats, &error).await;
            }
        }
    }

    // Drain: no new lines, but everything already queued still ships.
    rx.close();
    while let Ok(line) = rx.try_recv() {
        pending.push(line);
        if pending.len() >= MAX_BATCH_LINES {
            flush(&mut sink, &mut pending, &stats, &error).await;
        }
    }
    flush(&mut sink, &mut pending, &stats, &error).await;

    if let Err(e) = sink.shutdown().await {
        tracing::warn!(error = %e, "log sink shutdown failed");
    }
}

async fn flush(
    sink: &mut Box<dyn LogSink>,
    pending: &mut Vec<LogLine>,
    stats: &Stats,
    error: &Mutex<Option<UplinkError>>,
) {
    if pending.is_empty() {
        return;
    }
    match sink.ship(pending).await {
        Ok(()) => {
            stats.shipped.fetch_add(pending.len(), Ordering::Relaxed);
        }
        Err(e) => {
            stats.dropped.fetch_add(pending.len(), Ordering::Relaxed);
            tracing::warn!(lines = pending.len(), error = %e, "dropping log batch");
            if sink.is_broken() {
                let mut slot = error.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(e);
                }
            }
        }
    }
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::LogLevel;
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeSink {
        lines: Arc<Mutex<Vec<String>>>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LogSink for FakeSink {
        async fn ship(&mut self, batch: &[LogLine]) -> Result<(), UplinkError> {
            self.batch_sizes.lock().unwrap().push(batch.len());
            self.lines
                .lock()
                .unwrap()
                .extend(batch.iter().map(|l| l.output.clone()));
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), UplinkError> {
            self.shutdowns.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl LogSink for BrokenSink {
        async fn ship(&mut self, _batch: &[LogLine]) -> Result<(), UplinkError> {
            Err(UplinkError::Protocol("stream reset".into()))
        }

        fn is_broken(&self) -> bool {
            true
        }
    }

    fn shipper_with(sink: Box<dyn LogSink>) -> LogShipper {
        LogShipper::start(sink, ProtocolVersion::V1, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_close_drains_everything_queued() {
        let sink = FakeSink::default();
        let lines = Arc::clone(&sink.lines);
        let shutdowns = Arc::clone(&sink.shutdowns);
        let shipper = shipper_with(Box::new(sink));

        let handle = shipper.handle();
        for i in 0..10 {
            handle.log(LogLevel::Info, format!("line {i}"));
        }
        let report = shipper.close().await.unwrap();

        assert_eq!(report.shipped, 10);
        assert_eq!(report.dropped, 0);
        assert_eq!(lines.lock().unwrap().len(), 10);
        assert_eq!(shutdowns.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_large_backlog_ships_in_bounded_batches() {
        let sink = FakeSink::default();
        let batch_sizes = Arc::clone(&sink.batch_sizes);
        let lines = Arc::clone(&sink.lines);
        let shipper = shipper_with(Box::new(sink));

        let handle = shipper.handle();
        for i in 0..250 {
            handle.log(LogLevel::Info, format!("line {i}"));
        }
        let report = shipper.close().await.unwrap();

        assert_eq!(report.shipped, 250);
        assert!(batch_sizes
            .lock()
            .unwrap()
            .iter()
            .all(|&n| n <= MAX_BATCH_LINES));
        assert_eq!(lines.lock().unwrap().len(), 250);
    }

    #[tokio::test]
    async fn test_per_producer_order_is_preserved() {
        let sink = FakeSink::default();
        let lines = Arc::clone(&sink.lines);
        let shipper = shipper_with(Box::new(sink));

        let mut producers = Vec::new();
        for p in 0..4 {
            let handle = shipper.handle();
            producers.push(tokio::spawn(async move {
                for i in 0..25 {
                    handle.log(LogLevel::Info, format!("p{p} {i}"));
                }
            }));
        }
        for task in producers {
            task.await.unwrap();
        }
        shipper.close().await.unwrap();

        let shipped = lines.lock().unwrap().clone();
        assert_eq!(shipped.len(), 100);
        for p in 0..4 {
            let seen: Vec<_> = shipped
                .iter()
                .filter(|l| l.starts_with(&format!("p{p} ")))
                .collect();
            let expected: Vec<String> = (0..25).map(|i| format!("p{p} {i}")).collect();
            assert_eq!(seen.len(), 25);
            for (got, want) in seen.iter().zip(&expected) {
                assert_eq!(**got, *want);
            }
        }
    }

    #[tokio::test]
    async fn test_broken_sink_surfaces_at_close() {
        let shipper = shipper_with(Box::new(BrokenSink));
        let handle = shipper.handle();
        handle.log(LogLevel::Error, "doomed");

        let err = shipper.close().await.unwrap_err();
        assert!(matches!(err, UplinkError::Protocol(_)));
        // The teardown contract still reports the tally on failure.
        let msg = err.to_string();
        assert!(msg.contains("0 lines shipped"), "got {msg}");
        assert!(msg.contains("1 dropped"), "got {msg}");
    }

    #[tokio::test]
    async fn test_lines_after_close_are_counted_dropped() {
        let sink = FakeSink::default();
        let shipper = shipper_with(Box::new(sink));
        let handle = shipper.handle();
        handle.log(LogLevel::Info, "before");

        let report = shipper.close().await.unwrap();
        assert_eq!(report.shipped, 1);

        // The worker is gone; this line has nowhere to go.
        handle.log(LogLevel::Info, "after");
    }

    #[tokio::test]
    async fn test_repeated_cancellation_is_idempotent() {
        let sink = FakeSink::default();
        let cancel = CancellationToken::new();
        let shipper = LogShipper::start(Box::new(sink), ProtocolVersion::V2, cancel.clone());
        assert_eq!(shipper.protocol(), ProtocolVersion::V2);

        cancel.cancel();
        cancel.cancel();
        let report = shipper.close().await.unwrap();
        assert_eq!(report.dropped, 0);
    }
}
