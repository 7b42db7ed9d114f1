//! Session counters.
//!
//! Every [`Connection`](crate::service::connection::Connection) owns one [`Metrics`]
//! instance. The ingestion task and the write path update it with relaxed atomics;
//! callers read it through [`Metrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Packets handed to the transport
    pub packets_sent: AtomicU64,
    /// Packets decoded from incoming batches
    pub packets_received: AtomicU64,
    /// Batches written
    pub batches_sent: AtomicU64,
    /// Batches read
    pub batches_received: AtomicU64,
    /// Frame bytes written
    pub bytes_sent: AtomicU64,
    /// Frame bytes read
    pub bytes_received: AtomicU64,
    /// Logins acknowledged by the server
    pub handshakes: AtomicU64,
    /// Resource pack chunks accepted
    pub resource_pack_chunks: AtomicU64,
    /// Resource packs fully downloaded and verified
    pub resource_packs_completed: AtomicU64,
    /// Errors that terminated the session on the remote's account
    pub protocol_errors: AtomicU64,
    /// Transport failures
    pub connection_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            handshakes: AtomicU64::new(0),
            resource_pack_chunks: AtomicU64::new(0),
            resource_packs_completed: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn batch_sent(&self, packets: u64, byte_count: u64) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.packets_sent.fetch_add(packets, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn batch_received(&self, packets: u64, byte_count: u64) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.packets_received.fetch_add(packets, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn handshake_completed(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resource_pack_chunk(&self) {
        self.resource_pack_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resource_pack_completed(&self) {
        self.resource_packs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            resource_pack_chunks: self.resource_pack_chunks.load(Ordering::Relaxed),
            resource_packs_completed: self.resource_packs_completed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_sent = snapshot.packets_sent,
            packets_received = snapshot.packets_received,
            batches_sent = snapshot.batches_sent,
            batches_received = snapshot.batches_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            handshakes = snapshot.handshakes,
            resource_pack_chunks = snapshot.resource_pack_chunks,
            resource_packs_completed = snapshot.resource_packs_completed,
            protocol_errors = snapshot.protocol_errors,
            connection_errors = snapshot.connection_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Session metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub batches_sent: u64,
    pub batches_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub handshakes: u64,
    pub resource_pack_chunks: u64,
    pub resource_packs_completed: u64,
    pub protocol_errors: u64,
    pub connection_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
