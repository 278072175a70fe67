//! Server metrics for observability
//!
//! Provides runtime counters for monitoring turns, the assistant process
//! and WebSocket fan-out.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,
    /// Text frames received from clients
    pub messages_received: AtomicU64,

    // Turn metrics
    pub turns_started: AtomicU64,
    pub turns_completed: AtomicU64,
    pub turns_failed: AtomicU64,
    /// Turns whose assistant process was killed for running too long
    pub process_timeouts: AtomicU64,

    // Broadcast metrics
    /// Individual event deliveries to subscribers
    pub events_delivered: AtomicU64,
    /// Subscribers dropped after a failed send
    pub subscribers_pruned: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    // Turn tracking
    pub fn turn_started(&self) {
        self.turns_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_completed(&self) {
        self.turns_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_failed(&self) {
        self.turns_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn process_timeout(&self) {
        self.process_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    // Broadcast tracking
    pub fn record_broadcast(&self, delivered: usize, pruned: usize) {
        self.events_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.subscribers_pruned
            .fetch_add(pruned as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
            },
            turns: TurnMetrics {
                started: self.turns_started.load(Ordering::Relaxed),
                completed: self.turns_completed.load(Ordering::Relaxed),
                failed: self.turns_failed.load(Ordering::Relaxed),
                timeouts: self.process_timeouts.load(Ordering::Relaxed),
            },
            broadcast: BroadcastMetrics {
                delivered: self.events_delivered.load(Ordering::Relaxed),
                pruned: self.subscribers_pruned.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub turns: TurnMetrics,
    pub broadcast: BroadcastMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub messages_received: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMetrics {
    pub delivered: u64,
    pub pruned: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub conversations: u64,
    pub connections: u64,
    /// Conversations with at least one live viewer
    pub channels: u64,
    /// Viewers currently registered across all conversations
    pub subscribers: u64,
    pub uptime_secs: u64,
}
