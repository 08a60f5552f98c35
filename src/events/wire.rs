//! Envelope wire format: categories and their decoded payloads.
//!
//! Every unit on the event channel is a JSON object with an outer `type`
//! discriminant. Discriminants group into four categories, each a logical
//! channel subscribers attach to independently. Payload enums are closed:
//! a discriminant outside these sets never reaches a subscriber.

use serde::{Deserialize, Serialize};

/// A logical event channel.
///
/// Multiple subscribers to the same category share one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Model server lifecycle and health (`server_*` discriminants).
    ServerState,
    /// Download lifecycle and progress (`download`, wrapping an inner set).
    DownloadProgress,
    /// Server log lines (`log`).
    Log,
    /// Model verification progress (`verification_*` discriminants).
    Verification,
}

impl Category {
    /// Maps an outer wire discriminant to its category, or `None` for an
    /// unknown discriminant.
    #[must_use]
    pub fn for_discriminant(kind: &str) -> Option<Self> {
        match kind {
            "server_started" | "server_stopped" | "server_error" | "server_snapshot"
            | "server_health_changed" => Some(Self::ServerState),
            "download" => Some(Self::DownloadProgress),
            "log" => Some(Self::Log),
            "verification_progress" | "verification_complete" => Some(Self::Verification),
            _ => None,
        }
    }
}

/// A decoded envelope payload, delivered to subscribers of its category.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Server lifecycle event.
    ServerState(ServerStateEvent),
    /// Download progress event (inner set already validated).
    DownloadProgress(DownloadEvent),
    /// Log line.
    Log(LogEvent),
    /// Verification progress event.
    Verification(VerificationEvent),
}

impl EventPayload {
    /// The category this payload belongs to.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::ServerState(_) => Category::ServerState,
            Self::DownloadProgress(_) => Category::DownloadProgress,
            Self::Log(_) => Category::Log,
            Self::Verification(_) => Category::Verification,
        }
    }
}

/// One entry in a server snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Name of the model being served.
    #[serde(rename = "modelName")]
    pub model_name: String,
    /// Port the server is listening on.
    pub port: u16,
}

/// Health status of a running server process.
///
/// Internally tagged on `status`, so the wire shape is an object like
/// `{"status":"degraded","reason":"..."}`, not a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServerHealthStatus {
    /// Server is responding to health checks.
    Healthy,

    /// Server is running but experiencing issues.
    Degraded {
        /// Human-readable reason for the degraded state.
        reason: String,
    },

    /// Server process is alive but its endpoint is unreachable.
    Unreachable {
        /// Last error message from the health check attempt.
        #[serde(rename = "lastError")]
        last_error: String,
    },

    /// Server process has died unexpectedly.
    ProcessDied,
}

/// Model server lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerStateEvent {
    /// A model server has started and is ready to accept requests.
    ServerStarted {
        /// Name of the model being served.
        #[serde(rename = "modelName")]
        model_name: String,
        /// Port the server is listening on.
        port: u16,
    },

    /// A model server has been stopped.
    ServerStopped {
        /// Name of the model that was being served.
        #[serde(rename = "modelName")]
        model_name: String,
    },

    /// A model server encountered an error.
    ServerError {
        /// Name of the model being served.
        #[serde(rename = "modelName")]
        model_name: String,
        /// Error description.
        error: String,
    },

    /// Snapshot of all currently running servers.
    ServerSnapshot {
        /// Currently running servers.
        servers: Vec<ServerEntry>,
    },

    /// A server's health status changed.
    ServerHealthChanged {
        /// Unique server instance identifier.
        #[serde(rename = "serverId")]
        server_id: i64,
        /// ID of the model being served.
        #[serde(rename = "modelId")]
        model_id: i64,
        /// New health status.
        status: ServerHealthStatus,
        /// Optional detail message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        /// Unix timestamp in milliseconds when the status changed.
        timestamp: u64,
    },
}

/// Status of one queued download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting in the queue.
    Queued,
    /// Currently being downloaded.
    Downloading,
    /// Completed successfully.
    Completed,
    /// Failed with an error.
    Failed,
    /// Cancelled by the user.
    Cancelled,
}

/// Shard placement for one entry of a sharded model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardInfo {
    /// 0-based index of this shard.
    pub shard_index: u32,
    /// Total number of shards in the model.
    pub total_shards: u32,
    /// Filename of this shard.
    pub filename: String,
    /// Size of this shard file in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// One item in a download queue snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSummary {
    /// Canonical ID of the download.
    pub id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Current status of this download.
    pub status: DownloadStatus,
    /// Position in the queue (1 = currently downloading).
    pub position: u32,
    /// Error message when the status is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Group ID shared by all shards of a sharded download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Shard placement when this item is part of a sharded model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_info: Option<ShardInfo>,
}

/// Download lifecycle and progress events.
///
/// This is the closed inner set wrapped by the outer `download` envelope;
/// it gets its own validation pass in the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Snapshot of the whole download queue.
    QueueSnapshot {
        /// All items currently in the queue.
        items: Vec<DownloadSummary>,
        /// Maximum queue capacity.
        max_size: u32,
    },

    /// A download has started.
    DownloadStarted {
        /// Canonical ID of the download.
        id: String,
    },

    /// Progress for a non-sharded download.
    DownloadProgress {
        /// Canonical ID of the download.
        id: String,
        /// Bytes downloaded so far.
        downloaded: u64,
        /// Total bytes to download.
        total: u64,
        /// Progress percentage (0.0 - 100.0).
        percentage: f64,
    },

    /// Progress for one shard of a sharded download.
    ShardProgress {
        /// Canonical ID of the download group.
        id: String,
        /// Current shard index (0-based).
        shard_index: u32,
        /// Total number of shards.
        total_shards: u32,
        /// Aggregate progress percentage (0.0 - 100.0).
        percentage: f64,
    },

    /// Download completed successfully.
    DownloadCompleted {
        /// Canonical ID of the download.
        id: String,
    },

    /// Download failed.
    DownloadFailed {
        /// Canonical ID of the download.
        id: String,
        /// What went wrong.
        error: String,
    },

    /// Download was cancelled by the user.
    DownloadCancelled {
        /// Canonical ID of the download.
        id: String,
    },
}

/// One server log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Log level as reported by the server.
    #[serde(default)]
    pub level: Option<String>,
    /// The log line itself.
    pub message: String,
}

/// Model verification events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationEvent {
    /// Verification progress update.
    VerificationProgress {
        /// Name of the model being verified.
        #[serde(rename = "modelName")]
        model_name: String,
        /// Bytes processed so far.
        #[serde(rename = "bytesProcessed")]
        bytes_processed: u64,
        /// Total bytes to process.
        #[serde(rename = "totalBytes")]
        total_bytes: u64,
    },

    /// Verification finished.
    VerificationComplete {
        /// ID of the verified model.
        #[serde(rename = "modelId")]
        model_id: i64,
        /// Name of the verified model.
        #[serde(rename = "modelName")]
        model_name: String,
        /// Overall health verdict.
        #[serde(rename = "overallHealth")]
        overall_health: OverallHealth,
    },
}

/// Overall health verdict for a verified model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    /// All shards checked out.
    Healthy,
    /// One or more shards are corrupt or missing.
    Unhealthy,
    /// Nothing to verify against.
    Unverifiable,
}
