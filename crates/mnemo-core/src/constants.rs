//! Engine-wide tuning constants. Overridable per-component via `EngineConfig`.

/// Mtime deltas below this are treated as "unchanged" without hashing.
pub const FAST_PATH_WINDOW_MS: i64 = 1_000;

/// After this many failed embedding attempts a memory is marked `failed`.
pub const MAX_EMBEDDING_RETRIES: i64 = 3;

/// A failed row is not retried again until this much time has passed.
pub const RETRY_COOLDOWN_SECS: i64 = 3_600;

/// Added to the in-memory accumulator on every tracked access.
pub const ACCESS_INCREMENT: f64 = 0.1;

/// Accumulated value at which a single id is flushed to the database.
pub const ACCESS_FLUSH_THRESHOLD: f64 = 0.5;

/// Checkpoints retained per spec-folder scope before the oldest are pruned.
pub const MAX_CHECKPOINTS: usize = 10;

/// Checkpoints untouched for this many days are pruned on the next write.
pub const CHECKPOINT_TTL_DAYS: i64 = 30;

/// Uncompressed snapshot JSON larger than this is rejected outright.
pub const MAX_SNAPSHOT_BYTES: usize = 100 * 1024 * 1024;

/// Hard cap on edges returned by any single causal-edge query.
pub const MAX_EDGES_LIMIT: usize = 100;

/// Traversal depth is clamped into [1, MAX_TRAVERSAL_DEPTH].
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Depth used by causal-chain queries when the caller does not specify one.
pub const DEFAULT_TRAVERSAL_DEPTH: usize = 3;

/// Rows deleted per statement during checkpoint clear phases.
pub const RESTORE_DELETE_BATCH: usize = 500;

/// Default limit for checkpoint listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Default timeout for outbound git invocations, in milliseconds.
/// Override with the `GIT_COMMAND_TIMEOUT_MS` environment variable.
pub const DEFAULT_GIT_TIMEOUT_MS: u64 = 5_000;

/// Suffix inserted between basename and extension for pending files.
pub const PENDING_MARKER: &str = "_pending";

/// Suffix for not-yet-renamed temporary files.
pub const TMP_SUFFIX: &str = ".tmp";
