//! Default constants for catalink configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Deduplication Defaults
// =============================================================================

/// Minimum overall score (0-100) for two records to be merged into one cluster
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 85.0;

/// Year window for the graded dedup year score.
/// Each year of difference costs 20 points; beyond the window the score is 0.
pub const DEFAULT_DEDUP_YEAR_TOLERANCE: u32 = 2;

/// Points deducted from the year score per year of difference
pub const YEAR_PENALTY_PER_YEAR: f64 = 20.0;

/// Overall score weight of the title signal
pub const DEFAULT_TITLE_WEIGHT: f64 = 0.6;

/// Overall score weight of the author signal
pub const DEFAULT_AUTHOR_WEIGHT: f64 = 0.3;

/// Overall score weight of the year signal
pub const DEFAULT_YEAR_WEIGHT: f64 = 0.1;

// =============================================================================
// Blocking Defaults
// =============================================================================

/// Number of leading normalized title words in the prefix block key
pub const DEFAULT_TITLE_PREFIX_LENGTH: usize = 3;

/// Width of a year bucket in years
pub const YEAR_BUCKET_WIDTH: i32 = 5;

/// Fan-out cap on candidates per record.
/// Candidates sharing more keys survive the cap.
pub const DEFAULT_MAX_CANDIDATES_PER_RECORD: usize = 200;

/// Nearest neighbours pulled from an embedding store per source record
pub const DEFAULT_EMBEDDING_TOP_K: usize = 10;

/// Lowest plausible publication year
pub const YEAR_MIN: i32 = 1400;

/// Highest plausible publication year
pub const YEAR_MAX: i32 = 2000;

// =============================================================================
// Matching Defaults
// =============================================================================

/// Year window for cross-catalog year agreement
pub const DEFAULT_YEAR_TOLERANCE: u32 = 30;

/// Surname ratio (0-100) at which authors are considered matching
pub const DEFAULT_AUTHOR_MATCH_THRESHOLD: f64 = 80.0;

/// Title evidence for a high-confidence tier
pub const DEFAULT_HIGH_THRESHOLD: f64 = 85.0;

/// Title evidence for a medium-confidence tier
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 75.0;

/// Title evidence below which a pair is not a match
pub const DEFAULT_LOW_THRESHOLD: f64 = 60.0;

// =============================================================================
// Arbitration Defaults
// =============================================================================

/// Messages endpoint of the arbitration service
pub const DEFAULT_ARBITRATION_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Model name sent with each arbitration request
pub const DEFAULT_ARBITRATION_MODEL: &str = "claude-sonnet-4-20250514";

/// Environment variable holding the arbitration API key
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// API version header value sent with each request
pub const ARBITRATION_API_VERSION: &str = "2023-06-01";

/// Per-call timeout (seconds)
pub const DEFAULT_ARBITRATION_TIMEOUT_SECS: u64 = 60;

/// Retries after a transport failure before falling back
pub const DEFAULT_ARBITRATION_MAX_RETRIES: u32 = 1;

/// Concurrent in-flight arbitration calls
pub const DEFAULT_ARBITRATION_CONCURRENCY: usize = 4;

/// Sustained arbitration call rate
pub const DEFAULT_ARBITRATION_RPS: u32 = 2;

/// Response token budget per call
pub const DEFAULT_ARBITRATION_MAX_TOKENS: u32 = 500;

// =============================================================================
// Checkpoint Defaults
// =============================================================================

/// Source records processed between checkpoint flushes
pub const DEFAULT_CHECKPOINT_EVERY: usize = 100;
