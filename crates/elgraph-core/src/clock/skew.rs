use chrono::{DateTime, Duration, Utc};

/// Warning emitted when a merged stamp is far from the local wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSkewWarning {
    /// Wall time carried by the remote entry.
    pub remote: DateTime<Utc>,
    /// Local wall time at merge.
    pub local: DateTime<Utc>,
    /// Detected skew in milliseconds (positive = remote is in the future).
    pub skew_millis: i64,
    /// The threshold that was exceeded.
    pub threshold: Duration,
    /// Human-readable warning message.
    pub message: String,
}

/// Default skew threshold in seconds (5 minutes).
pub const DEFAULT_SKEW_THRESHOLD_SECS: u64 = 300;

/// Check for clock skew between a remote stamp and local wall time.
/// Returns Some(warning) if the absolute difference exceeds `threshold`.
///
/// Merges never reject or rewrite skewed entries. A remote clock running
/// ahead still wins its conflicts; this only makes that visible.
#[must_use]
pub fn check_clock_skew(
    remote: DateTime<Utc>,
    local: DateTime<Utc>,
    threshold: Duration,
) -> Option<ClockSkewWarning> {
    let skew = remote - local;
    if skew.abs() <= threshold {
        return None;
    }

    let skew_millis = skew.num_milliseconds();
    let direction = if skew_millis > 0 { "future" } else { "past" };
    let message = format!(
        "Clock skew detected: remote entry is {} ms in the {}, threshold is {} ms",
        skew_millis.unsigned_abs(),
        direction,
        threshold.num_milliseconds()
    );

    Some(ClockSkewWarning {
        remote,
        local,
        skew_millis,
        threshold,
        message,
    })
}
