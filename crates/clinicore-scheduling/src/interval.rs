//! Half-open time interval intersection.

use chrono::NaiveTime;

/// Decides whether two half-open intervals `[a_start, a_end)` and
/// `[b_start, b_end)` overlap.
///
/// Back-to-back intervals, where one ends exactly when the other starts,
/// do not overlap.
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}
