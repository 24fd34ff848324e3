//! The per-node penalty engine (spec §4.1).
//!
//! Grounded on `apollo-router`'s use of the `lru` crate for bounded,
//! time-windowed caches: the penalty tracker is the same shape (bounded
//! map, oldest entry evicted first) applied to a minute-keyed counter
//! instead of a response cache.

use lru::LruCache;
use std::num::NonZeroUsize;
use time::OffsetDateTime;

use crate::model::{Stats, StatsFrames};

/// Sentinel score for a node that must never be selected.
pub const BLOCK: i64 = 10_000_000;

/// Render `now` as the `"yyyy-MM-dd HH:mm"` bucket key the tracker indexes
/// by (spec §4.1).
pub fn minute_key(now: OffsetDateTime) -> String {
    const FORMAT: &[time::format_description::FormatItem<'_>] =
        time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");
    now.format(FORMAT).expect("well-formed minute key format")
}

/// How many distinct minute buckets the tracker retains before evicting the
/// least-recently-touched one.
const RETAINED_MINUTES: usize = 100;

/// A kind of scored event fed into the penalty tracker.
///
/// Ref: spec §4.1 "Event kinds are bucketed as...".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PenaltyEvent {
    /// A track started playing.
    LoadAttempt,
    /// A track ended with reason `LOAD_FAILED`.
    LoadFailed,
    /// A `TrackExceptionEvent` was received.
    TrackException,
    /// A `TrackStuckEvent` was received.
    TrackStuck,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct MinuteCounts {
    load_attempt: u64,
    load_failed: u64,
    track_exception: u64,
    track_stuck: u64,
}

impl MinuteCounts {
    fn record(&mut self, event: PenaltyEvent) {
        match event {
            PenaltyEvent::LoadAttempt => self.load_attempt += 1,
            PenaltyEvent::LoadFailed => self.load_failed += 1,
            PenaltyEvent::TrackException => self.track_exception += 1,
            PenaltyEvent::TrackStuck => self.track_stuck += 1,
        }
    }
}

/// Aggregated counters a score is computed from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Totals {
    load_attempts: u64,
    load_failed: u64,
    track_exceptions: u64,
    tracks_stuck: u64,
}

/// Per-node penalty history, bucketed by minute and bounded to the last
/// [`RETAINED_MINUTES`] distinct minutes seen.
///
/// Ref: spec §4.1, §8 invariant 5 (reset on `Ready{resumed: false}`).
pub struct PenaltyTracker {
    buckets: LruCache<String, MinuteCounts>,
}

impl std::fmt::Debug for PenaltyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PenaltyTracker").field("buckets", &self.buckets.len()).finish()
    }
}

impl Default for PenaltyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PenaltyTracker {
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(RETAINED_MINUTES).expect("RETAINED_MINUTES is non-zero");
        Self { buckets: LruCache::new(capacity) }
    }

    /// Record an event against the given minute key.
    ///
    /// `minute_key` is supplied by the caller (e.g. `node.rs`) rather than
    /// derived here, so the tracker has no wall-clock dependency of its own.
    pub fn record(&mut self, minute_key: &str, event: PenaltyEvent) {
        if let Some(bucket) = self.buckets.get_mut(minute_key) {
            bucket.record(event);
        } else {
            let mut bucket = MinuteCounts::default();
            bucket.record(event);
            self.buckets.put(minute_key.to_owned(), bucket);
        }
    }

    /// Drop all retained history. Called when a node's session resets
    /// without resuming (spec §8 invariant 5).
    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    fn totals(&self) -> Totals {
        self.buckets.iter().fold(Totals::default(), |mut totals, (_, counts)| {
            totals.load_attempts += counts.load_attempt;
            totals.load_failed += counts.load_failed;
            totals.track_exceptions += counts.track_exception;
            totals.tracks_stuck += counts.track_stuck;
            totals
        })
    }

    /// Compute the penalty score for a node that is available and has a
    /// stats snapshot. Returns [`BLOCK`] if the aggregated history shows
    /// every load attempt over the retained window failed.
    ///
    /// `locally_counted_playing_players` is the orchestrator's own count of
    /// guilds currently playing on this node, used to cover the gap before
    /// a fresh stats snapshot arrives.
    pub fn calculate_total(&self, stats: &Stats, locally_counted_playing_players: u64) -> i64 {
        let totals = self.totals();

        if totals.load_attempts > 0 && totals.load_attempts == totals.load_failed {
            return BLOCK;
        }

        let player_penalty = locally_counted_playing_players.max(stats.playing_players) as i64;
        let cpu_penalty = exponential_penalty(100.0 * stats.cpu.system_load, 1.05, 10.0);

        let frame_penalty = stats
            .frame_stats
            .filter(|frames| frames.deficit != -1)
            .map(frame_penalty)
            .unwrap_or(0);

        let track_stuck_penalty = (100 * totals.tracks_stuck as i64 - 100).max(0);
        let track_exception_penalty = (10 * totals.track_exceptions as i64 - 10).max(0);
        let load_failed_penalty = if totals.load_failed > 0 {
            (totals.load_failed / totals.load_attempts.max(1)) as i64
        } else {
            0
        };

        player_penalty
            + cpu_penalty
            + frame_penalty
            + track_stuck_penalty
            + track_exception_penalty
            + load_failed_penalty
    }
}

/// `floor(base^(input) * scale - scale)`, used for the CPU and frame
/// penalty curves (spec §4.1).
fn exponential_penalty(input: f64, base: f64, scale: f64) -> i64 {
    (base.powf(input) * scale - scale).floor() as i64
}

fn frame_penalty(frames: StatsFrames) -> i64 {
    let deficit = exponential_penalty(500.0 * frames.deficit as f64 / 3000.0, 1.03, 600.0);
    let nulled = 2 * exponential_penalty(500.0 * frames.nulled as f64 / 3000.0, 1.03, 600.0);
    deficit + nulled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StatsCpu, StatsMemory};

    fn stats(playing_players: u64, system_load: f64, frame_stats: Option<StatsFrames>) -> Stats {
        Stats {
            players: playing_players,
            playing_players,
            uptime: 0,
            memory: StatsMemory::default(),
            cpu: StatsCpu { cores: 4, system_load, lavalink_load: 0.0 },
            frame_stats,
        }
    }

    #[test]
    fn empty_tracker_scores_zero_with_idle_stats() {
        let tracker = PenaltyTracker::new();
        let score = tracker.calculate_total(&stats(0, 0.0, None), 0);
        assert_eq!(score, 0);
    }

    #[test]
    fn all_load_attempts_failing_blocks_the_node() {
        let mut tracker = PenaltyTracker::new();
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadAttempt);
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadFailed);

        let score = tracker.calculate_total(&stats(0, 0.0, None), 0);
        assert_eq!(score, BLOCK);
    }

    #[test]
    fn partial_load_failures_contribute_a_bounded_penalty() {
        let mut tracker = PenaltyTracker::new();
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadAttempt);
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadAttempt);
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadFailed);

        let score = tracker.calculate_total(&stats(0, 0.0, None), 0);
        assert_eq!(score, 0);
    }

    #[test]
    fn track_stuck_and_exception_penalties_clamp_at_zero_for_a_single_event() {
        let mut tracker = PenaltyTracker::new();
        tracker.record("2026-01-01 00:00", PenaltyEvent::TrackStuck);
        tracker.record("2026-01-01 00:00", PenaltyEvent::TrackException);

        let score = tracker.calculate_total(&stats(0, 0.0, None), 0);
        assert_eq!(score, 0);
    }

    #[test]
    fn repeated_track_stuck_events_accumulate_penalty() {
        let mut tracker = PenaltyTracker::new();
        for _ in 0..3 {
            tracker.record("2026-01-01 00:00", PenaltyEvent::TrackStuck);
        }

        let score = tracker.calculate_total(&stats(0, 0.0, None), 0);
        assert_eq!(score, 100 * 3 - 100);
    }

    #[test]
    fn cpu_load_increases_the_score() {
        let tracker = PenaltyTracker::new();
        let idle = tracker.calculate_total(&stats(0, 0.0, None), 0);
        let busy = tracker.calculate_total(&stats(0, 1.0, None), 0);
        assert!(busy > idle);
    }

    #[test]
    fn missing_or_sentinel_frame_stats_contribute_no_frame_penalty() {
        let tracker = PenaltyTracker::new();
        let without_frames = tracker.calculate_total(&stats(0, 0.0, None), 0);

        let sentinel = Some(StatsFrames { sent: 0, nulled: 0, deficit: -1 });
        let with_sentinel = tracker.calculate_total(&stats(0, 0.0, sentinel), 0);

        assert_eq!(without_frames, with_sentinel);
    }

    #[test]
    fn frame_deficit_increases_the_score() {
        let tracker = PenaltyTracker::new();
        let healthy = Some(StatsFrames { sent: 3000, nulled: 0, deficit: 0 });
        let degraded = Some(StatsFrames { sent: 1500, nulled: 0, deficit: 1500 });

        let healthy_score = tracker.calculate_total(&stats(0, 0.0, healthy), 0);
        let degraded_score = tracker.calculate_total(&stats(0, 0.0, degraded), 0);

        assert!(degraded_score > healthy_score);
    }

    #[test]
    fn player_penalty_uses_the_larger_of_local_and_remote_counts() {
        let tracker = PenaltyTracker::new();
        let score = tracker.calculate_total(&stats(2, 0.0, None), 5);
        assert_eq!(score, 5);
    }

    #[test]
    fn reset_clears_all_retained_history() {
        let mut tracker = PenaltyTracker::new();
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadAttempt);
        tracker.record("2026-01-01 00:00", PenaltyEvent::LoadFailed);
        assert_eq!(tracker.calculate_total(&stats(0, 0.0, None), 0), BLOCK);

        tracker.reset();
        assert_eq!(tracker.calculate_total(&stats(0, 0.0, None), 0), 0);
    }

    #[test]
    fn minute_key_formats_as_expected() {
        let timestamp = time::macros::datetime!(2026 - 03 - 05 14:07:33 UTC);
        assert_eq!(minute_key(timestamp), "2026-03-05 14:07");
    }

    #[test]
    fn bucket_capacity_is_bounded() {
        let mut tracker = PenaltyTracker::new();
        for minute in 0..(RETAINED_MINUTES + 10) {
            tracker.record(&format!("2026-01-01 {minute:04}"), PenaltyEvent::LoadAttempt);
        }
        assert!(tracker.buckets.len() <= RETAINED_MINUTES);
    }
}
