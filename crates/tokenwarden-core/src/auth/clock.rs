use chrono::{DateTime, Duration, SubsecRound, Utc};
use tokio::time::Instant;

/// Wall-clock time derived from the tokio monotonic clock.
///
/// Readings have millisecond resolution, the same as the stored issuance time.
///
/// The wall time is sampled once at construction; after that every reading
/// is `anchor + elapsed`, so issuance timestamps and timer deadlines share a
/// single time base. Under `tokio::time::pause` the clock stands still and
/// moves only with `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall_anchor: DateTime<Utc>,
    mono_anchor: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock whose current reading is `wall_anchor`.
    pub fn starting_at(wall_anchor: DateTime<Utc>) -> Self {
        Self {
            wall_anchor,
            mono_anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.mono_anchor);
        let now = self.wall_anchor + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero());
        now.trunc_subsecs(3)
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
