/// Nanoseconds on the playback timeline.
pub type Time = u64;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

pub fn from_secs_f64(secs: f64) -> Time {
    if secs <= 0.0 || !secs.is_finite() {
        return 0;
    }
    (secs * NANOS_PER_SEC as f64).round() as Time
}

pub fn to_secs_f64(time: Time) -> f64 {
    time as f64 / NANOS_PER_SEC as f64
}
