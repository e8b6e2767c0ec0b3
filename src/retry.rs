use std::time::Duration;

/// `Retry-After` hint for an unready health response: the check's cache
/// window (nothing changes before it lapses), rounded up to whole seconds.
pub fn retry_after_seconds(cache: Duration) -> u64 {
    duration_to_seconds(cache)
}

fn duration_to_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() == 0 {
        secs.max(1)
    } else {
        secs.saturating_add(1).max(1)
    }
}
