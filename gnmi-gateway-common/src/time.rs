use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current timestamp in nanoseconds since Unix epoch.
///
/// gNMI notifications carry nanosecond timestamps. Returns 0 if the system
/// clock is before the epoch, and saturates at `i64::MAX`.
pub fn current_timestamp_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanos_track_system_clock() {
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        let nanos = current_timestamp_nanos();

        assert!(nanos > 0);
        assert!(nanos as u128 >= before.as_nanos());
    }
}
