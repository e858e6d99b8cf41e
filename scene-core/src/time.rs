//! Epoch-seconds <-> `DateTime<Utc>` glue. `datetime-conversion` already gives
//! us the forward direction generically over any `TimeZone`; the reverse needs
//! a fixed-offset landing type, which the teacher's crate only provides for
//! `Local`, so this crate supplies the `Utc` counterpart bus timestamps need.

use chrono::{DateTime, Utc};

pub fn datetime_to_epoch(dt: DateTime<Utc>) -> f64 {
    datetime_conversion::datetime_to_f64(&dt)
}

pub fn epoch_to_datetime(epoch: f64) -> DateTime<Utc> {
    let secs = epoch.floor() as i64;
    let nanos = ((epoch - epoch.floor()) * 1e9).round() as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_microsecond() {
        let dt = Utc::now();
        let epoch = datetime_to_epoch(dt);
        let back = epoch_to_datetime(epoch);
        approx::assert_relative_eq!(datetime_to_epoch(back), epoch, epsilon = 1e-6);
    }
}
