//! Record timestamps (year, day-of-year, time of day)

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Timestamp carried in a data record header
///
/// `day` is the day of year starting at 1 for January 1st.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecordTime {
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub seconds: f32,
}

impl RecordTime {
    /// Encoded size in bytes
    pub const SIZE: usize = 10;

    /// Seconds since the POSIX epoch
    pub fn epoch_seconds(&self) -> f64 {
        let days = days_from_civil(i64::from(self.year), 1, 1) + i64::from(self.day) - 1;
        days as f64 * SECONDS_PER_DAY
            + f64::from(self.hour) * 3600.0
            + f64::from(self.minute) * 60.0
            + f64::from(self.seconds)
    }

    /// Build a timestamp from seconds since the POSIX epoch
    pub fn from_epoch(epoch: f64) -> Self {
        let days = (epoch / SECONDS_PER_DAY).floor() as i64;
        let secs_of_day = epoch - days as f64 * SECONDS_PER_DAY;
        let (year, _, _) = civil_from_days(days);
        let day = days - days_from_civil(year, 1, 1) + 1;

        let hour = (secs_of_day / 3600.0).floor();
        let minute = ((secs_of_day - hour * 3600.0) / 60.0).floor();
        let seconds = secs_of_day - hour * 3600.0 - minute * 60.0;

        Self {
            year: year as u16,
            day: day as u16,
            hour: hour as u8,
            minute: minute as u8,
            seconds: seconds as f32,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.year.to_le_bytes());
        out.extend_from_slice(&self.day.to_le_bytes());
        out.push(self.hour);
        out.push(self.minute);
        out.extend_from_slice(&self.seconds.to_le_bytes());
    }

    /// Decode from exactly [`RecordTime::SIZE`] bytes
    pub fn read_from(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            year: u16::from_le_bytes([bytes[0], bytes[1]]),
            day: u16::from_le_bytes([bytes[2], bytes[3]]),
            hour: bytes[4],
            minute: bytes[5],
            seconds: f32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        }
    }
}

// Days since 1970-01-01 for a proleptic Gregorian date
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
