// Timestamp handling for FAT directory entries
// FAT date: bits 15-9 year since 1980, bits 8-5 month, bits 4-0 day
// FAT time: bits 15-11 hours, bits 10-5 minutes, bits 4-0 seconds/2

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Decode a FAT date/time pair. Returns `None` for never-set or invalid stamps.
pub fn fat_datetime_to_naive(date: u16, time: u16) -> Option<NaiveDateTime> {
    let year = ((date >> 9) & 0x7F) as i32 + 1980;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;

    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Convert FAT date/time to a Unix timestamp (0 when the stamp is invalid)
pub fn fat_datetime_to_unix(date: u16, time: u16) -> u64 {
    fat_datetime_to_naive(date, time)
        .map(|dt| dt.and_utc().timestamp().max(0) as u64)
        .unwrap_or(0)
}

/// Convert a Unix timestamp to FAT (date, time), clamping the year to 1980..=2107
pub fn unix_to_fat_datetime(timestamp: u64) -> (u16, u16) {
    let datetime = DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_secs(timestamp));

    let year = datetime.year();
    if year < 1980 {
        // 1980-01-01 00:00:00
        return ((1 << 5) | 1, 0);
    }
    let fat_year = (year - 1980).min(127) as u16;

    let fat_date = (fat_year << 9) | ((datetime.month() as u16) << 5) | (datetime.day() as u16);
    let fat_time = ((datetime.hour() as u16) << 11)
        | ((datetime.minute() as u16) << 5)
        | ((datetime.second() / 2) as u16);

    (fat_date, fat_time)
}

/// Current time as FAT (date, time)
pub fn current_fat_datetime() -> (u16, u16) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => unix_to_fat_datetime(duration.as_secs()),
        Err(_) => unix_to_fat_datetime(0),
    }
}
