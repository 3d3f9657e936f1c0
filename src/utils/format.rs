//! Display formatting
//!
//! Pure helpers that turn raw record and session fields into labels.

use chrono::{DateTime, Local, TimeZone, Utc};

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Binary-prefixed size, two decimals with trailing zeros removed
///
/// `0 -> "0 Bytes"`, `1536 -> "1.5 KB"`, `1048576 -> "1 MB"`
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let mut text = format!("{:.2}", value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    format!("{} {}", text, SIZE_UNITS[unit])
}

/// Elapsed seconds as `MM:SS`
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Timestamp as `Mar 1, 2024, 10:15 AM` in the given zone
pub fn format_timestamp<Tz>(at: &DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.with_timezone(zone).format("%b %-d, %Y, %I:%M %p").to_string()
}

/// Timestamp in the local zone
pub fn format_local_timestamp(at: &DateTime<Utc>) -> String {
    format_timestamp(at, &Local)
}

/// Name for a locally saved recording, e.g. `screen-recording-2024-03-01T10-15-00.webm`
pub fn download_file_name(now: DateTime<Utc>) -> String {
    format!(
        "screen-recording-{}.webm",
        now.format("%Y-%m-%dT%H:%M:%S").to_string().replace(':', "-")
    )
}

/// Multipart filename for an upload, e.g. `recording-1709288100000.webm`
pub fn upload_file_name(now: DateTime<Utc>) -> String {
    format!("recording-{}.webm", now.timestamp_millis())
}

pub fn recording_count_label(count: usize) -> String {
    if count == 1 {
        "1 recording".to_string()
    } else {
        format!("{} recordings", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(330), "330 Bytes");
        assert_eq!(format_file_size(1023), "1023 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1 MB");
        assert_eq!(format_file_size(1_572_864 + 10_486), "1.51 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
        // Capped at GB
        assert_eq!(format_file_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(3), "00:03");
        assert_eq!(format_elapsed(75), "01:15");
        assert_eq!(format_elapsed(6000), "100:00");
    }

    #[test]
    fn test_format_timestamp() {
        let created = at("2024-03-01T22:05:00Z");
        assert_eq!(format_timestamp(&created, &Utc), "Mar 1, 2024, 10:05 PM");

        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        assert_eq!(format_timestamp(&created, &tokyo), "Mar 2, 2024, 07:05 AM");
    }

    #[test]
    fn test_file_names() {
        let now = at("2024-03-01T10:15:00.123Z");
        assert_eq!(download_file_name(now), "screen-recording-2024-03-01T10-15-00.webm");
        assert_eq!(upload_file_name(now), "recording-1709288100123.webm");
    }

    #[test]
    fn test_count_label() {
        assert_eq!(recording_count_label(0), "0 recordings");
        assert_eq!(recording_count_label(1), "1 recording");
        assert_eq!(recording_count_label(2), "2 recordings");
    }
}
