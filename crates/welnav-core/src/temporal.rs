//! Timestamp helpers.
//!
//! Cases carry two creation timestamps: an ISO instant (authoritative) and a
//! locale-formatted display string such as `2025. 2. 10. 오후 3:04:05`.
//! Display strings are rendered and parsed in Korea Standard Time.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc,
};

const KST_OFFSET_SECS: i32 = 9 * 3600;

fn kst() -> FixedOffset {
    // 9h is always within the valid offset range.
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Render an instant as a Korean-locale display string.
#[must_use]
pub fn format_display(at: DateTime<Utc>) -> String {
    let local = at.with_timezone(&kst());
    let (is_pm, hour12) = local.hour12();
    format!(
        "{}. {}. {}. {} {}:{:02}:{:02}",
        local.year(),
        local.month(),
        local.day(),
        if is_pm { "오후" } else { "오전" },
        hour12,
        local.minute(),
        local.second()
    )
}

/// Parse a display string back into an instant.
///
/// Accepts the Korean-locale format produced by [`format_display`], plus
/// `YYYY-MM-DD HH:MM[:SS]` and RFC 3339. Returns `None` when nothing matches.
#[must_use]
pub fn parse_display(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return from_kst(naive);
        }
    }
    parse_korean_locale(raw)
}

fn parse_korean_locale(raw: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }
    let year: i32 = parts[0].trim_end_matches('.').parse().ok()?;
    let month: u32 = parts[1].trim_end_matches('.').parse().ok()?;
    let day: u32 = parts[2].trim_end_matches('.').parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let (meridiem, clock) = match parts.get(3..) {
        Some([m, c, ..]) if *m == "오전" || *m == "오후" => (Some(*m), *c),
        Some([c, ..]) => (None, *c),
        _ => (None, "0:00:00"),
    };

    let mut fields = clock.split(':');
    let mut hour: u32 = fields.next()?.parse().ok()?;
    let minute: u32 = fields.next().unwrap_or("0").parse().ok()?;
    let second: u32 = fields.next().unwrap_or("0").parse().ok()?;

    match meridiem {
        Some("오후") if hour < 12 => hour += 12,
        Some("오전") if hour == 12 => hour = 0,
        _ => {}
    }

    from_kst(date.and_hms_opt(hour, minute, second)?)
}

fn from_kst(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    kst()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Ordering key for a record: the ISO instant when present, otherwise the
/// parsed display string, otherwise the Unix epoch (sorts as oldest).
#[must_use]
pub fn ordering_key(iso: Option<DateTime<Utc>>, display: &str) -> DateTime<Utc> {
    iso.or_else(|| parse_display(display))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
