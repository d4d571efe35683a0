//! Packed `xsd:dateTime` / `xsd:date` payloads.
//!
//! ```text
//! year(13) month(4) day(5) hour(5) minute(6) millis(16) tz(7)
//! ```
//!
//! `millis` counts milliseconds within the minute. `tz` is the offset in
//! quarter hours biased by 64; 127 means "no timezone".

const YEAR_SHIFT: u32 = 43;
const MONTH_SHIFT: u32 = 39;
const DAY_SHIFT: u32 = 34;
const HOUR_SHIFT: u32 = 29;
const MINUTE_SHIFT: u32 = 23;
const MILLIS_SHIFT: u32 = 7;

const MAX_YEAR: u16 = 8191;
const TZ_BIAS: i8 = 64;
const TZ_NONE: u64 = 127;
// +-14:00
const TZ_MAX_QUARTERS: i8 = 56;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct DateTimeParts {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    millis: u16,
    pub(super) tz_quarters: Option<i8>,
}

fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn fixed<'a>(text: &'a str, range: std::ops::Range<usize>) -> Option<&'a str> {
    text.get(range)
}

fn parse_ymd(text: &str) -> Option<(u16, u8, u8)> {
    if text.len() != 10 || fixed(text, 4..5)? != "-" || fixed(text, 7..8)? != "-" {
        return None;
    }
    let year = u16::try_from(digits(fixed(text, 0..4)?)?).ok()?;
    let month = u8::try_from(digits(fixed(text, 5..7)?)?).ok()?;
    let day = u8::try_from(digits(fixed(text, 8..10)?)?).ok()?;
    if year > MAX_YEAR || !(1..=12).contains(&month) {
        return None;
    }
    if day == 0 || day > days_in_month(year, month) {
        return None;
    }
    Some((year, month, day))
}

fn parse_tz(text: &str) -> Option<Option<i8>> {
    match text {
        "" => Some(None),
        "Z" => Some(Some(0)),
        _ => {
            let sign: i32 = match text.as_bytes().first()? {
                b'+' => 1,
                b'-' => -1,
                _ => return None,
            };
            if text.len() != 6 || fixed(text, 3..4)? != ":" {
                return None;
            }
            let hours = digits(fixed(text, 1..3)?)? as i32;
            let minutes = digits(fixed(text, 4..6)?)? as i32;
            if minutes >= 60 || minutes % 15 != 0 {
                return None;
            }
            let quarters = sign * (hours * 4 + minutes / 15);
            if quarters.abs() > TZ_MAX_QUARTERS as i32 {
                return None;
            }
            Some(Some(quarters as i8))
        }
    }
}

/// Parses a canonical `xsd:dateTime`; anything else is `None`.
pub(super) fn parse_date_time(lexical: &str) -> Option<DateTimeParts> {
    let (date, time) = lexical.split_once('T')?;
    let (year, month, day) = parse_ymd(date)?;
    if fixed(time, 2..3)? != ":" || fixed(time, 5..6)? != ":" {
        return None;
    }
    let hour = u8::try_from(digits(fixed(time, 0..2)?)?).ok()?;
    let minute = u8::try_from(digits(fixed(time, 3..5)?)?).ok()?;
    let second = digits(fixed(time, 6..8)?)?;
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    let rest = time.get(8..)?;
    let (fraction, tz) = match rest.strip_prefix('.') {
        Some(after) => {
            let end = after
                .bytes()
                .position(|b| !b.is_ascii_digit())
                .unwrap_or(after.len());
            (&after[..end], &after[end..])
        }
        None => ("", rest),
    };
    if fraction.len() > 3 || (rest.starts_with('.') && fraction.is_empty()) {
        return None;
    }
    let frac_millis = if fraction.is_empty() {
        0
    } else {
        digits(&format!("{fraction:0<3}"))?
    };
    let parts = DateTimeParts {
        year,
        month,
        day,
        hour,
        minute,
        millis: u16::try_from(second * 1000 + frac_millis).ok()?,
        tz_quarters: parse_tz(tz)?,
    };
    (parts.format_date_time() == lexical).then_some(parts)
}

/// Parses a canonical `xsd:date`; anything else is `None`.
pub(super) fn parse_date(lexical: &str) -> Option<DateTimeParts> {
    let (year, month, day) = parse_ymd(lexical.get(..10)?)?;
    let parts = DateTimeParts {
        year,
        month,
        day,
        hour: 0,
        minute: 0,
        millis: 0,
        tz_quarters: parse_tz(lexical.get(10..)?)?,
    };
    (parts.format_date() == lexical).then_some(parts)
}

impl DateTimeParts {
    pub(super) fn pack(&self) -> u64 {
        let tz = match self.tz_quarters {
            Some(q) => (q + TZ_BIAS) as u64,
            None => TZ_NONE,
        };
        ((self.year as u64) << YEAR_SHIFT)
            | ((self.month as u64) << MONTH_SHIFT)
            | ((self.day as u64) << DAY_SHIFT)
            | ((self.hour as u64) << HOUR_SHIFT)
            | ((self.minute as u64) << MINUTE_SHIFT)
            | ((self.millis as u64) << MILLIS_SHIFT)
            | tz
    }

    pub(super) fn unpack(payload: u64) -> Option<Self> {
        let field = |shift: u32, bits: u32| (payload >> shift) & ((1 << bits) - 1);
        let year = field(YEAR_SHIFT, 13) as u16;
        let month = field(MONTH_SHIFT, 4) as u8;
        let day = field(DAY_SHIFT, 5) as u8;
        let hour = field(HOUR_SHIFT, 5) as u8;
        let minute = field(MINUTE_SHIFT, 6) as u8;
        let millis = field(MILLIS_SHIFT, 16) as u16;
        let tz = field(0, 7);
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return None;
        }
        if hour > 23 || minute > 59 || millis >= 60_000 {
            return None;
        }
        let tz_quarters = if tz == TZ_NONE {
            None
        } else {
            let quarters = tz as i8 - TZ_BIAS;
            if quarters.abs() > TZ_MAX_QUARTERS {
                return None;
            }
            Some(quarters)
        };
        Some(Self {
            year,
            month,
            day,
            hour,
            minute,
            millis,
            tz_quarters,
        })
    }

    fn format_tz(&self) -> String {
        match self.tz_quarters {
            None => String::new(),
            Some(0) => "Z".to_owned(),
            Some(q) => {
                let sign = if q < 0 { '-' } else { '+' };
                let minutes = q.unsigned_abs() as u32 * 15;
                format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60)
            }
        }
    }

    pub(super) fn format_date_time(&self) -> String {
        let seconds = self.millis / 1000;
        let fraction = match self.millis % 1000 {
            0 => String::new(),
            ms => {
                let padded = format!("{ms:03}");
                format!(".{}", padded.trim_end_matches('0'))
            }
        };
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{fraction}{}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            seconds,
            self.format_tz()
        )
    }

    pub(super) fn format_date(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}{}",
            self.year,
            self.month,
            self.day,
            self.format_tz()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_orders_by_year_first() {
        let early = parse_date_time("1999-12-31T23:59:59Z").unwrap();
        let late = parse_date_time("2000-01-01T00:00:00Z").unwrap();
        assert!(early.pack() < late.pack());
    }

    #[test]
    fn timezone_offsets_use_quarter_hours() {
        let parts = parse_date_time("2020-05-05T05:05:05.05-09:45").unwrap();
        assert_eq!(parts.tz_quarters, Some(-39));
        assert_eq!(parts.millis, 5050);
        assert_eq!(DateTimeParts::unpack(parts.pack()), Some(parts));
        assert!(parse_date_time("2020-05-05T05:05:05+14:15").is_none());
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        for bad in [
            "2020-5-05T05:05:05",
            "2020-05-05T24:00:00",
            "2020-05-05T05:05:05.",
            "2020-05-05T05:05:05.1234",
            "2020-05-05 05:05:05",
            "20200-05-05T05:05:05",
        ] {
            assert!(parse_date_time(bad).is_none(), "{bad}");
        }
        assert!(parse_date("2020-13-01").is_none());
        assert!(parse_date("2020-01-01Z").is_some());
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert!(DateTimeParts::unpack(0).is_none());
        assert!(DateTimeParts::unpack(u64::MAX >> 8).is_none());
    }
}
