use {chrono::Utc, std::time::Duration};

/// Converts a relative duration assumed from now to an absolute UNIX timestamp measured in
/// seconds.
///
/// Uses an [`i64`] instead of an [`u64`] due to SQL having no proper unsigned integer type.
/// Converting wouldn't have any advantage then.
#[must_use]
pub fn relative_to_absolute(duration: Duration) -> i64 {
    let now = Utc::now();
    let duration = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    (now + duration).timestamp()
}

/// Converts a [`time::Date`] to a [`chrono::NaiveDate`], as they don't provide any direct
/// interconversion methods.
#[must_use]
pub fn time_to_chrono_date(time_date: time::Date) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::from_ymd_opt(
        time_date.year(),
        u32::from(u8::from(time_date.month())),
        u32::from(time_date.day()),
    )
}

#[must_use]
pub fn time_to_chrono_time(time_time: time::Time) -> Option<chrono::NaiveTime> {
    chrono::NaiveTime::from_hms_opt(
        u32::from(time_time.hour()),
        u32::from(time_time.minute()),
        u32::from(time_time.second()),
    )
}

#[must_use]
pub fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%A, %d %B %Y").to_string()
}

#[must_use]
pub fn format_time(time: chrono::NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Renders an amount of cents as a decimal, e.g. `1250` as `12.50`.
#[must_use]
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Parses a non-negative decimal amount with at most two fractional digits into cents.
#[must_use]
pub fn parse_amount(input: &str) -> Option<i64> {
    let input = input.trim();
    let (whole, fraction) = input.split_once(['.', ',']).unwrap_or((input, ""));

    if whole.is_empty() || fraction.len() > 2 {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

#[cfg(test)]
mod tests {
    use super::{format_amount, parse_amount};

    #[test]
    fn amounts() {
        assert_eq!(parse_amount("12.5"), Some(1250));
        assert_eq!(parse_amount(" 7 "), Some(700));
        assert_eq!(parse_amount("0,05"), Some(5));
        assert_eq!(parse_amount("1.234"), None);
        assert_eq!(parse_amount("-3"), None);
        assert_eq!(parse_amount(".50"), None);
        assert_eq!(format_amount(1250), "12.50");
        assert_eq!(format_amount(5), "0.05");
    }
}
