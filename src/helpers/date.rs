//! Date helper functions

use chrono::{DateTime, FixedOffset, Locale, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse a timestamp as sent by the content API.
///
/// The API emits offsets without a colon (`2021-03-15T19:25:28+0000`), so
/// plain RFC 3339 parsing is only the fallback.
pub fn parse_api_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

/// Formats dates for display in a configured locale and timezone
#[derive(Debug, Clone)]
pub struct DateFormatter {
    locale: Locale,
    timezone: Tz,
}

impl DateFormatter {
    /// Create a formatter; unknown locales fall back to `en_US`, unknown
    /// or empty timezones to UTC
    pub fn new(locale: &str, timezone: &str) -> Self {
        let locale = Locale::try_from(locale).unwrap_or_else(|_| {
            tracing::warn!("Unknown locale {:?}, using en_US", locale);
            Locale::en_US
        });
        let timezone = if timezone.is_empty() {
            Tz::UTC
        } else {
            timezone.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!("Unknown timezone {:?}, using UTC", timezone);
                Tz::UTC
            })
        };
        Self { locale, timezone }
    }

    /// Format a date using a Moment.js-compatible format string
    ///
    /// # Examples
    /// ```ignore
    /// formatter.format(&date, "DD MMM YYYY") // -> "15 mar 2021"
    /// ```
    pub fn format<Z: TimeZone>(&self, date: &DateTime<Z>, format: &str) -> String {
        let chrono_format = moment_to_chrono_format(format);
        date.with_timezone(&self.timezone)
            .format_localized(&chrono_format, self.locale)
            .to_string()
    }

    /// Parse and format an API timestamp; `None` when it is absent or invalid
    pub fn format_api_date(&self, value: Option<&str>, format: &str) -> Option<String> {
        value
            .and_then(parse_api_date)
            .map(|date| self.format(&date, format))
    }
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self {
            locale: Locale::en_US,
            timezone: Tz::UTC,
        }
    }
}

/// Format a date in ISO 8601 / XML format
pub fn date_xml<Z: TimeZone>(date: &DateTime<Z>) -> String {
    date.with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Convert Moment.js format to chrono format
fn moment_to_chrono_format(format: &str) -> String {
    // Longest tokens first within each category
    let replacements = [
        // Year
        ("YYYY", "%Y"),
        ("YY", "%y"),
        // Month (uppercase M)
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        // Day of month
        ("DDDD", "%j"),
        ("DD", "%d"),
        // Hour 24h
        ("HH", "%H"),
        // Hour 12h
        ("hh", "%I"),
        // Minute (after MM is gone)
        ("mm", "%M"),
        // Second
        ("ss", "%S"),
        // Day of week
        ("dddd", "%A"),
        ("ddd", "%a"),
        // Timezone
        ("ZZ", "%z"),
    ];

    let mut result = format.to_string();

    for (from, to) in replacements {
        result = result.replace(from, to);
    }

    result
}
