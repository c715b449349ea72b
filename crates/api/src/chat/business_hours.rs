//! Business-hours window used by the `business_hours` trigger

use time::macros::{format_description, time};
use time::{OffsetDateTime, Time, UtcOffset, Weekday};

use parley_shared::ChatError;

/// Weekday opening window in a fixed UTC offset.
///
/// Open Monday through Friday, from `open` (inclusive) to `close` (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open: Time,
    pub close: Time,
    pub utc_offset: UtcOffset,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: time!(9:00),
            close: time!(17:00),
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl BusinessHours {
    pub fn new(open: Time, close: Time, utc_offset: UtcOffset) -> Result<Self, ChatError> {
        if open >= close {
            return Err(ChatError::Validation(format!(
                "business hours must open before they close ({open} >= {close})"
            )));
        }
        Ok(Self {
            open,
            close,
            utc_offset,
        })
    }

    /// Parse a window like `09:00-17:00` and an offset like `+02:00`
    pub fn parse(window: &str, offset: &str) -> Result<Self, ChatError> {
        let (open, close) = window
            .split_once('-')
            .ok_or_else(|| ChatError::Validation(format!("invalid business hours: {window}")))?;

        let hhmm = format_description!("[hour]:[minute]");
        let open = Time::parse(open.trim(), hhmm)
            .map_err(|e| ChatError::Validation(format!("invalid opening time: {e}")))?;
        let close = Time::parse(close.trim(), hhmm)
            .map_err(|e| ChatError::Validation(format!("invalid closing time: {e}")))?;

        let utc_offset = UtcOffset::parse(
            offset.trim(),
            format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        )
        .map_err(|e| ChatError::Validation(format!("invalid UTC offset: {e}")))?;

        Self::new(open, close, utc_offset)
    }

    /// Whether `at` falls inside the window
    pub fn is_open_at(&self, at: OffsetDateTime) -> bool {
        let local = at.to_offset(self.utc_offset);
        let weekday = !matches!(local.weekday(), Weekday::Saturday | Weekday::Sunday);
        let time = local.time();
        weekday && time >= self.open && time < self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_default_is_nine_to_five_utc() {
        let hours = BusinessHours::default();
        // 2025-03-03 is a Monday
        assert!(!hours.is_open_at(datetime!(2025-03-03 08:59:59 UTC)));
        assert!(hours.is_open_at(datetime!(2025-03-03 09:00:00 UTC)));
        assert!(hours.is_open_at(datetime!(2025-03-03 16:59:59 UTC)));
        assert!(!hours.is_open_at(datetime!(2025-03-03 17:00:00 UTC)));
    }

    #[test]
    fn test_weekends_are_closed() {
        let hours = BusinessHours::default();
        assert!(!hours.is_open_at(datetime!(2025-03-08 12:00 UTC)));
        assert!(!hours.is_open_at(datetime!(2025-03-09 12:00 UTC)));
        assert!(hours.is_open_at(datetime!(2025-03-07 12:00 UTC)));
    }

    #[test]
    fn test_offset_is_applied_before_comparison() {
        let hours = BusinessHours::parse("09:00-17:00", "+02:00").unwrap();
        // 07:30 UTC is 09:30 local
        assert!(hours.is_open_at(datetime!(2025-03-03 07:30 UTC)));
        // 15:30 UTC is 17:30 local
        assert!(!hours.is_open_at(datetime!(2025-03-03 15:30 UTC)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(BusinessHours::parse("0900-1700", "+00:00").is_err());
        assert!(BusinessHours::parse("17:00-09:00", "+00:00").is_err());
        assert!(BusinessHours::parse("09:00-17:00", "UTC").is_err());
    }
}
