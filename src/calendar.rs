use crate::utils;
use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike};

/// Calendar components addressable by the search, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Unit {
    Year,
    Month,
    DayOfMonth,
    Hour,
    Minute,
    Second,
}

/// Raw, possibly out-of-range field values as produced by blind arithmetic.
///
/// `month` is 0-based (0 = January), `day` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawFields {
    pub(crate) year: i64,
    pub(crate) month: i64,
    pub(crate) day: i64,
    pub(crate) hour: i64,
    pub(crate) minute: i64,
    pub(crate) second: i64,
}

/// Re-derives the canonical decomposition from arbitrary field values.
///
/// Rollover in any direction is resolved by carrying into the next coarser
/// field: second 120 becomes minute +2, month 13 becomes month 1 of the next
/// year, day 0 becomes the last day of the previous month. Idempotent.
pub(crate) fn normalize(mut raw: RawFields) -> RawFields {
    raw.minute += raw.second.div_euclid(60);
    raw.second = raw.second.rem_euclid(60);
    raw.hour += raw.minute.div_euclid(60);
    raw.minute = raw.minute.rem_euclid(60);
    raw.day += raw.hour.div_euclid(24);
    raw.hour = raw.hour.rem_euclid(24);
    raw.year += raw.month.div_euclid(12);
    raw.month = raw.month.rem_euclid(12);

    while raw.day < 1 {
        raw.month -= 1;
        if raw.month < 0 {
            raw.month = 11;
            raw.year -= 1;
        }
        raw.day += i64::from(utils::days_in_month(raw.year as i32, raw.month as u8 + 1));
    }

    loop {
        let in_month = i64::from(utils::days_in_month(raw.year as i32, raw.month as u8 + 1));
        if raw.day <= in_month {
            break;
        }
        raw.day -= in_month;
        raw.month += 1;
        if raw.month > 11 {
            raw.month = 0;
            raw.year += 1;
        }
    }

    raw
}

/// Working decomposition of an instant into calendar fields in a fixed offset.
///
/// Always canonical between mutations: `set`, `add` and `reset` renormalize
/// before returning, so readers never observe an out-of-range field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CalendarValue {
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    offset: FixedOffset,
}

impl CalendarValue {
    /// Decomposes `instant` in the given offset, truncating sub-second precision.
    pub(crate) fn from_datetime<Tz: TimeZone>(instant: &DateTime<Tz>, offset: FixedOffset) -> Self {
        let local = instant.with_timezone(&offset);

        Self {
            year: local.year(),
            month: (local.month() - 1) as u8,
            day: local.day() as u8,
            hour: local.hour() as u8,
            minute: local.minute() as u8,
            second: local.second() as u8,
            offset,
        }
    }

    pub(crate) fn to_datetime(&self) -> DateTime<FixedOffset> {
        self.offset
            .with_ymd_and_hms(
                self.year,
                u32::from(self.month) + 1,
                u32::from(self.day),
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
            .unwrap()
    }

    #[inline]
    pub(crate) fn year(&self) -> i32 {
        self.year
    }

    #[inline]
    pub(crate) fn month(&self) -> u8 {
        self.month
    }

    #[inline]
    pub(crate) fn day(&self) -> u8 {
        self.day
    }

    #[inline]
    pub(crate) fn hour(&self) -> u8 {
        self.hour
    }

    #[inline]
    pub(crate) fn minute(&self) -> u8 {
        self.minute
    }

    #[inline]
    pub(crate) fn second(&self) -> u8 {
        self.second
    }

    /// Day of week of the current date, with Sunday = 0.
    #[inline]
    pub(crate) fn day_of_week(&self) -> u8 {
        utils::day_of_week(self.year, self.month + 1, self.day)
    }

    pub(crate) fn set(&mut self, unit: Unit, value: u8) {
        let mut raw = self.raw();
        match unit {
            Unit::Year => raw.year = i64::from(value),
            Unit::Month => raw.month = i64::from(value),
            Unit::DayOfMonth => raw.day = i64::from(value),
            Unit::Hour => raw.hour = i64::from(value),
            Unit::Minute => raw.minute = i64::from(value),
            Unit::Second => raw.second = i64::from(value),
        }
        self.apply(raw);
    }

    pub(crate) fn add(&mut self, unit: Unit, amount: i64) {
        let mut raw = self.raw();
        match unit {
            Unit::Year => raw.year += amount,
            Unit::Month => raw.month += amount,
            Unit::DayOfMonth => raw.day += amount,
            Unit::Hour => raw.hour += amount,
            Unit::Minute => raw.minute += amount,
            Unit::Second => raw.second += amount,
        }
        self.apply(raw);
    }

    /// Rewinds every listed unit to its minimum valid value (day to 1, the
    /// rest to 0), so the search never revisits an earlier instant after a
    /// coarser field advanced.
    pub(crate) fn reset(&mut self, units: &[Unit]) {
        for unit in units {
            let floor = if *unit == Unit::DayOfMonth { 1 } else { 0 };
            self.set(*unit, floor);
        }
    }

    #[inline]
    fn raw(&self) -> RawFields {
        RawFields {
            year: i64::from(self.year),
            month: i64::from(self.month),
            day: i64::from(self.day),
            hour: i64::from(self.hour),
            minute: i64::from(self.minute),
            second: i64::from(self.second),
        }
    }

    #[inline]
    fn apply(&mut self, raw: RawFields) {
        let raw = normalize(raw);
        self.year = raw.year as i32;
        self.month = raw.month as u8;
        self.day = raw.day as u8;
        self.hour = raw.hour as u8;
        self.minute = raw.minute as u8;
        self.second = raw.second as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw(year: i64, month: i64, day: i64, hour: i64, minute: i64, second: i64) -> RawFields {
        RawFields {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    #[rstest]
    // Already canonical
    #[case(raw(2024, 0, 1, 0, 0, 0), raw(2024, 0, 1, 0, 0, 0))]
    #[case(raw(2024, 11, 31, 23, 59, 59), raw(2024, 11, 31, 23, 59, 59))]
    // Second and minute carry
    #[case(raw(2024, 0, 1, 0, 0, 120), raw(2024, 0, 1, 0, 2, 0))]
    #[case(raw(2024, 0, 1, 0, 59, 61), raw(2024, 0, 1, 1, 0, 1))]
    // Hour 24 rolls into the next day
    #[case(raw(2024, 0, 1, 24, 0, 0), raw(2024, 0, 2, 0, 0, 0))]
    // Month 12 (0-based) rolls into the next year
    #[case(raw(2024, 12, 1, 0, 0, 0), raw(2025, 0, 1, 0, 0, 0))]
    #[case(raw(2024, 25, 1, 0, 0, 0), raw(2026, 1, 1, 0, 0, 0))]
    // Day 32 of April becomes May 2
    #[case(raw(2024, 3, 32, 0, 0, 0), raw(2024, 4, 2, 0, 0, 0))]
    // February rollover respects leap years
    #[case(raw(2024, 1, 30, 0, 0, 0), raw(2024, 2, 1, 0, 0, 0))]
    #[case(raw(2023, 1, 30, 0, 0, 0), raw(2023, 2, 2, 0, 0, 0))]
    // End of year
    #[case(raw(2024, 11, 32, 0, 0, 0), raw(2025, 0, 1, 0, 0, 0))]
    // Day 0 is the last day of the previous month
    #[case(raw(2024, 2, 0, 0, 0, 0), raw(2024, 1, 29, 0, 0, 0))]
    // Negative second borrows across the year boundary
    #[case(raw(2024, 0, 1, 0, 0, -1), raw(2023, 11, 31, 23, 59, 59))]
    fn test_normalize(#[case] input: RawFields, #[case] expected: RawFields) {
        assert_eq!(normalize(input), expected);

        // Idempotence
        assert_eq!(normalize(normalize(input)), normalize(input));
    }

    #[test]
    fn datetime_round_trip() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let instant = DateTime::parse_from_rfc3339("2024-02-29T23:59:59+02:00").unwrap();

        let cal = CalendarValue::from_datetime(&instant, offset);
        assert_eq!(cal.year(), 2024);
        assert_eq!(cal.month(), 1);
        assert_eq!(cal.day(), 29);
        assert_eq!(cal.to_datetime(), instant);
    }

    #[test]
    fn from_datetime_converts_into_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let instant = DateTime::parse_from_rfc3339("2024-01-01T22:30:00Z").unwrap();

        let cal = CalendarValue::from_datetime(&instant, offset);
        assert_eq!(cal.day(), 2);
        assert_eq!(cal.hour(), 1);
        assert_eq!(cal.minute(), 30);
        // Same absolute instant regardless of representation
        assert_eq!(cal.to_datetime(), instant);
    }

    #[test]
    fn from_datetime_truncates_nanoseconds() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let instant = DateTime::parse_from_rfc3339("2024-01-01T00:00:30.750Z").unwrap();

        let cal = CalendarValue::from_datetime(&instant, offset);
        assert_eq!(cal.second(), 30);
        assert_eq!(cal.to_datetime().timestamp(), instant.timestamp());
    }

    #[test]
    fn add_carries_through_month_end() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let instant = DateTime::parse_from_rfc3339("2012-09-30T23:59:59Z").unwrap();
        let mut cal = CalendarValue::from_datetime(&instant, offset);

        cal.add(Unit::Second, 1);
        assert_eq!(cal.month(), 9);
        assert_eq!(cal.day(), 1);
        assert_eq!(cal.hour(), 0);
        assert_eq!(cal.second(), 0);
    }

    #[test]
    fn set_out_of_range_value_normalizes() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let instant = DateTime::parse_from_rfc3339("2024-01-31T12:00:00Z").unwrap();
        let mut cal = CalendarValue::from_datetime(&instant, offset);

        // Moving January 31 into February rolls over to March 2 (leap year)
        cal.set(Unit::Month, 1);
        assert_eq!(cal.month(), 2);
        assert_eq!(cal.day(), 2);
    }

    #[test]
    fn reset_rewinds_to_field_minimums() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let instant = DateTime::parse_from_rfc3339("2024-05-17T13:42:21Z").unwrap();
        let mut cal = CalendarValue::from_datetime(&instant, offset);

        cal.reset(&[Unit::Second, Unit::Minute, Unit::Hour, Unit::DayOfMonth]);
        assert_eq!(cal.day(), 1);
        assert_eq!(cal.hour(), 0);
        assert_eq!(cal.minute(), 0);
        assert_eq!(cal.second(), 0);
        assert_eq!(cal.month(), 4);
    }

    #[rstest]
    #[case("2024-01-01T00:00:00Z", 1)] // Monday
    #[case("2023-01-01T00:00:00Z", 0)] // Sunday
    #[case("2009-09-26T00:42:55Z", 6)] // Saturday
    #[case("2012-10-11T15:12:42Z", 4)] // Thursday
    fn test_day_of_week(#[case] instant: &str, #[case] expected: u8) {
        let offset = FixedOffset::east_opt(0).unwrap();
        let instant = DateTime::parse_from_rfc3339(instant).unwrap();

        let cal = CalendarValue::from_datetime(&instant, offset);
        assert_eq!(cal.day_of_week(), expected);
    }
}
