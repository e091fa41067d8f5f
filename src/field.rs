use crate::{bits::BitField, error::CronError, Result};

/// One of the six expression fields, with its parse-time domain and names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FieldKind {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    const DAYS_OF_WEEK: [&'static str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
    const MONTHS: [&'static str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];

    /// Inclusive parse-time bounds.
    ///
    /// Day-of-month accepts 0 here (cleared after construction), months are
    /// parsed 1-based, and day-of-week accepts 7 as an alias for Sunday.
    fn bounds(self) -> (u16, u16) {
        match self {
            Self::Second | Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (0, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 7),
        }
    }

    fn domain_size(self) -> u8 {
        let (_, max) = self.bounds();
        max as u8 + 1
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            Self::Month => &Self::MONTHS,
            Self::DayOfWeek => &Self::DAYS_OF_WEEK,
            _ => &[],
        }
    }

    /// Ordinal of the first name in `names()`.
    fn name_base(self) -> u16 {
        match self {
            Self::Month => 1,
            _ => 0,
        }
    }

    /// Parses a single atomic value, numeric first, then by name abbreviation.
    ///
    /// Name matching covers whole tokens only, so `SUN` inside a longer token
    /// never substitutes. Bounds are checked later, once both range endpoints
    /// are known.
    fn parse_value(self, token: &str, expression: &str) -> Result<u16> {
        if let Ok(value) = token.parse::<u16>() {
            return Ok(value);
        }

        if let Some(index) = self.names().iter().position(|name| name.eq_ignore_ascii_case(token)) {
            return Ok(index as u16 + self.name_base());
        }

        Err(CronError::NumberFormat {
            field: token.to_owned(),
            expression: expression.to_owned(),
        })
    }
}

/// Per-field membership sets compiled from a six-field cron expression.
///
/// Immutable after construction. Domains at runtime: seconds and minutes
/// [0,59], hours [0,23], day-of-month [1,31] (index 0 kept cleared), months
/// [0,11], day-of-week [0,6] with Sunday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FieldSet {
    pub(crate) seconds: BitField,
    pub(crate) minutes: BitField,
    pub(crate) hours: BitField,
    pub(crate) days_of_month: BitField,
    pub(crate) months: BitField,
    pub(crate) days_of_week: BitField,
    /// `false` iff the day-of-month field was written as `*` or `?`.
    pub(crate) dom_restricted: bool,
    /// `false` iff the day-of-week field was written as `*` or `?`.
    pub(crate) dow_restricted: bool,
}

impl FieldSet {
    /// Compiles the six whitespace-separated fields of `expression`.
    pub(crate) fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(CronError::FieldCount {
                found: fields.len(),
                expression: expression.to_owned(),
            });
        }

        let seconds = fill_field(FieldKind::Second, fields[0], expression)?;
        let minutes = fill_field(FieldKind::Minute, fields[1], expression)?;
        let hours = fill_field(FieldKind::Hour, fields[2], expression)?;

        // `?` means "any" and is accepted for both day fields.
        let dom_text = if fields[3].contains('?') { "*" } else { fields[3] };
        let mut days_of_month = fill_field(FieldKind::DayOfMonth, dom_text, expression)?;
        // Index 0 is not a valid day; the 0-based builder may have set it.
        days_of_month.clear(0);

        // Months are parsed against the 1-based domain, then shifted down.
        let month_builder = fill_field(FieldKind::Month, fields[4], expression)?;
        let mut months = BitField::new(12);
        for month in 1..=12u8 {
            if month_builder.test(month) {
                months.set(month - 1);
            }
        }

        let dow_text = if fields[5].contains('?') { "*" } else { fields[5] };
        let dow_builder = fill_field(FieldKind::DayOfWeek, dow_text, expression)?;
        let mut days_of_week = BitField::new(7);
        for dow in 0..=6u8 {
            if dow_builder.test(dow) {
                days_of_week.set(dow);
            }
        }
        // Sunday can be written as 0 or 7.
        if dow_builder.test(7) {
            days_of_week.set(0);
        }

        Ok(Self {
            seconds,
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: dom_text != "*",
            dow_restricted: dow_text != "*",
        })
    }
}

/// Builds the membership set of one field from its comma-separated items.
fn fill_field(kind: FieldKind, text: &str, expression: &str) -> Result<BitField> {
    let mut bits = BitField::new(kind.domain_size());
    let (_, max) = kind.bounds();

    for item in text.split(',') {
        match item.split_once('/') {
            None => {
                let (low, high) = parse_range(kind, item, expression)?;
                bits.set_range(low as u8, high as u8);
            }
            Some((base, delta)) => {
                if delta.contains('/') {
                    return Err(CronError::MalformedStep {
                        field: item.to_owned(),
                        expression: expression.to_owned(),
                    });
                }

                let (low, mut high) = parse_range(kind, base, expression)?;
                // A plain-value base steps through the rest of the domain.
                if !base.contains('-') {
                    high = max;
                }

                let delta = delta.parse::<i64>().map_err(|_| CronError::NumberFormat {
                    field: item.to_owned(),
                    expression: expression.to_owned(),
                })?;
                if delta <= 0 {
                    return Err(CronError::InvalidStep {
                        field: item.to_owned(),
                        expression: expression.to_owned(),
                    });
                }

                let mut value = i64::from(low);
                while value <= i64::from(high) {
                    bits.set(value as u8);
                    value += delta;
                }
            }
        }
    }

    Ok(bits)
}

/// Resolves one item into an inclusive `(low, high)` pair with bounds checked.
fn parse_range(kind: FieldKind, text: &str, expression: &str) -> Result<(u16, u16)> {
    let (min, max) = kind.bounds();

    if text.contains('*') {
        return Ok((min, max));
    }

    let (low, high) = match text.split_once('-') {
        None => {
            let value = kind.parse_value(text, expression)?;
            (value, value)
        }
        Some((start, end)) => {
            if end.contains('-') {
                return Err(CronError::MalformedRange {
                    field: text.to_owned(),
                    expression: expression.to_owned(),
                });
            }
            (kind.parse_value(start, expression)?, kind.parse_value(end, expression)?)
        }
    };

    if low < min || low > max || high < min || high > max {
        return Err(CronError::RangeBounds {
            field: text.to_owned(),
            min,
            max,
            expression: expression.to_owned(),
        });
    }
    if low > high {
        return Err(CronError::InvertedRange {
            field: text.to_owned(),
            expression: expression.to_owned(),
        });
    }

    Ok((low, high))
}
