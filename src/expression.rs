use crate::{
    calendar::{CalendarValue, Unit},
    field::FieldSet,
    search, CronError, Result,
};
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use std::{fmt::Display, str::FromStr};

/// A parsed six-field cron expression bound to a fixed UTC offset.
///
/// Field order is second, minute, hour, day-of-month, month, day-of-week.
/// The instance is immutable after [`new()`](CronExpression::new) succeeds and
/// holds no interior state, so it can be queried from multiple threads
/// concurrently; every [`next()`](CronExpression::next) call works on its own
/// private calendar decomposition.
///
/// For the expression format and usage examples, please refer to the
/// [crate documentation](crate).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "CronExpressionSource"))]
#[cfg_attr(feature = "serde", serde(into = "CronExpressionSource"))]
pub struct CronExpression {
    expression: String,
    offset: FixedOffset,
    fields: FieldSet,
}

impl CronExpression {
    /// Parses and validates `expression`, binding it to `offset`.
    ///
    /// All firing times are evaluated against the wall clock of that offset.
    /// Returns [`CronError`] when the expression is unparsable; a failed parse
    /// is permanent for the expression text, nothing is retried.
    pub fn new(expression: impl Into<String>, offset: FixedOffset) -> Result<Self> {
        let expression = expression.into();
        let fields = FieldSet::parse(&expression)?;

        Ok(Self {
            expression,
            offset,
            fields,
        })
    }

    /// Computes the earliest firing instant strictly after `after`.
    ///
    /// The result is expressed in the expression's offset; `after` may carry
    /// any timezone and is converted first. Sub-second precision of `after`
    /// is truncated before the search, the returned instant is always a whole
    /// second.
    ///
    /// Returns [`CronError::DayOverflow`] or [`CronError::RunawaySearch`] when
    /// the expression can never fire (such as February 30th); the cause does
    /// not change between calls, so callers may treat either as fatal for
    /// this expression.
    pub fn next<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<DateTime<FixedOffset>> {
        let mut cal = CalendarValue::from_datetime(after, self.offset);
        let start = cal;

        search::next_match(&self.fields, &mut cal, &self.expression)?;
        if cal == start {
            cal.add(Unit::Second, 1);
            search::next_match(&self.fields, &mut cal, &self.expression)?;
        }

        Ok(cal.to_datetime())
    }

    /// The same as [`next()`](CronExpression::next) starting from the current
    /// system time.
    #[inline]
    pub fn next_from_now(&self) -> Result<DateTime<FixedOffset>> {
        self.next(&Utc::now())
    }

    /// Returns an iterator of consecutive firing instants strictly after
    /// `after`.
    ///
    /// The iterator ends when no further firing time can be computed, so it
    /// is empty for expressions that never fire.
    #[inline]
    pub fn iter<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> impl Iterator<Item = DateTime<FixedOffset>> {
        ExpressionIterator {
            expression: self.clone(),
            next: self.next(after).ok(),
        }
    }

    /// Consumes the [`CronExpression`] and returns an iterator of consecutive
    /// firing instants strictly after `after`.
    #[inline]
    pub fn into_iter<Tz: TimeZone>(self, after: &DateTime<Tz>) -> impl Iterator<Item = DateTime<FixedOffset>> {
        let next = self.next(after).ok();
        ExpressionIterator { expression: self, next }
    }

    /// Original expression text.
    #[inline]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// UTC offset the firing times are evaluated in.
    #[inline]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Contains iterator state.
#[derive(Debug, Clone)]
pub(crate) struct ExpressionIterator {
    pub(crate) expression: CronExpression,
    pub(crate) next: Option<DateTime<FixedOffset>>,
}

impl Iterator for ExpressionIterator {
    type Item = DateTime<FixedOffset>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = self.expression.next(&current).ok();
        Some(current)
    }
}

impl Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl From<CronExpression> for String {
    fn from(value: CronExpression) -> Self {
        value.expression
    }
}

impl TryFrom<String> for CronExpression {
    type Error = CronError;

    /// Parses with the UTC offset; use [`CronExpression::new`] for others.
    fn try_from(value: String) -> Result<Self> {
        Self::new(value, Utc.fix())
    }
}

impl TryFrom<&str> for CronExpression {
    type Error = CronError;

    /// Parses with the UTC offset; use [`CronExpression::new`] for others.
    fn try_from(value: &str) -> Result<Self> {
        Self::new(value, Utc.fix())
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    /// Parses with the UTC offset; use [`CronExpression::new`] for others.
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s, Utc.fix())
    }
}

/// Serialized shape: the source text plus the offset in seconds east of UTC.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct CronExpressionSource {
    expression: String,
    utc_offset: i32,
}

#[cfg(feature = "serde")]
impl TryFrom<CronExpressionSource> for CronExpression {
    type Error = CronError;

    fn try_from(value: CronExpressionSource) -> Result<Self> {
        let offset = FixedOffset::east_opt(value.utc_offset).ok_or(CronError::InvalidOffset(value.utc_offset))?;
        Self::new(value.expression, offset)
    }
}

#[cfg(feature = "serde")]
impl From<CronExpression> for CronExpressionSource {
    fn from(value: CronExpression) -> Self {
        Self {
            utc_offset: value.offset.local_minus_utc(),
            expression: value.expression,
        }
    }
}
