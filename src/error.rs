use thiserror::Error;

/// Crate specific Errors implementation.
///
/// Every variant carries the offending field text and/or the full source
/// expression, so callers can render diagnostics without extra context.
#[derive(Debug, Error, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CronError {
    /// Expression doesn't consist of exactly six fields.
    #[error("cron expression must consist of 6 fields (found {found} in \"{expression}\")")]
    FieldCount {
        /// Number of fields actually found.
        found: usize,
        /// Full source expression.
        expression: String,
    },
    /// Non-numeric token where an integer or name abbreviation is expected.
    #[error("invalid number '{field}' in expression \"{expression}\"")]
    NumberFormat {
        /// Offending field text.
        field: String,
        /// Full source expression.
        expression: String,
    },
    /// Range with more than two `-`-separated components.
    #[error("range has more than two fields: '{field}' in expression \"{expression}\"")]
    MalformedRange {
        /// Offending field text.
        field: String,
        /// Full source expression.
        expression: String,
    },
    /// Step with more than two `/`-separated components.
    #[error("incrementer has more than two fields: '{field}' in expression \"{expression}\"")]
    MalformedStep {
        /// Offending field text.
        field: String,
        /// Full source expression.
        expression: String,
    },
    /// Range endpoint or single value outside the field's permitted domain.
    #[error("value out of range ({min}-{max}): '{field}' in expression \"{expression}\"")]
    RangeBounds {
        /// Offending field text.
        field: String,
        /// Lowest permitted value.
        min: u16,
        /// Highest permitted value.
        max: u16,
        /// Full source expression.
        expression: String,
    },
    /// Range with `low > high`.
    #[error("invalid inverted range: '{field}' in expression \"{expression}\"")]
    InvertedRange {
        /// Offending field text.
        field: String,
        /// Full source expression.
        expression: String,
    },
    /// Step delta that is zero or negative.
    #[error("incrementer delta must be 1 or higher: '{field}' in expression \"{expression}\"")]
    InvalidStep {
        /// Offending field text.
        field: String,
        /// Full source expression.
        expression: String,
    },
    /// Day search exceeded 366 advances without a matching day.
    #[error("overflow in day for expression \"{0}\"")]
    DayOverflow(String),
    /// Month carry search spanned more than 4 years without converging.
    #[error("invalid cron expression \"{0}\" led to runaway search for next trigger")]
    RunawaySearch(String),
    /// UTC offset outside `-86_400..86_400` seconds.
    #[error("invalid UTC offset in seconds: {0}")]
    InvalidOffset(i32),
}
