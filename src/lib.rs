//! Six-field cron expression parser and next execution time calculator.
#![deny(unsafe_code, warnings, missing_docs)]

//! This is a small crate, intended to:
//! - parse six-field cron schedule expressions into per-field membership sets;
//! - compute the earliest instant strictly after a given reference time at
//!   which the expression fires.
//!
//! It is a pure calendar-arithmetic engine: no I/O, no background state in the
//! core, deterministic results. The only required external dependencies are
//! [chrono](https://crates.io/crates/chrono) and
//! [thiserror](https://crates.io/crates/thiserror).
//!
//! ## Cron expression format
//!
//! An expression is a list of six single-space-separated fields, in order:
//! second, minute, hour, day of month, month, day of week.
//!
//! | Field        | Allowed values  | Allowed special characters |
//! |--------------|-----------------|----------------------------|
//! | Second       | 0-59            | * , - /                    |
//! | Minute       | 0-59            | * , - /                    |
//! | Hour         | 0-23            | * , - /                    |
//! | Day of Month | 1-31            | * , - / ?                  |
//! | Month        | 1-12 or JAN-DEC | * , - /                    |
//! | Day of Week  | 0-7 or SUN-SAT  | * , - / ?                  |
//!
//! Patterns meanings:
//! - `*` - each possible value, i.e. `0,1,2,...,59` for minutes;
//! - `,` - list of values or patterns, i.e. `1,7,12`, `SUN,FRI`;
//! - `-` - range of values, i.e. `0-15`, `JAN-MAR`;
//! - `/` - repeating values, i.e. `*/12`, `10/5`, `30-59/2`;
//! - `?` - for days of month or week, the same as `*`.
//!
//! Month and weekday names are the case-insensitive first three letters of the
//! English names. Sunday can be written as `0` or `7`.
//!
//! When both day fields are restricted (neither is `*` nor `?`), a day
//! qualifies if *either* of them matches, per the usual cron convention;
//! otherwise the single restricted field filters alone.
//!
//! Example expressions:
//! - `0 0 * * * *` - the top of every hour of every day;
//! - `*/10 * * * * *` - every ten seconds;
//! - `0 0 8-10 * * *` - 8, 9 and 10 o'clock of every day;
//! - `0 0/30 8-10 * * *` - 8:00, 8:30, 9:00, 9:30, 10:00 and 10:30 every day;
//! - `0 0 9-17 * * MON-FRI` - on the hour nine-to-five weekdays;
//! - `0 0 0 25 12 ?` - every Christmas Day at midnight.
//!
//! ## How to use
//!
//! The single public entity of the crate is the [`CronExpression`] structure:
//! - [new()](CronExpression::new): parses and validates the expression,
//!   binding it to a fixed UTC offset its firing times are evaluated in;
//! - [next()](CronExpression::next): returns the firing time strictly after
//!   the provided timestamp;
//! - [iter()](CronExpression::iter): returns an `Iterator` producing the
//!   series of consecutive firing times.
//!
//! A parsed expression is immutable and can be shared and queried from many
//! threads at once.
//!
//! ### Example with `next`
//! ```rust
//! use chrono::{Offset, Utc};
//! use cron_next::{CronExpression, Result};
//!
//! fn next() -> Result<()> {
//!     let cron = CronExpression::new("0 0 0 * * *", Utc.fix())?;
//!
//!     // Next midnight strictly after now
//!     let next = cron.next(&Utc::now())?;
//!     println!("next: {next}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Example with `iter`
//! ```rust
//! use chrono::{Offset, Utc};
//! use cron_next::{CronExpression, Result};
//!
//! fn iterator() -> Result<()> {
//!     let cron = CronExpression::new("0 0 0 * * *", Utc.fix())?;
//!
//!     // The next 10 firing times starting from now
//!     cron.iter(&Utc::now()).take(10).for_each(|t| println!("next: {t}"));
//!
//!     Ok(())
//! }
//! ```
//!
//! Expressions that can never fire, such as `0 0 0 30 2 *` (February 30th),
//! parse successfully but every [`next()`](CronExpression::next) call on them
//! returns a bounded search error instead of looping forever.
//!
//! # Feature flags
//! * `async`: adds the `delay()`, `ticker()` and `run()` primitives for
//!   waiting on firing times asynchronously.
//! * `serde`: adds [`Serialize`](https://docs.rs/serde/latest/serde/trait.Serialize.html)
//!   and [`Deserialize`](https://docs.rs/serde/latest/serde/trait.Deserialize.html)
//!   trait implementation for [`CronExpression`].

/// Primitives related to async waiting on cron firing times.
#[cfg(feature = "async")]
pub mod asynchronous;
mod bits;
mod calendar;
/// Crate specific Error implementation.
pub mod error;
/// Cron expression parser and firing time calculator.
pub mod expression;
mod field;
mod search;
mod utils;

// Re-export of public entities.
#[cfg(feature = "async")]
pub use asynchronous::CronDelay;
#[cfg(feature = "async")]
pub use asynchronous::CronEvent;
#[cfg(feature = "async")]
pub use asynchronous::CronTicker;
#[cfg(feature = "async")]
pub use asynchronous::RunOptions;

pub use error::CronError;
pub use expression::CronExpression;

/// Convenient alias for `Result`.
pub type Result<T, E = CronError> = std::result::Result<T, E>;
