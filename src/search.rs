use crate::{
    bits::BitField,
    calendar::{CalendarValue, Unit},
    error::CronError,
    field::FieldSet,
    Result,
};

/// Upper bound on single-day advances within one search pass.
const MAX_DAY_ADVANCES: u32 = 366;
/// Widest year span a month carry may cross before the search is declared
/// unsatisfiable (day 30 of February never converges, for example).
const MAX_YEAR_SPAN: i32 = 4;

/// Moves `cal` forward to the earliest instant at or after its current value
/// whose fields are all members of `fields`.
///
/// Ascending carry propagation, finest field first: each field is advanced to
/// its next member, wrapping into the next coarser unit when exhausted. Any
/// change restarts the pass from seconds, because a coarser advance re-opens
/// the search space of every finer field. Fields confirmed unchanged
/// accumulate into a reset list so that a later advance rewinds them to their
/// minimums, keeping the search monotonically forward.
pub(crate) fn next_match(fields: &FieldSet, cal: &mut CalendarValue, expression: &str) -> Result<()> {
    let base_year = cal.year();

    loop {
        let mut stable: Vec<Unit> = Vec::with_capacity(4);

        let second = cal.second();
        let found = advance_field(&fields.seconds, second, cal, Unit::Second, Unit::Minute, &[]);
        if found == second {
            stable.push(Unit::Second);
        }
        // A second wrap only bumps the minute; the minute step below notices.

        let minute = cal.minute();
        let found = advance_field(&fields.minutes, minute, cal, Unit::Minute, Unit::Hour, &stable);
        if found != minute {
            continue;
        }
        stable.push(Unit::Minute);

        let hour = cal.hour();
        let found = advance_field(&fields.hours, hour, cal, Unit::Hour, Unit::DayOfMonth, &stable);
        if found != hour {
            continue;
        }
        stable.push(Unit::Hour);

        let day = cal.day();
        let found = advance_day(fields, cal, &stable, expression)?;
        if found != day {
            continue;
        }
        stable.push(Unit::DayOfMonth);

        let month = cal.month();
        let found = advance_field(&fields.months, month, cal, Unit::Month, Unit::Year, &stable);
        if found != month {
            if cal.year() - base_year > MAX_YEAR_SPAN {
                return Err(CronError::RunawaySearch(expression.to_owned()));
            }
            continue;
        }

        return Ok(());
    }
}

/// Advances one field to its next member at or after `current`.
///
/// When no member remains, carries one unit into `carry_into`, rewinds the
/// field itself and continues from the set's minimum. On any change the
/// already-stable finer fields are rewound too.
fn advance_field(
    bits: &BitField,
    current: u8,
    cal: &mut CalendarValue,
    unit: Unit,
    carry_into: Unit,
    stable: &[Unit],
) -> u8 {
    let found = match bits.next_set(current) {
        Some(value) => value,
        None => {
            cal.add(carry_into, 1);
            cal.reset(&[unit]);
            bits.first_set().expect("parsed field set has at least one member")
        }
    };

    if found != current {
        cal.set(unit, found);
        cal.reset(stable);
    }

    found
}

/// Advances to the next day satisfying the combined day constraints.
///
/// Day-of-month and day-of-week are independent: when both fields are
/// restricted a day qualifies if either set matches it; an unrestricted field
/// has no filtering effect. Bounded at [`MAX_DAY_ADVANCES`] single-day steps
/// so an impossible day specification fails instead of walking forever.
fn advance_day(fields: &FieldSet, cal: &mut CalendarValue, stable: &[Unit], expression: &str) -> Result<u8> {
    let mut count = 0;

    while !day_matches(fields, cal) {
        if count >= MAX_DAY_ADVANCES {
            return Err(CronError::DayOverflow(expression.to_owned()));
        }
        cal.add(Unit::DayOfMonth, 1);
        cal.reset(stable);
        count += 1;
    }

    Ok(cal.day())
}

fn day_matches(fields: &FieldSet, cal: &CalendarValue) -> bool {
    let dom_hit = fields.days_of_month.test(cal.day());
    let dow_hit = fields.days_of_week.test(cal.day_of_week());

    if fields.dom_restricted && fields.dow_restricted {
        dom_hit || dow_hit
    } else {
        dom_hit && dow_hit
    }
}
