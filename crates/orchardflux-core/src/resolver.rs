// crates/orchardflux-core/src/resolver.rs

use std::collections::HashSet;

use chrono::{Datelike, Months, NaiveDate};

/// Lists the distinct locations covering `start..=end`, month by month.
///
/// The generator is called with the first day of every month touched by the
/// range. Locations keep the order in which they were first produced, so a
/// template without month placeholders collapses to a single entry. An
/// inverted range yields nothing.
pub fn resolve_locations<F, E>(
    start: NaiveDate,
    end: NaiveDate,
    sensor_id: Option<u32>,
    mut generator: F,
) -> Result<Vec<String>, E>
where
    F: FnMut(NaiveDate, Option<u32>) -> Result<String, E>,
{
    let mut locations = Vec::new();
    if end < start {
        return Ok(locations);
    }

    let mut seen = HashSet::new();
    let mut month = start.with_day(1).unwrap_or(start);
    while month <= end {
        let location = generator(month, sensor_id)?;
        if seen.insert(location.clone()) {
            locations.push(location);
        }
        match month.checked_add_months(Months::new(1)) {
            Some(next) => month = next,
            None => break,
        }
    }
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn single_day_touches_one_month() {
        let locations = resolve_locations(date(2022, 4, 30), date(2022, 4, 30), Some(6), |d, id| {
            Ok::<_, Infallible>(format!("{}-{:02}-{}", d.year(), d.month(), id.unwrap()))
        })
        .unwrap();
        assert_eq!(locations, ["2022-04-6"]);
    }
}
