use chrono::NaiveDateTime;

use super::classify::ClassificationState;
use super::error::DropReason;
use crate::model::{FlightOffer, SearchContext};

const SECONDS_PER_DAY: i64 = 86_400;

/// Turn a classified segment into a finished offer.
///
/// Departure, arrival, route, stop count and travel time are required. A
/// value that a rule claimed but failed to parse is reported in preference
/// to the generic missing-field reason, since it explains the gap.
pub fn assemble(
    state: ClassificationState,
    ctx: &SearchContext,
    accessed_at: NaiveDateTime,
) -> Result<FlightOffer, DropReason> {
    if let Some(failure) = state.failures.first() {
        return Err(failure.clone());
    }

    let departure = state.departure.into_inner().ok_or(DropReason::MissingSlot("departure"))?;
    let arrival = state.arrival.into_inner().ok_or(DropReason::MissingSlot("arrival"))?;
    let origin = state.origin.into_inner().ok_or(DropReason::MissingSlot("origin"))?;
    let destination = state
        .destination
        .into_inner()
        .ok_or(DropReason::MissingSlot("destination"))?;
    let stop_count = state.stop_count.into_inner().ok_or(DropReason::MissingSlot("stop_count"))?;
    let travel_minutes = state
        .travel_minutes
        .into_inner()
        .ok_or(DropReason::MissingSlot("travel_duration"))?;

    let layover_minutes = match stop_count {
        0 => None,
        _ => state.layover_minutes.into_inner().flatten(),
    };

    Ok(FlightOffer {
        departure,
        arrival,
        airlines: state.airlines.into_inner().unwrap_or_default(),
        travel_minutes,
        origin,
        destination,
        stop_count,
        layover_minutes,
        layover_locations: state.layover_locations.into_inner().unwrap_or_default(),
        price: state.price.into_inner(),
        price_trend: ctx.price_trend,
        accessed_at,
        round_trip: ctx.round_trip,
        has_train: state.has_train,
        days_in_advance: days_between(accessed_at, departure),
    })
}

/// Whole days from `from` to `to`, floored, so a departure earlier than the
/// access time comes out negative.
fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PriceTrend, Trend};
    use crate::parser::classify::classify_segment;
    use chrono::NaiveDate;

    fn ctx() -> SearchContext {
        SearchContext::one_way("MUC", "FCO", NaiveDate::from_ymd_opt(2024, 3, 25).unwrap())
            .with_price_trend(PriceTrend { trend: Trend::Low, amount: Some(40) })
    }

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn state(v: &[&str]) -> ClassificationState {
        let tokens: Vec<String> = v.iter().map(|s| s.to_string()).collect();
        classify_segment(&tokens, &ctx()).unwrap()
    }

    #[test]
    fn full_record() {
        let s = state(&["10:30AM", "1:45PM", "2 hr 15 min", "Nonstop", "129", "MUCFCO", "Lufthansa"]);
        let offer = assemble(s, &ctx(), ts(20, 9, 0)).unwrap();
        assert_eq!(offer.departure, ts(25, 10, 30));
        assert_eq!(offer.arrival, ts(25, 13, 45));
        assert_eq!(offer.travel_minutes, 135);
        assert_eq!(offer.stop_count, 0);
        assert_eq!(offer.layover_minutes, None);
        assert_eq!(offer.price, Some(129));
        assert_eq!(offer.price_trend.amount, Some(40));
        assert_eq!(offer.days_in_advance, 5);
        assert!(!offer.round_trip);
        assert!(!offer.has_train);
    }

    #[test]
    fn missing_stop_count_drops() {
        let s = state(&["10:30AM", "1:45PM", "2 hr 15 min", "129", "MUCFCO", "Lufthansa"]);
        assert_eq!(
            assemble(s, &ctx(), ts(20, 9, 0)),
            Err(DropReason::MissingSlot("stop_count"))
        );
    }

    #[test]
    fn missing_time_drops() {
        let s = state(&["10:30AM", "2 hr 15 min", "Nonstop", "129", "MUCFCO", "Lufthansa"]);
        assert_eq!(
            assemble(s, &ctx(), ts(20, 9, 0)),
            Err(DropReason::MissingSlot("departure"))
        );
    }

    #[test]
    fn parse_failure_wins_over_missing() {
        let s = state(&["10:30AM", "1:99PM", "2 hr 15 min", "Nonstop", "129", "MUCFCO", "Lufthansa"]);
        assert_eq!(
            assemble(s, &ctx(), ts(20, 9, 0)),
            Err(DropReason::UnparseableTime("1:99PM".into()))
        );
    }

    #[test]
    fn price_is_optional() {
        let s = state(&["10:30AM", "1:45PM", "2 hr 15 min", "Nonstop", "MUCFCO", "Lufthansa"]);
        assert_eq!(assemble(s, &ctx(), ts(20, 9, 0)).unwrap().price, None);
    }

    #[test]
    fn negative_days_in_advance_kept() {
        let s = state(&["10:30AM", "1:45PM", "2 hr 15 min", "Nonstop", "129", "MUCFCO", "Lufthansa"]);
        let offer = assemble(s, &ctx(), ts(26, 9, 0)).unwrap();
        assert_eq!(offer.days_in_advance, -1);
    }

    #[test]
    fn same_day_departure_is_zero_days() {
        let s = state(&["10:30AM", "1:45PM", "2 hr 15 min", "Nonstop", "129", "MUCFCO", "Lufthansa"]);
        let offer = assemble(s, &ctx(), ts(25, 6, 0)).unwrap();
        assert_eq!(offer.days_in_advance, 0);
    }

    #[test]
    fn layover_kept_with_stops() {
        let s = state(&[
            "9:10AM", "12:40PM", "3 hr 30 min", "1 stop", "1 hr 5 min FRA", "MUCFCO", "Lufthansa", "142",
        ]);
        let offer = assemble(s, &ctx(), ts(20, 9, 0)).unwrap();
        assert_eq!(offer.layover_minutes, Some(65));
        assert_eq!(offer.layover_locations, vec!["FRA".to_string()]);
    }
}
