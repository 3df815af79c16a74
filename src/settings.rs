use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};
use config::Config;
use serde::Deserialize;

use crate::model::SearchContext;
use crate::parser::segment::LiteralMarkers;

/// Runtime settings. Read from an optional `flights.{toml,json,yaml}` file,
/// then overridden by `FLIGHTS_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: String,
    pub concurrency: usize,
    pub currency: String,
    pub country: String,
    pub start_marker: String,
    pub end_marker: String,
    pub routes: Vec<Route>,
}

impl Default for Settings {
    fn default() -> Self {
        let markers = LiteralMarkers::default();
        Settings {
            db_path: "data/flights.sqlite".to_string(),
            concurrency: 4,
            currency: "EUR".to_string(),
            country: "IT".to_string(),
            start_marker: markers.start,
            end_marker: markers.end,
            routes: Vec::new(),
        }
    }
}

/// One origin/destination pair searched for every day up to `days_ahead`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
    pub days_ahead: u32,
    /// Makes every search round-trip, returning this many days after departure.
    #[serde(default)]
    pub return_after_days: Option<u32>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(config::File::with_name("flights").required(false))
            .add_source(config::Environment::with_prefix("FLIGHTS").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        for r in &self.routes {
            for code in [&r.origin, &r.destination] {
                if !is_iata(code) {
                    bail!("invalid airport code {:?} in route {}-{}", code, r.origin, r.destination);
                }
            }
        }
        Ok(())
    }

    pub fn markers(&self) -> LiteralMarkers {
        LiteralMarkers {
            start: self.start_marker.clone(),
            end: self.end_marker.clone(),
        }
    }

    /// Every search the configured routes produce, starting the day after `today`.
    pub fn contexts(&self, today: NaiveDate) -> Vec<SearchContext> {
        self.routes.iter().flat_map(|r| r.contexts(today)).collect()
    }
}

impl Route {
    pub fn contexts(&self, today: NaiveDate) -> Vec<SearchContext> {
        (1..=i64::from(self.days_ahead))
            .filter_map(|d| today.checked_add_signed(Duration::days(d)))
            .map(|date| {
                let ctx = SearchContext::one_way(&self.origin, &self.destination, date);
                match self
                    .return_after_days
                    .and_then(|n| date.checked_add_signed(Duration::days(i64::from(n))))
                {
                    Some(ret) => ctx.with_return(ret),
                    None => ctx,
                }
            })
            .collect()
    }
}

fn is_iata(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(o: &str, d: &str, days: u32) -> Route {
        Route {
            origin: o.into(),
            destination: d.into(),
            days_ahead: days,
            return_after_days: None,
        }
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.db_path, "data/flights.sqlite");
        assert_eq!(s.concurrency, 4);
        assert_eq!(s.markers().start, "Sort by:");
        assert_eq!(s.markers().end, "Language");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn route_starts_tomorrow() {
        let ctxs = route("MUC", "FCO", 3).contexts(day(3, 30));
        let dates: Vec<_> = ctxs.iter().map(|c| c.departure_date).collect();
        assert_eq!(dates, [day(3, 31), day(4, 1), day(4, 2)]);
        assert!(ctxs.iter().all(|c| !c.round_trip));
    }

    #[test]
    fn zero_days_ahead_is_empty() {
        assert!(route("MUC", "FCO", 0).contexts(day(3, 30)).is_empty());
    }

    #[test]
    fn round_trip_route() {
        let r = Route {
            return_after_days: Some(5),
            ..route("MUC", "FCO", 1)
        };
        let ctxs = r.contexts(day(3, 24));
        assert_eq!(ctxs.len(), 1);
        assert!(ctxs[0].round_trip);
        assert_eq!(ctxs[0].return_date, Some(day(3, 30)));
    }

    #[test]
    fn rejects_bad_codes() {
        let s = Settings {
            routes: vec![route("MUC", "fco", 2)],
            ..Default::default()
        };
        assert!(s.validate().is_err());
        let s = Settings {
            routes: vec![route("MUNICH", "FCO", 2)],
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn contexts_across_routes() {
        let s = Settings {
            routes: vec![route("MUC", "FCO", 2), route("FCO", "MUC", 1)],
            ..Default::default()
        };
        let ctxs = s.contexts(day(3, 24));
        assert_eq!(ctxs.len(), 3);
        assert_eq!(ctxs[2].origin, "FCO");
    }

    #[test]
    fn deserializes_routes_from_toml() {
        let s: Settings = Config::builder()
            .add_source(config::File::from_str(
                r#"
                concurrency = 2
                [[routes]]
                origin = "MUC"
                destination = "FCO"
                days_ahead = 7
                return_after_days = 3
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.concurrency, 2);
        assert_eq!(s.currency, "EUR");
        assert_eq!(s.routes[0].return_after_days, Some(3));
    }
}
