//! Token-by-token field classification for one offer segment.
//!
//! Every token goes through [`RULES`] in order and the first rule whose
//! predicate holds gets it. Predicates include "slot not filled yet", so a
//! token that would have matched a filled slot falls through to later rules.
//! The order of the table is the heuristic; reordering it changes results.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use super::duration::{parse_duration, parse_time_with_offset, TIME_RE};
use super::error::DropReason;
use crate::model::SearchContext;

/// Segments with fewer usable tokens cannot be a real offer.
pub const MIN_SEGMENT_TOKENS: usize = 6;

const SKIP_EXACT: &[&str] = &["Change of airport", "round trip", "Climate friendly"];
const SEPARATE_TICKETS: &str = "Separate tickets booked together";
const FLIGHT_TRAIN: &str = "Flight + Train";
const OPERATED: &str = "Operated";
/// "ITA, …" opens an airline list, never a layover.
const ITA_PREFIX: &str = "ITA, ";

/// Airline names with an inner capital that must stay whole.
const NO_SPLIT_AIRLINES: &[&str] = &[
    "easyJet",
    "airBaltic",
    "JetBlue",
    "WestJet",
    "SkyWest",
    "AirAsia",
    "SunExpress",
];

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2} hr)?\s?(\d{1,2} min)?$").unwrap());
static STOPS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+) stops?$").unwrap());
// "1 hr 5 min FRA", "2 hr Ancona", "45 min ZRH"
static TIMED_LAYOVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:\d{1,2} hr)?\s?(?:\d{1,2} min)?)\s+([A-Za-z].*)$").unwrap()
});
// "FRA, ZRH"
static CODE_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}(?:, [A-Z]{3})+$").unwrap());

/// Write-once field. Later writes are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot<T>(Option<T>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot(None)
    }
}

impl<T> Slot<T> {
    /// Fill the slot if empty. Returns whether the value was taken.
    pub fn try_set(&mut self, value: T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(value);
        true
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

/// Per-segment accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationState {
    times: Vec<NaiveDateTime>,
    pub departure: Slot<NaiveDateTime>,
    pub arrival: Slot<NaiveDateTime>,
    pub airlines: Slot<Vec<String>>,
    pub travel_minutes: Slot<u32>,
    pub origin: Slot<String>,
    pub destination: Slot<String>,
    pub stop_count: Slot<u32>,
    /// Set together with `layover_locations`; the inner `None` means the
    /// layover token carried no duration.
    pub layover_minutes: Slot<Option<u32>>,
    pub layover_locations: Slot<Vec<String>>,
    pub price: Slot<u32>,
    pub has_train: bool,
    pub separate_tickets: bool,
    awaiting_ticket_airlines: bool,
    pub unclassified: Vec<String>,
    /// Tokens a rule claimed but could not turn into a value.
    pub failures: Vec<DropReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Skip,
    SeparateTickets,
    Time,
    TravelDuration,
    StopCount,
    Price,
    Route,
    Layover,
    Airline,
}

/// What happened to a single token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenClass {
    Skipped,
    Classified(Field),
    Unclassified(String),
}

type Predicate = fn(&str, &ClassificationState) -> bool;
type Apply = fn(&str, &mut ClassificationState, &SearchContext);

pub struct Rule {
    pub field: Field,
    matches: Predicate,
    apply: Apply,
}

pub static RULES: [Rule; 9] = [
    Rule { field: Field::Skip, matches: is_skip, apply: skip },
    Rule { field: Field::SeparateTickets, matches: is_separate_tickets, apply: apply_separate_tickets },
    Rule { field: Field::Time, matches: is_time, apply: apply_time },
    Rule { field: Field::TravelDuration, matches: is_travel_duration, apply: apply_travel_duration },
    Rule { field: Field::StopCount, matches: is_stop_count, apply: apply_stop_count },
    Rule { field: Field::Price, matches: is_price, apply: apply_price },
    Rule { field: Field::Route, matches: is_route, apply: apply_route },
    Rule { field: Field::Layover, matches: is_layover, apply: apply_layover },
    Rule { field: Field::Airline, matches: is_airline, apply: apply_airline },
];

/// Classify a whole segment. Too-short segments are rejected up front.
pub fn classify_segment(
    tokens: &[String],
    ctx: &SearchContext,
) -> Result<ClassificationState, DropReason> {
    let usable = tokens.iter().filter(|t| !is_noise(t)).count();
    if usable < MIN_SEGMENT_TOKENS {
        return Err(DropReason::MalformedSegment { tokens: usable });
    }

    let mut state = ClassificationState::default();
    for token in tokens {
        classify_token(token, &mut state, ctx);
    }
    Ok(state)
}

pub fn classify_token(token: &str, state: &mut ClassificationState, ctx: &SearchContext) -> TokenClass {
    match RULES.iter().find(|r| (r.matches)(token, state)) {
        Some(rule) if rule.field == Field::Skip => TokenClass::Skipped,
        Some(rule) => {
            (rule.apply)(token, state, ctx);
            TokenClass::Classified(rule.field)
        }
        None => {
            state.unclassified.push(token.to_string());
            TokenClass::Unclassified(token.to_string())
        }
    }
}

// ── Predicates ──

fn is_skip(t: &str, _: &ClassificationState) -> bool {
    is_noise(t)
}

fn is_noise(t: &str) -> bool {
    t.is_empty()
        || SKIP_EXACT.contains(&t)
        || t.starts_with("Delayed")
        || t.ends_with("emissions")
        || t.ends_with("CO2")
}

fn is_separate_tickets(t: &str, s: &ClassificationState) -> bool {
    t == SEPARATE_TICKETS
        || (s.awaiting_ticket_airlines && !s.airlines.is_set() && is_name_list(t))
}

/// "Ryanair, Wizz Air", but not "1,234" or "BGY, FCO".
fn is_name_list(t: &str) -> bool {
    t.contains(", ")
        && !t.replace(',', "").chars().all(|c| c.is_ascii_digit() || c == ' ')
        && !CODE_LIST_RE.is_match(t)
}

fn is_time(t: &str, s: &ClassificationState) -> bool {
    s.times.len() < 2 && TIME_RE.is_match(t)
}

fn is_travel_duration(t: &str, s: &ClassificationState) -> bool {
    !s.travel_minutes.is_set() && !t.is_empty() && DURATION_RE.is_match(t)
}

fn is_stop_count(t: &str, s: &ClassificationState) -> bool {
    !s.stop_count.is_set() && (t == "Nonstop" || STOPS_RE.is_match(t))
}

fn is_price(t: &str, s: &ClassificationState) -> bool {
    let digits = t.replace(',', "");
    !s.price.is_set() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_route(t: &str, s: &ClassificationState) -> bool {
    !s.origin.is_set()
        && ((t.len() == 6 && t.chars().all(|c| c.is_ascii_uppercase())) || t.contains(FLIGHT_TRAIN))
}

fn is_layover(t: &str, s: &ClassificationState) -> bool {
    if s.layover_locations.is_set() || t.contains(ITA_PREFIX) {
        return false;
    }
    CODE_LIST_RE.is_match(t)
        || TIMED_LAYOVER_RE
            .captures(t)
            .is_some_and(|c| !c[1].trim().is_empty())
}

fn is_airline(t: &str, s: &ClassificationState) -> bool {
    !t.is_empty() && !s.airlines.is_set()
}

// ── Parsers ──

fn skip(_: &str, _: &mut ClassificationState, _: &SearchContext) {}

fn apply_separate_tickets(t: &str, s: &mut ClassificationState, _: &SearchContext) {
    if t == SEPARATE_TICKETS {
        s.separate_tickets = true;
        s.awaiting_ticket_airlines = true;
    } else {
        s.airlines.try_set(airline_names(t));
        s.awaiting_ticket_airlines = false;
    }
}

fn apply_time(t: &str, s: &mut ClassificationState, ctx: &SearchContext) {
    match parse_time_with_offset(ctx.departure_date, t) {
        Ok(ts) => s.times.push(ts),
        Err(e) => s.failures.push(e),
    }
    if let [dep, arr] = s.times.as_slice() {
        s.departure.try_set(*dep);
        s.arrival.try_set(*arr);
    }
}

fn apply_travel_duration(t: &str, s: &mut ClassificationState, _: &SearchContext) {
    match parse_duration(t) {
        Some(m) => {
            s.travel_minutes.try_set(m);
        }
        None => s.failures.push(DropReason::UnparseableDuration(t.to_string())),
    }
}

fn apply_stop_count(t: &str, s: &mut ClassificationState, _: &SearchContext) {
    let count = if t == "Nonstop" {
        Some(0)
    } else {
        STOPS_RE.captures(t).and_then(|c| c[1].parse().ok())
    };
    if let Some(n) = count {
        s.stop_count.try_set(n);
    }
}

fn apply_price(t: &str, s: &mut ClassificationState, _: &SearchContext) {
    match t.replace(',', "").parse() {
        Ok(p) => {
            s.price.try_set(p);
        }
        // Too large for a price; keep it visible.
        Err(_) => s.unclassified.push(t.to_string()),
    }
}

fn apply_route(t: &str, s: &mut ClassificationState, ctx: &SearchContext) {
    // Hybrid offers show no code pair; the queried airports stand in.
    let (origin, destination) = if t.contains(FLIGHT_TRAIN) {
        s.has_train = true;
        (ctx.origin.clone(), ctx.destination.clone())
    } else {
        (t[..3].to_string(), t[3..].to_string())
    };
    s.origin.try_set(origin);
    s.destination.try_set(destination);
}

fn apply_layover(t: &str, s: &mut ClassificationState, _: &SearchContext) {
    let (minutes, places) = match TIMED_LAYOVER_RE.captures(t) {
        Some(c) if !CODE_LIST_RE.is_match(t) => {
            let Some(m) = parse_duration(c[1].trim()) else {
                s.failures.push(DropReason::UnparseableDuration(t.to_string()));
                return;
            };
            (Some(m), c[2].to_string())
        }
        _ => (None, t.to_string()),
    };
    let locations = places
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    s.layover_minutes.try_set(minutes);
    s.layover_locations.try_set(locations);
}

fn apply_airline(t: &str, s: &mut ClassificationState, _: &SearchContext) {
    s.airlines.try_set(airline_names(t));
    s.awaiting_ticket_airlines = false;
}

/// "LufthansaAir Dolomiti" → ["Lufthansa", "Air Dolomiti"], with any
/// "Operated by …" tail removed first.
pub fn airline_names(token: &str) -> Vec<String> {
    let head = token.split(OPERATED).next().unwrap_or(token);
    split_camel_case(head.trim())
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Insert ", " wherever a lowercase letter runs into an uppercase one,
/// except inside the allow-listed names.
fn split_camel_case(s: &str) -> String {
    let protected: Vec<(usize, usize)> = NO_SPLIT_AIRLINES
        .iter()
        .flat_map(|name| s.match_indices(name).map(|(i, m)| (i, i + m.len())))
        .collect();

    let mut out = String::with_capacity(s.len() + 8);
    let mut prev: Option<char> = None;
    for (i, c) in s.char_indices() {
        let boundary = prev.is_some_and(|p| p.is_ascii_lowercase()) && c.is_ascii_uppercase();
        if boundary && !protected.iter().any(|&(start, end)| start < i && i < end) {
            out.push_str(", ");
        }
        out.push(c);
        prev = Some(c);
    }
    out
}
