use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Coarse signal of how the current price compares to the route's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Typical,
    High,
    Low,
    Unknown,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Typical => "typical",
            Trend::High => "high",
            Trend::Low => "low",
            Trend::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceTrend {
    pub trend: Trend,
    pub amount: Option<u32>,
}

impl PriceTrend {
    pub const UNKNOWN: PriceTrend = PriceTrend {
        trend: Trend::Unknown,
        amount: None,
    };

    /// Interpret the "Prices are currently …" fragment shown above the listing.
    pub fn from_fragment(fragment: Option<&str>) -> Self {
        let Some(s) = fragment.map(str::trim) else {
            return Self::UNKNOWN;
        };
        if s == "Prices are currently typical" {
            PriceTrend { trend: Trend::Typical, amount: None }
        } else if s == "Prices are currently high" {
            PriceTrend { trend: Trend::High, amount: None }
        } else if s.contains("cheaper") {
            // "Prices are currently low, 120 cheaper than usual"
            let amount = s
                .split_whitespace()
                .map(|w| w.replace(',', ""))
                .find(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_digit()))
                .and_then(|w| w.parse().ok());
            PriceTrend { trend: Trend::Low, amount }
        } else {
            Self::UNKNOWN
        }
    }
}

/// Everything the page itself does not say about the search that produced it.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub round_trip: bool,
    pub price_trend: PriceTrend,
}

impl SearchContext {
    pub fn one_way(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        SearchContext {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            return_date: None,
            round_trip: false,
            price_trend: PriceTrend::UNKNOWN,
        }
    }

    pub fn with_return(mut self, return_date: NaiveDate) -> Self {
        self.return_date = Some(return_date);
        self.round_trip = true;
        self
    }

    pub fn with_price_trend(mut self, price_trend: PriceTrend) -> Self {
        self.price_trend = price_trend;
        self
    }
}

impl std::fmt::Display for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.origin, self.destination, self.departure_date)?;
        if let Some(r) = self.return_date {
            write!(f, " (return {})", r)?;
        }
        Ok(())
    }
}

/// One finished flight offer, handed to persistence as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightOffer {
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub airlines: Vec<String>,
    pub travel_minutes: u32,
    pub origin: String,
    pub destination: String,
    pub stop_count: u32,
    pub layover_minutes: Option<u32>,
    pub layover_locations: Vec<String>,
    pub price: Option<u32>,
    pub price_trend: PriceTrend,
    pub accessed_at: NaiveDateTime,
    pub round_trip: bool,
    pub has_train: bool,
    /// Whole days between access and departure. Negative values are kept.
    pub days_in_advance: i64,
}
