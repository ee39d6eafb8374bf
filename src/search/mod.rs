//! Search parameters, validation and result filtering shared by the
//! progressive sessions and the synchronous recommendations endpoint.

mod countries;
mod recs;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Destination, Region};
use crate::pipeline::{CityRecommendation, CostTotals, TripParams};

pub use countries::{summarize_countries, CountrySummary};
pub use recs::{Pagination, RecommendationService, RecsMeta, RecsResponse, DISCLAIMER};

pub const MAX_NIGHTS: u32 = 60;
pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Rejected search input. Always a client error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("Missing required parameter: {0}")]
    Missing(&'static str),

    #[error("Invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ParamError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Query string as received; every field is parsed and validated explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub budget: Option<String>,
    pub nights: Option<String>,
    pub origin: Option<String>,
    pub month: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub travel_style: Option<String>,
    pub include_estimates: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Which cost band is compared against the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelStyle {
    Budget,
    #[default]
    Mid,
    Luxury,
}

impl TravelStyle {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "budget" => Some(Self::Budget),
            "mid" | "midrange" | "mid-range" => Some(Self::Mid),
            "luxury" => Some(Self::Luxury),
            _ => None,
        }
    }

    /// The band total this style pays.
    pub fn band(self, totals: &CostTotals) -> f64 {
        match self {
            Self::Budget => totals.p25,
            Self::Mid => totals.p50,
            Self::Luxury => totals.p75,
        }
    }
}

/// Narrowing applied to a result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilter {
    pub region: Option<Region>,
    pub country: Option<String>,
    pub include_estimates: bool,
}

impl Default for ViewFilter {
    fn default() -> Self {
        Self {
            region: None,
            country: None,
            include_estimates: true,
        }
    }
}

impl ViewFilter {
    /// Parse only the filter fields; used when polling an existing session.
    pub fn from_query(query: &SearchQuery) -> Result<Self, ParamError> {
        Ok(Self {
            region: parse_region(query.region.as_deref())?,
            country: non_empty(query.country.as_deref()).map(str::to_string),
            include_estimates: parse_bool(query.include_estimates.as_deref(), "includeEstimates")?
                .unwrap_or(true),
        })
    }

    pub fn matches_destination(&self, destination: &Destination) -> bool {
        self.region.map_or(true, |r| destination.region == r)
            && self
                .country
                .as_deref()
                .map_or(true, |c| destination.country.eq_ignore_ascii_case(c))
    }

    pub fn accepts(&self, rec: &CityRecommendation) -> bool {
        self.region.map_or(true, |r| rec.region == r)
            && self
                .country
                .as_deref()
                .map_or(true, |c| rec.country.eq_ignore_ascii_case(c))
            && (self.include_estimates || !rec.is_estimate)
    }
}

/// Validated search parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub budget: f64,
    pub nights: u32,
    pub origin: String,
    pub month: Option<u32>,
    pub travel_style: TravelStyle,
    #[serde(flatten)]
    pub filter: ViewFilter,
}

impl SearchParams {
    pub fn from_query(query: &SearchQuery) -> Result<Self, ParamError> {
        let budget: f64 = required(query.budget.as_deref(), "budget")?
            .parse()
            .map_err(|_| ParamError::invalid("budget", "must be a number"))?;
        if !budget.is_finite() || budget <= 0.0 {
            return Err(ParamError::invalid("budget", "must be greater than zero"));
        }

        let nights: u32 = required(query.nights.as_deref(), "nights")?
            .parse()
            .map_err(|_| ParamError::invalid("nights", "must be a whole number"))?;
        if !(1..=MAX_NIGHTS).contains(&nights) {
            return Err(ParamError::invalid(
                "nights",
                format!("must be between 1 and {MAX_NIGHTS}"),
            ));
        }

        let origin = required(query.origin.as_deref(), "origin")?;
        if origin.len() != 3 || !origin.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ParamError::invalid("origin", "must be a three-letter airport code"));
        }

        let travel_style = match non_empty(query.travel_style.as_deref()) {
            Some(raw) => TravelStyle::parse(raw).ok_or_else(|| {
                ParamError::invalid("travelStyle", "expected budget, mid or luxury")
            })?,
            None => TravelStyle::default(),
        };

        Ok(Self {
            budget,
            nights,
            origin: origin.to_ascii_uppercase(),
            month: parse_month(query.month.as_deref())?,
            travel_style,
            filter: ViewFilter::from_query(query)?,
        })
    }

    pub fn trip(&self) -> TripParams {
        TripParams {
            origin: self.origin.clone(),
            nights: self.nights,
            month: self.month,
        }
    }

    /// Whether a priced destination belongs in the result set.
    pub fn accepts(&self, rec: &CityRecommendation) -> bool {
        self.travel_style.band(&rec.totals) <= self.budget && self.filter.accepts(rec)
    }
}

/// Validate `page` and `limit`.
pub fn parse_pagination(query: &SearchQuery) -> Result<(usize, usize), ParamError> {
    let page = match non_empty(query.page.as_deref()) {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ParamError::invalid("page", "must be a positive integer"))?,
        None => 1,
    };
    let limit = match non_empty(query.limit.as_deref()) {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .ok_or_else(|| {
                ParamError::invalid("limit", format!("must be between 1 and {MAX_LIMIT}"))
            })?,
        None => DEFAULT_LIMIT,
    };
    Ok((page, limit))
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(raw: Option<&'a str>, field: &'static str) -> Result<&'a str, ParamError> {
    non_empty(raw).ok_or(ParamError::Missing(field))
}

fn parse_region(raw: Option<&str>) -> Result<Option<Region>, ParamError> {
    match non_empty(raw) {
        Some(raw) => Region::parse(raw)
            .map(Some)
            .ok_or_else(|| ParamError::invalid("region", format!("unknown region '{raw}'"))),
        None => Ok(None),
    }
}

fn parse_bool(raw: Option<&str>, field: &'static str) -> Result<Option<bool>, ParamError> {
    match non_empty(raw).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(None),
        Some("true" | "1" | "yes") => Ok(Some(true)),
        Some("false" | "0" | "no") => Ok(Some(false)),
        Some(_) => Err(ParamError::invalid(field, "expected true or false")),
    }
}

/// Accepts `6`, `06` or `2025-06`.
fn parse_month(raw: Option<&str>) -> Result<Option<u32>, ParamError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    let digits = match raw.split_once('-') {
        Some((year, month)) if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) => month,
        Some(_) => return Err(ParamError::invalid("month", "expected M, MM or YYYY-MM")),
        None => raw,
    };
    digits
        .parse::<u32>()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .map(Some)
        .ok_or_else(|| ParamError::invalid("month", "must be between 1 and 12"))
}
