//! Scripted providers and fixtures shared by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::catalog::{Destination, Region};
use crate::pipeline::Clock;
use crate::pricing::{DailyCosts, HotelPercentiles};
use crate::providers::{CostEstimator, FlightFare, FlightFareProvider, Priced, ProviderError};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn fixed_clock() -> Clock {
    Arc::new(fixed_now)
}

pub fn lisbon() -> Destination {
    Destination::new("LIS", "Lisbon", "Portugal", Region::Europe, 38.72, -9.14)
}

/// A small catalog spanning three regions and four countries.
pub fn sample_destinations() -> Vec<Destination> {
    vec![
        lisbon(),
        Destination::new("OPO", "Porto", "Portugal", Region::Europe, 41.15, -8.61),
        Destination::new("PRG", "Prague", "Czech Republic", Region::Europe, 50.08, 14.44),
        Destination::new("BKK", "Bangkok", "Thailand", Region::Asia, 13.76, 100.50),
        Destination::new("HAN", "Hanoi", "Vietnam", Region::Asia, 21.03, 105.85),
        Destination::new("MEX", "Mexico City", "Mexico", Region::LatinAmerica, 19.43, -99.13),
        Destination::new("LIM", "Lima", "Peru", Region::LatinAmerica, -12.05, -77.04),
        Destination::new("BOG", "Bogota", "Colombia", Region::LatinAmerica, 4.71, -74.07),
    ]
}

/// Flight provider that returns a fixed fare or always fails.
pub struct FakeFlights {
    fare: Option<FlightFare>,
}

impl FakeFlights {
    pub fn fare(price: f64) -> Self {
        Self {
            fare: Some(FlightFare {
                price,
                is_estimate: false,
            }),
        }
    }

    /// A fare the provider itself marks as estimated.
    pub fn estimated(price: f64) -> Self {
        Self {
            fare: Some(FlightFare {
                price,
                is_estimate: true,
            }),
        }
    }

    pub fn failing() -> Self {
        Self { fare: None }
    }
}

#[async_trait]
impl FlightFareProvider for FakeFlights {
    async fn fetch_flight_fare(
        &self,
        _origin: &str,
        _destination_city_id: &str,
        _month: Option<u32>,
    ) -> Result<FlightFare, ProviderError> {
        self.fare
            .ok_or_else(|| ProviderError::Unavailable("scripted outage".to_string()))
    }
}

/// Estimator with scripted answers, failures, latency and a call counter.
pub struct FakeEstimator {
    hotel: Option<HotelPercentiles>,
    daily: Option<DailyCosts>,
    failing_cities: HashSet<String>,
    delay: Duration,
    panics: bool,
    cost_per_call: f64,
    calls: AtomicUsize,
}

impl FakeEstimator {
    pub fn healthy() -> Self {
        Self {
            hotel: Some(HotelPercentiles {
                p25: 50.0,
                p50: 80.0,
                p75: 130.0,
            }),
            daily: Some(DailyCosts {
                food: 30.0,
                transport: 10.0,
                misc: 10.0,
            }),
            failing_cities: HashSet::new(),
            delay: Duration::ZERO,
            panics: false,
            cost_per_call: 0.001,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            hotel: None,
            daily: None,
            ..Self::healthy()
        }
    }

    pub fn failing_hotel(mut self) -> Self {
        self.hotel = None;
        self
    }

    /// Fail both calls for the named city.
    pub fn failing_city(mut self, city_name: &str) -> Self {
        self.failing_cities.insert(city_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panic inside every call, as a buggy adapter would.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::healthy()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer<T: Copy>(
        &self,
        city_name: &str,
        value: Option<T>,
    ) -> Result<Priced<T>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("scripted estimator panic for {city_name}");
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match value {
            Some(value) if !self.failing_cities.contains(city_name) => Ok(Priced {
                value,
                cost_usd: self.cost_per_call,
            }),
            _ => Err(ProviderError::Api {
                status: 503,
                message: format!("scripted failure for {city_name}"),
            }),
        }
    }
}

#[async_trait]
impl CostEstimator for FakeEstimator {
    async fn fetch_hotel_pricing(
        &self,
        city_name: &str,
        _country_name: &str,
    ) -> Result<Priced<HotelPercentiles>, ProviderError> {
        self.answer(city_name, self.hotel).await
    }

    async fn fetch_daily_costs(
        &self,
        city_name: &str,
        _country_name: &str,
    ) -> Result<Priced<DailyCosts>, ProviderError> {
        self.answer(city_name, self.daily).await
    }
}
