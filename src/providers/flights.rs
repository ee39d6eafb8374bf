//! Flight fare providers and the deterministic fare estimate used when no
//! live fare is available.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{FlightFare, FlightFareProvider, ProviderError};
use crate::catalog::{origin_coordinates, Destination, Region};

const EARTH_RADIUS_KM: f64 = 6371.0;
const BASE_FARE_USD: f64 = 120.0;
const FARE_PER_KM_USD: f64 = 0.11;
const PEAK_MONTH_MULTIPLIER: f64 = 1.2;

/// Live fares from an HTTP fare service.
///
/// `GET {base}/fares?origin=PHX&destination=LIS&month=6` answering
/// `{"price": 812.0, "currency": "USD"}`.
pub struct HttpFlightProvider {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FareResponse {
    price: f64,
    currency: Option<String>,
    #[serde(default)]
    estimated: bool,
}

impl HttpFlightProvider {
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl FlightFareProvider for HttpFlightProvider {
    async fn fetch_flight_fare(
        &self,
        origin: &str,
        destination_city_id: &str,
        month: Option<u32>,
    ) -> Result<FlightFare, ProviderError> {
        let mut url = self
            .base_url
            .join("fares")
            .map_err(|e| ProviderError::Unavailable(format!("bad fare endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("origin", origin);
            query.append_pair("destination", destination_city_id);
            if let Some(month) = month {
                query.append_pair("month", &month.to_string());
            }
        }

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let fare: FareResponse = response.json().await?;
        if let Some(currency) = &fare.currency {
            if !currency.eq_ignore_ascii_case("USD") {
                return Err(ProviderError::Parse(format!("unsupported currency {currency}")));
            }
        }
        if !fare.price.is_finite() || fare.price <= 0.0 {
            return Err(ProviderError::Parse(format!("implausible fare {}", fare.price)));
        }

        Ok(FlightFare {
            price: fare.price,
            is_estimate: fare.estimated,
        })
    }
}

/// Stand-in used when no fare service is configured.
pub struct UnavailableFlightProvider;

#[async_trait]
impl FlightFareProvider for UnavailableFlightProvider {
    async fn fetch_flight_fare(
        &self,
        _origin: &str,
        _destination_city_id: &str,
        _month: Option<u32>,
    ) -> Result<FlightFare, ProviderError> {
        Err(ProviderError::Unavailable("no flight fare service configured".to_string()))
    }
}

/// Deterministic round-trip fare estimate in whole USD.
///
/// Priced by great-circle distance when the origin airport is known, by a
/// per-region base fare otherwise. Peak months cost 20% more.
pub fn synthetic_flight_estimate(
    origin: &str,
    destination: &Destination,
    month: Option<u32>,
) -> f64 {
    let base = match origin_coordinates(origin) {
        Some(from) => {
            let km = haversine_km(from, (destination.latitude, destination.longitude));
            BASE_FARE_USD + km * FARE_PER_KM_USD
        }
        None => regional_base_fare(destination.region),
    };
    let seasonal = match month {
        Some(6..=8) | Some(12) => base * PEAK_MONTH_MULTIPLIER,
        _ => base,
    };
    seasonal.round()
}

fn regional_base_fare(region: Region) -> f64 {
    match region {
        Region::NorthAmerica => 400.0,
        Region::LatinAmerica => 650.0,
        Region::Europe => 750.0,
        Region::MiddleEast => 900.0,
        Region::Asia => 950.0,
        Region::Africa => 1100.0,
        Region::Oceania => 1300.0,
    }
}

fn haversine_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn lisbon() -> Destination {
        Destination::new("LIS", "Lisbon", "Portugal", Region::Europe, 38.72, -9.14)
    }

    /// Canned fare service keyed by destination id.
    async fn canned_fares(
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if bearer != Some("Bearer fare-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
        }
        if query.get("origin").map(String::as_str) != Some("PHX") {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad origin" })));
        }
        let ok = |body: Value| (StatusCode::OK, Json(body));
        match query.get("destination").map(String::as_str) {
            Some("LIS") => match query.get("month").map(String::as_str) {
                Some("6") => ok(json!({ "price": 975.0, "currency": "USD" })),
                _ => ok(json!({ "price": 812.5, "currency": "USD" })),
            },
            Some("OPO") => ok(json!({ "price": 640.0, "currency": "usd", "estimated": true })),
            Some("MAD") => ok(json!({ "price": 590.0 })),
            Some("PRG") => ok(json!({ "price": 700.0, "currency": "EUR" })),
            Some("BKK") => ok(json!({ "price": 0.0, "currency": "USD" })),
            Some("HAN") => ok(json!({ "price": -40.0, "currency": "USD" })),
            Some("LIM") => ok(json!({ "fare": "cheap" })),
            _ => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "upstream down" })),
            ),
        }
    }

    async fn fare_service() -> Url {
        let app = Router::new().route("/fares", get(canned_fares));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn test_http_provider_returns_live_and_flagged_fares() {
        let provider = HttpFlightProvider::new(fare_service().await, Some("fare-key".into()));

        let live = provider.fetch_flight_fare("PHX", "LIS", None).await.unwrap();
        assert_eq!(live.price, 812.5);
        assert!(!live.is_estimate);

        let june = provider.fetch_flight_fare("PHX", "LIS", Some(6)).await.unwrap();
        assert_eq!(june.price, 975.0);

        let flagged = provider.fetch_flight_fare("PHX", "OPO", None).await.unwrap();
        assert_eq!(flagged.price, 640.0);
        assert!(flagged.is_estimate);

        // A missing currency is taken as USD.
        let implicit = provider.fetch_flight_fare("PHX", "MAD", None).await.unwrap();
        assert_eq!(implicit.price, 590.0);
    }

    #[tokio::test]
    async fn test_http_provider_rejects_bad_answers() {
        let provider = HttpFlightProvider::new(fare_service().await, Some("fare-key".into()));

        let err = provider.fetch_flight_fare("PHX", "PRG", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Parse(ref m) if m.contains("EUR")));

        for city in ["BKK", "HAN"] {
            let err = provider.fetch_flight_fare("PHX", city, None).await.unwrap_err();
            assert!(matches!(err, ProviderError::Parse(_)), "{city}: {err}");
        }

        let err = provider.fetch_flight_fare("PHX", "LIM", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));

        let err = provider.fetch_flight_fare("PHX", "ZZZ", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_http_provider_sends_bearer_key() {
        let base = fare_service().await;

        let keyless = HttpFlightProvider::new(base.clone(), None);
        let err = keyless.fetch_flight_fare("PHX", "LIS", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 401, .. }));

        let wrong = HttpFlightProvider::new(base, Some("other".into()));
        let err = wrong.fetch_flight_fare("PHX", "LIS", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 401, .. }));
    }

    #[test]
    fn test_haversine_is_symmetric_and_zero_on_self() {
        let a = (40.64, -73.78);
        let b = (51.47, -0.45);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        assert!(haversine_km(a, a).abs() < 1e-9);
        // JFK to LHR is roughly 5,550 km
        assert!((haversine_km(a, b) - 5550.0).abs() < 50.0);
    }

    #[test]
    fn test_estimate_is_deterministic_and_seasonal() {
        let off_peak = synthetic_flight_estimate("PHX", &lisbon(), Some(3));
        assert_eq!(off_peak, synthetic_flight_estimate("phx", &lisbon(), Some(3)));
        assert!(off_peak > BASE_FARE_USD);

        let peak = synthetic_flight_estimate("PHX", &lisbon(), Some(7));
        assert!(peak > off_peak);
        assert_eq!(synthetic_flight_estimate("PHX", &lisbon(), None), off_peak);
    }

    #[test]
    fn test_unknown_origin_uses_regional_fare() {
        assert_eq!(synthetic_flight_estimate("ZZZ", &lisbon(), None), 750.0);
        assert_eq!(synthetic_flight_estimate("ZZZ", &lisbon(), Some(12)), 900.0);
    }

    #[tokio::test]
    async fn test_unavailable_provider_always_fails() {
        let err = UnavailableFlightProvider
            .fetch_flight_fare("PHX", "LIS", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
