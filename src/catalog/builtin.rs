//! Built-in destination list and origin airport coordinates.

use super::{Destination, Region};

const DESTINATIONS: &[(&str, &str, &str, Region, f64, f64)] = &[
    // Europe
    ("LIS", "Lisbon", "Portugal", Region::Europe, 38.7223, -9.1393),
    ("BCN", "Barcelona", "Spain", Region::Europe, 41.3874, 2.1686),
    ("PRG", "Prague", "Czech Republic", Region::Europe, 50.0755, 14.4378),
    ("BUD", "Budapest", "Hungary", Region::Europe, 47.4979, 19.0402),
    ("KRK", "Krakow", "Poland", Region::Europe, 50.0647, 19.9450),
    ("ATH", "Athens", "Greece", Region::Europe, 37.9838, 23.7275),
    ("ROM", "Rome", "Italy", Region::Europe, 41.9028, 12.4964),
    ("PAR", "Paris", "France", Region::Europe, 48.8566, 2.3522),
    ("DUB", "Dublin", "Ireland", Region::Europe, 53.3498, -6.2603),
    // Asia
    ("BKK", "Bangkok", "Thailand", Region::Asia, 13.7563, 100.5018),
    ("HAN", "Hanoi", "Vietnam", Region::Asia, 21.0278, 105.8342),
    ("TYO", "Tokyo", "Japan", Region::Asia, 35.6762, 139.6503),
    ("SEL", "Seoul", "South Korea", Region::Asia, 37.5665, 126.9780),
    ("DPS", "Bali", "Indonesia", Region::Asia, -8.3405, 115.0920),
    ("KUL", "Kuala Lumpur", "Malaysia", Region::Asia, 3.1390, 101.6869),
    ("DEL", "New Delhi", "India", Region::Asia, 28.6139, 77.2090),
    // North America
    ("MEX", "Mexico City", "Mexico", Region::NorthAmerica, 19.4326, -99.1332),
    ("CUN", "Cancun", "Mexico", Region::NorthAmerica, 21.1619, -86.8515),
    ("YVR", "Vancouver", "Canada", Region::NorthAmerica, 49.2827, -123.1207),
    ("YUL", "Montreal", "Canada", Region::NorthAmerica, 45.5019, -73.5674),
    ("NYC", "New York", "United States", Region::NorthAmerica, 40.7128, -74.0060),
    ("MSY", "New Orleans", "United States", Region::NorthAmerica, 29.9511, -90.0715),
    // Latin America
    ("LIM", "Lima", "Peru", Region::LatinAmerica, -12.0464, -77.0428),
    ("BOG", "Bogota", "Colombia", Region::LatinAmerica, 4.7110, -74.0721),
    ("MDE", "Medellin", "Colombia", Region::LatinAmerica, 6.2442, -75.5812),
    ("BUE", "Buenos Aires", "Argentina", Region::LatinAmerica, -34.6037, -58.3816),
    ("SJO", "San Jose", "Costa Rica", Region::LatinAmerica, 9.9281, -84.0907),
    ("RIO", "Rio de Janeiro", "Brazil", Region::LatinAmerica, -22.9068, -43.1729),
    // Africa
    ("CPT", "Cape Town", "South Africa", Region::Africa, -33.9249, 18.4241),
    ("RAK", "Marrakech", "Morocco", Region::Africa, 31.6295, -7.9811),
    ("NBO", "Nairobi", "Kenya", Region::Africa, -1.2921, 36.8219),
    ("ZNZ", "Zanzibar", "Tanzania", Region::Africa, -6.1659, 39.2026),
    // Oceania
    ("SYD", "Sydney", "Australia", Region::Oceania, -33.8688, 151.2093),
    ("MEL", "Melbourne", "Australia", Region::Oceania, -37.8136, 144.9631),
    ("AKL", "Auckland", "New Zealand", Region::Oceania, -36.8485, 174.7633),
    ("NAN", "Nadi", "Fiji", Region::Oceania, -17.7765, 177.4356),
    // Middle East
    ("DXB", "Dubai", "United Arab Emirates", Region::MiddleEast, 25.2048, 55.2708),
    ("IST", "Istanbul", "Turkey", Region::MiddleEast, 41.0082, 28.9784),
    ("AMM", "Amman", "Jordan", Region::MiddleEast, 31.9454, 35.9284),
    ("TLV", "Tel Aviv", "Israel", Region::MiddleEast, 32.0853, 34.7818),
];

/// Origin airports the synthetic flight estimate knows the position of.
const ORIGINS: &[(&str, f64, f64)] = &[
    ("ATL", 33.6407, -84.4277),
    ("BOS", 42.3656, -71.0096),
    ("DEN", 39.8561, -104.6737),
    ("DFW", 32.8998, -97.0403),
    ("JFK", 40.6413, -73.7781),
    ("LAX", 33.9416, -118.4085),
    ("MIA", 25.7959, -80.2870),
    ("ORD", 41.9742, -87.9073),
    ("PHX", 33.4342, -112.0116),
    ("SEA", 47.4502, -122.3088),
    ("SFO", 37.6213, -122.3790),
    ("YYZ", 43.6777, -79.6248),
    ("LHR", 51.4700, -0.4543),
    ("FRA", 50.0379, 8.5622),
];

pub fn builtin_destinations() -> Vec<Destination> {
    DESTINATIONS
        .iter()
        .map(|&(id, name, country, region, lat, lon)| {
            Destination::new(id, name, country, region, lat, lon)
        })
        .collect()
}

/// Coordinates of a known origin airport (case-insensitive IATA code).
pub fn origin_coordinates(code: &str) -> Option<(f64, f64)> {
    ORIGINS
        .iter()
        .find(|(iata, _, _)| iata.eq_ignore_ascii_case(code))
        .map(|&(_, lat, lon)| (lat, lon))
}
