//! Vehicle category heuristic
//!
//! Buckets a classic car into a browsing category from its make, model and
//! year. Rules are checked in order and the first hit wins.

use serde::{Deserialize, Serialize};

/// Browsing category for a classic vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleCategory {
    #[serde(rename = "Sports Cars")]
    SportsCars,
    #[serde(rename = "Muscle Cars")]
    MuscleCars,
    #[serde(rename = "Luxury Cars")]
    LuxuryCars,
    #[serde(rename = "Trucks & Utility")]
    TrucksUtility,
    #[serde(rename = "European Classics")]
    EuropeanClassics,
    #[serde(rename = "Classic Cars")]
    ClassicCars,
}

const SPORTS_MAKES: &[&str] = &["jaguar", "porsche", "ferrari", "lamborghini"];
const SPORTS_MODELS: &[&str] = &["corvette", "cobra", "300sl", "speedster", "xk", "tr"];
const MUSCLE_MODELS: &[&str] = &[
    "camaro", "mustang", "challenger", "charger", "gto", "chevelle", "cuda", "firebird", "amx",
];
const LUXURY_MAKES: &[&str] = &["cadillac", "lincoln", "bentley", "rolls"];
const LUXURY_MODELS: &[&str] = &["eldorado", "continental"];
const TRUCK_MODELS: &[&str] = &["pickup", "truck", "suburban", "blazer", "bronco", "jeep"];
const EUROPEAN_MAKES: &[&str] = &[
    "volkswagen", "bmw", "alfa", "fiat", "triumph", "austin", "mg", "allard",
];

/// Muscle car era, inclusive.
const MUSCLE_YEARS: std::ops::RangeInclusive<i32> = 1964..=1974;

impl VehicleCategory {
    /// Infer a category from make, model and model year.
    pub fn infer(make: &str, model: &str, year: i32) -> Self {
        let make = make.to_lowercase();
        let model = model.to_lowercase();
        let make_has = |words: &[&str]| words.iter().any(|w| make.contains(w));
        let model_has = |words: &[&str]| words.iter().any(|w| model.contains(w));

        if make_has(SPORTS_MAKES) || model_has(SPORTS_MODELS) {
            VehicleCategory::SportsCars
        } else if MUSCLE_YEARS.contains(&year) && model_has(MUSCLE_MODELS) {
            VehicleCategory::MuscleCars
        } else if make_has(LUXURY_MAKES)
            || (make.contains("mercedes") && !model.contains("sl"))
            || model_has(LUXURY_MODELS)
        {
            VehicleCategory::LuxuryCars
        } else if model_has(TRUCK_MODELS) {
            VehicleCategory::TrucksUtility
        } else if make_has(EUROPEAN_MAKES) {
            VehicleCategory::EuropeanClassics
        } else {
            VehicleCategory::ClassicCars
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::SportsCars => "Sports Cars",
            VehicleCategory::MuscleCars => "Muscle Cars",
            VehicleCategory::LuxuryCars => "Luxury Cars",
            VehicleCategory::TrucksUtility => "Trucks & Utility",
            VehicleCategory::EuropeanClassics => "European Classics",
            VehicleCategory::ClassicCars => "Classic Cars",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_muscle_cars_need_era() {
        assert_eq!(
            VehicleCategory::infer("Chevrolet", "Camaro SS", 1969),
            VehicleCategory::MuscleCars
        );
        assert_eq!(
            VehicleCategory::infer("Chevrolet", "Camaro", 1982),
            VehicleCategory::ClassicCars
        );
    }

    #[test]
    fn test_sports_rules_win_first() {
        assert_eq!(
            VehicleCategory::infer("Shelby", "Cobra 427", 1965),
            VehicleCategory::SportsCars
        );
        assert_eq!(
            VehicleCategory::infer("Porsche", "911", 1973),
            VehicleCategory::SportsCars
        );
    }

    #[test]
    fn test_luxury_and_mercedes_sl() {
        assert_eq!(
            VehicleCategory::infer("Cadillac", "Eldorado", 1959),
            VehicleCategory::LuxuryCars
        );
        assert_eq!(
            VehicleCategory::infer("Mercedes-Benz", "220S", 1958),
            VehicleCategory::LuxuryCars
        );
        assert_ne!(
            VehicleCategory::infer("Mercedes-Benz", "280SL", 1969),
            VehicleCategory::LuxuryCars
        );
    }

    #[test]
    fn test_trucks_and_european() {
        assert_eq!(
            VehicleCategory::infer("Ford", "Bronco", 1972),
            VehicleCategory::TrucksUtility
        );
        assert_eq!(
            VehicleCategory::infer("Volkswagen", "Beetle", 1967),
            VehicleCategory::EuropeanClassics
        );
        assert_eq!(VehicleCategory::SportsCars.as_str(), "Sports Cars");
    }
}
