//! Integration tests for the restomod core
//!
//! These tests exercise the public API end to end:
//! - Fallback tables loaded from disk feeding the resolver
//! - Free-text research parsed into a result and sent over the wire
//! - Category inference across a small catalogue

use std::path::PathBuf;
use std::sync::Arc;

use restomod_core::{
    parse_research_text, ConfiguratorSnapshot, FallbackImageResolver, FallbackImageTable,
    IpcResponse, ResearchQuery, ResearchStatus, Subject, VehicleCategory, FALLBACK_TABLE_FILE,
};

const CUSTOM_TABLE: &str = r#"
[[vehicles]]
name = "1970 Plymouth Barracuda"
urls = ["https://img.example/cuda-1.jpg", "https://img.example/cuda-2.jpg"]

[[vehicles]]
name = "1957 Chevrolet Bel Air"
urls = ["https://img.example/belair.jpg"]

[[parts]]
name = "Exhaust"
urls = ["https://img.example/exhaust.jpg"]
"#;

/// Fresh scratch directory under the system temp dir
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("restomod-core-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
    dir
}

#[test]
fn test_table_from_disk_drives_resolver() {
    let home = scratch_dir("table");
    std::fs::write(home.join(FALLBACK_TABLE_FILE), CUSTOM_TABLE).unwrap();

    let table = FallbackImageTable::load_or_builtin(&home).unwrap();
    assert_eq!(table.vehicles().len(), 2);
    assert_eq!(table.parts().len(), 1);

    let resolver = FallbackImageResolver::new(Arc::new(table));

    // Exact
    assert_eq!(
        resolver.resolve_vehicle("1957 Chevrolet Bel Air"),
        "https://img.example/belair.jpg"
    );
    // Partial, case-insensitive
    let cuda = resolver.resolve_vehicle("plymouth barracuda");
    assert!(cuda.starts_with("https://img.example/cuda-"));
    // Unknown names still get an image
    assert_eq!(resolver.resolve_part("Carburetor"), "https://img.example/exhaust.jpg");

    let query = ResearchQuery::part(" Exhaust ", Some("1970 Plymouth Barracuda")).unwrap();
    assert_eq!(resolver.resolve(query.subject()), "https://img.example/exhaust.jpg");

    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn test_missing_table_uses_builtin() {
    let home = scratch_dir("builtin");
    let table = FallbackImageTable::load_or_builtin(&home).unwrap();
    assert_eq!(table.vehicles().len(), FallbackImageTable::builtin().vehicles().len());
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn test_invalid_table_on_disk_is_an_error() {
    let home = scratch_dir("invalid");
    std::fs::write(
        home.join(FALLBACK_TABLE_FILE),
        "[[vehicles]]\nname = \"Empty\"\nurls = []\n[[parts]]\nname = \"Wheels\"\nurls = [\"https://img.example/w.jpg\"]\n",
    )
    .unwrap();

    assert!(FallbackImageTable::load_or_builtin(&home).is_err());
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn test_parsed_research_travels_in_a_snapshot() {
    let data = parse_research_text(
        "## Overview\nThe split-window coupe lasted one year.\n\
         ## Specifications\nEngine: 327 V8\n\
         ## Notable Examples\n- Grand Sport\n- Z06",
    );

    let snapshot = ConfiguratorSnapshot {
        seq: 3,
        subject: Some(Subject::Vehicle {
            model: "1963 Chevrolet Corvette".to_string(),
        }),
        status: ResearchStatus::Success,
        data: Some(data),
        error: None,
        image_url: Some("https://img.example/vette.jpg".to_string()),
    };

    let json = serde_json::to_string(&IpcResponse::Configurator(snapshot.clone())).unwrap();
    assert!(json.contains("\"notableExamples\":[\"Grand Sport\",\"Z06\"]"));
    assert!(json.contains("\"imageUrl\""));

    match serde_json::from_str::<IpcResponse>(&json).unwrap() {
        IpcResponse::Configurator(back) => assert_eq!(back, snapshot),
        other => panic!("unexpected response: {:?}", other),
    }
}

#[test]
fn test_catalogue_categories() {
    let catalogue = [
        ("Ford", "Mustang Fastback", 1967, VehicleCategory::MuscleCars),
        ("Jaguar", "E-Type", 1961, VehicleCategory::SportsCars),
        ("Lincoln", "Continental", 1961, VehicleCategory::LuxuryCars),
        ("Chevrolet", "C10 Pickup", 1966, VehicleCategory::TrucksUtility),
        ("MG", "MGB", 1965, VehicleCategory::EuropeanClassics),
        ("Studebaker", "Avanti", 1963, VehicleCategory::ClassicCars),
    ];

    for (make, model, year, expected) in catalogue {
        assert_eq!(
            VehicleCategory::infer(make, model, year),
            expected,
            "{} {} {}",
            year,
            make,
            model
        );
    }
}
