//! Fallback images for the configurator
//!
//! When research or image generation fails the configurator still shows a
//! picture. Images come from a curated table, built once at startup and
//! shared read-only.
//!
//! # Matching Strategy
//!
//! 1. Exact key match
//! 2. Case-insensitive substring match in either direction, first key in
//!    table order wins
//! 3. Any image from the whole table
//!
//! Within the chosen set the URL is picked uniformly at random so the same
//! key does not always show the same picture.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Subject;

/// File name of the optional table override inside the restomod home.
pub const FALLBACK_TABLE_FILE: &str = "fallback_images.toml";

const VEHICLE_IMAGES: &[(&str, &[&str])] = &[
    (
        "1967 Ford Mustang",
        &[
            "https://images.unsplash.com/photo-1584345604476-8ec5e12e42dd?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1600712242805-5f78671b24da?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1662074819661-d941775aafdf?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "1969 Chevrolet Camaro",
        &[
            "https://images.unsplash.com/photo-1603553329474-99f95f35394f?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1612477512956-17915157c6ac?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1591105327764-cfc76c183e31?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "1965 Shelby Cobra",
        &[
            "https://images.unsplash.com/photo-1625766327130-6dca50a59674?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1597687210367-04dd2ef406ad?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "1970 Dodge Charger",
        &[
            "https://images.unsplash.com/photo-1569171206684-dfb2749d96fd?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1611821064430-0d40291ac024?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "1953 Ford F100",
        &[
            "https://images.unsplash.com/photo-1614162692292-7ac56d7f7f1e?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1531086623190-a3bd615e55b5?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "1957 Chevrolet Bel Air",
        &[
            "https://images.unsplash.com/photo-1626142518657-7f3f336b2cec?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1626190304027-3ac12ebafc81?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "1969 Ford Mustang Fastback",
        &[
            "https://images.unsplash.com/photo-1603553329474-99f95f35394f?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1610844834548-2231f882e636?w=1200&auto=format&fit=crop",
        ],
    ),
];

const PART_IMAGES: &[(&str, &[&str])] = &[
    (
        "Engine",
        &[
            "https://images.unsplash.com/photo-1635518425536-56e4ee38d30c?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1503376780353-7e6692767b70?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "Transmission",
        &["https://images.unsplash.com/photo-1633382522397-6e2b0b911f5d?w=1200&auto=format&fit=crop"],
    ),
    (
        "Suspension",
        &["https://images.unsplash.com/photo-1629207856268-0f3a029cc376?w=1200&auto=format&fit=crop"],
    ),
    (
        "Brakes",
        &[
            "https://images.unsplash.com/photo-1578232663042-b648102f7378?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1623981566040-f2858922acee?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "Wheels",
        &[
            "https://images.unsplash.com/photo-1525328302834-e5cb20593422?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1573577425778-75eeb5b01d8d?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "Interior",
        &[
            "https://images.unsplash.com/photo-1622152802481-df5afb0a5735?w=1200&auto=format&fit=crop",
            "https://images.unsplash.com/photo-1511508411044-56e7a3c6947f?w=1200&auto=format&fit=crop",
        ],
    ),
    (
        "Exhaust",
        &["https://images.unsplash.com/photo-1621963563999-3b99f0dbc678?w=1200&auto=format&fit=crop"],
    ),
    (
        "Seats",
        &["https://images.unsplash.com/photo-1600794954488-9042ba976a35?w=1200&auto=format&fit=crop"],
    ),
];

/// One named group of images (a car model or a part name).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FallbackEntry {
    pub name: String,
    pub urls: Vec<String>,
}

impl FallbackEntry {
    fn from_static(name: &str, urls: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[derive(Deserialize)]
struct TableFile {
    #[serde(default)]
    vehicles: Vec<FallbackEntry>,
    #[serde(default)]
    parts: Vec<FallbackEntry>,
}

/// Immutable vehicle and part image tables.
///
/// Every entry has at least one URL and neither table is empty, so a
/// resolver built on it always has something to return.
#[derive(Debug, Clone)]
pub struct FallbackImageTable {
    vehicles: Vec<FallbackEntry>,
    parts: Vec<FallbackEntry>,
}

impl FallbackImageTable {
    /// Build a table, rejecting empty tables and entries without URLs.
    ///
    /// # Errors
    /// Returns `Error::InvalidFallbackTable` describing the first problem.
    pub fn new(vehicles: Vec<FallbackEntry>, parts: Vec<FallbackEntry>) -> Result<Self> {
        validate("vehicles", &vehicles)?;
        validate("parts", &parts)?;
        Ok(Self { vehicles, parts })
    }

    /// The curated table shipped with the configurator.
    pub fn builtin() -> Self {
        let build = |rows: &[(&str, &[&str])]| {
            rows.iter()
                .map(|(name, urls)| FallbackEntry::from_static(name, urls))
                .collect::<Vec<_>>()
        };
        Self {
            vehicles: build(VEHICLE_IMAGES),
            parts: build(PART_IMAGES),
        }
    }

    /// Parse a TOML table made of `[[vehicles]]` and `[[parts]]` entries.
    ///
    /// # Errors
    /// Returns `Error::Toml` on syntax errors and
    /// `Error::InvalidFallbackTable` if validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TableFile = toml::from_str(content)?;
        Self::new(file.vehicles, file.parts)
    }

    /// Load `fallback_images.toml` from `home`, or the built-in table if the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or is invalid.
    pub fn load_or_builtin(home: &Path) -> Result<Self> {
        let path = home.join(FALLBACK_TABLE_FILE);
        if !path.exists() {
            debug!("No {} found, using built-in fallback images", FALLBACK_TABLE_FILE);
            return Ok(Self::builtin());
        }

        let content = std::fs::read_to_string(&path)?;
        let table = Self::from_toml_str(&content)?;
        info!(
            "Loaded fallback images from {:?} ({} vehicles, {} parts)",
            path,
            table.vehicles.len(),
            table.parts.len()
        );
        Ok(table)
    }

    pub fn vehicles(&self) -> &[FallbackEntry] {
        &self.vehicles
    }

    pub fn parts(&self) -> &[FallbackEntry] {
        &self.parts
    }
}

fn validate(table: &str, entries: &[FallbackEntry]) -> Result<()> {
    if entries.is_empty() {
        return Err(Error::InvalidFallbackTable(format!("{} table is empty", table)));
    }
    for entry in entries {
        if entry.urls.is_empty() {
            return Err(Error::InvalidFallbackTable(format!(
                "{} entry '{}' has no URLs",
                table, entry.name
            )));
        }
        if entry.urls.iter().any(|u| u.trim().is_empty()) {
            return Err(Error::InvalidFallbackTable(format!(
                "{} entry '{}' has a blank URL",
                table, entry.name
            )));
        }
    }
    Ok(())
}

/// Picks a representative image for a car model or part name.
#[derive(Debug, Clone)]
pub struct FallbackImageResolver {
    table: Arc<FallbackImageTable>,
}

impl FallbackImageResolver {
    pub fn new(table: Arc<FallbackImageTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &FallbackImageTable {
        &self.table
    }

    /// Image for a car model. Never fails.
    pub fn resolve_vehicle(&self, name: &str) -> String {
        pick(&self.table.vehicles, name).to_string()
    }

    /// Image for a part. Never fails.
    pub fn resolve_part(&self, name: &str) -> String {
        pick(&self.table.parts, name).to_string()
    }

    /// Image for a subject: the part table when a part is named, otherwise
    /// the vehicle table.
    pub fn resolve(&self, subject: &Subject) -> String {
        match subject {
            Subject::Part { part, .. } => self.resolve_part(part),
            Subject::Vehicle { model } => self.resolve_vehicle(model),
        }
    }
}

fn pick<'a>(entries: &'a [FallbackEntry], name: &str) -> &'a str {
    let name = name.trim();
    let mut rng = rand::thread_rng();

    if let Some(entry) = entries.iter().find(|e| e.name == name) {
        return choose(&mut rng, &entry.urls);
    }

    // An empty needle would match every key
    if !name.is_empty() {
        let needle = name.to_lowercase();
        let partial = entries.iter().find(|e| {
            let key = e.name.to_lowercase();
            needle.contains(&key) || key.contains(&needle)
        });
        if let Some(entry) = partial {
            return choose(&mut rng, &entry.urls);
        }
    }

    let all: Vec<&String> = entries.iter().flat_map(|e| e.urls.iter()).collect();
    all[rng.gen_range(0..all.len())]
}

fn choose<'a>(rng: &mut impl Rng, urls: &'a [String]) -> &'a str {
    &urls[rng.gen_range(0..urls.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const SAMPLES: usize = 200;

    fn resolver() -> FallbackImageResolver {
        FallbackImageResolver::new(Arc::new(FallbackImageTable::builtin()))
    }

    fn urls_for(entries: &[FallbackEntry], name: &str) -> HashSet<String> {
        entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.urls.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn all_urls(entries: &[FallbackEntry]) -> HashSet<String> {
        entries.iter().flat_map(|e| e.urls.iter().cloned()).collect()
    }

    #[test]
    fn test_always_returns_table_url() {
        let resolver = resolver();
        let vehicles = all_urls(resolver.table().vehicles());
        let parts = all_urls(resolver.table().parts());

        for name in ["", "   ", "Delorean DMC-12", "1967 Ford Mustang", "zzz"] {
            for _ in 0..20 {
                let url = resolver.resolve_vehicle(name);
                assert!(!url.is_empty());
                assert!(vehicles.contains(&url), "{} not in vehicle table", url);

                let url = resolver.resolve_part(name);
                assert!(parts.contains(&url), "{} not in part table", url);
            }
        }
    }

    #[test]
    fn test_exact_match_stays_within_key() {
        let resolver = resolver();
        let expected = urls_for(resolver.table().vehicles(), "1967 Ford Mustang");
        assert_eq!(expected.len(), 3);

        let seen: HashSet<String> = (0..SAMPLES)
            .map(|_| resolver.resolve_vehicle("1967 Ford Mustang"))
            .collect();
        assert!(seen.is_subset(&expected));
        // 200 uniform draws over 3 URLs should hit more than one
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_superstring_matches_key() {
        let resolver = resolver();
        let expected = urls_for(resolver.table().vehicles(), "1969 Chevrolet Camaro");

        for _ in 0..SAMPLES {
            let url = resolver.resolve_vehicle("1969 Chevrolet Camaro SS");
            assert!(expected.contains(&url));
        }
    }

    #[test]
    fn test_substring_is_case_insensitive_both_ways() {
        let resolver = resolver();
        let brakes = urls_for(resolver.table().parts(), "Brakes");
        let exhaust = urls_for(resolver.table().parts(), "Exhaust");

        for _ in 0..50 {
            assert!(brakes.contains(&resolver.resolve_part("front disc BRAKES kit")));
            assert!(exhaust.contains(&resolver.resolve_part("exh")));
        }
    }

    #[test]
    fn test_first_partial_match_wins() {
        let table = FallbackImageTable::new(
            vec![
                FallbackEntry {
                    name: "Mustang".into(),
                    urls: vec!["https://img/mustang".into()],
                },
                FallbackEntry {
                    name: "Ford Mustang".into(),
                    urls: vec!["https://img/ford-mustang".into()],
                },
            ],
            vec![FallbackEntry {
                name: "Engine".into(),
                urls: vec!["https://img/engine".into()],
            }],
        )
        .unwrap();
        let resolver = FallbackImageResolver::new(Arc::new(table));

        assert_eq!(resolver.resolve_vehicle("1967 Ford Mustang"), "https://img/mustang");
        assert_eq!(resolver.resolve_vehicle("Ford Mustang"), "https://img/ford-mustang");
    }

    #[test]
    fn test_resolve_subject_prefers_part() {
        let resolver = resolver();
        let brakes = urls_for(resolver.table().parts(), "Brakes");
        let subject = Subject::Part {
            part: "Brakes".into(),
            model: Some("1969 Chevrolet Camaro".into()),
        };
        for _ in 0..20 {
            assert!(brakes.contains(&resolver.resolve(&subject)));
        }
    }

    #[test]
    fn test_rejects_entry_without_urls() {
        let err = FallbackImageTable::from_toml_str(
            r#"
            [[vehicles]]
            name = "1970 Plymouth Barracuda"
            urls = []

            [[parts]]
            name = "Engine"
            urls = ["https://img/engine"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFallbackTable(_)));
    }

    #[test]
    fn test_rejects_empty_table() {
        let err = FallbackImageTable::from_toml_str(
            r#"
            [[vehicles]]
            name = "1970 Plymouth Barracuda"
            urls = ["https://img/cuda"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFallbackTable(_)));
    }

    #[test]
    fn test_builtin_photo_ids_are_lowercase_hex() {
        let table = FallbackImageTable::builtin();
        let urls = table
            .vehicles()
            .iter()
            .chain(table.parts().iter())
            .flat_map(|e| e.urls.iter());

        for url in urls {
            let id = url
                .strip_prefix("https://images.unsplash.com/photo-")
                .and_then(|rest| rest.split('?').next())
                .unwrap_or_else(|| panic!("not an unsplash photo url: {}", url));
            let (stamp, hash) = id.split_once('-').unwrap();
            assert!(stamp.chars().all(|c| c.is_ascii_digit()), "{}", url);
            assert!(
                hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
                "{}",
                url
            );
        }
        assert!(table
            .parts()
            .iter()
            .any(|e| e.urls.iter().any(|u| u.contains("f2858922acee?"))));
    }

    #[test]
    fn test_builtin_is_valid() {
        let table = FallbackImageTable::builtin();
        assert!(FallbackImageTable::new(table.vehicles.clone(), table.parts.clone()).is_ok());
    }
}
