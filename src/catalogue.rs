//! Per-service slot catalogues and the duration resolver.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::interval::{SlotLabelError, parse_slot_label};
use crate::model::ServiceKind;

pub const DEFAULT_CLEANING_GAP_MINUTES: u32 = 30;

fn default_cleaning_gap() -> u32 {
    DEFAULT_CLEANING_GAP_MINUTES
}

/// Fixed daily offering of one service. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCatalogue {
    pub service: ServiceKind,
    /// Ordered start times, e.g. `"09:00 AM"`.
    pub slot_labels: Vec<String>,
    /// Tier id (lowercase) → session minutes.
    pub tier_durations: BTreeMap<String, u32>,
    /// Legacy free-text package names → session minutes.
    #[serde(default)]
    pub package_durations: BTreeMap<String, u32>,
    /// Used when a record carries neither a known tier nor a known package.
    pub default_duration_minutes: u32,
    #[serde(default = "default_cleaning_gap")]
    pub cleaning_gap_minutes: u32,
    /// Also reject candidates whose own buffer would run into a later booking.
    #[serde(default)]
    pub strict_buffer: bool,
}

fn table(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn hourly(first_hour: u32, count: u32) -> Vec<String> {
    (first_hour..first_hour + count)
        .map(|h| crate::interval::SlotTime { hour: h, minute: 0 }.to_string())
        .collect()
}

impl ServiceCatalogue {
    pub fn spa() -> Self {
        Self {
            service: ServiceKind::Spa,
            slot_labels: hourly(9, 12),
            tier_durations: table(&[("standard", 60), ("premium", 90), ("deluxe", 120)]),
            package_durations: table(&[
                ("1 Hour Session", 60),
                ("1.5 Hour Session", 90),
                ("2 Hour Premium Session", 120),
            ]),
            default_duration_minutes: 60,
            cleaning_gap_minutes: DEFAULT_CLEANING_GAP_MINUTES,
            strict_buffer: false,
        }
    }

    pub fn cinema() -> Self {
        Self {
            service: ServiceKind::Cinema,
            slot_labels: hourly(10, 12),
            tier_durations: table(&[("standard", 180), ("premium", 360), ("deluxe", 720)]),
            package_durations: table(&[
                ("Standard Experience", 180),
                ("Premium Experience", 360),
                ("Deluxe Experience", 720),
            ]),
            default_duration_minutes: 180,
            cleaning_gap_minutes: DEFAULT_CLEANING_GAP_MINUTES,
            strict_buffer: false,
        }
    }

    pub fn builtin(service: ServiceKind) -> Self {
        match service {
            ServiceKind::Spa => Self::spa(),
            ServiceKind::Cinema => Self::cinema(),
        }
    }

    /// Session length for a tier id or legacy package name.
    ///
    /// Never fails: anything unrecognized resolves to the service default so
    /// one malformed historical row cannot break a day's availability.
    pub fn duration_minutes(&self, tier_or_package: &str) -> u32 {
        let key = tier_or_package.trim();
        self.tier_durations
            .get(&key.to_ascii_lowercase())
            .or_else(|| self.package_durations.get(key))
            .copied()
            .unwrap_or(self.default_duration_minutes)
    }

    pub fn is_known_tier(&self, tier_or_package: &str) -> bool {
        let key = tier_or_package.trim();
        self.tier_durations.contains_key(&key.to_ascii_lowercase())
            || self.package_durations.contains_key(key)
    }

    /// Resolve `label` to this catalogue's spelling of the same start time.
    pub fn find_slot(&self, label: &str) -> Result<&str, SlotLabelError> {
        let wanted = parse_slot_label(label)?;
        self.slot_labels
            .iter()
            .find(|s| parse_slot_label(s).is_ok_and(|t| t == wanted))
            .map(String::as_str)
            .ok_or_else(|| SlotLabelError::NotInCatalogue(label.to_string()))
    }

    pub fn validate(&self) -> Result<(), CatalogueError> {
        let mut seen = HashSet::new();
        for label in &self.slot_labels {
            let t = parse_slot_label(label)
                .map_err(|e| CatalogueError::Invalid(format!("{}: {e}", self.service)))?;
            if !seen.insert(t) {
                return Err(CatalogueError::Invalid(format!(
                    "{}: duplicate slot {label}",
                    self.service
                )));
            }
        }
        let zero = self
            .tier_durations
            .iter()
            .chain(self.package_durations.iter())
            .find(|(_, minutes)| **minutes == 0);
        if let Some((name, _)) = zero {
            return Err(CatalogueError::Invalid(format!(
                "{}: zero duration for {name}",
                self.service
            )));
        }
        if self.default_duration_minutes == 0 {
            return Err(CatalogueError::Invalid(format!(
                "{}: zero default duration",
                self.service
            )));
        }
        if self.tier_durations.keys().any(|k| *k != k.to_ascii_lowercase()) {
            return Err(CatalogueError::Invalid(format!(
                "{}: tier ids must be lowercase",
                self.service
            )));
        }
        Ok(())
    }
}

/// Session length for `tier_or_package` under the built-in tables.
pub fn duration_minutes(service: ServiceKind, tier_or_package: &str) -> u32 {
    ServiceCatalogue::builtin(service).duration_minutes(tier_or_package)
}

/// One catalogue per service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalogues {
    pub spa: ServiceCatalogue,
    pub cinema: ServiceCatalogue,
}

impl Default for Catalogues {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalogues {
    pub fn builtin() -> Self {
        Self {
            spa: ServiceCatalogue::spa(),
            cinema: ServiceCatalogue::cinema(),
        }
    }

    pub fn get(&self, service: ServiceKind) -> &ServiceCatalogue {
        match service {
            ServiceKind::Spa => &self.spa,
            ServiceKind::Cinema => &self.cinema,
        }
    }

    /// Load from a JSON file of the form `{"spa": {...}, "cinema": {...}}`.
    pub fn load(path: &Path) -> Result<Self, CatalogueError> {
        let text = std::fs::read_to_string(path).map_err(CatalogueError::Io)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogueError> {
        let catalogues: Catalogues = serde_json::from_str(text).map_err(CatalogueError::Json)?;
        catalogues.validate()?;
        Ok(catalogues)
    }

    pub fn validate(&self) -> Result<(), CatalogueError> {
        for service in ServiceKind::ALL {
            let c = self.get(service);
            if c.service != service {
                return Err(CatalogueError::Invalid(format!(
                    "catalogue under '{service}' declares service '{}'",
                    c.service
                )));
            }
            c.validate()?;
        }
        Ok(())
    }

    pub fn with_cleaning_gap(mut self, minutes: Option<u32>) -> Self {
        if let Some(m) = minutes {
            self.spa.cleaning_gap_minutes = m;
            self.cinema.cleaning_gap_minutes = m;
        }
        self
    }
}

#[derive(Debug)]
pub enum CatalogueError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for CatalogueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogueError::Io(e) => write!(f, "catalogue read error: {e}"),
            CatalogueError::Json(e) => write!(f, "catalogue parse error: {e}"),
            CatalogueError::Invalid(msg) => write!(f, "invalid catalogue: {msg}"),
        }
    }
}

impl std::error::Error for CatalogueError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spa_tiers_and_legacy_packages() {
        let spa = ServiceCatalogue::spa();
        assert_eq!(spa.duration_minutes("standard"), 60);
        assert_eq!(spa.duration_minutes("premium"), 90);
        assert_eq!(spa.duration_minutes("deluxe"), 120);
        assert_eq!(spa.duration_minutes("1.5 Hour Session"), 90);
        assert_eq!(spa.duration_minutes("2 Hour Premium Session"), 120);
    }

    #[test]
    fn cinema_tiers_and_legacy_packages() {
        assert_eq!(duration_minutes(ServiceKind::Cinema, "standard"), 180);
        assert_eq!(duration_minutes(ServiceKind::Cinema, "Premium"), 360);
        assert_eq!(duration_minutes(ServiceKind::Cinema, "Deluxe Experience"), 720);
    }

    #[test]
    fn unknown_identifiers_fall_back_to_service_default() {
        assert_eq!(duration_minutes(ServiceKind::Spa, "Mystery Package"), 60);
        assert_eq!(duration_minutes(ServiceKind::Spa, ""), 60);
        assert_eq!(duration_minutes(ServiceKind::Cinema, "platinum"), 180);
        assert!(!ServiceCatalogue::spa().is_known_tier("Mystery Package"));
        assert!(ServiceCatalogue::spa().is_known_tier(" Deluxe "));
    }

    #[test]
    fn builtin_slot_lists() {
        let spa = ServiceCatalogue::spa();
        assert_eq!(spa.slot_labels.len(), 12);
        assert_eq!(spa.slot_labels.first().map(String::as_str), Some("09:00 AM"));
        assert_eq!(spa.slot_labels.last().map(String::as_str), Some("08:00 PM"));
        let cinema = ServiceCatalogue::cinema();
        assert_eq!(cinema.slot_labels.first().map(String::as_str), Some("10:00 AM"));
        assert_eq!(cinema.slot_labels.last().map(String::as_str), Some("09:00 PM"));
        assert!(Catalogues::builtin().validate().is_ok());
    }

    #[test]
    fn find_slot_normalizes_spelling() {
        let spa = ServiceCatalogue::spa();
        assert_eq!(spa.find_slot("9:00 am").unwrap(), "09:00 AM");
        assert_eq!(
            spa.find_slot("11:30 AM"),
            Err(SlotLabelError::NotInCatalogue("11:30 AM".into()))
        );
        assert!(matches!(spa.find_slot("noon"), Err(SlotLabelError::Malformed(_))));
    }

    #[test]
    fn json_catalogue_with_defaults() {
        let json = r#"{
            "spa": {
                "service": "spa",
                "slot_labels": ["10:00 AM", "11:00 AM"],
                "tier_durations": {"standard": 45},
                "default_duration_minutes": 45
            },
            "cinema": {
                "service": "cinema",
                "slot_labels": ["06:00 PM"],
                "tier_durations": {"standard": 120},
                "default_duration_minutes": 120,
                "cleaning_gap_minutes": 60,
                "strict_buffer": true
            }
        }"#;
        let c = Catalogues::from_json(json).unwrap();
        assert_eq!(c.spa.cleaning_gap_minutes, DEFAULT_CLEANING_GAP_MINUTES);
        assert!(c.spa.package_durations.is_empty());
        assert_eq!(c.cinema.cleaning_gap_minutes, 60);
        assert!(c.cinema.strict_buffer);
    }

    #[test]
    fn json_catalogue_rejects_bad_slot() {
        let mut c = Catalogues::builtin();
        c.spa.slot_labels.push("25:00 PM".into());
        let json = serde_json::to_string(&c).unwrap();
        assert!(matches!(Catalogues::from_json(&json), Err(CatalogueError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_slots_and_zero_durations() {
        let mut spa = ServiceCatalogue::spa();
        spa.slot_labels.push("9:00 AM".into());
        assert!(spa.validate().is_err());

        let mut spa = ServiceCatalogue::spa();
        spa.tier_durations.insert("express".into(), 0);
        assert!(spa.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_service() {
        let mut c = Catalogues::builtin();
        c.cinema.service = ServiceKind::Spa;
        assert!(c.validate().is_err());
    }

    #[test]
    fn cleaning_gap_override() {
        let c = Catalogues::builtin().with_cleaning_gap(Some(15));
        assert_eq!(c.spa.cleaning_gap_minutes, 15);
        assert_eq!(c.cinema.cleaning_gap_minutes, 15);
        let c = Catalogues::builtin().with_cleaning_gap(None);
        assert_eq!(c.spa.cleaning_gap_minutes, DEFAULT_CLEANING_GAP_MINUTES);
    }
}
