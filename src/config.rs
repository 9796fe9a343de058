use std::path::PathBuf;
use std::str::FromStr;

use crate::catalogue::{CatalogueError, Catalogues};

/// Process configuration, read once from `VENUEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub catalogue_path: Option<PathBuf>,
    pub cleaning_gap_minutes: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "venuebook".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
            catalogue_path: None,
            cleaning_gap_minutes: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparsable numbers fall back to their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            bind: get("VENUEBOOK_BIND").unwrap_or(d.bind),
            port: parsed(&get, "VENUEBOOK_PORT").unwrap_or(d.port),
            data_dir: get("VENUEBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            password: get("VENUEBOOK_PASSWORD").unwrap_or(d.password),
            max_connections: parsed(&get, "VENUEBOOK_MAX_CONNECTIONS").unwrap_or(d.max_connections),
            compact_threshold: parsed(&get, "VENUEBOOK_COMPACT_THRESHOLD")
                .unwrap_or(d.compact_threshold),
            metrics_port: parsed(&get, "VENUEBOOK_METRICS_PORT"),
            tls_cert: get("VENUEBOOK_TLS_CERT"),
            tls_key: get("VENUEBOOK_TLS_KEY"),
            catalogue_path: get("VENUEBOOK_CATALOGUE").map(PathBuf::from),
            cleaning_gap_minutes: parsed(&get, "VENUEBOOK_CLEANING_GAP_MINUTES"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Built-in catalogues unless a file is configured, then the gap override.
    pub fn catalogues(&self) -> Result<Catalogues, CatalogueError> {
        let base = match &self.catalogue_path {
            Some(path) => Catalogues::load(path)?,
            None => Catalogues::builtin(),
        };
        Ok(base.with_cleaning_gap(self.cleaning_gap_minutes))
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
        assert_eq!(Config::default().addr(), "0.0.0.0:5433");
    }

    #[test]
    fn reads_every_variable() {
        let c = Config::from_lookup(lookup(&[
            ("VENUEBOOK_BIND", "127.0.0.1"),
            ("VENUEBOOK_PORT", "6543"),
            ("VENUEBOOK_DATA_DIR", "/var/lib/venuebook"),
            ("VENUEBOOK_PASSWORD", "s3cret"),
            ("VENUEBOOK_MAX_CONNECTIONS", "8"),
            ("VENUEBOOK_COMPACT_THRESHOLD", "50"),
            ("VENUEBOOK_METRICS_PORT", "9000"),
            ("VENUEBOOK_TLS_CERT", "cert.pem"),
            ("VENUEBOOK_TLS_KEY", "key.pem"),
            ("VENUEBOOK_CATALOGUE", "venue.json"),
            ("VENUEBOOK_CLEANING_GAP_MINUTES", "15"),
        ]));
        assert_eq!(c.addr(), "127.0.0.1:6543");
        assert_eq!(c.data_dir, PathBuf::from("/var/lib/venuebook"));
        assert_eq!(c.password, "s3cret");
        assert_eq!(c.max_connections, 8);
        assert_eq!(c.compact_threshold, 50);
        assert_eq!(c.metrics_port, Some(9000));
        assert_eq!(c.tls_cert.as_deref(), Some("cert.pem"));
        assert_eq!(c.tls_key.as_deref(), Some("key.pem"));
        assert_eq!(c.catalogue_path, Some(PathBuf::from("venue.json")));
        assert_eq!(c.cleaning_gap_minutes, Some(15));
    }

    #[test]
    fn bad_numbers_fall_back() {
        let c = Config::from_lookup(lookup(&[
            ("VENUEBOOK_PORT", "not-a-port"),
            ("VENUEBOOK_MAX_CONNECTIONS", "-1"),
            ("VENUEBOOK_METRICS_PORT", "99999"),
        ]));
        assert_eq!(c.port, 5433);
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.metrics_port, None);
    }

    #[test]
    fn each_number_parses_as_its_own_type() {
        // 70000 overflows a port but is a fine connection count.
        let c = Config::from_lookup(lookup(&[
            ("VENUEBOOK_PORT", "70000"),
            ("VENUEBOOK_MAX_CONNECTIONS", "70000"),
            ("VENUEBOOK_COMPACT_THRESHOLD", " 5000000000 "),
            ("VENUEBOOK_CLEANING_GAP_MINUTES", "-5"),
        ]));
        assert_eq!(c.port, 5433);
        assert_eq!(c.max_connections, 70000);
        assert_eq!(c.compact_threshold, 5_000_000_000);
        assert_eq!(c.cleaning_gap_minutes, None);
    }

    #[test]
    fn gap_override_applies_to_builtin_catalogues() {
        let c = Config::from_lookup(lookup(&[("VENUEBOOK_CLEANING_GAP_MINUTES", "45")]));
        let catalogues = c.catalogues().unwrap();
        assert_eq!(catalogues.spa.cleaning_gap_minutes, 45);
        assert_eq!(catalogues.cinema.cleaning_gap_minutes, 45);
    }

    #[test]
    fn missing_catalogue_file_is_an_error() {
        let c = Config::from_lookup(lookup(&[("VENUEBOOK_CATALOGUE", "/nonexistent/venue.json")]));
        assert!(matches!(c.catalogues(), Err(CatalogueError::Io(_))));
    }
}
