//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and report every
//! unknown key with a "did you mean?" suggestion. Unknown keys reject the
//! file. Then proceed with normal serde deserialization and range checks.

use std::collections::HashSet;

/// An unknown or suspicious config key.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for SensorConfig.
///
/// Maintained by hand to match the struct hierarchy in sensor_config.rs.
/// Any new field added to SensorConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [system]
        "system",
        "system.location_id",
        "system.device_id",
        "system.cloud_sync_interval_secs",
        "system.data_dir",
        // [cellular]
        "cellular",
        "cellular.enabled",
        "cellular.bands",
        "cellular.sample_rate",
        "cellular.signal_threshold_dbm",
        "cellular.scan_expire_secs",
        "cellular.channel_cache_path",
        "cellular.scan_timeout_secs",
        "cellular.safety_margin_secs",
        "cellular.teardown_grace_secs",
        "cellular.scanner",
        "cellular.scanner.program",
        "cellular.scanner.args",
        "cellular.capture",
        "cellular.capture.program",
        "cellular.capture.args",
        "cellular.decoder",
        "cellular.decoder.program",
        "cellular.decoder.args",
        // [wifi]
        "wifi",
        "wifi.enabled",
        "wifi.server_host",
        "wifi.server_port",
        "wifi.username",
        "wifi.last_seen_secs",
        "wifi.signal_threshold_24ghz_dbm",
        "wifi.signal_threshold_5ghz_dbm",
        "wifi.max_deviation_db",
        "wifi.max_deviation_percent",
        "wifi.capture_window_secs",
        "wifi.safety_margin_secs",
        "wifi.request_timeout_secs",
        "wifi.pid_file",
        "wifi.artifact_dir",
        "wifi.artifact_prefix",
        "wifi.server",
        "wifi.server.program",
        "wifi.server.args",
        // [preflight]
        "preflight",
        "preflight.enabled",
        "preflight.wifi_adapter_patterns",
        "preflight.min_wifi_adapters",
        "preflight.sdr_patterns",
        // [upload]
        "upload",
        "upload.endpoint",
        "upload.timeout_secs",
        "upload.payload_path",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and report every key the schema does not know.
///
/// Syntax errors are left to the serde pass, which reports them with
/// line/column information.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    let mut found = walk_toml_keys(&value, "");
    found.sort();

    found
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            let message = format!("Unknown config key '{key}'");
            ValidationWarning {
                field: key,
                message,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Check every numeric value for a sane range.
///
/// Returns one descriptive message per offending key.
pub fn validate_ranges(config: &super::SensorConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.system.cloud_sync_interval_secs == 0 {
        errors.push("system.cloud_sync_interval_secs must be > 0".to_string());
    }
    if config.system.location_id.trim().is_empty() {
        errors.push("system.location_id must not be empty".to_string());
    }

    let c = &config.cellular;
    if c.enabled && c.bands.is_empty() {
        errors.push("cellular.bands must name at least one band".to_string());
    }
    if !(c.sample_rate.is_finite() && c.sample_rate > 0.0) {
        errors.push(format!(
            "cellular.sample_rate = {} must be a positive number of samples/s",
            c.sample_rate
        ));
    }
    if c.scan_expire_secs == 0 {
        errors.push("cellular.scan_expire_secs must be > 0".to_string());
    }
    if c.scan_timeout_secs == 0 {
        errors.push("cellular.scan_timeout_secs must be > 0".to_string());
    }
    if c.signal_threshold_dbm > 0 {
        errors.push(format!(
            "cellular.signal_threshold_dbm = {} must be <= 0 dBm",
            c.signal_threshold_dbm
        ));
    }

    let w = &config.wifi;
    if !(0.0..=100.0).contains(&w.max_deviation_percent) {
        errors.push(format!(
            "wifi.max_deviation_percent = {} is outside 0-100",
            w.max_deviation_percent
        ));
    }
    if w.max_deviation_db < 0 {
        errors.push(format!(
            "wifi.max_deviation_db = {} cannot be negative",
            w.max_deviation_db
        ));
    }
    for (name, value) in [
        ("wifi.signal_threshold_24ghz_dbm", w.signal_threshold_24ghz_dbm),
        ("wifi.signal_threshold_5ghz_dbm", w.signal_threshold_5ghz_dbm),
    ] {
        if value > 0 {
            errors.push(format!("{name} = {value} must be <= 0 dBm"));
        }
    }
    if w.last_seen_secs == 0 {
        errors.push("wifi.last_seen_secs must be > 0".to_string());
    }
    if w.server_host.trim().is_empty() {
        errors.push("wifi.server_host must not be empty".to_string());
    }
    if w.artifact_prefix.trim().is_empty() {
        // An empty prefix would match every file in artifact_dir on cleanup.
        errors.push("wifi.artifact_prefix must not be empty".to_string());
    }

    let p = &config.preflight;
    if p.enabled && p.sdr_patterns.is_empty() && c.enabled {
        errors.push("preflight.sdr_patterns must not be empty when cellular is enabled".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn walk_collects_nested_keys() {
        let value: toml::Value = "[a]\nb = 1\n[a.c]\nd = 2".parse().unwrap();
        let mut keys = walk_toml_keys(&value, "");
        keys.sort();
        assert_eq!(keys, vec!["a", "a.b", "a.c", "a.c.d"]);
    }

    #[test]
    fn known_keys_cover_serialized_defaults() {
        let toml = super::super::SensorConfig::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&toml).is_empty());
    }

    #[test]
    fn empty_artifact_prefix_rejected() {
        let mut config = super::super::SensorConfig::default();
        config.wifi.artifact_prefix = String::new();
        let errors = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("artifact_prefix")));
    }
}
