//! Policy Parser (V, parse half): loads a policy from a TOML document.
//!
//! Unknown top-level fields are ignored for forward compatibility (serde's
//! default behavior); unknown enum values fail deserialization, which we
//! surface as `InvalidFieldValue` naming the offending field and value.

use super::model::Policy;
use hops_shared::errors::{HopsError, HopsResult};
use std::path::Path;

/// Parse a policy from its TOML text.
pub fn parse(text: &str) -> HopsResult<Policy> {
    toml::from_str::<Policy>(text).map_err(|e| classify_parse_error(text, e))
}

/// Parse a policy from a file on disk.
pub fn parse_file(path: &Path) -> HopsResult<Policy> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HopsError::Configuration(format!("policy file not found: {}", path.display()))
        } else {
            HopsError::Configuration(format!("cannot read policy file {}: {e}", path.display()))
        }
    })?;
    parse(&text)
}

/// Translate a `toml` deserialization error into the parse error taxonomy
/// categories: `MissingRequiredField`, `InvalidFieldValue`, or the
/// generic `InvalidTOML` fallback.
fn classify_parse_error(text: &str, e: toml::de::Error) -> HopsError {
    let message = e.message().to_string();
    if message.starts_with("missing field") {
        HopsError::Configuration(format!("MissingRequiredField: {message}"))
    } else if message.contains("unknown variant") {
        HopsError::Configuration(format!("InvalidFieldValue: {message}"))
    } else if text.trim().is_empty() {
        HopsError::Configuration("MissingRequiredField: empty policy document".to_string())
    } else {
        HopsError::Configuration(format!("InvalidTOML: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::NetworkMode;

    const MINIMAL: &str = r#"
        name = "dev"
    "#;

    #[test]
    fn applies_defaults_for_minimal_policy() {
        let policy = parse(MINIMAL).unwrap();
        assert_eq!(policy.name, "dev");
        assert_eq!(policy.version, "1.0.0");
        assert_eq!(policy.capability_grant.network_mode, NetworkMode::Disabled);
        assert!(policy.capability_grant.filesystem_rights.is_empty());
        assert!(policy.capability_grant.resource_limits.cpu_count.is_none());
    }

    #[test]
    fn missing_name_is_a_missing_required_field() {
        let err = parse("version = \"2.0.0\"").unwrap_err();
        assert!(matches!(err, HopsError::Configuration(m) if m.contains("MissingRequiredField")));
    }

    #[test]
    fn unknown_network_mode_is_an_invalid_field_value() {
        let text = r#"
            name = "dev"
            [capability_grant]
            network_mode = "Bogus"
        "#;
        let err = parse(text).unwrap_err();
        assert!(matches!(err, HopsError::Configuration(m) if m.contains("InvalidFieldValue")));
    }

    #[test]
    fn full_policy_round_trips_modulo_defaults() {
        let text = r#"
            name = "builder"
            version = "2.1.0"
            rootfs_image = "alpine"

            [capability_grant]
            network_mode = "Outbound"
            filesystem_rights = ["Read", "Write"]
            allowed_paths = ["/usr/local"]

            [capability_grant.resource_limits]
            cpu_count = 2
            memory_bytes = 536870912

            [sandbox_config]
            root_path = "/"
            hostname = "builder-box"
            environment = [["KEY", "value"]]

            [[sandbox_config.mounts]]
            source = "/data"
            destination = "/data"
            type = "Bind"
            mode = "ReadWrite"
        "#;
        let policy = parse(text).unwrap();
        assert_eq!(policy.name, "builder");
        assert_eq!(policy.version, "2.1.0");
        assert!(policy.is_networked());
        assert_eq!(policy.sandbox_config.mounts.len(), 1);
        assert_eq!(
            policy.capability_grant.resource_limits.cpu_count,
            Some(2)
        );
    }
}
