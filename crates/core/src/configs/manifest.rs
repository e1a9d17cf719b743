//! The subset of `package.json` the script registry reads

use serde::Deserialize;

use crate::types::RunAllResult;

/// The subset of a `package.json` the script registry reads
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Declaration order is preserved so wildcard expansion follows it
    pub scripts: Option<serde_json::Map<String, serde_json::Value>>,
}

pub fn parse_package_manifest(json_str: &str) -> RunAllResult<PackageManifest> {
    let manifest: PackageManifest = serde_json::from_str(json_str)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_keep_declaration_order() {
        let manifest = parse_package_manifest(
            r#"{ "name": "demo", "version": "1.0.0", "scripts": { "zeta": "a", "alpha": "b" } }"#,
        )
        .unwrap();
        let scripts = manifest.scripts.unwrap();
        let keys: Vec<_> = scripts.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_unknown_manifest_fields_are_ignored() {
        let manifest =
            parse_package_manifest(r#"{ "private": true, "dependencies": {} }"#).unwrap();
        assert!(manifest.scripts.is_none());
        assert!(manifest.name.is_none());
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        assert!(parse_package_manifest("{ not json").is_err());
    }
}
