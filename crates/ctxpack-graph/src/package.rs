//! package.json metadata for third-party references

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Declared dependencies of the project being packed
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
}

impl PackageMetadata {
    /// Load `package.json` from a file
    pub fn from_file(path: &Path) -> Result<Self, PackageError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PackageError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_json(&contents)
    }

    /// Parse `package.json` contents
    pub fn from_json(json: &str) -> Result<Self, PackageError> {
        serde_json::from_str(json).map_err(|e| PackageError::ParseError(e.to_string()))
    }

    /// Best-effort load of `<root>/package.json`.
    ///
    /// A missing or unreadable file yields `None`.
    pub fn load(root: &Path) -> Option<Self> {
        let path = root.join("package.json");
        if !path.exists() {
            return None;
        }

        match Self::from_file(&path) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring package.json");
                None
            }
        }
    }

    /// Declared version range for a package, searching runtime, peer and
    /// dev dependencies in that order
    pub fn version_of(&self, package: &str) -> Option<&str> {
        self.dependencies
            .get(package)
            .or_else(|| self.peer_dependencies.get(package))
            .or_else(|| self.dev_dependencies.get(package))
            .map(String::as_str)
    }

    /// Package name and declared version for an import specifier
    pub fn lookup(&self, specifier: &str) -> Option<(String, Option<String>)> {
        let package = package_name_of(specifier)?;
        let version = self.version_of(&package).map(str::to_string);
        Some((package, version))
    }
}

/// Package name of a bare specifier (`lodash/debounce` -> `lodash`,
/// `@mui/material/Button` -> `@mui/material`)
pub fn package_name_of(specifier: &str) -> Option<String> {
    if !ctxpack_core::path::is_package_specifier(specifier) {
        return None;
    }

    let mut segments = specifier.split('/');
    let first = segments.next()?;

    if first.starts_with('@') {
        let second = segments.next().filter(|s| !s.is_empty())?;
        Some(format!("{}/{}", first, second))
    } else {
        Some(first.to_string())
    }
}

/// package.json errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to read {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse package.json: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGE_JSON: &str = r#"{
        "name": "demo-app",
        "dependencies": { "react": "^18.2.0", "@mui/material": "5.15.0" },
        "devDependencies": { "left-pad": "1.3.0" }
    }"#;

    #[test]
    fn package_names() {
        assert_eq!(package_name_of("react").as_deref(), Some("react"));
        assert_eq!(package_name_of("lodash/debounce").as_deref(), Some("lodash"));
        assert_eq!(package_name_of("@mui/material/Button").as_deref(), Some("@mui/material"));
        assert_eq!(package_name_of("./Button"), None);
        assert_eq!(package_name_of("Button"), None);
    }

    #[test]
    fn lookup_versions() {
        let meta = PackageMetadata::from_json(PACKAGE_JSON).unwrap();
        assert_eq!(meta.name.as_deref(), Some("demo-app"));
        assert_eq!(
            meta.lookup("@mui/material/Button"),
            Some(("@mui/material".to_string(), Some("5.15.0".to_string())))
        );
        assert_eq!(
            meta.lookup("left-pad"),
            Some(("left-pad".to_string(), Some("1.3.0".to_string())))
        );
        assert_eq!(meta.lookup("zod"), Some(("zod".to_string(), None)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PackageMetadata::load(dir.path()).is_none());

        std::fs::write(dir.path().join("package.json"), PACKAGE_JSON).unwrap();
        let meta = PackageMetadata::load(dir.path()).unwrap();
        assert_eq!(meta.version_of("react"), Some("^18.2.0"));

        std::fs::write(dir.path().join("package.json"), "{ not json").unwrap();
        assert!(PackageMetadata::load(dir.path()).is_none());
    }
}
