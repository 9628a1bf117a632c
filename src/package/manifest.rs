//! Package manifest parsing
//!
//! Reads the `META-INF/MANIFEST.MF` main section: `Key: Value` lines, with
//! lines starting with a single space continuing the previous value.

use crate::error::{HostError, HostResult};
use semver::{Version, VersionReq};
use std::collections::HashMap;

/// Manifest entry path inside a package
pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

const START_CLASS: &str = "Start-Class";
const CLASSES_DIR: &str = "Boot-Classes";
const LIB_DIR: &str = "Boot-Lib";
const FRAMEWORK_VERSION: &str = "Boot-Version";

const DEFAULT_CLASSES_DIR: &str = "BOOT-INF/classes/";
const DEFAULT_LIB_DIR: &str = "BOOT-INF/lib/";

/// Parsed package manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    attributes: HashMap<String, String>,
}

impl PackageManifest {
    /// Parse manifest text
    pub fn parse(content: &str) -> Self {
        let mut attributes = HashMap::new();
        let mut current: Option<(String, String)> = None;

        for line in content.lines() {
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(continuation);
                }
                continue;
            }

            if let Some((key, value)) = current.take() {
                attributes.insert(key, value);
            }

            // Blank line ends the main section
            if line.trim().is_empty() {
                break;
            }

            if let Some((key, value)) = line.split_once(':') {
                current = Some((key.trim().to_string(), value.trim_start().to_string()));
            }
        }

        if let Some((key, value)) = current {
            attributes.insert(key, value);
        }

        Self { attributes }
    }

    /// Raw attribute lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Main entry point name
    pub fn start_class(&self) -> Option<&str> {
        self.get(START_CLASS).filter(|s| !s.is_empty())
    }

    /// Main entry point name, or `ManifestInvalid` naming `package`
    pub fn require_start_class(&self, package: &str) -> HostResult<&str> {
        self.start_class().ok_or_else(|| HostError::ManifestInvalid {
            package: package.to_string(),
            reason: format!("missing {START_CLASS} attribute"),
        })
    }

    /// Directory holding the primary classes (always ends in `/`)
    pub fn classes_dir(&self) -> String {
        with_trailing_slash(self.get(CLASSES_DIR).unwrap_or(DEFAULT_CLASSES_DIR))
    }

    /// Directory holding bundled libraries (always ends in `/`)
    pub fn lib_dir(&self) -> String {
        with_trailing_slash(self.get(LIB_DIR).unwrap_or(DEFAULT_LIB_DIR))
    }

    /// Declared framework version, if any
    pub fn framework_version(&self) -> Option<&str> {
        self.get(FRAMEWORK_VERSION)
    }

    /// Check the declared framework version against a requirement.
    ///
    /// Packages without a declared version are accepted.
    pub fn check_framework_version(&self, supported: &VersionReq) -> HostResult<()> {
        let Some(declared) = self.framework_version() else {
            return Ok(());
        };

        let unsupported = || HostError::UnsupportedFrameworkVersion {
            found: declared.to_string(),
            supported: supported.to_string(),
        };

        let version = parse_lenient(declared).ok_or_else(unsupported)?;
        if supported.matches(&version) {
            Ok(())
        } else {
            Err(unsupported())
        }
    }
}

/// Parse versions such as `2.7.18`, `3.1` or `2.0.0.RELEASE`
fn parse_lenient(declared: &str) -> Option<Version> {
    let numeric: Vec<u64> = declared
        .split(['.', '-'])
        .map_while(|part| part.parse().ok())
        .take(3)
        .collect();

    match numeric.as_slice() {
        [major] => Some(Version::new(*major, 0, 0)),
        [major, minor] => Some(Version::new(*major, *minor, 0)),
        [major, minor, patch] => Some(Version::new(*major, *minor, *patch)),
        _ => None,
    }
}

fn with_trailing_slash(dir: &str) -> String {
    let trimmed = dir.trim().trim_start_matches('/');
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
