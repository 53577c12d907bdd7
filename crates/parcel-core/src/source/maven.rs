//! Maven artifact coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

const PREFIX: &str = "mvn:";
const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";
const DEFAULT_PACKAGING: &str = "jar";

/// Coordinate of an artifact in a Maven repository.
///
/// Short form: `mvn:groupId:artifactId:version[:classifier[:type]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MavenCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<String>,
}

impl MavenCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            packaging: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn with_packaging(mut self, packaging: impl Into<String>) -> Self {
        self.packaging = Some(packaging.into());
        self
    }

    /// Whether `raw` looks like a short-form coordinate.
    pub fn is_short_form(raw: &str) -> bool {
        raw.starts_with(PREFIX)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let body = raw
            .strip_prefix(PREFIX)
            .ok_or_else(|| anyhow::anyhow!("Maven coordinate must start with '{}': {}", PREFIX, raw))?;

        let parts: Vec<&str> = body.split(':').collect();
        if !(3..=5).contains(&parts.len()) {
            anyhow::bail!(
                "Invalid maven coordinate '{}'. Expected mvn:groupId:artifactId:version[:classifier[:type]]",
                raw
            );
        }
        if parts[..3].iter().any(|part| part.is_empty()) {
            anyhow::bail!("Invalid maven coordinate '{}': empty segment", raw);
        }

        let optional = |index: usize| {
            parts
                .get(index)
                .filter(|part| !part.is_empty())
                .map(|part| part.to_string())
        };

        Ok(Self {
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: optional(3),
            packaging: optional(4),
        })
    }

    /// Snapshot versions are mutable: the same coordinate may resolve to new
    /// content over time.
    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with(SNAPSHOT_SUFFIX)
    }

    pub fn packaging(&self) -> &str {
        self.packaging.as_deref().unwrap_or(DEFAULT_PACKAGING)
    }

    /// `artifactId-version[-classifier].type`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact_id,
                self.version,
                classifier,
                self.packaging()
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.packaging()),
        }
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}:{}",
            PREFIX, self.group_id, self.artifact_id, self.version
        )?;
        match (&self.classifier, &self.packaging) {
            (Some(classifier), Some(packaging)) => write!(f, ":{}:{}", classifier, packaging),
            (Some(classifier), None) => write!(f, ":{}", classifier),
            (None, Some(packaging)) => write!(f, "::{}", packaging),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_coordinate() {
        let coord = MavenCoordinate::parse("mvn:ch.exense:tests:1.0.0").unwrap();
        assert_eq!(coord, MavenCoordinate::new("ch.exense", "tests", "1.0.0"));
        assert!(!coord.is_snapshot());
        assert_eq!(coord.file_name(), "tests-1.0.0.jar");
    }

    #[test]
    fn parses_classifier_and_type() {
        let coord = MavenCoordinate::parse("mvn:g:a:2.0-SNAPSHOT:tests:zip").unwrap();
        assert!(coord.is_snapshot());
        assert_eq!(coord.classifier.as_deref(), Some("tests"));
        assert_eq!(coord.file_name(), "a-2.0-SNAPSHOT-tests.zip");
        assert_eq!(coord.to_string(), "mvn:g:a:2.0-SNAPSHOT:tests:zip");
    }

    #[test]
    fn type_without_classifier_keeps_empty_slot() {
        let coord = MavenCoordinate::parse("mvn:g:a:1::zip").unwrap();
        assert_eq!(coord.classifier, None);
        assert_eq!(coord.packaging(), "zip");
        assert_eq!(coord.to_string(), "mvn:g:a:1::zip");
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert!(MavenCoordinate::parse("g:a:1").is_err());
        assert!(MavenCoordinate::parse("mvn:g:a").is_err());
        assert!(MavenCoordinate::parse("mvn:g::1").is_err());
        assert!(MavenCoordinate::parse("mvn:a:b:c:d:e:f").is_err());
    }
}
