//! Build-time asset manifest: logical bundle names mapped to deployed URLs.

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read asset manifest `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("asset manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BundleAssets {
    #[serde(default)]
    pub js: Option<String>,
    #[serde(default)]
    pub css: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    bundles: BTreeMap<String, BundleAssets>,
}

impl AssetManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn bundle(&self, name: &str) -> Option<&BundleAssets> {
        self.bundles.get(name)
    }

    /// Script URLs, bundles listed in `order` first, the rest by name.
    pub fn scripts<S: AsRef<str>>(&self, order: &[S]) -> Vec<String> {
        self.collect(order, |bundle| bundle.js.as_deref())
    }

    /// Stylesheet URLs, bundles listed in `order` first, the rest by name.
    pub fn styles<S: AsRef<str>>(&self, order: &[S]) -> Vec<String> {
        self.collect(order, |bundle| bundle.css.as_deref())
    }

    fn collect<S, F>(&self, order: &[S], pick: F) -> Vec<String>
    where
        S: AsRef<str>,
        F: Fn(&BundleAssets) -> Option<&str>,
    {
        let mut seen: Vec<&str> = Vec::with_capacity(self.bundles.len());
        let mut urls = Vec::new();

        let preferred = order.iter().map(AsRef::as_ref);
        let remaining = self.bundles.keys().map(String::as_str);
        for name in preferred.chain(remaining) {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            if let Some(url) = self.bundles.get(name).and_then(&pick) {
                urls.push(url.to_string());
            }
        }
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "client": { "js": "/c.js", "css": "/c.css" },
        "vendor": { "js": "/v.js" }
    }"#;

    #[test]
    fn preferred_bundles_come_first() {
        let manifest = AssetManifest::from_json(SAMPLE).expect("manifest");
        assert_eq!(manifest.scripts(&["vendor", "client"]), vec!["/v.js", "/c.js"]);
        assert_eq!(manifest.styles(&["client"]), vec!["/c.css"]);
    }

    #[test]
    fn unlisted_bundles_follow_in_name_order() {
        let manifest = AssetManifest::from_json(
            r#"{ "zeta": { "js": "/z.js" }, "alpha": { "js": "/a.js" }, "client": { "js": "/c.js" } }"#,
        )
        .expect("manifest");
        assert_eq!(
            manifest.scripts(&["client"]),
            vec!["/c.js", "/a.js", "/z.js"]
        );
    }

    #[test]
    fn unknown_or_repeated_order_entries_are_skipped() {
        let manifest = AssetManifest::from_json(SAMPLE).expect("manifest");
        assert_eq!(
            manifest.scripts(&["missing", "client", "client"]),
            vec!["/c.js", "/v.js"]
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AssetManifest::load(&dir.path().join("assets.json")).expect_err("missing");
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[test]
    fn load_reads_file_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("assets.json");
        fs::write(&path, SAMPLE).expect("write manifest");
        let manifest = AssetManifest::load(&path).expect("manifest");
        assert_eq!(
            manifest.bundle("vendor"),
            Some(&BundleAssets {
                js: Some("/v.js".to_string()),
                css: None,
            })
        );
    }
}
