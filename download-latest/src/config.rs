use crate::builder::DownloadLatestBuilder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// One platform's matching patterns in a config file. A single pattern can be given as a bare
/// string.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MatchPatterns {
    One(String),
    Many(Vec<String>),
}

impl MatchPatterns {
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            MatchPatterns::One(p) => vec![p.as_str()],
            MatchPatterns::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// The options an embedding page passes to the widget, as JSON.
///
/// ```json
/// {
///   "repo": "rustdesk/rustdesk",
///   "match": { "linux-x64": [".deb$", ".rpm$"], "windows-x64": "x86_64\\.msi$" },
///   "noMatchUrl": "https://rustdesk.com/download"
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WidgetConfig {
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, rename = "match", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_rules: BTreeMap<String, MatchPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_match_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_match_url: Option<String>,
    #[serde(default)]
    pub context_menu: bool,
}

impl WidgetConfig {
    /// Reads a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid config.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if the JSON is not a valid config.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns a builder with every option in this config already set. You can keep setting
    /// options on the builder, for example to pass the visitor's platform signals.
    #[must_use]
    pub fn builder(&self) -> DownloadLatestBuilder<'_> {
        let mut builder = DownloadLatestBuilder::new()
            .repo(&self.repo)
            .context_menu(self.context_menu);
        if let Some(v) = &self.version {
            builder = builder.version(v);
        }
        for (key, patterns) in &self.match_rules {
            builder = builder.match_rule(key, &patterns.patterns());
        }
        if let Some(p) = &self.pattern {
            builder = builder.pattern(p);
        }
        if let Some(t) = &self.text {
            builder = builder.text(t);
        }
        if let Some(t) = &self.no_match_text {
            builder = builder.no_match_text(t);
        }
        if let Some(u) = &self.no_match_url {
            builder = builder.no_match_url(u);
        }
        builder
    }
}

/// How a declaratively attached widget presents itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Placement {
    /// Send the visitor straight to the matched download.
    Redirect,
    /// Attach to the existing element matching this selector.
    Target(String),
    /// Insert a new button next to the declaring element.
    Inline,
}

/// A widget declared with `data-*` attributes in the embedding markup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Declaration {
    pub config: WidgetConfig,
    pub placement: Placement,
    /// Where to render the full asset list, if anywhere.
    pub fallback: Option<String>,
    /// Where to render the platform picker, if anywhere.
    pub selector: Option<String>,
}

impl Declaration {
    /// Reads a declaration from an element's attributes. Returns `None` unless there is a
    /// non-empty `data-repo` attribute. Attributes this does not know about are ignored, and
    /// empty values are treated as absent, except for the boolean `data-auto` and
    /// `data-context-menu` where presence is enough.
    pub fn from_attributes<I, N, V>(attributes: I) -> Option<Self>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = WidgetConfig::default();
        let mut auto = false;
        let mut target = None;
        let mut fallback = None;
        let mut selector = None;

        for (name, value) in attributes {
            let value = value.as_ref().trim();
            let non_empty = (!value.is_empty()).then(|| value.to_string());
            match name.as_ref().to_ascii_lowercase().as_str() {
                "data-repo" => config.repo = value.to_string(),
                "data-version" => config.version = non_empty,
                "data-pattern" => config.pattern = non_empty,
                "data-text" => config.text = non_empty,
                "data-no-match-text" => config.no_match_text = non_empty,
                "data-no-match-url" => config.no_match_url = non_empty,
                "data-context-menu" => config.context_menu = value != "false",
                "data-target" => target = non_empty,
                "data-fallback" => fallback = non_empty,
                "data-selector" => selector = non_empty,
                "data-auto" => auto = value != "false",
                _ => {}
            }
        }

        if config.repo.is_empty() {
            return None;
        }

        let placement = match (auto, target) {
            (true, _) => Placement::Redirect,
            (false, Some(t)) => Placement::Target(t),
            (false, None) => Placement::Inline,
        };
        Some(Self {
            config,
            placement,
            fallback,
            selector,
        })
    }
}
