use crate::{
    platform::{Arch, Os, PlatformKey},
    release::Asset,
    rules::default_rule,
};
use anyhow::{Context, Result};
use itertools::Itertools;
use log::debug;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// Compiles a caller-supplied filename pattern. Patterns always match case-insensitively.
///
/// # Errors
///
/// Returns an error if the pattern is not a valid regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid asset pattern `{pattern}`"))
}

/// Caller-supplied rules that replace the built-in rule for a platform key. An override is never
/// merged with the built-in rule.
#[derive(Clone, Debug, Default)]
pub struct MatchOverrides(HashMap<PlatformKey, Vec<Regex>>);

impl MatchOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule for `key` to the given patterns, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the patterns is not a valid regex.
    pub fn insert<K, P>(&mut self, key: K, patterns: &[P]) -> Result<()>
    where
        K: Into<PlatformKey>,
        P: AsRef<str>,
    {
        let compiled = patterns
            .iter()
            .map(|p| compile_pattern(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.0.insert(key.into(), compiled);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &PlatformKey) -> Option<&[Regex]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// The platform keys that have an override, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &PlatformKey> {
        self.0.keys()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Picks the single best asset for a platform, or `None` if nothing fits.
///
/// The patterns for the platform are tried in order. For each pattern the assets are scanned in
/// their original order, and the first asset that matches is returned, so the first pattern to
/// match anything decides the outcome.
#[must_use]
pub fn match_asset<'a>(
    assets: &'a [Asset],
    os: Os,
    arch: Arch,
    overrides: Option<&MatchOverrides>,
) -> Option<&'a Asset> {
    match_asset_for_key(assets, &PlatformKey::new(os, arch), overrides)
}

/// The same as [`match_asset`] but for a platform key that may not correspond to a known OS and
/// architecture.
#[must_use]
pub fn match_asset_for_key<'a>(
    assets: &'a [Asset],
    key: &PlatformKey,
    overrides: Option<&MatchOverrides>,
) -> Option<&'a Asset> {
    let patterns = rule_for(key, overrides);
    if patterns.is_empty() {
        debug!("no matching rule for {key}");
        return None;
    }

    debug!(
        "matching {} assets for {key} against {}",
        assets.len(),
        patterns.iter().map(|p| p.as_str()).join(", "),
    );
    for pattern in patterns {
        if let Some(asset) = match_pattern(assets, pattern) {
            debug!("pattern {} picked {}", pattern.as_str(), asset.name);
            return Some(asset);
        }
        debug!("pattern {} did not match any asset", pattern.as_str());
    }

    None
}

/// Returns the first asset whose name matches `pattern`, regardless of platform.
#[must_use]
pub fn match_pattern<'a>(assets: &'a [Asset], pattern: &Regex) -> Option<&'a Asset> {
    assets.iter().find(|a| pattern.is_match(&a.name))
}

fn rule_for<'a>(key: &PlatformKey, overrides: Option<&'a MatchOverrides>) -> Vec<&'a Regex> {
    if let Some(rule) = overrides.and_then(|o| o.get(key)) {
        debug!("using the caller's rule for {key}");
        return rule.iter().collect();
    }
    default_rule(key)
        .map(|rule| rule.iter().map(|r| &***r).collect())
        .unwrap_or_default()
}
