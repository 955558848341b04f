//! Ready-to-render pieces built from a [`ResolutionResult`]: the button label and link, the asset
//! list grouped by platform, and the entries of a platform picker. Nothing here touches the
//! network.

use crate::{
    classifier::classify,
    matcher::{match_asset_for_key, MatchOverrides},
    platform::{Arch, Os, PlatformKey},
    release::Asset,
    resolver::{DownloadLatest, ResolutionResult},
    rules::BUILT_IN_PLATFORMS,
};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeSet;
use url::Url;

/// What a download button shows.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ButtonView {
    pub label: String,
    pub href: String,
    pub title: String,
    /// The release page, offered as a secondary action when the context menu is enabled.
    pub secondary: Option<Url>,
}

impl ButtonView {
    #[must_use]
    pub fn new(result: &ResolutionResult, download: &DownloadLatest) -> Self {
        let template = if result.matched {
            download.text()
        } else {
            download.no_match_text()
        };
        Self {
            label: render_label(template, result),
            href: result.url.clone(),
            title: result
                .asset
                .clone()
                .unwrap_or_else(|| "View releases".to_string()),
            secondary: download
                .context_menu()
                .then(|| result.release_page_url.clone()),
        }
    }
}

/// Replaces every `{os}`, `{arch}`, and `{version}` in the template. Unknown values become the
/// empty string, except `{os}` which becomes "your platform".
#[must_use]
pub fn render_label(template: &str, result: &ResolutionResult) -> String {
    let arch = if result.arch.is_known() {
        result.arch.as_ref()
    } else {
        ""
    };
    template
        .replace("{os}", result.os.display_name())
        .replace("{arch}", arch)
        .replace("{version}", result.version.as_deref().unwrap_or_default())
}

/// Which platforms to show in asset lists and pickers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlatformFilter {
    pub exclude: BTreeSet<PlatformKey>,
    /// When this is not empty, only these platforms are shown.
    pub include: BTreeSet<PlatformKey>,
}

impl PlatformFilter {
    #[must_use]
    pub fn new<E, I>(exclude: E, include: I) -> Self
    where
        E: IntoIterator,
        E::Item: Into<PlatformKey>,
        I: IntoIterator,
        I::Item: Into<PlatformKey>,
    {
        Self {
            exclude: exclude.into_iter().map(Into::into).collect(),
            include: include.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn allows(&self, key: &PlatformKey) -> bool {
        (self.include.is_empty() || self.include.contains(key)) && !self.exclude.contains(key)
    }
}

/// The assets for one platform.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AssetGroup {
    pub key: PlatformKey,
    pub label: String,
    pub assets: Vec<Asset>,
}

/// Groups assets by the platforms they look like they are for, in a fixed platform order with
/// unclassified assets last. An asset for several platforms, like a universal macOS binary, is in
/// each of their groups. Empty groups are left out.
#[must_use]
pub fn group_assets(assets: &[Asset], filter: &PlatformFilter) -> Vec<AssetGroup> {
    let classified = assets
        .iter()
        .map(|a| (a, classify(a)))
        .collect::<Vec<_>>();

    let mut groups = BUILT_IN_PLATFORMS
        .iter()
        .map(|(os, arch)| PlatformKey::new(*os, *arch))
        .filter(|key| filter.allows(key))
        .map(|key| {
            let assets = classified
                .iter()
                .filter(|(_, keys)| keys.contains(&key))
                .map(|(a, _)| (*a).clone())
                .collect::<Vec<_>>();
            AssetGroup {
                label: platform_label(&key),
                key,
                assets,
            }
        })
        .collect::<Vec<_>>();

    let other = PlatformKey::other();
    if filter.allows(&other) {
        groups.push(AssetGroup {
            label: platform_label(&other),
            assets: classified
                .iter()
                .filter(|(_, keys)| keys.is_empty())
                .map(|(a, _)| (*a).clone())
                .collect(),
            key: other,
        });
    }

    groups.retain(|g| !g.assets.is_empty());
    groups
}

/// One entry in a platform picker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PlatformChoice {
    pub key: PlatformKey,
    pub label: String,
    pub asset: Option<Asset>,
    /// Set on the visitor's own platform.
    pub selected: bool,
}

/// The entries for a platform picker: every allowed built-in platform followed by any other
/// platform that has an override, each with the asset the matcher picks for it.
#[must_use]
pub fn platform_choices(
    result: &ResolutionResult,
    overrides: Option<&MatchOverrides>,
    filter: &PlatformFilter,
) -> Vec<PlatformChoice> {
    let built_in = BUILT_IN_PLATFORMS
        .iter()
        .map(|(os, arch)| PlatformKey::new(*os, *arch))
        .collect::<Vec<_>>();
    let extra = overrides
        .into_iter()
        .flat_map(MatchOverrides::keys)
        .filter(|k| !built_in.contains(k))
        .cloned()
        .sorted()
        .collect::<Vec<_>>();

    let visitor = result.platform().key();
    built_in
        .into_iter()
        .chain(extra)
        .filter(|key| filter.allows(key))
        .map(|key| PlatformChoice {
            label: platform_label(&key),
            asset: match_asset_for_key(&result.all_assets, &key, overrides).cloned(),
            selected: key == visitor,
            key,
        })
        .collect()
}

/// A human-readable name for a platform key, like "macOS (Apple Silicon)".
#[must_use]
pub fn platform_label(key: &PlatformKey) -> String {
    let label = match key.as_str() {
        "macos-arm64" => "macOS (Apple Silicon)",
        "macos-x64" => "macOS (Intel)",
        "windows-x64" => "Windows (x64)",
        "windows-arm64" => "Windows (ARM64)",
        "linux-x64" => "Linux (x64)",
        "linux-arm64" => "Linux (ARM64)",
        "ios-arm64" => "iOS",
        "android-arm64" => "Android",
        PlatformKey::OTHER => "Other",
        other => return label_from_parts(other),
    };
    label.to_string()
}

fn label_from_parts(key: &str) -> String {
    let Some((os, arch)) = key.split_once('-') else {
        return key.to_string();
    };
    let os = os
        .parse::<Os>()
        .map_or_else(|_| os.to_string(), |o| o.display_name().to_string());
    let arch = arch
        .parse::<Arch>()
        .map_or_else(|_| arch.to_string(), |a| a.as_ref().to_string());
    format!("{os} ({arch})")
}

/// Formats a byte count the way asset lists show it, in MiB with one decimal, like "12.3 MB".
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / 1_048_576.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::DownloadLatestBuilder,
        platform::{Arch, Os},
    };
    use anyhow::Result;
    use rstest::rstest;

    fn asset(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            url: Url::parse(&format!("https://example.com/{name}")).unwrap(),
            size: 0,
        }
    }

    fn result(matched: Option<&str>, os: Os, arch: Arch, assets: &[&str]) -> ResolutionResult {
        let release_page_url =
            Url::parse("https://github.com/owner/repo/releases/tag/v1.2.3").unwrap();
        ResolutionResult {
            url: matched.map_or_else(
                || release_page_url.to_string(),
                |m| asset(m).url.to_string(),
            ),
            asset: matched.map(String::from),
            os,
            arch,
            version: Some("v1.2.3".to_string()),
            release_page_url,
            all_assets: assets.iter().map(|n| asset(n)).collect(),
            matched: matched.is_some(),
        }
    }

    fn keys(groups: &[AssetGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.key.as_str()).collect()
    }

    #[test]
    fn button_for_match() -> Result<()> {
        let dl = DownloadLatestBuilder::new()
            .repo("owner/repo")
            .text("Get {version} for {os} {arch} ({os})")
            .build()?;
        let res = result(Some("app.dmg"), Os::MacOs, Arch::Arm64, &["app.dmg"]);
        let view = ButtonView::new(&res, &dl);
        assert_eq!(view.label, "Get v1.2.3 for macOS arm64 (macOS)");
        assert_eq!(view.href, "https://example.com/app.dmg");
        assert_eq!(view.title, "app.dmg");
        assert_eq!(view.secondary, None);
        Ok(())
    }

    #[test]
    fn button_without_match() -> Result<()> {
        let dl = DownloadLatestBuilder::new()
            .repo("owner/repo")
            .context_menu(true)
            .build()?;
        let res = result(None, Os::Unknown, Arch::Unknown, &[]);
        let view = ButtonView::new(&res, &dl);
        assert_eq!(view.label, "View all downloads");
        assert_eq!(view.href, res.release_page_url.as_str());
        assert_eq!(view.title, "View releases");
        assert_eq!(view.secondary, Some(res.release_page_url.clone()));
        Ok(())
    }

    #[rstest]
    #[case::default_template("Download for {os}", Os::Windows, Arch::X64, "Download for Windows")]
    #[case::ios("Download for {os}", Os::IOs, Arch::Arm64, "Download for iOS")]
    #[case::unknown_os("Download for {os}", Os::Unknown, Arch::X64, "Download for your platform")]
    #[case::unknown_arch("{os}-{arch}", Os::Linux, Arch::Unknown, "Linux-")]
    #[case::no_tokens("Download", Os::Linux, Arch::X64, "Download")]
    fn labels(#[case] template: &str, #[case] os: Os, #[case] arch: Arch, #[case] expect: &str) {
        assert_eq!(render_label(template, &result(None, os, arch, &[])), expect);
    }

    #[test]
    fn missing_version_renders_empty() {
        let mut res = result(None, Os::Linux, Arch::X64, &[]);
        res.version = None;
        assert_eq!(render_label("v{version}", &res), "v");
    }

    #[test]
    fn filter_allows() {
        let all = PlatformFilter::default();
        assert!(all.allows(&"linux-x64".into()));
        assert!(all.allows(&PlatformKey::other()));

        let filter = PlatformFilter::new(["ios-arm64"], Vec::<&str>::new());
        assert!(!filter.allows(&"ios-arm64".into()));
        assert!(filter.allows(&"android-arm64".into()));

        let filter = PlatformFilter::new(["linux-arm64"], ["linux-x64", "linux-arm64"]);
        assert!(filter.allows(&"linux-x64".into()));
        assert!(!filter.allows(&"linux-arm64".into()));
        assert!(!filter.allows(&"macos-x64".into()));
    }

    #[test]
    fn groups_in_platform_order() {
        let assets = [
            "app-x86_64.AppImage",
            "app.apk",
            "app.dmg",
            "app-x64-setup.exe",
            "app-1.0.tar.gz",
            "app.ipa",
        ]
        .map(asset);
        let groups = group_assets(&assets, &PlatformFilter::default());
        assert_eq!(
            keys(&groups),
            vec![
                "macos-arm64",
                "macos-x64",
                "windows-x64",
                "linux-x64",
                "ios-arm64",
                "android-arm64",
                "other",
            ]
        );
        // The universal dmg is in both macOS groups.
        assert_eq!(groups[0].assets, vec![asset("app.dmg")]);
        assert_eq!(groups[1].assets, vec![asset("app.dmg")]);
        assert_eq!(groups[0].label, "macOS (Apple Silicon)");
        assert_eq!(groups[6].label, "Other");
        assert_eq!(groups[6].assets, vec![asset("app-1.0.tar.gz")]);
    }

    #[test]
    fn groups_respect_filter() {
        let assets = ["app.dmg", "app.ipa", "app.apk", "notes.txt"].map(asset);
        let filter = PlatformFilter::new(["ios-arm64", "android-arm64", "other"], Vec::<&str>::new());
        assert_eq!(
            keys(&group_assets(&assets, &filter)),
            vec!["macos-arm64", "macos-x64"]
        );

        let filter = PlatformFilter::new(Vec::<&str>::new(), ["other"]);
        let groups = group_assets(&assets, &filter);
        assert_eq!(keys(&groups), vec!["other"]);
        assert_eq!(groups[0].assets, vec![asset("notes.txt")]);
    }

    #[test]
    fn no_assets_no_groups() {
        assert!(group_assets(&[], &PlatformFilter::default()).is_empty());
    }

    #[test]
    fn choices_for_each_platform() -> Result<()> {
        let res = result(
            Some("app-x86_64.AppImage"),
            Os::Linux,
            Arch::X64,
            &["app-aarch64.dmg", "app-x86_64.exe", "app-x86_64.AppImage", "app.deb"],
        );
        let mut overrides = MatchOverrides::new();
        overrides.insert("linux-x64", &[r"\.deb$"])?;
        overrides.insert("linux-riscv64", &[r"riscv"])?;

        let filter = PlatformFilter::new(["ios-arm64", "android-arm64"], Vec::<&str>::new());
        let choices = platform_choices(&res, Some(&overrides), &filter);
        let summary = choices
            .iter()
            .map(|c| (c.key.as_str(), c.asset.as_ref().map(|a| a.name.as_str()), c.selected))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("macos-arm64", Some("app-aarch64.dmg"), false),
                ("macos-x64", Some("app-aarch64.dmg"), false),
                ("windows-x64", Some("app-x86_64.exe"), false),
                ("windows-arm64", Some("app-x86_64.exe"), false),
                ("linux-x64", Some("app.deb"), true),
                ("linux-arm64", None, false),
                ("linux-riscv64", None, false),
            ]
        );
        assert_eq!(choices[6].label, "Linux (riscv64)");
        Ok(())
    }

    #[rstest]
    #[case::zero(0, "0.0 MB")]
    #[case::small(1_000, "0.0 MB")]
    #[case::one_mib(1_048_576, "1.0 MB")]
    #[case::fractional(12_897_485, "12.3 MB")]
    fn sizes(#[case] bytes: u64, #[case] expect: &str) {
        assert_eq!(format_size(bytes), expect);
    }
}
