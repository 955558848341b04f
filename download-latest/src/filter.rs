use crate::release::Asset;
use lazy_regex::regex_is_match;
use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

/// An asset exactly as the release API returns it. Every field is optional because we would
/// rather drop a malformed asset than fail the whole release.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct RawAsset {
    pub name: Option<String>,
    pub browser_download_url: Option<String>,
    pub size: Option<u64>,
}

/// Returns true for checksum, signature, and updater metadata files, which are never what a
/// visitor wants to download.
#[must_use]
pub fn is_excluded_name(name: &str) -> bool {
    regex_is_match!(r"(?i)\.(?:sha256|sha512|sig|asc|blockmap|zsync)$", name)
}

/// Turns raw API assets into [`Asset`]s, dropping anything without a name or a usable download
/// URL, as well as checksums and signatures. The original order is preserved.
#[must_use]
pub fn filter_assets(raw: Vec<RawAsset>) -> Vec<Asset> {
    raw.into_iter().filter_map(into_asset).collect()
}

fn into_asset(raw: RawAsset) -> Option<Asset> {
    let Some(name) = raw.name.filter(|n| !n.is_empty()) else {
        debug!("skipping asset without a name");
        return None;
    };
    let Some(url) = raw.browser_download_url.filter(|u| !u.is_empty()) else {
        debug!("skipping asset `{name}` without a download url");
        return None;
    };
    let url = match Url::parse(&url) {
        Ok(u) => u,
        Err(e) => {
            debug!("skipping asset `{name}` with invalid download url `{url}`: {e}");
            return None;
        }
    };
    if is_excluded_name(&name) {
        debug!("skipping checksum or signature asset `{name}`");
        return None;
    }

    Some(Asset {
        name,
        url,
        size: raw.size.unwrap_or_default(),
    })
}
