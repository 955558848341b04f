use serde::{Deserialize, Serialize};
use url::Url;

/// A downloadable file attached to a release.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub name: String,
    pub url: Url,
    pub size: u64,
}

/// What we know about one release once the API response has been cleaned up.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSnapshot {
    pub version: String,
    pub release_page_url: Url,
    pub assets: Vec<Asset>,
}
