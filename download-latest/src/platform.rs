use log::debug;
use platforms::{Arch as TargetArch, Platform, PlatformReq, OS as TargetOs};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The operating systems that release assets are matched for.
#[derive(
    strum::AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    strum::Display,
    strum::EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Os {
    #[serde(rename = "macos")]
    #[strum(serialize = "macos")]
    MacOs,
    Windows,
    Linux,
    #[serde(rename = "ios")]
    #[strum(serialize = "ios")]
    IOs,
    Android,
    #[default]
    Unknown,
}

impl Os {
    /// The name shown to a visitor, e.g. in a "Download for {os}" label.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Os::MacOs => "macOS",
            Os::Windows => "Windows",
            Os::Linux => "Linux",
            Os::IOs => "iOS",
            Os::Android => "Android",
            Os::Unknown => "your platform",
        }
    }

    #[must_use]
    pub fn is_known(self) -> bool {
        self != Os::Unknown
    }
}

/// The CPU architectures that release assets are matched for.
#[derive(
    strum::AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    strum::Display,
    strum::EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
    #[default]
    Unknown,
}

impl Arch {
    #[must_use]
    pub fn is_known(self) -> bool {
        self != Arch::Unknown
    }
}

/// The OS and CPU architecture of the machine a download is for.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct PlatformSignature {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformSignature {
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Returns true when both the OS and the architecture were detected.
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.os.is_known() && self.arch.is_known()
    }

    #[must_use]
    pub fn key(&self) -> PlatformKey {
        PlatformKey::new(self.os, self.arch)
    }

    const TARGET: &'static str = env!("TARGET");

    /// The platform this code was compiled for. Anything we do not build downloads for degrades to
    /// `unknown`.
    #[must_use]
    pub fn host() -> Self {
        let Ok(req) = PlatformReq::from_str(Self::TARGET) else {
            debug!("could not parse the compile target `{}`", Self::TARGET);
            return Self::default();
        };
        Platform::ALL
            .iter()
            .find(|p| req.matches(p))
            .map(Self::from_target_platform)
            .unwrap_or_default()
    }

    #[allow(clippy::wildcard_enum_match_arm)]
    fn from_target_platform(platform: &Platform) -> Self {
        let os = match platform.target_os {
            TargetOs::MacOS => Os::MacOs,
            TargetOs::Windows => Os::Windows,
            TargetOs::Linux => Os::Linux,
            TargetOs::iOS => Os::IOs,
            TargetOs::Android => Os::Android,
            _ => Os::Unknown,
        };
        let arch = match platform.target_arch {
            TargetArch::X86_64 => Arch::X64,
            TargetArch::AArch64 => Arch::Arm64,
            _ => Arch::Unknown,
        };
        debug!("host platform {} maps to {os}-{arch}", platform.target_triple);
        Self { os, arch }
    }
}

/// A `"{os}-{arch}"` string used to index matching rules.
///
/// This is a plain string rather than a pair of enums because override tables may name platforms
/// that have no built-in rule, and the asset grouping code uses the special `"other"` key for
/// assets it cannot classify.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PlatformKey(String);

impl PlatformKey {
    /// The key used for assets the classifier could not place on any platform.
    pub const OTHER: &'static str = "other";

    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        PlatformKey(format!("{os}-{arch}"))
    }

    #[must_use]
    pub fn other() -> Self {
        PlatformKey(Self::OTHER.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlatformKey {
    fn from(s: &str) -> Self {
        PlatformKey(s.to_ascii_lowercase())
    }
}

impl From<String> for PlatformKey {
    fn from(s: String) -> Self {
        PlatformKey(s.to_ascii_lowercase())
    }
}

impl AsRef<str> for PlatformKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
