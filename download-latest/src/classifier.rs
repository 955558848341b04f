//! A loose, multi-label guess at which platforms an asset is for. This is used to group assets and
//! to hide platforms a project does not want to offer. It is deliberately independent of the
//! matching rules and is never used to pick the one asset to download.

use crate::{
    platform::{Arch, Os, PlatformKey},
    release::Asset,
};
use lazy_regex::regex_is_match;
use log::debug;
use std::collections::BTreeSet;

/// Returns every platform key the asset looks like it is for. This may be empty.
///
/// A macOS asset that does not name an architecture (or names both) is taken to be a universal
/// binary and gets both the arm64 and x64 keys. Linux and Windows assets without an architecture
/// are assumed to be x64 only.
#[must_use]
pub fn classify(asset: &Asset) -> BTreeSet<PlatformKey> {
    classify_name(&asset.name)
}

#[must_use]
pub fn classify_name(name: &str) -> BTreeSet<PlatformKey> {
    let name = name.to_lowercase();
    let mut keys = BTreeSet::new();

    if name.ends_with(".ipa") {
        keys.insert(PlatformKey::new(Os::IOs, Arch::Arm64));
    } else if name.ends_with(".apk") || name.ends_with(".aab") {
        keys.insert(PlatformKey::new(Os::Android, Arch::Arm64));
    } else if is_macos(&name) {
        match (names_arm64(&name), names_x64(&name)) {
            (true, false) => {
                keys.insert(PlatformKey::new(Os::MacOs, Arch::Arm64));
            }
            (false, true) => {
                keys.insert(PlatformKey::new(Os::MacOs, Arch::X64));
            }
            (true, true) | (false, false) => {
                keys.insert(PlatformKey::new(Os::MacOs, Arch::Arm64));
                keys.insert(PlatformKey::new(Os::MacOs, Arch::X64));
            }
        }
    } else if is_windows(&name) {
        keys.insert(PlatformKey::new(Os::Windows, arm64_or_x64(&name)));
    } else if is_linux(&name) {
        keys.insert(PlatformKey::new(Os::Linux, arm64_or_x64(&name)));
    }

    debug!("classified {name} as {keys:?}");
    keys
}

fn is_macos(name: &str) -> bool {
    name.ends_with(".dmg")
        || name.ends_with(".pkg")
        || name.contains("macos")
        || name.contains("darwin")
}

fn is_windows(name: &str) -> bool {
    name.ends_with(".exe") || name.ends_with(".msi") || name.contains("windows")
}

fn is_linux(name: &str) -> bool {
    [".deb", ".rpm", ".appimage", ".flatpak", ".snap"]
        .iter()
        .any(|ext| name.ends_with(ext))
        // Arch Linux packages, e.g. app-1.0-1-x86_64.pkg.tar.zst
        || regex_is_match!(r"\.pkg\.tar\.(?:zst|xz|gz)$", name)
        || name.contains("linux")
}

fn names_arm64(name: &str) -> bool {
    name.contains("arm64") || name.contains("aarch64")
}

fn names_x64(name: &str) -> bool {
    ["x86_64", "x86-64", "x64", "amd64", "intel"]
        .iter()
        .any(|a| name.contains(a))
}

fn arm64_or_x64(name: &str) -> Arch {
    if names_arm64(name) {
        Arch::Arm64
    } else {
        Arch::X64
    }
}
