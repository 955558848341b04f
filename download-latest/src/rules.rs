use crate::platform::{Arch, Os, PlatformKey};
use lazy_regex::{regex, Lazy};
use regex::Regex;

type Rule = [&'static Lazy<Regex>];

/// The platforms that have a built-in rule, in the order they are presented to visitors.
pub const BUILT_IN_PLATFORMS: &[(Os, Arch)] = &[
    (Os::MacOs, Arch::Arm64),
    (Os::MacOs, Arch::X64),
    (Os::Windows, Arch::X64),
    (Os::Windows, Arch::Arm64),
    (Os::Linux, Arch::X64),
    (Os::Linux, Arch::Arm64),
    (Os::IOs, Arch::Arm64),
    (Os::Android, Arch::Arm64),
];

/// Returns the built-in ordered patterns for a platform key, or `None` if we have no opinion about
/// that platform. Earlier patterns are more specific, so an architecture-qualified filename always
/// beats a bare extension match.
#[must_use]
pub fn default_rule(key: &PlatformKey) -> Option<&'static Rule> {
    Some(match key.as_str() {
        "macos-arm64" => macos_arm64(),
        "macos-x64" => macos_x64(),
        "windows-x64" => windows_x64(),
        "windows-arm64" => windows_arm64(),
        "linux-x64" => linux_x64(),
        "linux-arm64" => linux_arm64(),
        "ios-arm64" => ios_arm64(),
        "android-arm64" => android_arm64(),
        _ => return None,
    })
}

fn macos_arm64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 3]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]aarch64[^/]*\.dmg$"),
            regex!(r"(?i)[-_.]arm64[^/]*\.dmg$"),
            regex!(r"(?i)\.dmg$"),
        ]
    });
    &*RULE
}

fn macos_x64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 4]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]x86[_-]64[^/]*\.dmg$"),
            regex!(r"(?i)[-_.]x64[^/]*\.dmg$"),
            regex!(r"(?i)[-_.]intel[^/]*\.dmg$"),
            regex!(r"(?i)\.dmg$"),
        ]
    });
    &*RULE
}

fn windows_x64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 4]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]x86[_-]64[^/]*\.exe$"),
            regex!(r"(?i)[-_.]x64[^/]*\.exe$"),
            regex!(r"(?i)\.exe$"),
            regex!(r"(?i)\.msi$"),
        ]
    });
    &*RULE
}

// Windows on ARM runs x64 binaries under emulation, so an x64 installer is a better pick than an
// unqualified .exe, which is more likely to be a 32-bit build. This has not been checked against
// many real projects' naming, so treat it as a deliberate guess and don't "fix" it without
// evidence.
fn windows_arm64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 3]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]arm64[^/]*\.exe$"),
            regex!(r"(?i)[-_.]x86[_-]64[^/]*\.exe$"),
            regex!(r"(?i)\.exe$"),
        ]
    });
    &*RULE
}

fn linux_x64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 4]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]x86[_-]64[^/]*\.AppImage$"),
            regex!(r"(?i)[-_.]amd64[^/]*\.deb$"),
            regex!(r"(?i)[-_.]x86[_-]64[^/]*\.deb$"),
            regex!(r"(?i)[-_.]amd64[^/]*\.AppImage$"),
        ]
    });
    &*RULE
}

fn linux_arm64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 4]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]aarch64[^/]*\.AppImage$"),
            regex!(r"(?i)[-_.]arm64[^/]*\.deb$"),
            regex!(r"(?i)[-_.]aarch64[^/]*\.deb$"),
            regex!(r"(?i)[-_.]aarch64[^/]*\.rpm$"),
        ]
    });
    &*RULE
}

fn ios_arm64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 1]> = Lazy::new(|| [regex!(r"(?i)\.ipa$")]);
    &*RULE
}

fn android_arm64() -> &'static Rule {
    static RULE: Lazy<[&'static Lazy<Regex>; 4]> = Lazy::new(|| {
        [
            regex!(r"(?i)[-_.]arm64[^/]*\.apk$"),
            regex!(r"(?i)[-_.]aarch64[^/]*\.apk$"),
            regex!(r"(?i)\.apk$"),
            regex!(r"(?i)\.aab$"),
        ]
    });
    &*RULE
}
