use std::env;

// `PlatformSignature::host` needs the target triple, which Cargo only gives to build scripts.
fn main() {
    let target = env::var("TARGET").unwrap_or_default();
    println!("cargo:rustc-env=TARGET={target}");
    println!("cargo:rerun-if-changed-env=TARGET");
}
