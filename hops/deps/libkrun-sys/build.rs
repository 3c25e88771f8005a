//! Locates an installed libkrun via pkg-config.
//!
//! Unlike some downstream consumers of libkrun, this crate does not vendor
//! or build libkrun from source: the host is expected to have it installed
//! (e.g. via the distribution's package manager or Homebrew), matching how
//! this workspace resolves its other native dependency, libgvproxy.

fn main() {
    match pkg_config::Config::new().probe("libkrun") {
        Ok(_) => {}
        Err(e) => {
            println!(
                "cargo:warning=libkrun not found via pkg-config ({e}); falling back to -lkrun"
            );
            println!("cargo:rustc-link-lib=dylib=krun");
        }
    }
}
