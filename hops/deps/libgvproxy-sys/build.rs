fn main() {
    match pkg_config::Config::new().probe("libgvproxy") {
        Ok(_) => {}
        Err(e) => {
            println!(
                "cargo:warning=libgvproxy not found via pkg-config ({e}); falling back to -lgvproxy"
            );
            println!("cargo:rustc-link-lib=dylib=gvproxy");
        }
    }
}
