use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=WINDIVERT_PATH");

    // Only Windows targets link against WinDivert.dll
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        return;
    }

    if let Ok(path) = env::var("WINDIVERT_PATH") {
        println!("cargo:rustc-link-search=native={}", path);
    }
}
