//! Build script reporting on optional system dependencies.
//!
//! OpenCV is needed for the `camera` feature and ALSA for `audio-io` on
//! Linux; missing libraries produce installation hints, not failures.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_CAMERA").is_some() {
        check_opencv();
    }

    if env::var_os("CARGO_FEATURE_AUDIO_IO").is_some() && env::var("TARGET").unwrap_or_default().contains("linux") {
        check_alsa();
    }

    println!(
        "cargo:rustc-env=BUILD_TARGET={}",
        env::var("TARGET").unwrap_or_default()
    );
}

fn pkg_config_version(package: &str) -> Option<String> {
    let output = Command::new("pkg-config").args(["--modversion", package]).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_opencv() {
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");

    match pkg_config_version("opencv4").or_else(|| pkg_config_version("opencv")) {
        Some(version) => println!("cargo:warning=Found OpenCV version: {version}"),
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. The camera feature needs OpenCV with the contrib face module.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libopencv-dev libopencv-contrib-dev");
            println!("cargo:warning=On macOS: brew install opencv");
        }
    }
}

fn check_alsa() {
    match pkg_config_version("alsa") {
        Some(version) => println!("cargo:warning=Found ALSA version: {version}"),
        None => {
            println!("cargo:warning=ALSA not found via pkg-config. The audio-io feature needs it for microphone and speaker access.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libasound2-dev");
        }
    }
}
