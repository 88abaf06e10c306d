// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMSTREAM_VERSION");

    // Packagers can pin the version
    let version = std::env::var("CAMSTREAM_VERSION").unwrap_or_else(|_| get_git_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn get_git_version() -> String {
    let package_version = env!("CARGO_PKG_VERSION");

    // "0.1.0-5-gabcdef1" when HEAD is 5 commits after v0.1.0
    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    match (described, get_commit_hash()) {
        (Some(tag), _) if tag.starts_with('v') => tag.trim_start_matches('v').to_string(),
        (_, Some(hash)) => format!("{}-{}", package_version, hash),
        _ => package_version.to_string(),
    }
}

fn get_commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
