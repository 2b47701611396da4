use std::process::Command;

fn main() {
    // Packaged builds have no .git; they pass KICKBONK_GIT_SHA instead.
    let git_sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .or_else(|| std::env::var("KICKBONK_GIT_SHA").ok())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_SHA={git_sha}");
    println!("cargo:rerun-if-env-changed=KICKBONK_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
