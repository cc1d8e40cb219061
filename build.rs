use std::process::Command;

/// `GIT_HASH` for the health endpoint: an explicit override, else the
/// current revision from git, else "unknown" (e.g. building from a tarball)
fn git_revision() -> String {
    if let Ok(rev) = std::env::var("GIT_HASH") {
        if !rev.trim().is_empty() {
            return rev.trim().to_string();
        }
    }

    Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|rev| !rev.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", git_revision());
    println!("cargo:rerun-if-env-changed=GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
