use std::env::consts::{ARCH, OS};
use std::process::Command;

/// Position of each featured download among the highlighted listing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Source = 0,
    DarwinAmd64 = 1,
    DarwinArm64 = 2,
    Linux = 3,
    Windows = 4,
}

impl Artifact {
    /// Number of featured rows the listing is expected to carry.
    pub const COUNT: usize = 5;

    pub fn detect() -> Self {
        Self::for_target(OS, ARCH)
    }

    pub fn for_target(os: &str, arch: &str) -> Self {
        match (os, arch) {
            ("windows", _) => Artifact::Windows,
            ("linux", _) => Artifact::Linux,
            ("macos", "aarch64") => Artifact::DarwinArm64,
            ("macos", _) => Artifact::DarwinAmd64,
            _ => Artifact::Source,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Output of `go version`, if a toolchain is on the PATH.
pub fn installed_go_version() -> String {
    match Command::new("go").arg("version").output() {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => "Undefined / unable to determine".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_targets_to_listing_rows() {
        assert_eq!(Artifact::for_target("linux", "x86_64").index(), 3);
        assert_eq!(Artifact::for_target("windows", "x86_64").index(), 4);
        assert_eq!(Artifact::for_target("macos", "x86_64").index(), 1);
        assert_eq!(Artifact::for_target("macos", "aarch64").index(), 2);
        assert_eq!(Artifact::for_target("freebsd", "x86_64"), Artifact::Source);
    }

    #[test]
    fn detected_index_is_within_featured_rows() {
        assert!(Artifact::detect().index() < Artifact::COUNT);
    }
}
