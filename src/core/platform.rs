//! Host target detection and platform family classification.
//!
//! A [`Target`] is the normalized `arch-vendor-os[-abi]` tuple of the build
//! host. It is derived once per process and classified into a small closed
//! set of [`Family`] values that project files use to pick platform-specific
//! precompiled archives.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::core::errors::BundlexError;

/// Environment variable overriding the detected host target.
pub const TARGET_ENV: &str = "BUNDLEX_TARGET";

/// Target triple components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// CPU architecture (x86_64, aarch64, etc.)
    pub architecture: String,
    /// Vendor (unknown, apple, pc, nerves, etc.)
    pub vendor: String,
    /// Operating system (linux, darwin, windows, etc.)
    pub os: String,
    /// ABI / environment (gnu, musl, msvc, etc.)
    pub abi: Option<String>,
}

impl Target {
    pub fn new(architecture: &str, vendor: &str, os: &str, abi: Option<&str>) -> Self {
        Target {
            architecture: architecture.to_string(),
            vendor: vendor.to_string(),
            os: os.to_string(),
            abi: abi.map(|s| s.to_string()),
        }
    }

    /// Parse a host system-architecture string.
    ///
    /// Anything after the third component is kept as the ABI, so
    /// `armv7-nerves-linux-gnueabi-hf` yields the ABI `gnueabi-hf`.
    pub fn parse(host: &str) -> Result<Self, BundlexError> {
        let parts: Vec<&str> = host.trim().split('-').collect();
        if parts.len() < 3 || parts[..3].iter().any(|p| p.is_empty()) {
            return Err(BundlexError::UnsupportedTarget {
                host: host.to_string(),
            });
        }

        let abi = if parts.len() > 3 {
            Some(parts[3..].join("-"))
        } else {
            None
        };

        Ok(Target {
            architecture: parts[0].to_string(),
            vendor: parts[1].to_string(),
            os: parts[2].to_string(),
            abi,
        })
    }

    /// The host string this process would resolve.
    ///
    /// `BUNDLEX_TARGET` wins; otherwise the triple is synthesized from the
    /// platform this binary was compiled for.
    pub fn host_string() -> String {
        if let Ok(target) = std::env::var(TARGET_ENV) {
            if !target.trim().is_empty() {
                return target;
            }
        }

        let arch = std::env::consts::ARCH;
        let (vendor, os, abi) = match std::env::consts::OS {
            "linux" => ("unknown", "linux", Some("gnu")),
            "macos" => ("apple", "darwin", None),
            "windows" => ("pc", "windows", Some("msvc")),
            "freebsd" => ("unknown", "freebsd", None),
            other => ("unknown", other, None),
        };

        match abi {
            Some(abi) => format!("{}-{}-{}-{}", arch, vendor, os, abi),
            None => format!("{}-{}-{}", arch, vendor, os),
        }
    }

    /// Resolve the host target. Callers that need it repeatedly should use
    /// [`host_target`].
    pub fn host() -> Result<Self, BundlexError> {
        Target::parse(&Target::host_string())
    }

    /// Classify this target into a platform family.
    pub fn family(&self) -> Result<Family, BundlexError> {
        Family::classify(self)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.abi {
            Some(abi) => write!(
                f,
                "{}-{}-{}-{}",
                self.architecture, self.vendor, self.os, abi
            ),
            None => write!(f, "{}-{}-{}", self.architecture, self.vendor, self.os),
        }
    }
}

static HOST_TARGET: LazyLock<Result<Target, String>> =
    LazyLock::new(|| Target::host().map_err(|_| Target::host_string()));

/// The memoized host target of this process.
pub fn host_target() -> Result<Target, BundlexError> {
    HOST_TARGET
        .clone()
        .map_err(|host| BundlexError::UnsupportedTarget { host })
}

/// Platform family of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Linux,
    Freebsd,
    MacosIntel,
    MacosArm,
    Windows32,
    Windows64,
    /// Cross-compiled firmware targets (Nerves, bare metal)
    Embedded,
}

impl Family {
    /// Classify a target. Embedded rules are checked first because Nerves
    /// targets also report a `linux` OS.
    pub fn classify(target: &Target) -> Result<Family, BundlexError> {
        let arch = target.architecture.as_str();
        let os = target.os.as_str();

        let family = if target.vendor == "nerves" || os == "none" || os.starts_with("eabi") {
            Some(Family::Embedded)
        } else if os.starts_with("linux") {
            Some(Family::Linux)
        } else if os.starts_with("freebsd") {
            Some(Family::Freebsd)
        } else if os.starts_with("darwin") || os.starts_with("macos") {
            match arch {
                "aarch64" | "arm64" => Some(Family::MacosArm),
                "x86_64" => Some(Family::MacosIntel),
                _ => None,
            }
        } else if os.starts_with("windows")
            || os.starts_with("mingw")
            || os.starts_with("win32")
            || os.starts_with("cygwin")
        {
            match arch {
                "x86_64" | "amd64" => Some(Family::Windows64),
                "i386" | "i486" | "i586" | "i686" | "x86" => Some(Family::Windows32),
                _ => None,
            }
        } else {
            None
        };

        family.ok_or_else(|| BundlexError::UnsupportedPlatform {
            target: target.to_string(),
        })
    }

    /// Key used for this family in platform-conditional tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Linux => "linux",
            Family::Freebsd => "freebsd",
            Family::MacosIntel => "macos_intel",
            Family::MacosArm => "macos_arm",
            Family::Windows32 => "windows32",
            Family::Windows64 => "windows64",
            Family::Embedded => "embedded",
        }
    }

    /// Broader group key (`macos`, `windows`), if this family has one.
    pub fn group(&self) -> Option<&'static str> {
        match self {
            Family::MacosIntel | Family::MacosArm => Some("macos"),
            Family::Windows32 | Family::Windows64 => Some("windows"),
            _ => None,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Family::Windows32 | Family::Windows64)
    }

    pub fn is_macos(&self) -> bool {
        matches!(self, Family::MacosIntel | Family::MacosArm)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family_of(host: &str) -> Result<Family, BundlexError> {
        Target::parse(host)?.family()
    }

    #[test]
    fn test_parse_triple() {
        let target = Target::parse("x86_64-pc-linux-gnu").unwrap();
        assert_eq!(target.architecture, "x86_64");
        assert_eq!(target.vendor, "pc");
        assert_eq!(target.os, "linux");
        assert_eq!(target.abi.as_deref(), Some("gnu"));
        assert_eq!(target.to_string(), "x86_64-pc-linux-gnu");
    }

    #[test]
    fn test_parse_without_abi() {
        let target = Target::parse("aarch64-apple-darwin22.4.0").unwrap();
        assert_eq!(target.os, "darwin22.4.0");
        assert_eq!(target.abi, None);
    }

    #[test]
    fn test_parse_keeps_trailing_components_as_abi() {
        let target = Target::parse("armv7-nerves-linux-gnueabi-hf").unwrap();
        assert_eq!(target.abi.as_deref(), Some("gnueabi-hf"));
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            Target::parse("x86_64-linux"),
            Err(BundlexError::UnsupportedTarget { .. })
        ));
        assert!(Target::parse("x86_64--linux").is_err());
    }

    #[test]
    fn test_families() {
        assert_eq!(family_of("x86_64-pc-linux-gnu").unwrap(), Family::Linux);
        assert_eq!(family_of("x86_64-unknown-linux-musl").unwrap(), Family::Linux);
        assert_eq!(family_of("x86_64-unknown-freebsd13.2").unwrap(), Family::Freebsd);
        assert_eq!(family_of("x86_64-apple-darwin21.6.0").unwrap(), Family::MacosIntel);
        assert_eq!(family_of("aarch64-apple-darwin22.4.0").unwrap(), Family::MacosArm);
        assert_eq!(family_of("x86_64-pc-windows-msvc").unwrap(), Family::Windows64);
        assert_eq!(family_of("i686-pc-windows-msvc").unwrap(), Family::Windows32);
        assert_eq!(family_of("x86_64-w64-mingw32").unwrap(), Family::Windows64);
        assert_eq!(family_of("armv7-nerves-linux-gnueabihf").unwrap(), Family::Embedded);
        assert_eq!(family_of("arm-none-eabi").unwrap(), Family::Embedded);
    }

    #[test]
    fn test_unsupported_platform() {
        assert!(matches!(
            family_of("sparc-sun-solaris2.11"),
            Err(BundlexError::UnsupportedPlatform { .. })
        ));
        assert!(family_of("powerpc-apple-darwin8").is_err());
    }

    #[test]
    fn test_family_groups() {
        assert_eq!(Family::MacosArm.group(), Some("macos"));
        assert_eq!(Family::Windows32.group(), Some("windows"));
        assert_eq!(Family::Linux.group(), None);
    }

    #[test]
    fn test_host_is_deterministic() {
        assert_eq!(Target::host_string(), Target::host_string());
        assert!(Target::parse(&Target::host_string()).is_ok());
    }
}
