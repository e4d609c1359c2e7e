//! Native build requirements of the renderer, carried as typed data.
//!
//! The renderer was first packaged for a native toolchain. That package description lives on here
//! so the pinned library versions and linkage options can be queried, logged and tested, along with
//! the crate that fills each library's role in this repository.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{cmp::Ordering, fmt};

pub const MANIFEST: Manifest = Manifest {
    name: "vulkan-renderer",
    version: "0.0.1",
    settings: &["os", "compiler", "build_type", "arch"],
    requires: &[
        Requirement {
            name: "boost",
            version: "1.86.0",
            options: &[
                BuildOption {
                    key: "shared",
                    value: true,
                },
                BuildOption {
                    key: "without_cobalt",
                    value: true,
                },
            ],
        },
        Requirement {
            name: "tinygltf",
            version: "2.9.0",
            options: &[],
        },
        Requirement {
            name: "meshoptimizer",
            version: "0.21",
            options: &[BuildOption {
                key: "shared",
                value: true,
            }],
        },
    ],
    tool_requires: &[ToolRequirement {
        name: "cmake",
        min_version: Version::new(3, 28, 0),
    }],
    generators: &[
        Generator {
            kind: GeneratorKind::CMakeDeps,
            generator: None,
        },
        Generator {
            kind: GeneratorKind::CMakeToolchain,
            generator: Some("Ninja"),
        },
    ],
    layout: "cmake_layout",
};

/// Native library name -> crate fulfilling the same role here
const RUST_COUNTERPARTS: &[(&str, &str)] = &[
    ("tinygltf", "gltf"),
    ("meshoptimizer", "meshopt"),
    // only used for logging
    ("boost", "log"),
];

// ~~ Manifest ~~

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    pub name: &'static str,
    pub version: &'static str,
    pub settings: &'static [&'static str],
    pub requires: &'static [Requirement],
    pub tool_requires: &'static [ToolRequirement],
    pub generators: &'static [Generator],
    pub layout: &'static str,
}

impl Manifest {
    pub fn requirement(&self, name: &str) -> Option<&Requirement> {
        self.requires.iter().find(|r| r.name == name)
    }

    pub fn tool_requirement(&self, name: &str) -> Option<&ToolRequirement> {
        self.tool_requires.iter().find(|r| r.name == name)
    }

    /// Requirements declared with `shared=True`
    pub fn shared_requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.requires.iter().filter(|r| r.is_shared())
    }

    pub fn rust_counterpart(&self, name: &str) -> Option<&'static str> {
        self.requirement(name)?;
        RUST_COUNTERPARTS
            .iter()
            .find(|(native, _)| *native == name)
            .map(|(_, rust)| *rust)
    }

    pub fn log_requirements(&self) {
        debug!("{} {} native requirements:", self.name, self.version);
        for requirement in self.requires {
            debug!(
                "\t{} (shared = {}) -> {}",
                requirement,
                requirement.is_shared(),
                self.rust_counterpart(requirement.name).unwrap_or("none"),
            );
        }
        for tool in self.tool_requires {
            debug!("\ttool {}/[>={}]", tool.name, tool.min_version);
        }
    }
}

// ~~ Requirement ~~

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub name: &'static str,
    pub version: &'static str,
    pub options: &'static [BuildOption],
}

impl Requirement {
    pub fn option(&self, key: &str) -> Option<bool> {
        self.options.iter().find(|o| o.key == key).map(|o| o.value)
    }

    pub fn is_shared(&self) -> bool {
        self.option("shared").unwrap_or(false)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOption {
    pub key: &'static str,
    pub value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRequirement {
    pub name: &'static str,
    pub min_version: Version,
}

impl ToolRequirement {
    /// Unparseable versions are never satisfying
    pub fn is_satisfied_by(&self, version: &str) -> bool {
        Version::parse(version).map_or(false, |v| v >= self.min_version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generator {
    pub kind: GeneratorKind,
    pub generator: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    CMakeDeps,
    CMakeToolchain,
}

// ~~ Version ~~

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Accepts `major`, `major.minor` or `major.minor.patch`. Missing parts are 0.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ~~ Tests ~~

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_three_pinned_requirements() {
        let pinned: Vec<String> = MANIFEST.requires.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            pinned,
            vec!["boost/1.86.0", "tinygltf/2.9.0", "meshoptimizer/0.21"]
        );
    }

    #[test]
    fn shared_linkage_for_boost_and_meshoptimizer_only() {
        let shared: Vec<&str> = MANIFEST.shared_requirements().map(|r| r.name).collect();
        assert_eq!(shared, vec!["boost", "meshoptimizer"]);

        let boost = MANIFEST.requirement("boost").unwrap();
        assert_eq!(boost.option("without_cobalt"), Some(true));
        let tinygltf = MANIFEST.requirement("tinygltf").unwrap();
        assert_eq!(tinygltf.option("shared"), None);
        assert!(!tinygltf.is_shared());
    }

    #[test]
    fn cmake_minimum_version() {
        let cmake = MANIFEST.tool_requirement("cmake").unwrap();
        assert!(cmake.is_satisfied_by("3.28"));
        assert!(cmake.is_satisfied_by("3.29.1"));
        assert!(cmake.is_satisfied_by("4.0"));
        assert!(!cmake.is_satisfied_by("3.27.9"));
        assert!(!cmake.is_satisfied_by("cmake"));
        assert!(!cmake.is_satisfied_by(""));
    }

    #[test]
    fn version_parsing() {
        assert_eq!(Version::parse("3.28"), Some(Version::new(3, 28, 0)));
        assert_eq!(Version::parse(" 1.86.0 "), Some(Version::new(1, 86, 0)));
        assert_eq!(Version::parse("1.2.3.4"), None);
        assert_eq!(Version::parse("1..2"), None);
        assert!(Version::new(3, 28, 0) < Version::new(3, 28, 1));
    }

    #[test]
    fn generators_and_identity() {
        assert_eq!(MANIFEST.name, "vulkan-renderer");
        assert_eq!(MANIFEST.version, "0.0.1");
        let toolchain = MANIFEST
            .generators
            .iter()
            .find(|g| g.kind == GeneratorKind::CMakeToolchain)
            .unwrap();
        assert_eq!(toolchain.generator, Some("Ninja"));
    }

    #[test]
    fn counterparts() {
        assert_eq!(MANIFEST.rust_counterpart("tinygltf"), Some("gltf"));
        assert_eq!(MANIFEST.rust_counterpart("meshoptimizer"), Some("meshopt"));
        assert_eq!(MANIFEST.rust_counterpart("boost"), Some("log"));
        assert_eq!(MANIFEST.rust_counterpart("glfw"), None);
    }
}
