//! Branch and implementation tables for version resolution.

use std::fmt;

use tracing::{debug, warn};

use super::parse::KitVersion;
use crate::error::ResolveError;

/// Tracing target for version resolution.
const VERSION_TARGET: &str = "kitlink::version";

/// Ordered identifier of a device-kit release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildKey(u32);

impl BuildKey {
    /// Wraps a numeric build key.
    #[must_use]
    pub const fn new(key: u32) -> Self {
        Self(key)
    }

    /// Numeric value of the key.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Known release branches and the build each maps to, oldest first.
///
/// Patch branches append a suffix to their base branch name
/// (`xb_rel_1411qfe3`), so matching is by prefix.
pub const BRANCH_TABLE: &[(&str, BuildKey)] = &[
    ("xb_rel_1411", BuildKey::new(11_785)),
    ("xb_rel_1503", BuildKey::new(12_071)),
    ("xb_rel_1506", BuildKey::new(12_309)),
];

/// Maps a branch name to its build key.
///
/// The longest matching prefix wins. An unknown branch falls back to the
/// newest known build rather than failing.
#[must_use]
pub fn build_key_for_branch(branch: &str) -> BuildKey {
    let lowered = branch.to_ascii_lowercase();
    let matched = BRANCH_TABLE
        .iter()
        .filter(|(prefix, _)| lowered.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, key)| *key);
    matched.unwrap_or_else(|| {
        let newest = newest_known_build();
        warn!(target: VERSION_TARGET, branch, %newest, "unknown branch; assuming newest build");
        newest
    })
}

fn newest_known_build() -> BuildKey {
    BRANCH_TABLE
        .iter()
        .map(|(_, key)| *key)
        .max()
        .unwrap_or(BuildKey::new(0))
}

/// Supported implementation generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KitGeneration {
    /// The November 2014 kit, whose copy primitive ignores the recursion
    /// level and whose listings fail spuriously on empty directories.
    Rel1411,
    /// The June 2015 kit, whose copy primitive honours the recursion level.
    Rel1506,
}

impl KitGeneration {
    /// Returns `true` when the copy primitive honours its recursion level.
    #[must_use]
    pub const fn honours_recursion_level(self) -> bool {
        matches!(self, Self::Rel1506)
    }

    /// Image names that mark a device booted to its home or setup shell.
    #[must_use]
    pub const fn shell_processes(self) -> &'static [&'static str] {
        match self {
            Self::Rel1411 => &["Home.exe", "Oobe.exe"],
            Self::Rel1506 => &["Home.exe", "Oobe.exe", "SystemSettings.exe"],
        }
    }
}

impl fmt::Display for KitGeneration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Rel1411 => "rel-1411",
            Self::Rel1506 => "rel-1506",
        })
    }
}

/// Build keys with a shipped implementation, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplementationRegistry {
    entries: Vec<(BuildKey, KitGeneration)>,
}

impl Default for ImplementationRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ImplementationRegistry {
    /// Registers `entries`, ordering them newest first.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (BuildKey, KitGeneration)>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|left, right| right.0.cmp(&left.0));
        Self { entries }
    }

    /// The implementations this crate ships.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new([
            (BuildKey::new(12_309), KitGeneration::Rel1506),
            (BuildKey::new(11_785), KitGeneration::Rel1411),
        ])
    }

    /// Generation registered for exactly `build`.
    #[must_use]
    pub fn lookup(&self, build: BuildKey) -> Option<KitGeneration> {
        self.entries
            .iter()
            .find(|(key, _)| *key == build)
            .map(|(_, generation)| *generation)
    }

    /// Registered build keys, newest first.
    pub fn builds(&self) -> impl Iterator<Item = BuildKey> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }
}

/// The implementation selected for an installed kit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitImplementation {
    /// Installed version.
    pub version: KitVersion,
    /// Build key the version resolved to.
    pub build: BuildKey,
    /// Generation registered for that build.
    pub generation: KitGeneration,
}

/// Resolves a parsed version to its implementation.
///
/// # Errors
///
/// Returns [`ResolveError::UnregisteredBuild`] when the build key has no
/// registered implementation. Unknown branches fall back to the newest build;
/// unknown builds never do.
pub fn resolve(
    version: &KitVersion,
    registry: &ImplementationRegistry,
) -> Result<KitImplementation, ResolveError> {
    let build = build_key_for_branch(&version.branch);
    let generation = registry
        .lookup(build)
        .ok_or_else(|| ResolveError::UnregisteredBuild {
            build,
            version: version.to_string(),
        })?;
    debug!(target: VERSION_TARGET, %version, %build, %generation, "resolved kit implementation");
    Ok(KitImplementation {
        version: version.clone(),
        build,
        generation,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn version(text: &str) -> KitVersion {
        text.parse().expect("valid version")
    }

    #[rstest]
    #[case("xb_rel_1411", 11_785)]
    #[case("xb_rel_1411qfe3", 11_785)]
    #[case("XB_REL_1506", 12_309)]
    #[case("xb_rel_1503qfe1", 12_071)]
    #[case("xb_dev_main", 12_309)]
    fn branches_map_by_prefix(#[case] branch: &str, #[case] expected: u32) {
        assert_eq!(build_key_for_branch(branch), BuildKey::new(expected));
    }

    #[test]
    fn reference_version_resolves_to_its_registered_generation() {
        let resolved = resolve(
            &version("1.2.3.11785 (xb_rel_1411.150101-0000)"),
            &ImplementationRegistry::builtin(),
        )
        .expect("registered build");
        assert_eq!(resolved.build, BuildKey::new(11_785));
        assert_eq!(resolved.generation, KitGeneration::Rel1411);
    }

    #[test]
    fn unknown_branch_falls_back_to_newest_registered_build() {
        let registry = ImplementationRegistry::builtin();
        let resolved = resolve(&version("2.0.0.1 (xb_future.160101-0000)"), &registry)
            .expect("fallback build");
        assert_eq!(Some(resolved.build), registry.builds().next());
        assert_eq!(resolved.generation, KitGeneration::Rel1506);
    }

    #[test]
    fn recognised_but_unregistered_build_is_a_configuration_fault() {
        let error = resolve(
            &version("1.5.0.12071 (xb_rel_1503.150301-0000)"),
            &ImplementationRegistry::builtin(),
        )
        .expect_err("unregistered build");
        assert!(matches!(
            error,
            ResolveError::UnregisteredBuild { build, .. } if build == BuildKey::new(12_071)
        ));
    }

    #[test]
    fn registry_orders_newest_first() {
        let registry = ImplementationRegistry::new([
            (BuildKey::new(11_785), KitGeneration::Rel1411),
            (BuildKey::new(12_309), KitGeneration::Rel1506),
        ]);
        let builds: Vec<_> = registry.builds().collect();
        assert_eq!(builds, vec![BuildKey::new(12_309), BuildKey::new(11_785)]);
    }

    #[test]
    fn generations_declare_their_capabilities() {
        assert!(!KitGeneration::Rel1411.honours_recursion_level());
        assert!(KitGeneration::Rel1506.honours_recursion_level());
        assert!(KitGeneration::Rel1411.shell_processes().contains(&"Home.exe"));
    }
}
