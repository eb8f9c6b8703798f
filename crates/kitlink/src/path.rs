//! Remote paths and the operating target they are scoped to.
//!
//! The device namespace is volume-rooted (`XD:\games\save.dat`) and
//! case-insensitive. Paths are normalised on construction: forward slashes
//! become backslashes, trailing separators are dropped from non-root paths and
//! a bare volume (`XD:`) becomes its root (`XD:\`).

use std::fmt;

use thiserror::Error;

/// Separator between remote path components.
pub const SEPARATOR: char = '\\';

/// Longest remote path accepted by the transport, in characters.
pub const MAX_PATH_LEN: usize = 260;

const INVALID_CHARACTERS: [char; 6] = ['<', '>', '"', '|', '?', '*'];

/// Selects which of the two independent remote subsystems a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperatingTarget {
    /// The system partition, which hosts the shell and platform services.
    System,
    /// The title partition, which hosts the software under test.
    Title,
}

impl fmt::Display for OperatingTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => formatter.write_str("system"),
            Self::Title => formatter.write_str("title"),
        }
    }
}

/// Reasons a string is rejected as a remote path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path was empty.
    #[error("remote path is empty")]
    Empty,
    /// The path exceeds [`MAX_PATH_LEN`].
    #[error("remote path is {length} characters long; the limit is {MAX_PATH_LEN}")]
    TooLong {
        /// Length of the normalised path.
        length: usize,
    },
    /// The path contains a character the namespace forbids.
    #[error("remote path contains invalid character {character:?}")]
    InvalidCharacter {
        /// Offending character.
        character: char,
    },
    /// The path does not start with `VOLUME:`.
    #[error("remote path '{path}' does not start with a volume such as 'XD:'")]
    MissingVolume {
        /// Rejected input.
        path: String,
    },
    /// The path is volume-relative (`XD:games`).
    #[error("remote path '{path}' must be absolute")]
    NotAbsolute {
        /// Rejected input.
        path: String,
    },
    /// The path contains an empty, `.` or `..` component.
    #[error("remote path '{path}' contains an empty or relative component")]
    InvalidComponent {
        /// Rejected input.
        path: String,
    },
}

/// A validated remote path together with the target it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
    path: String,
    target: OperatingTarget,
}

impl RemotePath {
    /// Validates and normalises `path` for the given target.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] when the path is empty, too long, contains
    /// forbidden characters or is not volume-rooted.
    pub fn new(path: impl AsRef<str>, target: OperatingTarget) -> Result<Self, PathError> {
        let path = normalise(path.as_ref())?;
        Ok(Self { path, target })
    }

    /// Normalised path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Target the path is scoped to.
    #[must_use]
    pub const fn target(&self) -> OperatingTarget {
        self.target
    }

    /// Volume name without the trailing colon.
    #[must_use]
    pub fn volume(&self) -> &str {
        self.path
            .split_once(':')
            .map_or(self.path.as_str(), |(volume, _)| volume)
    }

    /// Returns `true` for a volume root such as `XD:\`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.ends_with(SEPARATOR)
    }

    /// Final component, or `None` for a root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.path.rsplit_once(SEPARATOR).map(|(_, name)| name)
    }

    /// Parent directory, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let (head, _) = self.path.rsplit_once(SEPARATOR)?;
        let parent = if head.ends_with(':') {
            format!("{head}{SEPARATOR}")
        } else {
            head.to_owned()
        };
        Some(Self {
            path: parent,
            target: self.target,
        })
    }

    /// Appends a single component.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] when `name` contains a separator or the joined
    /// path violates the namespace rules.
    pub fn join(&self, name: &str) -> Result<Self, PathError> {
        if name.is_empty() || name.contains(SEPARATOR) || name.contains('/') {
            return Err(PathError::InvalidComponent {
                path: name.to_owned(),
            });
        }
        let joined = if self.is_root() {
            format!("{}{name}", self.path)
        } else {
            format!("{}{SEPARATOR}{name}", self.path)
        };
        Self::new(joined, self.target)
    }

    /// Returns `true` when both paths name the same entry, ignoring case.
    #[must_use]
    pub fn same_entry(&self, other: &Self) -> bool {
        self.target == other.target && self.path.eq_ignore_ascii_case(&other.path)
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.target, self.path)
    }
}

fn normalise(raw: &str) -> Result<String, PathError> {
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if let Some(character) = raw
        .chars()
        .find(|c| c.is_control() || INVALID_CHARACTERS.contains(c))
    {
        return Err(PathError::InvalidCharacter { character });
    }
    let unified = raw.replace('/', "\\");
    let Some((volume, rest)) = unified.split_once(':') else {
        return Err(PathError::MissingVolume {
            path: raw.to_owned(),
        });
    };
    if volume.is_empty() || !volume.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PathError::MissingVolume {
            path: raw.to_owned(),
        });
    }
    let rest = if rest.is_empty() {
        rest
    } else {
        rest.strip_prefix(SEPARATOR)
            .ok_or_else(|| PathError::NotAbsolute {
                path: raw.to_owned(),
            })?
    };
    let rest = rest.strip_suffix(SEPARATOR).unwrap_or(rest);
    let normalised = if rest.is_empty() {
        format!("{volume}:{SEPARATOR}")
    } else {
        if let Some(character) = rest.chars().find(|c| *c == ':') {
            return Err(PathError::InvalidCharacter { character });
        }
        if rest
            .split(SEPARATOR)
            .any(|component| component.is_empty() || component == "." || component == "..")
        {
            return Err(PathError::InvalidComponent {
                path: raw.to_owned(),
            });
        }
        format!("{volume}:{SEPARATOR}{rest}")
    };
    let length = normalised.chars().count();
    if length > MAX_PATH_LEN {
        return Err(PathError::TooLong { length });
    }
    Ok(normalised)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn title(path: &str) -> RemotePath {
        RemotePath::new(path, OperatingTarget::Title).expect("valid path")
    }

    #[rstest]
    #[case("XD:", "XD:\\")]
    #[case("XD:\\", "XD:\\")]
    #[case("XD:\\games\\", "XD:\\games")]
    #[case("XD:/games/save", "XD:\\games\\save")]
    fn normalises_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(title(input).as_str(), expected);
    }

    #[rstest]
    #[case("", PathError::Empty)]
    #[case("games\\save", PathError::MissingVolume { path: String::from("games\\save") })]
    #[case("XD:games", PathError::NotAbsolute { path: String::from("XD:games") })]
    #[case("XD:\\a*b", PathError::InvalidCharacter { character: '*' })]
    #[case("XD:\\a\\\\b", PathError::InvalidComponent { path: String::from("XD:\\a\\\\b") })]
    #[case("XD:\\a\\..\\b", PathError::InvalidComponent { path: String::from("XD:\\a\\..\\b") })]
    fn rejects_invalid_paths(#[case] input: &str, #[case] expected: PathError) {
        let error = RemotePath::new(input, OperatingTarget::Title).expect_err("invalid path");
        assert_eq!(error, expected);
    }

    #[test]
    fn rejects_overlong_paths() {
        let long = format!("XD:\\{}", "a".repeat(MAX_PATH_LEN));
        let error = RemotePath::new(long, OperatingTarget::Title).expect_err("too long");
        assert!(matches!(error, PathError::TooLong { .. }));
    }

    #[test]
    fn roots_have_no_parent_or_name() {
        let root = title("XD:\\");
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.file_name(), None);
        assert_eq!(root.volume(), "XD");
    }

    #[test]
    fn parent_of_top_level_entry_is_root() {
        let entry = title("XD:\\games");
        let parent = entry.parent().expect("parent");
        assert!(parent.is_root());
        assert_eq!(parent.as_str(), "XD:\\");
        assert_eq!(entry.file_name(), Some("games"));
    }

    #[test]
    fn join_and_parent_round_trip() {
        let dir = title("XD:\\games");
        let child = dir.join("save.dat").expect("join");
        assert_eq!(child.as_str(), "XD:\\games\\save.dat");
        assert_eq!(child.parent(), Some(dir));
    }

    #[test]
    fn join_rejects_nested_components() {
        let dir = title("XD:\\games");
        assert!(dir.join("a\\b").is_err());
        assert!(dir.join("").is_err());
    }

    #[test]
    fn same_entry_ignores_case_but_not_target() {
        let upper = title("XD:\\Games");
        let lower = title("xd:\\games");
        let system = RemotePath::new("XD:\\games", OperatingTarget::System).expect("valid");
        assert!(upper.same_entry(&lower));
        assert!(!upper.same_entry(&system));
    }
}
