//! Parsing of installed device-kit version strings.
//!
//! The grammar is fixed: four dot-separated numbers, a space, then the
//! branch name and build timestamp in parentheses, for example
//! `1.2.3.11785 (xb_rel_1411.150101-0000)`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Reasons a version string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The input was blank.
    #[error("version string is empty")]
    Empty,
    /// The numeric part is not followed by a parenthesised branch.
    #[error("version string '{input}' has no '(branch.timestamp)' suffix")]
    MissingBranch {
        /// Rejected input.
        input: String,
    },
    /// The numeric part does not have four components.
    #[error("version number '{number}' must have four components, found {found}")]
    ComponentCount {
        /// Numeric part of the input.
        number: String,
        /// Components found.
        found: usize,
    },
    /// A numeric component is not a number.
    #[error("version component '{component}' is not a number")]
    InvalidComponent {
        /// Offending component.
        component: String,
    },
    /// The branch or timestamp inside the parentheses is missing.
    #[error("branch stamp '{stamp}' must look like 'branch.timestamp'")]
    InvalidStamp {
        /// Parenthesised text.
        stamp: String,
    },
}

/// A parsed device-kit version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitVersion {
    /// First numeric component.
    pub major: u32,
    /// Second numeric component.
    pub minor: u32,
    /// Third numeric component.
    pub build: u32,
    /// Fourth numeric component.
    pub revision: u32,
    /// Release branch, possibly carrying a patch suffix.
    pub branch: String,
    /// Build timestamp as stamped by the release pipeline.
    pub timestamp: String,
}

impl FromStr for KitVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let missing_branch = || VersionParseError::MissingBranch {
            input: input.to_owned(),
        };
        let (number, stamp) = input.split_once(' ').ok_or_else(missing_branch)?;
        let stamp = stamp
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(missing_branch)?;

        let [major, minor, build, revision] = parse_number(number)?;
        let (branch, timestamp) = stamp
            .rsplit_once('.')
            .filter(|(branch, timestamp)| !branch.is_empty() && !timestamp.is_empty())
            .ok_or_else(|| VersionParseError::InvalidStamp {
                stamp: stamp.to_owned(),
            })?;

        Ok(Self {
            major,
            minor,
            build,
            revision,
            branch: branch.to_owned(),
            timestamp: timestamp.to_owned(),
        })
    }
}

fn parse_number(number: &str) -> Result<[u32; 4], VersionParseError> {
    let components: Vec<&str> = number.split('.').collect();
    let [major, minor, build, revision] = components.as_slice() else {
        return Err(VersionParseError::ComponentCount {
            number: number.to_owned(),
            found: components.len(),
        });
    };
    let parse = |component: &str| {
        component
            .parse::<u32>()
            .map_err(|_| VersionParseError::InvalidComponent {
                component: component.to_owned(),
            })
    };
    Ok([
        parse(*major)?,
        parse(*minor)?,
        parse(*build)?,
        parse(*revision)?,
    ])
}

impl fmt::Display for KitVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}.{}.{}.{} ({}.{})",
            self.major, self.minor, self.build, self.revision, self.branch, self.timestamp
        )
    }
}
