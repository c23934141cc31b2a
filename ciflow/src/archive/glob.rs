//! Ant-style glob patterns compiled to regular expressions.
//!
//! Supported syntax:
//! - `**` matches any number of path segments, including none
//! - `*` matches within a single segment
//! - `?` matches one character other than `/`
//! - a trailing `/` is shorthand for `/**`
//!
//! Several patterns may be combined with commas (`reports/*.xml, *.log`).

use crate::errors::ArchiveError;
use regex::Regex;

/// A compiled set of glob patterns.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regexes: Vec<Regex>,
}

impl GlobPattern {
    /// Compiles a (possibly comma-separated) glob pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidPattern`] for an empty pattern.
    pub fn new(pattern: &str) -> Result<Self, ArchiveError> {
        let parts: Vec<&str> = pattern
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            return Err(ArchiveError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let regexes = parts
            .into_iter()
            .map(|part| {
                Regex::new(&glob_to_regex(part)).map_err(|e| ArchiveError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            regexes,
        })
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests a `/`-separated path relative to the workspace root.
    #[must_use]
    pub fn matches(&self, relative_path: &str) -> bool {
        let path = relative_path.trim_start_matches("./");
        self.regexes.iter().any(|re| re.is_match(path))
    }
}

/// Translates one glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut glob = glob.trim_start_matches("./").replace('\\', "/");
    if glob.ends_with('/') {
        glob.push_str("**");
    }

    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}
