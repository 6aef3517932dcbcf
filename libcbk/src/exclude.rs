//! Exclusion expressions: `build/|.log|*.tmp`.
//!
//! An expression is a `|`-separated list of rules. Each rule is one of
//!
//! * `name/` – a directory whose base name is `name` (its whole subtree is
//!   skipped by the archive builder),
//! * `.ext` – any entry whose extension (text from the last `.` of the base
//!   name, dot included) equals the rule,
//! * anything else – a shell glob (`*`, `?`, `[...]`) matched against the
//!   entry's base name.
//!
//! The literal expression `none` compiles to a set that never excludes.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use glob::Pattern;

use crate::error::{Error, Result};
use crate::utils::EntryKind;

/// Expression meaning "exclude nothing".
pub const NONE: &str = "none";
/// Separator between rules.
pub const RULE_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeRule {
    /// Directory base name, stored without the trailing separator.
    Directory(String),
    /// Extension including its leading dot.
    Extension(String),
    /// Glob applied to the base name.
    Glob(Pattern),
}

impl ExcludeRule {
    /// Compile a single rule. Empty input is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::Policy("empty exclusion rule".into()));
        }
        if let Some(stripped) = raw.strip_suffix(|c| std::path::is_separator(c)) {
            if stripped.is_empty() {
                return Err(Error::Policy(format!("directory rule `{raw}` has no name")));
            }
            return Ok(Self::Directory(stripped.to_string()));
        }
        if raw.starts_with('.') {
            return Ok(Self::Extension(raw.to_string()));
        }
        Pattern::new(raw)
            .map(Self::Glob)
            .map_err(|e| Error::Policy(format!("invalid glob `{raw}`: {e}")))
    }

    /// Does this rule exclude `path` of the given kind?
    pub fn matches(&self, path: &Path, kind: EntryKind) -> bool {
        let Some(base) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        match self {
            Self::Directory(name) => kind == EntryKind::Dir && base == name.as_str(),
            Self::Extension(ext) => extension_of(&base) == ext.as_str(),
            Self::Glob(pat) => pat.matches(&base),
        }
    }
}

impl fmt::Display for ExcludeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(name) => write!(f, "{name}/"),
            Self::Extension(ext) => f.write_str(ext),
            Self::Glob(pat) => f.write_str(pat.as_str()),
        }
    }
}

/// Extension from the last `.` of a base name, dot included; `""` if none.
fn extension_of(base: &str) -> &str {
    base.rfind('.').map_or("", |i| &base[i..])
}

/// A compiled exclusion expression. Evaluation is pure, so the same set
/// gives the same answer on every pass over a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    rules: Vec<ExcludeRule>,
}

impl ExclusionSet {
    /// The set that excludes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Compile `expr`. Empty segments between separators are skipped;
    /// an expression with no rules at all is a [`Error::Policy`].
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr == NONE {
            return Ok(Self::none());
        }
        let rules = expr
            .split(RULE_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ExcludeRule::parse)
            .collect::<Result<Vec<_>>>()?;
        if rules.is_empty() {
            return Err(Error::Policy(format!(
                "exclusion expression `{expr}` contains no rules (use `{NONE}` to disable exclusion)"
            )));
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ExcludeRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True if any rule matches.
    pub fn is_excluded(&self, path: &Path, kind: EntryKind) -> bool {
        self.rules.iter().any(|r| r.matches(path, kind))
    }
}

impl FromStr for ExclusionSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ExclusionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rules.is_empty() {
            return f.write_str(NONE);
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                write!(f, "{RULE_SEPARATOR}")?;
            }
            write!(f, "{rule}")?;
        }
        Ok(())
    }
}
