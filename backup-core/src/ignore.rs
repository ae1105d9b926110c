//! Ignore policy.
//!
//! A rule without a `/` is a bare name and matches that segment at any
//! depth (`.venv` ignores every directory called `.venv`). A rule with a `/`
//! is a path from the tree root (`projects/scratch`). Either form also
//! excludes everything beneath a matching directory. Extension rules match
//! files only.

use std::fmt;

use serde::Serialize;

use crate::error::ConfigError;
use crate::types::{EntryKind, RelPath};

/// One configured ignore rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IgnoreRule {
    /// Matches any segment with this exact name.
    Name(String),
    /// Matches this path and its descendants.
    Path(RelPath),
}

impl IgnoreRule {
    /// Parse a configured rule string.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let invalid = |reason| ConfigError::InvalidIgnoreRule {
            rule: raw.to_owned(),
            reason,
        };
        if trimmed.split(['/', '\\']).any(|s| s == "..") {
            return Err(invalid("'..' segments are not allowed"));
        }
        let path = RelPath::parse(trimmed).ok_or_else(|| invalid("rule is empty"))?;
        if path.depth() == 1 {
            Ok(Self::Name(path.as_str().to_owned()))
        } else {
            Ok(Self::Path(path))
        }
    }

    /// `true` if the rule matches `path` itself or one of its ancestors.
    pub fn matches(&self, path: &RelPath) -> bool {
        match self {
            IgnoreRule::Name(name) => path.segments().any(|s| s == name),
            IgnoreRule::Path(rule) => rule == path || rule.is_ancestor_of(path),
        }
    }
}

impl fmt::Display for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreRule::Name(name) => name.fmt(f),
            IgnoreRule::Path(path) => path.fmt(f),
        }
    }
}

/// The complete ignore policy applied to both trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
    extensions: Vec<String>,
}

impl IgnoreRules {
    pub fn new(rules: Vec<IgnoreRule>, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(&ext))
            .filter(|ext| ext.len() > 1)
            .collect();
        Self { rules, extensions }
    }

    /// Parse raw rule strings and extensions as they appear in the config.
    pub fn parse<S: AsRef<str>>(rules: &[S], extensions: &[S]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|r| IgnoreRule::parse(r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let extensions = extensions.iter().map(|e| e.as_ref().to_owned()).collect();
        Ok(Self::new(rules, extensions))
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.extensions.is_empty()
    }

    pub fn is_ignored(&self, path: &RelPath, kind: EntryKind) -> bool {
        is_ignored(path, kind, self)
    }
}

/// Decide whether `path` is excluded from synchronization.
pub fn is_ignored(path: &RelPath, kind: EntryKind, rules: &IgnoreRules) -> bool {
    if rules.rules.iter().any(|rule| rule.matches(path)) {
        return true;
    }
    if kind == EntryKind::File {
        if let Some(ext) = path.extension() {
            return rules.extensions.iter().any(|e| e == ext);
        }
    }
    false
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('.') {
        trimmed.to_owned()
    } else {
        format!(".{trimmed}")
    }
}
