//! Path pattern matching for policy tables.
//!
//! Patterns are compiled once when a [`RouteTable`] is built:
//!
//! - `/api/config` is an exact path,
//! - `/api/groups/:id` matches one non-empty segment per `:param`,
//! - `/api/ai/*` matches everything under the literal prefix,
//! - anything else mixing the two compiles to an anchored regex.
//!
//! Resolution is exact lookup first, then patterns **in declaration order**,
//! then the default. Overlapping patterns are not ranked by specificity: the
//! first declared pattern that matches wins.

use std::collections::HashMap;

use regex::Regex;

use crate::error::ConfigError;

/// One segment of a `:param` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    Exact(String),
    Param(Vec<Segment>),
    Wildcard(String),
    Glob(Regex),
}

impl RouteMatcher {
    /// Compile a table key into a matcher.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let has_param = pattern.contains(':');
        let has_wildcard = pattern.contains('*');

        if !has_param && !has_wildcard {
            return Ok(RouteMatcher::Exact(pattern.to_string()));
        }

        if !has_param && pattern.matches('*').count() == 1 && pattern.ends_with('*') {
            return Ok(RouteMatcher::Wildcard(
                pattern.trim_end_matches('*').to_string(),
            ));
        }

        let segment_params = pattern
            .split('/')
            .all(|segment| !segment.contains(':') || segment.starts_with(':'));

        if !has_wildcard && segment_params {
            let mut segments = Vec::new();
            for segment in pattern.split('/') {
                match segment.strip_prefix(':') {
                    Some("") => return Err(invalid("parameter without a name")),
                    Some(name) => segments.push(Segment::Param(name.to_string())),
                    None => segments.push(Segment::Literal(segment.to_string())),
                }
            }
            return Ok(RouteMatcher::Param(segments));
        }

        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| invalid(&e.to_string()))?;
        Ok(RouteMatcher::Glob(regex))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            RouteMatcher::Exact(expected) => expected == path,
            RouteMatcher::Param(segments) => {
                let mut parts = path.split('/');
                for segment in segments {
                    match (segment, parts.next()) {
                        (Segment::Literal(expected), Some(part)) if expected == part => {}
                        (Segment::Param(_), Some(part)) if !part.is_empty() => {}
                        _ => return false,
                    }
                }
                parts.next().is_none()
            }
            RouteMatcher::Wildcard(prefix) => path.starts_with(prefix.as_str()),
            RouteMatcher::Glob(regex) => regex.is_match(path),
        }
    }
}

/// `:name` becomes `[^/]+`, `*` becomes `.*`, everything else is literal.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ':' => {
                while chars.peek().is_some_and(|next| *next != '/') {
                    chars.next();
                }
                out.push_str("[^/]+");
            }
            '*' => out.push_str(".*"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

/// An ordered table of path patterns to configuration values, with a default.
#[derive(Debug, Clone)]
pub struct RouteTable<C> {
    entries: Vec<(String, C)>,
    exact: HashMap<String, usize>,
    patterns: Vec<(RouteMatcher, usize)>,
    default: C,
}

impl<C> RouteTable<C> {
    /// Start a table with the config used for unmatched paths.
    pub fn builder(default: C) -> RouteTableBuilder<C> {
        RouteTableBuilder {
            routes: Vec::new(),
            default,
        }
    }

    /// Resolve the config for `path`. Never fails: unmatched paths get the default.
    pub fn resolve(&self, path: &str) -> &C {
        if let Some(&index) = self.exact.get(path) {
            return &self.entries[index].1;
        }

        self.patterns
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map(|(_, index)| &self.entries[*index].1)
            .unwrap_or(&self.default)
    }

    pub fn default_config(&self) -> &C {
        &self.default
    }

    /// Declared routes in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &C)> {
        self.entries
            .iter()
            .map(|(pattern, config)| (pattern.as_str(), config))
    }
}

/// Collects routes in declaration order, then compiles them.
#[derive(Debug)]
pub struct RouteTableBuilder<C> {
    routes: Vec<(String, C)>,
    default: C,
}

impl<C> RouteTableBuilder<C> {
    pub fn route(mut self, pattern: impl Into<String>, config: C) -> Self {
        self.routes.push((pattern.into(), config));
        self
    }

    pub fn build(self) -> Result<RouteTable<C>, ConfigError> {
        let mut exact = HashMap::new();
        let mut patterns = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (index, (pattern, _)) in self.routes.iter().enumerate() {
            if !seen.insert(pattern.clone()) {
                return Err(ConfigError::DuplicateRoute(pattern.clone()));
            }

            match RouteMatcher::compile(pattern)? {
                RouteMatcher::Exact(path) => {
                    exact.insert(path, index);
                }
                matcher => patterns.push((matcher, index)),
            }
        }

        Ok(RouteTable {
            entries: self.routes,
            exact,
            patterns,
            default: self.default,
        })
    }
}
