// path pattern module - maps changed files and module directories onto module types

use crate::config::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

/// module type reported when no pattern matches a directory
pub const UNKNOWN_MODULE_TYPE: &str = "unknown";

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("path pattern is empty")]
    Empty,
}

/// one `/`-delimited piece of a path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Wildcard,
}

/// a glob-like path template such as `modules/service/*`
///
/// segments are either literal (byte-equal match) or `*`, which matches any
/// single path segment and contributes it to the derived module path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let segments = raw
            .split('/')
            .map(|part| {
                if part == WILDCARD {
                    Segment::Wildcard
                } else {
                    Segment::Literal(part.to_string())
                }
            })
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// match the leading segments of a candidate and return the derived module path
    ///
    /// segments past the pattern's length (a file name, nested dirs) are ignored.
    pub fn match_segments<S: AsRef<str>>(&self, candidate: &[S]) -> Option<String> {
        if candidate.len() < self.segments.len() {
            return None;
        }

        let mut derived: Vec<&str> = Vec::with_capacity(self.segments.len());
        for (segment, part) in self.segments.iter().zip(candidate) {
            let part = part.as_ref();
            match segment {
                Segment::Wildcard => derived.push(part),
                Segment::Literal(literal) if literal == part => derived.push(literal),
                Segment::Literal(_) => return None,
            }
        }

        Some(derived.join("/"))
    }

    /// match a `/`-delimited relative path, anchored at its first segment
    pub fn matches(&self, candidate: &str) -> Option<String> {
        let parts: Vec<&str> = candidate.split('/').collect();
        self.match_segments(&parts)
    }

    /// glob-match against any contiguous run of segments, not just the leading ones
    ///
    /// inside a segment `?` matches one character and `*` matches any run of
    /// characters. a segment never spans a `/`.
    pub fn find_in<S: AsRef<str>>(&self, segments: &[S]) -> Option<String> {
        let window = self.segments.len();
        if segments.len() < window {
            return None;
        }

        (0..=segments.len() - window).find_map(|start| {
            let run = &segments[start..start + window];
            let matched = self.segments.iter().zip(run).all(|(segment, part)| match segment {
                Segment::Wildcard => true,
                Segment::Literal(literal) => glob_segment(literal, part.as_ref()),
            });
            matched.then(|| run.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("/"))
        })
    }
}

/// match one path segment against a glob made of literals, `?` and `*`
fn glob_segment(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // position of the last `*` and the text index it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;
    let (mut p, mut t) = (0, 0);

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    star = Some((star_p, star_t + 1));
                    p = star_p + 1;
                    t = star_t + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// match a single changed file against a single pattern string
///
/// returns the derived module path on success. an empty pattern never matches.
pub fn match_path(candidate: &str, pattern: &str) -> Option<String> {
    PathPattern::parse(pattern)
        .ok()
        .and_then(|pattern| pattern.matches(candidate))
}

/// how malformed module type entries in the configuration are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShapePolicy {
    /// skip the offending entry and keep going
    #[default]
    Lenient,
    /// fail on the first offending entry
    Strict,
}

impl ShapePolicy {
    fn check(self, path: impl Into<String>, expected: &'static str) -> Result<(), ConfigError> {
        let path = path.into();
        match self {
            Self::Lenient => {
                log::debug!("skipping malformed config entry '{path}' (expected {expected})");
                Ok(())
            }
            Self::Strict => Err(ConfigError::Shape { path, expected }),
        }
    }
}

/// a named module category with the patterns that recognise its modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTypeRule {
    pub name: String,
    pub path_patterns: Vec<PathPattern>,
    pub policy_dir: Option<String>,
}

/// module type rules in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTypeRules {
    rules: Vec<ModuleTypeRule>,
}

impl ModuleTypeRules {
    pub fn new(rules: Vec<ModuleTypeRule>) -> Self {
        Self { rules }
    }

    /// build rules from the raw `module_types` value of the configuration
    pub fn from_value(value: &Value, policy: ShapePolicy) -> Result<Self, ConfigError> {
        let Some(types) = value.as_object() else {
            policy.check("module_types", "an object")?;
            return Ok(Self::default());
        };

        let mut rules = Vec::with_capacity(types.len());
        for (name, entry) in types {
            let Some(entry) = entry.as_object() else {
                policy.check(format!("module_types.{name}"), "an object")?;
                continue;
            };

            let mut path_patterns = Vec::new();
            match entry.get("path_patterns").and_then(Value::as_array) {
                Some(patterns) => {
                    for (idx, raw) in patterns.iter().enumerate() {
                        match raw.as_str().map(PathPattern::parse) {
                            Some(Ok(pattern)) => path_patterns.push(pattern),
                            _ => policy.check(
                                format!("module_types.{name}.path_patterns[{idx}]"),
                                "a non-empty string",
                            )?,
                        }
                    }
                }
                None => policy.check(
                    format!("module_types.{name}.path_patterns"),
                    "a list of patterns",
                )?,
            }

            let policy_dir = match entry.get("policy_dir") {
                None | Some(Value::Null) => None,
                Some(Value::String(dir)) => Some(dir.clone()),
                Some(_) => {
                    policy.check(format!("module_types.{name}.policy_dir"), "a string")?;
                    None
                }
            };

            rules.push(ModuleTypeRule {
                name: name.clone(),
                path_patterns,
                policy_dir,
            });
        }

        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleTypeRule> {
        self.rules.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ModuleTypeRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// a module root derived from a changed file, with its module type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ModuleMatch {
    pub path: String,
    pub module_type: String,
}

/// classify a set of changed files into the distinct modules they touch
///
/// when several rules derive the same module path the last one in
/// configuration order wins. results are sorted by module path.
pub fn classify_changes<S: AsRef<str>>(changed_files: &[S], rules: &ModuleTypeRules) -> Vec<ModuleMatch> {
    let mut modules: BTreeMap<String, &str> = BTreeMap::new();

    for file in changed_files {
        let parts: Vec<&str> = file.as_ref().split('/').collect();
        for rule in rules.iter() {
            for pattern in &rule.path_patterns {
                if let Some(path) = pattern.match_segments(&parts) {
                    log::trace!("{} matches {} ({}) -> {}", file.as_ref(), pattern, rule.name, path);
                    modules.insert(path, &rule.name);
                }
            }
        }
    }

    modules
        .into_iter()
        .map(|(path, module_type)| ModuleMatch {
            path,
            module_type: module_type.to_string(),
        })
        .collect()
}

/// classify a single module directory into a module type
///
/// a pattern matches when it lines up with any contiguous run of the
/// directory's segments, with `?` and `*` globbing inside a segment. the
/// path is cleaned lexically first. the first rule in configuration order wins.
pub fn classify_directory(directory: &Path, rules: &ModuleTypeRules) -> String {
    let segments = directory_segments(directory);

    rules
        .iter()
        .find(|rule| {
            rule.path_patterns
                .iter()
                .any(|pattern| pattern.find_in(&segments).is_some())
        })
        .map_or_else(|| UNKNOWN_MODULE_TYPE.to_string(), |rule| rule.name.clone())
}

/// the directory's segments after lexical cleaning: `x/..` pairs collapse,
/// `.` and any `..` left at the root are dropped
fn directory_segments(directory: &Path) -> Vec<String> {
    let mut segments = Vec::new();
    for component in directory.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                segments.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    segments
}
