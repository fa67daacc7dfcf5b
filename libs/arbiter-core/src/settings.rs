//! Per-group grading settings and their inheritance.
//!
//! Settings come from a plain `path -> {key: value}` override mapping
//! (typically loaded from `testdata.yaml`-style files by the caller). A
//! node's effective settings are the hard-coded defaults, overwritten by
//! each ancestor's override from the root down, overwritten by the node's
//! own override; unspecified keys pass through unchanged.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use tracing::debug;

use crate::error::ConfigError;
use crate::verdict::{ScoreRange, Verdict};

/// Whether a group may aggregate before all its children are graded once an
/// early rejection is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnReject {
    #[default]
    Break,
    Continue,
}

impl FromStr for OnReject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "break" => Ok(OnReject::Break),
            "continue" => Ok(OnReject::Continue),
            other => Err(format!("expected `break` or `continue`, got {other:?}")),
        }
    }
}

/// Effective settings for one node, after inheritance.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub on_reject: OnReject,
    pub grader_flags: String,
    pub accept_score: f64,
    pub reject_score: f64,
    /// Structural bound that declared expectation score ranges must respect.
    pub range: ScoreRange,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            on_reject: OnReject::Break,
            grader_flags: String::new(),
            accept_score: 1.0,
            reject_score: 0.0,
            range: ScoreRange::UNBOUNDED,
        }
    }
}

impl Settings {
    /// Default score substituted for a child graded `verdict` without an
    /// explicit score.
    pub fn default_score(&self, verdict: Verdict) -> f64 {
        if verdict.is_accepted() {
            self.accept_score
        } else {
            self.reject_score
        }
    }

    /// Whether `grader_flags` contains the given whitespace-delimited token.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.grader_flags.split_whitespace().any(|token| token == flag)
    }
}

#[derive(Debug, Clone, Default)]
struct Override {
    on_reject: Option<OnReject>,
    grader_flags: Option<String>,
    accept_score: Option<f64>,
    reject_score: Option<f64>,
    range: Option<ScoreRange>,
}

impl Override {
    fn apply(&self, settings: &mut Settings) {
        if let Some(on_reject) = self.on_reject {
            settings.on_reject = on_reject;
        }
        if let Some(flags) = &self.grader_flags {
            settings.grader_flags = flags.clone();
        }
        if let Some(score) = self.accept_score {
            settings.accept_score = score;
        }
        if let Some(score) = self.reject_score {
            settings.reject_score = score;
        }
        if let Some(range) = self.range {
            settings.range = range;
        }
    }
}

/// Resolves the effective settings of any node path on demand.
///
/// Pure in the override map it was built from; queried on every grading
/// transition, so results are memoized by path. Unknown nodes simply
/// receive the default chain.
#[derive(Debug, Clone, Default)]
pub struct SettingsResolver {
    overrides: BTreeMap<String, Override>,
    memo: RefCell<HashMap<String, Settings>>,
}

impl SettingsResolver {
    /// Parse and validate the raw override mapping. Unrelated keys (e.g.
    /// validator flags riding along in the same file) are ignored.
    pub fn new(raw: &BTreeMap<String, BTreeMap<String, String>>) -> Result<Self, ConfigError> {
        let mut overrides = BTreeMap::new();
        for (path, entries) in raw {
            let node = if path.is_empty() { "." } else { path.as_str() };
            let mut o = Override::default();
            for (key, value) in entries {
                let invalid = |reason: String| ConfigError::InvalidSetting {
                    path: node.to_string(),
                    key: key.clone(),
                    reason,
                };
                match key.as_str() {
                    "on_reject" => o.on_reject = Some(value.parse().map_err(invalid)?),
                    "grader_flags" => o.grader_flags = Some(value.clone()),
                    "accept_score" => o.accept_score = Some(parse_score(value).map_err(invalid)?),
                    "reject_score" => o.reject_score = Some(parse_score(value).map_err(invalid)?),
                    "range" => o.range = Some(value.parse()?),
                    other => {
                        debug!(path = node, key = other, "ignoring unrelated testdata setting");
                    }
                }
            }
            overrides.insert(node.to_string(), o);
        }
        Ok(SettingsResolver {
            overrides,
            memo: RefCell::new(HashMap::new()),
        })
    }

    /// Effective settings for `path`: defaults, then every ancestor override
    /// from the root down, then the node's own override.
    pub fn effective(&self, path: &str) -> Settings {
        if let Some(hit) = self.memo.borrow().get(path) {
            return hit.clone();
        }
        let mut settings = Settings::default();
        if let Some(o) = self.overrides.get(".") {
            o.apply(&mut settings);
        }
        if !path.is_empty() && path != "." {
            let mut prefix = String::with_capacity(path.len());
            for component in path.split('/') {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(component);
                if let Some(o) = self.overrides.get(&prefix) {
                    o.apply(&mut settings);
                }
            }
        }
        self.memo
            .borrow_mut()
            .insert(path.to_string(), settings.clone());
        settings
    }
}

fn parse_score(value: &str) -> Result<f64, String> {
    match value.trim().parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(score),
        _ => Err(format!("expected a finite number, got {value:?}")),
    }
}
