//! Declared expectations: which verdicts and score ranges a submission is
//! allowed to produce at every node of the test data hierarchy.
//!
//! Expectations are built once from a declarative nested mapping (the only
//! reserved keys are `verdict` and `score`; every other key names a child
//! group or case), optionally combined with two root-only sources that the
//! caller has already resolved to verdict sets: a legacy verdict-tag list
//! and a verdict implied by the submission's directory name. They are
//! read-only afterwards and never mutate grades.
//!
//! A node whose resolved allowed set is exactly `{AC}` forces `{AC}` onto
//! its children, modelling "if the whole group must be fully accepted,
//! every sub-part must be too" — except where the aggregation policy
//! tolerates partial failure (`accept_if_any_accepted`, `always_accept`)
//! or the root ignores its sample group (`ignore_sample`).

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::ConfigError;
use crate::hierarchy::ROOT;
use crate::settings::SettingsResolver;
use crate::verdict::{Grade, ScoreRange, Verdict, VerdictSet};

/// Grader flags under which a group's acceptance tolerates rejected
/// children, suppressing downward `{AC}` propagation.
const TOLERANT_FLAGS: [&str; 2] = ["accept_if_any_accepted", "always_accept"];

/// The allowed verdicts and score range for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub verdicts: VerdictSet,
    pub range: ScoreRange,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verdicts)?;
        if self.range != ScoreRange::UNBOUNDED {
            write!(f, ", score in {}", self.range)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct Declared {
    verdicts: Option<VerdictSet>,
    range: Option<ScoreRange>,
}

/// Per-node expectation constraints with downward inheritance.
#[derive(Debug, Clone)]
pub struct Expectations {
    declared: BTreeMap<String, Declared>,
    settings: SettingsResolver,
}

impl Expectations {
    /// Build from the declarative tree alone.
    pub fn from_spec(spec: &Value, settings: &SettingsResolver) -> Result<Self, ConfigError> {
        Self::build(Some(spec), None, None, settings)
    }

    /// Build from the declarative tree plus the two optional root-only
    /// sources. All sources that supply a root verdict set must agree.
    pub fn build(
        spec: Option<&Value>,
        legacy_tags: Option<VerdictSet>,
        dirname_verdicts: Option<VerdictSet>,
        settings: &SettingsResolver,
    ) -> Result<Self, ConfigError> {
        let mut declared = BTreeMap::new();
        if let Some(spec) = spec {
            walk(ROOT, spec, &mut declared, settings)?;
        }

        // reconcile the root-only sources against the declarative tree
        let mut root_set = declared
            .get(ROOT)
            .and_then(|d: &Declared| d.verdicts.clone());
        for source in [legacy_tags, dirname_verdicts].into_iter().flatten() {
            if source.contains(Verdict::Je) {
                return Err(ConfigError::JudgeErrorNotExpectable {
                    path: ROOT.to_string(),
                });
            }
            if source.is_empty() {
                return Err(ConfigError::EmptyVerdictSet {
                    path: ROOT.to_string(),
                });
            }
            match &root_set {
                Some(current) if *current != source => {
                    return Err(ConfigError::ContradictoryRoot {
                        left: current.to_string(),
                        right: source.to_string(),
                    });
                }
                Some(_) => {}
                None => root_set = Some(source),
            }
        }
        if let Some(set) = root_set {
            declared.entry(ROOT.to_string()).or_default().verdicts = Some(set);
        }

        let expectations = Expectations {
            declared,
            settings: settings.clone(),
        };

        // downward propagation must leave every declared node satisfiable
        for path in expectations.declared.keys() {
            if expectations.lookup(path).verdicts.is_empty() {
                return Err(ConfigError::EmptyVerdictSet { path: path.clone() });
            }
        }
        Ok(expectations)
    }

    /// The allowed verdicts and score range for a node, after downward
    /// inheritance. Nodes never mentioned anywhere get the permissive
    /// default (every non-JE verdict, unbounded range) unless an `{AC}`
    /// ancestor forces them.
    pub fn lookup(&self, path: &str) -> Expectation {
        let path = if path.is_empty() { ROOT } else { path };
        let mut verdicts = VerdictSet::expectable();
        let mut range = ScoreRange::UNBOUNDED;
        if let Some(d) = self.declared.get(ROOT) {
            if let Some(set) = &d.verdicts {
                verdicts = verdicts.intersect(set);
            }
            range = d.range.unwrap_or(ScoreRange::UNBOUNDED);
        }
        if path == ROOT {
            return Expectation { verdicts, range };
        }

        let mut parent = ROOT.to_string();
        let mut prefix = String::with_capacity(path.len());
        for component in path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);

            let forced =
                verdicts.is_exactly_accepted() && !self.propagation_suppressed(&parent, component);
            verdicts = if forced {
                VerdictSet::single(Verdict::Ac)
            } else {
                VerdictSet::expectable()
            };
            range = ScoreRange::UNBOUNDED;
            if let Some(d) = self.declared.get(&prefix) {
                if let Some(set) = &d.verdicts {
                    verdicts = verdicts.intersect(set);
                }
                if let Some(declared_range) = d.range {
                    range = declared_range;
                }
            }
            parent.clone_from(&prefix);
        }
        Expectation { verdicts, range }
    }

    /// Allowed verdicts for a node.
    pub fn verdicts(&self, path: &str) -> VerdictSet {
        self.lookup(path).verdicts
    }

    /// Allowed score range for a node.
    pub fn range(&self, path: &str) -> ScoreRange {
        self.lookup(path).range
    }

    /// Whether a grade satisfies the expectation at a node: the verdict is
    /// in the allowed set and, if the grade carries a score, that score lies
    /// within the allowed range.
    pub fn is_expected(&self, grade: &Grade, path: &str) -> bool {
        let expectation = self.lookup(path);
        expectation.verdicts.contains(grade.verdict)
            && grade.score.is_none_or(|score| expectation.range.contains(score))
    }

    fn propagation_suppressed(&self, parent: &str, child: &str) -> bool {
        let settings = self.settings.effective(parent);
        if TOLERANT_FLAGS.iter().any(|flag| settings.has_flag(flag)) {
            return true;
        }
        parent == ROOT && child == "sample" && settings.has_flag("ignore_sample")
    }
}

fn walk(
    path: &str,
    value: &Value,
    declared: &mut BTreeMap<String, Declared>,
    settings: &SettingsResolver,
) -> Result<(), ConfigError> {
    match value {
        // bare shorthand: a node mapped straight to a verdict or code list
        Value::String(_) | Value::Array(_) => {
            let set = verdict_set(path, value)?;
            constrain(declared, path, set)
        }
        Value::Object(map) => {
            if let Some(verdict) = map.get("verdict") {
                let set = verdict_set(path, verdict)?;
                constrain(declared, path, set)?;
            }
            if let Some(score) = map.get("score") {
                if !map.contains_key("verdict") {
                    return Err(ConfigError::ScoreWithoutVerdict {
                        path: path.to_string(),
                    });
                }
                let range = score_range(path, score)?;
                let bound = settings.effective(path).range;
                if !range.is_subset_of(&bound) {
                    return Err(ConfigError::RangeExceedsBound {
                        path: path.to_string(),
                        declared: range.to_string(),
                        bound: bound.to_string(),
                    });
                }
                declared.entry(path.to_string()).or_default().range = Some(range);
            }
            for (key, child) in map {
                if key == "verdict" || key == "score" {
                    continue;
                }
                if path == ROOT && key != "sample" && key != "secret" {
                    return Err(ConfigError::UnexpectedRootKey { key: key.clone() });
                }
                let child_path = if path == ROOT {
                    key.clone()
                } else {
                    format!("{path}/{key}")
                };
                walk(&child_path, child, declared, settings)?;
            }
            Ok(())
        }
        other => Err(ConfigError::InvalidExpectation {
            path: path.to_string(),
            reason: format!("unsupported value {other}"),
        }),
    }
}

/// Intersect (not overwrite) a node's allowed set with a new constraint.
fn constrain(
    declared: &mut BTreeMap<String, Declared>,
    path: &str,
    set: VerdictSet,
) -> Result<(), ConfigError> {
    let node = declared.entry(path.to_string()).or_default();
    let next = match node.verdicts.take() {
        Some(current) => current.intersect(&set),
        None => set,
    };
    if next.is_empty() {
        return Err(ConfigError::EmptyVerdictSet {
            path: path.to_string(),
        });
    }
    node.verdicts = Some(next);
    Ok(())
}

fn verdict_set(path: &str, value: &Value) -> Result<VerdictSet, ConfigError> {
    let parse = |code: &str| -> Result<Verdict, ConfigError> {
        let verdict: Verdict = code.parse()?;
        if verdict == Verdict::Je {
            return Err(ConfigError::JudgeErrorNotExpectable {
                path: path.to_string(),
            });
        }
        Ok(verdict)
    };
    let set: VerdictSet = match value {
        Value::String(code) => VerdictSet::single(parse(code)?),
        Value::Array(codes) => codes
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| ConfigError::InvalidExpectation {
                        path: path.to_string(),
                        reason: "verdict list entries must be strings".to_string(),
                    })
                    .and_then(parse)
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(ConfigError::InvalidExpectation {
                path: path.to_string(),
                reason: format!("`verdict` must be a code or list of codes, got {other}"),
            })
        }
    };
    if set.is_empty() {
        return Err(ConfigError::EmptyVerdictSet {
            path: path.to_string(),
        });
    }
    Ok(set)
}

fn score_range(path: &str, value: &Value) -> Result<ScoreRange, ConfigError> {
    match value {
        Value::String(text) => text.parse(),
        Value::Number(n) => {
            let score = n.as_f64().unwrap_or(f64::NAN);
            format!("{score}").parse()
        }
        other => Err(ConfigError::InvalidExpectation {
            path: path.to_string(),
            reason: format!("`score` must be a range string, got {other}"),
        }),
    }
}
