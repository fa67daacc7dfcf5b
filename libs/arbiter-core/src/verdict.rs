//! Verdicts, grades, and score ranges.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Outcome of judging a single test case or an aggregated test group.
///
/// Ordered by badness: `JE > RTE > TLE > WA > AC`. `Je` marks a failure of
/// the grading process itself; it can be observed but never expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "WA")]
    Wa,
    #[serde(rename = "TLE")]
    Tle,
    #[serde(rename = "RTE")]
    Rte,
    #[serde(rename = "JE")]
    Je,
}

impl Verdict {
    /// The short code used on the grader wire protocol.
    pub const fn code(self) -> &'static str {
        match self {
            Verdict::Ac => "AC",
            Verdict::Wa => "WA",
            Verdict::Tle => "TLE",
            Verdict::Rte => "RTE",
            Verdict::Je => "JE",
        }
    }

    pub const fn is_accepted(self) -> bool {
        matches!(self, Verdict::Ac)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Verdict {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AC" => Ok(Verdict::Ac),
            "WA" => Ok(Verdict::Wa),
            "TLE" => Ok(Verdict::Tle),
            "RTE" => Ok(Verdict::Rte),
            "JE" => Ok(Verdict::Je),
            other => Err(ConfigError::UnknownVerdict(other.to_string())),
        }
    }
}

/// A set of verdicts, used for expectation constraints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerdictSet(BTreeSet<Verdict>);

impl VerdictSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All verdicts a submission may legitimately be expected to produce,
    /// i.e. everything except `JE`.
    pub fn expectable() -> Self {
        [Verdict::Ac, Verdict::Wa, Verdict::Tle, Verdict::Rte]
            .into_iter()
            .collect()
    }

    pub fn single(verdict: Verdict) -> Self {
        std::iter::once(verdict).collect()
    }

    /// Parse a list of short codes. `JE` parses here; callers that treat the
    /// set as an expectation must reject it separately.
    pub fn from_codes<I, S>(codes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes
            .into_iter()
            .map(|code| code.as_ref().parse())
            .collect()
    }

    pub fn insert(&mut self, verdict: Verdict) {
        self.0.insert(verdict);
    }

    pub fn intersect(&self, other: &Self) -> Self {
        self.0.intersection(&other.0).copied().collect()
    }

    pub fn contains(&self, verdict: Verdict) -> bool {
        self.0.contains(&verdict)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Exactly `{AC}`: the set that propagates downward through the
    /// hierarchy during expectation resolution.
    pub fn is_exactly_accepted(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&Verdict::Ac)
    }

    pub fn iter(&self) -> impl Iterator<Item = Verdict> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Verdict> for VerdictSet {
    fn from_iter<T: IntoIterator<Item = Verdict>>(iter: T) -> Self {
        VerdictSet(iter.into_iter().collect())
    }
}

impl fmt::Display for VerdictSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, verdict) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{verdict}")?;
        }
        write!(f, "}}")
    }
}

/// An immutable (verdict, score) pair.
///
/// A `None` score on a case means "use the aggregating group's
/// context-dependent default"; aggregated group grades always carry a
/// concrete score, except `JE`, which carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub verdict: Verdict,
    pub score: Option<f64>,
}

impl Grade {
    pub fn new(verdict: Verdict, score: impl Into<Option<f64>>) -> Self {
        Grade {
            verdict,
            score: score.into(),
        }
    }

    /// The grade recorded when the grading process itself failed.
    pub const fn judge_error() -> Self {
        Grade {
            verdict: Verdict::Je,
            score: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }

    pub fn is_rejected(&self) -> bool {
        !self.verdict.is_accepted()
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verdict)?;
        if let Some(score) = self.score {
            write!(f, " {score}")?;
        }
        Ok(())
    }
}

/// A closed numeric interval with inclusive bounds; `inf`/`-inf` literals
/// are accepted. A one-token range like `"5"` is the degenerate `5 5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub lo: f64,
    pub hi: f64,
}

impl ScoreRange {
    pub const UNBOUNDED: ScoreRange = ScoreRange {
        lo: f64::NEG_INFINITY,
        hi: f64::INFINITY,
    };

    pub fn contains(&self, score: f64) -> bool {
        self.lo <= score && score <= self.hi
    }

    pub fn is_subset_of(&self, outer: &ScoreRange) -> bool {
        self.lo >= outer.lo && self.hi <= outer.hi
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        ScoreRange::UNBOUNDED
    }
}

impl FromStr for ScoreRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidScoreRange {
            text: s.to_string(),
        };
        let parse = |token: &str| -> Result<f64, ConfigError> {
            let value: f64 = token.parse().map_err(|_| invalid())?;
            if value.is_nan() {
                return Err(invalid());
            }
            Ok(value)
        };
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let (lo, hi) = match tokens.as_slice() {
            [single] => {
                let value = parse(single)?;
                (value, value)
            }
            [lo, hi] => (parse(lo)?, parse(hi)?),
            _ => return Err(invalid()),
        };
        if lo > hi {
            return Err(ConfigError::ReversedScoreRange {
                text: s.to_string(),
            });
        }
        Ok(ScoreRange { lo, hi })
    }
}

impl fmt::Display for ScoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_codes_roundtrip() {
        for verdict in [Verdict::Ac, Verdict::Wa, Verdict::Tle, Verdict::Rte, Verdict::Je] {
            assert_eq!(verdict.code().parse::<Verdict>().unwrap(), verdict);
        }
        assert!("ACCEPTED".parse::<Verdict>().is_err());
        assert!("".parse::<Verdict>().is_err());
    }

    #[test]
    fn test_verdict_badness_order() {
        assert!(Verdict::Je > Verdict::Rte);
        assert!(Verdict::Rte > Verdict::Tle);
        assert!(Verdict::Tle > Verdict::Wa);
        assert!(Verdict::Wa > Verdict::Ac);
    }

    #[test]
    fn test_verdict_set_operations() {
        let all = VerdictSet::expectable();
        assert_eq!(all.len(), 4);
        assert!(!all.contains(Verdict::Je));

        let ac = VerdictSet::single(Verdict::Ac);
        assert!(ac.is_exactly_accepted());
        assert!(!all.is_exactly_accepted());

        let wa_tle = VerdictSet::from_codes(["WA", "TLE"]).unwrap();
        assert!(ac.intersect(&wa_tle).is_empty());
        assert_eq!(all.intersect(&wa_tle), wa_tle);
        assert_eq!(wa_tle.to_string(), "{WA, TLE}");
    }

    #[test]
    fn test_grade_display() {
        assert_eq!(Grade::new(Verdict::Ac, 1.0).to_string(), "AC 1");
        assert_eq!(Grade::new(Verdict::Wa, 0.5).to_string(), "WA 0.5");
        assert_eq!(Grade::judge_error().to_string(), "JE");
    }

    #[test]
    fn test_score_range_parse() {
        let range: ScoreRange = "0 23".parse().unwrap();
        assert_eq!(range, ScoreRange { lo: 0.0, hi: 23.0 });
        assert!(range.contains(0.0));
        assert!(range.contains(23.0));
        assert!(range.contains(11.5));
        assert!(!range.contains(-1.0));
        assert!(!range.contains(24.0));

        let single: ScoreRange = "5".parse().unwrap();
        assert_eq!(single, ScoreRange { lo: 5.0, hi: 5.0 });

        let unbounded: ScoreRange = "-inf inf".parse().unwrap();
        assert_eq!(unbounded, ScoreRange::UNBOUNDED);
        assert!(unbounded.contains(f64::INFINITY));
        assert!(unbounded.contains(f64::NEG_INFINITY));
    }

    #[test]
    fn test_score_range_rejects_garbage() {
        assert!("".parse::<ScoreRange>().is_err());
        assert!("1 2 3".parse::<ScoreRange>().is_err());
        assert!("abc".parse::<ScoreRange>().is_err());
        assert!("nan nan".parse::<ScoreRange>().is_err());
        assert!(matches!(
            "23 0".parse::<ScoreRange>(),
            Err(ConfigError::ReversedScoreRange { .. })
        ));
    }

    #[test]
    fn test_score_range_subset() {
        let outer: ScoreRange = "0 100".parse().unwrap();
        let inner: ScoreRange = "0 23".parse().unwrap();
        assert!(inner.is_subset_of(&outer));
        assert!(!outer.is_subset_of(&inner));
        assert!(inner.is_subset_of(&ScoreRange::UNBOUNDED));
    }
}
