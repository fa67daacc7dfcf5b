//! The grading state machine.
//!
//! [`Grades`] records case grades as they arrive in any order and derives
//! group grades bottom-up the moment a group becomes ready. A group is
//! ready when every child is graded, or earlier under `on_reject: break`:
//! once an unbroken run of accepted children hits the first graded
//! rejection, the group aggregates over exactly that truncated prefix and
//! later siblings never enter the aggregate.
//!
//! Grades are write-once. Re-assigning a case the grade it already has is a
//! no-op; a different grade is a conflict. Likewise a re-derivation that
//! reproduces a group's established grade is silently suppressed, while a
//! diverging one reports the inconsistency instead of rewriting history.
//!
//! Aggregation failures of the external grader are absorbed: the group is
//! graded `JE` and grading continues, so one broken subtree cannot wedge
//! the whole run.

use std::collections::BTreeMap;

use tracing::{error, info};

use crate::error::GradeError;
use crate::grader::{Aggregate, BuiltinGrader};
use crate::hierarchy::{NodeId, TestHierarchy, ROOT};
use crate::settings::{OnReject, SettingsResolver};
use crate::verdict::{Grade, Verdict};

/// A node that just became graded.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeEvent {
    pub node: NodeId,
    pub grade: Grade,
}

/// Grading state for one submission over one test data hierarchy.
#[derive(Debug)]
pub struct Grades<A: Aggregate> {
    hierarchy: TestHierarchy,
    settings: SettingsResolver,
    aggregator: A,
    case_grades: BTreeMap<String, Grade>,
    group_grades: BTreeMap<String, Grade>,
}

impl Grades<BuiltinGrader> {
    /// A grading run using the flag-driven builtin aggregation policies.
    pub fn builtin(hierarchy: TestHierarchy, settings: SettingsResolver) -> Self {
        Grades::new(hierarchy, settings, BuiltinGrader)
    }
}

impl<A: Aggregate> Grades<A> {
    pub fn new(hierarchy: TestHierarchy, settings: SettingsResolver, aggregator: A) -> Self {
        Grades {
            hierarchy,
            settings,
            aggregator,
            case_grades: BTreeMap::new(),
            group_grades: BTreeMap::new(),
        }
    }

    pub fn hierarchy(&self) -> &TestHierarchy {
        &self.hierarchy
    }

    /// Record a case grade and derive every group grade that becomes
    /// available as a consequence, bottom-up. Returns the nodes that became
    /// graded, the case first.
    pub fn assign(&mut self, case: &str, grade: Grade) -> Result<Vec<GradeEvent>, GradeError> {
        let name = match self.hierarchy.node_at(case) {
            Some(NodeId::Case(name)) => name,
            _ => return Err(GradeError::UnknownCase(case.to_string())),
        };
        if let Some(existing) = self.case_grades.get(&name) {
            if *existing == grade {
                return Ok(Vec::new());
            }
            return Err(GradeError::AssignConflict {
                case: name,
                existing: existing.clone(),
                new: grade,
            });
        }

        info!(case = %name, grade = %grade, "case graded");
        self.case_grades.insert(name.clone(), grade.clone());
        let mut events = vec![GradeEvent {
            node: NodeId::Case(name.clone()),
            grade,
        }];

        let parents = self
            .hierarchy
            .case_parents(&name)
            .map(|set| set.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        for parent in parents {
            self.derive_upward(&parent, &mut events)?;
        }
        Ok(events)
    }

    /// The grade of any node, if established. Accepts group paths, case
    /// short names, and full case paths.
    pub fn grade(&self, node: &str) -> Option<&Grade> {
        match self.hierarchy.node_at(node)? {
            NodeId::Case(name) => self.case_grades.get(&name),
            NodeId::Group(path) => self.group_grades.get(&path),
        }
    }

    pub fn verdict(&self, node: &str) -> Option<Verdict> {
        self.grade(node).map(|grade| grade.verdict)
    }

    pub fn score(&self, node: &str) -> Option<f64> {
        self.grade(node).and_then(|grade| grade.score)
    }

    pub fn is_accepted(&self, node: &str) -> bool {
        self.grade(node).is_some_and(Grade::is_accepted)
    }

    pub fn is_rejected(&self, node: &str) -> bool {
        self.grade(node).is_some_and(Grade::is_rejected)
    }

    /// The overall grade, once the root has aggregated.
    pub fn root_grade(&self) -> Option<&Grade> {
        self.group_grades.get(ROOT)
    }

    pub fn is_complete(&self) -> bool {
        self.group_grades.contains_key(ROOT)
    }

    fn node_grade(&self, node: &NodeId) -> Option<&Grade> {
        match node {
            NodeId::Case(name) => self.case_grades.get(name),
            NodeId::Group(path) => self.group_grades.get(path),
        }
    }

    /// The child grades a group would aggregate over right now, or `None`
    /// while the group is not ready.
    fn ready_children(&self, group: &str) -> Option<Vec<Grade>> {
        let truncating = self.settings.effective(group).on_reject == OnReject::Break;
        let mut grades = Vec::new();
        for child in self.hierarchy.children(group) {
            let grade = self.node_grade(child)?;
            grades.push(grade.clone());
            if truncating && grade.is_rejected() {
                break;
            }
        }
        Some(grades)
    }

    /// Walk from `group` to the root, aggregating at every level that is
    /// ready. The walk never stops early: a node that is not ready simply
    /// does not aggregate, but an ancestor may still be ready on its own
    /// under `on_reject: break`. Re-deriving an established grade is a
    /// suppressed no-op when equal and a conflict when it diverges.
    fn derive_upward(&mut self, group: &str, events: &mut Vec<GradeEvent>) -> Result<(), GradeError> {
        let mut current = group.to_string();
        loop {
            if let Some(children) = self.ready_children(&current) {
                let settings = self.settings.effective(&current);
                let grade = match self.aggregator.aggregate(&settings, &children) {
                    Ok(grade) => grade,
                    Err(err) => {
                        error!(group = %current, error = %err, "aggregation failed, grading group JE");
                        Grade::judge_error()
                    }
                };

                match self.group_grades.get(&current) {
                    Some(existing) if *existing == grade => {}
                    Some(existing) => {
                        return Err(GradeError::DerivedConflict {
                            node: current,
                            existing: existing.clone(),
                            derived: grade,
                        });
                    }
                    None => {
                        info!(group = %current, grade = %grade, "group graded");
                        self.group_grades.insert(current.clone(), grade.clone());
                        events.push(GradeEvent {
                            node: NodeId::Group(current.clone()),
                            grade,
                        });
                    }
                }
            }
            if current == ROOT {
                return Ok(());
            }
            current = TestHierarchy::parent_of(&current).to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JudgeError;
    use crate::settings::Settings;
    use crate::verdict::Verdict;
    use std::cell::Cell;

    fn settings(entries: &[(&str, &[(&str, &str)])]) -> SettingsResolver {
        let raw = entries
            .iter()
            .map(|(path, kvs)| {
                (
                    path.to_string(),
                    kvs.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            })
            .collect();
        SettingsResolver::new(&raw).unwrap()
    }

    fn hierarchy(paths: &[&str]) -> TestHierarchy {
        TestHierarchy::from_paths(paths.iter().copied()).unwrap()
    }

    fn ac(score: f64) -> Grade {
        Grade::new(Verdict::Ac, score)
    }

    fn event_paths(events: &[GradeEvent]) -> Vec<String> {
        events.iter().map(|e| e.node.to_string()).collect()
    }

    #[test]
    fn test_grades_flow_to_the_root() {
        let mut grades = Grades::builtin(
            hierarchy(&["sample/s1", "secret/x1", "secret/x2"]),
            settings(&[]),
        );

        let events = grades.assign("s1", ac(1.0)).unwrap();
        assert_eq!(event_paths(&events), ["s1", "sample"]);
        assert_eq!(grades.grade("sample"), Some(&ac(1.0)));
        assert!(!grades.is_complete());

        let events = grades.assign("x1", ac(1.0)).unwrap();
        assert_eq!(event_paths(&events), ["x1"]);

        let events = grades.assign("secret/x2", ac(1.0)).unwrap();
        assert_eq!(event_paths(&events), ["x2", "secret", "."]);
        assert_eq!(grades.grade("secret"), Some(&ac(2.0)));
        assert_eq!(grades.root_grade(), Some(&ac(3.0)));
        assert!(grades.is_complete());
        assert_eq!(grades.verdict("."), Some(Verdict::Ac));
        assert_eq!(grades.score("."), Some(3.0));
        assert!(grades.is_accepted("secret"));
        assert!(!grades.is_rejected("secret"));
        assert!(!grades.is_accepted("unknown"));
    }

    #[test]
    fn test_break_aggregates_the_truncated_prefix() {
        let mut grades = Grades::builtin(
            hierarchy(&["sample/s1", "secret/x1", "secret/x2", "secret/x3"]),
            settings(&[]),
        );

        // a rejection alone is not enough while an earlier sibling is open
        grades.assign("x2", Grade::new(Verdict::Wa, 0.0)).unwrap();
        assert_eq!(grades.grade("secret"), None);

        // the accepted prefix closes the group without waiting for x3
        let events = grades.assign("x1", ac(1.0)).unwrap();
        assert_eq!(event_paths(&events), ["x1", "secret"]);
        assert_eq!(grades.grade("secret"), Some(&Grade::new(Verdict::Wa, 1.0)));

        // root truncates at the rejected secret group the same way
        let events = grades.assign("s1", ac(1.0)).unwrap();
        assert_eq!(event_paths(&events), ["s1", "sample", "."]);
        assert_eq!(grades.root_grade(), Some(&Grade::new(Verdict::Wa, 2.0)));

        // the straggler is recorded but changes nothing upstream
        let events = grades.assign("x3", ac(1.0)).unwrap();
        assert_eq!(event_paths(&events), ["x3"]);
        assert_eq!(grades.grade("secret"), Some(&Grade::new(Verdict::Wa, 1.0)));
    }

    #[test]
    fn test_on_reject_continue_waits_for_every_child() {
        let mut grades = Grades::builtin(
            hierarchy(&["secret/x1", "secret/x2"]),
            settings(&[(".", &[("on_reject", "continue")])]),
        );
        grades.assign("x1", Grade::new(Verdict::Tle, 0.0)).unwrap();
        assert_eq!(grades.grade("secret"), None);
        grades.assign("x2", ac(1.0)).unwrap();
        assert_eq!(grades.grade("secret"), Some(&Grade::new(Verdict::Tle, 1.0)));
        assert_eq!(grades.root_grade(), Some(&Grade::new(Verdict::Tle, 1.0)));
    }

    #[test]
    fn test_grader_flags_per_group() {
        let mut grades = Grades::builtin(
            hierarchy(&["secret/group1/a", "secret/group1/b", "secret/group2/c"]),
            settings(&[
                (".", &[("on_reject", "continue")]),
                ("secret/group1", &[("grader_flags", "max accept_if_any_accepted")]),
            ]),
        );
        grades.assign("a", ac(5.0)).unwrap();
        grades.assign("b", Grade::new(Verdict::Wa, 6.0)).unwrap();
        // any child accepted, max score
        assert_eq!(grades.grade("secret/group1"), Some(&ac(6.0)));

        grades.assign("c", ac(4.0)).unwrap();
        assert_eq!(grades.grade("secret"), Some(&ac(10.0)));
        assert_eq!(grades.root_grade(), Some(&ac(10.0)));
    }

    #[test]
    fn test_first_error_and_worst_error_verdicts() {
        let base: &[(&str, &[(&str, &str)])] = &[(".", &[("on_reject", "continue")])];
        let mut worst = Grades::builtin(hierarchy(&["secret/w1", "secret/w2"]), settings(base));
        worst.assign("w1", Grade::new(Verdict::Tle, 0.0)).unwrap();
        worst.assign("w2", Grade::new(Verdict::Rte, 0.0)).unwrap();
        assert_eq!(worst.grade("secret").unwrap().verdict, Verdict::Rte);

        let mut first = Grades::builtin(
            hierarchy(&["secret/w1", "secret/w2"]),
            settings(&[(".", &[("on_reject", "continue"), ("grader_flags", "first_error")])]),
        );
        first.assign("w1", Grade::new(Verdict::Tle, 0.0)).unwrap();
        first.assign("w2", Grade::new(Verdict::Rte, 0.0)).unwrap();
        assert_eq!(first.grade("secret").unwrap().verdict, Verdict::Tle);
    }

    #[test]
    fn test_default_scores_come_from_the_aggregating_group() {
        let mut grades = Grades::builtin(
            hierarchy(&["secret/x1", "secret/x2"]),
            settings(&[("secret", &[("accept_score", "3")])]),
        );
        grades.assign("x1", Grade::new(Verdict::Ac, None)).unwrap();
        grades.assign("x2", Grade::new(Verdict::Ac, None)).unwrap();
        // substituted under secret's settings, then summed again at the root
        assert_eq!(grades.grade("secret"), Some(&ac(6.0)));
        assert_eq!(grades.root_grade(), Some(&ac(6.0)));
    }

    #[test]
    fn test_shared_case_feeds_all_its_groups() {
        let mut grades = Grades::builtin(
            hierarchy(&["sample/1", "secret/extra/1"]),
            settings(&[]),
        );
        let events = grades.assign("1", ac(1.0)).unwrap();
        assert_eq!(
            event_paths(&events),
            ["1", "sample", "secret/extra", "secret", "."]
        );
        assert_eq!(grades.root_grade(), Some(&ac(2.0)));
    }

    #[test]
    fn test_assign_is_write_once() {
        let mut grades = Grades::builtin(hierarchy(&["secret/x1", "secret/x2"]), settings(&[]));
        grades.assign("x1", ac(1.0)).unwrap();

        // same grade again is a no-op
        assert_eq!(grades.assign("x1", ac(1.0)).unwrap(), Vec::new());

        // a different grade is a conflict
        assert!(matches!(
            grades.assign("x1", Grade::new(Verdict::Wa, 0.0)),
            Err(GradeError::AssignConflict { .. })
        ));

        // only cases can be assigned
        assert!(matches!(
            grades.assign("secret", ac(1.0)),
            Err(GradeError::UnknownCase(_))
        ));
        assert!(matches!(
            grades.assign("nope", ac(1.0)),
            Err(GradeError::UnknownCase(_))
        ));
    }

    /// Returns a different score on every call, simulating a
    /// non-deterministic external grader.
    struct Flaky(Cell<i64>);

    impl Aggregate for Flaky {
        fn aggregate(&self, _: &Settings, _: &[Grade]) -> Result<Grade, JudgeError> {
            self.0.set(self.0.get() + 1);
            Ok(Grade::new(Verdict::Wa, self.0.get() as f64))
        }
    }

    #[test]
    fn test_rederivation_must_reproduce_the_established_grade() {
        // builtin: the straggler re-derives the same truncated prefix,
        // which is silently suppressed (covered above). A diverging
        // re-derivation is an error:
        let mut grades = Grades::new(
            hierarchy(&["secret/x1", "secret/x2"]),
            settings(&[]),
            Flaky(Cell::new(0)),
        );
        grades.assign("x1", Grade::new(Verdict::Wa, 0.0)).unwrap();
        assert_eq!(grades.grade("secret"), Some(&Grade::new(Verdict::Wa, 1.0)));
        assert!(matches!(
            grades.assign("x2", ac(1.0)),
            Err(GradeError::DerivedConflict { .. })
        ));
    }

    struct Broken;

    impl Aggregate for Broken {
        fn aggregate(&self, _: &Settings, _: &[Grade]) -> Result<Grade, JudgeError> {
            Err(JudgeError::MissingStdout)
        }
    }

    #[test]
    fn test_aggregation_failure_grades_the_group_je() {
        let mut grades = Grades::new(hierarchy(&["secret/x1"]), settings(&[]), Broken);
        grades.assign("x1", ac(1.0)).unwrap();
        assert_eq!(grades.grade("secret"), Some(&Grade::judge_error()));
        assert_eq!(grades.root_grade(), Some(&Grade::judge_error()));
    }
}
