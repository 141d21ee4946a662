//! # Run Plan
//!
//! Computes which units a run executes, in which direction and order, and
//! which version each step leaves the store at. Pure: nothing here touches
//! the database or the store.

use super::errors::{MigrationError, MigrationResult};
use super::version::{MigrationTarget, MigrationVersion};
use super::Direction;

/// One step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    /// Unit to execute
    pub version: MigrationVersion,

    pub direction: Direction,

    /// Version recorded once the step succeeds. Forward: the unit's own
    /// version. Backward: the next registered version below it, or 0.
    pub resulting_version: MigrationVersion,
}

/// Ordered steps taking the store from `from` to `to`. Empty means no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub from: MigrationVersion,
    pub to: MigrationVersion,
    steps: Vec<PlannedStep>,
}

impl RunPlan {
    /// Plan a run from `current` towards `target` over the registered
    /// `versions` (ascending).
    pub fn compute(
        versions: &[MigrationVersion],
        current: MigrationVersion,
        target: MigrationTarget,
    ) -> MigrationResult<Self> {
        let wanted = target.version;

        if wanted == current && !target.rerun {
            return Ok(Self::noop(current));
        }

        let registered = versions.binary_search(&wanted).is_ok();
        if !registered && !(wanted.is_zero() && !target.rerun) {
            return Err(MigrationError::UnknownVersion { version: wanted });
        }

        let steps = if wanted == current {
            vec![PlannedStep {
                version: current,
                direction: Direction::Up,
                resulting_version: current,
            }]
        } else if wanted > current {
            versions
                .iter()
                .filter(|v| **v > current && **v <= wanted)
                .map(|&version| PlannedStep {
                    version,
                    direction: Direction::Up,
                    resulting_version: version,
                })
                .collect()
        } else {
            if target.rerun {
                return Err(MigrationError::BackwardRerun {
                    target: wanted,
                    current,
                });
            }

            let below = |version: MigrationVersion| {
                versions
                    .iter()
                    .rev()
                    .find(|v| **v < version)
                    .copied()
                    .unwrap_or(MigrationVersion::ZERO)
            };

            versions
                .iter()
                .rev()
                .filter(|v| **v > wanted && **v <= current)
                .map(|&version| PlannedStep {
                    version,
                    direction: Direction::Down,
                    resulting_version: below(version),
                })
                .collect()
        };

        Ok(Self {
            from: current,
            to: wanted,
            steps,
        })
    }

    fn noop(current: MigrationVersion) -> Self {
        Self {
            from: current,
            to: current,
            steps: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.steps.first().map(|s| s.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> MigrationVersion {
        s.parse().unwrap()
    }

    fn registry() -> Vec<MigrationVersion> {
        vec![v("1.0"), v("1.1"), v("1.2")]
    }

    fn summary(plan: &RunPlan) -> Vec<(String, Direction, String)> {
        plan.steps()
            .iter()
            .map(|s| (s.version.to_string(), s.direction, s.resulting_version.to_string()))
            .collect()
    }

    #[test]
    fn test_same_version_is_noop() {
        for current in ["0", "1.0", "1.2", "4.0"] {
            let plan =
                RunPlan::compute(&registry(), v(current), MigrationTarget::to(v(current))).unwrap();
            assert!(plan.is_empty());
        }
    }

    #[test]
    fn test_forward_path() {
        let plan = RunPlan::compute(&registry(), v("1.0"), MigrationTarget::to(v("1.2"))).unwrap();
        assert_eq!(
            summary(&plan),
            vec![
                ("1.1".to_string(), Direction::Up, "1.1".to_string()),
                ("1.2".to_string(), Direction::Up, "1.2".to_string()),
            ]
        );
    }

    #[test]
    fn test_forward_from_zero() {
        let plan = RunPlan::compute(&registry(), v("0"), MigrationTarget::to(v("1.1"))).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].version, v("1.0"));
    }

    #[test]
    fn test_backward_path() {
        let plan = RunPlan::compute(&registry(), v("1.2"), MigrationTarget::to(v("1.0"))).unwrap();
        assert_eq!(
            summary(&plan),
            vec![
                ("1.2".to_string(), Direction::Down, "1.1".to_string()),
                ("1.1".to_string(), Direction::Down, "1.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_full_rollback_to_zero() {
        let plan = RunPlan::compute(&registry(), v("1.2"), MigrationTarget::to(v("0"))).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[2].resulting_version, MigrationVersion::ZERO);
        assert_eq!(plan.direction(), Some(Direction::Down));
    }

    #[test]
    fn test_rerun_replays_current_up() {
        let plan =
            RunPlan::compute(&registry(), v("1.1"), MigrationTarget::rerun(v("1.1"))).unwrap();
        assert_eq!(
            summary(&plan),
            vec![("1.1".to_string(), Direction::Up, "1.1".to_string())]
        );
    }

    #[test]
    fn test_unknown_target() {
        let err = RunPlan::compute(&[v("1.0"), v("1.1")], v("1.0"), MigrationTarget::to(v("2.0")))
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion { version } if version == v("2.0")));
    }

    #[test]
    fn test_rerun_of_zero_is_unknown() {
        let err = RunPlan::compute(&registry(), v("0"), MigrationTarget::rerun(v("0"))).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion { .. }));
    }

    #[test]
    fn test_backward_rerun_rejected() {
        let err =
            RunPlan::compute(&registry(), v("1.2"), MigrationTarget::rerun(v("1.0"))).unwrap_err();
        assert!(matches!(err, MigrationError::BackwardRerun { .. }));
    }

    #[test]
    fn test_forward_rerun_is_plain_forward() {
        let plan =
            RunPlan::compute(&registry(), v("1.0"), MigrationTarget::rerun(v("1.2"))).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_backward_skips_gaps_in_registry() {
        let versions = vec![v("1.0"), v("1.5"), v("2.0")];
        let plan = RunPlan::compute(&versions, v("2.0"), MigrationTarget::to(v("1.0"))).unwrap();
        assert_eq!(
            summary(&plan),
            vec![
                ("2.0".to_string(), Direction::Down, "1.5".to_string()),
                ("1.5".to_string(), Direction::Down, "1.0".to_string()),
            ]
        );
    }
}
