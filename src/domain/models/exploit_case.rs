//! Exploit case domain model.
//!
//! An exploit case is one cell of the task's matrix: a named piece of
//! executable evidence that an attack succeeds. Cases are never deleted;
//! they are re-run against every later patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which phase discovered the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseOrigin {
    Static,
    Fuzz,
    Adversarial,
}

impl CaseOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "STATIC",
            Self::Fuzz => "FUZZ",
            Self::Adversarial => "ADVERSARIAL",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STATIC" => Some(Self::Static),
            "FUZZ" | "FUZZER" => Some(Self::Fuzz),
            "ADVERSARIAL" | "RED_TEAM" => Some(Self::Adversarial),
            _ => None,
        }
    }
}

/// Status of an exploit case against the current source.
///
/// FAILING means the attack still succeeds (an active red); PASSING means
/// the defense held on the last regression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Pending,
    Failing,
    Passing,
}

impl Default for CaseStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Failing => "FAILING",
            Self::Passing => "PASSING",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "FAILING" => Some(Self::Failing),
            "PASSING" => Some(Self::Passing),
            _ => None,
        }
    }

    /// Map an attack routine's outcome onto the case status.
    ///
    /// Every stored case is an attack: assertions succeeding means the
    /// vulnerability is still there.
    pub fn from_attack_outcome(outcome: RoutineOutcome) -> Self {
        match outcome {
            RoutineOutcome::Success => Self::Failing,
            RoutineOutcome::Failure => Self::Passing,
        }
    }
}

/// Outcome of one executed test routine, as reported by the regression runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutineOutcome {
    Success,
    Failure,
}

/// Round label used for provenance and artifact naming. Never part of
/// identity or deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag(u32);

impl VersionTag {
    /// Tag for the round that starts with `round_count` fixes applied.
    pub fn for_round(round_count: u32) -> Self {
        Self(round_count + 1)
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One registered exploit case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploitCase {
    pub id: Uuid,
    pub task_id: Uuid,
    pub origin: CaseOrigin,
    /// Unique within the task; cross-round identity
    pub name: String,
    pub description: Option<String>,
    /// Full executable evidence
    pub code: String,
    pub status: CaseStatus,
    pub version_added: String,
    pub created_at: DateTime<Utc>,
}

impl ExploitCase {
    /// A newly confirmed case. Discovery and weaponize register cases as
    /// active reds.
    pub fn confirmed(
        task_id: Uuid,
        origin: CaseOrigin,
        name: impl Into<String>,
        code: impl Into<String>,
        version: &VersionTag,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            origin,
            name: name.into(),
            description: None,
            code: code.into(),
            status: CaseStatus::Failing,
            version_added: version.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_active_red(&self) -> bool {
        self.status == CaseStatus::Failing
    }
}

const FUZZ_CASE_PREFIX: &str = "Fuzz_Crash_";

/// Deterministic name of the fuzz case registered in a given round.
pub fn fuzz_case_name(version: &VersionTag) -> String {
    format!("{FUZZ_CASE_PREFIX}{version}")
}

/// Test routine that replays a fuzz case. Foundry only runs routines
/// prefixed with `test`.
pub fn fuzz_routine_name(version: &VersionTag) -> String {
    format!("test{}", fuzz_case_name(version))
}

/// Case name a reported test routine stands for.
pub fn case_name_for_routine(routine: &str) -> &str {
    routine
        .strip_prefix("test")
        .filter(|rest| rest.starts_with(FUZZ_CASE_PREFIX))
        .unwrap_or(routine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tag_labels() {
        assert_eq!(VersionTag::for_round(0).to_string(), "v1");
        assert_eq!(VersionTag::for_round(3).to_string(), "v4");
        assert_eq!(VersionTag::for_round(0).next().to_string(), "v2");
        assert_eq!(fuzz_case_name(&VersionTag::for_round(0)), "Fuzz_Crash_v1");
        assert_eq!(fuzz_routine_name(&VersionTag::for_round(2)), "testFuzz_Crash_v3");
    }

    #[test]
    fn test_case_name_for_routine() {
        assert_eq!(case_name_for_routine("testFuzz_Crash_v3"), "Fuzz_Crash_v3");
        assert_eq!(case_name_for_routine("testExploit_Reentrancy_01"), "testExploit_Reentrancy_01");
        assert_eq!(case_name_for_routine("testFuzz_DepositWithdraw"), "testFuzz_DepositWithdraw");
    }

    #[test]
    fn test_regression_polarity() {
        assert_eq!(CaseStatus::from_attack_outcome(RoutineOutcome::Success), CaseStatus::Failing);
        assert_eq!(CaseStatus::from_attack_outcome(RoutineOutcome::Failure), CaseStatus::Passing);
    }

    #[test]
    fn test_confirmed_case_is_active_red() {
        let case = ExploitCase::confirmed(
            Uuid::new_v4(),
            CaseOrigin::Adversarial,
            "testExploit_Reentrancy_01",
            "contract ExploitTest {}",
            &VersionTag::for_round(1),
        );
        assert!(case.is_active_red());
        assert_eq!(case.version_added, "v2");
    }

    #[test]
    fn test_origin_accepts_legacy_labels() {
        assert_eq!(CaseOrigin::from_str("FUZZER"), Some(CaseOrigin::Fuzz));
        assert_eq!(CaseOrigin::from_str("red_team"), Some(CaseOrigin::Adversarial));
        assert_eq!(CaseOrigin::from_str("static"), Some(CaseOrigin::Static));
    }
}
