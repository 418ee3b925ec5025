//! Strategy lifecycle, leg definitions, and journal status domain.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::instrument::OptionRight;

/// Strategy lifecycle states.
///
/// `CREATED → ARMED → ACTIVE → {PAUSED, MORPHING, CLOSING} → CLOSED`,
/// with `PAUSED → ACTIVE` on resume. `CLOSED` is terminal; a closed
/// strategy is redeployed as a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyStatus {
    Created,
    Armed,
    Active,
    Paused,
    Morphing,
    Closing,
    Closed,
}

impl StrategyStatus {
    /// Whether a lifecycle transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: Self) -> bool {
        use StrategyStatus::{Active, Armed, Closed, Closing, Created, Morphing, Paused};
        matches!(
            (self, next),
            (Created, Armed)
                | (Armed, Active)
                | (Armed, Paused)
                | (Armed, Closing)
                | (Active, Active) // adjustment self-loop
                | (Active, Paused)
                | (Active, Morphing)
                | (Active, Closing)
                | (Paused, Active)
                | (Paused, Closing)
                | (Morphing, Active)
                | (Morphing, Closing)
                | (Closing, Closed)
        )
    }

    /// States in which the tick router delivers market snapshots.
    pub fn is_evaluable(self) -> bool {
        matches!(self, Self::Armed | Self::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Armed => "ARMED",
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Morphing => "MORPHING",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a multi-leg operation is for; journaled with every leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Entry,
    Exit,
    Adjustment,
    RollLeg,
    CloseLeg,
    KillSwitch,
    Morph,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
            Self::Adjustment => "ADJUSTMENT",
            Self::RollLeg => "ROLL_LEG",
            Self::CloseLeg => "CLOSE_LEG",
            Self::KillSwitch => "KILL_SWITCH",
            Self::Morph => "MORPH",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution journal row status.
///
/// COMPLETED and FAILED are terminal; once a row reaches either it is
/// never mutated again, except for the startup recovery scan promoting
/// IN_PROGRESS to REQUIRES_RECOVERY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Pending,
    InProgress,
    Completed,
    PartiallyDone,
    Failed,
    RequiresRecovery,
}

impl JournalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::PartiallyDone => "PARTIALLY_DONE",
            Self::Failed => "FAILED",
            Self::RequiresRecovery => "REQUIRES_RECOVERY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "PARTIALLY_DONE" => Some(Self::PartiallyDone),
            "FAILED" => Some(Self::Failed),
            "REQUIRES_RECOVERY" => Some(Self::RequiresRecovery),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a leg picks its strike when orders are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrikeSelection {
    /// Nearest strike to spot.
    Atm,
    /// Fixed offset in index points from spot (positive = above).
    OffsetFromSpot(Decimal),
    /// Specific strike value.
    Absolute(Decimal),
}

/// One leg of a strategy definition. Quantity is signed: positive = long,
/// negative = short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegDef {
    pub right: OptionRight,
    pub strike: StrikeSelection,
    pub quantity: i64,
    /// Live position backing this leg once entered.
    pub position_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_graph_allows_forward_transitions() {
        use StrategyStatus::*;
        assert!(Created.can_transition_to(Armed));
        assert!(Armed.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
    }

    #[test]
    fn lifecycle_graph_rejects_illegal_transitions() {
        use StrategyStatus::*;
        assert!(!Created.can_transition_to(Active));
        assert!(!Closed.can_transition_to(Armed));
        assert!(!Paused.can_transition_to(Armed));
        assert!(!Closing.can_transition_to(Active));
    }

    #[test]
    fn journal_status_round_trips_through_strings() {
        for status in [
            JournalStatus::Pending,
            JournalStatus::InProgress,
            JournalStatus::Completed,
            JournalStatus::PartiallyDone,
            JournalStatus::Failed,
            JournalStatus::RequiresRecovery,
        ] {
            assert_eq!(JournalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JournalStatus::parse("NOT_A_STATUS"), None);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JournalStatus::Completed.is_terminal());
        assert!(JournalStatus::Failed.is_terminal());
        assert!(!JournalStatus::InProgress.is_terminal());
        assert!(!JournalStatus::RequiresRecovery.is_terminal());
    }
}
