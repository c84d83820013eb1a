//! Proposal Debate — rounds, consensus, and escalation
//!
//! Agents submit one opinion per round. A round closes when the pinned
//! roster has fully responded or a timeout forces it; the closed round is
//! evaluated and the escalation policy decides what happens next.
//!
//! # Lifecycle
//!
//! ```text
//! open ──first opinion──▶ debating ──round closes──▶ [converged?]
//!                            ▲                            │
//!                            │                            ├─ Yes, round 1 + instant flag → approved
//!                            │                            ├─ Yes → consensus ─┬─ review / timeout → approved
//!                            │                            │                   └─ explicit reject  → rejected
//!                            └──── rounds left ───────────┤
//!                                                         └─ No, max rounds / no PM quorum → escalated
//!                                                                                 │
//!                                                              explicit decision ─┴─▶ approved | rejected
//! ```

pub mod consensus;
pub mod engine;
pub mod escalation;
pub mod position;
pub mod resolution;
pub mod round;
pub mod watcher;

pub use consensus::{ClosedRound, ConsensusEvaluator, RoundEvaluation, RoundVerdict};
pub use engine::{DebateEngine, ForcedClosure, SharedDebateEngine, SweepReport};
pub use escalation::{EscalationDecision, EscalationPolicy, EscalationReason};
pub use position::{Position, PositionTally};
pub use resolution::{Decider, Decision, Resolution};
pub use round::{group_rounds, DebateRound, OpinionSubmission, Participant, Roster, RoundView};
pub use watcher::RoundWatcher;
