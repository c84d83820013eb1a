//! Proposals — records, lifecycle, and the stores that hold them.

pub mod snapshot;
pub mod store;
pub mod types;

pub use snapshot::{JsonFileStore, StoreSnapshot};
pub use store::{
    MemoryProposalStore, ProposalStore, SharedProposalStore, StoreError, StoreResult,
};
pub use types::{
    AgentId, NewProposal, ProjectId, Proposal, ProposalId, ProposalStatus, ProposalType,
    StatusTransition, TransitionError,
};
