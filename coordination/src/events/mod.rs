//! Engine events and status-change notification
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the five events the engine emits, from
//!    proposal creation to status changes.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with
//!    proposal/project/type filters.
//!
//! 3. **Notifiers** (`notify.rs`): injected receivers of status changes
//!    (log, webhook). Best-effort; failures never roll back a transition.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ DebateEngine │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────┬───────┘     └──────────────┘     └──────────────┘
//!        │ status changes
//!        ▼
//! ┌──────────────┐
//! │  Notifiers   │
//! │ (log, HTTP)  │
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pm_coordination::events::{EventBus, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut escalations = bus.subscribe_filtered(
//!     EventFilter::new().project("apollo").types(vec!["status_changed"]),
//! );
//! let event = escalations.recv().await?;
//! ```

pub mod bus;
pub mod notify;
pub mod types;

pub use bus::{EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver, SharedEventBus};
pub use notify::{LogNotifier, NotifyError, SharedNotifier, StatusNotifier, WebhookNotifier};
pub use types::{ProposalEvent, StatusChange};
