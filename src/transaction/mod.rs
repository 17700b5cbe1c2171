//! Transaction submission and status tracking subsystem.
//!
//! # Data Flow
//! ```text
//! service.rs (validate, persist Pending, spawn tasks)
//!     → resilience (retry → circuit breaker → gateway submit)
//!     → poller.rs (gateway status until final, deadline, shutdown)
//!     → repository.rs (status update + history entry per transition)
//! ```
//!
//! # Invariants
//! - Transitions follow the graph in [`TransactionStatus`]; terminal
//!   records are never updated
//! - Every transition has exactly one history entry
//! - At most one task owns a transaction at a time (tasks.rs)

pub mod error;
pub mod model;
pub mod poller;
pub mod reconcile;
pub mod repository;
pub mod service;
pub mod tasks;

pub use error::TransactionError;
pub use model::{
    StatusHistoryEntry, StatusUpdate, SubmitTransactionRequest, Transaction, TransactionFilters,
    TransactionStatus,
};
pub use poller::{PollOutcome, StatusPoller};
pub use reconcile::{spawn_reconciliation_loop, LateOutcome, ReconciliationReport};
pub use repository::{InMemoryRepository, RepositoryError, TransactionRepository};
pub use service::{RecoveryReport, TransactionService};
pub use tasks::{TaskKind, TaskRegistry};
