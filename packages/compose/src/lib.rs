//! # Scribe Compose
//!
//! Composition engine: streams generated text into a document, rewrites
//! selected spans, and keeps billing and history in step with what the
//! user actually got.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────────────┐
//! │ SessionController    │     │ SelectionRewriteCoordinator  │
//! │  validate → pre-check│     │  select / blur / rewrite     │
//! │  → ingest → deduct   │     │  → apply / reject → undo     │
//! │  → persist           │     │                              │
//! └──────────┬───────────┘     └──────────────┬───────────────┘
//!            │      OperationGuard (one at a time)
//!            ▼                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Editor: Document + operation lock + EventBus<ComposeEvent>   │
//! └─────────────────────────────────────────────────────────────┘
//!            ▲                                ▲
//! ┌──────────┴───────────┐     ┌──────────────┴───────────────┐
//! │ UsageLedgerGate      │     │ GenerationService (trait)     │
//! │  CreditStore (trait) │     │  HistoryStore (trait)         │
//! └──────────────────────┘     └───────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! 1. **One operation per document**: a second generation, rewrite or undo
//!    is rejected with [`ComposeError::Busy`], never queued
//! 2. **Billing follows completion**: exactly one credit for a completed
//!    generation, none for failed, empty or cancelled ones
//! 3. **Persistence follows billing**: history is written only after the
//!    deduction call returned
//! 4. **Rewrites are atomic**: the span is replaced in one step or not at all

pub mod config;
pub mod editor;
pub mod error;
pub mod events;
pub mod generation;
pub mod history;
pub mod ingestion;
pub mod ledger;
pub mod rewrite;
pub mod sentinel;
pub mod session;
pub mod template;

pub use config::{ComposeConfig, ConfigError, DEFAULT_CONFIG_NAME};
pub use editor::{Editor, OperationGuard, OperationKind};
pub use error::{
    ComposeError, FailureReason, HistoryError, LedgerError, ServiceError, StreamError,
    ValidationError,
};
pub use events::{ComposeEvent, EventBus, Notice, NoticeLevel, Subscription};
pub use generation::{
    text_stream, GenerateRequest, GenerationService, RewriteCommand, RewriteRequest, TextStream,
};
pub use history::{HistoryRecord, HistoryStore, InMemoryHistoryStore, JsonlHistoryStore};
pub use ingestion::{IngestionOutcome, StreamingIngestionController};
pub use ledger::{
    ChargeTicket, CreditStore, Deduction, DeductionPath, InMemoryCreditStore, PreCheck,
    UsageLedgerGate, UserId,
};
pub use rewrite::{
    Affordance, Rect, RewriteOutcome, RewritePhase, SelectionBounds, SelectionRewriteCoordinator,
};
pub use sentinel::SentinelScanner;
pub use session::{
    Billing, GenerateParams, GenerationReport, GenerationSession, SessionController,
    SessionStatus,
};
pub use template::{FieldKind, FieldSpec, TemplateCatalog, TemplateSpec};

pub use scribe_editor as doc;
