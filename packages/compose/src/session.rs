//! # Session Controller
//!
//! Runs one generation from form submission to persisted history.
//!
//! ## Order of effects
//!
//! ```text
//! validate form ─► operation lock ─► credit pre-check ─► Generate
//!                                                          │
//!                                                          ▼
//!                        persist ◄─ deduct ◄─ complete? ◄─ ingest
//! ```
//!
//! Nothing is billed for a failed, empty or cancelled stream, and nothing
//! is persisted unless the deduction call returned. A deduction is never
//! rolled back when persistence fails afterwards.

use crate::config::ComposeConfig;
use crate::editor::{Editor, OperationKind};
use crate::error::{ComposeError, FailureReason, LedgerError};
use crate::events::{ComposeEvent, Notice, NoticeLevel};
use crate::generation::{GenerateRequest, GenerationService};
use crate::history::{HistoryRecord, HistoryStore};
use crate::ingestion::StreamingIngestionController;
use crate::ledger::{Deduction, PreCheck, UsageLedgerGate, UserId};
use crate::template::TemplateCatalog;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Streaming,
    Complete,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Idle, SessionStatus::Streaming)
                | (SessionStatus::Idle, SessionStatus::Failed)
                | (SessionStatus::Streaming, SessionStatus::Complete)
                | (SessionStatus::Streaming, SessionStatus::Failed)
        )
    }
}

/// What the user asked to generate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateParams {
    pub user: UserId,
    pub template_id: String,
    pub form_fields: BTreeMap<String, String>,
    pub context_text: String,
    pub reference_file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSession {
    pub id: Uuid,
    pub template_id: String,
    pub form_fields: BTreeMap<String, String>,
    pub context_text: String,
    pub reference_file_path: Option<String>,
    status: SessionStatus,
}

impl GenerationSession {
    fn new(params: &GenerateParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id: params.template_id.clone(),
            form_fields: params.form_fields.clone(),
            context_text: params.context_text.clone(),
            reference_file_path: params.reference_file_path.clone(),
            status: SessionStatus::Idle,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    fn advance(&mut self, next: SessionStatus, editor: &Editor) {
        if !self.status.can_transition_to(next) {
            tracing::warn!(session_id = %self.id, from = ?self.status, to = ?next, "ignored status change");
            return;
        }
        self.status = next;
        editor.events().publish(ComposeEvent::SessionStatus {
            session_id: self.id,
            status: next,
        });
    }
}

/// How the completed generation was billed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Billing {
    NotCharged,
    Charged(Deduction),
    /// The store answered but declined the decrement; no credit was taken
    NotApplied(Deduction),
    /// The deduction call failed; the balance needs reconciliation
    Uncertain(LedgerError),
}

/// Outcome of a generation that got past the pre-flight checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub session: GenerationSession,
    /// Text received from the service
    pub text: String,
    pub failure: Option<FailureReason>,
    pub billing: Billing,
    pub persisted: bool,
}

impl GenerationReport {
    pub fn is_complete(&self) -> bool {
        self.session.status() == SessionStatus::Complete
    }
}

pub struct SessionController {
    editor: Arc<Editor>,
    service: Arc<dyn GenerationService>,
    ledger: Arc<UsageLedgerGate>,
    history: Arc<dyn HistoryStore>,
    catalog: TemplateCatalog,
    ingestion: StreamingIngestionController,
}

impl SessionController {
    pub fn new(
        editor: Arc<Editor>,
        service: Arc<dyn GenerationService>,
        ledger: Arc<UsageLedgerGate>,
        history: Arc<dyn HistoryStore>,
        catalog: TemplateCatalog,
        config: &ComposeConfig,
    ) -> Self {
        let ingestion = StreamingIngestionController::new(editor.clone(), config);
        Self {
            editor,
            service,
            ledger,
            history,
            catalog,
            ingestion,
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Generate a document body into the editor
    ///
    /// Returns `Err` for rejections that happen before the service is
    /// called; anything later is described by the report.
    pub async fn generate(
        &self,
        params: GenerateParams,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, ComposeError> {
        self.catalog.validate(&params.template_id, &params.form_fields)?;
        let guard = self.editor.begin(OperationKind::Generation)?;

        let PreCheck {
            allowed,
            balance,
            ticket,
        } = self.ledger.pre_check(&params.user).await?;
        let ticket = match ticket {
            Some(ticket) if allowed => ticket,
            _ => {
                tracing::info!(user = %params.user, balance, "generation refused, no credits");
                self.notify(Notice::new(NoticeLevel::Error, "Not enough credits"));
                return Err(ComposeError::InsufficientCredits { balance });
            }
        };

        let mut session = GenerationSession::new(&params);
        tracing::info!(
            session_id = %session.id,
            user = %params.user,
            template = %session.template_id,
            "generation started"
        );
        session.advance(SessionStatus::Streaming, &self.editor);
        self.notify(Notice::new(NoticeLevel::Loading, "Generating..."));

        let request = GenerateRequest {
            template_type: session.template_id.clone(),
            form_data: session.form_fields.clone(),
            context_text: session.context_text.clone(),
        };

        let stream = match self.service.generate(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "generation service unavailable");
                drop(guard);
                session.advance(SessionStatus::Failed, &self.editor);
                self.notify(Notice::new(NoticeLevel::Error, "Generation failed"));
                return Ok(GenerationReport {
                    session,
                    text: String::new(),
                    failure: Some(e.into()),
                    billing: Billing::NotCharged,
                    persisted: false,
                });
            }
        };

        let outcome = self.ingestion.ingest(session.id, stream, cancel).await;
        drop(guard);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                session.advance(SessionStatus::Failed, &self.editor);
                return Err(e);
            }
        };
        session.advance(outcome.status, &self.editor);

        if let Some(failure) = outcome.failure {
            tracing::info!(session_id = %session.id, reason = %failure, "generation failed, not billed");
            self.notify(Notice::new(NoticeLevel::Error, "Generation failed"));
            return Ok(GenerationReport {
                session,
                text: outcome.text,
                failure: Some(failure),
                billing: Billing::NotCharged,
                persisted: false,
            });
        }

        let (billing, persisted) = match self.ledger.deduct(ticket).await {
            Ok(deduction) => {
                let billing = if deduction.balance.is_some() {
                    Billing::Charged(deduction)
                } else {
                    tracing::warn!(
                        session_id = %session.id,
                        user = %params.user,
                        path = ?deduction.path,
                        "store declined the decrement, no credit taken"
                    );
                    self.notify(Notice::new(
                        NoticeLevel::Warning,
                        "Generated, but balance update uncertain",
                    ));
                    Billing::NotApplied(deduction)
                };
                let persisted = self.persist(&params, &session, &outcome.text).await;
                (billing, persisted)
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session.id,
                    user = %params.user,
                    error = %e,
                    "deduction failed after completed generation, needs reconciliation"
                );
                self.notify(Notice::new(
                    NoticeLevel::Warning,
                    "Generated, but balance update uncertain",
                ));
                (Billing::Uncertain(e), false)
            }
        };

        if persisted {
            self.notify(Notice::new(NoticeLevel::Success, "Generation complete"));
        }

        Ok(GenerationReport {
            session,
            text: outcome.text,
            failure: None,
            billing,
            persisted,
        })
    }

    async fn persist(&self, params: &GenerateParams, session: &GenerationSession, text: &str) -> bool {
        let record = HistoryRecord {
            id: Uuid::new_v4(),
            user: params.user.clone(),
            template_type: session.template_id.clone(),
            form_data: session.form_fields.clone(),
            reference_file_path: session.reference_file_path.clone(),
            generated_content: text.to_string(),
            created_at: Utc::now(),
        };

        match self.history.append(record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "history not saved, charge kept");
                self.notify(Notice::new(
                    NoticeLevel::Warning,
                    "Generated, but saving to history failed",
                ));
                false
            }
        }
    }

    fn notify(&self, notice: Notice) {
        self.editor.events().publish(ComposeEvent::Notice(notice));
    }
}
