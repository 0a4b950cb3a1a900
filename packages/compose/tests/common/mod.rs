//! Shared fixtures for compose integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scribe_compose::doc::Document;
use scribe_compose::{
    ComposeConfig, Editor, EventBus, GenerateParams, GenerateRequest, GenerationService,
    HistoryStore, InMemoryCreditStore, InMemoryHistoryStore, RewriteRequest,
    SelectionRewriteCoordinator, ServiceError, SessionController, TemplateCatalog, TextStream,
    UsageLedgerGate,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const USER: &str = "user-1";

/// Generation service that replays scripted chunks
#[derive(Default)]
pub struct ScriptedService {
    pub generate_chunks: Mutex<Vec<Result<String, ServiceError>>>,
    pub rewrite_chunks: Mutex<Vec<Result<String, ServiceError>>>,
    pub refuse: Mutex<Option<ServiceError>>,
    /// When set, streams wait for this before yielding anything
    pub gate: Option<Arc<Notify>>,
    pub generate_calls: AtomicUsize,
    pub rewrite_calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedService {
    pub fn generating(chunks: &[&str]) -> Self {
        Self {
            generate_chunks: Mutex::new(chunks.iter().map(|c| Ok(c.to_string())).collect()),
            ..Self::default()
        }
    }

    pub fn rewriting(chunks: &[&str]) -> Self {
        Self {
            rewrite_chunks: Mutex::new(chunks.iter().map(|c| Ok(c.to_string())).collect()),
            ..Self::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn rewrite_calls(&self) -> usize {
        self.rewrite_calls.load(Ordering::SeqCst)
    }

    fn stream(&self, items: Vec<Result<String, ServiceError>>) -> TextStream {
        match self.gate.clone() {
            Some(gate) => Box::pin(
                stream::once(async move { gate.notified().await })
                    .flat_map(move |_| stream::iter(items.clone())),
            ),
            None => Box::pin(stream::iter(items)),
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(&self, request: GenerateRequest) -> Result<TextStream, ServiceError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if let Some(e) = self.refuse.lock().unwrap().clone() {
            return Err(e);
        }
        let items = self.generate_chunks.lock().unwrap().clone();
        Ok(self.stream(items))
    }

    async fn rewrite(&self, _request: RewriteRequest) -> Result<TextStream, ServiceError> {
        self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.rewrite_chunks.lock().unwrap().clone();
        Ok(self.stream(items))
    }
}

/// Everything a test needs to drive one editing session
pub struct Harness {
    pub editor: Arc<Editor>,
    pub service: Arc<ScriptedService>,
    pub credits: Arc<InMemoryCreditStore>,
    pub history: Arc<dyn HistoryStore>,
    pub memory_history: Option<Arc<InMemoryHistoryStore>>,
    pub sessions: SessionController,
    pub rewrites: SelectionRewriteCoordinator,
}

impl Harness {
    pub fn new(text: &str, service: ScriptedService, balance: i64) -> Self {
        let history = Arc::new(InMemoryHistoryStore::new());
        let mut harness = Self::with_history(text, service, balance, history.clone());
        harness.memory_history = Some(history);
        harness
    }

    pub fn with_history(
        text: &str,
        service: ScriptedService,
        balance: i64,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let config = ComposeConfig::default();
        let editor = Editor::new(Document::from_text(text), EventBus::new());
        let service = Arc::new(service);
        let credits = Arc::new(InMemoryCreditStore::new().with_balance(USER, balance));
        let ledger = Arc::new(UsageLedgerGate::new(credits.clone(), editor.events().clone()));

        let sessions = SessionController::new(
            editor.clone(),
            service.clone(),
            ledger,
            history.clone(),
            TemplateCatalog::builtin(),
            &config,
        );
        let rewrites = SelectionRewriteCoordinator::new(editor.clone(), service.clone(), &config);

        Self {
            editor,
            service,
            credits,
            history,
            memory_history: None,
            sessions,
            rewrites,
        }
    }

    pub fn balance(&self) -> Option<i64> {
        self.credits.current(&USER.into())
    }

    pub fn history_len(&self) -> usize {
        self.memory_history.as_ref().map(|h| h.len()).unwrap_or(0)
    }
}

pub fn meeting_params() -> GenerateParams {
    GenerateParams {
        user: USER.into(),
        template_id: "meeting".to_string(),
        form_fields: BTreeMap::from([
            ("title".to_string(), "季度工作会议".to_string()),
            ("location".to_string(), "一号会议室".to_string()),
        ]),
        context_text: String::new(),
        reference_file_path: Some("uploads/agenda.docx".to_string()),
    }
}
