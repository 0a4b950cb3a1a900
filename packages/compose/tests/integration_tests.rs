//! Integration tests for the composition engine

mod common;

use async_trait::async_trait;
use common::{meeting_params, Harness, ScriptedService, USER};
use scribe_compose::doc::Selection;
use scribe_compose::{
    Billing, ComposeError, ComposeEvent, DeductionPath, HistoryError, HistoryRecord,
    HistoryStore, JsonlHistoryStore, LedgerError, NoticeLevel, OperationKind, Rect,
    RewriteCommand, RewriteOutcome, SelectionBounds, ServiceError, SessionStatus, StreamError,
    UserId, ValidationError,
};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn bounds() -> SelectionBounds {
    SelectionBounds {
        start: Rect {
            left: 10.0,
            top: 100.0,
            right: 20.0,
            bottom: 120.0,
        },
        end: Rect {
            left: 80.0,
            top: 100.0,
            right: 90.0,
            bottom: 120.0,
        },
    }
}

struct BrokenHistory;

#[async_trait]
impl HistoryStore for BrokenHistory {
    async fn append(&self, _record: HistoryRecord) -> Result<(), HistoryError> {
        Err(HistoryError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only disk",
        )))
    }

    async fn list(
        &self,
        _user: &UserId,
        _page: usize,
        _limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _user: &UserId, _id: Uuid) -> Result<bool, HistoryError> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_successful_generation_charges_once_and_persists() {
    let harness = Harness::new("", ScriptedService::generating(&["会议", "顺利召开。"]), 3);
    let mut events = harness.editor.events().subscribe();

    let report = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.text, "会议顺利召开。");
    assert_eq!(harness.editor.text(), "会议顺利召开。");
    assert!(harness.editor.is_editable());

    assert_eq!(harness.balance(), Some(2));
    assert_eq!(harness.credits.decrement_calls(), 1);
    assert!(matches!(
        report.billing,
        Billing::Charged(deduction) if deduction.path == DeductionPath::Atomic
    ));

    assert!(report.persisted);
    let records = harness.history.list(&USER.into(), 0, 20).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].template_type, "meeting");
    assert_eq!(records[0].generated_content, "会议顺利召开。");
    assert_eq!(
        records[0].reference_file_path.as_deref(),
        Some("uploads/agenda.docx")
    );

    let statuses: Vec<SessionStatus> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            ComposeEvent::SessionStatus { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![SessionStatus::Streaming, SessionStatus::Complete]);
}

#[tokio::test]
async fn test_sentinel_stream_fails_without_charge() {
    let harness = Harness::new(
        "",
        ScriptedService::generating(&["正文", "内容", "[API Error: timeout]"]),
        3,
    );

    let report = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.session.status(), SessionStatus::Failed);
    assert_eq!(
        report.failure,
        Some(StreamError::Sentinel("[API Error".to_string()).into())
    );
    assert_eq!(report.billing, Billing::NotCharged);
    assert_eq!(harness.balance(), Some(3));
    assert_eq!(harness.credits.decrement_calls(), 0);
    assert_eq!(harness.editor.text(), "正文内容[API Error: timeout]");
    assert_eq!(harness.history_len(), 0);
    assert!(harness.editor.is_editable());
}

#[tokio::test]
async fn test_empty_stream_is_not_billed() {
    let harness = Harness::new("", ScriptedService::generating(&["  ", "\n"]), 1);

    let report = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failure, Some(StreamError::Empty.into()));
    assert_eq!(harness.balance(), Some(1));
}

#[tokio::test]
async fn test_service_refusal_is_not_billed() {
    let service = ScriptedService::default();
    *service.refuse.lock().unwrap() = Some(ServiceError::Status {
        status: 502,
        body: "bad gateway".to_string(),
    });
    let harness = Harness::new("draft", service, 2);

    let report = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.session.status(), SessionStatus::Failed);
    assert_eq!(harness.balance(), Some(2));
    assert!(harness.editor.is_editable());
}

#[tokio::test]
async fn test_no_credits_means_no_service_call() {
    let harness = Harness::new("", ScriptedService::generating(&["text"]), 0);

    let result = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ComposeError::InsufficientCredits { balance: 0 })
    ));
    assert_eq!(harness.service.generate_calls(), 0);
    assert!(harness.editor.is_editable());
}

#[tokio::test]
async fn test_missing_required_field_rejected_before_anything() {
    let harness = Harness::new("", ScriptedService::generating(&["text"]), 5);
    let mut params = meeting_params();
    params.form_fields.remove("title");

    let result = harness
        .sessions
        .generate(params, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ComposeError::Validation(ValidationError::MissingField { .. }))
    ));
    assert_eq!(harness.credits.balance_calls(), 0);
    assert_eq!(harness.service.generate_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_generation_is_not_billed() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        "",
        ScriptedService::generating(&["部分内容"]).gated(gate.clone()),
        2,
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harness
        .sessions
        .generate(meeting_params(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.failure, Some(StreamError::Cancelled.into()));
    assert_eq!(report.billing, Billing::NotCharged);
    assert_eq!(harness.balance(), Some(2));
    assert!(harness.editor.is_editable());
}

#[tokio::test]
async fn test_fallback_deduction_when_atomic_unsupported() {
    let harness = Harness::new("", ScriptedService::generating(&["稿件"]), 4);
    harness.credits.set_atomic(false);

    let report = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    match report.billing {
        Billing::Charged(deduction) => {
            assert_eq!(deduction.path, DeductionPath::Fallback);
            assert_eq!(deduction.balance, Some(3));
        }
        other => panic!("expected a charge, got {other:?}"),
    }
    assert_eq!(harness.balance(), Some(3));
    assert!(report.persisted);
}

#[tokio::test]
async fn test_ledger_failure_is_degraded_success() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        "",
        ScriptedService::generating(&["稿件"]).gated(gate.clone()),
        4,
    );
    let mut events = harness.editor.events().subscribe();

    // Pre-check succeeds, then the store goes away before the deduction
    let credits = harness.credits.clone();
    let params = meeting_params();
    let cancel = CancellationToken::new();
    let generation = harness.sessions.generate(params, &cancel);
    let watcher = async {
        loop {
            match events.recv().await {
                Some(ComposeEvent::SessionStatus {
                    status: SessionStatus::Streaming,
                    ..
                }) => {
                    credits.set_failing(true);
                    gate.notify_one();
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
    };
    let (report, _) = tokio::join!(generation, watcher);
    let report = report.unwrap();

    assert!(report.is_complete());
    assert!(matches!(
        report.billing,
        Billing::Uncertain(LedgerError::Store(_))
    ));
    assert!(!report.persisted);
    assert_eq!(harness.history_len(), 0);
    assert_eq!(harness.editor.text(), "稿件");

    let warned = events.drain().into_iter().any(|event| {
        matches!(event, ComposeEvent::Notice(notice) if notice.level == NoticeLevel::Warning)
    });
    assert!(warned);
}

#[tokio::test]
async fn test_declined_decrement_is_not_a_charge() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        "",
        ScriptedService::generating(&["稿件"]).gated(gate.clone()),
        1,
    );
    let mut events = harness.editor.events().subscribe();

    // Another session drains the account while this one streams
    let credits = harness.credits.clone();
    let cancel = CancellationToken::new();
    let generation = harness
        .sessions
        .generate(meeting_params(), &cancel);
    let watcher = async {
        while let Some(event) = events.recv().await {
            if let ComposeEvent::SessionStatus {
                status: SessionStatus::Streaming,
                ..
            } = event
            {
                credits.set_balance(USER, 0);
                gate.notify_one();
                break;
            }
        }
    };
    let (report, _) = tokio::join!(generation, watcher);
    let report = report.unwrap();

    assert!(report.is_complete());
    match report.billing {
        Billing::NotApplied(deduction) => {
            assert_eq!(deduction.balance, None);
            assert_eq!(deduction.path, DeductionPath::Atomic);
        }
        other => panic!("expected a declined decrement, got {other:?}"),
    }
    assert_eq!(harness.balance(), Some(0));
    assert!(report.persisted);
}

#[tokio::test]
async fn test_persistence_failure_keeps_charge() {
    let harness = Harness::with_history(
        "",
        ScriptedService::generating(&["稿件"]),
        2,
        Arc::new(BrokenHistory),
    );

    let report = harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert!(matches!(report.billing, Billing::Charged(_)));
    assert!(!report.persisted);
    assert_eq!(harness.balance(), Some(1));
}

#[tokio::test]
async fn test_jsonl_history_written_after_generation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonlHistoryStore::new(dir.path().join("history.jsonl")));
    let harness = Harness::with_history(
        "",
        ScriptedService::generating(&["<p>喜报</p>"]),
        1,
        store.clone(),
    );

    harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();

    let records = store.list(&USER.into(), 0, 20).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].generated_content, "<p>喜报</p>");
    assert_eq!(harness.editor.text(), "喜报");
}

#[tokio::test]
async fn test_rewrite_rejected_while_generating() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        "已有内容",
        ScriptedService::generating(&["新内容"]).gated(gate.clone()),
        2,
    );
    harness.rewrites.select(Selection::between(0, 2), bounds());

    let cancel = CancellationToken::new();
    let generation = harness
        .sessions
        .generate(meeting_params(), &cancel);
    let contender = async {
        let rewrite = harness.rewrites.rewrite(RewriteCommand::Expand).await;
        let second = harness
            .sessions
            .generate(meeting_params(), &CancellationToken::new())
            .await;
        gate.notify_one();
        (rewrite, second)
    };
    let (report, (rewrite, second)) = tokio::join!(generation, contender);

    assert!(matches!(
        rewrite,
        Err(ComposeError::Busy {
            active: OperationKind::Generation
        })
    ));
    assert!(matches!(second, Err(ComposeError::Busy { .. })));
    assert_eq!(harness.service.rewrite_calls(), 0);
    assert_eq!(harness.service.generate_calls(), 1);

    assert!(report.unwrap().is_complete());
    assert_eq!(harness.balance(), Some(1));
}

#[tokio::test]
async fn test_second_rewrite_rejected_while_rewriting() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        "one two three",
        ScriptedService::rewriting(&["2"]).gated(gate.clone()),
        0,
    );
    harness.rewrites.select(Selection::between(4, 7), bounds());

    let first = harness.rewrites.rewrite(RewriteCommand::Condense);
    let second = async {
        let result = harness.rewrites.rewrite(RewriteCommand::Expand).await;
        gate.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(
        second,
        Err(ComposeError::Busy {
            active: OperationKind::Rewrite
        })
    ));
    assert!(matches!(first.unwrap(), RewriteOutcome::Applied { .. }));
    assert_eq!(harness.service.rewrite_calls(), 1);
    assert_eq!(harness.editor.text(), "one 2 three");
}

#[tokio::test]
async fn test_empty_rewrite_leaves_span_untouched() {
    let harness = Harness::new("keep this span", ScriptedService::rewriting(&["   ", "\n"]), 0);
    harness.rewrites.select(Selection::between(5, 9), bounds());
    let before = harness.editor.read(|doc| doc.snapshot());

    let outcome = harness
        .rewrites
        .rewrite(RewriteCommand::Paraphrase)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RewriteOutcome::Rejected {
            reason: StreamError::Empty.into()
        }
    );
    assert_eq!(harness.editor.read(|doc| doc.snapshot()), before);
    assert!(harness.editor.is_editable());
}

#[tokio::test]
async fn test_rewrite_then_undo_restores_exactly() {
    let harness = Harness::new(
        "第一句。第二句很长很长。第三句。",
        ScriptedService::rewriting(&["第二句", "短了。"]),
        0,
    );
    let selection = Selection::between(4, 12);
    harness.rewrites.select(selection, bounds());
    let before = harness.editor.read(|doc| doc.snapshot());

    let outcome = harness
        .rewrites
        .rewrite(RewriteCommand::Condense)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RewriteOutcome::Applied {
            selection: Selection::collapsed(10),
            text: "第二句短了。".to_string()
        }
    );
    assert_eq!(harness.editor.text(), "第一句。第二句短了。第三句。");

    assert!(harness.rewrites.undo().unwrap());
    assert_eq!(harness.editor.read(|doc| doc.snapshot()), before);
    assert_eq!(harness.rewrites.selection(), selection);
}

#[tokio::test]
async fn test_generation_after_rewrite_invalidates_undo() {
    let harness = Harness::new(
        "one two three",
        ScriptedService {
            generate_chunks: std::sync::Mutex::new(vec![Ok("<p>全新正文</p>".to_string())]),
            rewrite_chunks: std::sync::Mutex::new(vec![Ok("2".to_string())]),
            ..ScriptedService::default()
        },
        1,
    );

    harness.rewrites.select(Selection::between(4, 7), bounds());
    harness
        .rewrites
        .rewrite(RewriteCommand::Condense)
        .await
        .unwrap();
    assert_eq!(harness.editor.text(), "one 2 three");
    assert!(harness.rewrites.can_undo());

    harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(harness.editor.text(), "全新正文");
    assert!(!harness.rewrites.can_undo());

    assert!(!harness.rewrites.undo().unwrap());
    assert_eq!(harness.editor.text(), "全新正文");
    assert!(!harness.rewrites.can_undo());
}

#[tokio::test]
async fn test_generation_then_rewrite_then_export() {
    let harness = Harness::new(
        "",
        ScriptedService {
            generate_chunks: std::sync::Mutex::new(vec![
                Ok("<h2>年度总结</h2>".to_string()),
                Ok("<p>我们<strong>完成</strong>了目标。</p>".to_string()),
            ]),
            rewrite_chunks: std::sync::Mutex::new(vec![Ok("超额完成".to_string())]),
            ..ScriptedService::default()
        },
        1,
    );

    harness
        .sessions
        .generate(meeting_params(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(harness.editor.text(), "年度总结\n我们完成了目标。");

    // "完成"
    harness.rewrites.select(Selection::between(7, 9), bounds());
    harness
        .rewrites
        .rewrite(RewriteCommand::Expand)
        .await
        .unwrap();

    let html = harness.editor.export_word_html();
    assert!(html.contains("<h2>年度总结</h2>"));
    // Inserted text takes the marks of the character before it
    assert!(html.contains("<p>我们超额完成了目标。</p>"));
}
