use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use scribe_compose::doc::Document;
use scribe_compose::{
    Billing, ComposeConfig, ComposeEvent, Editor, EventBus, GenerateParams, InMemoryCreditStore,
    JsonlHistoryStore, NoticeLevel, SessionController, SessionStatus, TemplateCatalog,
    UsageLedgerGate, UserId,
};
use scribe_gateway::{GatewayConfig, UpstreamGenerator};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct ComposeArgs {
    /// Template id (meeting, training, inspection, bid_winning, project_progress, innovation)
    pub template: String,

    /// Form field as key=value; repeatable
    #[arg(short, long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    /// Plain-text reference material
    #[arg(short, long)]
    pub context_file: Option<PathBuf>,

    /// Reference file path recorded in history
    #[arg(long)]
    pub reference: Option<String>,

    /// Account charged for the generation
    #[arg(short, long, default_value = "local")]
    pub user: String,

    /// Starting credit balance of the account
    #[arg(long, default_value_t = 10)]
    pub credits: i64,

    /// History file (JSON lines)
    #[arg(long, default_value = ".scribe/history.jsonl")]
    pub history: PathBuf,

    /// Write the result as a Word-compatible HTML document
    #[arg(short, long)]
    pub export: Option<PathBuf>,

    /// Directory holding scribe.config.json
    #[arg(long, default_value = ".")]
    pub config_dir: PathBuf,

    #[command(flatten)]
    pub upstream: GatewayConfig,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty field name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub async fn compose(args: ComposeArgs) -> Result<()> {
    let config = ComposeConfig::load(&args.config_dir)?;

    let context_text = match &args.context_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let user = UserId::from(args.user.as_str());
    let editor = Editor::new(Document::new(), EventBus::new());
    let credits = Arc::new(InMemoryCreditStore::new().with_balance(user.clone(), args.credits));
    let ledger = Arc::new(UsageLedgerGate::new(credits.clone(), editor.events().clone()));
    let history = Arc::new(JsonlHistoryStore::new(&args.history));
    let generator = Arc::new(
        UpstreamGenerator::new(args.upstream.clone())
            .context("Failed to build upstream client")?,
    );

    let sessions = SessionController::new(
        editor.clone(),
        generator,
        ledger,
        history,
        TemplateCatalog::builtin(),
        &config,
    );

    let template = sessions
        .catalog()
        .get(&args.template)
        .ok_or_else(|| anyhow!("Unknown template: {}", args.template))?;
    println!(
        "{} {}",
        "📝 Composing".bright_blue().bold(),
        template.name.cyan()
    );

    let params = GenerateParams {
        user: user.clone(),
        template_id: args.template.clone(),
        form_fields: args.fields.iter().cloned().collect::<BTreeMap<_, _>>(),
        context_text,
        reference_file_path: args.reference.clone(),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut events = editor.events().subscribe();
    let run = sessions.generate(params, &cancel);
    tokio::pin!(run);

    let report = loop {
        tokio::select! {
            report = &mut run => break report?,
            Some(event) = events.recv() => print_event(&event),
        }
    };
    // Notices published after the last poll
    for event in events.drain() {
        print_event(&event);
    }
    println!();

    match report.session.status() {
        SessionStatus::Complete => {
            println!("{}", "✓ Generation complete".green().bold());
        }
        _ => {
            let reason = report
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown failure".to_string());
            println!("{} {}", "✗ Generation failed:".red().bold(), reason);
        }
    }

    match &report.billing {
        Billing::Charged(deduction) => {
            let balance = deduction.balance.unwrap_or_default();
            println!("   Credits left: {}", balance.to_string().cyan());
        }
        Billing::NotApplied(_) => {
            println!("   {}", "The account declined the charge".yellow())
        }
        Billing::Uncertain(e) => println!("   {} {}", "Billing uncertain:".yellow(), e),
        Billing::NotCharged => println!("   No credits charged"),
    }
    if report.persisted {
        println!("   History: {}", args.history.display());
    }

    println!();
    println!("{}", editor.text());

    if let Some(path) = &args.export {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, editor.export_word_html())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!();
        println!("{} {}", "📄 Exported".green().bold(), path.display());
    }

    if !report.is_complete() {
        bail!("Generation did not complete");
    }
    Ok(())
}

fn print_event(event: &ComposeEvent) {
    match event {
        ComposeEvent::ChunkApplied { total_chars, .. } => {
            print!("\r   Received {} chars", total_chars);
            let _ = std::io::stdout().flush();
        }
        ComposeEvent::Notice(notice) => match notice.level {
            NoticeLevel::Loading => println!("   {}", notice.message.dimmed()),
            NoticeLevel::Success => {}
            NoticeLevel::Warning => println!("\n   {} {}", "⚠️".yellow(), notice.message.yellow()),
            NoticeLevel::Error => println!("\n   {} {}", "✗".red(), notice.message.red()),
        },
        _ => {}
    }
}
