//! `pshield` - CLI for promptshield
//!
//! This binary scans and redacts text with the same engine the content guard
//! uses, manages the persisted result cache, and replays the submit
//! interception flow against a simulated chat page.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use promptshield::cli::{
    CacheCommand, Cli, Command, ConfigCommand, PlatformsCommand, RedactCommand, ScanCommand,
    SimulateCommand,
};
use promptshield::clock::SystemClock;
use promptshield::detection::{Detector, Redactor};
use promptshield::dom::{Page, Platform, VirtualPage};
use promptshield::guard::ContentGuard;
use promptshield::intercept::SubmitOutcome;
use promptshield::storage::{KeyValueStore, MemoryStore, SqliteStore};
use promptshield::{init_logging, Config};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Exit status of `scan` when sensitive data is found.
const EXIT_SENSITIVE: u8 = 1;

#[tokio::main]
async fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Scan(cmd) => handle_scan(&config, cmd).await,
        Command::Redact(cmd) => handle_redact(&config, cmd).await.map(|()| ExitCode::SUCCESS),
        Command::Cache(cmd) => handle_cache(&config, cmd).await.map(|()| ExitCode::SUCCESS),
        Command::Platforms(cmd) => handle_platforms(&cmd).map(|()| ExitCode::SUCCESS),
        Command::Simulate(cmd) => handle_simulate(&config, cmd).await.map(|()| ExitCode::SUCCESS),
        Command::Config(cmd) => handle_config(&config, cmd).map(|()| ExitCode::SUCCESS),
    }
}

fn read_text(text: Option<String>, file: Option<&Path>) -> CliResult<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn open_store(config: &Config) -> CliResult<Arc<dyn KeyValueStore>> {
    if config.cache.persist {
        Ok(Arc::new(SqliteStore::open(config.database_path())?))
    } else {
        Ok(Arc::new(MemoryStore::new()))
    }
}

async fn detector(config: &Config) -> CliResult<Detector> {
    Ok(Detector::from_config(config, open_store(config)?).await?)
}

async fn handle_scan(config: &Config, cmd: ScanCommand) -> CliResult<ExitCode> {
    let text = read_text(cmd.text, cmd.file.as_deref())?;
    let detector = detector(config).await?;
    let result = if cmd.no_cache {
        detector.detect_uncached(&text)
    } else {
        detector.detect(&text).await
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.is_clean() {
        println!("No sensitive data found.");
    } else {
        println!("{} found:", result.describe());
        for finding in result.findings() {
            println!(
                "  {:<24} {:<14} {} match(es)",
                finding.description,
                finding.pattern_id.to_string(),
                finding.raw_matches.len()
            );
        }
    }

    Ok(if result.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_SENSITIVE)
    })
}

async fn handle_redact(config: &Config, cmd: RedactCommand) -> CliResult<()> {
    let text = read_text(cmd.text, cmd.file.as_deref())?;
    let detector = detector(config).await?;
    let redactor = Redactor::new(
        cmd.token
            .unwrap_or_else(|| config.intercept.redaction_token.clone()),
    );

    let result = detector.detect(&text).await;
    let redaction = redactor.redact(&text, &result)?;

    if cmd.json {
        let output = serde_json::json!({
            "text": redaction.text,
            "replaced": redaction.replaced,
            "categories": result.pattern_ids().map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", redaction.text);
        if !redaction.text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

async fn handle_cache(config: &Config, cmd: CacheCommand) -> CliResult<()> {
    let detector = detector(config).await?;
    match cmd {
        CacheCommand::Stats { json } => {
            let cache = detector.cache().stats().await;
            let store = if config.cache.persist {
                Some(SqliteStore::open(config.database_path())?.stats()?)
            } else {
                None
            };
            if json {
                let output = serde_json::json!({
                    "cache": cache,
                    "store": store,
                    "database_path": config.database_path(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Result Cache");
                println!("============");
                println!("  Entries:       {} / {}", cache.entries, cache.capacity);
                println!("  Storage key:   {}", config.cache.storage_key);
                println!("  Persisted:     {}", config.cache.persist);
                if let Some(store) = store {
                    println!();
                    println!("[Store]");
                    println!("  Database:      {}", config.database_path().display());
                    println!("  Keys:          {}", store.entries);
                    println!("  Size:          {} bytes", store.db_size_bytes);
                    if let Some(updated) = store.last_updated {
                        println!("  Last write:    {}", updated.to_rfc3339());
                    }
                }
            }
        }
        CacheCommand::Clear => {
            let entries = detector.cache().len().await;
            detector.cache().clear().await?;
            println!("Cleared {entries} cached result(s).");
        }
    }
    Ok(())
}

fn handle_platforms(cmd: &PlatformsCommand) -> CliResult<()> {
    if cmd.json {
        let platforms: Vec<_> = Platform::ALL.iter().map(|p| p.config()).collect();
        println!("{}", serde_json::to_string_pretty(&platforms)?);
        return Ok(());
    }
    for platform in Platform::ALL {
        let config = platform.config();
        println!("{platform}");
        println!("  Hosts:   {}", config.hostnames.join(", "));
        println!("  Input:   {}", config.input_selector);
        println!("  Submit:  {} on {}", config.submit_event, config.submit_selector);
        println!("  Text:    {:?}", config.text_extraction);
    }
    Ok(())
}

async fn handle_simulate(config: &Config, cmd: SimulateCommand) -> CliResult<()> {
    let Some(platform) = Platform::from_hostname(&cmd.site) else {
        return Err(format!("{} is not a supported chat site", cmd.site).into());
    };
    let detector = Arc::new(detector(config).await?);
    let page = Arc::new(VirtualPage::new(&cmd.site));
    let chat = page.render_chat(platform, &cmd.text)?;

    let guard = ContentGuard::attach(page.clone(), detector, config, Arc::new(SystemClock))
        .ok_or("guard did not start")?;
    guard.attached().await.ok_or("guard stopped before attaching")?;
    let mut outcomes = guard.controller().subscribe_outcomes();

    let submit = {
        let page = Arc::clone(&page);
        tokio::spawn(async move { page.dispatch(chat.submit, "click").await })
    };

    // A clean message never shows the prompt.
    let shown = tokio::select! {
        prompt = page.wait_for_prompt() => Some(prompt),
        () = async {
            while !submit.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        } => None,
    };
    if let Some((id, view)) = shown {
        println!("{}: {}", view.title, view.message);
        println!("Answering: {:?}", cmd.decision);
        page.respond(id, cmd.decision.into());
    }
    submit.await??;

    let mut outcome = SubmitOutcome::Passed;
    while let Ok(next) = outcomes.try_recv() {
        outcome = next;
    }
    let text = platform
        .config()
        .text_extraction
        .extract(page.as_ref(), chat.input)?;
    println!("Outcome: {outcome}");
    println!("Sent:    {}", page.activation_count(chat.submit, "click") > 0);
    println!("Input:   {text}");

    guard.shutdown();
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> CliResult<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Detection]");
                println!("  Sanitize mode:      {:?}", config.detection.sanitize_mode);
                println!("  Phone rule:         {:?}", config.detection.phone);
                println!(
                    "  Disabled patterns:  {}",
                    config.detection.disabled_patterns.len()
                );
                println!(
                    "  Custom patterns:    {}",
                    config.detection.custom_patterns.len()
                );
                println!();
                println!("[Cache]");
                println!("  Capacity:           {}", config.cache.capacity);
                println!("  Storage key:        {}", config.cache.storage_key);
                println!("  Persist:            {}", config.cache.persist);
                println!();
                println!("[Intercept]");
                println!("  Redaction token:    {}", config.intercept.redaction_token);
                println!("  Approval TTL (ms):  {}", config.intercept.approval_ttl_ms);
                println!("  Debounce (ms):      {}", config.intercept.debounce_ms);
                println!();
                println!("[DOM]");
                println!("  Retry delay (ms):   {}", config.dom.retry_delay_ms);
                println!("  Timeout (ms):       {}", config.dom.element_timeout_ms);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
