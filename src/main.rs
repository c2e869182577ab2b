use anyhow::Context;
use clap::Parser;
use kintsugi::config::{Command, DEFAULT_CONFIG_FILE};
use kintsugi::core::report;
use kintsugi::domain::model::{FailureRecord, FixRecord, FixSuggestion};
use kintsugi::domain::ports::{ConfigProvider, FixerAgent};
use kintsugi::utils::error::ErrorSeverity;
use kintsugi::utils::{logger, validation::Validate};
use kintsugi::{
    AnalysisPipeline, Cli, GeminiFixerAgent, GitHubClient, JsonFixStore, KintsugiConfig,
    KintsugiError, LocalStorage, RemediationEngine, ReviewService,
};
use std::io::Read;
use std::path::Path;

type Review = ReviewService<JsonFixStore<LocalStorage>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.json_logs);
    tracing::debug!("CLI args: {:?}", cli);

    match execute(cli).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<KintsugiError>() {
            Some(err) => {
                tracing::error!(
                    "❌ {} (Category: {:?}, Severity: {:?})",
                    err,
                    err.category(),
                    err.severity()
                );
                eprintln!("❌ {}", err.user_friendly_message());
                eprintln!("💡 建議: {}", err.recovery_suggestion());

                // 根據錯誤嚴重程度決定退出碼
                let exit_code = match err.severity() {
                    ErrorSeverity::Low => 0,
                    ErrorSeverity::Medium => 2,
                    ErrorSeverity::High => 1,
                    ErrorSeverity::Critical => 3,
                };
                if exit_code > 0 {
                    std::process::exit(exit_code);
                }
                Ok(())
            }
            None => Err(e),
        },
    }
}

fn load_config(path: &Path) -> kintsugi::Result<KintsugiConfig> {
    // 只有預設路徑允許檔案不存在
    let config = if path == Path::new(DEFAULT_CONFIG_FILE) {
        KintsugiConfig::from_file_or_default(path)?
    } else {
        KintsugiConfig::from_file(path)?
    };
    config.validate()?;
    Ok(config)
}

fn review_service(config: &KintsugiConfig) -> Review {
    let storage = LocalStorage::new(config.data_dir().to_string());
    ReviewService::new(JsonFixStore::new(storage), config.auto_approve_low_risk())
}

fn fixer_agent(config: &KintsugiConfig) -> kintsugi::Result<GeminiFixerAgent> {
    let agent =
        GeminiFixerAgent::from_settings(config.gemini_settings(), config.analysis.max_log_lines)?;
    if !agent.ai_enabled() {
        tracing::info!("🔑 No Gemini API key configured, using rule-based analysis only");
    }
    Ok(agent)
}

fn reviewer_name(explicit: Option<String>, config: &KintsugiConfig) -> String {
    explicit
        .or_else(|| config.review.default_reviewer.clone())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "cli".to_string())
}

fn print_fix_line(fix: &FixRecord) {
    println!(
        "{}  {:<12} {}/{}  risk={}  {}@{}",
        fix.id,
        fix.status.to_string(),
        fix.suggestion.error_type,
        fix.suggestion.project_type,
        fix.suggestion.risk_level,
        fix.repository,
        fix.base_branch
    );
}

fn print_suggestion(suggestion: &FixSuggestion) {
    println!("🔍 {} ({})", suggestion.error_type, suggestion.project_type);
    println!("   Root cause: {}", suggestion.root_cause);
    println!(
        "   Severity: {}  Risk: {}  Confidence: {:.2}  Source: {}",
        suggestion.severity, suggestion.risk_level, suggestion.confidence, suggestion.source
    );
    for (i, step) in suggestion.suggested_steps.iter().enumerate() {
        println!("   {}. {}", i + 1, step);
    }
    if !suggestion.affected_files.is_empty() {
        println!("   Files: {}", suggestion.affected_files.join(", "));
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    tracing::info!("Starting {}", config.service.name);

    match cli.command {
        Command::Analyze {
            log,
            repository,
            json,
        } => {
            let content = match log {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read log file {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read log from stdin")?;
                    buf
                }
            };

            let mut failure = FailureRecord::from_log("adhoc", content);
            failure.repository = repository;
            let suggestion = fixer_agent(&config)?.analyze_failure(&failure).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&suggestion)?);
            } else {
                print_suggestion(&suggestion);
            }
        }
        Command::Run => {
            let pipeline = AnalysisPipeline::new(
                LocalStorage::new(config.data_dir().to_string()),
                config.clone(),
                Box::new(fixer_agent(&config)?),
                review_service(&config),
            );
            let engine = RemediationEngine::new(pipeline);
            let (run_report, records) = engine.run().await?;

            tracing::info!("✅ Analysis run completed in {} ms", run_report.elapsed_ms);
            println!(
                "✅ {} failure(s) analyzed, {} fix(es) proposed, {} auto-approved",
                run_report.analyzed, run_report.proposed, run_report.auto_approved
            );
            for fix in &records {
                print_fix_line(fix);
            }
        }
        Command::List { status } => {
            let fixes = review_service(&config).list(status).await?;
            if fixes.is_empty() {
                println!("No fixes found");
            }
            for fix in &fixes {
                print_fix_line(fix);
            }
        }
        Command::Show { id } => {
            let fix = review_service(&config).get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&fix)?);
        }
        Command::Approve {
            id,
            reviewer,
            comment,
        } => {
            let reviewer = reviewer_name(reviewer, &config);
            let fix = review_service(&config).approve(&id, &reviewer, comment).await?;
            println!("✅ Fix {} approved by {}", fix.id, reviewer);
        }
        Command::Reject {
            id,
            reviewer,
            reason,
        } => {
            let reviewer = reviewer_name(reviewer, &config);
            let fix = review_service(&config).reject(&id, &reviewer, reason).await?;
            println!("🚫 Fix {} rejected by {}", fix.id, reviewer);
        }
        Command::Apply { id } => {
            let client = GitHubClient::new(config.github_settings()?)?;
            let fix = review_service(&config).apply(&id, &client).await?;
            println!(
                "✅ Fix {} applied: {}",
                fix.id,
                fix.pull_request_url.as_deref().unwrap_or("-")
            );
        }
        Command::Summary => {
            let review = review_service(&config);
            let fixes = review.list(None).await?;
            let pipeline = AnalysisPipeline::new(
                LocalStorage::new(config.data_dir().to_string()),
                config.clone(),
                Box::new(GeminiFixerAgent::heuristic_only()),
                review,
            );
            let mut failures = pipeline.load_all_failures().await?;
            for failure in failures.iter_mut() {
                report::reconcile_failure_status(failure, &fixes);
            }
            let summary = report::summarize(&failures, &fixes);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Export { output } => {
            let fixes = review_service(&config).list(None).await?;
            let csv = report::export_fixes_csv(&fixes)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, csv)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("📁 Exported {} fix(es) to {}", fixes.len(), path.display());
                }
                None => print!("{}", csv),
            }
        }
    }

    Ok(())
}
