use std::path::Path;

use serde::Serialize;
use services::{
    Clock, ErrorResponse, LessonPayload, ProgressionService, ServiceError, SpeedTestPayload,
    SubmissionQuota,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;
use typing_core::ProgressionRules;
use typing_core::rank::derive_rank_display;
use typing_core::time::offset_from_hours;

mod args;

use args::{Args, ArgsError, Command, print_usage};

fn init_tracing() {
    // A subscriber may already be installed when several runs share a process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_rules(path: Option<&Path>) -> Result<ProgressionRules, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ProgressionRules::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let rules: ProgressionRules = serde_json::from_str(&raw)?;
    tracing::info!(path = %path.display(), "loaded progression rules");
    Ok(rules)
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
) -> Result<T, ServiceError> {
    let raw = raw.unwrap_or_default();
    serde_json::from_str(raw).map_err(|e| ServiceError::InvalidInput(format!("payload: {e}")))
}

fn parse_command(argv: &mut Vec<String>) -> Result<Option<Command>, ArgsError> {
    match argv.first().map(String::as_str) {
        None | Some("--help" | "-h" | "help") => Ok(None),
        Some(first) => {
            let command = Command::from_arg(first)?;
            argv.remove(0);
            Ok(Some(command))
        }
    }
}

async fn run(
    mut argv: Vec<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(command) = parse_command(&mut argv).inspect_err(|_| print_usage())? else {
        print_usage();
        return Ok(());
    };
    if argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(command, &mut iter, env).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    if parsed.is_offline() {
        let xp = parsed.xp.unwrap_or_default();
        return print_json(&derive_rank_display(xp));
    }

    let rules = load_rules(parsed.rules_path.as_deref())?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    let service = build_service(&parsed, rules, &storage, Clock::default_clock());

    match dispatch(&service, &parsed).await {
        Ok(()) => Ok(()),
        Err(err) => {
            print_json(&ErrorResponse::from(&err))?;
            Err(err.into())
        }
    }
}

/// Each invocation is its own process, so the rate limit is checked against
/// submissions already stored rather than in-process counters.
fn build_service(
    args: &Args,
    rules: ProgressionRules,
    storage: &Storage,
    clock: Clock,
) -> ProgressionService {
    let service = ProgressionService::new(clock, storage)
        .with_rules(rules)
        .with_day_offset(offset_from_hours(args.utc_offset_hours));
    match args.rate_limit {
        Some(max) => service.with_quota(SubmissionQuota::per_minute(max)),
        None => service,
    }
}

async fn dispatch(service: &ProgressionService, args: &Args) -> Result<(), ServiceError> {
    let emit = |result: Result<(), Box<dyn std::error::Error>>| {
        result.map_err(|e| ServiceError::InternalFailure(e.to_string()))
    };

    match args.command {
        Command::Register => {
            let account = args.account.ok_or(ServiceError::Unauthorized)?;
            let summary = service.register_account(account).await?;
            emit(print_json(&summary))
        }
        Command::Lesson => {
            let payload: LessonPayload = parse_payload(args.payload.as_deref())?;
            let response = service.save_lesson(args.account, &payload).await?;
            emit(print_json(&response))
        }
        Command::Test => {
            let payload: SpeedTestPayload = parse_payload(args.payload.as_deref())?;
            let response = service.save_speed_test(args.account, &payload).await?;
            emit(print_json(&response))
        }
        Command::Rank => {
            let account = args.account.ok_or(ServiceError::Unauthorized)?;
            let summary = service.rank_summary(account).await?;
            emit(print_json(&summary))
        }
        Command::Progress => {
            let account = args.account.ok_or(ServiceError::Unauthorized)?;
            let rows = service.lesson_progress(account).await?;
            emit(print_json(&rows))
        }
        Command::Leaderboard => {
            let entries = service.leaderboard(args.limit).await?;
            emit(print_json(&entries))
        }
    }
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let argv = std::env::args().skip(1).collect();
    if let Err(err) = run(argv, |key| std::env::var(key).ok()).await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
