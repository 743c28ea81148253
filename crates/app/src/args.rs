use std::fmt;
use std::path::PathBuf;

use typing_core::model::AccountId;
use typing_core::time::DEFAULT_UTC_OFFSET_HOURS;

pub const DEFAULT_DB_URL: &str = "sqlite://typing.sqlite3";
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => write!(f, "{command} requires {flag}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    Lesson,
    Test,
    Rank,
    Progress,
    Leaderboard,
}

impl Command {
    pub fn from_arg(arg: &str) -> Result<Self, ArgsError> {
        match arg {
            "register" => Ok(Self::Register),
            "lesson" => Ok(Self::Lesson),
            "test" => Ok(Self::Test),
            "rank" => Ok(Self::Rank),
            "progress" => Ok(Self::Progress),
            "leaderboard" => Ok(Self::Leaderboard),
            other => Err(ArgsError::UnknownCommand(other.to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Command::Register => "register",
            Command::Lesson => "lesson",
            Command::Test => "test",
            Command::Rank => "rank",
            Command::Progress => "progress",
            Command::Leaderboard => "leaderboard",
        }
    }
}

/// Settings for one invocation, from flags with environment fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub command: Command,
    pub db_url: String,
    pub utc_offset_hours: i32,
    pub rules_path: Option<PathBuf>,
    pub rate_limit: Option<u32>,
    pub account: Option<AccountId>,
    pub payload: Option<String>,
    pub xp: Option<u64>,
    pub limit: u32,
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app register    --account <id>");
    eprintln!("  app lesson      --account <id> --payload <json>");
    eprintln!("  app test        --account <id> --payload <json>");
    eprintln!("  app rank        --xp <n> | --account <id>");
    eprintln!("  app progress    --account <id>");
    eprintln!("  app leaderboard [--limit <n>]");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>       default {DEFAULT_DB_URL}");
    eprintln!("  --utc-offset <hours>    default {DEFAULT_UTC_OFFSET_HOURS}");
    eprintln!("  --rules <path>          JSON progression rules");
    eprintln!("  --rate-limit <n>        submissions per account per minute");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TYPING_DB_URL, TYPING_UTC_OFFSET_HOURS, TYPING_RULES, TYPING_RATE_LIMIT,");
    eprintln!("  RUST_LOG");
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

impl Args {
    /// Parse the arguments following the subcommand. `env` looks up fallbacks.
    pub fn parse(
        command: Command,
        args: &mut impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            command,
            db_url: env("TYPING_DB_URL")
                .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url),
            utc_offset_hours: match env("TYPING_UTC_OFFSET_HOURS") {
                Some(raw) => parse_number("TYPING_UTC_OFFSET_HOURS", raw)?,
                None => DEFAULT_UTC_OFFSET_HOURS,
            },
            rules_path: env("TYPING_RULES").map(PathBuf::from),
            rate_limit: env("TYPING_RATE_LIMIT")
                .map(|raw| parse_number("TYPING_RATE_LIMIT", raw))
                .transpose()?,
            account: None,
            payload: None,
            xp: None,
            limit: DEFAULT_LEADERBOARD_LIMIT,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--utc-offset" => {
                    let value = require_value(args, "--utc-offset")?;
                    parsed.utc_offset_hours = parse_number("--utc-offset", value)?;
                }
                "--rules" => {
                    parsed.rules_path = Some(PathBuf::from(require_value(args, "--rules")?));
                }
                "--rate-limit" => {
                    let value = require_value(args, "--rate-limit")?;
                    parsed.rate_limit = Some(parse_number("--rate-limit", value)?);
                }
                "--account" => {
                    let value = require_value(args, "--account")?;
                    parsed.account = Some(
                        value
                            .parse()
                            .map_err(|_| ArgsError::InvalidNumber {
                                flag: "--account",
                                raw: value.clone(),
                            })?,
                    );
                }
                "--payload" => parsed.payload = Some(require_value(args, "--payload")?),
                "--xp" => {
                    let value = require_value(args, "--xp")?;
                    parsed.xp = Some(parse_number("--xp", value)?);
                }
                "--limit" => {
                    let value = require_value(args, "--limit")?;
                    parsed.limit = parse_number("--limit", value)?;
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        parsed.check_required()?;
        Ok(parsed)
    }

    fn check_required(&self) -> Result<(), ArgsError> {
        let command = self.command.name();
        let needs_account = matches!(
            self.command,
            Command::Register | Command::Lesson | Command::Test | Command::Progress
        );
        if needs_account && self.account.is_none() {
            return Err(ArgsError::MissingFlag {
                command,
                flag: "--account",
            });
        }
        if matches!(self.command, Command::Lesson | Command::Test) && self.payload.is_none() {
            return Err(ArgsError::MissingFlag {
                command,
                flag: "--payload",
            });
        }
        if self.command == Command::Rank && self.xp.is_none() && self.account.is_none() {
            return Err(ArgsError::MissingFlag {
                command,
                flag: "--xp or --account",
            });
        }
        Ok(())
    }

    /// Whether the command can run without opening the database.
    pub fn is_offline(&self) -> bool {
        self.command == Command::Rank && self.xp.is_some()
    }
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command: Command, argv: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = argv.iter().map(|s| (*s).to_string());
        Args::parse(command, &mut iter, |_| None)
    }

    #[test]
    fn lesson_needs_account_and_payload() {
        let err = parse(Command::Lesson, &["--account", "3"]).unwrap_err();
        assert!(matches!(
            err,
            ArgsError::MissingFlag {
                flag: "--payload",
                ..
            }
        ));

        let args = parse(
            Command::Lesson,
            &["--account", "3", "--payload", r#"{"subLessonId":1}"#],
        )
        .unwrap();
        assert_eq!(args.account, Some(AccountId::new(3)));
        assert_eq!(args.db_url, DEFAULT_DB_URL);
        assert_eq!(args.utc_offset_hours, DEFAULT_UTC_OFFSET_HOURS);
    }

    #[test]
    fn rank_by_xp_runs_offline() {
        let args = parse(Command::Rank, &["--xp", "2500"]).unwrap();
        assert!(args.is_offline());
        assert!(parse(Command::Rank, &[]).is_err());
    }

    #[test]
    fn progress_needs_account() {
        assert!(matches!(
            parse(Command::Progress, &[]).unwrap_err(),
            ArgsError::MissingFlag {
                command: "progress",
                flag: "--account"
            }
        ));
        let args = parse(Command::Progress, &["--account", "4"]).unwrap();
        assert_eq!(Command::from_arg("progress").unwrap(), Command::Progress);
        assert!(!args.is_offline());
    }

    #[test]
    fn env_fallbacks_are_overridden_by_flags() {
        let env = |key: &str| match key {
            "TYPING_UTC_OFFSET_HOURS" => Some("9".to_string()),
            "TYPING_RATE_LIMIT" => Some("5".to_string()),
            _ => None,
        };
        let mut iter = ["--utc-offset", "0"].iter().map(|s| (*s).to_string());
        let args = Args::parse(Command::Leaderboard, &mut iter, env).unwrap();
        assert_eq!(args.utc_offset_hours, 0);
        assert_eq!(args.rate_limit, Some(5));
        assert_eq!(args.limit, DEFAULT_LEADERBOARD_LIMIT);
    }

    #[test]
    fn rejects_bad_numbers_and_unknown_flags() {
        assert!(matches!(
            parse(Command::Leaderboard, &["--limit", "many"]).unwrap_err(),
            ArgsError::InvalidNumber { flag: "--limit", .. }
        ));
        assert!(matches!(
            parse(Command::Leaderboard, &["--verbose"]).unwrap_err(),
            ArgsError::UnknownArg(_)
        ));
        assert!(matches!(
            parse(Command::Leaderboard, &["--db"]).unwrap_err(),
            ArgsError::MissingValue { flag: "--db" }
        ));
        assert!(Command::from_arg("ui").is_err());
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/typing.db".into()),
            "sqlite:///tmp/typing.db"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:/var/data/typing.db".into()),
            "sqlite:///var/data/typing.db"
        );
    }
}
