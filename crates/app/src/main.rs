use std::fmt;
use std::path::PathBuf;

use exam_core::model::{AnswerPayload, Question, SessionConfig, SessionMode, SessionResult};
use exam_core::QuestionSet;
use services::{
    AnswerOutcome, ChannelListener, Clock, ExamServices, Navigation, SessionEvent, SessionHandle,
    SubmitRequest,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingQuestions,
    UnknownArg(String),
    InvalidMode { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingQuestions => write!(f, "--questions is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_mode(raw: String) -> Result<SessionMode, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidMode { raw })
}

fn parse_number(raw: String, flag: &'static str) -> Result<u32, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- run     --questions <file.json> [--mode lesson|final-test]");
    eprintln!("                              [--time-limit <secs>] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--mode <mode>] [--limit <n>]");
    eprintln!();
    eprintln!("Without --db, results are kept in memory for the run only.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_QUESTIONS, EXAM_MODE, EXAM_TIME_LIMIT, EXAM_DB_URL, RUST_LOG");
}

fn print_commands() {
    println!("commands:");
    println!("  a <answer>            answer the current question");
    println!("  s <sub> <answer>      answer one sub-question of a group");
    println!("  n | p | g <number>    next, previous, jump to question");
    println!("  pause | resume");
    println!("  submit | submit!      submit (submit! skips confirmation)");
    println!("  status | help | exit");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

struct Args {
    questions: Option<PathBuf>,
    mode: Option<SessionMode>,
    time_limit: Option<u32>,
    db_url: Option<String>,
    limit: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            questions: std::env::var("EXAM_QUESTIONS").ok().map(PathBuf::from),
            mode: std::env::var("EXAM_MODE")
                .ok()
                .and_then(|value| value.parse().ok()),
            time_limit: std::env::var("EXAM_TIME_LIMIT")
                .ok()
                .and_then(|value| value.trim().parse().ok()),
            db_url: std::env::var("EXAM_DB_URL").ok().map(normalize_sqlite_url),
            limit: 20,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--questions" => {
                    parsed.questions = Some(PathBuf::from(require_value(args, "--questions")?));
                }
                "--mode" => {
                    parsed.mode = Some(parse_mode(require_value(args, "--mode")?)?);
                }
                "--time-limit" => {
                    let value = require_value(args, "--time-limit")?;
                    parsed.time_limit = Some(parse_number(value, "--time-limit")?);
                }
                "--limit" => {
                    parsed.limit = parse_number(require_value(args, "--limit")?, "--limit")?;
                }
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    /// Command-line mode and limit override the question file's config.
    fn session_config(&self, from_file: Option<SessionConfig>) -> SessionConfig {
        match (self.mode, from_file) {
            (Some(mode), Some(file)) if file.mode() == mode => self.with_limit(file),
            (Some(mode), _) => SessionConfig::for_mode(mode, self.time_limit),
            (None, Some(file)) => self.with_limit(file),
            (None, None) => self.with_limit(SessionConfig::lesson()),
        }
    }

    fn with_limit(&self, config: SessionConfig) -> SessionConfig {
        match self.time_limit {
            Some(secs) => config.with_time_limit(secs),
            None => config,
        }
    }
}

fn normalize_sqlite_url(raw: String) -> String {
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
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

    let path = std::path::Path::new(path);
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

async fn build_services(args: &Args) -> Result<ExamServices, Box<dyn std::error::Error>> {
    let clock = Clock::default();
    match args.db_url.as_deref() {
        Some(url) => {
            prepare_sqlite_file(url)?;
            Ok(ExamServices::new_sqlite(url, clock).await?)
        }
        None => Ok(ExamServices::in_memory(clock)),
    }
}

fn describe(index: usize, total: usize, question: &Question) {
    println!();
    println!("[{}/{}] {} ({})", index + 1, total, question.id, question.kind.as_str());
    if let Some(image) = &question.image {
        println!("  image: {image}");
    }
    if let Some(audio) = &question.audio {
        println!("  audio: {audio}");
    }
    if let Some(subtitle) = &question.subtitle {
        println!("  {subtitle}");
    }
    for option in &question.answers {
        println!("  ({}) {}", option.id, option.content);
    }
    for sub in &question.questions {
        println!("  - {}: {}", sub.id, sub.question.as_deref().unwrap_or(""));
        for option in &sub.answers {
            println!("      ({}) {}", option.id, option.content);
        }
    }
}

fn print_result(result: &SessionResult) -> Result<(), serde_json::Error> {
    println!();
    println!(
        "submitted: {}/{} correct, {:.1}%{}",
        result.correct_answers,
        result.total_questions,
        result.accuracy,
        match result.passed {
            Some(true) => ", passed",
            Some(false) => ", not passed",
            None => "",
        }
    );
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// What the input loop should do after a line.
enum Flow {
    Continue,
    Stop,
}

async fn apply_line(handle: &SessionHandle, line: &str) -> Result<Flow, services::SessionError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(Flow::Continue);
    };

    match (word, words.next(), words.next()) {
        ("a", Some(answer), None) => {
            report_answer(handle.answer(AnswerPayload::single(answer)).await?);
        }
        ("s", Some(sub), Some(answer)) => {
            report_answer(handle.select_sub_answer(sub.into(), answer.into()).await?);
        }
        ("n", None, None) => report_navigation(handle.next().await?),
        ("p", None, None) => report_navigation(handle.previous().await?),
        ("g", Some(number), None) => match number.parse::<usize>() {
            Ok(n) if n > 0 => report_navigation(handle.go_to(n - 1).await?),
            _ => println!("question numbers start at 1"),
        },
        ("pause", None, None) => {
            if !handle.pause().await? {
                println!("pausing is not available");
            }
        }
        ("resume", None, None) => {
            if !handle.resume().await? {
                println!("session is not paused");
            }
        }
        ("submit", None, None) => match handle.request_submit().await? {
            SubmitRequest::ConfirmationRequired { unanswered } => {
                println!("{unanswered} question(s) unanswered; type submit! to confirm");
            }
            SubmitRequest::Submitted(_) => {}
        },
        ("submit!", None, None) => {
            handle.submit().await?;
        }
        ("status", None, None) => {
            let snapshot = handle.snapshot().await?;
            println!(
                "{}: question {}, answered {}/{}{}",
                snapshot.state,
                snapshot.current_index + 1,
                snapshot.progress.answered,
                snapshot.progress.total,
                snapshot
                    .timer
                    .map(|t| format!(", {}s left", t.remaining))
                    .unwrap_or_default()
            );
        }
        ("help", None, None) => print_commands(),
        ("exit", None, None) => {
            handle.exit().await?;
            return Ok(Flow::Stop);
        }
        _ => println!("unrecognized command; type help"),
    }
    Ok(Flow::Continue)
}

fn report_answer(outcome: AnswerOutcome) {
    match outcome {
        AnswerOutcome::Rejected => println!("answer not accepted"),
        AnswerOutcome::Recorded => println!("saved"),
        AnswerOutcome::Checked { correct: true } => println!("correct"),
        AnswerOutcome::Checked { correct: false } => println!("incorrect"),
    }
}

fn report_navigation(nav: Navigation) {
    if nav == Navigation::Blocked {
        println!("cannot move there yet");
    }
}

async fn run_session(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let path = args.questions.clone().ok_or(ArgsError::MissingQuestions)?;
    let raw = std::fs::read_to_string(&path)?;
    let set: QuestionSet = serde_json::from_str(&raw)?;
    let config = args.session_config(set.config.clone());

    let services = build_services(&args).await?;
    let (tx, mut events) = mpsc::unbounded_channel();
    let (handle, join) = services.launch(set.questions, config, ChannelListener::new(tx))?;

    if let Some(title) = &set.title {
        println!("{title}");
    }
    print_commands();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::QuestionChanged { index, .. }) => {
                    let questions = handle.questions();
                    if let Some(question) = questions.get(index) {
                        describe(index, questions.len(), question);
                    }
                }
                Some(SessionEvent::TimeWarning { remaining_secs }) => {
                    println!("! {remaining_secs} seconds remaining");
                }
                Some(SessionEvent::Paused) => println!("paused"),
                Some(SessionEvent::Resumed) => println!("resumed"),
                Some(SessionEvent::Completed(result)) => {
                    print_result(&result)?;
                    break;
                }
                Some(SessionEvent::Exited) | None => break,
                Some(SessionEvent::Answered { .. }) => {}
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Flow::Stop = apply_line(&handle, line.trim()).await? {
                        break;
                    }
                }
                None => {
                    log::info!("input closed; exiting session");
                    handle.exit().await?;
                    break;
                }
            },
        }
    }

    if let Ok(Some(id)) = handle.result_id().await {
        println!("stored as result #{id}");
    }
    handle.shutdown();
    join.await?;
    Ok(())
}

async fn show_history(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let services = build_services(&args).await?;
    let rows = services.recent_results(args.mode, args.limit).await?;
    if rows.is_empty() {
        println!("no stored results");
    }
    for row in rows {
        let result = row.result;
        println!(
            "#{} {} {} {}/{} ({:.1}%){}",
            row.id,
            result.submitted_at.format("%Y-%m-%d %H:%M"),
            result.mode,
            result.correct_answers,
            result.total_questions,
            result.accuracy,
            match result.passed {
                Some(true) => " passed",
                Some(false) => " failed",
                None => "",
            }
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: run a session when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    match cmd {
        Command::Run => run_session(parsed).await,
        Command::History => show_history(parsed).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
