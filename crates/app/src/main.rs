use std::fmt;
use std::sync::Arc;

use quiz_core::model::{
    AnswerOption, Direction, OptionId, Question, QuestionId, StudentId, StudentSnapshot,
};
use services::{
    AttemptService, AttemptServiceConfig, Clock, Disposition, HttpAttemptService,
    InMemoryAttemptService, QuizSessionController, QuizTimer, RegistrationService, SessionError,
    SessionNotice, format_elapsed, timer::DEFAULT_TICK,
};
use storage::{SnapshotStore, Storage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingStudent,
    UnknownArg(String),
    InvalidStudentId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingStudent => write!(f, "register requires --student-id and --name"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidStudentId { raw } => write!(f, "invalid --student-id value: {raw:?}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take     [--db <sqlite_url>] [--offline]");
    eprintln!("  cargo run -p app -- register --student-id <id> --name <full name> [--email <email>] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- clear    [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://quiz.sqlite3");
    eprintln!("  --offline serves three demo questions from memory and registers automatically");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_API_BASE_URL, QUIZ_API_TOKEN, QUIZ_API_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Register,
    Clear,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "register" => Some(Self::Register),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    offline: bool,
    student_id: Option<String>,
    full_name: Option<String>,
    email: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("QUIZ_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url),
            offline: false,
            student_id: None,
            full_name: None,
            email: None,
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
                "--offline" => parsed.offline = true,
                "--student-id" => parsed.student_id = Some(require_value(args, "--student-id")?),
                "--name" => parsed.full_name = Some(require_value(args, "--name")?),
                "--email" => parsed.email = Some(require_value(args, "--email")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(parsed)
    }

    fn student(&self) -> Result<StudentSnapshot, ArgsError> {
        let (Some(raw_id), Some(name)) = (&self.student_id, &self.full_name) else {
            return Err(ArgsError::MissingStudent);
        };
        let id = StudentId::new(raw_id.as_str())
            .map_err(|_| ArgsError::InvalidStudentId { raw: raw_id.clone() })?;
        let student = StudentSnapshot::new(id, name.trim());
        Ok(match &self.email {
            Some(email) => student.with_email(email.trim()),
            None => student,
        })
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

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Three questions served by `--offline`, each paired with its correct option.
fn demo_questions() -> Result<Vec<(Question, OptionId)>, Box<dyn std::error::Error>> {
    let raw: [(&str, &str, [&str; 3], usize); 3] = [
        ("q1", "Which keyword declares an immutable binding?", ["let", "var", "const fn"], 0),
        ("q2", "What does `?` do on an Err value?", ["panics", "returns it early", "ignores it"], 1),
        ("q3", "Which type owns a heap string?", ["&str", "char", "String"], 2),
    ];
    let mut questions = Vec::with_capacity(raw.len());
    for (id, text, options, correct) in raw {
        let options = options
            .iter()
            .enumerate()
            .map(|(i, label)| Ok(AnswerOption::new(OptionId::new(format!("{id}-o{i}"))?, *label)))
            .collect::<Result<Vec<_>, quiz_core::model::ParseIdError>>()?;
        let correct_id = options
            .get(correct)
            .map(|o| o.id.clone())
            .ok_or("demo answer key out of range")?;
        questions.push((Question::new(QuestionId::new(id)?, text, options)?, correct_id));
    }
    Ok(questions)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut argv: Vec<String> = std::env::args().skip(1).collect();
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Take,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Take,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let clock = Clock::default();
    let (storage, attempts): (Storage, Arc<dyn AttemptService>) = if parsed.offline {
        let backend = InMemoryAttemptService::new(demo_questions()?, clock);
        (Storage::in_memory(), Arc::new(backend))
    } else {
        prepare_sqlite_file(&parsed.db_url)?;
        let storage = Storage::sqlite(&parsed.db_url).await?;
        if cmd == Command::Clear {
            SnapshotStore::new(Arc::clone(&storage.session)).clear().await?;
            println!("Saved quiz session cleared.");
            return Ok(());
        }
        let config = AttemptServiceConfig::from_env()?;
        (storage, Arc::new(HttpAttemptService::new(config)?))
    };
    let snapshots = SnapshotStore::new(Arc::clone(&storage.session));
    let registration = RegistrationService::new(Arc::clone(&attempts), snapshots.clone());

    match cmd {
        Command::Clear => {
            snapshots.clear().await?;
            println!("Saved quiz session cleared.");
            Ok(())
        }
        Command::Register => {
            let attempt_id = registration.register(parsed.student()?).await?;
            println!("Registered attempt {attempt_id}. Run `take` to start.");
            Ok(())
        }
        Command::Take => {
            if parsed.offline {
                let student = match parsed.student() {
                    Ok(student) => student,
                    Err(_) => StudentSnapshot::new(StudentId::new("offline")?, "Offline Student"),
                };
                registration.register(student).await?;
            }
            let controller =
                QuizSessionController::new(attempts, snapshots).with_clock(clock);
            take_quiz(controller).await
        }
    }
}

//
// ─── TERMINAL LOOP ─────────────────────────────────────────────────────────────
//

async fn take_quiz(mut controller: QuizSessionController) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = controller.resume().await {
        report(&err);
        return Ok(());
    }
    let Some(mut notices) = controller.notices() else {
        return Ok(());
    };
    let Some(started_at) = controller.state().map(|s| s.started_at()) else {
        return Ok(());
    };
    let timer = QuizTimer::spawn(started_at, controller.clock(), DEFAULT_TICK);
    info!("quiz started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    render(&controller, &timer);
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        let outcome = match input {
            "q" | "quit" => break,
            "" => Ok(()),
            "?" | "help" => {
                print_help();
                Ok(())
            }
            "n" => controller.advance(Direction::Next).map(|_| ()),
            "p" => controller.advance(Direction::Previous).map(|_| ()),
            "s" => match controller.submit().await {
                Ok(result) => {
                    println!(
                        "Submitted: {}/{} correct, score {:.1} (took {}).",
                        result.correct_count,
                        result.total_count,
                        result.score,
                        format_elapsed(u64::try_from(result.duration().num_seconds()).unwrap_or(0)),
                    );
                    break;
                }
                Err(err) => Err(err),
            },
            other => select_or_jump(&mut controller, other),
        };

        drain_notices(&mut notices);
        if let Err(err) = outcome {
            report(&err);
            if err.disposition() == Disposition::RedirectToRegistration {
                break;
            }
        }
        render(&controller, &timer);
    }

    timer.stop();
    controller.flush().await;
    drain_notices(&mut notices);
    Ok(())
}

/// `<n>` selects option n of the displayed question, `g <n>` jumps to question n.
fn select_or_jump(controller: &mut QuizSessionController, input: &str) -> Result<(), SessionError> {
    if let Some(target) = input.strip_prefix("g ") {
        match target.trim().parse::<usize>() {
            Ok(n) if n > 0 => return controller.jump_to(n - 1).map(|_| ()),
            _ => {
                println!("Unknown question number: {target}");
                return Ok(());
            }
        }
    }

    let Some(question) = controller.state().map(|s| s.current_question().clone()) else {
        return Err(SessionError::NotLoaded);
    };
    let choice = input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| question.options().get(i));
    match choice {
        Some(option) => controller.select_option(question.id().clone(), option.id.clone()),
        None => {
            println!("Unknown command: {input} (type ? for help)");
            Ok(())
        }
    }
}

fn render(controller: &QuizSessionController, timer: &QuizTimer) {
    let (Some(state), Some(progress)) = (controller.state(), controller.progress()) else {
        return;
    };
    let question = state.current_question();
    let selected = state.selected_option(question.id());
    println!();
    println!(
        "[{}/{}] {}   {} left   {}",
        progress.position(),
        progress.total,
        question.text(),
        progress.remaining(),
        format_elapsed(timer.elapsed_secs()),
    );
    for (i, option) in question.options().iter().enumerate() {
        let mark = if selected == Some(&option.id) { "*" } else { " " };
        println!("  {mark} {}) {}", i + 1, option.text);
    }
    if selected.is_some() && !controller.is_saved(question.id()) {
        println!("  (saving...)");
    }
    if progress.is_fully_answered() && !state.is_last_question() {
        println!("  all questions answered; go to the last one to submit");
    }
}

fn print_help() {
    println!("  <n>     select option n");
    println!("  n / p   next / previous question");
    println!("  g <n>   go to question n");
    println!("  s       submit (from the last question)");
    println!("  q       quit; answers already sent stay saved");
}

fn drain_notices(notices: &mut UnboundedReceiver<SessionNotice>) {
    while let Ok(notice) = notices.try_recv() {
        if let SessionNotice::AnswerSyncFailed(err) = notice {
            println!("! {err}. It will be retried when you move on or submit.");
        }
    }
}

fn report(err: &SessionError) {
    match err.disposition() {
        Disposition::RedirectToRegistration => {
            eprintln!("{err}. Please register again with `register`.");
        }
        Disposition::Retry => eprintln!("{err}. Your answers are kept; try `s` again."),
        Disposition::Warn => eprintln!("warning: {err}"),
        Disposition::FixInput => println!("{err}"),
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
