use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use crate::commands::session::SessionAction;
use crate::commands::{self, CommandReport, Source};
use crate::logging;

#[derive(Parser)]
#[command(name = "chatctx")]
#[command(about = "Rebuild exported chat logs into ordered messages, date-grouped context and budget-sized chunks")]
#[command(version)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Log at debug level (overrides CHATCTX_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

/// Exactly one message source.
#[derive(Args, Debug, Clone)]
#[group(required = false, multiple = false)]
struct InputArgs {
    /// Exported chat transcript (text)
    file: Option<PathBuf>,
    /// JSON file of feed records (bare array or {"messages": [...]})
    #[arg(long, value_name = "JSON_FILE")]
    feed: Option<PathBuf>,
    /// Fetch this chat from the messaging bridge
    #[arg(long = "chat-id", value_name = "ID")]
    chat_id: Option<String>,
}

impl InputArgs {
    fn source(&self) -> Option<Source> {
        if let Some(path) = &self.file {
            return Some(Source::Export(path.clone()));
        }
        if let Some(path) = &self.feed {
            return Some(Source::FeedFile(path.clone()));
        }
        self.chat_id.clone().map(Source::Chat)
    }

    fn required(&self) -> Result<Source> {
        self.source()
            .ok_or_else(|| anyhow!("pass an export file, --feed <JSON_FILE> or --chat-id <ID>"))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Reconstruct and normalize a transcript, reporting what was recovered
    Parse {
        file: PathBuf,
    },
    /// Split messages into budget-bounded chunks
    Chunk {
        #[command(flatten)]
        input: InputArgs,
        /// Budget in units of four characters
        #[arg(long)]
        budget: Option<usize>,
        /// Print the chunk texts
        #[arg(long)]
        print: bool,
    },
    /// Render a date-grouped context document
    Format {
        #[command(flatten)]
        input: InputArgs,
        /// IANA time zone for date grouping
        #[arg(long)]
        tz: Option<String>,
    },
    /// Ask a question about a conversation
    Ask {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, short)]
        question: String,
        /// Store (with an input) or reuse (without) the context under this key
        #[arg(long)]
        session: Option<String>,
    },
    /// Inspect or manage stored session contexts
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
    /// Show resolved paths, effective config and active overrides
    Status,
}

#[derive(Subcommand, Clone)]
enum SessionCommand {
    /// List live sessions
    List,
    /// Drop one session
    Remove { key: String },
    /// Drop every session
    Clear,
    /// Drop expired sessions
    Purge,
}

impl From<SessionCommand> for SessionAction {
    fn from(cmd: SessionCommand) -> Self {
        match cmd {
            SessionCommand::List => SessionAction::List,
            SessionCommand::Remove { key } => SessionAction::Remove(key),
            SessionCommand::Clear => SessionAction::Clear,
            SessionCommand::Purge => SessionAction::Purge,
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Parse { .. } => "parse",
        Command::Chunk { .. } => "chunk",
        Command::Format { .. } => "format",
        Command::Ask { .. } => "ask",
        Command::Session { .. } => "session",
        Command::Status => "status",
    }
}

fn dispatch(command: &Command) -> Result<CommandReport> {
    match command {
        Command::Parse { file } => commands::parse::run(file),
        Command::Chunk {
            input,
            budget,
            print,
        } => commands::chunk::run(&input.required()?, *budget, *print),
        Command::Format { input, tz } => commands::format::run(&input.required()?, tz.as_deref()),
        Command::Ask {
            input,
            question,
            session,
        } => commands::ask::run(commands::ask::AskOptions {
            source: input.source(),
            question,
            session: session.as_deref(),
        }),
        Command::Session { action } => commands::session::run(action.clone().into()),
        Command::Status => commands::status::run(),
    }
}

fn print_text(report: &CommandReport) -> Result<()> {
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let mut out = stdout.lock();
    if let Some(output) = &report.output {
        out.write_all(output.as_bytes())?;
        out.flush()?;
    }
    // Keep stdout clean for piping when the command produced a document.
    let mut summary: Box<dyn Write> = if report.output.is_some() {
        Box::new(stderr.lock())
    } else {
        Box::new(out)
    };
    let state = if report.ok { "ok" } else { "failed" };
    writeln!(summary, "{}: {state}", report.command)?;
    for detail in &report.details {
        writeln!(summary, "  {detail}")?;
    }
    if !report.issues.is_empty() {
        writeln!(summary, "issues:")?;
        for issue in &report.issues {
            writeln!(summary, "  - {issue}")?;
        }
    }
    summary.flush()?;
    Ok(())
}

/// Parse arguments, run the command and print its report. Returns whether
/// the report came back clean.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match dispatch(&cli.command) {
        Ok(report) => report,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "command failed");
            let mut report = CommandReport::new(command_name(&cli.command));
            report.fail(&err);
            report
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report)?;
    }
    Ok(report.ok)
}
