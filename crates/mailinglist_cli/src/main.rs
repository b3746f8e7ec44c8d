//! Operator entry point for the subscription engine.
//!
//! # Responsibility
//! - Run reconciliation and policy queries against a SQLite database and a
//!   JSON directory snapshot.
//! - Keep output line-oriented and deterministic for scripting.

use clap::{Args, Parser, Subcommand};
use log::error;
use mailinglist_core::{
    default_log_level, init_logging, open_db, Collaborators, DirectorySnapshot, MailinglistId,
    MailinglistType, PersonaId, ReconciliationService, SubscriptionService, User,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "mailinglist",
    about = "Inspect and reconcile mailing list subscriptions",
    version
)]
struct Cli {
    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, global = true)]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check core linkage
    Ping,
    /// List the mailing list types and their rules
    Types,
    /// Re-derive implicit subscribers and retire obsolete subscriptions
    Reconcile(ReconcileArgs),
    /// Show one persona's subscription policy on a list
    Policy(PolicyArgs),
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// SQLite database file
    #[arg(long)]
    db: PathBuf,
    /// JSON directory snapshot with personas, events and assemblies
    #[arg(long)]
    snapshot: PathBuf,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Restrict to these list ids; all lists when omitted
    #[arg(long = "list")]
    lists: Vec<MailinglistId>,
}

#[derive(Args, Debug)]
struct PolicyArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    list: MailinglistId,
    #[arg(long)]
    persona: PersonaId,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_command module=cli status=error error={message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Ping => {
            println!("mailinglist_core ping={}", mailinglist_core::ping());
            println!(
                "mailinglist_core version={}",
                mailinglist_core::core_version()
            );
            Ok(())
        }
        Command::Types => {
            for kind in MailinglistType::ALL {
                let descriptor = kind.descriptor();
                println!(
                    "{} label=\"{}\" unsubscribe={} link={:?} maxsize={}",
                    kind.as_str(),
                    descriptor.label,
                    descriptor.allows_voluntary_unsubscription(),
                    descriptor.link,
                    descriptor
                        .default_maxsize
                        .map_or_else(|| "-".to_string(), |size| size.to_string())
                );
            }
            Ok(())
        }
        Command::Reconcile(args) => reconcile(args),
        Command::Policy(args) => policy(args),
    }
}

fn reconcile(args: ReconcileArgs) -> Result<(), String> {
    let snapshot = load_snapshot(&args.store.snapshot)?;
    let conn = open_db(&args.store.db).map_err(|err| err.to_string())?;
    let service = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot));

    let lists = (!args.lists.is_empty()).then_some(args.lists.as_slice());
    let report = service
        .write_subscription_states(&User::automation(), lists)
        .map_err(|err| err.to_string())?;

    println!(
        "affected={} processed={} skipped={} failed={}",
        report.affected,
        report.processed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (mailinglist_id, message) in &report.failed {
        println!("failed ml_id={mailinglist_id} error={message}");
    }
    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} list(s) failed", report.failed.len()))
    }
}

fn policy(args: PolicyArgs) -> Result<(), String> {
    let snapshot = load_snapshot(&args.store.snapshot)?;
    let conn = open_db(&args.store.db).map_err(|err| err.to_string())?;
    let service = SubscriptionService::new(&conn, Collaborators::from_single(&snapshot));

    let policy = service
        .get_subscription_policy(&User::automation(), args.persona, args.list)
        .map_err(|err| err.to_string())?;
    println!(
        "ml_id={} persona_id={} policy={}",
        args.list,
        args.persona,
        policy.as_str()
    );
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<DirectorySnapshot, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read snapshot `{}`: {err}", path.display()))?;
    DirectorySnapshot::from_json_str(&raw)
        .map_err(|err| format!("invalid snapshot `{}`: {err}", path.display()))
}
