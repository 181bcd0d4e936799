//! The Strata database binary.
//!
//! `-project` selects which command set is loaded; the concurrency and
//! recovery projects serve the REPL over TCP, everything else runs it on
//! standard I/O.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use strata::concurrency::{LockManager, TransactionManager};
use strata::database::Database;
use strata::recovery::{log_path, RecoveryManager};
use strata_bin::{commands, repl::Repl, run_server, shutdown, Engine};
use uuid::Uuid;

const DEFAULT_PORT: u16 = 8335;
const PROJECTS: &str = "go,pager,db,query,concurrency,recovery";

struct Flags {
    project: String,
    db_dir: String,
    port: u16,
    prompt: bool,
}

impl Flags {
    fn parse(args: impl Iterator<Item = String>) -> Result<Flags, String> {
        let mut flags = Flags {
            project: String::new(),
            db_dir: "data/".to_string(),
            port: DEFAULT_PORT,
            prompt: true,
        };
        let mut args = args.peekable();
        while let Some(arg) = args.next() {
            let (flag, inline_value) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            match flag.as_str() {
                "-project" => flags.project = take_value(&flag, inline_value, &mut args)?,
                "-db" => flags.db_dir = take_value(&flag, inline_value, &mut args)?,
                "-p" => {
                    flags.port = take_value(&flag, inline_value, &mut args)?
                        .parse()
                        .map_err(|_| "-p needs a port number".to_string())?
                }
                "-c" => {
                    // Bare -c keeps the default; -c false disables the prompt.
                    if let Some(value) = inline_value {
                        flags.prompt = value == "true";
                    } else if args
                        .peek()
                        .is_some_and(|next| next == "true" || next == "false")
                    {
                        flags.prompt = args.next().as_deref() == Some("true");
                    }
                }
                other => return Err(format!("unknown flag {other}")),
            }
        }
        Ok(flags)
    }
}

fn take_value(
    flag: &str,
    inline_value: Option<String>,
    args: &mut impl Iterator<Item = String>,
) -> Result<String, String> {
    match inline_value {
        Some(value) => Ok(value),
        None => args
            .next()
            .ok_or_else(|| format!("flag {flag} needs a value")),
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let flags = Flags::parse(std::env::args().skip(1))?;
    let server = matches!(flags.project.as_str(), "concurrency" | "recovery");
    match flags.project.as_str() {
        "go" | "pager" | "db" | "query" | "concurrency" | "recovery" => {}
        _ => return Err(format!("must specify -project [{PROJECTS}]").into()),
    }

    // Recovery mode restores the directory from its shadow before opening.
    let db = if flags.project == "recovery" {
        Arc::new(RecoveryManager::prime(&flags.db_dir)?)
    } else {
        Arc::new(Database::open(&flags.db_dir)?)
    };
    db.create_log_file(log_path(&flags.db_dir))?;
    shutdown::install(db.clone())?;

    let (tm, rm) = if server {
        let tm = Arc::new(TransactionManager::new(Arc::new(LockManager::new())));
        let rm = if flags.project == "recovery" {
            let rm = Arc::new(RecoveryManager::new(
                db.clone(),
                tm.clone(),
                log_path(&flags.db_dir),
            )?);
            rm.recover()?;
            Some(rm)
        } else {
            None
        };
        (Some(tm), rm)
    } else {
        (None, None)
    };

    let engine = Arc::new(Engine {
        db: db.clone(),
        tm,
        rm,
    });
    let mut repl = commands::database_repl(engine.clone());
    if flags.project == "query" {
        repl.merge(commands::query_repl(engine.clone()))?;
    }
    if server {
        repl.merge(commands::transaction_repl(engine.clone()))?;
        let hook_engine = engine.clone();
        repl.set_abort_hook(Arc::new(move |client_id| {
            hook_engine.abort_session(client_id)
        }));
    }
    if flags.project == "recovery" {
        repl.merge(commands::recovery_repl(engine.clone()))?;
    }

    let prompt = if flags.prompt { "> " } else { "" };
    if server {
        run_server(Arc::new(repl), engine, flags.port, prompt.to_string())?;
    } else {
        run_local(&repl, prompt);
        db.close()?;
    }
    Ok(())
}

fn run_local(repl: &Repl, prompt: &str) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_repl_on(repl, stdin.lock(), stdout.lock(), prompt);
}

fn run_repl_on<R: BufRead, W: Write>(repl: &Repl, reader: R, writer: W, prompt: &str) {
    repl.run(reader, writer, Uuid::new_v4(), prompt);
}
