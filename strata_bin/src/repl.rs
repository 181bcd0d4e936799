//! A line-oriented command loop.
//!
//! Commands are registered by trigger word with a help string; input is
//! case-insensitive and whitespace-tokenized. Responses are free-form text;
//! errors print as `<message>`. `.help` lists every command.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::sync::Arc;

use strata::{Error, Result};
use uuid::Uuid;

/// Per-session state a handler sees: the connection's client identity.
pub struct ReplContext {
    pub client_id: Uuid,
}

/// A command takes the tokenized payload (trigger included) and returns the
/// response text.
pub type Handler = Arc<dyn Fn(&[&str], &ReplContext) -> Result<String> + Send + Sync>;

struct Command {
    handler: Handler,
    help: String,
}

/// Invoked when a command fails with `Deadlock`: the session's transaction
/// must be aborted before the client issues anything else.
pub type AbortHook = Arc<dyn Fn(Uuid) + Send + Sync>;

#[derive(Default)]
pub struct Repl {
    commands: BTreeMap<String, Command>,
    abort_hook: Option<AbortHook>,
}

impl Repl {
    pub fn new() -> Repl {
        Repl::default()
    }

    pub fn add_command(&mut self, trigger: &str, help: &str, handler: Handler) {
        self.commands.insert(
            trigger.to_string(),
            Command {
                handler,
                help: help.to_string(),
            },
        );
    }

    /// Fold another command set into this one; overlapping triggers are a
    /// wiring bug.
    pub fn merge(&mut self, other: Repl) -> Result<()> {
        for (trigger, command) in other.commands {
            if self.commands.contains_key(&trigger) {
                return Err(Error::InvalidInput(format!(
                    "overlapping trigger {trigger}"
                )));
            }
            self.commands.insert(trigger, command);
        }
        Ok(())
    }

    pub fn set_abort_hook(&mut self, hook: AbortHook) {
        self.abort_hook = Some(hook);
    }

    pub fn help_string(&self) -> String {
        let mut help = String::new();
        for (trigger, command) in &self.commands {
            help.push_str(&format!("{trigger}: {}\n", command.help));
        }
        help
    }

    /// Run the loop until the reader closes.
    pub fn run<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
        client_id: Uuid,
        prompt: &str,
    ) {
        let context = ReplContext { client_id };
        let _ = write!(writer, "{prompt}");
        let _ = writer.flush();
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let payload = line.trim().to_lowercase();
            let tokens: Vec<&str> = payload.split_whitespace().collect();
            if tokens.is_empty() {
                let _ = write!(writer, "{prompt}");
                let _ = writer.flush();
                continue;
            }
            if tokens[0] == ".help" {
                let _ = write!(writer, "{}", self.help_string());
            } else {
                match self.commands.get(tokens[0]) {
                    Some(command) => match (command.handler)(&tokens, &context) {
                        Ok(response) => {
                            if !response.is_empty() {
                                let _ = writeln!(writer, "{response}");
                            }
                        }
                        Err(err) => {
                            let _ = writeln!(writer, "{err}");
                            if matches!(err, Error::Deadlock) {
                                if let Some(hook) = &self.abort_hook {
                                    hook(client_id);
                                }
                            }
                        }
                    },
                    None => {
                        let _ = writeln!(writer, "command not found");
                    }
                }
            }
            let _ = write!(writer, "{prompt}");
            let _ = writer.flush();
        }
        let _ = writeln!(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_repl() -> Repl {
        let mut repl = Repl::new();
        repl.add_command(
            "echo",
            "echo <word>: repeat a word",
            Arc::new(|tokens, _ctx| {
                tokens
                    .get(1)
                    .map(|w| w.to_string())
                    .ok_or_else(|| Error::InvalidInput("echo needs a word".to_string()))
            }),
        );
        repl
    }

    fn run_lines(repl: &Repl, input: &str) -> String {
        let mut out = Vec::new();
        repl.run(input.as_bytes(), &mut out, Uuid::new_v4(), "");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_dispatch_lowercases_and_reports_errors() {
        let repl = echo_repl();
        let out = run_lines(&repl, "ECHO Hello\nbogus\necho\n");
        assert!(out.contains("hello"));
        assert!(out.contains("command not found"));
        assert!(out.contains("echo needs a word"));
    }

    #[test]
    fn test_help_lists_commands() {
        let repl = echo_repl();
        let out = run_lines(&repl, ".help\n");
        assert!(out.contains("echo <word>"));
    }

    #[test]
    fn test_merge_rejects_overlap() {
        let mut repl = echo_repl();
        assert!(repl.merge(echo_repl()).is_err());
    }
}
