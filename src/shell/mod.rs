mod executor;
mod jobs;
mod parser;
mod signal_handler;
mod status;

use std::io::Write;

use anyhow::Result;
use log::debug;

use crate::config::CONFIG;
use crate::terminal::{ReadOutcome, Terminal};
use executor::{Executor, Outcome};
use jobs::JobTable;
use parser::Invocation;
use signal_handler::SignalHandler;
use status::Status;

/// Category of the first token on a line. Built-ins run in the shell's own
/// process; everything else is forked and exec'd.
#[derive(Debug, PartialEq, Eq)]
enum CommandKind {
    Empty,
    Exit,
    Cd,
    Status,
    Other,
}

fn classify(name: &str) -> CommandKind {
    match name {
        "" => CommandKind::Empty,
        "exit" => CommandKind::Exit,
        "cd" => CommandKind::Cd,
        "status" => CommandKind::Status,
        _ => CommandKind::Other,
    }
}

fn home_dir() -> Option<String> {
    std::env::var("HOME")
        .ok()
        .or_else(|| dirs::home_dir().map(|path| path.to_string_lossy().to_string()))
}

/// Resolves the `cd` target: no argument or a literal `~` goes home.
fn resolve_cd_target(arg: Option<&str>) -> Option<String> {
    match arg {
        None | Some("~") => home_dir(),
        Some(path) => Some(path.to_string()),
    }
}

pub struct Shell {
    terminal: Terminal,
    jobs: JobTable,
    last_status: Status,
    pid: u32,
}

impl Shell {
    pub fn new() -> Self {
        SignalHandler::install().unwrap_or_else(|err| {
            eprintln!("Warning: Failed to install signal handlers: {}", err);
        });

        Shell {
            terminal: Terminal::new(),
            jobs: JobTable::new(CONFIG.max_jobs),
            last_status: Status::default(),
            pid: std::process::id(),
        }
    }

    /// The prompt cycle: prompt, parse, dispatch, reap, repeat until `exit`.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let line = match self.terminal.read_line(&CONFIG.prompt)? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => continue,
                // end of input shuts the shell down like `exit` does
                ReadOutcome::Eof => {
                    self.jobs.kill_all();
                    break;
                }
            };

            let invocation = parser::parse(&line, self.pid)?;

            match classify(&invocation.name) {
                CommandKind::Empty => {}
                CommandKind::Exit => {
                    self.jobs.kill_all();
                    break;
                }
                CommandKind::Cd => self.run_cd(&invocation),
                CommandKind::Status => self.report(&self.last_status.to_string()),
                CommandKind::Other => self.run_external(&invocation)?,
            }

            self.reap_background();
        }

        Ok(())
    }

    /// All user-visible text goes to stdout, flushed immediately, so its
    /// ordering relative to the next prompt is preserved.
    fn report(&self, message: &str) {
        println!("{}", message);
        let _ = std::io::stdout().flush();
    }

    // `cd` never touches the last foreground status, and a stray trailing
    // `&` was already stripped by the parser.
    fn run_cd(&mut self, invocation: &Invocation) {
        let arg = invocation.argv.get(1).map(String::as_str);
        let target = match resolve_cd_target(arg) {
            Some(target) => target,
            None => {
                self.report("cd: HOME is not set");
                return;
            }
        };

        if std::env::set_current_dir(&target).is_err() {
            self.report(&format!("cd: {}: no such file or directory", target));
        }
    }

    fn run_external(&mut self, invocation: &Invocation) -> Result<()> {
        let mut background = invocation.background;
        if background && SignalHandler::foreground_only() {
            debug!("foreground-only mode active, ignoring '&'");
            background = false;
        }
        if background && self.jobs.is_full() {
            // bounded table: reject the background request out loud rather
            // than dropping the job from tracking
            self.report(&format!(
                "background job limit of {} reached; running in the foreground",
                CONFIG.max_jobs
            ));
            background = false;
        }

        match Executor::launch(invocation, background)? {
            Outcome::Background(pid) => {
                self.report(&format!("background pid is {}", pid));
                self.jobs.register(pid);
                // a launch that died straight away is reported now, not a
                // full prompt cycle later
                if let Some(done) = self.jobs.probe(pid) {
                    self.report(&format!("background pid {} is done: {}", pid, done));
                }
            }
            Outcome::Foreground(outcome) => {
                if let Status::Signaled(signal) = outcome {
                    self.report(&format!("terminated by signal {}", signal));
                }
                self.last_status = outcome;
            }
        }

        Ok(())
    }

    /// Called once per prompt cycle, after dispatch. Background completions
    /// are reported in table order and never alter the foreground status.
    fn reap_background(&mut self) {
        for (pid, done) in self.jobs.poll() {
            self.report(&format!("background pid {} is done: {}", pid, done));
        }
    }
}
