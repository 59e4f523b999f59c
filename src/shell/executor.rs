use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::IntoRawFd;
use std::process;

use anyhow::{Context, Result};
use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, fork, ForkResult, Pid};

use super::parser::Invocation;
use super::status::Status;

const DEV_NULL: &str = "/dev/null";

pub enum Outcome {
    Foreground(Status),
    Background(Pid),
}

pub struct Executor;

impl Executor {
    /// Forks and execs one external command. `background` is the effective
    /// mode after the caller has applied the foreground-only override and
    /// the job-table capacity check.
    ///
    /// Fork failure is fatal to the whole shell; there is no way to manage
    /// children without a process to put them in.
    pub fn launch(invocation: &Invocation, background: bool) -> Result<Outcome> {
        debug!("launching {} (background: {})", invocation.name, background);

        match unsafe { fork() }.context("fork failed")? {
            ForkResult::Child => Self::run_child(invocation, background),
            ForkResult::Parent { child } => {
                if background {
                    Ok(Outcome::Background(child))
                } else {
                    let status = Self::wait_foreground(child)?;
                    Ok(Outcome::Foreground(status))
                }
            }
        }
    }

    /// Blocks until the child exits or is killed by a signal. Stops and
    /// continues are not terminal; EINTR restarts the wait.
    fn wait_foreground(child: Pid) -> Result<Status> {
        loop {
            match waitpid(child, None) {
                Ok(status) => {
                    if let Some(done) = Status::from_wait(status) {
                        return Ok(done);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("waitpid on foreground pid {} failed", child))
                }
            }
        }
    }

    // Everything below runs in the forked child and terminates with an
    // explicit exit; no failure here may unwind into the parent shell.

    fn run_child(invocation: &Invocation, background: bool) -> ! {
        unsafe {
            // Children are never stopped by the shell's own foreground
            // toggle. Background children keep the inherited SIGINT ignore
            // so an interrupt aimed at the foreground does not kill them.
            let _ = signal::signal(Signal::SIGTSTP, SigHandler::SigIgn);
            if !background {
                let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
            }
        }

        Self::redirect_streams(invocation, background);

        let args: Vec<CString> = invocation
            .argv
            .iter()
            .filter_map(|arg| CString::new(arg.as_str()).ok())
            .collect();
        if args.is_empty() {
            Self::child_fail(&format!("{}: no such file or directory", invocation.name), 1);
        }

        // execvp only comes back on failure
        let _ = unistd::execvp(&args[0], &args);
        Self::child_fail(&format!("{}: no such file or directory", invocation.name), 1)
    }

    /// Wires up stdin/stdout before exec. A background child with no
    /// explicit redirection is pointed at /dev/null so its output never
    /// interleaves with the prompt. The opened descriptors belong to this
    /// child alone and die with it.
    fn redirect_streams(invocation: &Invocation, background: bool) {
        let source = invocation
            .redirect_in
            .as_deref()
            .or(if background { Some(DEV_NULL) } else { None });
        let target = invocation
            .redirect_out
            .as_deref()
            .or(if background { Some(DEV_NULL) } else { None });

        let source_fd = source.map(|path| match File::open(path) {
            Ok(file) => file.into_raw_fd(),
            Err(_) => Self::child_fail(&format!("cannot open {} for input", path), 1),
        });
        let target_fd = target.map(|path| {
            let opened = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path);
            match opened {
                Ok(file) => file.into_raw_fd(),
                Err(_) => Self::child_fail(&format!("cannot open {} for output", path), 1),
            }
        });

        if let Some(fd) = source_fd {
            if unistd::dup2(fd, libc::STDIN_FILENO).is_err() {
                Self::child_fail("cannot redirect standard input", 2);
            }
            let _ = unistd::close(fd);
        }
        if let Some(fd) = target_fd {
            if unistd::dup2(fd, libc::STDOUT_FILENO).is_err() {
                Self::child_fail("cannot redirect standard output", 2);
            }
            let _ = unistd::close(fd);
        }
    }

    /// Error text goes to stdout, flushed, so it lands before the next
    /// prompt; the child then exits without returning control.
    fn child_fail(message: &str, code: i32) -> ! {
        println!("{}", message);
        let _ = std::io::stdout().flush();
        process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn invocation(argv: &[&str]) -> Invocation {
        Invocation {
            name: argv[0].to_string(),
            argv: argv.iter().map(|arg| arg.to_string()).collect(),
            ..Invocation::default()
        }
    }

    fn launch_foreground(inv: &Invocation) -> Status {
        match Executor::launch(inv, false).unwrap() {
            Outcome::Foreground(status) => status,
            Outcome::Background(_) => panic!("expected a foreground outcome"),
        }
    }

    #[test]
    fn foreground_exit_status_is_captured() {
        assert_eq!(launch_foreground(&invocation(&["true"])), Status::Exited(0));
        assert_eq!(launch_foreground(&invocation(&["false"])), Status::Exited(1));
    }

    #[test]
    fn foreground_exit_code_is_preserved() {
        let inv = invocation(&["sh", "-c", "exit 7"]);
        assert_eq!(launch_foreground(&inv), Status::Exited(7));
    }

    #[test]
    fn foreground_signal_is_captured() {
        let inv = invocation(&["sh", "-c", "kill -9 $$"]);
        assert_eq!(launch_foreground(&inv), Status::Signaled(9));
    }

    #[test]
    fn missing_program_fails_in_the_child_only() {
        let inv = invocation(&["definitely-not-a-real-command"]);
        assert_eq!(launch_foreground(&inv), Status::Exited(1));
    }

    #[test]
    fn redirection_round_trip() {
        let dir = std::env::temp_dir();
        let out = dir.join(format!("minish-redir-out-{}", std::process::id()));
        let back = dir.join(format!("minish-redir-back-{}", std::process::id()));

        let mut write = invocation(&["echo", "round", "trip"]);
        write.redirect_out = Some(out.to_string_lossy().to_string());
        assert_eq!(launch_foreground(&write), Status::Exited(0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "round trip\n");

        let mut read = invocation(&["cat"]);
        read.redirect_in = Some(out.to_string_lossy().to_string());
        read.redirect_out = Some(back.to_string_lossy().to_string());
        assert_eq!(launch_foreground(&read), Status::Exited(0));
        assert_eq!(fs::read_to_string(&back).unwrap(), "round trip\n");

        let _ = fs::remove_file(&out);
        let _ = fs::remove_file(&back);
    }

    #[test]
    fn unopenable_input_is_fatal_to_the_child() {
        let mut inv = invocation(&["cat"]);
        inv.redirect_in = Some("/definitely/not/here.txt".to_string());
        assert_eq!(launch_foreground(&inv), Status::Exited(1));
    }

    #[test]
    fn background_launch_does_not_block() {
        let inv = invocation(&["sleep", "30"]);
        let pid = match Executor::launch(&inv, true).unwrap() {
            Outcome::Background(pid) => pid,
            Outcome::Foreground(_) => panic!("expected a background outcome"),
        };

        // still running, so a non-blocking wait reports nothing
        let probe = waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG)).unwrap();
        assert_eq!(Status::from_wait(probe), None);

        signal::kill(pid, Signal::SIGKILL).unwrap();
        let status = waitpid(pid, None).unwrap();
        assert_eq!(Status::from_wait(status), Some(Status::Signaled(9)));
    }
}
