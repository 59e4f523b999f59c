use nix::sys::wait::WaitStatus;
use std::fmt;

/// Termination disposition of a child process, phrased the way the `status`
/// built-in and background-completion notices report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Exited(i32),
    Signaled(i32),
}

impl Status {
    /// Terminal wait results only; a stopped or continued child is still
    /// running as far as the shell is concerned.
    pub fn from_wait(status: WaitStatus) -> Option<Status> {
        match status {
            WaitStatus::Exited(_, code) => Some(Status::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Status::Signaled(signal as i32)),
            _ => None,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Exited(0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Exited(code) => write!(f, "exit value {}", code),
            Status::Signaled(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;

    #[test]
    fn initial_status_is_exit_value_zero() {
        assert_eq!(Status::default().to_string(), "exit value 0");
    }

    #[test]
    fn exited_renders_exit_value() {
        assert_eq!(Status::Exited(7).to_string(), "exit value 7");
    }

    #[test]
    fn signaled_renders_signal_number() {
        assert_eq!(Status::Signaled(9).to_string(), "terminated by signal 9");
    }

    #[test]
    fn from_wait_maps_terminal_statuses() {
        let pid = Pid::from_raw(1234);
        assert_eq!(
            Status::from_wait(WaitStatus::Exited(pid, 3)),
            Some(Status::Exited(3))
        );
        assert_eq!(
            Status::from_wait(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(Status::Signaled(9))
        );
        assert_eq!(Status::from_wait(WaitStatus::StillAlive), None);
    }
}
