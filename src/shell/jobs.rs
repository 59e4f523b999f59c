use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::status::Status;

/// Registry of live background children. Bounded by `CONFIG.max_jobs`;
/// callers check `is_full` before launching so a job is never dropped from
/// tracking silently.
pub struct JobTable {
    jobs: Vec<Pid>,
    capacity: usize,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        JobTable {
            jobs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn register(&mut self, pid: Pid) {
        debug_assert!(!self.jobs.contains(&pid));
        debug!("tracking background pid {}", pid);
        self.jobs.push(pid);
    }

    /// Single non-blocking probe of one entry, removing it if it has already
    /// terminated. Lets a launch that dies immediately be reported on the
    /// same prompt cycle it was started.
    pub fn probe(&mut self, pid: Pid) -> Option<Status> {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => None,
            Ok(status) => {
                let done = Status::from_wait(status)?;
                self.jobs.retain(|&tracked| tracked != pid);
                Some(done)
            }
            Err(err) => {
                warn!("waitpid on background pid {} failed: {}", pid, err);
                self.jobs.retain(|&tracked| tracked != pid);
                None
            }
        }
    }

    /// Non-blocking scan in table order. Terminated entries are removed and
    /// returned; running entries stay for the next prompt cycle.
    pub fn poll(&mut self) -> Vec<(Pid, Status)> {
        let mut completed = Vec::new();

        self.jobs
            .retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => true,
                Ok(status) => match Status::from_wait(status) {
                    Some(done) => {
                        completed.push((pid, done));
                        false
                    }
                    None => true,
                },
                Err(err) => {
                    warn!("waitpid on background pid {} failed: {}", pid, err);
                    false
                }
            });

        completed
    }

    /// Unconditional SIGKILL to every tracked job, then forget them. No
    /// grace period and no wait; the operating system reaps whatever is
    /// left once the shell exits.
    pub fn kill_all(&mut self) {
        for &pid in &self.jobs {
            debug!("killing background pid {}", pid);
            if let Err(err) = signal::kill(pid, Signal::SIGKILL) {
                warn!("failed to kill background pid {}: {}", pid, err);
            }
        }
        self.jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::thread;
    use std::time::Duration;

    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program)
            .args(args)
            .spawn()
            .expect("failed to spawn test child");
        Pid::from_raw(child.id() as i32)
    }

    fn poll_until_done(table: &mut JobTable) -> Vec<(Pid, Status)> {
        for _ in 0..250 {
            let completed = table.poll();
            if !completed.is_empty() {
                return completed;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("background job never completed");
    }

    #[test]
    fn poll_reports_exited_job_once_and_removes_it() {
        let mut table = JobTable::new(10);
        let pid = spawn("true", &[]);
        table.register(pid);

        let completed = poll_until_done(&mut table);
        assert_eq!(completed, vec![(pid, Status::Exited(0))]);
        assert!(table.is_empty());

        // already reaped, nothing further to report
        assert!(table.poll().is_empty());
    }

    #[test]
    fn poll_reports_exit_code_of_failing_job() {
        let mut table = JobTable::new(10);
        let pid = spawn("sh", &["-c", "exit 7"]);
        table.register(pid);

        let completed = poll_until_done(&mut table);
        assert_eq!(completed, vec![(pid, Status::Exited(7))]);
    }

    #[test]
    fn poll_leaves_running_jobs_tracked() {
        let mut table = JobTable::new(10);
        let pid = spawn("sleep", &["30"]);
        table.register(pid);

        assert!(table.poll().is_empty());
        assert_eq!(table.len(), 1);

        table.kill_all();
        assert!(table.is_empty());

        // reap outside the table so the test process leaves no zombie
        let status = waitpid(pid, None).expect("failed to reap killed child");
        assert_eq!(Status::from_wait(status), Some(Status::Signaled(9)));
    }

    #[test]
    fn capacity_is_enforced_by_callers_via_is_full() {
        let mut table = JobTable::new(2);
        assert!(!table.is_full());
        table.register(Pid::from_raw(111_111));
        table.register(Pid::from_raw(111_112));
        assert!(table.is_full());
    }
}
