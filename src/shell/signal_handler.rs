use log::debug;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

// Process-wide foreground-only flag. The SIGTSTP handler is the only writer;
// the dispatch path reads it before every launch.
static FOREGROUND_ONLY: AtomicBool = AtomicBool::new(false);

const ENTER_NOTICE: &[u8] = b"\nEntering foreground-only mode (& is now ignored)\n: ";
const EXIT_NOTICE: &[u8] = b"\nExiting foreground-only mode\n: ";

pub struct SignalHandler;

impl SignalHandler {
    pub fn install() -> Result<(), nix::Error> {
        debug!("installing signal dispositions");

        // The shell itself is never interrupted; foreground children restore
        // the default SIGINT disposition after the fork.
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
        unsafe { signal::sigaction(Signal::SIGINT, &ignore)? };

        let toggle = SigAction::new(
            SigHandler::Handler(handle_sigtstp),
            SaFlags::SA_RESTART,
            SigSet::all(),
        );
        unsafe { signal::sigaction(Signal::SIGTSTP, &toggle)? };

        Ok(())
    }

    pub fn foreground_only() -> bool {
        FOREGROUND_ONLY.load(Ordering::SeqCst)
    }
}

// Runs during asynchronous delivery: one atomic store and one unbuffered
// write(2) of a pre-formatted message. Nothing here may allocate or go
// through buffered stdout.
extern "C" fn handle_sigtstp(_: libc::c_int) {
    let entering = !FOREGROUND_ONLY.load(Ordering::SeqCst);
    FOREGROUND_ONLY.store(entering, Ordering::SeqCst);

    let notice = if entering { ENTER_NOTICE } else { EXIT_NOTICE };
    unsafe {
        libc::write(
            libc::STDOUT_FILENO,
            notice.as_ptr() as *const libc::c_void,
            notice.len(),
        );
    }
}
