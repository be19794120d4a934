//! Process-group control for running encoders.
//!
//! ffmpeg is started as the leader of its own process group so that
//! suspend, resume and kill reach any helpers it forks.

use tokio::process::Command;

use crate::error::EncoderError;

/// Places the child in a new process group led by itself.
pub fn isolate(cmd: &mut Command) {
    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(not(unix))]
    let _ = cmd;
}

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    use crate::error::EncoderError;

    fn send(pid: u32, signal: Signal) -> Result<(), EncoderError> {
        let group = i32::try_from(pid)
            .map_err(|_| EncoderError::Signal(format!("invalid process id {}", pid)))?;

        match killpg(Pid::from_raw(group), signal) {
            // Group already gone
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(EncoderError::Signal(format!(
                "{:?} to process group {}: {}",
                signal, pid, e
            ))),
        }
    }

    pub fn suspend(pid: u32) -> Result<(), EncoderError> {
        send(pid, Signal::SIGSTOP)
    }

    pub fn resume(pid: u32) -> Result<(), EncoderError> {
        send(pid, Signal::SIGCONT)
    }

    pub fn terminate(pid: u32) -> Result<(), EncoderError> {
        send(pid, Signal::SIGKILL)
    }
}

#[cfg(not(unix))]
mod imp {
    use std::process::{Command, Stdio};

    use crate::error::EncoderError;

    pub fn suspend(_pid: u32) -> Result<(), EncoderError> {
        Err(EncoderError::Unsupported("suspend"))
    }

    pub fn resume(_pid: u32) -> Result<(), EncoderError> {
        Err(EncoderError::Unsupported("resume"))
    }

    pub fn terminate(pid: u32) -> Result<(), EncoderError> {
        Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|e| EncoderError::Signal(format!("taskkill for {}: {}", pid, e)))
    }
}

/// Pauses the process group.
pub fn suspend(pid: u32) -> Result<(), EncoderError> {
    imp::suspend(pid)
}

/// Continues a paused process group.
pub fn resume(pid: u32) -> Result<(), EncoderError> {
    imp::resume(pid)
}

/// Kills the process group outright.
pub fn terminate(pid: u32) -> Result<(), EncoderError> {
    imp::terminate(pid)
}
