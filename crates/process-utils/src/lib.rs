//! Small process-related helpers shared across the workspace.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
pub use termination::{Termination, terminate_child};

#[cfg(feature = "tokio")]
mod termination {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::process::{Child, ChildStdin};
    use tracing::{debug, warn};

    /// How a child process ended after [`terminate_child`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Termination {
        /// The child had already exited before termination was requested.
        AlreadyExited(Option<i32>),
        /// The child exited on its own within the grace period.
        Graceful(Option<i32>),
        /// The child outlived the grace period and was killed.
        Killed,
    }

    impl Termination {
        /// Exit code, when the process reported one.
        pub fn exit_code(&self) -> Option<i32> {
            match self {
                Self::AlreadyExited(code) | Self::Graceful(code) => *code,
                Self::Killed => None,
            }
        }
    }

    /// Ask a child to quit, then kill it if it is still alive after `grace`.
    ///
    /// `quit_command` is written to the child's stdin (ffmpeg quits on `q`),
    /// after which stdin is closed. Write failures are ignored: a child that
    /// already closed its stdin is handled by the grace timeout.
    pub async fn terminate_child(
        child: &mut Child,
        stdin: Option<ChildStdin>,
        quit_command: &[u8],
        grace: Duration,
    ) -> std::io::Result<Termination> {
        if let Some(status) = child.try_wait()? {
            return Ok(Termination::AlreadyExited(status.code()));
        }

        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(quit_command).await {
                debug!(error = %e, "Failed to write quit command to child stdin");
            }
            let _ = stdin.flush().await;
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => Ok(Termination::Graceful(status?.code())),
            Err(_) => {
                warn!(
                    pid = ?child.id(),
                    grace_ms = grace.as_millis() as u64,
                    "Process did not exit within grace period, killing"
                );
                child.kill().await?;
                Ok(Termination::Killed)
            }
        }
    }

}
