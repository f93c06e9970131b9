//! The external shell-executor collaborator invoked by RoutineControl 0xF000 (remote console).
//!
//! Out of scope per the spec: the actual command interpreter. This crate only defines the
//! seam and a process-spawning default implementation.

/// Runs one remote-console command and returns its combined output bytes. The caller is
/// responsible for feeding the result into the active [`crate::console::CaptureGuard`].
pub trait ShellExecutor: Send {
    /// Executes `command`, returning whatever it printed.
    fn execute(&mut self, command: &str) -> Vec<u8>;
}

/// Runs commands via the host shell (`sh -c`), capturing combined stdout/stderr.
#[derive(Debug, Default)]
pub struct SystemShellExecutor;

impl ShellExecutor for SystemShellExecutor {
    fn execute(&mut self, command: &str) -> Vec<u8> {
        match std::process::Command::new("sh").arg("-c").arg(command).output() {
            Ok(out) => {
                let mut combined = out.stdout;
                combined.extend_from_slice(&out.stderr);
                combined
            }
            Err(e) => format!("exec error: {e}\n").into_bytes(),
        }
    }
}
