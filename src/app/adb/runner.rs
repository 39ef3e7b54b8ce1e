use std::io::Read;
use std::process::{ChildStdout, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::app::error::RecorderError;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct RawCommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, RecorderError> {
    let raw = run_command_raw_with_timeout(program, args, timeout)?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&raw.stdout).to_string(),
        stderr: raw.stderr,
        exit_code: raw.exit_code,
    })
}

/// Like [`run_command_with_timeout`] but keeps stdout as bytes, for binary pulls.
pub fn run_command_raw_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<RawCommandOutput, RecorderError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| RecorderError::Bridge(format!("Failed to spawn {program}: {err}")))?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can block once the pipe
    // buffer fills, and we will incorrectly hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RecorderError::Bridge("Failed to capture stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RecorderError::Bridge("Failed to capture stderr".to_string()))?;

    let stdout_handle = drain(PipeReader::Stdout(stdout));
    let stderr_handle = drain(PipeReader::Stderr(stderr));

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(RecorderError::Bridge(format!(
                        "{program} {} timed out",
                        args.join(" ")
                    )));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(RecorderError::Bridge(format!(
                    "Failed to poll command: {err}"
                )));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(RawCommandOutput {
        stdout: stdout_bytes,
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

enum PipeReader {
    Stdout(ChildStdout),
    Stderr(ChildStderr),
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdout(pipe) => pipe.read(buf),
            Self::Stderr(pipe) => pipe.read(buf),
        }
    }
}

fn drain(mut reader: PipeReader) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> (String, Vec<String>) {
        if cfg!(windows) {
            ("cmd.exe".to_string(), vec!["/C".to_string(), script.to_string()])
        } else {
            ("sh".to_string(), vec!["-c".to_string(), script.to_string()])
        }
    }

    #[test]
    fn run_command_with_timeout_does_not_deadlock_on_large_stdout() {
        // If stdout/stderr are piped but not drained, the child can block once the pipe buffer
        // fills and an otherwise-fast command "hangs" until the timeout.
        let (program, args) = if cfg!(windows) {
            shell("for /L %i in (1,1,100000) do @echo 1234567890")
        } else {
            shell("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done")
        };

        let output = run_command_with_timeout(&program, &args, Duration::from_secs(10))
            .expect("expected large-output command to complete without timing out");

        assert_eq!(output.exit_code, Some(0));
        assert!(output.success());
        assert!(output.stdout.len() >= 1_000_000, "got {}", output.stdout.len());
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let (program, args) = shell("sleep 5");
        let err = run_command_with_timeout(&program, &args, Duration::from_millis(200))
            .expect_err("expected timeout");
        assert_eq!(err.code(), "ERR_DEPENDENCY");
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn raw_output_keeps_bytes() {
        let (program, args) = shell("printf 'a\\000b'");
        let output = run_command_raw_with_timeout(&program, &args, Duration::from_secs(5))
            .expect("raw output");
        assert_eq!(output.stdout, vec![b'a', 0, b'b']);
    }

    #[test]
    fn missing_program_is_a_bridge_error() {
        let err = run_command_with_timeout(
            "/this/path/should/not/exist/adb",
            &[],
            Duration::from_secs(1),
        )
        .expect_err("spawn should fail");
        assert_eq!(err.code(), "ERR_DEPENDENCY");
    }
}
