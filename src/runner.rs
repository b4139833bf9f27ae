use convergence::{CommandLine, CommandOutput, CommandRunner, ExitStatus};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::sudo::SudoConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for output after killing a timed out command.
/// Anything it spawned may still hold the pipes open.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs commands with `std::process`, capturing output
///
/// Privileged (step) commands of allowlisted programs run through `sudo -n`,
/// so a run never stops at a password prompt halfway through a resource.
/// Guard queries always run as the invoking user.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    sudo: SudoConfig,
}

impl ShellRunner {
    pub fn new(sudo: SudoConfig) -> Self {
        Self { sudo }
    }

    fn build(&self, command: &CommandLine) -> Command {
        let mut cmd = if command.privileged && self.sudo.requires_sudo(&command.program) {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n");
            if !command.env.is_empty() {
                let keys: Vec<&str> = command.env.iter().map(|(key, _)| key.as_str()).collect();
                cmd.arg(format!("--preserve-env={}", keys.join(",")));
            }
            cmd.arg(&command.program).args(&command.args);
            cmd
        } else {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args);
            cmd
        };
        cmd.envs(command.env.iter().map(|(key, value)| (key, value)));

        // Own process group, so a timeout reaches everything the command spawned
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &CommandLine) -> convergence::Result<CommandOutput> {
        log::trace!("exec: {command}");

        let mut child = self
            .build(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait(&mut child, command.timeout)?;
        let timed_out = status == ExitStatus::TimedOut;

        let output = CommandOutput {
            stdout: collect(&stdout, timed_out),
            stderr: collect(&stderr, timed_out),
            status,
        };
        log::trace!("exit: {command} -> {}", output.status);
        Ok(output)
    }
}

/// Read a pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Output of a drained pipe. After a timeout, a pipe still held open by an
/// orphaned descendant is given up on.
fn collect(output: &Receiver<Vec<u8>>, timed_out: bool) -> Vec<u8> {
    if timed_out {
        output.recv_timeout(DRAIN_GRACE).unwrap_or_default()
    } else {
        output.recv().unwrap_or_default()
    }
}

/// Wait for `child`, killing it once `timeout` elapses
fn wait(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<ExitStatus> {
    let Some(timeout) = timeout else {
        return child.wait().map(exit_status);
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(exit_status(status));
        }
        if started.elapsed() >= timeout {
            log::warn!("Command exceeded {}s, killing it", timeout.as_secs());
            kill_group(child);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(ExitStatus::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the process group led by `child`
#[cfg(unix)]
fn kill_group(child: &Child) {
    let group = format!("-{}", child.id());
    let killed = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(killed, Ok(status) if status.success()) {
        log::debug!("could not kill process group {group}");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    status.code().map_or(ExitStatus::Signal, ExitStatus::Code)
}
