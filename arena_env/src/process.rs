//! Confined child processes speaking newline-delimited JSON.
//!
//! ```text
//! Judge                               Child (untrusted)
//!   |-- send(msg) --> stdin  ------------->|
//!   |                                      |-- compute
//!   |<------------- stdout <-- recv() -----|
//!   |
//!   |-- KillHandle::terminate() --> SIGKILL (any thread, any time)
//! ```

use crate::error::ExecError;
use crate::sandbox::{Jail, SandboxPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Handle that can forcibly terminate a child from any thread.
///
/// The pipes are split off the `Child` at spawn time, so killing never
/// has to wait for a blocked reader to give up its lock.
#[derive(Debug, Clone)]
pub struct KillHandle {
    /// Shared child handle
    child: Arc<Mutex<Child>>,

    /// OS process id (for logging)
    pid: u32,
}

impl KillHandle {
    /// Kills the child if it is still running and reaps it.
    ///
    /// Returns true if this call actually had to kill the process.
    pub fn terminate(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.try_wait() {
            Ok(Some(_status)) => false,
            Ok(None) | Err(_) => {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill child {}: {}", self.pid, e);
                    return false;
                }
                let _ = child.wait();
                debug!("Killed child {}", self.pid);
                true
            }
        }
    }

    /// Returns true while the child has not exited.
    pub fn is_running(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(child.try_wait(), Ok(None))
    }

    /// Returns the child's process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Collects kill handles so every child a match started can be torn down
/// explicitly when the match ends, including children whose calls were
/// abandoned after a timeout.
#[derive(Debug, Clone, Default)]
pub struct Reaper {
    /// Registered children
    handles: Arc<Mutex<Vec<KillHandle>>>,
}

impl Reaper {
    /// Creates an empty reaper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a child for teardown.
    pub fn register(&self, handle: KillHandle) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Returns the number of registered children.
    pub fn len(&self) -> usize {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no child has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kills every registered child that is still running.
    ///
    /// Returns how many had to be killed.
    pub fn reap(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        let killed = handles.iter().filter(|handle| handle.terminate()).count();
        if killed > 0 {
            debug!("Reaped {} stray children", killed);
        }
        killed
    }
}

/// A confined child process with a JSON-lines channel on stdin/stdout.
///
/// The child is killed when this value is dropped.
pub struct IsolatedProcess {
    /// Requests to the child
    stdin: BufWriter<ChildStdin>,

    /// Replies from the child
    stdout: BufReader<ChildStdout>,

    /// Kill switch shared with the judge
    killer: KillHandle,

    /// Private root; removed only after the child is gone
    _jail: Option<Jail>,
}

impl IsolatedProcess {
    /// Spawns `program` with `args` under `policy`.
    ///
    /// The child's stderr is discarded; stdout is reserved for the protocol.
    /// When the policy isolates, `program` is resolved to an absolute path
    /// first, since the child looks it up from inside its private root.
    pub fn spawn(program: &Path, args: &[String], policy: &SandboxPolicy) -> Result<Self, ExecError> {
        let program = if policy.isolate {
            std::fs::canonicalize(program)
                .map_err(|e| ExecError::Spawn(format!("{}: {}", program.display(), e)))?
        } else {
            program.to_path_buf()
        };
        let program = program.as_path();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let jail = policy.confine(&mut cmd, program)?;

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {}", program.display(), e)))?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecError::Spawn("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Spawn("child stdout not captured".to_string()))?;

        debug!("Spawned confined child {} ({})", pid, program.display());

        Ok(Self {
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            killer: KillHandle {
                child: Arc::new(Mutex::new(child)),
                pid,
            },
            _jail: jail,
        })
    }

    /// Sends one message as a single JSON line.
    pub fn send<M: Serialize>(&mut self, message: &M) -> Result<(), ExecError> {
        let line = serde_json::to_string(message).map_err(ExecError::protocol)?;
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.write_all(b"\n"))
            .and_then(|_| self.stdin.flush())
            .map_err(|e| ExecError::transport(format!("write to child {}: {}", self.pid(), e)))
    }

    /// Blocks until the child writes one JSON line and decodes it.
    pub fn recv<M: DeserializeOwned>(&mut self) -> Result<M, ExecError> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| ExecError::transport(format!("read from child {}: {}", self.pid(), e)))?;

        if read == 0 {
            return Err(ExecError::transport(format!(
                "child {} closed its output",
                self.pid()
            )));
        }

        serde_json::from_str(line.trim_end()).map_err(ExecError::protocol)
    }

    /// Returns a handle that can kill this child from elsewhere.
    pub fn kill_handle(&self) -> KillHandle {
        self.killer.clone()
    }

    /// Returns the child's process id.
    pub fn pid(&self) -> u32 {
        self.killer.pid
    }
}

impl Drop for IsolatedProcess {
    fn drop(&mut self) {
        self.killer.terminate();
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
        body: String,
    }

    fn cat() -> PathBuf {
        PathBuf::from("/bin/cat")
    }

    fn shell(script: &str, policy: &SandboxPolicy) -> Result<IsolatedProcess, ExecError> {
        IsolatedProcess::spawn(Path::new("/bin/sh"), &["-c".to_string(), script.to_string()], policy)
    }

    fn wait_for_exit(handle: &KillHandle) {
        let started = Instant::now();
        while handle.is_running() && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_echo_roundtrip_through_cat() {
        let mut process = IsolatedProcess::spawn(&cat(), &[], &SandboxPolicy::default()).unwrap();

        let ping = Ping {
            seq: 1,
            body: "hello".to_string(),
        };
        process.send(&ping).unwrap();
        let echoed: Ping = process.recv().unwrap();

        assert_eq!(echoed, ping);
    }

    #[test]
    fn test_kill_handle_terminates_child() {
        let mut process = IsolatedProcess::spawn(&cat(), &[], &SandboxPolicy::default()).unwrap();
        let handle = process.kill_handle();

        assert!(handle.is_running());
        assert!(handle.terminate());
        assert!(!handle.is_running());

        // Second terminate is a no-op
        assert!(!handle.terminate());

        let result: Result<Ping, _> = process.recv();
        assert!(matches!(result, Err(ExecError::Transport(_))));
    }

    #[test]
    fn test_reaper_kills_registered_children() {
        let first = IsolatedProcess::spawn(&cat(), &[], &SandboxPolicy::default()).unwrap();
        let second = IsolatedProcess::spawn(&cat(), &[], &SandboxPolicy::default()).unwrap();

        let reaper = Reaper::new();
        reaper.register(first.kill_handle());
        reaper.register(second.kill_handle());
        assert_eq!(reaper.len(), 2);

        // One exits on its own first
        second.kill_handle().terminate();

        assert_eq!(reaper.reap(), 1);
        assert!(reaper.is_empty());
        assert!(!first.kill_handle().is_running());
    }

    #[test]
    fn test_garbage_reply_is_protocol_error() {
        let mut process = IsolatedProcess::spawn(&cat(), &[], &SandboxPolicy::default()).unwrap();
        process.send(&"not a ping").unwrap();

        let result: Result<Ping, _> = process.recv();
        assert!(matches!(result, Err(ExecError::Protocol(_))));
    }

    #[test]
    fn test_spawn_missing_program() {
        let result = IsolatedProcess::spawn(
            Path::new("/definitely/not/here"),
            &[],
            &SandboxPolicy::default(),
        );
        assert!(matches!(result, Err(ExecError::Spawn(_))));
    }

    #[test]
    fn test_confined_child_cannot_read_or_delete_host_files() {
        let host = tempfile::tempdir().unwrap();
        let secret = host.path().join("secret");
        let victim = host.path().join("victim");
        std::fs::write(&secret, "TOPSECRET").unwrap();
        std::fs::write(&victim, "keep me").unwrap();

        let script = format!(
            r#"if read line < '{}'; then echo "\"$line\""; else echo '"sealed"'; fi
exec rm -f '{}'"#,
            secret.display(),
            victim.display()
        );
        let mut process = shell(&script, &SandboxPolicy::default()).unwrap();

        let seen: String = process.recv().unwrap();
        assert_eq!(seen, "sealed");

        wait_for_exit(&process.kill_handle());
        assert!(victim.exists());
    }

    #[test]
    fn test_confined_child_has_no_network() {
        let bash = Path::new("/bin/bash");
        if !bash.exists() {
            return;
        }

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let script = format!(
            r#"echo exfil > /dev/tcp/127.0.0.1/{} && echo '"connected"' || echo '"offline"'"#,
            port
        );
        let mut process = IsolatedProcess::spawn(
            bash,
            &["-c".to_string(), script],
            &SandboxPolicy::default(),
        )
        .unwrap();

        let seen: String = process.recv().unwrap();
        assert_eq!(seen, "offline");
        assert!(matches!(
            listener.accept(),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
        ));
    }

    #[test]
    fn test_permissive_child_shares_host_files() {
        let host = tempfile::tempdir().unwrap();
        let secret = host.path().join("secret");
        std::fs::write(&secret, "visible").unwrap();

        let script = format!(r#"read line < '{}'; echo "\"$line\"""#, secret.display());
        let mut process = shell(&script, &SandboxPolicy::permissive()).unwrap();

        let seen: String = process.recv().unwrap();
        assert_eq!(seen, "visible");
    }

    #[test]
    fn test_unusable_scratch_dir_fails_closed() {
        let policy = SandboxPolicy {
            working_dir: Some(PathBuf::from("/definitely/not/here")),
            ..SandboxPolicy::default()
        };

        match IsolatedProcess::spawn(&cat(), &[], &policy) {
            Err(ExecError::Spawn(detail)) => assert!(detail.contains("private root"), "{}", detail),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("child ran without its private root"),
        }
    }
}
