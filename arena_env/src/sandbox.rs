//! Capability tokens and the sandbox policy applied to untrusted children.

use crate::error::ExecError;
#[cfg(target_os = "linux")]
pub(crate) use crate::jail::Jail;
#[cfg(target_os = "linux")]
use crate::jail::JailEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Value-level capability token.
///
/// The loader decides which token applies to a competitor and passes it
/// along explicitly. Nothing in the process is switched into a global
/// "untrusted mode", so the judge's own I/O (trace and result writing)
/// is never affected by the restrictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Code from the host's own trusted code space, no boundary applied
    Trusted,

    /// Code from an external artifact, confined by the given policy
    Restricted(SandboxPolicy),
}

impl Capability {
    /// Returns true for the trusted token.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Capability::Trusted)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Trusted => write!(f, "trusted"),
            Capability::Restricted(_) => write!(f, "restricted"),
        }
    }
}

/// Restrictions applied to a confined child process.
///
/// With `isolate` set (the default) the child gets fresh user, mount, IPC
/// and network namespaces and a private root holding only
/// `read_only_paths` and the program itself, all mounted read-only. It has
/// no network beyond an unconfigured loopback device and cannot see or
/// touch any other host file. Isolation is Linux-only; elsewhere, or when
/// the kernel refuses it, the spawn fails instead of running the child
/// unconfined.
///
/// Resource ceilings are installed with `setrlimit` between `fork` and
/// `exec`, so they bind the child for its whole lifetime and never touch
/// the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Address space ceiling in bytes (None = inherit)
    pub max_address_space_bytes: Option<u64>,

    /// CPU time ceiling in seconds (None = inherit)
    pub max_cpu_secs: Option<u64>,

    /// Open file descriptor ceiling (None = inherit)
    pub max_open_files: Option<u64>,

    /// Allow the child to fork/spawn further processes or threads
    pub allow_subprocesses: bool,

    /// Allow the child to write regular files
    pub allow_file_writes: bool,

    /// Run the child in its own namespaces and private root
    pub isolate: bool,

    /// Host paths visible read-only inside the private root
    pub read_only_paths: Vec<PathBuf>,

    /// Where private roots are created, or the working directory when not
    /// isolating (None = system temp dir)
    pub working_dir: Option<PathBuf>,

    /// PATH handed to the otherwise empty environment
    pub path_env: String,
}

/// System directories a dynamically linked program needs to start.
const SYSTEM_PATHS: &[&str] = &["/usr", "/bin", "/lib", "/lib64", "/etc/ld.so.cache"];

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            max_address_space_bytes: Some(1024 * 1024 * 1024), // 1 GiB
            max_cpu_secs: Some(900), // 5000 ticks * 150ms, plus loading
            max_open_files: Some(32),
            allow_subprocesses: false,
            allow_file_writes: false,
            isolate: true,
            read_only_paths: SYSTEM_PATHS.iter().map(PathBuf::from).collect(),
            working_dir: None,
            path_env: "/usr/local/bin:/usr/bin:/bin".to_string(),
        }
    }
}

impl SandboxPolicy {
    /// A policy that only sanitises the environment. The child shares the
    /// judge's filesystem and network.
    pub fn permissive() -> Self {
        Self {
            max_address_space_bytes: None,
            max_cpu_secs: None,
            max_open_files: None,
            allow_subprocesses: true,
            allow_file_writes: true,
            isolate: false,
            read_only_paths: Vec::new(),
            working_dir: None,
            path_env: "/usr/local/bin:/usr/bin:/bin".to_string(),
        }
    }

    /// Makes `path` visible read-only inside the private root.
    pub fn with_read_only_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.read_only_paths.push(path.into());
        self
    }

    /// Configures `cmd` so the spawned child runs `program` under this
    /// policy.
    ///
    /// Returns the child's private root, which must be kept alive until
    /// the child has exited.
    pub(crate) fn confine(&self, cmd: &mut Command, program: &Path) -> Result<Option<Jail>, ExecError> {
        cmd.env_clear();
        cmd.env("PATH", &self.path_env);

        let scratch = self.working_dir.clone().unwrap_or_else(std::env::temp_dir);
        if !self.isolate {
            cmd.current_dir(&scratch);
            #[cfg(target_os = "linux")]
            self.install_pre_exec(cmd, None);
            return Ok(None);
        }

        self.isolate_into(cmd, program, &scratch)
    }

    #[cfg(target_os = "linux")]
    fn isolate_into(&self, cmd: &mut Command, program: &Path, scratch: &Path) -> Result<Option<Jail>, ExecError> {
        let mut exposed = self.read_only_paths.clone();
        exposed.push(program.to_path_buf());

        let (jail, entry) = Jail::prepare(scratch, &exposed, self.allow_file_writes)?;
        self.install_pre_exec(cmd, Some(entry));
        Ok(Some(jail))
    }

    #[cfg(not(target_os = "linux"))]
    fn isolate_into(&self, _cmd: &mut Command, program: &Path, _scratch: &Path) -> Result<Option<Jail>, ExecError> {
        Err(ExecError::Spawn(format!(
            "{}: namespace isolation is only available on Linux",
            program.display()
        )))
    }

    #[cfg(target_os = "linux")]
    fn install_pre_exec(&self, cmd: &mut Command, entry: Option<JailEntry>) {
        use nix::sys::resource::{setrlimit, Resource};
        use std::os::unix::process::CommandExt;

        // Copied out so the pre-exec hook does not allocate.
        let address_space = self.max_address_space_bytes;
        let cpu_secs = self.max_cpu_secs;
        let open_files = self.max_open_files;
        let no_subprocesses = !self.allow_subprocesses;
        let no_file_writes = !self.allow_file_writes;

        // SAFETY: the hook only issues unshare, mount, chroot, prctl and
        // setrlimit syscalls on data prepared before the fork, and touches
        // no shared state.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(entry) = &entry {
                    entry.enter().map_err(std::io::Error::from)?;
                }
                setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(std::io::Error::from)?;
                if let Some(bytes) = address_space {
                    setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(std::io::Error::from)?;
                }
                if let Some(secs) = cpu_secs {
                    setrlimit(Resource::RLIMIT_CPU, secs, secs).map_err(std::io::Error::from)?;
                }
                if let Some(files) = open_files {
                    setrlimit(Resource::RLIMIT_NOFILE, files, files)
                        .map_err(std::io::Error::from)?;
                }
                if no_subprocesses {
                    setrlimit(Resource::RLIMIT_NPROC, 0, 0).map_err(std::io::Error::from)?;
                }
                if no_file_writes {
                    setrlimit(Resource::RLIMIT_FSIZE, 0, 0).map_err(std::io::Error::from)?;
                }
                Ok(())
            });
        }
    }
}

/// Placeholder for platforms without private roots; never constructed.
#[cfg(not(target_os = "linux"))]
#[derive(Debug)]
pub enum Jail {}
