//! Runner abstraction: the capability that provisions an instance's
//! environment and executes commands inside it.
//!
//! `Runner` is the trait the engine and session bodies go through.
//! `ShellRunner` is the production implementation that spawns processes.
//! `MockRunner` is the test double that records calls and returns preset
//! responses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::session::SessionInstance;

/// Number of trailing stderr lines kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A provisioned execution environment for one instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    pub interpreter: Option<String>,
    /// Resolved interpreter executable, when the instance has one.
    pub python: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub env_vars: BTreeMap<String, String>,
}

impl Environment {
    /// Bare environment for an instance: interpreter tag and session vars only.
    pub fn for_instance(instance: &SessionInstance) -> Self {
        let mut env_vars = BTreeMap::new();
        env_vars.insert("MRUN_SESSION".to_string(), instance.display_id.clone());
        if let Some(python) = &instance.interpreter {
            env_vars.insert("MRUN_PYTHON".to_string(), python.clone());
        }
        Environment {
            interpreter: instance.interpreter.clone(),
            python: None,
            working_dir: None,
            env_vars,
        }
    }

    /// The interpreter command used for installs.
    pub fn python_command(&self) -> String {
        match &self.python {
            Some(path) => path.to_string_lossy().into_owned(),
            None => "python3".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Provisions environments and executes commands for session instances.
pub trait Runner: Send + Sync {
    /// Prepare the environment for an instance. An error is a provisioning
    /// fault: the instance never starts its body.
    fn provision(&self, instance: &SessionInstance) -> Result<Environment, String>;

    /// Run `argv` in the environment, returning stdout on success.
    fn run(&self, env: &Environment, argv: &[String]) -> Result<String, String>;

    /// Install packages into the environment.
    fn install(&self, env: &Environment, packages: &[String]) -> Result<(), String>;
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn provision(&self, instance: &SessionInstance) -> Result<Environment, String> {
        (**self).provision(instance)
    }

    fn run(&self, env: &Environment, argv: &[String]) -> Result<String, String> {
        (**self).run(env, argv)
    }

    fn install(&self, env: &Environment, packages: &[String]) -> Result<(), String> {
        (**self).install(env, packages)
    }
}

// ---------------------------------------------------------------------------
// ShellRunner
// ---------------------------------------------------------------------------

/// Production runner that spawns processes directly (no shell).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    working_dir: Option<PathBuf>,
    install: bool,
}

impl ShellRunner {
    pub fn new() -> Self {
        ShellRunner {
            working_dir: None,
            install: true,
        }
    }

    /// Run every command from this directory.
    pub fn working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Turn installs into no-ops.
    pub fn skip_install(mut self) -> Self {
        self.install = false;
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for ShellRunner {
    fn provision(&self, instance: &SessionInstance) -> Result<Environment, String> {
        let mut env = Environment::for_instance(instance);
        env.working_dir = self.working_dir.clone();
        if let Some(version) = &instance.interpreter {
            let program = format!("python{}", version);
            let path = find_on_path(&program)
                .ok_or_else(|| format!("interpreter '{}' not found on PATH", program))?;
            debug!(session = %instance.display_id, python = %path.display(), "resolved interpreter");
            env.python = Some(path);
        }
        Ok(env)
    }

    fn run(&self, env: &Environment, argv: &[String]) -> Result<String, String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;
        let mut cmd = Command::new(program);
        cmd.args(args).envs(&env.env_vars);
        if let Some(dir) = &env.working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .map_err(|e| format!("failed to execute '{}': {}", program, e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let status = match output.status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            };
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr_tail(&stderr, STDERR_TAIL_LINES);
            if tail.is_empty() {
                Err(status)
            } else {
                Err(format!("{}: {}", status, tail))
            }
        }
    }

    fn install(&self, env: &Environment, packages: &[String]) -> Result<(), String> {
        if !self.install {
            debug!(packages = %packages.join(" "), "install skipped");
            return Ok(());
        }
        let mut argv = vec![
            env.python_command(),
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
        ];
        argv.extend(packages.iter().cloned());
        self.run(env, &argv).map(|_| ())
    }
}

/// Locate an executable by name on `PATH`.
fn find_on_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// Test-double runner that records calls and returns pre-configured responses.
///
/// Queued responses are consumed in call order; scripted responses keyed by
/// the exact command line take precedence and are not consumed, which keeps
/// parallel runs deterministic.
#[derive(Debug, Default)]
pub struct MockRunner {
    responses: Mutex<Vec<Result<String, String>>>,
    scripted: Mutex<HashMap<String, Result<String, String>>>,
    missing_interpreters: HashSet<String>,
    commands: Mutex<Vec<String>>,
    installs: Mutex<Vec<String>>,
    provisioned: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        MockRunner {
            responses: Mutex::new(reversed),
            ..MockRunner::default()
        }
    }

    /// Always answer `command` (argv joined by spaces) with `response`.
    pub fn script(self, command: &str, response: Result<String, String>) -> Self {
        lock(&self.scripted).insert(command.to_string(), response);
        self
    }

    /// Make provisioning fail for instances with this interpreter.
    pub fn without_interpreter(mut self, version: &str) -> Self {
        self.missing_interpreters.insert(version.to_string());
        self
    }

    pub fn executed_commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn installed_packages(&self) -> Vec<String> {
        lock(&self.installs).clone()
    }

    /// Display ids of provisioned instances, in provisioning order.
    pub fn provisioned(&self) -> Vec<String> {
        lock(&self.provisioned).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Runner for MockRunner {
    fn provision(&self, instance: &SessionInstance) -> Result<Environment, String> {
        if let Some(version) = &instance.interpreter {
            if self.missing_interpreters.contains(version) {
                return Err(format!("interpreter 'python{}' not found on PATH", version));
            }
        }
        lock(&self.provisioned).push(instance.display_id.clone());
        Ok(Environment::for_instance(instance))
    }

    fn run(&self, _env: &Environment, argv: &[String]) -> Result<String, String> {
        let cmd = argv.join(" ");
        lock(&self.commands).push(cmd.clone());
        if let Some(response) = lock(&self.scripted).get(&cmd) {
            return response.clone();
        }
        lock(&self.responses).pop().unwrap_or_else(|| Ok(String::new()))
    }

    fn install(&self, _env: &Environment, packages: &[String]) -> Result<(), String> {
        lock(&self.installs).extend(packages.iter().cloned());
        Ok(())
    }
}
