//! External-process metric runners
//!
//! Each model is a program that takes the audio path as its last argument
//! and prints its result as JSON on the last non-empty line of stdout:
//! a number, `null`, or an object of sub-metric name to number/`null`.
//! Anything printed before that line (model download chatter, warnings)
//! is ignored.

use super::{InitError, MetricOutput, MetricRunner, MetricSuite, SuiteLoader};
use super::{SIGMOS, SRMR, VQSCORE, WVMOS};
use crate::config::{RunnerCommand, RunnerConfig};
use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runner that shells out to a model program
#[derive(Debug, Clone)]
pub struct CommandRunner {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(name: &str, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            program,
            args,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

impl MetricRunner for CommandRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, path: &Path) -> Result<MetricOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(path);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(metric = %self.name, program = %self.program.display(), "Running metric");
        let output = cmd
            .output()
            .with_context(|| format!("Could not run {} ({})", self.name, self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output");
            return Err(anyhow!("{}", stderr.trim_end()).context(format!(
                "{} exited with {}: {}",
                self.name,
                output.status,
                last.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_output(&stdout).with_context(|| format!("Unreadable {} output", self.name))
    }
}

/// Parse the JSON result line printed by a model program
pub fn parse_output(stdout: &str) -> Result<MetricOutput> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("program printed nothing"))?;

    let value: Value =
        serde_json::from_str(line).with_context(|| format!("not JSON: {line}"))?;

    match value {
        Value::Object(map) => {
            let mut scores = Vec::with_capacity(map.len());
            for (name, v) in map {
                let score = score_value(&v).with_context(|| format!("sub-score {name}"))?;
                scores.push((name, score));
            }
            Ok(MetricOutput::SubScores(scores))
        }
        other => Ok(MetricOutput::Score(score_value(&other)?)),
    }
}

fn score_value(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| anyhow!("score out of range: {n}")),
        other => bail!("expected a number or null, got {other}"),
    }
}

/// Locate a program the way a shell would
///
/// Names containing a path separator are resolved against `working_dir`
/// (when relative); bare names are searched on `PATH`.
pub fn resolve_program(program: &str, working_dir: Option<&Path>) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let full = match working_dir {
            Some(dir) if candidate.is_relative() => dir.join(candidate),
            _ => candidate.to_path_buf(),
        };
        return is_executable(&full).then_some(full);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| executable_names(program).map(move |name| dir.join(name)))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn executable_names(program: &str) -> impl Iterator<Item = String> + '_ {
    ["", ".exe", ".cmd", ".bat"]
        .into_iter()
        .map(move |ext| format!("{program}{ext}"))
}

#[cfg(not(windows))]
fn executable_names(program: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(program.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Loads the four [`CommandRunner`]s from [`RunnerConfig`]
#[derive(Debug, Clone)]
pub struct CommandSuiteLoader {
    config: RunnerConfig,
}

impl CommandSuiteLoader {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn runner(&self, name: &str, command: &RunnerCommand) -> Result<CommandRunner, InitError> {
        let working_dir = self.config.working_dir.as_deref();
        let program = resolve_program(&command.program, working_dir).ok_or_else(|| {
            InitError::ProgramNotFound {
                metric: name.to_string(),
                program: command.program.clone(),
            }
        })?;

        let runner = CommandRunner::new(name, program, command.args.clone());
        Ok(match working_dir {
            Some(dir) => runner.with_working_dir(dir.to_path_buf()),
            None => runner,
        })
    }
}

impl SuiteLoader for CommandSuiteLoader {
    fn load(&self) -> Result<MetricSuite, InitError> {
        if let Some(dir) = &self.config.working_dir {
            if !dir.is_dir() {
                return Err(InitError::WorkingDirMissing(dir.clone()));
            }
        }

        Ok(MetricSuite::new(
            Box::new(self.runner(SRMR, &self.config.srmr)?),
            Box::new(self.runner(SIGMOS, &self.config.sigmos)?),
            Box::new(self.runner(VQSCORE, &self.config.vqscore)?),
            Box::new(self.runner(WVMOS, &self.config.wvmos)?),
        ))
    }
}
