// SPDX-License-Identifier: MIT

//! `SubprocessWorker` — spawns the configured binary under the sandbox
//! wrapper with an argument list, never a shell string.

use crate::worker::{StepContext, StepOutcome, Worker};
use async_trait::async_trait;
use oj_core::ErrorInfo;
use oj_workspace::{build_child_env, preflight, PreflightError};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Maps a step's `agent` name to the concrete binary and argument template
/// invoked for it. `{prompt}` and `{workdir}` in `args` are substituted
/// with the step's prompt text and the materialized workspace path.
#[derive(Debug, Clone)]
pub struct AgentBinary {
    pub binary: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubprocessWorker {
    binaries: BTreeMap<String, AgentBinary>,
    enable_real_cli: bool,
    min_versions: BTreeMap<String, (String, String)>,
}

impl SubprocessWorker {
    pub fn new(enable_real_cli: bool) -> Self {
        Self { binaries: BTreeMap::new(), enable_real_cli, min_versions: BTreeMap::new() }
    }

    pub fn with_agent(mut self, agent: impl Into<String>, binary: AgentBinary) -> Self {
        self.binaries.insert(agent.into(), binary);
        self
    }

    pub fn with_min_versions(mut self, versions: BTreeMap<String, (String, String)>) -> Self {
        self.min_versions = versions;
        self
    }

    fn render_args(template: &[String], prompt: &str, workdir: &std::path::Path) -> Vec<String> {
        template
            .iter()
            .map(|arg| arg.replace("{prompt}", prompt).replace("{workdir}", &workdir.display().to_string()))
            .collect()
    }
}

#[async_trait]
impl Worker for SubprocessWorker {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let Some(binary) = self.binaries.get(&ctx.step.agent) else {
            return StepOutcome::failed(ErrorInfo::new(
                "worker_not_found",
                format!("no binary mapping registered for agent {:?}", ctx.step.agent),
            ));
        };

        if let Err(e) =
            preflight(&binary.binary, self.enable_real_cli, &ctx.policy, &self.min_versions)
        {
            let code = match e {
                PreflightError::BinaryNotAllowed(_) => "policy_violation",
                PreflightError::SandboxWrapperRequired | PreflightError::NetworkDenyRequiresWrapper => {
                    "policy_violation"
                }
                PreflightError::VersionTooOld { .. } | PreflightError::VersionCheckFailed { .. } => {
                    "preflight_failed"
                }
            };
            return StepOutcome::failed(ErrorInfo::new(code, e.to_string()));
        }

        let args = Self::render_args(&binary.args, &ctx.step.prompt, &ctx.workspace_dir);
        let parent_env: BTreeMap<String, String> = std::env::vars().collect();
        let child_env = build_child_env(&parent_env, &ctx.policy);

        let mut command = if let Some(wrapper) = &ctx.policy.sandbox_wrapper {
            let mut cmd = Command::new(wrapper);
            cmd.args(&ctx.policy.sandbox_wrapper_args);
            cmd.arg(&binary.binary);
            cmd.args(&args);
            cmd
        } else {
            let mut cmd = Command::new(&binary.binary);
            cmd.args(&args);
            cmd
        };

        command
            .current_dir(&ctx.workspace_dir)
            .env_clear()
            .envs(&child_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return StepOutcome::failed(ErrorInfo::new(
                    "subprocess_exit_nonzero",
                    format!("failed to spawn {:?}: {e}", binary.binary),
                ));
            }
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let wait_result = tokio::select! {
            status = child.wait() => status,
            _ = ctx.cancel.cancelled() => {
                let _ = child.kill().await;
                return StepOutcome::failed(ErrorInfo::new("timeout", "subprocess cancelled before exit"));
            }
        };

        let mut combined = String::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_string(&mut combined).await;
        }
        if let Some(err) = stderr.as_mut() {
            let mut err_text = String::new();
            let _ = err.read_to_string(&mut err_text).await;
            combined.push_str(&err_text);
        }
        let combined = ctx.redactor.redact(&combined);

        let status = match wait_result {
            Ok(status) => status,
            Err(e) => {
                return StepOutcome::failed(ErrorInfo::new(
                    "subprocess_exit_nonzero",
                    format!("wait failed: {e}"),
                ));
            }
        };

        if let Err(e) = write_artifacts(ctx, &combined, status.code().unwrap_or(-1)) {
            return StepOutcome::failed(ErrorInfo::new(
                "worker_contract_violation",
                format!("failed to write step artifacts: {e}"),
            ));
        }

        if status.success() {
            StepOutcome::ok()
        } else {
            StepOutcome::failed(ErrorInfo::new(
                "subprocess_exit_nonzero",
                format!("{} exited with status {:?}", binary.binary, status.code()),
            ))
        }
    }
}

fn write_artifacts(ctx: &StepContext, logs: &str, exit_code: i32) -> std::io::Result<()> {
    std::fs::create_dir_all(&ctx.step_dir)?;
    std::fs::write(ctx.step_dir.join("logs.txt"), logs)?;
    std::fs::write(
        ctx.step_dir.join("report.md"),
        format!("# Step {}\n\nsubprocess exit code: {exit_code}\n", ctx.step.step_id),
    )?;
    // Subprocess workers do not themselves compute a diff; an empty patch
    // still satisfies the worker contract's "three required files" check.
    // A worker that wraps a code-editing agent would populate this from
    // `git diff` inside `ctx.workspace_dir`.
    let diff_path = ctx.step_dir.join("patch.diff");
    if !diff_path.exists() {
        std::fs::write(diff_path, "")?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
