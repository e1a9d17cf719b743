//! Task scheduler
//!
//! This module launches resolved tasks as child processes under a [`RunPolicy`],
//! supervises them until they reach a terminal state, enforces the error policy
//! and aggregates the outcomes.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::execution::command::TaskLauncher;
use crate::execution::output::{OutputSink, OutputStream};
use crate::header::create_header;
use crate::policy::{ExecutionMode, RunPolicy};
use crate::registry::TaskRegistry;
use crate::results::{aggregate, RunResult, TaskOutcome};
use crate::tasks::TaskSpec;
use crate::types::{RunAllError, RunAllResult};

/// Environment variable exposing the name of the task being run
pub const TASK_NAME_ENV: &str = "npm_lifecycle_event";

/// Lifecycle of a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Starting,
    Running,
    Succeeded,
    Failed,
}

/// Lifecycle of a whole invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// How children get their standard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// Sequential tasks share the real stdin; in parallel mode only the first
    /// launched task gets it
    Inherit,
    Null,
}

/// Shared resources handed to every task
#[derive(Clone)]
pub struct ExecutionContext {
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub stdin: StdinMode,
    pub working_dir: Option<PathBuf>,
    /// Extra variables added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub colorize: bool,
}

impl ExecutionContext {
    /// The invocation's own stdio, environment and working directory
    pub fn inherited() -> Self {
        Self {
            stdout: OutputStream::stdout(),
            stderr: OutputStream::stderr(),
            stdin: StdinMode::Inherit,
            working_dir: None,
            env: Vec::new(),
            colorize: std::io::stdout().is_terminal(),
        }
    }
}

/// A launched task: waits for its terminal state and can be asked to stop
pub struct TaskHandle {
    task: TaskSpec,
    child: Child,
    pumps: Vec<JoinHandle<std::io::Result<()>>>,
    started_at: Instant,
    cancelled: bool,
    /// The task leads its own process group, so termination reaches its descendants
    own_group: bool,
}

impl TaskHandle {
    fn spawn(
        task: TaskSpec,
        mut command: Command,
        stdout_sink: OutputSink,
        stderr_sink: OutputSink,
        started_at: Instant,
        own_group: bool,
    ) -> RunAllResult<Self> {
        let mut child = command.spawn().map_err(|e| {
            RunAllError::Launch(format!("Failed to spawn task '{}': {}", task.name, e))
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(stdout_sink.collect(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(stderr_sink.collect(stderr)));
        }

        debug!(task = %task.raw_invocation, pid = ?child.id(), state = ?TaskState::Running, "task spawned");
        Ok(Self {
            task,
            child,
            pumps,
            started_at,
            cancelled: false,
            own_group,
        })
    }

    /// Ask the process to terminate gracefully
    pub fn terminate(&mut self) {
        self.cancelled = true;

        if send_sigterm(&self.child, self.own_group) {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            debug!(task = %self.task.name, error = %e, "failed to kill task");
        }
    }

    /// Wait for the process to exit, terminating it if `cancel` fires first
    pub async fn wait(mut self, mut cancel: watch::Receiver<bool>) -> TaskOutcome {
        enum Wake {
            Exited(std::io::Result<ExitStatus>),
            Cancel,
        }

        let wake = tokio::select! {
            status = self.child.wait() => Wake::Exited(status),
            () = cancellation(&mut cancel) => Wake::Cancel,
        };
        let status = match wake {
            Wake::Exited(status) => status,
            Wake::Cancel => {
                self.terminate();
                self.child.wait().await
            }
        };

        // A terminated task may leave grandchildren holding its pipes open
        for pump in self.pumps.drain(..) {
            if self.cancelled {
                pump.abort();
                continue;
            }
            match pump.await {
                Ok(Err(e)) => debug!(task = %self.task.name, error = %e, "output pump failed"),
                Err(e) => debug!(task = %self.task.name, error = %e, "output pump aborted"),
                Ok(Ok(())) => {}
            }
        }

        match status {
            Ok(status) => {
                let outcome = TaskOutcome::from_exit_status(
                    self.task,
                    status,
                    self.cancelled,
                    self.started_at,
                );
                let state = if outcome.succeeded {
                    TaskState::Succeeded
                } else {
                    TaskState::Failed
                };
                let elapsed_ms = outcome.duration().as_millis() as u64;
                info!(
                    task = %outcome.task.raw_invocation,
                    code = ?outcome.exit_code,
                    signal = ?outcome.signal,
                    elapsed_ms,
                    state = ?state,
                    "task exited"
                );
                outcome
            }
            Err(e) => {
                let error = RunAllError::Io(e);
                warn!(task = %self.task.name, error = %error, "failed to wait for task");
                TaskOutcome::launch_failed(self.task, &error, self.started_at)
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child, own_group: bool) -> bool {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    let pid = Pid::from_raw(pid);
    if own_group {
        killpg(pid, Signal::SIGTERM).is_ok()
    } else {
        kill(pid, Signal::SIGTERM).is_ok()
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child, _own_group: bool) -> bool {
    false
}

/// Start the task as the leader of a new process group. A task reading the
/// terminal stays in the foreground group, otherwise reads would stop it.
#[cfg(unix)]
fn isolate_process_group(command: &mut Command, reads_terminal: bool) -> bool {
    if reads_terminal {
        return false;
    }
    command.process_group(0);
    true
}

#[cfg(not(unix))]
fn isolate_process_group(_command: &mut Command, _reads_terminal: bool) -> bool {
    false
}

/// Resolves once cancellation has been requested; never resolves if the
/// sender is gone without requesting it
async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Runs tasks under a policy
pub struct TaskRunner {
    launcher: Arc<dyn TaskLauncher>,
    registry: Arc<TaskRegistry>,
    context: ExecutionContext,
    policy: RunPolicy,
}

impl TaskRunner {
    pub fn new(
        launcher: Arc<dyn TaskLauncher>,
        registry: Arc<TaskRegistry>,
        context: ExecutionContext,
        policy: RunPolicy,
    ) -> Self {
        Self {
            launcher,
            registry,
            context,
            policy,
        }
    }

    /// Run `tasks` and wait until every started task has exited.
    ///
    /// Without `continue_on_error`, the first failure stops further launches and
    /// asks running tasks to terminate; tasks never launched end up in
    /// [`RunResult::skipped`].
    pub async fn run(&self, tasks: &[TaskSpec]) -> RunAllResult<RunResult> {
        self.policy.validate()?;

        let limit = self.policy.concurrency_limit(tasks.len());
        let label_width = tasks.iter().map(|t| t.name.chars().count()).max().unwrap_or(0);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut pending = tasks.iter().cloned().enumerate();
        let mut slots: Vec<Option<TaskOutcome>> = tasks.iter().map(|_| None).collect();
        let mut running = JoinSet::new();
        let mut stdin_given = false;
        let mut state = RunState::Idle;
        debug!(count = tasks.len(), limit, mode = ?self.policy.mode, state = ?state, "starting run");
        state = RunState::Running;

        loop {
            while state == RunState::Running && running.len() < limit {
                let Some((index, task)) = pending.next() else {
                    break;
                };

                let inherit_stdin = self.inherits_stdin(&mut stdin_given);
                let started_at = Instant::now();
                match self.launch(&task, inherit_stdin, label_width, started_at) {
                    Ok(handle) => {
                        let cancel = cancel_rx.clone();
                        running.spawn(async move { (index, handle.wait(cancel).await) });
                    }
                    Err(error) => {
                        warn!(task = %task.name, error = %error, "task failed to launch");
                        let outcome = TaskOutcome::launch_failed(task, &error, started_at);
                        running.spawn(async move { (index, outcome) });
                    }
                }
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (index, outcome) = joined.map_err(|e| RunAllError::Join(e.to_string()))?;

            if !outcome.succeeded && !self.policy.continue_on_error && state == RunState::Running {
                state = RunState::Cancelled;
                warn!(
                    task = %outcome.task.raw_invocation,
                    in_flight = running.len(),
                    "task failed, cancelling remaining tasks"
                );
                // Receivers live inside the running futures; a send error only
                // means nothing is left to cancel
                let _ = cancel_tx.send(true);
            }
            slots[index] = Some(outcome);
        }

        if state == RunState::Running {
            state = RunState::Completed;
        }
        let skipped: Vec<TaskSpec> = pending.map(|(_, task)| task).collect();
        debug!(state = ?state, skipped = skipped.len(), "run finished");

        Ok(aggregate(slots.into_iter().flatten().collect(), skipped))
    }

    /// Whether the next task inherits stdin
    fn inherits_stdin(&self, stdin_given: &mut bool) -> bool {
        match (self.context.stdin, self.policy.mode) {
            (StdinMode::Null, _) => false,
            (StdinMode::Inherit, ExecutionMode::Sequential) => true,
            (StdinMode::Inherit, ExecutionMode::Parallel) => !std::mem::replace(stdin_given, true),
        }
    }

    /// Print the header, build the command and spawn it
    fn launch(
        &self,
        task: &TaskSpec,
        inherit_stdin: bool,
        label_width: usize,
        started_at: Instant,
    ) -> RunAllResult<TaskHandle> {
        debug!(task = %task.raw_invocation, state = ?TaskState::Starting, "launching task");
        let entry = self.registry.get(&task.name);

        if !self.policy.silent {
            let header_entry = entry.filter(|_| self.policy.print_name);
            let header = create_header(&task.raw_invocation, header_entry, self.context.colorize);
            if let Err(e) = self.context.stdout.write_all(header.as_bytes()) {
                debug!(error = %e, "failed to print task header");
            }
        }

        let entry = entry.ok_or_else(|| {
            RunAllError::Launch(format!("Missing script: {}", task.name))
        })?;
        let mut command = self.launcher.command(task, entry)?;

        command
            .envs(self.context.env.iter().map(|(key, value)| (key, value)))
            .env(TASK_NAME_ENV, &task.name)
            .stdin(if inherit_stdin {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.context.working_dir {
            command.current_dir(dir);
        }
        let reads_terminal = inherit_stdin && std::io::stdin().is_terminal();
        let own_group = isolate_process_group(&mut command, reads_terminal);

        let stdout_sink = OutputSink::for_task(
            task,
            &self.policy,
            &self.context.stdout,
            label_width,
            self.context.colorize,
        );
        let stderr_sink = OutputSink::for_task(
            task,
            &self.policy,
            &self.context.stderr,
            label_width,
            self.context.colorize,
        );

        TaskHandle::spawn(
            task.clone(),
            command,
            stdout_sink,
            stderr_sink,
            started_at,
            own_group,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::execution::command::ShellLauncher;
    use crate::execution::output::MemoryBuffer;
    use crate::registry::TaskRegistryEntry;

    struct Harness {
        runner: TaskRunner,
        stdout: MemoryBuffer,
        stderr: MemoryBuffer,
    }

    fn harness(scripts: serde_json::Value, policy: RunPolicy) -> Harness {
        let registry = TaskRegistry::from_task_list(&scripts, None).unwrap();
        let (stdout_stream, stdout) = OutputStream::memory();
        let (stderr_stream, stderr) = OutputStream::memory();
        let context = ExecutionContext {
            stdout: stdout_stream,
            stderr: stderr_stream,
            stdin: StdinMode::Null,
            working_dir: None,
            env: vec![("RUNALL_TEST_MARKER".to_string(), "marker".to_string())],
            colorize: false,
        };
        let runner = TaskRunner::new(
            Arc::new(ShellLauncher::new()),
            Arc::new(registry),
            context,
            policy,
        );
        Harness {
            runner,
            stdout,
            stderr,
        }
    }

    fn tasks(names: &[&str]) -> Vec<TaskSpec> {
        names.iter().map(|n| TaskSpec::new(*n, Vec::new())).collect()
    }

    fn outcome_names(result: &RunResult) -> Vec<&str> {
        result.outcomes.iter().map(|o| o.task.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_sequential_stops_after_failure() {
        let h = harness(
            serde_json::json!({ "a": "exit 0", "b": "exit 3" }),
            RunPolicy::sequential(),
        );

        let result = h.runner.run(&tasks(&["b", "a"])).await.unwrap();

        assert_eq!(outcome_names(&result), vec!["b"]);
        assert_eq!(result.skipped, tasks(&["a"]));
        assert!(!result.overall_succeeded);
        assert_eq!(result.overall_exit_code, 3);
    }

    #[tokio::test]
    async fn test_sequential_continue_on_error_runs_everything() {
        let policy = RunPolicy {
            continue_on_error: true,
            ..RunPolicy::sequential()
        };
        let h = harness(
            serde_json::json!({ "a": "exit 2", "b": "exit 0", "c": "exit 5" }),
            policy,
        );

        let result = h.runner.run(&tasks(&["a", "b", "c"])).await.unwrap();

        assert_eq!(outcome_names(&result), vec!["a", "b", "c"]);
        assert!(result.skipped.is_empty());
        assert_eq!(result.overall_exit_code, 2);
    }

    #[tokio::test]
    async fn test_sequential_output_follows_task_order() {
        let h = harness(
            serde_json::json!({ "a": "printf a", "b": "printf b", "c": "printf c" }),
            RunPolicy {
                silent: false,
                ..RunPolicy::sequential()
            },
        );

        let result = h.runner.run(&tasks(&["c", "a", "b"])).await.unwrap();

        assert!(result.overall_succeeded);
        assert_eq!(h.stdout.contents(), "\n> c\n\nc\n> a\n\na\n> b\n\nb");
    }

    #[tokio::test]
    async fn test_parallel_success_regardless_of_finish_order() {
        let h = harness(
            serde_json::json!({ "a": "sleep 0.3", "b": "exit 0" }),
            RunPolicy::parallel(),
        );

        let result = h.runner.run(&tasks(&["a", "b"])).await.unwrap();

        assert!(result.overall_succeeded);
        assert_eq!(result.overall_exit_code, 0);
        assert_eq!(outcome_names(&result), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_parallel_failure_terminates_running_tasks() {
        let h = harness(
            serde_json::json!({ "slow": "sleep 30", "broken": "sleep 0.2; exit 4" }),
            RunPolicy::parallel(),
        );

        let started = Instant::now();
        let result = h.runner.run(&tasks(&["slow", "broken"])).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(outcome_names(&result), vec!["slow", "broken"]);
        let slow = &result.outcomes[0];
        assert!(slow.cancelled);
        assert!(!slow.succeeded);
        assert_eq!(slow.signal.as_deref(), Some("SIGTERM"));
        assert_eq!(result.overall_exit_code, 4);
    }

    /// Alive and not a zombie waiting to be reaped
    #[cfg(target_os = "linux")]
    fn process_is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancellation_reaches_forked_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("descendant.pid");
        let slow = format!("sleep 41 & echo $! > '{}'; wait", pid_file.display());
        let h = harness(
            serde_json::json!({ "slow": slow, "broken": "sleep 0.5; exit 4" }),
            RunPolicy::parallel(),
        );

        let result = h.runner.run(&tasks(&["slow", "broken"])).await.unwrap();

        assert!(result.outcomes[0].cancelled);
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while process_is_running(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!process_is_running(pid), "descendant {} survived cancellation", pid);
    }

    #[tokio::test]
    async fn test_parallel_bound_withholds_pending_tasks_after_failure() {
        let policy = RunPolicy {
            max_parallelism: Some(1),
            ..RunPolicy::parallel()
        };
        let h = harness(
            serde_json::json!({ "a": "exit 1", "b": "exit 0", "c": "exit 0" }),
            policy,
        );

        let result = h.runner.run(&tasks(&["a", "b", "c"])).await.unwrap();

        assert_eq!(outcome_names(&result), vec!["a"]);
        assert_eq!(result.skipped, tasks(&["b", "c"]));
    }

    #[tokio::test]
    async fn test_parallel_continue_on_error_runs_everything() {
        let policy = RunPolicy {
            continue_on_error: true,
            ..RunPolicy::parallel()
        };
        let h = harness(
            serde_json::json!({ "a": "exit 1", "b": "sleep 0.2", "c": "exit 0" }),
            policy,
        );

        let result = h.runner.run(&tasks(&["a", "b", "c"])).await.unwrap();

        assert_eq!(result.outcomes.len(), 3);
        assert!(result.outcomes.iter().all(|o| !o.cancelled));
        assert!(result.outcomes[1].succeeded);
        assert!(!result.overall_succeeded);
    }

    #[tokio::test]
    async fn test_task_name_and_context_env_are_exposed() {
        let h = harness(
            serde_json::json!({ "env-check": "printf \"$npm_lifecycle_event $RUNALL_TEST_MARKER\"" }),
            RunPolicy {
                silent: false,
                ..RunPolicy::sequential()
            },
        );

        let result = h.runner.run(&tasks(&["env-check"])).await.unwrap();

        assert!(result.overall_succeeded);
        assert!(h.stdout.contents().ends_with("env-check marker"));
    }

    #[tokio::test]
    async fn test_label_mode_tags_both_streams() {
        let policy = RunPolicy {
            print_label: true,
            ..RunPolicy::parallel()
        };
        let h = harness(
            serde_json::json!({ "a": "printf 'line1\\nline2'", "bb": "echo oops >&2" }),
            policy,
        );

        h.runner.run(&tasks(&["a", "bb"])).await.unwrap();

        let stdout = h.stdout.contents();
        let tagged: Vec<_> = stdout.lines().filter(|l| l.starts_with("[a ]")).collect();
        assert_eq!(tagged, vec!["[a ] line1", "[a ] line2"]);
        assert_eq!(h.stderr.contents(), "[bb] oops\n");
    }

    #[tokio::test]
    async fn test_env_builtin_prints_task_environment() {
        let h = harness(serde_json::json!({ "a": "exit 0" }), RunPolicy::sequential());

        let result = h.runner.run(&tasks(&["env"])).await.unwrap();

        assert!(result.overall_succeeded);
        let stdout = h.stdout.contents();
        assert!(stdout.contains("RUNALL_TEST_MARKER=marker\n"));
        assert!(stdout.contains("npm_lifecycle_event=env\n"));
    }

    #[tokio::test]
    async fn test_label_width_counts_characters() {
        let policy = RunPolicy {
            print_label: true,
            ..RunPolicy::sequential()
        };
        let h = harness(
            serde_json::json!({ "é": "echo x", "abc": "echo y" }),
            policy,
        );

        h.runner.run(&tasks(&["é", "abc"])).await.unwrap();

        let stdout = h.stdout.contents();
        assert!(stdout.contains("[é  ] x\n"));
        assert!(stdout.contains("[abc] y\n"));
    }

    #[tokio::test]
    async fn test_silent_mode_writes_nothing_but_reports_failure() {
        let policy = RunPolicy {
            silent: true,
            continue_on_error: true,
            ..RunPolicy::parallel()
        };
        let h = harness(
            serde_json::json!({ "loud": "seq 1 20000; echo err >&2", "broken": "echo no; exit 6" }),
            policy,
        );

        let result = h.runner.run(&tasks(&["loud", "broken"])).await.unwrap();

        assert!(h.stdout.is_empty());
        assert!(h.stderr.is_empty());
        assert!(result.outcomes[0].succeeded);
        assert_eq!(result.overall_exit_code, 6);
    }

    #[tokio::test]
    async fn test_print_name_uses_registry_banner() {
        let policy = RunPolicy {
            print_name: true,
            ..RunPolicy::sequential()
        };
        let h = harness(serde_json::json!({ "a": "true" }), policy);

        h.runner.run(&tasks(&["a"])).await.unwrap();

        assert_eq!(h.stdout.contents(), "\n> @ a \n> true \n\n");
    }

    #[tokio::test]
    async fn test_missing_script_is_a_launch_failure() {
        let h = harness(serde_json::json!({ "a": "exit 0" }), RunPolicy::sequential());

        let result = h.runner.run(&tasks(&["ghost", "a"])).await.unwrap();

        assert_eq!(outcome_names(&result), vec!["ghost"]);
        let ghost = &result.outcomes[0];
        assert!(ghost.exit_code.is_none());
        assert!(ghost.launch_error.as_deref().unwrap().contains("Missing script"));
        assert_eq!(result.overall_exit_code, 1);
    }

    struct BrokenLauncher;

    impl TaskLauncher for BrokenLauncher {
        fn command(&self, _task: &TaskSpec, _entry: &TaskRegistryEntry) -> RunAllResult<Command> {
            Ok(Command::new("/nonexistent/runall-test-binary"))
        }
    }

    #[tokio::test]
    async fn test_spawn_error_participates_in_error_policy() {
        let registry = TaskRegistry::from_task_list(&serde_json::json!({ "a": "x", "b": "y" }), None).unwrap();
        let (stdout, _) = OutputStream::memory();
        let (stderr, _) = OutputStream::memory();
        let context = ExecutionContext {
            stdout,
            stderr,
            stdin: StdinMode::Null,
            working_dir: None,
            env: Vec::new(),
            colorize: false,
        };
        let runner = TaskRunner::new(
            Arc::new(BrokenLauncher),
            Arc::new(registry),
            context,
            RunPolicy::sequential(),
        );

        let result = runner.run(&tasks(&["a", "b"])).await.unwrap();

        assert_eq!(outcome_names(&result), vec!["a"]);
        assert_eq!(result.skipped.len(), 1);
        assert!(!result.outcomes[0].succeeded);
    }

    #[tokio::test]
    async fn test_invalid_policy_runs_nothing() {
        let policy = RunPolicy {
            max_parallelism: Some(0),
            ..RunPolicy::parallel()
        };
        let h = harness(serde_json::json!({ "a": "echo hi" }), policy);

        let err = h.runner.run(&tasks(&["a"])).await.unwrap_err();

        assert!(matches!(err, RunAllError::InvalidPolicy(_)));
        assert!(h.stdout.is_empty());
    }
}
