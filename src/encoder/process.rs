//! Lifecycle of a single ffmpeg transcode.
//!
//! An [`EncoderProcess`] moves `Default -> Processing -> {Succeeded, Failed,
//! Aborted}`. Each transition is announced exactly once on the event channel
//! returned by [`EncoderProcess::new`], in the order it happened.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::{self, EncoderSettings, StreamMap};
use super::progress::{Progress, ProgressParser};
use super::signal;
use crate::error::EncoderError;
use crate::media::options::TranscoderOpts;
use crate::media::probe;

/// Stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// State of an encoder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Default,
    Processing,
    Succeeded,
    Failed,
    Aborted,
}

impl ProcessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Default => "default",
            ProcessStatus::Processing => "processing",
            ProcessStatus::Succeeded => "succeeded",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Succeeded | ProcessStatus::Failed | ProcessStatus::Aborted
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle notification from an encoder process.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// ffmpeg is running.
    Started,
    /// Periodic progress while running.
    Progress(Progress),
    /// Output was written successfully.
    Finished,
    /// Probe or encode failed.
    Failed { message: String },
    /// Killed on request.
    Aborted,
}

impl ProcessEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessEvent::Finished | ProcessEvent::Failed { .. } | ProcessEvent::Aborted
        )
    }
}

#[derive(Debug)]
struct Lifecycle {
    status: ProcessStatus,
    started: bool,
    aborted: bool,
    pid: Option<u32>,
}

#[derive(Debug)]
struct Shared {
    job_id: String,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        // State stays consistent under every critical section, so a poisoned
        // lock is still usable.
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Control handle to an encoder process, shareable across tasks.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    shared: Arc<Shared>,
}

impl ProcessHandle {
    pub fn job_id(&self) -> &str {
        &self.shared.job_id
    }

    pub fn status(&self) -> ProcessStatus {
        self.shared.lock().status
    }

    /// OS process id of the running ffmpeg, if any.
    pub fn pid(&self) -> Option<u32> {
        self.shared.lock().pid
    }

    /// Requests that the process be killed.
    ///
    /// Returns `false` when there is nothing to abort: the process was never
    /// started, has already finished, or an abort is already pending. An
    /// abort during input inspection takes effect before ffmpeg launches.
    pub fn abort(&self) -> bool {
        let mut lifecycle = self.shared.lock();
        if lifecycle.aborted {
            return false;
        }

        match lifecycle.status {
            ProcessStatus::Processing => {
                lifecycle.aborted = true;
                if let Some(pid) = lifecycle.pid {
                    if let Err(e) = signal::terminate(pid) {
                        warn!(job_id = %self.shared.job_id, error = %e, "Failed to kill encoder");
                    }
                }
                true
            }
            ProcessStatus::Default if lifecycle.started => {
                lifecycle.aborted = true;
                true
            }
            _ => false,
        }
    }

    /// Pauses a running encode.
    pub fn suspend(&self) -> Result<(), EncoderError> {
        let pid = self.running_pid("suspend")?;
        signal::suspend(pid)?;
        debug!(job_id = %self.shared.job_id, pid, "Encoder suspended");
        Ok(())
    }

    /// Continues a suspended encode.
    pub fn resume(&self) -> Result<(), EncoderError> {
        let pid = self.running_pid("resume")?;
        signal::resume(pid)?;
        debug!(job_id = %self.shared.job_id, pid, "Encoder resumed");
        Ok(())
    }

    fn running_pid(&self, action: &'static str) -> Result<u32, EncoderError> {
        let lifecycle = self.shared.lock();
        match (lifecycle.status, lifecycle.pid) {
            (ProcessStatus::Processing, Some(pid)) if !lifecycle.aborted => Ok(pid),
            (status, _) => Err(EncoderError::InvalidTransition { action, status }),
        }
    }
}

/// One transcode of an input file to an output file.
#[derive(Debug)]
pub struct EncoderProcess {
    handle: ProcessHandle,
    input: PathBuf,
    output: PathBuf,
    opts: TranscoderOpts,
    settings: EncoderSettings,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl EncoderProcess {
    /// Creates a process in the `Default` state along with its event stream.
    pub fn new(
        job_id: impl Into<String>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        opts: TranscoderOpts,
        settings: EncoderSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            job_id: job_id.into(),
            lifecycle: Mutex::new(Lifecycle {
                status: ProcessStatus::Default,
                started: false,
                aborted: false,
                pid: None,
            }),
        });

        let process = Self {
            handle: ProcessHandle { shared },
            input: input.into(),
            output: output.into(),
            opts,
            settings,
            events,
        };
        (process, rx)
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> ProcessStatus {
        self.handle.status()
    }

    /// Inspects the input and launches ffmpeg in the background.
    ///
    /// Only valid once, from `Default`. Failures after this point arrive as
    /// events rather than errors.
    pub fn start(&self) -> Result<(), EncoderError> {
        {
            let mut lifecycle = self.handle.shared.lock();
            if lifecycle.started || lifecycle.status != ProcessStatus::Default {
                return Err(EncoderError::InvalidTransition {
                    action: "start",
                    status: lifecycle.status,
                });
            }
            lifecycle.started = true;
        }

        let driver = Driver {
            shared: self.handle.shared.clone(),
            events: self.events.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            opts: self.opts.clone(),
            settings: self.settings.clone(),
        };
        tokio::spawn(driver.run());

        Ok(())
    }

    pub fn abort(&self) -> bool {
        self.handle.abort()
    }

    pub fn suspend(&self) -> Result<(), EncoderError> {
        self.handle.suspend()
    }

    pub fn resume(&self) -> Result<(), EncoderError> {
        self.handle.resume()
    }
}

/// Background task owning the child process.
struct Driver {
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    input: PathBuf,
    output: PathBuf,
    opts: TranscoderOpts,
    settings: EncoderSettings,
}

impl Driver {
    async fn run(self) {
        let job_id = self.shared.job_id.clone();

        let probed = match probe::probe(&self.settings.ffprobe, &self.input).await {
            Ok(probed) => probed,
            Err(e) => {
                self.conclude_before_launch(ProcessStatus::Failed, Some(e.to_string()));
                return;
            }
        };
        debug!(
            job_id = %job_id,
            format = %probed.info.format,
            duration = ?probed.info.duration,
            streams = probed.streams.len(),
            "Input inspected"
        );

        if self.shared.lock().aborted {
            self.conclude_before_launch(ProcessStatus::Aborted, None);
            return;
        }

        let streams = StreamMap::choose(&self.opts, &probed);
        if streams == StreamMap::FirstAudio && !probed.has_audio() {
            let message = EncoderError::ProbeFailed {
                path: self.input.clone(),
                message: "input has no audio stream".to_string(),
            };
            self.conclude_before_launch(ProcessStatus::Failed, Some(message.to_string()));
            return;
        }

        let mut cmd = Command::new(&self.settings.ffmpeg);
        cmd.args(command::build_args(&self.input, &self.output, &self.opts, streams))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        signal::isolate(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = EncoderError::SpawnFailed(e.to_string()).to_string();
                self.conclude_before_launch(ProcessStatus::Failed, Some(message));
                return;
            }
        };

        // An abort may have landed between the check above and the spawn.
        let aborted = {
            let mut lifecycle = self.shared.lock();
            if lifecycle.aborted {
                lifecycle.status = ProcessStatus::Aborted;
            } else {
                lifecycle.status = ProcessStatus::Processing;
                lifecycle.pid = child.id();
            }
            lifecycle.aborted
        };
        if aborted {
            let _ = child.start_kill();
            let _ = child.wait().await;
            self.emit(ProcessEvent::Aborted);
            return;
        }

        info!(job_id = %job_id, pid = ?child.id(), "Encoder started");
        self.emit(ProcessEvent::Started);

        let progress = child
            .stdout
            .take()
            .map(|stdout| spawn_progress_reader(stdout, probed.info.duration, self.events.clone()));
        let stderr = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_reader(stderr, job_id.clone()));

        let exit = wait_for_exit(&mut child).await;

        // Drain readers so every progress event precedes the terminal one.
        if let Some(task) = progress {
            let _ = task.await;
        }
        let tail = match stderr {
            Some(task) => task.await.unwrap_or_default(),
            None => VecDeque::new(),
        };

        self.conclude_after_exit(exit, tail);
    }

    /// Terminal transition straight from `Default`; ffmpeg never ran.
    fn conclude_before_launch(&self, next: ProcessStatus, message: Option<String>) {
        {
            let mut lifecycle = self.shared.lock();
            if lifecycle.status != ProcessStatus::Default {
                return;
            }
            lifecycle.status = next;
        }

        let event = match next {
            ProcessStatus::Aborted => ProcessEvent::Aborted,
            _ => ProcessEvent::Failed {
                message: message.unwrap_or_else(|| "encoder failed".to_string()),
            },
        };
        warn!(job_id = %self.shared.job_id, status = %next, ?event, "Encoder did not launch");
        self.emit(event);
    }

    /// Terminal transition from `Processing`, applied only while still there.
    fn conclude_after_exit(&self, exit: Result<ExitStatus, EncoderError>, tail: VecDeque<String>) {
        let job_id = &self.shared.job_id;
        let event = {
            let mut lifecycle = self.shared.lock();
            if lifecycle.status != ProcessStatus::Processing {
                return;
            }
            lifecycle.pid = None;

            let event = if lifecycle.aborted {
                ProcessEvent::Aborted
            } else {
                match exit {
                    Ok(status) if status.success() => ProcessEvent::Finished,
                    Ok(status) => ProcessEvent::Failed {
                        message: EncoderError::FfmpegFailed {
                            code: status.code().unwrap_or(-1),
                            stderr: Vec::from(tail).join("\n"),
                        }
                        .to_string(),
                    },
                    Err(e) => ProcessEvent::Failed {
                        message: e.to_string(),
                    },
                }
            };

            lifecycle.status = match event {
                ProcessEvent::Finished => ProcessStatus::Succeeded,
                ProcessEvent::Aborted => ProcessStatus::Aborted,
                _ => ProcessStatus::Failed,
            };
            event
        };

        match &event {
            ProcessEvent::Finished => info!(job_id = %job_id, "Encoder finished"),
            ProcessEvent::Aborted => info!(job_id = %job_id, "Encoder aborted"),
            ProcessEvent::Failed { message } => {
                warn!(job_id = %job_id, error = %message, "Encoder failed")
            }
            _ => {}
        }
        self.emit(event);
    }

    fn emit(&self, event: ProcessEvent) {
        if self.events.send(event).is_err() {
            debug!(job_id = %self.shared.job_id, "Event receiver dropped");
        }
    }
}

async fn wait_for_exit(child: &mut Child) -> Result<ExitStatus, EncoderError> {
    child
        .wait()
        .await
        .map_err(|e| EncoderError::SpawnFailed(format!("failed to wait for ffmpeg: {}", e)))
}

fn spawn_progress_reader<R>(
    stdout: R,
    duration: Option<f64>,
    events: mpsc::UnboundedSender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut parser = ProgressParser::new(duration);
        let mut lines = BufReader::new(stdout).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(progress) = parser.feed(&line) {
                if events.send(ProcessEvent::Progress(progress)).is_err() {
                    break;
                }
            }
        }
    })
}

fn spawn_stderr_reader<R>(stderr: R, job_id: String) -> JoinHandle<VecDeque<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut lines = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            debug!(job_id = %job_id, line = %line, "ffmpeg output");
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        tail
    })
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::encoder::fake::{
        self, ENCODE_FAIL, ENCODE_HANG, ENCODE_OK, PROBE_FAIL, PROBE_OK, PROBE_SLOW, PROBE_VIDEO_ONLY,
    };

    async fn collect(rx: &mut mpsc::UnboundedReceiver<ProcessEvent>) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for encoder event")
                .expect("event channel closed");
            let done = event.is_terminal();
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn process(tools: &fake::FakeTools) -> (EncoderProcess, mpsc::UnboundedReceiver<ProcessEvent>) {
        let input = tools.dir.path().join("input");
        std::fs::write(&input, b"raw").unwrap();
        let opts = TranscoderOpts::parse(r#"{"format":"mp3","stream":{"audio":{"codec":"mp3"}}}"#)
            .unwrap();
        EncoderProcess::new(
            "job-1",
            input,
            tools.dir.path().join("output.mp3"),
            opts,
            tools.settings.clone(),
        )
    }

    #[tokio::test]
    async fn successful_encode_reports_in_order() {
        let tools = fake::tools(PROBE_OK, ENCODE_OK);
        let (process, mut rx) = process(&tools);
        assert_eq!(process.status(), ProcessStatus::Default);

        process.start().unwrap();
        let events = collect(&mut rx).await;

        assert_eq!(events.first(), Some(&ProcessEvent::Started));
        assert_eq!(events.last(), Some(&ProcessEvent::Finished));
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Progress(p) => p.rounded_percent(),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![50, 100]);
        assert_eq!(process.status(), ProcessStatus::Succeeded);
        assert!(tools.dir.path().join("output.mp3").exists());
    }

    #[tokio::test]
    async fn start_is_only_valid_once() {
        let tools = fake::tools(PROBE_OK, ENCODE_OK);
        let (process, mut rx) = process(&tools);
        process.start().unwrap();
        assert!(matches!(
            process.start(),
            Err(EncoderError::InvalidTransition { action: "start", .. })
        ));
        collect(&mut rx).await;
        assert!(process.start().is_err());
    }

    #[tokio::test]
    async fn probe_failure_fails_without_starting() {
        let tools = fake::tools(PROBE_FAIL, ENCODE_OK);
        let (process, mut rx) = process(&tools);
        process.start().unwrap();

        let events = collect(&mut rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProcessEvent::Failed { message } => assert!(message.contains("Invalid data")),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(process.status(), ProcessStatus::Failed);
    }

    #[tokio::test]
    async fn audio_output_needs_an_audio_input() {
        let tools = fake::tools(PROBE_VIDEO_ONLY, ENCODE_OK);
        let (process, mut rx) = process(&tools);
        process.start().unwrap();

        let events = collect(&mut rx).await;
        match events.as_slice() {
            [ProcessEvent::Failed { message }] => assert!(message.contains("no audio stream")),
            other => panic!("unexpected events {:?}", other),
        }
        assert!(!tools.dir.path().join("output.mp3").exists());
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_stderr() {
        let tools = fake::tools(PROBE_OK, ENCODE_FAIL);
        let (process, mut rx) = process(&tools);
        process.start().unwrap();

        let events = collect(&mut rx).await;
        assert_eq!(events.first(), Some(&ProcessEvent::Started));
        match events.last() {
            Some(ProcessEvent::Failed { message }) => {
                assert!(message.contains("exit code 1"));
                assert!(message.contains("Unknown encoder"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(process.status(), ProcessStatus::Failed);
    }

    #[tokio::test]
    async fn abort_kills_running_encode() {
        let tools = fake::tools(PROBE_OK, ENCODE_HANG);
        let (process, mut rx) = process(&tools);
        process.start().unwrap();

        let first = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap();
        assert_eq!(first, Some(ProcessEvent::Started));
        assert!(process.handle().pid().is_some());

        assert!(process.abort());
        assert!(!process.abort());

        let events = collect(&mut rx).await;
        assert_eq!(events.last(), Some(&ProcessEvent::Aborted));
        assert_eq!(process.status(), ProcessStatus::Aborted);
        assert!(process.handle().pid().is_none());
    }

    #[tokio::test]
    async fn suspend_and_resume_while_running() {
        let tools = fake::tools(PROBE_OK, ENCODE_HANG);
        let (process, mut rx) = process(&tools);
        assert!(process.suspend().is_err());

        process.start().unwrap();
        let first = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap();
        assert_eq!(first, Some(ProcessEvent::Started));

        process.suspend().unwrap();
        process.resume().unwrap();
        assert!(process.abort());
        collect(&mut rx).await;

        assert!(matches!(
            process.resume(),
            Err(EncoderError::InvalidTransition { action: "resume", .. })
        ));
    }

    #[tokio::test]
    async fn abort_during_probe_never_launches() {
        let tools = fake::tools(PROBE_SLOW, ENCODE_OK);
        let (process, mut rx) = process(&tools);
        process.start().unwrap();
        assert!(process.abort());

        let events = collect(&mut rx).await;
        assert_eq!(events, vec![ProcessEvent::Aborted]);
        assert_eq!(process.status(), ProcessStatus::Aborted);
        assert!(!tools.dir.path().join("output.mp3").exists());
    }

    #[tokio::test]
    async fn abort_before_start_is_a_no_op() {
        let tools = fake::tools(PROBE_OK, ENCODE_OK);
        let (process, _rx) = process(&tools);
        assert!(!process.abort());
        assert_eq!(process.status(), ProcessStatus::Default);
    }
}
