//! # Boot Harness
//!
//! Boots an image under QEMU with the debug console on stdout, lets it run
//! for a fixed time and classifies what happened:
//!
//! | process at timeout | entry marker | outcome                |
//! |--------------------|--------------|------------------------|
//! | exited             | any          | [`Outcome::Crashed`]   |
//! | exited via `0xf4`  | present      | [`Outcome::ExitedOnEntry`] |
//! | running            | present      | [`Outcome::Halted`]    |
//! | running            | absent       | [`Outcome::EntryNeverReached`] |
//!
//! With `-no-reboot`, a triple fault terminates QEMU instead of resetting
//! the machine, so an early exit is how a crash shows up.

use kernel_qemu::{ENTRY_MARKER, QEMU_EXIT_PORT, QemuExitCode};
use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_QEMU: &str = "qemu-system-x86_64";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of the transcript line reporting the granted framebuffer.
pub const FRAMEBUFFER_PREFIX: &str = "framebuffer: ";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output may keep arriving once the emulator is gone.
///
/// A wrapper that forked the emulator instead of `exec`-ing it leaves the
/// pipe open after the kill; the transcript is cut off after this grace.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to start {qemu}: {source}")]
    Spawn {
        qemu: String,
        source: std::io::Error,
    },
    #[error("failed to supervise the emulator: {0}")]
    Supervise(std::io::Error),
    #[error("the emulator's stdout is not captured")]
    Transcript,
    #[error("run {run}: {outcome}")]
    Unsuccessful { run: usize, outcome: Outcome },
    #[error("run {run}: no framebuffer was reported")]
    FramebufferMissing { run: usize },
    #[error("run {run}: framebuffer {width}x{height}x{bpp} has a zero dimension")]
    FramebufferIncomplete {
        run: usize,
        width: u16,
        height: u16,
        bpp: u16,
    },
    #[error("run {run}: transcript differs from run 0")]
    NotIdempotent { run: usize },
}

/// How a boot ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Still running at the timeout, after reaching the entry point.
    Halted,
    /// Reached the entry point and terminated QEMU through `isa-debug-exit`.
    ExitedOnEntry,
    /// Still running at the timeout, entry point never reached.
    EntryNeverReached,
    /// QEMU exited on its own before the timeout.
    Crashed { status: Option<i32> },
}

impl Outcome {
    /// Whether the image reached its entry point and stayed put.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Halted | Self::ExitedOnEntry)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Halted => f.write_str("halted after entry"),
            Self::ExitedOnEntry => f.write_str("exited after entry"),
            Self::EntryNeverReached => f.write_str("entry point never reached"),
            Self::Crashed { status: Some(code) } => write!(f, "crashed (exit status {code})"),
            Self::Crashed { status: None } => f.write_str("crashed (killed by signal)"),
        }
    }
}

/// Process state observed when the timeout expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(Option<i32>),
}

/// Maps process state and transcript to an [`Outcome`].
#[must_use]
pub fn classify(state: ProcessState, transcript: &str) -> Outcome {
    let entered = transcript.contains(ENTRY_MARKER);
    match state {
        ProcessState::Exited(Some(code))
            if entered && code == QemuExitCode::Success.host_status() =>
        {
            Outcome::ExitedOnEntry
        }
        ProcessState::Exited(status) => Outcome::Crashed { status },
        ProcessState::Running if entered => Outcome::Halted,
        ProcessState::Running => Outcome::EntryNeverReached,
    }
}

/// The last reported framebuffer geometry as `(width, height, bpp)`.
///
/// A report the kernel could not fill in (`framebuffer: none`) yields `None`.
#[must_use]
pub fn parse_framebuffer(transcript: &str) -> Option<(u16, u16, u16)> {
    let line = transcript.lines().rev().find(|l| l.contains(FRAMEBUFFER_PREFIX))?;
    let (_, geometry) = line.split_once(FRAMEBUFFER_PREFIX)?;

    let mut parts = geometry.trim().split('x').map(str::parse::<u16>);
    let width = parts.next()?.ok()?;
    let height = parts.next()?.ok()?;
    let bpp = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some((width, height, bpp))
}

/// What to boot and how.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub qemu: PathBuf,
    pub image: PathBuf,
    pub timeout: Duration,
    /// Passed to QEMU after the harness' own arguments.
    pub extra_args: Vec<OsString>,
}

impl BootConfig {
    #[must_use]
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            qemu: PathBuf::from(DEFAULT_QEMU),
            image: image.into(),
            timeout: DEFAULT_TIMEOUT,
            extra_args: Vec::new(),
        }
    }

    /// The emulator arguments, without the program itself.
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-cdrom".into(),
            self.image.clone().into_os_string(),
            "-debugcon".into(),
            "stdio".into(),
            "-display".into(),
            "none".into(),
            "-no-reboot".into(),
            "-device".into(),
            format!("isa-debug-exit,iobase={QEMU_EXIT_PORT:#x},iosize=0x04").into(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.qemu);
        command
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        command
    }
}

/// Result of one boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRun {
    pub outcome: Outcome,
    pub transcript: String,
}

impl BootRun {
    #[must_use]
    pub fn framebuffer(&self) -> Option<(u16, u16, u16)> {
        parse_framebuffer(&self.transcript)
    }
}

/// Boots the image once.
///
/// # Errors
/// QEMU could not be started or supervised.
pub fn run_boot(config: &BootConfig) -> Result<BootRun, HarnessError> {
    log::info!("booting {} with {}", config.image.display(), config.qemu.display());
    log::debug!("qemu arguments: {:?}", config.args());

    let mut child = config.command().spawn().map_err(|source| HarnessError::Spawn {
        qemu: config.qemu.display().to_string(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or(HarnessError::Transcript)?;
    let chunks = stream_output(stdout);

    let state = supervise(&mut child, config.timeout)?;
    let transcript = drain(&chunks, DRAIN_GRACE);
    let transcript = String::from_utf8_lossy(&transcript).into_owned();

    let outcome = classify(state, &transcript);
    log::info!("outcome: {outcome}");
    Ok(BootRun { outcome, transcript })
}

/// Forwards everything read from `source` as chunks until EOF.
///
/// The reader thread is detached; it ends with the pipe or when the
/// receiver is dropped.
fn stream_output(mut source: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Collects chunks until the sender hangs up or `grace` expires.
fn drain(chunks: &Receiver<Vec<u8>>, grace: Duration) -> Vec<u8> {
    let deadline = Instant::now() + grace;
    let mut transcript = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match chunks.recv_timeout(remaining) {
            Ok(chunk) => transcript.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("emulator output still open after exit, transcript truncated");
                break;
            }
        }
    }

    transcript
}

/// Waits up to `timeout` for the process, then kills it if still running.
fn supervise(child: &mut Child, timeout: Duration) -> Result<ProcessState, HarnessError> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait().map_err(HarnessError::Supervise)? {
            log::debug!("qemu exited early: {status}");
            return Ok(ProcessState::Exited(status.code()));
        }

        if Instant::now() >= deadline {
            break;
        }

        thread::sleep(POLL_INTERVAL);
    }

    log::debug!("timeout reached, stopping qemu");
    child.kill().map_err(HarnessError::Supervise)?;
    child.wait().map_err(HarnessError::Supervise)?;
    Ok(ProcessState::Running)
}

/// Checks a series of boots of the same image.
///
/// Every run must succeed and produce the same transcript as the first.
/// With `expect_auto_framebuffer`, each run must also report a framebuffer
/// with all three dimensions filled in by the bootloader.
///
/// # Errors
/// The first run that falls short, see [`HarnessError`].
pub fn check_runs(runs: &[BootRun], expect_auto_framebuffer: bool) -> Result<(), HarnessError> {
    for (run, boot) in runs.iter().enumerate() {
        if !boot.outcome.is_success() {
            return Err(HarnessError::Unsuccessful {
                run,
                outcome: boot.outcome,
            });
        }

        if expect_auto_framebuffer {
            let (width, height, bpp) = boot
                .framebuffer()
                .ok_or(HarnessError::FramebufferMissing { run })?;
            if width == 0 || height == 0 || bpp == 0 {
                return Err(HarnessError::FramebufferIncomplete {
                    run,
                    width,
                    height,
                    bpp,
                });
            }
        }

        if boot.transcript != runs[0].transcript {
            return Err(HarnessError::NotIdempotent { run });
        }
    }

    Ok(())
}
