//! Live progress display for a watched import.
//!
//! [`ProgressTracker`] owns the locally rendered mirror of the job's steps.
//! Two writers touch it: the poll loop replaces step data and the suffix, and
//! the render task advances the spinner frame. The renderer itself is only
//! reached through the tracker so the two never interleave partial frames.

use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossterm::{
    cursor, queue,
    terminal::{self, ClearType},
};
use dialoguer::console::style;
use tokio::task::JoinHandle;
use unicode_width::UnicodeWidthStr;

use super::job::{JobStep, StepStatus};

pub const RENDER_INTERVAL: Duration = Duration::from_millis(80);

pub const RUNNING_SPRITE: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedStep {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    running_since: Option<Instant>,
}

/// Suffix text rebuilt from the current state on every draw.
pub type LiveSuffix = Box<dyn Fn(&ProgressState) -> String + Send>;

#[derive(Default)]
pub struct ProgressState {
    steps: Vec<TrackedStep>,
    frame: usize,
    suffix: String,
    live_suffix: Option<LiveSuffix>,
}

impl ProgressState {
    /// Swap in the server's full step list. Local bookkeeping follows each
    /// step by id, so reordering or insertion upstream keeps it attached to
    /// the right step. Returns whether anything visible changed.
    pub fn replace_steps(&mut self, steps: Vec<JobStep>) -> bool {
        let now = Instant::now();
        let before: Vec<(String, String, StepStatus)> = self
            .steps
            .iter()
            .map(|s| (s.id.clone(), s.name.clone(), s.status))
            .collect();

        let mut previous: HashMap<String, TrackedStep> = self
            .steps
            .drain(..)
            .map(|step| (step.id.clone(), step))
            .collect();

        self.steps = steps
            .into_iter()
            .map(|step| {
                let known = previous.remove(&step.id);
                let running_since = match (known, step.status) {
                    (Some(prev), StepStatus::Running) => prev.running_since.or(Some(now)),
                    (None, StepStatus::Running) => Some(now),
                    _ => None,
                };
                TrackedStep {
                    id: step.id,
                    name: step.name,
                    status: step.status,
                    running_since,
                }
            })
            .collect();

        let after = self.steps.iter().map(|s| (s.id.as_str(), s.name.as_str(), s.status));
        !before
            .iter()
            .map(|(id, name, status)| (id.as_str(), name.as_str(), *status))
            .eq(after)
    }

    pub fn steps(&self) -> &[TrackedStep] {
        &self.steps
    }

    pub fn set_suffix(&mut self, text: impl Into<String>) {
        self.live_suffix = None;
        self.suffix = text.into();
    }

    /// Install a suffix that is recomputed at every draw, so spinner glyphs
    /// inside it animate between polls.
    pub fn set_live_suffix(&mut self, build: impl Fn(&ProgressState) -> String + Send + 'static) {
        self.live_suffix = Some(Box::new(build));
    }

    /// Freezes a live suffix into plain text before appending.
    pub fn append_suffix(&mut self, text: &str) {
        let mut suffix = self.suffix();
        suffix.push('\n');
        suffix.push_str(text);
        self.set_suffix(suffix);
    }

    pub fn suffix(&self) -> String {
        match &self.live_suffix {
            Some(build) => build(self),
            None => self.suffix.clone(),
        }
    }

    pub fn advance_frame(&mut self) {
        self.frame = (self.frame + 1) % RUNNING_SPRITE.len();
    }

    pub fn sprite(&self) -> &'static str {
        RUNNING_SPRITE[self.frame]
    }

    pub fn all_steps_succeeded(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Success)
    }

    pub fn compose(&self, now: Instant) -> String {
        let mut lines: Vec<String> = self
            .steps
            .iter()
            .map(|step| {
                let glyph = match step.status {
                    StepStatus::Pending => style("○").dim().to_string(),
                    StepStatus::Running => style(self.sprite()).blue().bright().to_string(),
                    StepStatus::Success => style("✓").green().to_string(),
                    StepStatus::Failed => style("✕").red().to_string(),
                };
                match step.running_since {
                    Some(since) => format!(
                        "{glyph} {} {}",
                        step.name,
                        style(format_elapsed(now.saturating_duration_since(since))).dim()
                    ),
                    None => format!("{glyph} {}", step.name),
                }
            })
            .collect();
        let suffix = self.suffix();
        if !suffix.is_empty() {
            lines.push(suffix.trim_end_matches('\n').to_string());
        }
        lines.join("\n")
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Terminal writer. `finalize` marks the last frame, which stays on screen.
pub trait Renderer: Send {
    fn draw(&mut self, text: &str, finalize: bool) -> io::Result<()>;
}

/// Redraws in place on stderr. When stderr is not a terminal only the final
/// frame is written.
pub struct TerminalRenderer {
    interactive: bool,
    previous_rows: u16,
}

impl TerminalRenderer {
    pub fn stderr() -> Self {
        Self {
            interactive: io::stderr().is_terminal(),
            previous_rows: 0,
        }
    }
}

impl Renderer for TerminalRenderer {
    fn draw(&mut self, text: &str, finalize: bool) -> io::Result<()> {
        if !self.interactive && !finalize {
            return Ok(());
        }

        let mut out = io::stderr().lock();
        if self.previous_rows > 0 {
            queue!(
                out,
                cursor::MoveToPreviousLine(self.previous_rows),
                terminal::Clear(ClearType::FromCursorDown)
            )?;
        }
        writeln!(out, "{}", text.trim_end_matches('\n'))?;
        out.flush()?;

        self.previous_rows = if finalize {
            0
        } else {
            let columns = terminal::size().map(|(cols, _)| cols).unwrap_or(80);
            visible_rows(text, columns)
        };
        Ok(())
    }
}

/// Rows `text` occupies once wrapped at `columns`.
fn visible_rows(text: &str, columns: u16) -> u16 {
    let columns = usize::from(columns.max(1));
    let rows: usize = text
        .trim_end_matches('\n')
        .split('\n')
        .map(|line| {
            let width = UnicodeWidthStr::width(strip_ansi_escapes::strip_str(line).as_str());
            width.div_ceil(columns).max(1)
        })
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// Renderer for JSON mode: nothing reaches the terminal.
pub struct HiddenRenderer;

impl Renderer for HiddenRenderer {
    fn draw(&mut self, _text: &str, _finalize: bool) -> io::Result<()> {
        Ok(())
    }
}

struct Shared {
    state: ProgressState,
    renderer: Box<dyn Renderer>,
}

#[derive(Clone)]
pub struct ProgressTracker {
    shared: Arc<Mutex<Shared>>,
}

impl ProgressTracker {
    pub fn new(renderer: impl Renderer + 'static) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: ProgressState::default(),
                renderer: Box::new(renderer),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn replace_steps(&self, steps: Vec<JobStep>) -> bool {
        self.lock().state.replace_steps(steps)
    }

    pub fn set_suffix(&self, text: impl Into<String>) {
        self.lock().state.set_suffix(text);
    }

    pub fn set_live_suffix(&self, build: impl Fn(&ProgressState) -> String + Send + 'static) {
        self.lock().state.set_live_suffix(build);
    }

    pub fn append_suffix(&self, text: &str) {
        self.lock().state.append_suffix(text);
    }

    pub fn all_steps_succeeded(&self) -> bool {
        self.lock().state.all_steps_succeeded()
    }

    pub fn read<T>(&self, f: impl FnOnce(&ProgressState) -> T) -> T {
        f(&self.lock().state)
    }

    /// Draw the current state once.
    pub fn print(&self, finalize: bool) {
        let mut shared = self.lock();
        let text = shared.state.compose(Instant::now());
        if let Err(err) = shared.renderer.draw(&text, finalize) {
            tracing::debug!(error = %err, "failed to draw progress");
        }
    }

    fn render_frame(&self) {
        let mut shared = self.lock();
        shared.state.advance_frame();
        let text = shared.state.compose(Instant::now());
        if let Err(err) = shared.renderer.draw(&text, false) {
            tracing::debug!(error = %err, "failed to draw progress");
        }
    }

    /// Redraw every `every` until the returned guard is stopped or dropped.
    pub fn start_rendering(&self, every: Duration) -> RenderGuard {
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tracker.render_frame();
            }
        });
        RenderGuard {
            handle: Some(handle),
        }
    }
}

/// Scoped ownership of the render timer.
pub struct RenderGuard {
    handle: Option<JoinHandle<()>>,
}

impl RenderGuard {
    pub fn stop(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.abort();
    }
}
