//! Workflow executor
//!
//! Runs one workflow at a time on a dedicated thread. The caller gets either
//! a [`RunHandle`] streaming [`RunEvent`]s over a channel, or plain
//! callbacks. In both cases the terminal notification fires exactly once and
//! always last.
//!
//! Cancellation is cooperative: [`Executor::stop`] sets a flag that is checked
//! before each step. A step that already started always runs to completion,
//! since injected input cannot be taken back.

use crate::backend::{Backend, MouseButton};
use crate::config::EngineConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::matcher::{ScreenMatcher, TemplateMatcher};
use crate::options::{seconds_to_duration, RunOptions};
use crate::registry::BackendRegistry;
use crate::step::Action;
use crate::templates::TemplateStore;
use crate::workflow::Workflow;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sleep used for a rehearsed FindAndClick.
const DRY_FIND_PAUSE: Duration = Duration::from_millis(100);

/// How often an inter-step pause looks at the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Completed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub state: RunState,
    /// `"completed"`, `"stopped"`, or the failing step's error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    pub steps_executed: usize,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Update(String),
    Finished(RunOutcome),
}

/// Receives run notifications on the run thread, in order.
pub trait RunObserver: Send {
    fn on_update(&mut self, message: &str);

    /// Called once, last. Consumes the observer.
    fn on_finished(self: Box<Self>, outcome: &RunOutcome);
}

struct ChannelObserver(Sender<RunEvent>);

impl RunObserver for ChannelObserver {
    fn on_update(&mut self, message: &str) {
        let _ = self.0.send(RunEvent::Update(message.to_string()));
    }

    fn on_finished(self: Box<Self>, outcome: &RunOutcome) {
        let _ = self.0.send(RunEvent::Finished(outcome.clone()));
    }
}

struct Callbacks<U, F> {
    on_update: U,
    on_finished: F,
}

impl<U, F> RunObserver for Callbacks<U, F>
where
    U: FnMut(&str) + Send,
    F: FnOnce(bool, &str) + Send,
{
    fn on_update(&mut self, message: &str) {
        (self.on_update)(message)
    }

    fn on_finished(self: Box<Self>, outcome: &RunOutcome) {
        (self.on_finished)(outcome.success(), &outcome.message)
    }
}

/// Handle to an in-flight run.
pub struct RunHandle {
    events: Receiver<RunEvent>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Progress updates followed by exactly one `Finished`; the channel
    /// disconnects after that.
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Request a stop before the next step.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the run ends.
    pub fn wait(self) -> RunOutcome {
        join(self.thread)
    }
}

fn join(thread: JoinHandle<RunOutcome>) -> RunOutcome {
    thread.join().unwrap_or_else(|_| RunOutcome {
        state: RunState::Failed,
        message: "run thread panicked".to_string(),
        error: None,
        steps_executed: 0,
        elapsed_ms: 0,
    })
}

/// Everything a run thread needs, cloned out of the executor.
#[derive(Clone)]
struct Context {
    registry: Arc<BackendRegistry>,
    matcher: Arc<dyn TemplateMatcher>,
    templates: TemplateStore,
    config: EngineConfig,
    stop: Arc<AtomicBool>,
}

/// Releases the executor's single-run slot when the run thread is done.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Executor {
    ctx: Context,
    active: Arc<AtomicBool>,
}

impl Executor {
    /// Executor over a shared registry, with the default matcher, config, and
    /// the config's template location.
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        let config = EngineConfig::default();
        Self {
            ctx: Context {
                registry,
                matcher: Arc::new(ScreenMatcher),
                templates: config.template_store(),
                config,
                stop: Arc::new(AtomicBool::new(false)),
            },
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Executor with a fresh registry built from the config.
    pub fn from_config(config: EngineConfig) -> Self {
        let registry = Arc::new(BackendRegistry::new(config.backend_priority.clone()));
        Self::new(registry).with_config(config)
    }

    /// Replace timing/threshold settings and the template store derived from
    /// them.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.ctx.templates = config.template_store();
        self.ctx.config = config;
        self
    }

    pub fn with_templates(mut self, templates: TemplateStore) -> Self {
        self.ctx.templates = templates;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn TemplateMatcher>) -> Self {
        self.ctx.matcher = matcher;
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.ctx.registry
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.ctx.templates
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ask the active run to stop before its next step. Never interrupts a
    /// step in progress.
    pub fn stop(&self) {
        self.ctx.stop.store(true, Ordering::SeqCst);
    }

    /// Start a run and stream its events over a channel.
    ///
    /// Fails with `EngineBusy` if a run is already active.
    pub fn run(&self, workflow: Workflow, dry_run: bool, options: RunOptions) -> Result<RunHandle> {
        let (tx, rx) = unbounded();
        let thread = self.spawn(workflow, dry_run, options, Box::new(ChannelObserver(tx)))?;
        Ok(RunHandle {
            events: rx,
            stop: self.ctx.stop.clone(),
            thread,
        })
    }

    /// Start a run reporting through callbacks, invoked on the run thread.
    /// `on_finished(success, message)` fires exactly once, after every
    /// `on_update`.
    pub fn run_with_callbacks<U, F>(
        &self,
        workflow: Workflow,
        dry_run: bool,
        options: RunOptions,
        on_update: U,
        on_finished: F,
    ) -> Result<JoinHandle<RunOutcome>>
    where
        U: FnMut(&str) + Send + 'static,
        F: FnOnce(bool, &str) + Send + 'static,
    {
        self.spawn(
            workflow,
            dry_run,
            options,
            Box::new(Callbacks {
                on_update,
                on_finished,
            }),
        )
    }

    /// Run on the calling thread. Used by front ends that have nothing else
    /// to do while the workflow plays.
    pub fn run_blocking(
        &self,
        workflow: &Workflow,
        dry_run: bool,
        options: &RunOptions,
        observer: Box<dyn RunObserver>,
    ) -> Result<RunOutcome> {
        let _guard = self.acquire()?;
        Ok(drive(&self.ctx, workflow, dry_run, options, observer))
    }

    fn acquire(&self) -> Result<ActiveGuard> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::engine_busy())?;
        self.ctx.stop.store(false, Ordering::SeqCst);
        Ok(ActiveGuard(self.active.clone()))
    }

    fn spawn(
        &self,
        workflow: Workflow,
        dry_run: bool,
        options: RunOptions,
        observer: Box<dyn RunObserver>,
    ) -> Result<JoinHandle<RunOutcome>> {
        let guard = self.acquire()?;
        let ctx = self.ctx.clone();
        thread::Builder::new()
            .name("clickflow-run".to_string())
            .spawn(move || {
                let _guard = guard;
                drive(&ctx, &workflow, dry_run, &options, observer)
            })
            .map_err(|e| Error::new(ErrorCode::Unknown, format!("failed to spawn run thread: {}", e)))
    }
}

/// Execute and deliver the single terminal notification.
fn drive(
    ctx: &Context,
    workflow: &Workflow,
    dry_run: bool,
    options: &RunOptions,
    mut observer: Box<dyn RunObserver>,
) -> RunOutcome {
    let started = Instant::now();
    let executed = Cell::new(0usize);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut run = Run {
            ctx,
            dry_run,
            backend: None,
            observer: observer.as_mut(),
            executed: &executed,
        };
        run.execute(workflow, options)
    }));

    let (state, error) = match result {
        Ok(End::Completed) => (RunState::Completed, None),
        Ok(End::Stopped) => (RunState::Stopped, None),
        Ok(End::Failed(e)) => (RunState::Failed, Some(e)),
        Err(_) => (
            RunState::Failed,
            Some(Error::new(ErrorCode::Unknown, "run panicked")),
        ),
    };
    let steps_executed = executed.get();
    let message = match (&state, &error) {
        (RunState::Completed, _) => "completed".to_string(),
        (RunState::Stopped, _) => "stopped".to_string(),
        (RunState::Failed, Some(e)) => e.to_string(),
        (RunState::Failed, None) => "failed".to_string(),
    };
    let outcome = RunOutcome {
        state,
        message,
        error,
        steps_executed,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        workflow = %workflow.name,
        state = ?outcome.state,
        steps = outcome.steps_executed,
        elapsed_ms = outcome.elapsed_ms,
        "run finished"
    );
    observer.on_finished(&outcome);
    outcome
}

enum End {
    Completed,
    Stopped,
    Failed(Error),
}

/// State of one run, living on the run thread.
struct Run<'a> {
    ctx: &'a Context,
    dry_run: bool,
    backend: Option<Arc<dyn Backend>>,
    observer: &'a mut dyn RunObserver,
    /// Lives outside the run so a panic cannot lose it.
    executed: &'a Cell<usize>,
}

impl Run<'_> {
    fn update(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(dry_run = self.dry_run, "{}", message);
        self.observer.on_update(message);
    }

    fn stop_requested(&self) -> bool {
        self.ctx.stop.load(Ordering::SeqCst)
    }

    /// Sleep between steps, returning early once a stop is requested.
    fn pause(&self, total: Duration) {
        let deadline = Instant::now().checked_add(total);
        while !self.stop_requested() {
            let left = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => STOP_POLL,
            };
            if left.is_zero() {
                return;
            }
            thread::sleep(left.min(STOP_POLL));
        }
    }

    /// Cap applied to every sleep while rehearsing.
    fn pace(&self, wanted: Duration) -> Duration {
        if self.dry_run {
            wanted.min(self.ctx.config.dry_run_delay_cap())
        } else {
            wanted
        }
    }

    fn execute(&mut self, workflow: &Workflow, options: &RunOptions) -> End {
        if workflow.is_empty() {
            self.update("Workflow completed");
            return End::Completed;
        }

        self.backend = self.ctx.registry.get_backend();
        match &self.backend {
            Some(b) => {
                let info = b.describe();
                self.update(format!("Selected backend: {} ({})", info.name, info.display));
            }
            None => self.update("No input backend available"),
        }

        let total = workflow.len();
        let mut iteration = 0u32;
        loop {
            iteration += 1;
            if iteration > 1 {
                self.update(options.repeat.label(iteration));
            }

            for (idx, step) in workflow.steps.iter().enumerate() {
                if idx > 0 || iteration > 1 {
                    self.pause(self.pace(options.step_delay.sample()));
                }
                if self.stop_requested() {
                    self.update("Execution stopped");
                    return End::Stopped;
                }

                self.update(format!("Step {}/{}: {}", idx + 1, total, step.summary()));
                if let Err(e) = self.dispatch(step.action()) {
                    tracing::error!(step = idx + 1, code = ?e.code, "step failed: {}", e);
                    self.update(format!("Step failed: {}", e));
                    return End::Failed(e);
                }
                self.executed.set(self.executed.get() + 1);
            }

            if !options.repeat.continues(iteration) {
                break;
            }
        }

        self.update("Workflow completed");
        End::Completed
    }

    fn dispatch(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Delay { seconds } => self.delay(seconds),
            Action::TypeText { text } => self.type_text(&text),
            Action::KeyPress { key } => self.key_press(&key),
            Action::FindAndClick {
                class,
                retries,
                confidence,
                button,
            } => self.find_and_click(&class, retries, confidence, button),
            Action::Unknown { kind } => self.unknown(&kind),
        }
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        self.backend.clone().ok_or_else(Error::backend_unavailable)
    }

    fn delay(&mut self, seconds: f64) -> Result<()> {
        let wanted = seconds_to_duration(seconds);
        if self.dry_run {
            tracing::info!("[dry] Delay {}s", seconds);
        }
        thread::sleep(self.pace(wanted));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("[dry] TypeText: {}", text);
            return Ok(());
        }
        self.backend()?.type_text(text)
    }

    fn key_press(&mut self, key: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("[dry] KeyPress: {}", key);
            return Ok(());
        }
        self.backend()?.press_key(key)
    }

    fn find_and_click(
        &mut self,
        class: &str,
        retries: u32,
        confidence: Option<f32>,
        button: MouseButton,
    ) -> Result<()> {
        let confidence = confidence.unwrap_or(self.ctx.config.confidence);

        if self.dry_run {
            tracing::info!("[dry] FindAndClick class={} retries={}", class, retries);
            if let Err(e) = self.resolve_template(class) {
                self.update(format!("[dry] FindAndClick: {}", e));
            }
            thread::sleep(self.pace(DRY_FIND_PAUSE));
            return Ok(());
        }

        let backend = self.backend()?;
        let template = self.resolve_template(class)?;
        for attempt in 1..=retries {
            match self.ctx.matcher.locate(backend.as_ref(), &template, confidence) {
                Ok(Some(point)) => {
                    tracing::info!(class, attempt, x = point.x, y = point.y, "template found");
                    return backend.click(point.x, point.y, button);
                }
                Ok(None) => tracing::debug!(class, attempt, retries, "template not on screen"),
                Err(e) => tracing::warn!(class, attempt, error = %e, "template probe failed"),
            }
            if attempt < retries {
                thread::sleep(self.ctx.config.retry_interval());
            }
        }

        Err(Error::template_not_on_screen(class, retries))
    }

    fn resolve_template(&self, class: &str) -> Result<std::path::PathBuf> {
        if class.is_empty() {
            return Err(Error::new(
                ErrorCode::TemplateNotFound,
                "FindAndClick step has no `class` parameter",
            ));
        }
        self.ctx.templates.resolve(class)
    }

    fn unknown(&mut self, kind: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("[dry] Unknown step {}", kind);
            return Ok(());
        }
        Err(Error::unknown_step(kind))
    }
}
