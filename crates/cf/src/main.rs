//! cf - clickflow CLI
//!
//! Run, rehearse and inspect GUI automation workflows from the shell.
//! Results go to stdout as a JSON envelope; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use clickflow::prelude::*;
use clickflow::storage::load_file;
use clickflow::{ScreenMatcher, TemplateMatcher};

#[derive(Parser)]
#[command(name = "cf")]
#[command(about = "clickflow - replay declarative GUI workflows")]
#[command(version)]
struct Cli {
    /// Engine settings file (YAML or JSON)
    #[arg(long, global = true, env = "CLICKFLOW_CONFIG")]
    config: Option<PathBuf>,
    /// Backend priority, comma separated (overrides config)
    #[arg(long, global = true, value_delimiter = ',')]
    backends: Option<Vec<String>>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // === Workflow Commands ===
    /// Run a workflow file
    Run {
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
        /// Run the workflow N times
        #[arg(long, conflicts_with = "forever")]
        times: Option<u32>,
        /// Loop until Ctrl+C
        #[arg(long)]
        forever: bool,
        /// Fixed pause between steps, in seconds
        #[arg(long, conflicts_with_all = ["delay_min", "delay_max"])]
        delay: Option<f64>,
        #[arg(long, requires = "delay_max")]
        delay_min: Option<f64>,
        #[arg(long, requires = "delay_min")]
        delay_max: Option<f64>,
        /// Template classes directory
        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Check a workflow with a dry run
    Validate {
        file: PathBuf,
        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// List saved workflows
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show a workflow
    Show {
        file: PathBuf,
    },

    // === Desktop Commands ===
    /// Discover input backends
    Backends,
    /// Take a screenshot
    Screenshot {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// x,y,width,height
        #[arg(long)]
        region: Option<Region>,
    },
    /// Click at screen coordinates
    ClickAt {
        x: i32,
        y: i32,
        #[arg(long, default_value = "left")]
        button: MouseButton,
    },
    /// Type text
    Type {
        text: String,
    },
    /// Press a key
    Press {
        key: String,
        #[arg(long, default_value = "1")]
        repeat: u32,
        #[arg(long, default_value = "100")]
        delay: u64,
    },
    /// Find a template class on screen without clicking
    Locate {
        class: String,
        #[arg(long)]
        templates: Option<PathBuf>,
        #[arg(long)]
        confidence: Option<f32>,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clickflow_core=info,cf=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref(), cli.backends) {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };

    let result: Result<bool> = match cli.command {
        Commands::Run { file, dry_run, times, forever, delay, delay_min, delay_max, templates } => {
            let options = RunOptions::default()
                .repeat(repeat_from(times, forever))
                .step_delay(step_delay_from(delay, delay_min, delay_max));
            cmd_run(with_templates(config, templates), &file, dry_run, options)
        }
        Commands::Validate { file, templates } => cmd_validate(with_templates(config, templates), &file),
        Commands::List { dir } => cmd_list(&config, dir.as_deref()),
        Commands::Show { file } => cmd_show(&file),
        Commands::Backends => cmd_backends(&config),
        Commands::Screenshot { output, region } => cmd_screenshot(&config, output, region),
        Commands::ClickAt { x, y, button } => cmd_click_at(&config, x, y, button),
        Commands::Type { text } => cmd_type(&config, &text),
        Commands::Press { key, repeat, delay } => cmd_press(&config, &key, repeat, delay),
        Commands::Locate { class, templates, confidence } => {
            cmd_locate(with_templates(config, templates), &class, confidence)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => exit_with(e),
    }
}

fn exit_with(e: anyhow::Error) -> ! {
    match e.downcast_ref::<Error>() {
        Some(err) => print_json(&Output::<()>::err(err.clone())),
        None => eprintln!("Error: {:#}", e),
    }
    std::process::exit(1);
}

fn load_config(path: Option<&Path>, backends: Option<Vec<String>>) -> Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = config.from_env();
    if let Some(names) = backends {
        config.backend_priority = names;
    }
    config.validate()?;
    tracing::debug!(?config, "engine config");
    Ok(config)
}

fn with_templates(mut config: EngineConfig, templates: Option<PathBuf>) -> EngineConfig {
    if templates.is_some() {
        config.templates_dir = templates;
    }
    config
}

fn repeat_from(times: Option<u32>, forever: bool) -> Repeat {
    match (times, forever) {
        (_, true) => Repeat::Forever,
        (Some(n), false) if n > 1 => Repeat::Times(n),
        _ => Repeat::Once,
    }
}

fn step_delay_from(fixed: Option<f64>, min: Option<f64>, max: Option<f64>) -> StepDelay {
    match (fixed, min, max) {
        (Some(s), _, _) => StepDelay::Fixed(s),
        (None, Some(min), Some(max)) => StepDelay::Random { min, max },
        _ => StepDelay::None,
    }
}

fn backend_for(config: &EngineConfig) -> Result<Arc<dyn Backend>> {
    let registry = BackendRegistry::new(config.backend_priority.clone());
    let backend = registry.get_backend().ok_or_else(Error::backend_unavailable)?;
    tracing::debug!(backend = %backend.describe().name, "selected backend");
    Ok(backend)
}

// ══════════════════════════════════════════════════════════════════════════════
//  Workflow commands
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct RunReport {
    workflow: String,
    dry_run: bool,
    #[serde(flatten)]
    outcome: RunOutcome,
    updates: Vec<String>,
}

fn execute(executor: &Executor, workflow: Workflow, dry_run: bool, options: RunOptions) -> Result<RunReport> {
    let name = workflow.name.clone();
    let handle = executor.run(workflow, dry_run, options)?;
    let mut updates = Vec::new();
    for event in handle.events() {
        if let RunEvent::Update(msg) = event {
            updates.push(msg);
        }
    }
    Ok(RunReport { workflow: name, dry_run, outcome: handle.wait(), updates })
}

fn cmd_run(config: EngineConfig, file: &Path, dry_run: bool, options: RunOptions) -> Result<bool> {
    let workflow = load_file(file)?;
    workflow.validate()?;
    let executor = Arc::new(Executor::from_config(config));

    let e = executor.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, stopping after the current step");
        e.stop();
    })?;

    let report = execute(&executor, workflow, dry_run, options)?;
    let success = report.outcome.success();
    let error = report.outcome.error.clone();
    print_json(&Output { success, data: Some(report), error });
    Ok(success)
}

#[derive(Serialize)]
struct Validation {
    name: String,
    steps: usize,
    unknown_steps: Vec<String>,
    template_problems: Vec<String>,
}

fn cmd_validate(config: EngineConfig, file: &Path) -> Result<bool> {
    let workflow = load_file(file)?;
    workflow.validate()?;

    let unknown_steps: Vec<String> = workflow
        .steps
        .iter()
        .filter(|s| !s.kind().is_known())
        .map(|s| s.kind().to_string())
        .collect();
    let executor = Executor::from_config(config);
    let report = execute(&executor, workflow, true, RunOptions::default())?;
    let template_problems: Vec<String> = report
        .updates
        .iter()
        .filter_map(|u| u.strip_prefix("[dry] FindAndClick: "))
        .map(str::to_string)
        .collect();

    let success = report.outcome.success() && unknown_steps.is_empty() && template_problems.is_empty();
    let data = Validation {
        name: report.workflow,
        steps: report.outcome.steps_executed,
        unknown_steps,
        template_problems,
    };
    print_json(&Output { success, data: Some(data), error: report.outcome.error });
    Ok(success)
}

#[derive(Serialize)]
struct Listed {
    path: PathBuf,
    name: String,
    steps: usize,
}

fn cmd_list(config: &EngineConfig, dir: Option<&Path>) -> Result<bool> {
    let dirs: Vec<PathBuf> = match dir {
        Some(d) => vec![d.to_path_buf()],
        None => project_workflow_dirs(&config.projects_dir)?,
    };

    let mut listed = Vec::new();
    for d in dirs {
        for (path, wf) in WorkflowStorage::open(&d).list()? {
            listed.push(Listed { path, steps: wf.len(), name: wf.name });
        }
    }
    print_json(&Output::ok(listed));
    Ok(true)
}

/// `<projects>/<project>/workflows` for every project that has one.
fn project_workflow_dirs(projects: &Path) -> Result<Vec<PathBuf>> {
    if !projects.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(projects)? {
        let dir = entry?.path().join("workflows");
        if dir.is_dir() {
            dirs.push(dir);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn cmd_show(file: &Path) -> Result<bool> {
    let workflow = load_file(file)?;
    let summaries: Vec<String> = workflow.steps.iter().map(|s| s.summary()).collect();
    print_json(&Output::ok(serde_json::json!({
        "path": file,
        "name": workflow.name,
        "steps": workflow.len(),
        "summary": summaries,
        "workflow": workflow.to_value(),
    })));
    Ok(true)
}

// ══════════════════════════════════════════════════════════════════════════════
//  Desktop commands
// ══════════════════════════════════════════════════════════════════════════════

fn cmd_backends(config: &EngineConfig) -> Result<bool> {
    let registry = BackendRegistry::new(config.backend_priority.clone());
    registry.discover();
    let failures: Vec<_> = registry
        .failures()
        .into_iter()
        .map(|(name, reason)| serde_json::json!({ "name": name, "reason": reason.to_string() }))
        .collect();
    let selected = registry.get_backend().map(|b| b.describe().name);
    print_json(&Output::ok(serde_json::json!({
        "priority": registry.priority(),
        "known": registry.known(),
        "available": registry.available(),
        "failures": failures,
        "selected": selected,
    })));
    Ok(true)
}

fn cmd_screenshot(config: &EngineConfig, output: Option<PathBuf>, region: Option<Region>) -> Result<bool> {
    let backend = backend_for(config)?;
    let image = backend.capture(region)?;
    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!("screenshot-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S")))
    });
    image.save(&path).with_context(|| format!("writing {}", path.display()))?;
    print_json(&Output::ok(serde_json::json!({
        "path": path,
        "width": image.width(),
        "height": image.height(),
    })));
    Ok(true)
}

fn cmd_click_at(config: &EngineConfig, x: i32, y: i32, button: MouseButton) -> Result<bool> {
    backend_for(config)?.click(x, y, button)?;
    print_json(&Output::ok(serde_json::json!({ "x": x, "y": y, "button": button })));
    Ok(true)
}

fn cmd_type(config: &EngineConfig, text: &str) -> Result<bool> {
    backend_for(config)?.type_text(text)?;
    print_json(&Output::ok(serde_json::json!({ "typed": text.chars().count() })));
    Ok(true)
}

fn cmd_press(config: &EngineConfig, key: &str, repeat: u32, delay: u64) -> Result<bool> {
    let backend = backend_for(config)?;
    for i in 0..repeat {
        if i > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        backend.press_key(key)?;
    }
    print_json(&Output::ok(serde_json::json!({ "key": key, "count": repeat })));
    Ok(true)
}

fn cmd_locate(config: EngineConfig, class: &str, confidence: Option<f32>) -> Result<bool> {
    let template = config.template_store().resolve(class)?;
    let backend = backend_for(&config)?;
    let confidence = confidence.unwrap_or(config.confidence);
    let found = ScreenMatcher.locate(backend.as_ref(), &template, confidence)?;
    print_json(&Output::ok(serde_json::json!({
        "class": class,
        "template": template,
        "confidence": confidence,
        "found": found,
    })));
    Ok(found.is_some())
}
