//! # clickflow
//!
//! Replay declarative GUI workflows on the local desktop.
//!
//! A workflow is a named list of steps: delays, typed text, key presses, and
//! "find this image on screen and click it". The executor runs it on a
//! background thread through whichever input backend the host supports.
//!
//! ## Features
//!
//! - **Backends**: xdotool (X11), ydotool (Wayland), osascript (macOS), and
//!   enigo behind the `native` feature
//! - **Dry run**: rehearse a workflow without touching the desktop
//! - **Templates**: per-class reference images matched on screen
//! - **Cancellation**: stop between steps, from any thread
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clickflow::prelude::*;
//!
//! let workflow = Workflow::new("login")
//!     .step(Step::find_and_click("username", 3))
//!     .step(Step::type_text("alice"))
//!     .step(Step::key_press("Return"));
//!
//! let executor = Executor::from_config(EngineConfig::default().from_env());
//! let run = executor.run(workflow, false, RunOptions::default())?;
//! for event in run.events() {
//!     if let RunEvent::Update(msg) = event {
//!         println!("{}", msg);
//!     }
//! }
//! let outcome = run.wait();
//! println!("{}: {}", outcome.success(), outcome.message);
//! # Ok::<(), clickflow::Error>(())
//! ```

pub use clickflow_core::*;

/// Prelude - import everything you need
pub mod prelude {
    pub use clickflow_core::prelude::*;
}
