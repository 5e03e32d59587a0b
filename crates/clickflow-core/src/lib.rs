//! clickflow-core - workflow execution engine for GUI automation
//!
//! Replays a declarative list of steps (delays, typing, key presses, and
//! "find this image on screen and click it") through whichever input backend
//! the host supports.
//!
//! ## Pieces
//!
//! - **backend**: the [`Backend`] capability trait and built-in implementations
//! - **registry**: discovers usable backends and picks one by priority
//! - **workflow** / **step**: the serializable workflow model
//! - **templates** / **matcher**: template lookup and on-screen matching
//! - **executor**: cancellable, observable runs on a dedicated thread
//! - **storage** / **config**: workflow files and engine settings

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod options;
pub mod registry;
pub mod step;
pub mod storage;
pub mod templates;
pub mod workflow;

pub use backend::{Backend, BackendInfo, InitError, MouseButton, Point, Region};
pub use config::EngineConfig;
pub use error::{Error, ErrorCode, Result};
pub use executor::{Executor, RunEvent, RunHandle, RunObserver, RunOutcome, RunState};
pub use matcher::{Match, ScreenMatcher, TemplateMatcher};
pub use options::{Repeat, RunOptions, StepDelay};
pub use registry::BackendRegistry;
pub use step::{Action, Params, Step, StepKind};
pub use storage::WorkflowStorage;
pub use templates::TemplateStore;
pub use workflow::Workflow;

pub mod prelude {
    pub use crate::backend::{Backend, BackendInfo, MouseButton, Point, Region};
    pub use crate::config::EngineConfig;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::executor::{Executor, RunEvent, RunHandle, RunOutcome, RunState};
    pub use crate::options::{Repeat, RunOptions, StepDelay};
    pub use crate::registry::BackendRegistry;
    pub use crate::step::{Step, StepKind};
    pub use crate::storage::WorkflowStorage;
    pub use crate::templates::TemplateStore;
    pub use crate::workflow::Workflow;
}
