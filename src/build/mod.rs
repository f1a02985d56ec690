//! Build pipeline module for kiln
//!
//! Drives build passes over a front-end project: markup rendering, stylesheet
//! compilation, script bundling, style assembly and static copying.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Resolution**: Turn the stored [`BuildConfig`] into a per-pass [`BuildContext`]
//! - **Gating**: Ask the [`StageGate`] which stages the change set affects
//! - **Execution**: Run the stages in order, per-file work concurrently
//!
//! # Example
//!
//! ```ignore
//! use kiln::build::{BuildConfig, BuildMode, PipelineOrchestrator};
//! use kiln::config::load_config;
//!
//! let config = load_config(None)?;
//! let orchestrator = PipelineOrchestrator::new(BuildConfig::from_config(&config, "."));
//!
//! let report = orchestrator.run_pass(BuildMode::Full).await?;
//! println!("{}", report.summary());
//! ```

pub mod assemble;
pub mod change;
pub mod context;
pub mod debounce;
pub mod error;
pub mod markup;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod scripts;
pub mod stage;
pub mod static_copy;
pub mod styles;

pub use assemble::{merge_fragments, AssemblyOutcome, FragmentOrigin, StyleAssembler, StyleFragment};
pub use change::*;
pub use context::*;
pub use debounce::*;
pub use error::*;
pub use pipeline::*;
pub use progress::*;
pub use result::*;
pub use stage::*;
