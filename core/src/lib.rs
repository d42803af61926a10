//! Matrixrun core: a declarative session orchestration engine.
//!
//! Declared sessions are registered into a [`SessionStore`], expanded into
//! concrete instances over their interpreter matrix and parametrize axes,
//! narrowed by [`Criteria`], executed through a [`Runner`], and summarized
//! into a [`Report`] that always follows selection order.
//!
//! ```text
//! SessionStore → expand → select → Engine → summarize
//! ```

pub mod config;
pub mod errors;
pub mod execution;
pub mod orchestrator;
pub mod report;
pub mod session;

pub use errors::Error;
pub use execution::context::{Session, Signal};
pub use execution::engine::{Engine, EngineOptions};
pub use execution::runner::{MockRunner, Runner, ShellRunner};
pub use orchestrator::{Invocation, Orchestrator, Plan};
pub use report::{Report, ReportPolicy, RunResult, Status};
pub use session::select::Criteria;
pub use session::store::SessionStore;
pub use session::{SessionBody, SessionDefinition, SessionInstance};
