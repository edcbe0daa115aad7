//! Type-directed dependency-injection executor.
//!
//! This crate wires a set of user-supplied async functions into a directed
//! acyclic graph keyed by their parameter and return types: every function is
//! the unique producer of its output types, and any function whose parameter
//! has that type is a consumer. The graph is validated once at construction;
//! execution then runs every function concurrently, each starting as soon as
//! all of its inputs have been produced, and collects the results by type.
//!
//! Key modules:
//! - `engine`: the [`Engine`] and its builder: graph validation at
//!   construction time and the concurrent run loop with readiness latches,
//!   skip propagation and first-error cancellation.
//! - `function`: the typed registration layer. [`GraphFn`] captures a
//!   function's signature as a compiled descriptor and erases the call
//!   behind a uniform shape; [`Dependency`] marks the value types allowed to
//!   flow through the graph.
//! - `optional`: the [`Optional`] wrapper for parameters and outputs that
//!   tolerate or signal absence.
//! - `types`: [`TypeToken`], the type identity every graph edge is keyed on.
//!
//! Quick start:
//! 1. Define `Clone` newtypes for the values in your graph and mark each with
//!    `impl Dependency for ... {}`.
//! 2. Write async functions from input types to output types; add a
//!    [`CancellationToken`] parameter for cooperative cancellation and a
//!    `Result<_, anyhow::Error>` return where failure is possible.
//! 3. Build the engine with [`Engine::builder`] (or [`engine!`]), then call
//!    [`Engine::run`] with a cancellation handle and externally provided
//!    inputs.
//!
//! ```
//! use weft::{engine, provided, CancellationToken, Dependency, Optional};
//!
//! #[derive(Clone)]
//! struct Query(String);
//! impl Dependency for Query {}
//!
//! #[derive(Clone)]
//! struct Plan(String);
//! impl Dependency for Plan {}
//!
//! #[derive(Clone)]
//! struct Summary(String);
//! impl Dependency for Summary {}
//!
//! async fn plan(query: Query) -> Plan {
//!     Plan(format!("plan of {}", query.0))
//! }
//!
//! async fn summarize(plan: Optional<Plan>) -> Summary {
//!     match plan.into_inner() {
//!         Some(plan) => Summary(format!("summary of {}", plan.0)),
//!         None => Summary("nothing to summarize".into()),
//!     }
//! }
//!
//! # let _ = async {
//! let engine = engine!(plan, summarize)?;
//! let summaries = engine
//!     .run::<Summary>(&CancellationToken::new(), [provided(Query("q".into()))])
//!     .await?;
//! assert_eq!(summaries.len(), 1);
//! # Ok::<(), anyhow::Error>(())
//! # };
//! ```
//!
//! A function whose required input was never produced is skipped, which is
//! not an error; the absence propagates so that transitive consumers are
//! skipped too, while `Optional` parameters observe it instead. The first
//! function to return an error cancels everything still in flight and
//! becomes the result of the run.

/// The engine: graph construction, validation and the concurrent run loop.
pub mod engine;
/// Typed function registration and the compiled per-function descriptors.
pub mod function;
/// The [`Optional`] wrapper recognized by the engine.
pub mod optional;
mod sync;
/// Type identity underlying every graph edge.
pub mod types;
mod utils;

pub use engine::{provided, BuildError, Engine, EngineBuilder, Provided, RunError};
pub use function::{Dependency, GraphFn};
pub use optional::Optional;
pub use types::TypeToken;

/// The cancellation handle bound to context parameters, re-exported from
/// `tokio-util`.
pub use tokio_util::sync::CancellationToken;

/// Builds an [`Engine`] from a list of functions, equivalent to chaining
/// [`EngineBuilder::register`] calls:
///
/// ```
/// # use weft::{engine, Dependency};
/// # #[derive(Clone)]
/// # struct Id(u32);
/// # impl Dependency for Id {}
/// # #[derive(Clone)]
/// # struct Name(String);
/// # impl Dependency for Name {}
/// # async fn name_of(id: Id) -> Name { Name(id.0.to_string()) }
/// let engine = engine!(name_of)?;
/// # Ok::<(), weft::BuildError>(())
/// ```
#[macro_export]
macro_rules! engine {
    ($($function:expr),+ $(,)?) => {
        $crate::Engine::builder()$(.register($function))+.build()
    };
}
