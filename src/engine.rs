mod run;
mod validate;

pub use run::{provided, Provided, RunError};
pub use validate::BuildError;

#[doc(hidden)]
pub use run::IntoProvided;

use crate::{
    function::{Dependency, ErasedCall, FunctionSpec, GraphFn},
    types::{IndexMap, TypeToken},
};
use derive_more::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A registered function: its compiled descriptor plus the type-erased call.
#[derive(Debug)]
pub(crate) struct FunctionEntry {
    pub(crate) spec: FunctionSpec,
    #[debug(skip)]
    pub(crate) call: ErasedCall,
}

/// An immutable, validated set of functions wired into a dependency graph by
/// their parameter and return types.
///
/// Built once via [`Engine::builder`] (or the [`engine!`](macro@crate::engine)
/// macro); afterwards the graph cannot change, and the engine may be shared
/// freely across threads and concurrent [`run`](Engine::run) calls.
///
/// Each registered function is the unique producer of its unwrapped output
/// types. At run time every function executes as one task, starting as soon
/// as all of its inputs are resolved; functions whose required inputs are
/// absent are skipped, and the skip propagates to their dependents.
#[must_use]
#[derive(Debug)]
pub struct Engine {
    functions: Vec<Arc<FunctionEntry>>,
    /// Unwrapped produced type to the index of its producing function.
    producers: IndexMap<TypeToken, usize>,
}

impl Engine {
    /// Starts an empty builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Whether a registered function produces a value of type `T`.
    #[must_use]
    pub fn produces<T: Dependency>(&self) -> bool {
        self.producers.contains_key(&TypeToken::of::<T>())
    }

    /// The unwrapped types produced by the registered functions, in
    /// registration-derived order.
    pub fn produced(&self) -> impl Iterator<Item = TypeToken> + '_ {
        self.producers.keys().copied()
    }

    /// Executes every registered function concurrently and collects all
    /// produced values whose runtime type is exactly `R`.
    ///
    /// `cancel` is the caller's cancellation handle; deadlines are expressed
    /// by cancelling it externally. Each function observes a child token
    /// (bound to its [`CancellationToken`] parameter, when declared) which is
    /// also cancelled as soon as any function returns an error; the first
    /// error wins and is returned verbatim. Skipped functions are not
    /// errors.
    ///
    /// `provided` seeds the value store with external inputs. No provided
    /// type may repeat or collide with a produced type, and `R` itself must
    /// be a produced type.
    ///
    /// ```
    /// use weft::{provided, CancellationToken, Dependency, Engine};
    ///
    /// #[derive(Clone)]
    /// struct Base(u32);
    /// impl Dependency for Base {}
    ///
    /// #[derive(Clone)]
    /// struct Doubled(u32);
    /// impl Dependency for Doubled {}
    ///
    /// async fn double(base: Base) -> Doubled {
    ///     Doubled(base.0 * 2)
    /// }
    ///
    /// # let _ = async {
    /// let engine = Engine::builder().register(double).build()?;
    /// let doubled = engine
    ///     .run::<Doubled>(&CancellationToken::new(), [provided(Base(21))])
    ///     .await?;
    /// assert_eq!(doubled[0].0, 42);
    /// # Ok::<(), anyhow::Error>(())
    /// # };
    /// ```
    pub async fn run<R: Dependency>(
        &self,
        cancel: &CancellationToken,
        provided: impl IntoIterator<Item = Provided>,
    ) -> Result<Vec<R>, RunError> {
        run::run(self, cancel, provided.into_iter().collect()).await
    }
}

/// Accumulates functions for [`Engine`] construction.
///
/// Registration order is irrelevant to execution; it only affects which
/// validation error is reported first.
#[must_use]
#[derive(Debug, Default)]
pub struct EngineBuilder {
    functions: Vec<Arc<FunctionEntry>>,
}

impl EngineBuilder {
    /// Registers one function. See [`crate::GraphFn`] for the accepted
    /// signatures.
    pub fn register<M>(mut self, function: impl GraphFn<M>) -> Self {
        let spec = function.spec();
        let call = function.into_erased();
        self.functions.push(Arc::new(FunctionEntry { spec, call }));
        self
    }

    /// Validates the registered set and produces the immutable [`Engine`].
    pub fn build(self) -> Result<Engine, BuildError> {
        let producers = validate::validate(&self.functions)?;
        debug!(
            functions = self.functions.len(),
            produced = producers.len(),
            "engine built"
        );
        Ok(Engine {
            functions: self.functions,
            producers,
        })
    }
}
