use crate::{
    engine::{Engine, FunctionEntry},
    function::{marker, CallOutcome, Dependency, ParamSpec},
    optional::Optional,
    sync::{SignalTable, ValueStore},
    types::{ErasedValue, HashSet, TypeToken},
};
use derive_more::Debug;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Error returned by [`Engine::run`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Two provided inputs share the same unwrapped type.
    #[error("duplicate provided input type: {0}")]
    DuplicateProvidedInput(&'static str),

    /// A provided input's unwrapped type is produced by a registered
    /// function.
    #[error("provided input type matches function output type: {0}")]
    ProvidedInputIsProduced(&'static str),

    /// The requested result type is not produced by any registered function.
    #[error("result type {0} does not match any function output type")]
    UnknownResultType(&'static str),

    /// The run was interrupted by the cancellation token.
    #[error("context cancelled")]
    Cancelled,

    /// The first error returned by a registered function, verbatim.
    #[error(transparent)]
    Function(#[from] anyhow::Error),
}

/// An input value handed to [`Engine::run`], erased behind its unwrapped
/// type identity. Build one with [`provided`].
#[must_use]
#[derive(Debug)]
pub struct Provided {
    token: TypeToken,
    #[debug(skip)]
    value: Option<ErasedValue>,
}

/// Erases a run input: any [`Dependency`] value, or an [`Optional`] of one.
/// A set optional is stored unwrapped; an unset optional marks its inner
/// type as deliberately absent.
pub fn provided<M>(value: impl IntoProvided<M>) -> Provided {
    value.into_provided()
}

#[doc(hidden)]
pub trait IntoProvided<M> {
    fn into_provided(self) -> Provided;
}

impl<T: Dependency> IntoProvided<marker::Plain> for T {
    fn into_provided(self) -> Provided {
        Provided {
            token: TypeToken::of::<T>(),
            value: Some(Arc::new(self)),
        }
    }
}

impl<T: Dependency> IntoProvided<marker::Opt> for Optional<T> {
    fn into_provided(self) -> Provided {
        Provided {
            token: TypeToken::of::<T>(),
            value: self
                .into_inner()
                .map(|value| Arc::new(value) as ErasedValue),
        }
    }
}

pub(crate) async fn run<R: Dependency>(
    engine: &Engine,
    cancel: &CancellationToken,
    provided: Vec<Provided>,
) -> Result<Vec<R>, RunError> {
    validate_provided(engine, &provided)?;

    let result_token = TypeToken::of::<R>();
    if !engine.producers.contains_key(&result_token) {
        return Err(RunError::UnknownResultType(result_token.name()));
    }

    let store = Arc::new(ValueStore::new());
    for input in provided {
        if let Some(value) = input.value {
            store.insert(input.token, value);
        }
    }

    let signals = Arc::new(SignalTable::for_types(engine.producers.keys().copied()));
    // Derived handle: the first failing task cancels it for everyone else.
    let context = cancel.child_token();

    debug!(functions = engine.functions.len(), "run started");

    let mut tasks = JoinSet::new();
    for entry in &engine.functions {
        tasks.spawn(drive(
            Arc::clone(entry),
            context.clone(),
            Arc::clone(&store),
            Arc::clone(&signals),
        ));
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                if first_error.is_none() {
                    debug!(%error, "task failed, cancelling the remaining tasks");
                    context.cancel();
                    first_error = Some(error);
                }
            }
            Err(join_error) => match join_error.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(join_error) => {
                    unreachable!("Engine::run: task aborted unexpectedly: {join_error}")
                }
            },
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }

    let produced = &engine.producers;
    Ok(store.collect(|token| produced.contains_key(&token)))
}

fn validate_provided(engine: &Engine, provided: &[Provided]) -> Result<(), RunError> {
    let mut seen = HashSet::default();
    for input in provided {
        if !seen.insert(input.token) {
            return Err(RunError::DuplicateProvidedInput(input.token.name()));
        }
        if engine.producers.contains_key(&input.token) {
            return Err(RunError::ProvidedInputIsProduced(input.token.name()));
        }
    }
    Ok(())
}

/// Runs one registered function to completion: resolves each parameter slot
/// in declared order (waiting on the readiness latch where a producer
/// exists), invokes the call, then stores and broadcasts its outputs. A
/// skipped function broadcasts absence so that downstream tasks unblock.
async fn drive(
    entry: Arc<FunctionEntry>,
    context: CancellationToken,
    store: Arc<ValueStore>,
    signals: Arc<SignalTable>,
) -> Result<(), RunError> {
    let mut inputs = Vec::with_capacity(entry.spec.params.len());
    for param in &entry.spec.params {
        match param {
            ParamSpec::Context => inputs.push(None),
            ParamSpec::Required(token) | ParamSpec::Optional(token) => {
                if signals.wait(&context, *token).await.is_err() {
                    trace!(function = %entry.spec.name, "input wait interrupted");
                    return Err(RunError::Cancelled);
                }
                inputs.push(store.get(*token));
            }
        }
    }

    match (entry.call)(context.clone(), inputs).await {
        CallOutcome::Produced(outputs) => {
            for output in outputs {
                // Store before opening the latch; consumers read after it.
                if let Some(value) = output.value {
                    store.insert(output.token, value);
                }
                signals.broadcast(output.token);
            }
            Ok(())
        }
        CallOutcome::Skipped => {
            trace!(function = %entry.spec.name, "skipped: a required input is absent");
            for slot in &entry.spec.returns {
                signals.broadcast(slot.unwrapped());
            }
            Ok(())
        }
        CallOutcome::Failed(error) => {
            debug_assert!(entry.spec.fallible, "drive: infallible function reported an error");
            Err(RunError::Function(error))
        }
    }
}
