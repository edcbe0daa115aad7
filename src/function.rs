use crate::{
    optional::Optional,
    types::{ErasedValue, TypeToken},
    utils,
};
use core::future::Future;
use std::{pin::Pin, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Marker for value types that can flow through an engine graph.
///
/// Every parameter and output of a registered function (other than the
/// cancellation token and the error of a fallible return) must implement it:
///
/// ```
/// #[derive(Clone)]
/// struct Invoice(String);
///
/// impl weft::Dependency for Invoice {}
/// ```
///
/// The trait is deliberately not implemented for any foreign type: graph
/// nodes are expected to be crate-local newtypes, which is also what makes
/// their [`TypeToken`] identities meaningful.
pub trait Dependency: Clone + Send + Sync + 'static {}

/// One parameter slot of a registered function.
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSpec {
    /// Binds the run-scoped cancellation token.
    Context,
    Required(TypeToken),
    Optional(TypeToken),
}

impl ParamSpec {
    /// The unwrapped type identity this slot resolves through.
    pub(crate) fn unwrapped(self) -> TypeToken {
        match self {
            Self::Context => TypeToken::of::<CancellationToken>(),
            Self::Required(token) | Self::Optional(token) => token,
        }
    }

    pub(crate) fn is_context(self) -> bool {
        matches!(self, Self::Context)
    }
}

/// One non-error output slot of a registered function.
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnSpec {
    Value(TypeToken),
    Optional(TypeToken),
}

impl ReturnSpec {
    pub(crate) fn unwrapped(self) -> TypeToken {
        match self {
            Self::Value(token) | Self::Optional(token) => token,
        }
    }
}

/// Compiled descriptor of a registered function: its display name, ordered
/// parameter slots, ordered output slots, and whether the return carries an
/// error.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) returns: Vec<ReturnSpec>,
    pub(crate) fallible: bool,
}

impl FunctionSpec {
    fn new<F>(params: Vec<ParamSpec>, (returns, fallible): (Vec<ReturnSpec>, bool)) -> Self {
        Self {
            name: utils::display_name::<F>(&params, &returns, fallible),
            params,
            returns,
            fallible,
        }
    }
}

/// One output of a completed call, keyed by its unwrapped type. `value` is
/// `None` when an optional output came back unset.
#[doc(hidden)]
pub struct ProducedValue {
    pub(crate) token: TypeToken,
    pub(crate) value: Option<ErasedValue>,
}

/// What a type-erased call resolved to.
#[doc(hidden)]
pub enum CallOutcome {
    /// A required input was absent; the user function was never invoked.
    Skipped,
    Failed(anyhow::Error),
    Produced(Vec<ProducedValue>),
}

#[doc(hidden)]
pub type CallFuture = Pin<Box<dyn Future<Output = CallOutcome> + Send>>;

/// A registered function erased to a uniform shape: the run-scoped token plus
/// one resolved store value per parameter slot (`None` for context slots and
/// absent values), yielding a [`CallOutcome`].
#[doc(hidden)]
pub type ErasedCall = Arc<dyn Fn(CancellationToken, Vec<Option<ErasedValue>>) -> CallFuture + Send + Sync>;

/// Inference markers distinguishing the slot kinds. Tuples of these select
/// the [`GraphFn`] impl for a given signature.
#[doc(hidden)]
pub mod marker {
    pub enum Plain {}
    pub enum Opt {}
    pub enum Ctx {}
    pub enum Pure {}
    pub enum Fallible {}
}

/// A parameter slot: a required dependency, an [`Optional`] dependency, or
/// the cancellation token.
#[doc(hidden)]
pub trait FnParam<M>: Sized + Send + 'static {
    fn spec() -> ParamSpec;
    /// Binds the slot from the resolved store value. `None` skips the
    /// function.
    fn bind(context: &CancellationToken, value: Option<&ErasedValue>) -> Option<Self>;
}

impl<T: Dependency> FnParam<marker::Plain> for T {
    fn spec() -> ParamSpec {
        ParamSpec::Required(TypeToken::of::<T>())
    }

    fn bind(_: &CancellationToken, value: Option<&ErasedValue>) -> Option<Self> {
        value.map(|value| {
            value
                .downcast_ref::<T>()
                .expect("FnParam::bind: value store holds a foreign value under this type")
                .clone()
        })
    }
}

impl<T: Dependency> FnParam<marker::Opt> for Optional<T> {
    fn spec() -> ParamSpec {
        ParamSpec::Optional(TypeToken::of::<T>())
    }

    fn bind(_: &CancellationToken, value: Option<&ErasedValue>) -> Option<Self> {
        Some(match value {
            Some(value) => Optional::of(
                value
                    .downcast_ref::<T>()
                    .expect("FnParam::bind: value store holds a foreign value under this type")
                    .clone(),
            ),
            None => Optional::empty(),
        })
    }
}

impl FnParam<marker::Ctx> for CancellationToken {
    fn spec() -> ParamSpec {
        ParamSpec::Context
    }

    fn bind(context: &CancellationToken, _: Option<&ErasedValue>) -> Option<Self> {
        Some(context.clone())
    }
}

/// A single output slot: a plain or an [`Optional`] dependency value.
#[doc(hidden)]
pub trait FnOutput<M>: Sized + Send + 'static {
    fn spec() -> ReturnSpec;
    fn into_produced(self) -> ProducedValue;
}

impl<T: Dependency> FnOutput<marker::Plain> for T {
    fn spec() -> ReturnSpec {
        ReturnSpec::Value(TypeToken::of::<T>())
    }

    fn into_produced(self) -> ProducedValue {
        ProducedValue {
            token: TypeToken::of::<T>(),
            value: Some(Arc::new(self)),
        }
    }
}

impl<T: Dependency> FnOutput<marker::Opt> for Optional<T> {
    fn spec() -> ReturnSpec {
        ReturnSpec::Optional(TypeToken::of::<T>())
    }

    fn into_produced(self) -> ProducedValue {
        ProducedValue {
            token: TypeToken::of::<T>(),
            value: self
                .into_inner()
                .map(|value| Arc::new(value) as ErasedValue),
        }
    }
}

/// The non-error part of a return: one output slot or a tuple of them.
#[doc(hidden)]
pub trait FnOutputs<M>: Sized + Send + 'static {
    fn specs() -> Vec<ReturnSpec>;
    fn into_produced(self) -> Vec<ProducedValue>;
}

impl<T: FnOutput<M>, M> FnOutputs<(M,)> for T {
    fn specs() -> Vec<ReturnSpec> {
        vec![<T as FnOutput<M>>::spec()]
    }

    fn into_produced(self) -> Vec<ProducedValue> {
        vec![<T as FnOutput<M>>::into_produced(self)]
    }
}

macro_rules! impl_fn_outputs {
    ($(($T:ident, $M:ident, $index:tt)),+) => {
        impl<$($T: FnOutput<$M>,)+ $($M,)+> FnOutputs<($($M,)+)> for ($($T,)+) {
            fn specs() -> Vec<ReturnSpec> {
                vec![$(<$T as FnOutput<$M>>::spec(),)+]
            }

            fn into_produced(self) -> Vec<ProducedValue> {
                vec![$(<$T as FnOutput<$M>>::into_produced(self.$index),)+]
            }
        }
    };
}

impl_fn_outputs!((T0, M0, 0), (T1, M1, 1));
impl_fn_outputs!((T0, M0, 0), (T1, M1, 1), (T2, M2, 2));
impl_fn_outputs!((T0, M0, 0), (T1, M1, 1), (T2, M2, 2), (T3, M3, 3));

/// The full return shape: infallible outputs or a `Result` of them.
#[doc(hidden)]
pub trait FnReturn<M>: Sized + Send + 'static {
    fn specs() -> (Vec<ReturnSpec>, bool);
    fn into_outcome(self) -> CallOutcome;
}

impl<T: FnOutputs<M>, M> FnReturn<(marker::Pure, M)> for T {
    fn specs() -> (Vec<ReturnSpec>, bool) {
        (<T as FnOutputs<M>>::specs(), false)
    }

    fn into_outcome(self) -> CallOutcome {
        CallOutcome::Produced(<T as FnOutputs<M>>::into_produced(self))
    }
}

impl<T: FnOutputs<M>, M> FnReturn<(marker::Fallible, M)> for Result<T, anyhow::Error> {
    fn specs() -> (Vec<ReturnSpec>, bool) {
        (<T as FnOutputs<M>>::specs(), true)
    }

    fn into_outcome(self) -> CallOutcome {
        match self {
            Ok(outputs) => CallOutcome::Produced(<T as FnOutputs<M>>::into_produced(outputs)),
            Err(error) => CallOutcome::Failed(error),
        }
    }
}

/// An async function registrable with [`crate::EngineBuilder::register`].
///
/// Implemented for `Fn`s of zero to eight parameters. Each parameter is a
/// [`Dependency`], an [`Optional`] of one, or a [`CancellationToken`]; the
/// return is a [`Dependency`], an [`Optional`] of one, a tuple of up to four
/// of those, or a `Result` of any of the former with [`anyhow::Error`]. The
/// marker parameter `M` is inferred and never written by callers.
pub trait GraphFn<M>: Sized {
    #[doc(hidden)]
    fn spec(&self) -> FunctionSpec;
    #[doc(hidden)]
    fn into_erased(self) -> ErasedCall;
}

macro_rules! impl_graph_fn {
    ($(($P:ident, $M:ident, $value:ident)),*) => {
        impl<F, Fut, R, MR $(, $P, $M)*> GraphFn<($(($P, $M),)* MR,)> for F
        where
            F: Fn($($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: FnReturn<MR>,
            $($P: FnParam<$M>,)*
        {
            fn spec(&self) -> FunctionSpec {
                FunctionSpec::new::<F>(
                    vec![$(<$P as FnParam<$M>>::spec()),*],
                    <R as FnReturn<MR>>::specs(),
                )
            }

            // The zero-parameter expansion leaves `context` and the slot
            // iterator untouched.
            #[allow(unused_variables, unused_mut)]
            fn into_erased(self) -> ErasedCall {
                Arc::new(move |context: CancellationToken, inputs: Vec<Option<ErasedValue>>| -> CallFuture {
                    let mut inputs = inputs.into_iter();
                    $(
                        let $value = match <$P as FnParam<$M>>::bind(
                            &context,
                            inputs
                                .next()
                                .expect("GraphFn::into_erased: resolved slot count mismatch")
                                .as_ref(),
                        ) {
                            Some(value) => value,
                            None => return Box::pin(async { CallOutcome::Skipped }),
                        };
                    )*
                    let future = (self)($($value),*);
                    Box::pin(async move { <R as FnReturn<MR>>::into_outcome(future.await) })
                })
            }
        }
    };
}

impl_graph_fn!();
impl_graph_fn!((P0, M0, value0));
impl_graph_fn!((P0, M0, value0), (P1, M1, value1));
impl_graph_fn!((P0, M0, value0), (P1, M1, value1), (P2, M2, value2));
impl_graph_fn!((P0, M0, value0), (P1, M1, value1), (P2, M2, value2), (P3, M3, value3));
impl_graph_fn!(
    (P0, M0, value0),
    (P1, M1, value1),
    (P2, M2, value2),
    (P3, M3, value3),
    (P4, M4, value4)
);
impl_graph_fn!(
    (P0, M0, value0),
    (P1, M1, value1),
    (P2, M2, value2),
    (P3, M3, value3),
    (P4, M4, value4),
    (P5, M5, value5)
);
impl_graph_fn!(
    (P0, M0, value0),
    (P1, M1, value1),
    (P2, M2, value2),
    (P3, M3, value3),
    (P4, M4, value4),
    (P5, M5, value5),
    (P6, M6, value6)
);
impl_graph_fn!(
    (P0, M0, value0),
    (P1, M1, value1),
    (P2, M2, value2),
    (P3, M3, value3),
    (P4, M4, value4),
    (P5, M5, value5),
    (P6, M6, value6),
    (P7, M7, value7)
);

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[derive(Debug, Clone, PartialEq)]
    struct Celsius(f64);
    impl Dependency for Celsius {}

    #[derive(Debug, Clone, PartialEq)]
    struct Fahrenheit(f64);
    impl Dependency for Fahrenheit {}

    #[derive(Debug, Clone, PartialEq)]
    struct Report(String);
    impl Dependency for Report {}

    fn spec_of<M>(function: impl GraphFn<M>) -> FunctionSpec {
        function.spec()
    }

    #[test]
    fn captures_required_parameters_and_plain_returns() {
        let spec = spec_of(|celsius: Celsius| async move { Fahrenheit(celsius.0 * 1.8 + 32.0) });

        assert_eq!(spec.params, vec![ParamSpec::Required(TypeToken::of::<Celsius>())]);
        assert_eq!(spec.returns, vec![ReturnSpec::Value(TypeToken::of::<Fahrenheit>())]);
        assert!(!spec.fallible);
    }

    #[test]
    fn captures_context_optional_and_fallible_slots() {
        async fn forecast(
            _context: CancellationToken,
            _celsius: Celsius,
            _previous: Optional<Report>,
        ) -> Result<(Fahrenheit, Optional<Report>)> {
            Ok((Fahrenheit(0.0), Optional::empty()))
        }

        let spec = spec_of(forecast);

        assert_eq!(
            spec.params,
            vec![
                ParamSpec::Context,
                ParamSpec::Required(TypeToken::of::<Celsius>()),
                ParamSpec::Optional(TypeToken::of::<Report>()),
            ],
        );
        assert_eq!(
            spec.returns,
            vec![
                ReturnSpec::Value(TypeToken::of::<Fahrenheit>()),
                ReturnSpec::Optional(TypeToken::of::<Report>()),
            ],
        );
        assert!(spec.fallible);
        assert!(spec.name.contains("forecast"));
        assert!(spec.name.contains("context"));
        assert!(spec.name.contains("error"));
    }

    #[test]
    fn zero_parameter_functions_are_registrable() {
        let spec = spec_of(|| async { Celsius(21.0) });

        assert!(spec.params.is_empty());
        assert_eq!(spec.returns.len(), 1);
    }

    #[tokio::test]
    async fn erased_call_skips_on_absent_required_input() {
        let call = (|_celsius: Celsius| async move { Fahrenheit(0.0) }).into_erased();

        let outcome = call(CancellationToken::new(), vec![None]).await;
        assert!(matches!(outcome, CallOutcome::Skipped));
    }

    #[tokio::test]
    async fn erased_call_binds_optional_inputs_as_unset_when_absent() {
        let call = (|previous: Optional<Report>| async move {
            assert!(!previous.is_set());
            Celsius(1.0)
        })
        .into_erased();

        let outcome = call(CancellationToken::new(), vec![None]).await;
        match outcome {
            CallOutcome::Produced(values) => {
                assert_eq!(values.len(), 1);
                assert_eq!(values[0].token, TypeToken::of::<Celsius>());
                assert!(values[0].value.is_some());
            }
            _ => panic!("expected a produced outcome"),
        }
    }

    #[tokio::test]
    async fn unset_optional_outputs_produce_no_value() {
        let call = (|| async { Optional::<Report>::empty() }).into_erased();

        let outcome = call(CancellationToken::new(), vec![]).await;
        match outcome {
            CallOutcome::Produced(values) => {
                assert_eq!(values[0].token, TypeToken::of::<Report>());
                assert!(values[0].value.is_none());
            }
            _ => panic!("expected a produced outcome"),
        }
    }

    #[tokio::test]
    async fn failed_calls_surface_the_user_error() {
        let call = (|| async { Err::<Celsius, _>(anyhow::anyhow!("sensor offline")) }).into_erased();

        let outcome = call(CancellationToken::new(), vec![]).await;
        match outcome {
            CallOutcome::Failed(error) => assert_eq!(error.to_string(), "sensor offline"),
            _ => panic!("expected a failed outcome"),
        }
    }
}
