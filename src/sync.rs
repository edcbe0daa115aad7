use crate::{
    function::Dependency,
    types::{ErasedValue, HashMap, TypeToken},
};
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Returned by a wait that was interrupted by the cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interrupted;

/// Single-shot broadcast latch for one produced type.
///
/// Transitions once from pending to ready; readiness carries no payload.
/// Whether the type's value is present or absent is observed in the store
/// after the latch opens.
#[derive(Debug)]
pub(crate) struct ReadySignal {
    sender: watch::Sender<bool>,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Opens the latch for all current and future waiters. Idempotent.
    pub(crate) fn broadcast(&self) {
        self.sender.send_replace(true);
    }

    /// Waits until the latch opens or `context` is cancelled.
    pub(crate) async fn wait(&self, context: &CancellationToken) -> Result<(), Interrupted> {
        let mut receiver = self.sender.subscribe();
        tokio::select! {
            () = context.cancelled() => Err(Interrupted),
            result = receiver.wait_for(|ready| *ready) => {
                let _ = result.expect("ReadySignal::wait: sender dropped while a run is in flight");
                Ok(())
            }
        }
    }
}

/// Readiness latches for every produced type of one run.
#[derive(Debug)]
pub(crate) struct SignalTable {
    signals: HashMap<TypeToken, ReadySignal>,
}

impl SignalTable {
    pub(crate) fn for_types(types: impl Iterator<Item = TypeToken>) -> Self {
        Self {
            signals: types.map(|token| (token, ReadySignal::new())).collect(),
        }
    }

    /// Waits for readiness of `token`. Types without a producer have no
    /// latch and resolve immediately: they are either provided up front or
    /// permanently absent.
    pub(crate) async fn wait(
        &self,
        context: &CancellationToken,
        token: TypeToken,
    ) -> Result<(), Interrupted> {
        match self.signals.get(&token) {
            Some(signal) => signal.wait(context).await,
            None => Ok(()),
        }
    }

    pub(crate) fn broadcast(&self, token: TypeToken) {
        self.signals
            .get(&token)
            .expect("SignalTable::broadcast: no latch for a produced type")
            .broadcast();
    }
}

/// Concurrent value store keyed by unwrapped type identity.
///
/// Grows monotonically during a run: one writer per key (the producer), any
/// number of readers. Values are stored bare; optional wrappers never enter
/// the store.
#[derive(Default)]
pub(crate) struct ValueStore {
    values: DashMap<TypeToken, ErasedValue, FxBuildHasher>,
}

impl ValueStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, token: TypeToken, value: ErasedValue) {
        self.values.insert(token, value);
    }

    pub(crate) fn get(&self, token: TypeToken) -> Option<ErasedValue> {
        self.values.get(&token).map(|entry| entry.value().clone())
    }

    /// Clones out every stored value of exactly type `R` whose key satisfies
    /// `keep`.
    pub(crate) fn collect<R: Dependency>(&self, mut keep: impl FnMut(TypeToken) -> bool) -> Vec<R> {
        self.values
            .iter()
            .filter(|entry| keep(*entry.key()))
            .filter_map(|entry| entry.value().downcast_ref::<R>().cloned())
            .collect()
    }
}
