/// Wrapper marking a function parameter or output as optional.
///
/// A parameter of type `Optional<T>` does not force its function to be
/// skipped when no `T` was produced; it observes the absence instead. An
/// output of type `Optional<T>` lets a function decline to produce a `T`,
/// which skips every downstream function that requires one.
///
/// Only this exact type is treated as optional by the engine. A user-defined
/// wrapper with the same shape is an ordinary value type.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Optional<T>(Option<T>);

impl<T> Optional<T> {
    /// A set optional holding `value`.
    pub const fn of(value: T) -> Self {
        Self(Some(value))
    }

    /// An unset optional.
    pub const fn empty() -> Self {
        Self(None)
    }

    /// Whether a value is present.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Borrows the value, if set.
    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    /// Consumes the wrapper, yielding the value if it was set.
    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Optional<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Option<T>> for Optional<T> {
    fn from(value: Option<T>) -> Self {
        Self(value)
    }
}

impl<T> From<Optional<T>> for Option<T> {
    fn from(value: Optional<T>) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::Optional;

    #[test]
    fn set_and_unset() {
        let set = Optional::of(7);
        assert!(set.is_set());
        assert_eq!(set.get(), Some(&7));
        assert_eq!(set.into_inner(), Some(7));

        let unset = Optional::<i32>::empty();
        assert!(!unset.is_set());
        assert_eq!(unset.get(), None);
        assert_eq!(unset.into_inner(), None);
    }

    #[test]
    fn default_is_unset() {
        assert!(!Optional::<String>::default().is_set());
    }

    #[test]
    fn round_trips_through_option() {
        assert_eq!(Optional::from(Some(1)).into_inner(), Some(1));
        assert_eq!(Option::from(Optional::of("a")), Some("a"));
    }
}
