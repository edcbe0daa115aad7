use crate::{
    engine::FunctionEntry,
    types::{IndexMap, IndexSet, TypeToken},
};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by [`crate::EngineBuilder::build`] when the registered
/// function set is malformed.
///
/// Function-shaped rules (callability, at least one non-error output, at most
/// one error output, no error parameters, no context outputs, no variadics)
/// hold by construction of [`crate::GraphFn`] and have no variants here; the
/// remaining rules are structural over unwrapped types and checked when the
/// graph is assembled.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// No functions were registered.
    #[error("input validation error: engine must be initialized with at least one function")]
    Empty,

    /// A function declares two parameters resolving through the same
    /// unwrapped type (the cancellation token counts as a type of its own).
    #[error(
        "input {function} caused validation error: \
         function takes the same parameter type {type_name} more than once"
    )]
    RepeatedParameterType {
        function: String,
        type_name: &'static str,
    },

    /// A function consumes an unwrapped type it also produces.
    #[error("input {function} caused validation error: input type {type_name} is also an output type")]
    ParameterIsOutput {
        function: String,
        type_name: &'static str,
    },

    /// Two or more functions produce the same unwrapped type.
    #[error(
        "input validation error: \
         output value type {type_name} already provided to the engine by {providers}"
    )]
    DuplicateOutputType {
        type_name: &'static str,
        providers: String,
    },

    /// Following producer-to-consumer edges over unwrapped types revisits a
    /// function. Optional wrapping does not break such a cycle.
    #[error("input validation error: cyclic dependency detected: {path}")]
    CyclicDependency { path: String },
}

/// Validates the registered set and assembles the producer map: each
/// unwrapped produced type to the index of its unique producing function.
pub(crate) fn validate(
    functions: &[Arc<FunctionEntry>],
) -> Result<IndexMap<TypeToken, usize>, BuildError> {
    if functions.is_empty() {
        return Err(BuildError::Empty);
    }
    for entry in functions {
        validate_function(entry)?;
    }
    let producers = unique_producers(functions)?;
    detect_cycles(functions)?;
    Ok(producers)
}

fn validate_function(entry: &FunctionEntry) -> Result<(), BuildError> {
    let spec = &entry.spec;

    for slot in &spec.returns {
        let produced = slot.unwrapped();
        if spec
            .params
            .iter()
            .any(|param| !param.is_context() && param.unwrapped() == produced)
        {
            return Err(BuildError::ParameterIsOutput {
                function: spec.name.clone(),
                type_name: produced.name(),
            });
        }
    }

    let mut seen = IndexSet::default();
    for param in &spec.params {
        let token = param.unwrapped();
        if !seen.insert(token) {
            return Err(BuildError::RepeatedParameterType {
                function: spec.name.clone(),
                type_name: token.name(),
            });
        }
    }

    Ok(())
}

fn unique_producers(
    functions: &[Arc<FunctionEntry>],
) -> Result<IndexMap<TypeToken, usize>, BuildError> {
    let mut producers: IndexMap<TypeToken, Vec<usize>> = IndexMap::default();
    for (index, entry) in functions.iter().enumerate() {
        for slot in &entry.spec.returns {
            producers.entry(slot.unwrapped()).or_default().push(index);
        }
    }

    for (token, indices) in &producers {
        if indices.len() > 1 {
            let providers = indices
                .iter()
                .map(|&index| functions[index].spec.name.as_str())
                .collect::<Vec<_>>()
                .join(" AND ");
            return Err(BuildError::DuplicateOutputType {
                type_name: token.name(),
                providers,
            });
        }
    }

    Ok(producers
        .into_iter()
        .map(|(token, indices)| (token, indices[0]))
        .collect())
}

fn detect_cycles(functions: &[Arc<FunctionEntry>]) -> Result<(), BuildError> {
    for start in 0..functions.len() {
        walk(start, &mut Vec::new(), functions)?;
    }
    Ok(())
}

fn walk(
    index: usize,
    path: &mut Vec<usize>,
    functions: &[Arc<FunctionEntry>],
) -> Result<(), BuildError> {
    if path.contains(&index) {
        let rendered = path
            .iter()
            .map(|&position| functions[position].spec.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(BuildError::CyclicDependency { path: rendered });
    }

    path.push(index);
    for slot in &functions[index].spec.returns {
        let produced = slot.unwrapped();
        for (consumer, entry) in functions.iter().enumerate() {
            if entry
                .spec
                .params
                .iter()
                .any(|param| !param.is_context() && param.unwrapped() == produced)
            {
                walk(consumer, path, functions)?;
            }
        }
    }
    path.pop();

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{CancellationToken, Dependency, Engine, Optional};
    use anyhow::Result;

    #[derive(Debug, Clone)]
    struct Order(#[allow(dead_code)] String);
    impl Dependency for Order {}

    #[derive(Debug, Clone)]
    struct Invoice(#[allow(dead_code)] String);
    impl Dependency for Invoice {}

    #[derive(Debug, Clone)]
    struct Receipt(#[allow(dead_code)] String);
    impl Dependency for Receipt {}

    async fn invoice(_order: Order) -> Invoice {
        Invoice(String::new())
    }

    async fn receipt(_invoice: Invoice) -> Receipt {
        Receipt(String::new())
    }

    #[test]
    fn a_valid_set_builds() {
        let engine = Engine::builder()
            .register(invoice)
            .register(receipt)
            .build()
            .expect("set is well-formed");

        assert!(engine.produces::<Invoice>());
        assert!(engine.produces::<Receipt>());
        assert!(!engine.produces::<Order>());
    }

    #[test]
    fn rejects_an_empty_set() {
        let error = Engine::builder().build().unwrap_err();
        assert_eq!(
            error.to_string(),
            "input validation error: engine must be initialized with at least one function",
        );
    }

    #[test]
    fn rejects_repeated_parameter_types() {
        let error = Engine::builder()
            .register(|_a: Order, _b: Order| async { Invoice(String::new()) })
            .build()
            .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("caused validation error"));
        assert!(message.contains("takes the same parameter type"));
        assert!(message.contains("Order"));
    }

    #[test]
    fn optional_wrapping_does_not_hide_repeated_parameters() {
        let error = Engine::builder()
            .register(|_a: Order, _b: Optional<Order>| async { Invoice(String::new()) })
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("takes the same parameter type"));
    }

    #[test]
    fn rejects_two_context_parameters() {
        let error = Engine::builder()
            .register(|_a: CancellationToken, _b: CancellationToken| async {
                Invoice(String::new())
            })
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("takes the same parameter type"));
    }

    #[test]
    fn rejects_a_parameter_that_is_also_an_output() {
        let error = Engine::builder()
            .register(|order: Order| async move { order })
            .build()
            .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("input type"));
        assert!(message.contains("is also an output type"));
    }

    #[test]
    fn optional_wrapping_does_not_hide_parameter_output_overlap() {
        let error = Engine::builder()
            .register(|_order: Optional<Order>| async { Order(String::new()) })
            .build()
            .unwrap_err();
        assert!(error.to_string().contains("is also an output type"));

        let error = Engine::builder()
            .register(|_order: Order| async { Optional::<Order>::empty() })
            .build()
            .unwrap_err();
        assert!(error.to_string().contains("is also an output type"));
    }

    #[test]
    fn rejects_duplicate_producers_naming_all_offenders() {
        async fn from_order(_order: Order) -> Invoice {
            Invoice(String::new())
        }
        async fn from_receipt(_receipt: Receipt) -> Invoice {
            Invoice(String::new())
        }

        let error = Engine::builder()
            .register(from_order)
            .register(from_receipt)
            .build()
            .unwrap_err();

        let message = error.to_string();
        assert!(message.starts_with("input validation error: output value type"));
        assert!(message.contains("already provided to the engine by"));
        assert!(message.contains("from_order"));
        assert!(message.contains(" AND "));
        assert!(message.contains("from_receipt"));
    }

    #[test]
    fn duplicate_producers_are_detected_across_optional_wrapping() {
        let error = Engine::builder()
            .register(|_order: Order| async { Invoice(String::new()) })
            .register(|_receipt: Receipt| async { Optional::<Invoice>::empty() })
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("already provided to the engine by"));
    }

    #[test]
    fn rejects_cycles_and_reports_the_path_in_order() {
        async fn make_invoice(_order: Order) -> Invoice {
            Invoice(String::new())
        }
        async fn make_receipt(_invoice: Invoice) -> Receipt {
            Receipt(String::new())
        }
        async fn make_order(_receipt: Receipt) -> Order {
            Order(String::new())
        }

        let error = Engine::builder()
            .register(make_invoice)
            .register(make_receipt)
            .register(make_order)
            .build()
            .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("cyclic dependency detected"));
        let invoice_at = message.find("make_invoice").expect("first function named");
        let receipt_at = message.find("make_receipt").expect("second function named");
        let order_at = message.find("make_order").expect("third function named");
        assert!(invoice_at < receipt_at && receipt_at < order_at);
    }

    #[test]
    fn optional_edges_do_not_break_cycles() {
        let error = Engine::builder()
            .register(|_order: Order| async { Invoice(String::new()) })
            .register(|_invoice: Optional<Invoice>| async { Optional::<Receipt>::empty() })
            .register(|_receipt: Receipt| async { Order(String::new()) })
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("cyclic dependency detected"));
    }

    #[test]
    fn two_function_cycles_are_detected() {
        let error = Engine::builder()
            .register(|_invoice: Invoice| async { Order(String::new()) })
            .register(|_order: Order| async { Invoice(String::new()) })
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("cyclic dependency detected"));
    }

    #[test]
    fn fallible_and_multi_output_functions_validate() {
        let engine = Engine::builder()
            .register(|_order: Order| async { Ok::<_, anyhow::Error>((Invoice(String::new()), Receipt(String::new()))) })
            .build()
            .expect("tuple returns are well-formed");

        assert!(engine.produces::<Invoice>());
        assert!(engine.produces::<Receipt>());
    }

    #[test]
    fn validation_reports_the_first_offending_function_in_registration_order() {
        async fn good(_order: Order) -> Invoice {
            Invoice(String::new())
        }

        let error = Engine::builder()
            .register(good)
            .register(|_a: Receipt, _b: Receipt| async { Order(String::new()) })
            .build()
            .unwrap_err();

        assert!(!error.to_string().contains("good"));
    }

    #[allow(dead_code)]
    fn result_returns_infer() -> Result<()> {
        // Compile-time sanity that common signatures satisfy registration.
        let _ = Engine::builder()
            .register(|| async { Order(String::new()) })
            .register(|_ctx: CancellationToken, _order: Order| async {
                Ok::<_, anyhow::Error>(Invoice(String::new()))
            })
            .register(|_invoice: Optional<Invoice>| async { Receipt(String::new()) });
        Ok(())
    }
}
