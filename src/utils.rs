use crate::function::{ParamSpec, ReturnSpec};
use core::fmt::Write;

/// Renders the display name used in diagnostics for a registered function:
/// its type path followed by the reconstructed signature, e.g.
/// `app::quote::fetch_rate(context, app::Currency) -> (app::Rate, error)`.
pub(crate) fn display_name<F>(params: &[ParamSpec], returns: &[ReturnSpec], fallible: bool) -> String {
    let mut name = String::from(core::any::type_name::<F>());

    name.push('(');
    for (position, param) in params.iter().enumerate() {
        if position > 0 {
            name.push_str(", ");
        }
        match param {
            ParamSpec::Context => name.push_str("context"),
            ParamSpec::Required(token) => name.push_str(token.name()),
            ParamSpec::Optional(token) => {
                let _ = write!(name, "Optional<{}>", token.name());
            }
        }
    }
    name.push_str(") -> ");

    let parenthesized = returns.len() > 1 || fallible;
    if parenthesized {
        name.push('(');
    }
    for (position, slot) in returns.iter().enumerate() {
        if position > 0 {
            name.push_str(", ");
        }
        match slot {
            ReturnSpec::Value(token) => name.push_str(token.name()),
            ReturnSpec::Optional(token) => {
                let _ = write!(name, "Optional<{}>", token.name());
            }
        }
    }
    if fallible {
        name.push_str(", error");
    }
    if parenthesized {
        name.push(')');
    }

    name
}
