// Interpretation chain resolution
//
// A value starts at the base interpretation of its native category. From
// there the resolver repeatedly offers the value to the interpretations
// downstream of the current one and follows the first that accepts it,
// transforming the value on the way.

use serde_json::Value;
use tracing::trace;

use crate::interpretation::{Interpretation, InterpretationRegistry};
use crate::internal::error::Result;
use crate::schema::value::value_kind;

/// Result of resolving a single value
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChain {
    /// Interpretation names, base first
    pub names: Vec<&'static str>,
    /// The value after every transform of the chain
    pub value: Value,
}

impl ResolvedChain {
    /// Last interpretation of the chain, if any
    pub fn last(&self) -> Option<&'static str> {
        self.names.last().copied()
    }

    /// Chain rendered as `a=>b`
    pub fn id(&self) -> String {
        self.names.join("=>")
    }
}

/// Resolves the full chain of a raw value
pub fn resolve(registry: &InterpretationRegistry, value: &Value) -> Result<ResolvedChain> {
    let base = registry.base_for(value_kind(value))?;
    let mut resolved = resolve_from(registry, base, value);
    resolved.names.insert(0, base.name());
    trace!(chain = %resolved.id(), "Resolved interpretation chain");
    Ok(resolved)
}

/// Continues a chain after `current`.
///
/// The returned names exclude `current` itself, so a value that was already
/// carried through its whole chain resolves to an empty remainder.
pub fn resolve_from(registry: &InterpretationRegistry, current: &dyn Interpretation, value: &Value) -> ResolvedChain {
    let mut names = Vec::new();
    let mut value = value.clone();
    let mut current_name = current.name();

    loop {
        let next = registry
            .downstream_of(current_name)
            .into_iter()
            .find(|candidate| candidate.check_value(&value));
        match next {
            Some(interpretation) => {
                trace!(from = current_name, to = interpretation.name(), "Interpretation accepted value");
                value = interpretation.transform_value(&value);
                current_name = interpretation.name();
                names.push(current_name);
            }
            None => break,
        }
    }

    ResolvedChain { names, value }
}
