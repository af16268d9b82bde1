// Interpretation registry
//
// Built once at startup from a static list and passed by reference to the
// detector and the compiler. Registration order is the tie-break for
// candidates of equal priority.

use tracing::debug;

use crate::interpretation::boolean::BooleanInterpretation;
use crate::interpretation::date::DateInterpretation;
use crate::interpretation::hex::HexInterpretation;
use crate::interpretation::number::NumberInterpretation;
use crate::interpretation::object::ObjectInterpretation;
use crate::interpretation::sequence::SequenceInterpretation;
use crate::interpretation::string::StringInterpretation;
use crate::interpretation::Interpretation;
use crate::internal::error::{Error, Result};
use crate::schema::types::{Schema, SchemaType};
use crate::schema::value::ValueKind;

/// Name to interpretation lookup
#[derive(Debug, Default)]
pub struct InterpretationRegistry {
    interpretations: Vec<Box<dyn Interpretation>>,
}

impl InterpretationRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in interpretation
    pub fn with_defaults() -> Self {
        let interpretations: Vec<Box<dyn Interpretation>> = vec![
            Box::new(StringInterpretation),
            Box::new(NumberInterpretation),
            Box::new(BooleanInterpretation),
            Box::new(DateInterpretation),
            Box::new(HexInterpretation),
            Box::new(SequenceInterpretation),
            Box::new(ObjectInterpretation),
        ];
        Self { interpretations }
    }

    /// Adds an interpretation; names must be unique
    pub fn register(&mut self, interpretation: Box<dyn Interpretation>) -> Result<()> {
        if self.interpretations.iter().any(|i| i.name() == interpretation.name()) {
            return Err(Error::InterpretationError(format!(
                "Interpretation {} is already registered",
                interpretation.name()
            )));
        }
        debug!(name = interpretation.name(), "Registered interpretation");
        self.interpretations.push(interpretation);
        Ok(())
    }

    /// Looks up an interpretation by name
    pub fn get(&self, name: &str) -> Result<&dyn Interpretation> {
        self.interpretations
            .iter()
            .find(|i| i.name() == name)
            .map(|i| i.as_ref())
            .ok_or_else(|| Error::InterpretationError(format!("Unknown interpretation {}", name)))
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.interpretations.iter().map(|i| i.name()).collect()
    }

    /// Base interpretation for a native category
    pub fn base_for(&self, kind: ValueKind) -> Result<&dyn Interpretation> {
        self.interpretations
            .iter()
            .find(|i| i.native_kinds().contains(&kind))
            .map(|i| i.as_ref())
            .ok_or_else(|| {
                Error::InterpretationError(format!("No base interpretation for {} values", kind))
            })
    }

    /// Interpretations that may follow `name`, ordered by priority then registration
    pub fn downstream_of(&self, name: &str) -> Vec<&dyn Interpretation> {
        let mut candidates: Vec<(u32, usize, &dyn Interpretation)> = self
            .interpretations
            .iter()
            .enumerate()
            .filter(|(_, i)| i.upstream_interpretations().contains(&name))
            .map(|(position, i)| (i.priority(), position, i.as_ref()))
            .collect();
        candidates.sort_by_key(|(priority, position, _)| (*priority, *position));
        candidates.into_iter().map(|(_, _, i)| i).collect()
    }

    /// Main interpretation of a schema node.
    ///
    /// Nodes without a recorded interpretation fall back on their structural type.
    pub fn for_schema(&self, schema: &Schema) -> Result<&dyn Interpretation> {
        match schema.main_interpretation() {
            Some(name) => self.get(name),
            None => self.get(match schema.schema_type {
                SchemaType::Object => "object",
                SchemaType::Array => "sequence",
                SchemaType::Number => "number",
                SchemaType::Boolean => "boolean",
                SchemaType::String => "string",
                SchemaType::Binary => "hex",
            }),
        }
    }
}
