//! Aggregator specs
//!
//! An [`AggregatorSpec`] names a field, its type and the functions a query
//! applies to it. It decides which `(primitive_field_id, agg_type)` keys a
//! field aggregator materializes.

use crate::error::{AggregationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tsagg_core::{AggType, FieldType, FunctionType, PrimitiveFieldId};

/// Requested functions of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorSpec {
    pub field_name: String,
    pub field_type: FieldType,
    pub functions: BTreeSet<FunctionType>,
}

impl AggregatorSpec {
    /// Create a spec without functions (bare field reference)
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            functions: BTreeSet::new(),
        }
    }

    /// Add a requested function
    pub fn function(mut self, func: FunctionType) -> Self {
        self.functions.insert(func);
        self
    }

    /// Reject functions the field type cannot answer
    pub fn validate(&self) -> Result<()> {
        if self.field_name.is_empty() {
            return Err(AggregationError::InvalidDefinition("Empty field name".to_string()));
        }
        if let Some(func) = self.functions.iter().find(|f| !self.field_type.is_supported(**f)) {
            return Err(AggregationError::UnsupportedFunction {
                field: self.field_name.clone(),
                function: func.to_string(),
            });
        }
        Ok(())
    }

    /// Keys to materialize, sorted by primitive field id then agg type.
    ///
    /// Falls back to the field type's default mapping when no function is
    /// requested. Unsupported functions contribute nothing.
    pub fn primitive_keys(&self) -> Vec<(PrimitiveFieldId, AggType)> {
        let mut keys: Vec<(PrimitiveFieldId, AggType)> = if self.functions.is_empty() {
            self.field_type.default_primitive_fields().to_vec()
        } else {
            self.functions
                .iter()
                .filter_map(|f| self.field_type.primitive_fields(*f))
                .flatten()
                .copied()
                .collect()
        };
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Ordered collection of aggregator specs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorSpecs {
    specs: Vec<AggregatorSpec>,
}

impl AggregatorSpecs {
    /// Query specs, sorted by field name
    pub fn new(mut specs: Vec<AggregatorSpec>) -> Self {
        specs.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        Self { specs }
    }

    /// Down-sampling specs; the given order must follow the field schema and is kept
    pub fn in_schema_order(specs: Vec<AggregatorSpec>) -> Self {
        Self { specs }
    }

    /// Validate every spec
    pub fn validate(&self) -> Result<()> {
        self.specs.iter().try_for_each(AggregatorSpec::validate)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AggregatorSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Spec of a field by name
    pub fn get(&self, field_name: &str) -> Option<&AggregatorSpec> {
        self.specs.iter().find(|s| s.field_name == field_name)
    }
}

impl<'a> IntoIterator for &'a AggregatorSpecs {
    type Item = &'a AggregatorSpec;
    type IntoIter = std::slice::Iter<'a, AggregatorSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}
