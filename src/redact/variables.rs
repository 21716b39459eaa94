//! Variable walk: produces the loggable copy of the request variables.
//!
//! Only fields known to the schema are copied into the output. Anything the
//! schema does not describe is dropped with a warning.

use std::collections::HashSet;

use async_graphql::{Value, Variables};
use serde_json::{Map, Value as JsonValue};

use super::{query::VariableDecl, RedactError};
use crate::schema::{SchemaView, TypeMeta};


pub(super) struct VariableWalk<'a> {
    pub(super) schema: &'a SchemaView,
    pub(super) placeholder: &'a str,
    /// Variables used where the query marks values as sensitive.
    pub(super) sensitive: &'a HashSet<String>,
}

impl VariableWalk<'_> {
    pub(super) fn redact(
        &self,
        declared: &[VariableDecl],
        input: &Variables,
    ) -> Result<Map<String, JsonValue>, RedactError> {
        let mut out = Map::new();
        for decl in declared {
            let Some(value) = input.get(decl.name.as_str()) else {
                continue;
            };

            let redacted = if self.sensitive.contains(&decl.name) || self.schema.is_redacted_type(&decl.ty) {
                Some(self.placeholder())
            } else {
                match self.schema.type_meta(&decl.ty).filter(|t| t.is_composite_input()) {
                    Some(meta) => self.composite(&decl.name, value, meta)?,
                    None => Some(to_json(value)?),
                }
            };
            if let Some(redacted) = redacted {
                out.insert(decl.name.clone(), redacted);
            }
        }

        let undeclared = input.keys().filter(|name| !declared.iter().any(|d| d.name == name.as_str()));
        for name in undeclared {
            tracing::warn!(
                variable = %name,
                "dropping undeclared variable from logged variables",
            );
        }
        Ok(out)
    }

    fn placeholder(&self) -> JsonValue {
        JsonValue::String(self.placeholder.to_string())
    }

    /// Walks a value of input object type `ty`, or a list of them. Returns
    /// `None` for values that do not fit the type.
    fn composite(
        &self,
        path: &str,
        value: &Value,
        ty: &TypeMeta,
    ) -> Result<Option<JsonValue>, RedactError> {
        match value {
            Value::Null => Ok(Some(JsonValue::Null)),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    if let Some(item) = self.composite(&format!("{path}[{i}]"), item, ty)? {
                        out.push(item);
                    }
                }
                Ok(Some(JsonValue::Array(out)))
            }
            Value::Object(fields) => {
                let mut out = Map::new();
                for def in &ty.input_fields {
                    let Some(field) = fields.get(def.name.as_str()) else {
                        continue;
                    };

                    let marked = self.schema.is_redacted(&def.directives)
                        || self.schema.is_redacted_type(&def.ty.named);
                    let redacted = if marked {
                        Some(self.placeholder())
                    } else {
                        match self.schema.type_meta(&def.ty.named).filter(|t| t.is_composite_input()) {
                            Some(meta) => self.composite(&format!("{path}.{}", def.name), field, meta)?,
                            None => Some(to_json(field)?),
                        }
                    };
                    if let Some(redacted) = redacted {
                        out.insert(def.name.clone(), redacted);
                    }
                }

                for name in fields.keys().filter(|name| ty.input_field(name).is_none()) {
                    tracing::warn!(
                        variable = path,
                        field = %name,
                        input_type = %ty.name,
                        "dropping unknown input field from logged variables",
                    );
                }
                Ok(Some(JsonValue::Object(out)))
            }
            _ => {
                tracing::warn!(
                    variable = path,
                    input_type = %ty.name,
                    "expected an input object, dropping value from logged variables",
                );
                Ok(None)
            }
        }
    }
}

fn to_json(value: &Value) -> Result<JsonValue, RedactError> {
    value.clone().into_json().map_err(RedactError::Serialize)
}
