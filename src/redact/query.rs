//! Query text walk: finds the byte ranges of every sensitive literal.
//!
//! The walk is a fold: each step returns the spans found below it and the
//! caller concatenates them. Nothing is shared or mutated along the way.

use apollo_parser::{cst::{self, CstNode}, Parser};

use super::{RedactError, Span};
use crate::schema::{OperationKind, SchemaView};


/// A variable declared by an operation, e.g. `$input: LoginInput!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct VariableDecl {
    pub(super) name: String,
    /// Innermost named type.
    pub(super) ty: String,
}

#[derive(Debug, Default)]
pub(super) struct Scan {
    pub(super) spans: Vec<Span>,
    pub(super) variables: Vec<VariableDecl>,
}

/// Parses `source` and collects spans of all values to redact, plus the
/// variable declarations of the operation named `operation_name` (or of all
/// operations if no name is given).
pub(super) fn scan(
    schema: &SchemaView,
    source: &str,
    operation_name: Option<&str>,
) -> Result<Scan, RedactError> {
    let tree = Parser::new(source).parse();
    if let Some(err) = tree.errors().next() {
        return Err(RedactError::Parse(format!("{} at offset {}", err.message(), err.index())));
    }

    let walk = Walk { schema, source };
    let mut scan = Scan::default();
    for definition in tree.document().definitions() {
        match definition {
            cst::Definition::OperationDefinition(op) => {
                let name = op.name().map(|n| n.text().to_string());
                let selected = operation_name.is_none() || name.as_deref() == operation_name;
                let (spans, variables) = walk.operation(&op);
                scan.spans.extend(spans);
                if selected {
                    scan.variables.extend(variables);
                }
            }
            cst::Definition::FragmentDefinition(fragment) => {
                let Some(ty) = fragment.type_condition().and_then(|c| named_type(c.named_type()))
                else {
                    continue;
                };
                if let Some(set) = fragment.selection_set() {
                    scan.spans.extend(walk.selection_set(&set, &ty));
                }
            }
            _ => {}
        }
    }

    Ok(scan)
}

fn named_type(ty: Option<cst::NamedType>) -> Option<String> {
    ty?.name().map(|n| n.text().to_string())
}

fn innermost_type(ty: cst::Type) -> Option<String> {
    match ty {
        cst::Type::NamedType(named) => named_type(Some(named)),
        cst::Type::ListType(list) => innermost_type(list.ty()?),
        cst::Type::NonNullType(non_null) => match non_null.named_type() {
            Some(named) => named_type(Some(named)),
            None => innermost_type(cst::Type::ListType(non_null.list_type()?)),
        },
    }
}

struct Walk<'a> {
    schema: &'a SchemaView,
    source: &'a str,
}

impl Walk<'_> {
    fn operation(&self, op: &cst::OperationDefinition) -> (Vec<Span>, Vec<VariableDecl>) {
        let kind = match op.operation_type() {
            Some(ty) if ty.mutation_token().is_some() => OperationKind::Mutation,
            Some(ty) if ty.subscription_token().is_some() => OperationKind::Subscription,
            _ => OperationKind::Query,
        };

        let mut spans = Vec::new();
        let mut variables = Vec::new();
        let definitions = op.variable_definitions().into_iter().flat_map(|d| d.variable_definitions());
        for definition in definitions {
            let name = definition.variable().and_then(|v| v.name()).map(|n| n.text().to_string());
            let ty = definition.ty().and_then(innermost_type);
            let (Some(name), Some(ty)) = (name, ty) else {
                continue;
            };

            // Default values are literals in the query text as well.
            if let Some(default) = definition.default_value().and_then(|d| d.value()) {
                spans.extend(self.value(&default, &ty));
            }
            variables.push(VariableDecl { name, ty });
        }

        if let Some(set) = op.selection_set() {
            spans.extend(self.selection_set(&set, self.schema.root_type(kind)));
        }
        (spans, variables)
    }

    fn selection_set(&self, set: &cst::SelectionSet, parent: &str) -> Vec<Span> {
        set.selections()
            .flat_map(|selection| match selection {
                cst::Selection::Field(field) => self.field(&field, parent),
                cst::Selection::InlineFragment(fragment) => {
                    let ty = fragment.type_condition()
                        .and_then(|c| named_type(c.named_type()))
                        .unwrap_or_else(|| parent.to_string());
                    fragment.selection_set()
                        .map(|set| self.selection_set(&set, &ty))
                        .unwrap_or_default()
                }
                // Fragment definitions are walked on their own.
                cst::Selection::FragmentSpread(_) => vec![],
            })
            .collect()
    }

    fn field(&self, field: &cst::Field, parent: &str) -> Vec<Span> {
        let Some(name) = field.name().map(|n| n.text().to_string()) else {
            return vec![];
        };

        // Unknown here means introspection (`__typename`, ...) or a field the
        // validator will reject anyway.
        let Some(meta) = self.schema.field(parent, &name) else {
            return vec![];
        };

        let mut spans = Vec::new();
        for argument in field.arguments().into_iter().flat_map(|a| a.arguments()) {
            let name = argument.name().map(|n| n.text().to_string());
            let (Some(name), Some(value)) = (name, argument.value()) else {
                continue;
            };
            let Some(def) = meta.argument(&name) else {
                continue;
            };

            if self.schema.is_redacted(&def.directives) {
                spans.extend(self.leaves(&value));
            } else {
                spans.extend(self.value(&value, &def.ty.named));
            }
        }

        if let Some(set) = field.selection_set() {
            spans.extend(self.selection_set(&set, &meta.ty.named));
        }
        spans
    }

    /// Spans inside a value of input type `ty` that is not itself marked.
    fn value(&self, value: &cst::Value, ty: &str) -> Vec<Span> {
        if self.schema.is_redacted_type(ty) {
            return self.leaves(value);
        }

        match value {
            cst::Value::ListValue(list) => list.values().flat_map(|v| self.value(&v, ty)).collect(),
            cst::Value::ObjectValue(object) => {
                let Some(meta) = self.schema.type_meta(ty) else {
                    return vec![];
                };
                object.object_fields()
                    .flat_map(|field| {
                        let name = field.name().map(|n| n.text().to_string());
                        let def = name.and_then(|name| meta.input_field(&name));
                        match (def, field.value()) {
                            (Some(def), Some(value)) if self.schema.is_redacted(&def.directives) => {
                                self.leaves(&value)
                            }
                            (Some(def), Some(value)) => self.value(&value, &def.ty.named),
                            _ => vec![],
                        }
                    })
                    .collect()
            }
            _ => vec![],
        }
    }

    /// Spans of every scalar below `value`. Composite values keep their
    /// braces and brackets, only the leaves are blanked. Directives further
    /// down are not consulted: a leaf is redacted once.
    fn leaves(&self, value: &cst::Value) -> Vec<Span> {
        match value {
            cst::Value::ListValue(list) => list.values().flat_map(|v| self.leaves(&v)).collect(),
            cst::Value::ObjectValue(object) => object.object_fields()
                .filter_map(|field| field.value())
                .flat_map(|v| self.leaves(&v))
                .collect(),
            scalar => self.span_of(scalar).into_iter().collect(),
        }
    }

    /// Text range of a node without surrounding whitespace and commas, which
    /// the parser attaches to neighbouring nodes.
    fn span_of(&self, node: &impl CstNode) -> Option<Span> {
        let range = node.syntax().text_range();
        let (start, end) = (usize::from(range.start()), usize::from(range.end()));
        let text = self.source.get(start..end)?;

        let is_trivia = |c: char| c.is_whitespace() || c == ',';
        let start = start + (text.len() - text.trim_start_matches(is_trivia).len());
        let end = end - (text.len() - text.trim_end_matches(is_trivia).len());
        (start < end).then_some(Span { start, end })
    }
}
