//! Read-only metadata view over the gateway schema
//!
//! Built once from SDL at startup and shared (behind an `Arc`) by the node
//! registry, the error remapper and the redaction engine. Nothing in here is
//! mutable after [`SchemaView::parse`] returns.

use std::collections::HashMap;

use async_graphql::parser::{
    parse_schema,
    types::{
        BaseType, ConstDirective, FieldDefinition, InputValueDefinition, Type, TypeDefinition,
        TypeKind as AstTypeKind, TypeSystemDefinition,
    },
    Positioned,
};
use async_graphql::Value;

use crate::{ConfigError, MediationConfig};

/// Field name used as the single ID component when a node type does not
/// declare its components explicitly.
const DEFAULT_ID_FIELD: &str = "dbid";

/// Category of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

/// Root operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// Reference to a type as written in a field or argument declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Innermost named type, with list and non-null wrappers stripped.
    pub named: String,
    pub is_list: bool,
}

impl TypeRef {
    fn from_ast(ty: &Type) -> Self {
        match &ty.base {
            BaseType::Named(name) => Self { named: name.to_string(), is_list: false },
            BaseType::List(inner) => Self { named: Self::from_ast(inner).named, is_list: true },
        }
    }
}

/// An argument or input object field.
#[derive(Debug, Clone)]
pub struct InputValueMeta {
    pub name: String,
    pub ty: TypeRef,
    pub directives: Vec<String>,
}

/// A field of an object or interface type.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub ty: TypeRef,
    pub directives: Vec<String>,
    pub arguments: Vec<InputValueMeta>,
}

impl FieldMeta {
    pub fn argument(&self, name: &str) -> Option<&InputValueMeta> {
        self.arguments.iter().find(|arg| arg.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct TypeMeta {
    pub name: String,
    pub kind: TypeKind,
    pub directives: Vec<String>,
    pub implements: Vec<String>,

    /// Output fields, for object and interface types.
    pub fields: Vec<FieldMeta>,

    /// Input fields in declaration order, for input object types.
    pub input_fields: Vec<InputValueMeta>,

    /// Member types, for union types.
    pub members: Vec<String>,

    /// Entity fields forming the global ID, for types implementing the node
    /// interface.
    pub id_components: Option<Vec<String>>,
}

impl TypeMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn input_field(&self, name: &str) -> Option<&InputValueMeta> {
        self.input_fields.iter().find(|f| f.name == name)
    }

    pub fn is_composite_input(&self) -> bool {
        self.kind == TypeKind::InputObject && !self.input_fields.is_empty()
    }
}

/// Index over type declarations, directives and union membership.
#[derive(Debug)]
pub struct SchemaView {
    types: HashMap<String, TypeMeta>,
    query_type: String,
    mutation_type: String,
    subscription_type: String,
    redact_directive: String,
    node_interface: String,
    error_interface: String,
}

impl SchemaView {
    /// Parse `sdl` and build the view. `extend` definitions are merged into
    /// the type they extend.
    pub fn parse(sdl: &str, config: &MediationConfig) -> crate::Result<Self> {
        let document = parse_schema(sdl).map_err(|e| ConfigError::Schema(e.to_string()))?;

        let mut view = Self {
            types: HashMap::new(),
            query_type: "Query".into(),
            mutation_type: "Mutation".into(),
            subscription_type: "Subscription".into(),
            redact_directive: config.redact_directive.clone(),
            node_interface: config.node_interface.clone(),
            error_interface: config.error_interface.clone(),
        };

        // Global ID declarations by type name, checked once all types are known.
        let mut declared_ids = HashMap::new();

        for definition in document.definitions {
            match definition {
                TypeSystemDefinition::Schema(schema) => {
                    let schema = schema.node;
                    if let Some(query) = schema.query {
                        view.query_type = query.node.to_string();
                    }
                    if let Some(mutation) = schema.mutation {
                        view.mutation_type = mutation.node.to_string();
                    }
                    if let Some(subscription) = schema.subscription {
                        view.subscription_type = subscription.node.to_string();
                    }
                }
                TypeSystemDefinition::Type(ty) => {
                    let ty = ty.node;
                    if let Some(directive) = ty.directives.iter()
                        .find(|d| d.node.name.node.as_str() == config.global_id_directive)
                    {
                        declared_ids.insert(ty.name.node.to_string(), declared_id_fields(&directive.node));
                    }
                    view.insert(ty);
                }
                TypeSystemDefinition::Directive(_) => {}
            }
        }

        let node_types = view.types.values()
            .filter(|ty| view.is_node_type(ty))
            .map(|ty| ty.name.clone())
            .collect::<Vec<_>>();
        for name in node_types {
            let components = match declared_ids.remove(&name) {
                None => vec![DEFAULT_ID_FIELD.to_string()],
                Some(Ok(fields)) => fields,
                Some(Err(reason)) => return Err(ConfigError::GlobalIdDirective {
                    directive: config.global_id_directive.clone(),
                    type_name: name,
                    reason,
                }),
            };
            if let Some(ty) = view.types.get_mut(&name) {
                ty.id_components = Some(components);
            }
        }

        Ok(view)
    }

    fn insert(&mut self, def: TypeDefinition) {
        let name = def.name.node.to_string();
        let extend = def.extend;
        let directives = directive_names(&def.directives);
        let (kind, implements, fields, input_fields, members) = match def.kind {
            AstTypeKind::Scalar => (TypeKind::Scalar, vec![], vec![], vec![], vec![]),
            AstTypeKind::Enum(_) => (TypeKind::Enum, vec![], vec![], vec![], vec![]),
            AstTypeKind::Object(obj) => (
                TypeKind::Object,
                names(&obj.implements),
                obj.fields.iter().map(|f| field_meta(&f.node)).collect(),
                vec![],
                vec![],
            ),
            AstTypeKind::Interface(iface) => (
                TypeKind::Interface,
                names(&iface.implements),
                iface.fields.iter().map(|f| field_meta(&f.node)).collect(),
                vec![],
                vec![],
            ),
            AstTypeKind::Union(union) => {
                (TypeKind::Union, vec![], vec![], vec![], names(&union.members))
            }
            AstTypeKind::InputObject(input) => (
                TypeKind::InputObject,
                vec![],
                vec![],
                input.fields.iter().map(|f| input_value_meta(&f.node)).collect(),
                vec![],
            ),
        };

        match self.types.get_mut(&name) {
            Some(existing) => {
                // Extensions may come before the base definition, which then
                // decides the kind.
                if !extend {
                    existing.kind = kind;
                }
                existing.directives.extend(directives);
                existing.implements.extend(implements);
                existing.fields.extend(fields);
                existing.input_fields.extend(input_fields);
                existing.members.extend(members);
            }
            None => {
                self.types.insert(name.clone(), TypeMeta {
                    name,
                    kind,
                    directives,
                    implements,
                    fields,
                    input_fields,
                    members,
                    id_components: None,
                });
            }
        }
    }

    fn is_node_type(&self, ty: &TypeMeta) -> bool {
        ty.kind == TypeKind::Object && ty.implements.iter().any(|i| *i == self.node_interface)
    }

    pub fn type_meta(&self, name: &str) -> Option<&TypeMeta> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldMeta> {
        self.types.get(type_name)?.field(field_name)
    }

    /// Named type returned by `type_name.field_name`.
    pub fn field_return_type(&self, type_name: &str, field_name: &str) -> Option<&str> {
        self.field(type_name, field_name).map(|f| f.ty.named.as_str())
    }

    pub fn root_type(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::Query => &self.query_type,
            OperationKind::Mutation => &self.mutation_type,
            OperationKind::Subscription => &self.subscription_type,
        }
    }

    /// Declared members of a union, or `None` if `name` is not a union.
    pub fn union_members(&self, name: &str) -> Option<&[String]> {
        self.types.get(name)
            .filter(|ty| ty.kind == TypeKind::Union)
            .map(|ty| ty.members.as_slice())
    }

    pub fn is_union_member(&self, union: &str, member: &str) -> bool {
        self.union_members(union).is_some_and(|members| members.iter().any(|m| m == member))
    }

    /// Whether `name` may stand for an error in a result union. Schemas
    /// without the error interface put no restriction on members.
    pub fn is_error_type(&self, name: &str) -> bool {
        if !self.types.contains_key(&self.error_interface) {
            return true;
        }
        self.types.get(name).is_some_and(|ty| ty.implements.iter().any(|i| *i == self.error_interface))
    }

    /// Name of the directive marking sensitive values.
    pub fn redact_directive(&self) -> &str {
        &self.redact_directive
    }

    /// Whether a directive list contains the redact directive.
    pub fn is_redacted(&self, directives: &[String]) -> bool {
        directives.iter().any(|d| *d == self.redact_directive)
    }

    /// Whether every value of the named type is redacted.
    pub fn is_redacted_type(&self, name: &str) -> bool {
        self.types.get(name).is_some_and(|ty| self.is_redacted(&ty.directives))
    }

    /// Object types reachable through a global ID, sorted by name.
    pub fn referencable_types(&self) -> Vec<&TypeMeta> {
        let mut out = self.types.values().filter(|ty| self.is_node_type(ty)).collect::<Vec<_>>();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Number of global ID components declared for a node type.
    pub fn id_arity(&self, type_name: &str) -> Option<usize> {
        self.types.get(type_name)?.id_components.as_ref().map(Vec::len)
    }
}

fn names(list: &[Positioned<async_graphql::Name>]) -> Vec<String> {
    list.iter().map(|n| n.node.to_string()).collect()
}

fn directive_names(directives: &[Positioned<ConstDirective>]) -> Vec<String> {
    directives.iter().map(|d| d.node.name.node.to_string()).collect()
}

fn input_value_meta(def: &InputValueDefinition) -> InputValueMeta {
    InputValueMeta {
        name: def.name.node.to_string(),
        ty: TypeRef::from_ast(&def.ty.node),
        directives: directive_names(&def.directives),
    }
}

fn field_meta(def: &FieldDefinition) -> FieldMeta {
    FieldMeta {
        name: def.name.node.to_string(),
        ty: TypeRef::from_ast(&def.ty.node),
        directives: directive_names(&def.directives),
        arguments: def.arguments.iter().map(|a| input_value_meta(&a.node)).collect(),
    }
}

/// Reads `fields` of the global ID directive, e.g.
/// `@globalId(fields: ["tokenId", "collectionId"])`.
fn declared_id_fields(directive: &ConstDirective) -> Result<Vec<String>, String> {
    let (_, value) = directive.arguments.iter()
        .find(|(name, _)| name.node.as_str() == "fields")
        .ok_or("missing 'fields' argument")?;

    let Value::List(items) = &value.node else {
        return Err("'fields' must be a list of strings".into());
    };
    let fields = items.iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            _ => Err("'fields' must be a list of strings".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if fields.is_empty() {
        return Err("'fields' must not be empty".into());
    }
    for (i, field) in fields.iter().enumerate() {
        if field == "id" {
            return Err("'fields' may not reference 'id'".into());
        }
        if fields[..i].contains(field) {
            return Err(format!("'fields' entries must be unique (duplicate entry: '{field}')"));
        }
    }
    Ok(fields)
}
