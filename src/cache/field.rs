//! Schema-shaped operation descriptors.
//!
//! These stand in for the per-operation models a code generator would emit:
//! they give the normalizer its traversal order and each field's arguments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Variables of an operation, by name.
pub type Variables = Map<String, Value>;

/// Which root the operation's fields hang off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

/// Shape of a field's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// String, number, boolean, enum or ID.
    Scalar,
    /// Custom scalar whose JSON value is stored as-is, objects included.
    CustomScalar,
    /// Object with its own selection set.
    Object { selections: Vec<Field> },
    /// List of some element shape.
    List { of: Box<FieldType> },
}

/// One selected field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Name in the response (the alias, when there is one).
    pub response_name: String,
    /// Underlying schema field name.
    pub field_name: String,
    /// Raw arguments; values may be `{"kind":"Variable","variableName":..}` markers.
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// A missing value is treated as null instead of a shape error.
    #[serde(default)]
    pub optional: bool,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl Field {
    pub fn scalar(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            response_name: name.clone(),
            field_name: name,
            arguments: Map::new(),
            optional: false,
            ty: FieldType::Scalar,
        }
    }

    pub fn custom_scalar(name: impl Into<String>) -> Self {
        Self {
            ty: FieldType::CustomScalar,
            ..Self::scalar(name)
        }
    }

    pub fn object(name: impl Into<String>, selections: Vec<Field>) -> Self {
        Self {
            ty: FieldType::Object { selections },
            ..Self::scalar(name)
        }
    }

    /// List of objects, the common case for connections.
    pub fn object_list(name: impl Into<String>, selections: Vec<Field>) -> Self {
        Self {
            ty: FieldType::List {
                of: Box::new(FieldType::Object { selections }),
            },
            ..Self::scalar(name)
        }
    }

    pub fn scalar_list(name: impl Into<String>) -> Self {
        Self {
            ty: FieldType::List {
                of: Box::new(FieldType::Scalar),
            },
            ..Self::scalar(name)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.response_name = alias.into();
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Argument bound to the operation variable `variable`.
    pub fn with_variable_argument(
        self,
        name: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        self.with_argument(name, variable_marker(variable))
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// The `{"kind":"Variable","variableName":..}` marker used in raw arguments.
pub fn variable_marker(variable: impl Into<String>) -> Value {
    let mut marker = Map::new();
    marker.insert("kind".to_string(), Value::String("Variable".to_string()));
    marker.insert("variableName".to_string(), Value::String(variable.into()));
    Value::Object(marker)
}

/// Operation descriptor: root selections plus the variables it was called with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub kind: OperationKind,
    #[serde(default)]
    pub variables: Variables,
    pub selections: Vec<Field>,
}

impl Operation {
    pub fn query(name: impl Into<String>, selections: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Query,
            variables: Variables::new(),
            selections,
        }
    }

    pub fn with_kind(mut self, kind: OperationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}
