//! Runtime values.
//!
//! Values are immutable and reference counted. Closures capture their
//! environment by value when created, so the value graph is acyclic. Every
//! compound value records its height; construction beyond
//! [`MAX_VALUE_HEIGHT`] fails, which bounds recursion when values are
//! compared, serialized, or dropped.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Number};

use crate::ast::{FnDecl, Lambda};
use crate::span::UnitId;
use crate::types::Type;

/// Deepest value nesting that can be constructed.
pub const MAX_VALUE_HEIGHT: u32 = 512;

/// Largest string that can be constructed, in bytes.
pub const MAX_STRING_BYTES: usize = 16 * 1024 * 1024;

/// Most JSON values a single serialization may produce.
pub const MAX_JSON_NODES: usize = 1_000_000;

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(Arc<str>),
    Boolean(bool),
    Array(Arc<ArrayValue>),
    Node(Arc<NodeValue>),
    Function(Arc<FunctionValue>),
}

#[derive(Debug)]
pub struct ArrayValue {
    pub items: Vec<Value>,
    height: u32,
}

/// An instance of a node type; fields keep construction order.
#[derive(Debug)]
pub struct NodeValue {
    pub type_name: Arc<str>,
    pub fields: IndexMap<String, Value>,
    height: u32,
}

#[derive(Debug)]
pub enum FunctionValue {
    /// A lambda with the bindings visible where it was created.
    Closure {
        lambda: Arc<Lambda>,
        unit: UnitId,
        captured: Vec<(Arc<str>, Value)>,
        receiver: Option<Value>,
        height: u32,
    },
    /// A declared free function used as a value.
    Declared { decl: Arc<FnDecl>, unit: UnitId },
}

/// A value would exceed [`MAX_VALUE_HEIGHT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value nested too deeply (limit {MAX_VALUE_HEIGHT})")]
pub struct TooDeep;

fn height_of<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<u32, TooDeep> {
    let height = values.into_iter().map(Value::height).max().unwrap_or(0) + 1;
    if height > MAX_VALUE_HEIGHT {
        Err(TooDeep)
    } else {
        Ok(height)
    }
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Result<Value, TooDeep> {
        let height = height_of(&items)?;
        Ok(Value::Array(Arc::new(ArrayValue { items, height })))
    }

    pub fn node(type_name: impl Into<Arc<str>>, fields: IndexMap<String, Value>) -> Result<Value, TooDeep> {
        let height = height_of(fields.values())?;
        Ok(Value::Node(Arc::new(NodeValue {
            type_name: type_name.into(),
            fields,
            height,
        })))
    }

    pub fn closure(
        lambda: Arc<Lambda>,
        unit: UnitId,
        captured: Vec<(Arc<str>, Value)>,
        receiver: Option<Value>,
    ) -> Result<Value, TooDeep> {
        let height = height_of(captured.iter().map(|(_, v)| v).chain(receiver.as_ref()))?;
        Ok(Value::Function(Arc::new(FunctionValue::Closure {
            lambda,
            unit,
            captured,
            receiver,
            height,
        })))
    }

    pub fn declared(decl: Arc<FnDecl>, unit: UnitId) -> Value {
        Value::Function(Arc::new(FunctionValue::Declared { decl, unit }))
    }

    pub fn height(&self) -> u32 {
        match self {
            Value::Number(_) | Value::String(_) | Value::Boolean(_) => 0,
            Value::Array(array) => array.height,
            Value::Node(node) => node.height,
            Value::Function(func) => match func.as_ref() {
                FunctionValue::Closure { height, .. } => *height,
                FunctionValue::Declared { .. } => 0,
            },
        }
    }

    /// The structural representation: present on node values only.
    pub fn ast_node(&self) -> Option<&NodeValue> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Array(_) => "array",
            Value::Node(_) => "node",
            Value::Function(_) => "function",
        }
    }

    /// `===`: primitives by value, everything else by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Static type of a value bound from the host.
    ///
    /// Strings widen to `string`; functions have no static shape and check
    /// as the error type.
    pub fn static_type(&self) -> Type {
        match self {
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Boolean(_) => Type::Boolean,
            Value::Array(array) => {
                let element = Type::union(array.items.iter().map(Value::static_type));
                Type::array(element)
            }
            Value::Node(node) => Type::Node(node.type_name.clone()),
            Value::Function(_) => Type::Error,
        }
    }
}

impl fmt::Display for Value {
    /// String conversion used by `+` on strings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Array(array) => {
                for (i, item) in array.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Node(_) => f.write_str("[object Object]"),
            Value::Function(_) => f.write_str("[function]"),
        }
    }
}

/// Number formatting compatible with the scripting convention: integral
/// values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    #[error("cannot serialize a function value at {path}")]
    Function { path: String },

    #[error("serialized value exceeds {limit} JSON nodes")]
    TooLarge { limit: usize },
}

impl NodeValue {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// JSON object of this node's fields, in construction order.
    pub fn to_json(&self) -> Result<serde_json::Value, SerializeError> {
        let mut budget = MAX_JSON_NODES;
        node_to_json(self, "$", &mut budget)
    }
}

fn spend(budget: &mut usize) -> Result<(), SerializeError> {
    if *budget == 0 {
        return Err(SerializeError::TooLarge {
            limit: MAX_JSON_NODES,
        });
    }
    *budget -= 1;
    Ok(())
}

fn node_to_json(node: &NodeValue, path: &str, budget: &mut usize) -> Result<serde_json::Value, SerializeError> {
    spend(budget)?;
    let mut map = Map::with_capacity(node.fields.len());
    for (name, value) in &node.fields {
        let child = value_to_json(value, &format!("{path}.{name}"), budget)?;
        map.insert(name.clone(), child);
    }
    Ok(serde_json::Value::Object(map))
}

fn value_to_json(value: &Value, path: &str, budget: &mut usize) -> Result<serde_json::Value, SerializeError> {
    match value {
        Value::Node(node) => node_to_json(node, path, budget),
        Value::Array(array) => {
            spend(budget)?;
            let items = array
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| value_to_json(item, &format!("{path}[{i}]"), budget))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(serde_json::Value::Array(items))
        }
        Value::Number(n) => {
            spend(budget)?;
            Ok(number_to_json(*n))
        }
        Value::String(s) => {
            spend(budget)?;
            Ok(serde_json::Value::String(s.to_string()))
        }
        Value::Boolean(b) => {
            spend(budget)?;
            Ok(serde_json::Value::Bool(*b))
        }
        Value::Function(_) => Err(SerializeError::Function {
            path: path.to_string(),
        }),
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < MAX_SAFE {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
