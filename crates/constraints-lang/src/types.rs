//! Static types and assignability.
//!
//! Composite types share their parts, so cloning a resolved type is cheap
//! no matter how large it is.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

/// Most nodes a single type tree may have. Shared parts count once per
/// occurrence.
pub const MAX_TYPE_NODES: usize = 1024;

/// A resolved static type. Aliases are expanded before a `Type` exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Number,
    String,
    Boolean,
    /// String literal type: `"A"`.
    Literal(Arc<str>),
    /// Nominal node type.
    Node(Arc<str>),
    Array(Arc<Type>),
    /// Flattened, deduplicated, at least two members.
    Union(Arc<[Type]>),
    Function(Arc<FnType>),
    /// Type of expressions that never produce a value.
    Never,
    /// Poison type for expressions that already failed to check.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnType {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Type {
    pub fn node(name: &str) -> Type {
        Type::Node(Arc::from(name))
    }

    pub fn literal(value: &str) -> Type {
        Type::Literal(Arc::from(value))
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Arc::new(element))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function(Arc::new(FnType { params, ret }))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Union of `members`: nested unions are flattened, duplicates and
    /// `never` removed. Any error member poisons the whole union.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat: IndexSet<Type> = IndexSet::new();
        for member in members {
            match member {
                Type::Error => return Type::Error,
                Type::Never => {}
                Type::Union(inner) => flat.extend(inner.iter().cloned()),
                ty => {
                    flat.insert(ty);
                }
            }
        }
        match flat.len() {
            0 => Type::Never,
            1 => flat.pop().unwrap_or(Type::Never),
            _ => Type::Union(flat.into_iter().collect()),
        }
    }

    /// Whether the tree has at most `limit` nodes. Stops counting as soon
    /// as the limit is passed.
    pub fn size_within(&self, limit: usize) -> bool {
        let mut remaining = limit;
        self.count_down(&mut remaining)
    }

    fn count_down(&self, remaining: &mut usize) -> bool {
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        match self {
            Type::Array(element) => element.count_down(remaining),
            Type::Union(members) => members.iter().all(|m| m.count_down(remaining)),
            Type::Function(func) => {
                func.params.iter().all(|p| p.count_down(remaining)) && func.ret.count_down(remaining)
            }
            _ => true,
        }
    }

    /// Widen literal types to `string`, as `let` bindings do.
    pub fn widen(&self) -> Type {
        match self {
            Type::Literal(_) => Type::String,
            Type::Union(members) => Type::union(members.iter().map(Type::widen)),
            other => other.clone(),
        }
    }

    /// Union members, or the type itself.
    pub fn members(&self) -> &[Type] {
        match self {
            Type::Union(members) => &members[..],
            other => std::slice::from_ref(other),
        }
    }

    /// Whether a value of type `self` may be used where `target` is expected.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (Type::Error | Type::Never, _) | (_, Type::Error) => true,
            (Type::Union(members), _) => members.iter().all(|m| m.is_assignable_to(target)),
            (_, Type::Union(members)) => members.iter().any(|m| self.is_assignable_to(m)),
            (Type::Literal(_), Type::String) => true,
            (Type::Array(source), Type::Array(target)) => source.is_assignable_to(target),
            (Type::Function(source), Type::Function(target)) => {
                source.params.len() <= target.params.len()
                    && source
                        .params
                        .iter()
                        .zip(&target.params)
                        .all(|(s, t)| t.is_assignable_to(s))
                    && source.ret.is_assignable_to(&target.ret)
            }
            _ => false,
        }
    }

    /// Whether two types share any value; `a == b` is rejected otherwise.
    pub fn overlaps(&self, other: &Type) -> bool {
        self.is_assignable_to(other)
            || other.is_assignable_to(self)
            || self
                .members()
                .iter()
                .any(|m| other.members().iter().any(|o| m.is_assignable_to(o) || o.is_assignable_to(m)))
    }

    /// First function type among the members, for contextual typing.
    pub fn as_function(&self) -> Option<&FnType> {
        self.members().iter().find_map(|m| match m {
            Type::Function(f) => Some(f.as_ref()),
            _ => None,
        })
    }

    /// First array element type among the members, for contextual typing.
    pub fn array_element(&self) -> Option<&Type> {
        self.members().iter().find_map(|m| match m {
            Type::Array(element) => Some(element.as_ref()),
            _ => None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Boolean => f.write_str("boolean"),
            Type::Literal(value) => write!(f, "{value:?}"),
            Type::Node(name) => f.write_str(name),
            Type::Array(element) => match element.as_ref() {
                Type::Union(_) | Type::Function(_) => write!(f, "({element})[]"),
                _ => write!(f, "{element}[]"),
            },
            Type::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    match member {
                        Type::Function(_) => write!(f, "({member})")?,
                        _ => write!(f, "{member}")?,
                    }
                }
                Ok(())
            }
            Type::Function(func) => {
                f.write_str("(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") => {}", func.ret)
            }
            Type::Never => f.write_str("never"),
            Type::Error => f.write_str("unknown"),
        }
    }
}
