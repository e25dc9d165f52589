//! constraints-lang: the constraint script language.
//!
//! A small statically typed scripting language for building constraint
//! trees through fluent libraries. This crate holds the whole language:
//!
//! - `lexer`, `parser`: source text to [`ast`]
//! - `typeck`: bundle-wide static checking with [`Diagnostic`]s
//! - `interp`: a budgeted tree-walking interpreter producing [`Value`]s
//!
//! The usual entry point is [`Program::compile`] over a [`SourceBundle`],
//! then [`Program::run`].

pub mod ast;
pub mod bundle;
pub mod diagnostic;
pub mod interp;
pub mod level;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod span;
mod typeck;
pub mod types;
pub mod value;

pub use bundle::{BundleError, ParsedSnippet, ParsedUnit, SourceBundle};
pub use diagnostic::{Category, Diagnostic, DiagnosticRecord, RecordLocation};
pub use interp::{Budget, Exhausted, RuntimeError, RuntimeErrorKind, StackFrame};
pub use level::{Feature, LanguageLevel, UnknownLevel};
pub use program::{CompileError, Program};
pub use span::{SourceUnit, Span, UnitId};
pub use types::Type;
pub use value::{NodeValue, SerializeError, Value};
