//! Error types shared by the scanner, resolver and visitor.
//!
//! A `CompileError` aborts the current translation unit. Recoverable issues
//! (`#warning`, unknown pragma payloads) never become a `CompileError`; they
//! go through the diagnostic sink and processing continues.

use crate::location::Location;

/// Fatal error raised while scanning, resolving or monomorphizing a
/// translation unit.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// An expected token is missing (`(`, `)`, `,`, a macro parameter, ...).
    Expected {
        what: &'static str,
        location: Location,
    },
    /// A closing bracket appeared without a matching opener.
    UnexpectedClose { location: Location },
    /// A macro was called with an argument count inconsistent with its
    /// declaration.
    MacroArity {
        name: String,
        expected: usize,
        location: Location,
    },
    /// `#` applied to a non-parameter, or `##` with a missing or ill-kinded
    /// operand.
    MacroOperand {
        message: &'static str,
        location: Location,
    },
    /// An `#include` could not be located on any known search path.
    IncludeNotFound { path: String, location: Location },
    /// A directive or predefined macro that is recognized but not
    /// implemented.
    Unsupported {
        what: &'static str,
        location: Location,
    },
    /// The `#if` condition does not reduce to a single integer expression.
    ConstExpr { message: String, location: Location },
    /// A `#error` directive.
    User { message: String, location: Location },
    /// A declaration collides with an existing one and is not a
    /// prototype-to-definition completion.
    Redefinition { name: String },
    /// Malformed source text (unterminated literal, stray directive, ...).
    Scan { message: String, location: Location },
    /// A generic instantiation referenced a declaration that does not exist.
    MissingDeclaration { name: String },
    /// A generic instantiation referenced a declaration that only has a
    /// prototype; the definition is required to specialize it.
    PrototypeInstantiation { name: String },
}

impl CompileError {
    /// The source location the error points at, when it has one.
    pub fn location(&self) -> Option<Location> {
        match self {
            CompileError::Expected { location, .. }
            | CompileError::UnexpectedClose { location }
            | CompileError::MacroArity { location, .. }
            | CompileError::MacroOperand { location, .. }
            | CompileError::IncludeNotFound { location, .. }
            | CompileError::Unsupported { location, .. }
            | CompileError::ConstExpr { location, .. }
            | CompileError::User { location, .. }
            | CompileError::Scan { location, .. } => Some(*location),
            CompileError::Redefinition { .. }
            | CompileError::MissingDeclaration { .. }
            | CompileError::PrototypeInstantiation { .. } => None,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Expected { what, .. } => write!(f, "expected {}", what),
            CompileError::UnexpectedClose { .. } => {
                write!(f, "`)`, `}}` or `]` is not expected here")
            }
            CompileError::MacroArity { name, expected, .. } => write!(
                f,
                "macro `{}` called with a number of arguments inconsistent \
                 with its declaration (expected {})",
                name, expected
            ),
            CompileError::MacroOperand { message, .. } => write!(f, "{}", message),
            CompileError::IncludeNotFound { path, .. } => {
                write!(f, "include file `{}` not found", path)
            }
            CompileError::Unsupported { what, .. } => {
                write!(f, "{} is not supported yet", what)
            }
            CompileError::ConstExpr { message, .. } => {
                write!(f, "invalid constant expression: {}", message)
            }
            CompileError::User { message, .. } => write!(f, "{}", message),
            CompileError::Redefinition { name } => {
                write!(f, "`{}` is already defined", name)
            }
            CompileError::Scan { message, .. } => write!(f, "{}", message),
            CompileError::MissingDeclaration { name } => {
                write!(f, "unknown declaration `{}`", name)
            }
            CompileError::PrototypeInstantiation { name } => write!(
                f,
                "`{}` only has a prototype; its definition is required here",
                name
            ),
        }
    }
}

impl std::error::Error for CompileError {}
