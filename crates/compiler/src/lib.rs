//! Mica Compiler Library
//!
//! Front-end core for the Mica toolchain: a C preprocessor (scanner +
//! macro resolver) and the generic monomorphization pass that runs over
//! parsed Mica declarations.
//!
//! The usual entry point is [`preprocess_file`] (or [`preprocess_source`]
//! for in-memory buffers):
//!
//! ```rust,ignore
//! use micac::{preprocess_file, CompilerConfig};
//!
//! let config = CompilerConfig::new().with_include_dir("include");
//! let unit = preprocess_file(Path::new("main.c"), &config)?;
//! println!("{}", unit.render());
//! ```
//!
//! The resolver and visitor report through a diagnostic sink; the driver
//! exits non-zero iff the sink holds at least one error once processing
//! finishes. Warnings never change the exit status.

pub mod ast;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod location;
pub mod monomorph;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod scope;
pub mod stream;
pub mod token;

pub use config::CompilerConfig;
pub use diagnostic::{Diagnostic, DiagnosticSink, Severity};
pub use error::CompileError;
pub use location::{FileId, FileKind, Location};
pub use monomorph::Monomorphizer;
pub use registry::Compilation;
pub use resolver::resolve_file;
pub use stream::{ResolvedTokens, TokenArena, TokenId, TokenStream};
pub use token::{Token, TokenKind};

use std::path::Path;

/// A preprocessed translation unit: the compilation state plus the resolved
/// token sequence of the root source file.
#[derive(Debug)]
pub struct Preprocessed {
    pub comp: Compilation,
    pub file: FileId,
    pub resolved: ResolvedTokens,
}

impl Preprocessed {
    /// The resolved tokens as source-like text, one space between tokens.
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .resolved
            .iter()
            .filter_map(|id| self.comp.arena.get(id).printable())
            .collect();
        parts.join(" ")
    }

    /// The resolved tokens, excluding the trailing end-of-file terminator.
    pub fn tokens(&self) -> Vec<&Token> {
        self.resolved
            .iter()
            .map(|id| self.comp.arena.get(id))
            .filter(|t| !matches!(t.kind, TokenKind::Eof))
            .collect()
    }
}

/// Preprocess a C source file from disk.
pub fn preprocess_file(path: &Path, config: &CompilerConfig) -> Result<Preprocessed, String> {
    let mut comp = Compilation::new(config);
    let file = match comp.add_source_from_path(path) {
        Ok(file) => file,
        Err(err) => return Err(render_failure(&mut comp, err)),
    };
    finish(comp, file)
}

/// Preprocess an in-memory C buffer (used by tests and tooling).
pub fn preprocess_source(
    name: &str,
    source: &str,
    config: &CompilerConfig,
) -> Result<Preprocessed, String> {
    let mut comp = Compilation::new(config);
    let file = match comp.add_source(name, source.to_string()) {
        Ok(file) => file,
        Err(err) => return Err(render_failure(&mut comp, err)),
    };
    finish(comp, file)
}

fn finish(mut comp: Compilation, file: FileId) -> Result<Preprocessed, String> {
    match resolve_file(&mut comp, file) {
        Ok(resolved) => {
            if comp.sink.has_errors() {
                return Err(render_diagnostics(&comp));
            }
            Ok(Preprocessed {
                comp,
                file,
                resolved,
            })
        }
        Err(err) => Err(render_failure(&mut comp, err)),
    }
}

fn render_failure(comp: &mut Compilation, err: CompileError) -> String {
    let location = err.location();
    comp.sink.error(err.to_string(), location);
    render_diagnostics(comp)
}

fn render_diagnostics(comp: &Compilation) -> String {
    comp.sink
        .diagnostics()
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_source_renders_resolved_stream() {
        let unit = preprocess_source(
            "main.c",
            "#define N 3\nint a[N];\n",
            &CompilerConfig::new(),
        )
        .unwrap();
        assert_eq!(unit.render(), "int a [ 3 ] ;");
    }

    #[test]
    fn test_tokens_exclude_terminator() {
        let unit = preprocess_source("main.c", "int x;\n", &CompilerConfig::new()).unwrap();
        assert_eq!(unit.tokens().len(), 3);
    }

    #[test]
    fn test_error_directive_fails_the_unit() {
        let err = preprocess_source(
            "main.c",
            "#error unsupported platform\n",
            &CompilerConfig::new(),
        )
        .unwrap_err();
        assert!(err.contains("unsupported platform"));
    }

    #[test]
    fn test_warnings_do_not_fail_the_unit() {
        let unit = preprocess_source(
            "main.c",
            "#warning will be removed\nint x;\n",
            &CompilerConfig::new(),
        )
        .unwrap();
        assert_eq!(unit.comp.sink.warning_count(), 1);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = preprocess_file(
            Path::new("/definitely/not/here.c"),
            &CompilerConfig::new(),
        )
        .unwrap_err();
        assert!(err.contains("failed to read"));
    }
}
