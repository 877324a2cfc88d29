//! The compilation context: every scanned translation unit of one build.
//!
//! A `Compilation` owns the token arena, the ordered tables of headers and
//! sources, the include search directories and the diagnostic sink. Headers
//! are scanned once and cached by canonical path; including the same header
//! again reuses the scanned stream and bumps the include ledger instead.
//!
//! Each file owns its defines table. A header's directives are resolved in
//! the context of the file that includes it, so macros defined by an
//! included header become visible to the including file in splice order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::CompilerConfig;
use crate::diagnostic::DiagnosticSink;
use crate::error::CompileError;
use crate::location::{FileId, FileKind};
use crate::scanner;
use crate::scope::FileAnalysis;
use crate::stream::{TokenArena, TokenId, TokenStream};

/// A registered `#define`: the define token plus the file that defined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefineRecord {
    pub token: TokenId,
    pub file: FileId,
}

/// How an include path was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// Found in one of the configured include directories.
    System,
    /// Found next to the including file.
    Local,
}

/// Ledger entry for one include path of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeRecord {
    pub kind: IncludeKind,
    pub repeat_count: usize,
}

/// One translation unit: input buffer, scanned tokens, defines, includes
/// and analysis.
#[derive(Debug)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub input: String,
    pub stream: TokenStream,
    pub defines: HashMap<String, DefineRecord>,
    pub includes: HashMap<PathBuf, IncludeRecord>,
    pub analysis: FileAnalysis,
    /// The file that first pulled this header in, when it entered the
    /// compilation through an `#include`.
    pub owner: Option<FileId>,
}

/// The process-wide state of one build, passed explicitly everywhere.
#[derive(Debug)]
pub struct Compilation {
    pub arena: TokenArena,
    headers: Vec<SourceFile>,
    sources: Vec<SourceFile>,
    header_ids: HashMap<PathBuf, FileId>,
    pub include_dirs: Vec<PathBuf>,
    pub sink: DiagnosticSink,
}

impl Compilation {
    pub fn new(config: &CompilerConfig) -> Self {
        let mut comp = Compilation {
            arena: TokenArena::new(),
            headers: Vec::new(),
            sources: Vec::new(),
            header_ids: HashMap::new(),
            include_dirs: config.include_dirs.clone(),
            sink: DiagnosticSink::new(),
        };

        // Header id 0 is reserved for predefined content; every new file
        // starts from its defines.
        comp.headers.push(SourceFile {
            id: FileId::PREDEFINED,
            path: PathBuf::from("<predefined>"),
            input: String::new(),
            stream: TokenStream::new(),
            defines: HashMap::new(),
            includes: HashMap::new(),
            analysis: FileAnalysis::new(),
            owner: None,
        });

        comp
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        match id.kind {
            FileKind::Header => &self.headers[id.id as usize],
            FileKind::Source => &self.sources[id.id as usize],
        }
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut SourceFile {
        match id.kind {
            FileKind::Header => &mut self.headers[id.id as usize],
            FileKind::Source => &mut self.sources[id.id as usize],
        }
    }

    /// Ids of the registered source files, in registration order.
    pub fn source_ids(&self) -> Vec<FileId> {
        self.sources.iter().map(|f| f.id).collect()
    }

    /// Register a predefined macro or declaration seed for every file
    /// scanned afterwards.
    pub fn add_predefined_define(&mut self, name: impl Into<String>, record: DefineRecord) {
        self.headers[0].defines.insert(name.into(), record);
    }

    /// Register and scan a source file from an in-memory buffer.
    pub fn add_source(
        &mut self,
        path: impl Into<PathBuf>,
        input: String,
    ) -> Result<FileId, CompileError> {
        let id = FileId::new(self.sources.len() as u32, FileKind::Source);
        let stream = scanner::scan(&input, id, &mut self.arena)?;
        self.sources.push(SourceFile {
            id,
            path: path.into(),
            input,
            stream,
            defines: self.headers[0].defines.clone(),
            includes: HashMap::new(),
            analysis: FileAnalysis::new(),
            owner: None,
        });
        Ok(id)
    }

    /// Register and scan a source file from disk.
    pub fn add_source_from_path(&mut self, path: &Path) -> Result<FileId, CompileError> {
        let input = std::fs::read_to_string(path).map_err(|e| CompileError::Scan {
            message: format!("failed to read {}: {}", path.display(), e),
            location: crate::location::Location::builtin(FileId::PREDEFINED),
        })?;
        self.add_source(path, input)
    }

    /// Look a header up by path, scanning and registering it on a cache
    /// miss. Cache hits reuse the already-scanned stream.
    pub fn add_or_get_header(
        &mut self,
        path: &Path,
        owner: FileId,
    ) -> Result<FileId, CompileError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(id) = self.header_ids.get(&canonical) {
            return Ok(*id);
        }

        let input = std::fs::read_to_string(&canonical).map_err(|e| CompileError::Scan {
            message: format!("failed to read {}: {}", canonical.display(), e),
            location: crate::location::Location::builtin(owner),
        })?;

        let id = FileId::new(self.headers.len() as u32, FileKind::Header);
        let stream = scanner::scan(&input, id, &mut self.arena)?;
        self.headers.push(SourceFile {
            id,
            path: canonical.clone(),
            input,
            stream,
            defines: self.headers[0].defines.clone(),
            includes: HashMap::new(),
            analysis: FileAnalysis::new(),
            owner: Some(owner),
        });
        self.header_ids.insert(canonical, id);
        Ok(id)
    }

    pub fn get_define(&self, file: FileId, name: &str) -> Option<DefineRecord> {
        self.file(file).defines.get(name).copied()
    }

    /// Register a define. Keeps the existing entry and returns true when
    /// the name was already defined.
    pub fn add_define(&mut self, file: FileId, name: String, record: DefineRecord) -> bool {
        let defines = &mut self.file_mut(file).defines;
        if defines.contains_key(&name) {
            return true;
        }
        defines.insert(name, record);
        false
    }

    /// Delete a define. Returns true when it existed.
    pub fn undef_define(&mut self, file: FileId, name: &str) -> bool {
        self.file_mut(file).defines.remove(name).is_some()
    }

    /// Record an include edge in the including file's ledger.
    pub fn record_include(&mut self, file: FileId, path: PathBuf, kind: IncludeKind) {
        self.file_mut(file)
            .includes
            .entry(path)
            .and_modify(|record| record.repeat_count += 1)
            .or_insert(IncludeRecord {
                kind,
                repeat_count: 0,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::token::{Token, TokenKind};

    fn compilation() -> Compilation {
        Compilation::new(&CompilerConfig::new())
    }

    #[test]
    fn test_predefined_header_is_reserved() {
        let comp = compilation();
        let predefined = comp.file(FileId::PREDEFINED);
        assert_eq!(predefined.id, FileId::PREDEFINED);
        assert_eq!(predefined.path, PathBuf::from("<predefined>"));
    }

    #[test]
    fn test_add_source_assigns_sequential_ids() {
        let mut comp = compilation();
        let a = comp.add_source("a.c", "int x;\n".to_string()).unwrap();
        let b = comp.add_source("b.c", "int y;\n".to_string()).unwrap();
        assert_eq!(a, FileId::new(0, FileKind::Source));
        assert_eq!(b, FileId::new(1, FileKind::Source));
        assert!(!comp.file(a).stream.is_empty());
    }

    #[test]
    fn test_predefined_defines_seed_new_files() {
        let mut comp = compilation();
        let token = comp.arena.alloc(Token::new(
            TokenKind::Eof,
            Location::builtin(FileId::PREDEFINED),
        ));
        comp.add_predefined_define(
            "__MICA__",
            DefineRecord {
                token,
                file: FileId::PREDEFINED,
            },
        );

        let file = comp.add_source("main.c", "int x;\n".to_string()).unwrap();
        assert!(comp.get_define(file, "__MICA__").is_some());
    }

    #[test]
    fn test_define_add_and_undef() {
        let mut comp = compilation();
        let file = comp.add_source("main.c", "int x;\n".to_string()).unwrap();
        let token = comp
            .arena
            .alloc(Token::new(TokenKind::Eof, Location::builtin(file)));
        let record = DefineRecord { token, file };

        assert!(!comp.add_define(file, "A".to_string(), record));
        // First definition wins; the name counts as already present.
        assert!(comp.add_define(file, "A".to_string(), record));

        assert!(comp.undef_define(file, "A"));
        assert!(!comp.undef_define(file, "A"));
        assert!(comp.get_define(file, "A").is_none());
    }

    #[test]
    fn test_include_ledger_counts_repeats() {
        let mut comp = compilation();
        let file = comp.add_source("main.c", "int x;\n".to_string()).unwrap();
        let path = PathBuf::from("util.h");

        comp.record_include(file, path.clone(), IncludeKind::Local);
        comp.record_include(file, path.clone(), IncludeKind::Local);

        let record = comp.file(file).includes.get(&path).unwrap();
        assert_eq!(record.repeat_count, 1);
        assert_eq!(record.kind, IncludeKind::Local);
    }
}
