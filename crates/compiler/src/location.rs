//! Source locations for the C front-end.
//!
//! Every token carries a `Location` identifying the translation unit it came
//! from plus its start/end line, column and byte offset. Translation units
//! are identified by a `FileId`: a numeric id qualified by whether the file
//! entered the compilation as a header or a source.

/// Whether a translation unit is a header or a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Header,
    Source,
}

/// Identity of a translation unit within one `Compilation`.
///
/// Header and source ids are numbered independently, so the kind is part of
/// the identity. Header id 0 is reserved for predefined declarations and
/// macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub id: u32,
    pub kind: FileKind,
}

impl FileId {
    /// The reserved header slot holding predefined content.
    pub const PREDEFINED: FileId = FileId {
        id: 0,
        kind: FileKind::Header,
    };

    pub fn new(id: u32, kind: FileKind) -> Self {
        FileId { id, kind }
    }
}

/// A half-open span in a source file.
///
/// Lines and columns are 0-indexed; byte offsets index into the file's input
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: FileId,
    pub start_line: usize,
    pub start_column: usize,
    pub start_byte: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub end_byte: usize,
}

impl Location {
    pub fn new(
        file: FileId,
        start_line: usize,
        start_column: usize,
        start_byte: usize,
        end_line: usize,
        end_column: usize,
        end_byte: usize,
    ) -> Self {
        Location {
            file,
            start_line,
            start_column,
            start_byte,
            end_line,
            end_column,
            end_byte,
        }
    }

    /// A zero-width location at the start of a file, used for synthesized
    /// tokens that have no real source text.
    pub fn builtin(file: FileId) -> Self {
        Location::new(file, 0, 0, 0, 0, 0, 0)
    }

    /// A new location spanning from the start of `self` to the end of
    /// `other`.
    pub fn span_to(&self, other: &Location) -> Location {
        Location {
            file: self.file,
            start_line: self.start_line,
            start_column: self.start_column,
            start_byte: self.start_byte,
            end_line: other.end_line,
            end_column: other.end_column,
            end_byte: other.end_byte,
        }
    }

    /// A zero-width location at the end of `self`.
    pub fn at_end(&self) -> Location {
        Location {
            file: self.file,
            start_line: self.end_line,
            start_column: self.end_column,
            start_byte: self.end_byte,
            end_line: self.end_line,
            end_column: self.end_column,
            end_byte: self.end_byte,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 1-indexed for user display
        write!(f, "{}:{}", self.start_line + 1, self.start_column + 1)
    }
}
