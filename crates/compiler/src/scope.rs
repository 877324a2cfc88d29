//! Scope tree and declaration storage for one translation unit.
//!
//! Declarations are stored in per-category vectors plus a flat all-decls
//! vector that preserves program order. A scope entry records the owning
//! file, the index into the per-category vector and the index into the flat
//! vector, so replacing a prototype with its later definition rewrites what
//! both views see in one step.

use std::collections::HashMap;

use crate::ast::Decl;
use crate::error::CompileError;
use crate::location::FileId;

/// Handle to a scope in a `FileAnalysis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub usize);

impl ScopeId {
    /// The root scope of every file.
    pub const BASE: ScopeId = ScopeId(0);
}

/// The per-kind namespaces of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclCategory {
    Enum,
    EnumVariant,
    Function,
    Label,
    Struct,
    Typedef,
    Union,
    Variable,
}

impl DeclCategory {
    /// The namespace a declaration lives in. Specializations share the
    /// namespace of their base kind.
    pub fn of(decl: &Decl) -> DeclCategory {
        match decl {
            Decl::Enum(_) => DeclCategory::Enum,
            Decl::EnumVariant(_) => DeclCategory::EnumVariant,
            Decl::Function(_) | Decl::FunctionGen(_) => DeclCategory::Function,
            Decl::Label(_) => DeclCategory::Label,
            Decl::Struct(_) | Decl::StructGen(_) => DeclCategory::Struct,
            Decl::Typedef(_) | Decl::TypedefGen(_) => DeclCategory::Typedef,
            Decl::Union(_) | Decl::UnionGen(_) => DeclCategory::Union,
            Decl::Variable(_) => DeclCategory::Variable,
        }
    }
}

/// Entry of a scope namespace: where the declaration actually lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclRef {
    pub file: FileId,
    /// Index into the per-category vector.
    pub index: usize,
    /// Index into the flat all-decls vector.
    pub all_index: usize,
}

/// One lexical scope with its per-category name maps.
#[derive(Debug, Default)]
pub struct Scope {
    pub id: usize,
    pub parent: Option<ScopeId>,
    pub is_block: bool,
    enums: HashMap<String, DeclRef>,
    enum_variants: HashMap<String, DeclRef>,
    functions: HashMap<String, DeclRef>,
    labels: HashMap<String, DeclRef>,
    structs: HashMap<String, DeclRef>,
    typedefs: HashMap<String, DeclRef>,
    unions: HashMap<String, DeclRef>,
    variables: HashMap<String, DeclRef>,
}

impl Scope {
    fn map(&self, category: DeclCategory) -> &HashMap<String, DeclRef> {
        match category {
            DeclCategory::Enum => &self.enums,
            DeclCategory::EnumVariant => &self.enum_variants,
            DeclCategory::Function => &self.functions,
            DeclCategory::Label => &self.labels,
            DeclCategory::Struct => &self.structs,
            DeclCategory::Typedef => &self.typedefs,
            DeclCategory::Union => &self.unions,
            DeclCategory::Variable => &self.variables,
        }
    }

    fn map_mut(&mut self, category: DeclCategory) -> &mut HashMap<String, DeclRef> {
        match category {
            DeclCategory::Enum => &mut self.enums,
            DeclCategory::EnumVariant => &mut self.enum_variants,
            DeclCategory::Function => &mut self.functions,
            DeclCategory::Label => &mut self.labels,
            DeclCategory::Struct => &mut self.structs,
            DeclCategory::Typedef => &mut self.typedefs,
            DeclCategory::Union => &mut self.unions,
            DeclCategory::Variable => &mut self.variables,
        }
    }
}

/// Per-category declaration vectors plus the flat program-order view.
#[derive(Debug, Default)]
pub struct DeclStore {
    all: Vec<(DeclCategory, usize)>,
    enums: Vec<Decl>,
    enum_variants: Vec<Decl>,
    functions: Vec<Decl>,
    labels: Vec<Decl>,
    structs: Vec<Decl>,
    typedefs: Vec<Decl>,
    unions: Vec<Decl>,
    variables: Vec<Decl>,
}

impl DeclStore {
    fn vec(&self, category: DeclCategory) -> &Vec<Decl> {
        match category {
            DeclCategory::Enum => &self.enums,
            DeclCategory::EnumVariant => &self.enum_variants,
            DeclCategory::Function => &self.functions,
            DeclCategory::Label => &self.labels,
            DeclCategory::Struct => &self.structs,
            DeclCategory::Typedef => &self.typedefs,
            DeclCategory::Union => &self.unions,
            DeclCategory::Variable => &self.variables,
        }
    }

    fn vec_mut(&mut self, category: DeclCategory) -> &mut Vec<Decl> {
        match category {
            DeclCategory::Enum => &mut self.enums,
            DeclCategory::EnumVariant => &mut self.enum_variants,
            DeclCategory::Function => &mut self.functions,
            DeclCategory::Label => &mut self.labels,
            DeclCategory::Struct => &mut self.structs,
            DeclCategory::Typedef => &mut self.typedefs,
            DeclCategory::Union => &mut self.unions,
            DeclCategory::Variable => &mut self.variables,
        }
    }

    pub fn get(&self, category: DeclCategory, index: usize) -> &Decl {
        &self.vec(category)[index]
    }

    /// Number of declarations in program order.
    pub fn all_len(&self) -> usize {
        self.all.len()
    }

    /// The declaration at position `index` of the program-order view.
    pub fn get_all(&self, index: usize) -> &Decl {
        let (category, per_kind_index) = self.all[index];
        self.get(category, per_kind_index)
    }
}

/// Outcome of inserting a declaration into a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Inserted (or replaced a prototype in place).
    Added,
    /// An equivalent declaration already exists; nothing changed.
    Existing,
    /// Anonymous declaration; scopes only index named declarations.
    Skipped,
}

/// The analysis side of one translation unit: its scope tree and
/// declarations.
#[derive(Debug)]
pub struct FileAnalysis {
    scopes: Vec<Scope>,
    pub store: DeclStore,
}

impl Default for FileAnalysis {
    fn default() -> Self {
        FileAnalysis::new()
    }
}

impl FileAnalysis {
    pub fn new() -> Self {
        FileAnalysis {
            scopes: vec![Scope::default()],
            store: DeclStore::default(),
        }
    }

    pub fn scope_base(&self) -> ScopeId {
        ScopeId::BASE
    }

    pub fn add_scope(&mut self, parent: ScopeId, is_block: bool) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            id,
            parent: Some(parent),
            is_block,
            ..Scope::default()
        });
        ScopeId(id)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    /// Look a name up in `category`, walking the scope chain from `from`
    /// up to the root.
    pub fn search_ref(
        &self,
        from: ScopeId,
        category: DeclCategory,
        name: &str,
    ) -> Option<DeclRef> {
        let mut scope = Some(from);
        while let Some(id) = scope {
            let s = &self.scopes[id.0];
            if let Some(decl_ref) = s.map(category).get(name) {
                return Some(*decl_ref);
            }
            scope = s.parent;
        }
        None
    }

    pub fn search(&self, from: ScopeId, category: DeclCategory, name: &str) -> Option<&Decl> {
        self.search_ref(from, category, name)
            .map(|r| self.store.get(category, r.index))
    }

    pub fn search_function(&self, name: &str) -> Option<&Decl> {
        self.search(ScopeId::BASE, DeclCategory::Function, name)
    }

    pub fn search_struct(&self, name: &str) -> Option<&Decl> {
        self.search(ScopeId::BASE, DeclCategory::Struct, name)
    }

    pub fn search_union(&self, name: &str) -> Option<&Decl> {
        self.search(ScopeId::BASE, DeclCategory::Union, name)
    }

    pub fn search_typedef(&self, name: &str) -> Option<&Decl> {
        self.search(ScopeId::BASE, DeclCategory::Typedef, name)
    }

    /// Insert `decl` into `scope`.
    ///
    /// A definition completing an earlier prototype of the same kind
    /// replaces it in place. A duplicate prototype, or a specialization that
    /// already exists under its mangled name, resolves to the existing
    /// entry. A definition colliding with another definition is a
    /// redefinition error.
    pub fn add_decl(
        &mut self,
        file: FileId,
        scope: ScopeId,
        decl: Decl,
    ) -> Result<AddOutcome, CompileError> {
        let Some(name) = decl.name().map(str::to_string) else {
            return Ok(AddOutcome::Skipped);
        };
        let category = DeclCategory::of(&decl);

        if let Some(existing_ref) = self.search_ref(scope, category, &name) {
            let existing = self.store.get(category, existing_ref.index);

            if decl.is_prototype() || decl.is_gen() {
                return Ok(AddOutcome::Existing);
            }
            if existing.is_prototype() {
                self.store.vec_mut(category)[existing_ref.index] = decl;
                return Ok(AddOutcome::Added);
            }
            return Err(CompileError::Redefinition { name });
        }

        let index = self.store.vec(category).len();
        let all_index = self.store.all.len();
        self.store.vec_mut(category).push(decl);
        self.store.all.push((category, index));
        self.scopes[scope.0].map_mut(category).insert(
            name,
            DeclRef {
                file,
                index,
                all_index,
            },
        );

        Ok(AddOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Body, DataType, FunctionDecl};

    fn function(name: &str, with_body: bool) -> Decl {
        Decl::Function(FunctionDecl {
            name: name.to_string(),
            generic_params: None,
            return_data_type: DataType::Void,
            params: None,
            body: with_body.then(Body::default),
        })
    }

    #[test]
    fn test_add_and_search() {
        let mut analysis = FileAnalysis::new();
        let file = FileId::new(1, crate::location::FileKind::Source);

        let outcome = analysis
            .add_decl(file, ScopeId::BASE, function("main", true))
            .unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        assert!(analysis.search_function("main").is_some());
        assert!(analysis.search_function("other").is_none());
    }

    #[test]
    fn test_prototype_then_definition_replaces_in_place() {
        let mut analysis = FileAnalysis::new();
        let file = FileId::new(1, crate::location::FileKind::Source);

        analysis
            .add_decl(file, ScopeId::BASE, function("f", false))
            .unwrap();
        assert!(analysis.search_function("f").unwrap().is_prototype());

        let outcome = analysis
            .add_decl(file, ScopeId::BASE, function("f", true))
            .unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        assert!(!analysis.search_function("f").unwrap().is_prototype());

        // Both views observe the replacement.
        assert_eq!(analysis.store.all_len(), 1);
        assert!(!analysis.store.get_all(0).is_prototype());
    }

    #[test]
    fn test_duplicate_prototype_is_kept_once() {
        let mut analysis = FileAnalysis::new();
        let file = FileId::new(1, crate::location::FileKind::Source);

        analysis
            .add_decl(file, ScopeId::BASE, function("f", false))
            .unwrap();
        let outcome = analysis
            .add_decl(file, ScopeId::BASE, function("f", false))
            .unwrap();
        assert_eq!(outcome, AddOutcome::Existing);
        assert_eq!(analysis.store.all_len(), 1);
    }

    #[test]
    fn test_definition_collision_is_an_error() {
        let mut analysis = FileAnalysis::new();
        let file = FileId::new(1, crate::location::FileKind::Source);

        analysis
            .add_decl(file, ScopeId::BASE, function("f", true))
            .unwrap();
        let err = analysis
            .add_decl(file, ScopeId::BASE, function("f", true))
            .unwrap_err();
        assert!(matches!(err, CompileError::Redefinition { name } if name == "f"));
    }

    #[test]
    fn test_scope_chain_lookup() {
        let mut analysis = FileAnalysis::new();
        let file = FileId::new(1, crate::location::FileKind::Source);
        let inner = analysis.add_scope(ScopeId::BASE, true);

        analysis
            .add_decl(file, ScopeId::BASE, function("outer", true))
            .unwrap();
        assert!(
            analysis
                .search(inner, DeclCategory::Function, "outer")
                .is_some()
        );

        analysis
            .add_decl(file, inner, function("inner", true))
            .unwrap();
        // Not visible from the base scope.
        assert!(
            analysis
                .search(ScopeId::BASE, DeclCategory::Function, "inner")
                .is_none()
        );
    }

    #[test]
    fn test_anonymous_declarations_are_skipped() {
        let mut analysis = FileAnalysis::new();
        let file = FileId::new(1, crate::location::FileKind::Source);
        let decl = Decl::Struct(crate::ast::StructDecl {
            name: None,
            generic_params: None,
            fields: Some(crate::ast::Fields::default()),
        });
        assert_eq!(
            analysis.add_decl(file, ScopeId::BASE, decl).unwrap(),
            AddOutcome::Skipped
        );
        assert_eq!(analysis.store.all_len(), 0);
    }
}
