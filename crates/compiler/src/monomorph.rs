//! Generic monomorphization.
//!
//! After parsing and name resolution, every global declaration and every
//! expression in function bodies is visited; wherever a generic function,
//! struct, union or typedef is referenced with concrete type arguments, a
//! specialized declaration is synthesized and inserted into the scope where
//! the use was discovered. Specializations share one canonical mangled name,
//! so duplicate instantiations collapse into a single declaration, and
//! instantiating a generic that uses other generics cascades.

use std::collections::HashSet;

use crate::ast::{
    substitute_data_type, substitute_generic_params, Body, DataType, Decl, Expr, Field, FieldKind,
    Fields, FunctionGenDecl, FunctionParam, GenericParams, Item, Stmt, StructGenDecl,
    TypedefGenDecl,
};
use crate::error::CompileError;
use crate::location::FileId;
use crate::registry::Compilation;
use crate::scope::{DeclCategory, ScopeId};

/// The monomorphization visitor. One instance walks every file of a
/// compilation.
pub struct Monomorphizer<'c> {
    comp: &'c mut Compilation,
    file: Option<FileId>,
    current_scope: Option<ScopeId>,
    /// Mangled names currently being generated. A self-referential generic
    /// would otherwise recurse forever before its declaration lands in
    /// scope.
    in_progress: HashSet<String>,
}

impl<'c> Monomorphizer<'c> {
    pub fn new(comp: &'c mut Compilation) -> Self {
        Monomorphizer {
            comp,
            file: None,
            current_scope: None,
            in_progress: HashSet::new(),
        }
    }

    /// Visit every registered source file.
    pub fn run(&mut self) -> Result<(), CompileError> {
        for file in self.comp.source_ids() {
            self.run_file(file)?;
        }
        Ok(())
    }

    /// Visit one file's global declarations.
    pub fn run_file(&mut self, file: FileId) -> Result<(), CompileError> {
        self.set_file(file);
        let result = self.visit_global_decls();
        self.unset_file();
        result
    }

    fn set_file(&mut self, file: FileId) {
        self.file = Some(file);
        self.current_scope = Some(ScopeId::BASE);
    }

    fn unset_file(&mut self) {
        self.file = None;
        self.current_scope = None;
    }

    fn file(&self) -> FileId {
        self.file.expect("visitor entered a file")
    }

    fn analysis(&self) -> &crate::scope::FileAnalysis {
        &self.comp.file(self.file()).analysis
    }

    /// Generated declarations land in the scope where the use was
    /// discovered.
    fn add_decl_to_scope(&mut self, decl: Decl) -> Result<(), CompileError> {
        debug_assert!(decl.is_gen());
        let file = self.file();
        let scope = self.current_scope.unwrap_or(ScopeId::BASE);
        self.comp
            .file_mut(file)
            .analysis
            .add_decl(file, scope, decl)?;
        Ok(())
    }

    fn visit_global_decls(&mut self) -> Result<(), CompileError> {
        // Generated declarations append to the store while we iterate;
        // index-based iteration picks up a stable prefix and skips the gens.
        let mut index = 0;
        while index < self.analysis().store.all_len() {
            let decl = self.analysis().store.get_all(index).clone();
            self.visit_global_decl(&decl)?;
            index += 1;
        }
        Ok(())
    }

    /// Only non-generic leaves are eligible roots: generic declarations are
    /// specialized on demand, prototypes have nothing to walk, and locals
    /// are reached through their enclosing function.
    fn visit_global_decl(&mut self, decl: &Decl) -> Result<(), CompileError> {
        if decl.has_generic() || decl.is_prototype() || decl.is_local() || decl.is_gen() {
            return Ok(());
        }

        match decl {
            Decl::Enum(_) | Decl::EnumVariant(_) | Decl::Label(_) => Ok(()),
            Decl::Function(_) => self.visit_non_generic_function(decl),
            Decl::Struct(_) | Decl::Union(_) => self.visit_non_generic_struct_or_union(decl),
            Decl::Typedef(t) => self.generate_from_data_type(&t.data_type.clone(), None, None),
            Decl::Variable(_) => self.visit_variable(decl, None, None),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Specialization generators
    // ------------------------------------------------------------------

    /// Instantiate `name` with the (possibly still generic) arguments of a
    /// call site, substituting through the caller's own binding.
    fn generate_function_gen(
        &mut self,
        name: &str,
        unresolved_generic_params: &GenericParams,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        let function_decl = self
            .analysis()
            .search_function(name)
            .cloned()
            .ok_or_else(|| CompileError::MissingDeclaration {
                name: name.to_string(),
            })?;
        let Decl::Function(function) = &function_decl else {
            return Err(CompileError::MissingDeclaration {
                name: name.to_string(),
            });
        };

        if function_decl.is_prototype() {
            return Err(CompileError::PrototypeInstantiation {
                name: name.to_string(),
            });
        }

        let resolved_generic_params = if unresolved_generic_params.has_generic() {
            substitute_generic_params(
                unresolved_generic_params,
                decl_generic_params,
                called_generic_params,
            )
        } else {
            unresolved_generic_params.clone()
        };
        let serialized_name = resolved_generic_params.serialize_name(&function.name);

        if self.analysis().search_function(&serialized_name).is_some()
            || self.in_progress.contains(&serialized_name)
        {
            return Ok(());
        }
        self.in_progress.insert(serialized_name.clone());

        let subs_return_data_type = substitute_data_type(
            &function.return_data_type,
            function.generic_params.as_ref(),
            Some(&resolved_generic_params),
        );

        let gen_decl = Decl::FunctionGen(FunctionGenDecl {
            base: function.name.clone(),
            generic_params: resolved_generic_params.clone(),
            name: serialized_name.clone(),
            return_data_type: subs_return_data_type,
        });
        self.add_decl_to_scope(gen_decl)?;

        // Visiting the body may enqueue further instantiations, including
        // recursive uses of this very specialization.
        let result = self.visit_function(&function_decl, Some(&resolved_generic_params));
        self.in_progress.remove(&serialized_name);
        result
    }

    /// Instantiate a struct, union or typedef.
    fn generate_type_gen(
        &mut self,
        category: DeclCategory,
        name: &str,
        unresolved_generic_params: Option<&GenericParams>,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        let Some(unresolved_generic_params) = unresolved_generic_params else {
            return Ok(());
        };

        let decl = self
            .analysis()
            .search(ScopeId::BASE, category, name)
            .cloned()
            .ok_or_else(|| CompileError::MissingDeclaration {
                name: name.to_string(),
            })?;

        if decl.is_prototype() {
            return Err(CompileError::PrototypeInstantiation {
                name: name.to_string(),
            });
        }

        let resolved_generic_params = if unresolved_generic_params.has_generic() {
            substitute_generic_params(
                unresolved_generic_params,
                decl_generic_params,
                called_generic_params,
            )
        } else {
            unresolved_generic_params.clone()
        };
        let serialized_name = resolved_generic_params.serialize_name(name);

        if self
            .analysis()
            .search(ScopeId::BASE, category, &serialized_name)
            .is_some()
            || self.in_progress.contains(&serialized_name)
        {
            return Ok(());
        }
        self.in_progress.insert(serialized_name.clone());

        let gen_decl = match &decl {
            Decl::Struct(_) | Decl::Union(_) => {
                let fields =
                    self.visit_struct_or_union(&decl, Some(&resolved_generic_params))?;
                fields.map(|fields| {
                    let generated = StructGenDecl {
                        base: name.to_string(),
                        generic_params: resolved_generic_params.clone(),
                        name: serialized_name.clone(),
                        fields,
                    };
                    if matches!(decl, Decl::Struct(_)) {
                        Decl::StructGen(generated)
                    } else {
                        Decl::UnionGen(generated)
                    }
                })
            }
            Decl::Typedef(_) => self
                .visit_typedef(&decl, Some(&resolved_generic_params))?
                .map(|data_type| {
                    Decl::TypedefGen(TypedefGenDecl {
                        base: name.to_string(),
                        generic_params: resolved_generic_params.clone(),
                        name: serialized_name.clone(),
                        data_type,
                    })
                }),
            _ => None,
        };

        self.in_progress.remove(&serialized_name);

        if let Some(gen_decl) = gen_decl {
            self.add_decl_to_scope(gen_decl)?;
        }
        Ok(())
    }

    fn generate_struct_gen(
        &mut self,
        name: &str,
        unresolved: Option<&GenericParams>,
        called: Option<&GenericParams>,
        decl: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        self.generate_type_gen(DeclCategory::Struct, name, unresolved, called, decl)
    }

    fn generate_union_gen(
        &mut self,
        name: &str,
        unresolved: Option<&GenericParams>,
        called: Option<&GenericParams>,
        decl: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        self.generate_type_gen(DeclCategory::Union, name, unresolved, called, decl)
    }

    fn generate_typedef_gen(
        &mut self,
        name: &str,
        unresolved: Option<&GenericParams>,
        called: Option<&GenericParams>,
        decl: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        self.generate_type_gen(DeclCategory::Typedef, name, unresolved, called, decl)
    }

    /// Instantiate the named types appearing directly in an
    /// already-substituted data type.
    fn generate_from_data_type(
        &mut self,
        data_type: &DataType,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        match data_type {
            DataType::Struct {
                name: Some(name),
                generic_params,
            } => self.generate_struct_gen(
                &name.clone(),
                generic_params.clone().as_ref(),
                called_generic_params,
                decl_generic_params,
            ),
            DataType::Union {
                name: Some(name),
                generic_params,
            } => self.generate_union_gen(
                &name.clone(),
                generic_params.clone().as_ref(),
                called_generic_params,
                decl_generic_params,
            ),
            DataType::Typedef {
                name,
                generic_params,
            } => self.generate_typedef_gen(
                &name.clone(),
                generic_params.clone().as_ref(),
                called_generic_params,
                decl_generic_params,
            ),
            _ => Ok(()),
        }
    }

    fn substitute_and_generate_from_data_type(
        &mut self,
        data_type: &DataType,
        generic_params: Option<&GenericParams>,
        called_generic_params: Option<&GenericParams>,
    ) -> Result<DataType, CompileError> {
        let subs_data_type =
            substitute_data_type(data_type, generic_params, called_generic_params);
        self.generate_from_data_type(&subs_data_type, called_generic_params, generic_params)?;
        Ok(subs_data_type)
    }

    // ------------------------------------------------------------------
    // Struct / union / typedef cloning
    // ------------------------------------------------------------------

    /// Returns `None` when the declaration is not generic (or has no
    /// definition to clone).
    fn visit_struct_or_union(
        &mut self,
        decl: &Decl,
        called_generic_params: Option<&GenericParams>,
    ) -> Result<Option<Fields>, CompileError> {
        let (Decl::Struct(s) | Decl::Union(s)) = decl else {
            unreachable!("caller dispatched on struct or union");
        };

        if !decl.has_generic() {
            return Ok(None);
        }
        let Some(fields) = &s.fields else {
            return Ok(None);
        };

        let generic_params = s.generic_params.clone();
        self.visit_fields(fields, generic_params.as_ref(), called_generic_params)
            .map(Some)
    }

    /// Clone a field list with every member's data type substituted.
    /// Anonymous nested struct/union fields are cloned recursively, keeping
    /// their nesting structure.
    fn visit_fields(
        &mut self,
        fields: &Fields,
        generic_params: Option<&GenericParams>,
        called_generic_params: Option<&GenericParams>,
    ) -> Result<Fields, CompileError> {
        let mut gen_fields = Fields::default();
        for field in &fields.items {
            let kind = match &field.kind {
                FieldKind::Member { data_type, bit } => FieldKind::Member {
                    data_type: self.substitute_and_generate_from_data_type(
                        data_type,
                        generic_params,
                        called_generic_params,
                    )?,
                    bit: *bit,
                },
                FieldKind::Struct(children) => FieldKind::Struct(self.visit_fields(
                    children,
                    generic_params,
                    called_generic_params,
                )?),
                FieldKind::Union(children) => FieldKind::Union(self.visit_fields(
                    children,
                    generic_params,
                    called_generic_params,
                )?),
            };
            gen_fields.items.push(Field {
                name: field.name.clone(),
                kind,
            });
        }
        Ok(gen_fields)
    }

    fn visit_non_generic_struct_or_union(&mut self, decl: &Decl) -> Result<(), CompileError> {
        let (Decl::Struct(s) | Decl::Union(s)) = decl else {
            unreachable!("caller dispatched on struct or union");
        };
        let Some(fields) = s.fields.clone() else {
            return Ok(());
        };
        self.visit_non_generic_fields(&fields)
    }

    fn visit_non_generic_fields(&mut self, fields: &Fields) -> Result<(), CompileError> {
        for field in &fields.items {
            match &field.kind {
                FieldKind::Member { data_type, .. } => {
                    self.generate_from_data_type(data_type, None, None)?;
                }
                FieldKind::Struct(children) | FieldKind::Union(children) => {
                    self.visit_non_generic_fields(children)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the substituted aliased type, or `None` when the typedef is
    /// not generic.
    fn visit_typedef(
        &mut self,
        decl: &Decl,
        called_generic_params: Option<&GenericParams>,
    ) -> Result<Option<DataType>, CompileError> {
        let Decl::Typedef(t) = decl else {
            unreachable!("caller dispatched on typedef");
        };

        if !decl.has_generic() {
            return Ok(None);
        }

        let generic_params = t.generic_params.clone();
        let data_type = t.data_type.clone();
        self.substitute_and_generate_from_data_type(
            &data_type,
            generic_params.as_ref(),
            called_generic_params,
        )
        .map(Some)
    }

    // ------------------------------------------------------------------
    // Data types
    // ------------------------------------------------------------------

    fn visit_data_type(
        &mut self,
        data_type: &DataType,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        match data_type {
            DataType::Array { data_type, .. } => {
                self.visit_data_type(data_type, called_generic_params, decl_generic_params)
            }
            DataType::Function {
                return_data_type,
                params,
                function_data_type,
            } => {
                self.visit_data_type(return_data_type, called_generic_params, decl_generic_params)?;
                if let Some(params) = params {
                    for param in params {
                        if let Some(dt) = &param.data_type {
                            self.visit_data_type(dt, called_generic_params, decl_generic_params)?;
                        }
                    }
                }
                if let Some(function_data_type) = function_data_type {
                    self.visit_data_type(
                        function_data_type,
                        called_generic_params,
                        decl_generic_params,
                    )?;
                }
                Ok(())
            }
            DataType::Ptr(Some(inner)) => {
                self.visit_data_type(inner, called_generic_params, decl_generic_params)
            }
            DataType::Ptr(None) => Ok(()),
            DataType::Struct {
                name: Some(name),
                generic_params,
            } => self.generate_struct_gen(
                &name.clone(),
                generic_params.clone().as_ref(),
                called_generic_params,
                decl_generic_params,
            ),
            DataType::Union {
                name: Some(name),
                generic_params,
            } => self.generate_union_gen(
                &name.clone(),
                generic_params.clone().as_ref(),
                called_generic_params,
                decl_generic_params,
            ),
            DataType::Typedef {
                name,
                generic_params,
            } => self.generate_typedef_gen(
                &name.clone(),
                generic_params.clone().as_ref(),
                called_generic_params,
                decl_generic_params,
            ),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Functions, bodies, expressions, statements
    // ------------------------------------------------------------------

    fn visit_variable(
        &mut self,
        decl: &Decl,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        let Decl::Variable(variable) = decl else {
            unreachable!("caller dispatched on variable");
        };
        let data_type = variable.data_type.clone();
        self.visit_data_type(&data_type, called_generic_params, decl_generic_params)?;
        if let Some(expr) = variable.expr.clone() {
            self.visit_function_expr(&expr, called_generic_params, decl_generic_params)?;
        }
        Ok(())
    }

    fn visit_function_decl(
        &mut self,
        decl: &Decl,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        match decl {
            Decl::Variable(_) => {
                self.visit_variable(decl, called_generic_params, decl_generic_params)
            }
            // Struct and union declarations cannot appear in function
            // scope, so there is nothing else to visit here.
            _ => Ok(()),
        }
    }

    fn visit_function_expr(
        &mut self,
        expr: &Expr,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        match expr {
            Expr::Alignof(inner) | Expr::Sizeof(inner) | Expr::Grouping(inner)
            | Expr::Unary(inner) => {
                self.visit_function_expr(inner, called_generic_params, decl_generic_params)
            }
            Expr::ArrayAccess { array, access } => {
                self.visit_function_expr(array, called_generic_params, decl_generic_params)?;
                self.visit_function_expr(access, called_generic_params, decl_generic_params)
            }
            Expr::Binary { left, right } => {
                self.visit_function_expr(left, called_generic_params, decl_generic_params)?;
                self.visit_function_expr(right, called_generic_params, decl_generic_params)
            }
            Expr::Cast { data_type, expr } => {
                self.visit_function_expr(expr, called_generic_params, decl_generic_params)?;
                self.visit_data_type(data_type, called_generic_params, decl_generic_params)
            }
            Expr::DataType(data_type) => {
                self.visit_data_type(data_type, called_generic_params, decl_generic_params)
            }
            Expr::FunctionCall {
                identifier,
                generic_params,
                params,
            } => {
                if let Some(generic_params) = generic_params {
                    self.generate_function_gen(
                        &identifier.clone(),
                        &generic_params.clone(),
                        called_generic_params,
                        decl_generic_params,
                    )?;
                }
                for param in params {
                    self.visit_function_expr(param, called_generic_params, decl_generic_params)?;
                }
                Ok(())
            }
            Expr::FunctionCallBuiltin { params, .. } => {
                for param in params {
                    self.visit_function_expr(param, called_generic_params, decl_generic_params)?;
                }
                Ok(())
            }
            Expr::Initializer { items } => {
                for item in items {
                    self.visit_function_expr(item, called_generic_params, decl_generic_params)?;
                }
                Ok(())
            }
            Expr::Ternary { cond, if_, else_ } => {
                self.visit_function_expr(cond, called_generic_params, decl_generic_params)?;
                self.visit_function_expr(if_, called_generic_params, decl_generic_params)?;
                self.visit_function_expr(else_, called_generic_params, decl_generic_params)
            }
            Expr::Identifier(_) | Expr::Literal(_) | Expr::Nullptr => Ok(()),
        }
    }

    fn visit_function_stmt(
        &mut self,
        stmt: &Stmt,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block(body) => {
                self.visit_function_body(body, called_generic_params, decl_generic_params)
            }
            // Case labels can only carry constant expressions.
            Stmt::Break | Stmt::Case | Stmt::Continue | Stmt::Default | Stmt::Goto(_) => Ok(()),
            Stmt::DoWhile { cond, body } | Stmt::While { cond, body } => {
                self.visit_function_expr(cond, called_generic_params, decl_generic_params)?;
                self.visit_function_body(body, called_generic_params, decl_generic_params)
            }
            Stmt::For {
                init_clauses,
                cond,
                update_exprs,
                body,
            } => {
                if let Some(init_clauses) = init_clauses {
                    for item in init_clauses {
                        self.visit_function_item(item, called_generic_params, decl_generic_params)?;
                    }
                }
                if let Some(cond) = cond {
                    self.visit_function_expr(cond, called_generic_params, decl_generic_params)?;
                }
                if let Some(update_exprs) = update_exprs {
                    for expr in update_exprs {
                        self.visit_function_expr(expr, called_generic_params, decl_generic_params)?;
                    }
                }
                self.visit_function_body(body, called_generic_params, decl_generic_params)
            }
            Stmt::If {
                if_,
                else_ifs,
                else_,
            } => {
                self.visit_function_expr(&if_.cond, called_generic_params, decl_generic_params)?;
                self.visit_function_body(&if_.body, called_generic_params, decl_generic_params)?;
                for branch in else_ifs {
                    self.visit_function_expr(
                        &branch.cond,
                        called_generic_params,
                        decl_generic_params,
                    )?;
                    self.visit_function_body(
                        &branch.body,
                        called_generic_params,
                        decl_generic_params,
                    )?;
                }
                if let Some(else_) = else_ {
                    self.visit_function_body(else_, called_generic_params, decl_generic_params)?;
                }
                Ok(())
            }
            Stmt::Return(expr) => {
                if let Some(expr) = expr {
                    self.visit_function_expr(expr, called_generic_params, decl_generic_params)?;
                }
                Ok(())
            }
            Stmt::Switch { expr, body } => {
                self.visit_function_expr(expr, called_generic_params, decl_generic_params)?;
                self.visit_function_body(body, called_generic_params, decl_generic_params)
            }
        }
    }

    fn visit_function_item(
        &mut self,
        item: &Item,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        match item {
            Item::Decl(decl) => {
                self.visit_function_decl(decl, called_generic_params, decl_generic_params)
            }
            Item::Expr(expr) => {
                self.visit_function_expr(expr, called_generic_params, decl_generic_params)
            }
            Item::Stmt(stmt) => {
                self.visit_function_stmt(stmt, called_generic_params, decl_generic_params)
            }
        }
    }

    fn visit_function_body(
        &mut self,
        body: &Body,
        called_generic_params: Option<&GenericParams>,
        decl_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        for item in &body.items {
            self.visit_function_item(item, called_generic_params, decl_generic_params)?;
        }
        Ok(())
    }

    fn visit_function(
        &mut self,
        decl: &Decl,
        called_generic_params: Option<&GenericParams>,
    ) -> Result<(), CompileError> {
        let Decl::Function(function) = decl else {
            unreachable!("caller dispatched on function");
        };

        let decl_generic_params = function.generic_params.clone();

        self.visit_data_type(
            &function.return_data_type.clone(),
            called_generic_params,
            decl_generic_params.as_ref(),
        )?;

        if let Some(params) = function.params.clone() {
            for FunctionParam { data_type, .. } in &params {
                if let Some(data_type) = data_type {
                    self.visit_data_type(
                        data_type,
                        called_generic_params,
                        decl_generic_params.as_ref(),
                    )?;
                }
            }
        }

        if let Some(body) = function.body.clone() {
            self.visit_function_body(&body, called_generic_params, decl_generic_params.as_ref())?;
        }
        Ok(())
    }

    fn visit_non_generic_function(&mut self, decl: &Decl) -> Result<(), CompileError> {
        self.visit_function(decl, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FunctionDecl, Literal, StructDecl, TypedefDecl, VariableDecl};
    use crate::config::CompilerConfig;

    fn generic(name: &str) -> DataType {
        DataType::Generic(name.to_string())
    }

    fn generic_params(types: Vec<DataType>) -> GenericParams {
        GenericParams::new(types)
    }

    fn call(name: &str, generics: Option<GenericParams>) -> Expr {
        Expr::FunctionCall {
            identifier: name.to_string(),
            generic_params: generics,
            params: vec![],
        }
    }

    fn function(name: &str, generics: Option<GenericParams>, body: Body) -> Decl {
        Decl::Function(FunctionDecl {
            name: name.to_string(),
            generic_params: generics,
            return_data_type: DataType::Void,
            params: None,
            body: Some(body),
        })
    }

    fn setup() -> (Compilation, FileId) {
        let mut comp = Compilation::new(&CompilerConfig::new());
        let file = comp.add_source("main.mc", String::new()).unwrap();
        (comp, file)
    }

    fn add(comp: &mut Compilation, file: FileId, decl: Decl) {
        comp.file_mut(file)
            .analysis
            .add_decl(file, ScopeId::BASE, decl)
            .unwrap();
    }

    #[test]
    fn test_duplicate_call_sites_share_one_specialization() {
        let (mut comp, file) = setup();

        add(
            &mut comp,
            file,
            function("swap", Some(generic_params(vec![generic("T")])), Body::default()),
        );

        // Two distinct callers instantiate swap[int].
        let caller = |name: &str| {
            function(
                name,
                None,
                Body {
                    items: vec![Item::Expr(call(
                        "swap",
                        Some(generic_params(vec![DataType::Int])),
                    ))],
                },
            )
        };
        add(&mut comp, file, caller("a"));
        add(&mut comp, file, caller("b"));

        Monomorphizer::new(&mut comp).run().unwrap();

        let analysis = &comp.file(file).analysis;
        let specialized = analysis.search_function("swap__int").unwrap();
        assert!(matches!(specialized, Decl::FunctionGen(_)));

        // Exactly one specialization: base + 2 callers + 1 gen.
        assert_eq!(analysis.store.all_len(), 4);
    }

    #[test]
    fn test_transitive_instantiation() {
        let (mut comp, file) = setup();

        // f[T] calls g[T]; instantiating f[int] must instantiate g[int].
        add(
            &mut comp,
            file,
            function("g", Some(generic_params(vec![generic("T")])), Body::default()),
        );
        add(
            &mut comp,
            file,
            function(
                "f",
                Some(generic_params(vec![generic("T")])),
                Body {
                    items: vec![Item::Expr(call(
                        "g",
                        Some(generic_params(vec![generic("T")])),
                    ))],
                },
            ),
        );
        add(
            &mut comp,
            file,
            function(
                "main",
                None,
                Body {
                    items: vec![Item::Expr(call(
                        "f",
                        Some(generic_params(vec![DataType::Int])),
                    ))],
                },
            ),
        );

        Monomorphizer::new(&mut comp).run().unwrap();

        let analysis = &comp.file(file).analysis;
        assert!(analysis.search_function("f__int").is_some());
        assert!(analysis.search_function("g__int").is_some());
    }

    #[test]
    fn test_recursive_generic_terminates() {
        let (mut comp, file) = setup();

        // f[T] calls itself with the same binding.
        add(
            &mut comp,
            file,
            function(
                "f",
                Some(generic_params(vec![generic("T")])),
                Body {
                    items: vec![Item::Expr(call(
                        "f",
                        Some(generic_params(vec![generic("T")])),
                    ))],
                },
            ),
        );
        add(
            &mut comp,
            file,
            function(
                "main",
                None,
                Body {
                    items: vec![Item::Expr(call(
                        "f",
                        Some(generic_params(vec![DataType::Int])),
                    ))],
                },
            ),
        );

        Monomorphizer::new(&mut comp).run().unwrap();
        assert!(
            comp.file(file)
                .analysis
                .search_function("f__int")
                .is_some()
        );
    }

    #[test]
    fn test_struct_specialization_substitutes_fields() {
        let (mut comp, file) = setup();

        add(
            &mut comp,
            file,
            Decl::Struct(StructDecl {
                name: Some("pair".to_string()),
                generic_params: Some(generic_params(vec![generic("T")])),
                fields: Some(Fields {
                    items: vec![
                        Field {
                            name: Some("first".to_string()),
                            kind: FieldKind::Member {
                                data_type: generic("T"),
                                bit: None,
                            },
                        },
                        Field {
                            name: Some("second".to_string()),
                            kind: FieldKind::Member {
                                data_type: DataType::Ptr(Some(Box::new(generic("T")))),
                                bit: None,
                            },
                        },
                    ],
                }),
            }),
        );

        // A global variable of type struct pair[int].
        add(
            &mut comp,
            file,
            Decl::Variable(VariableDecl {
                name: "p".to_string(),
                data_type: DataType::Struct {
                    name: Some("pair".to_string()),
                    generic_params: Some(generic_params(vec![DataType::Int])),
                },
                expr: None,
                is_local: false,
            }),
        );

        Monomorphizer::new(&mut comp).run().unwrap();

        let analysis = &comp.file(file).analysis;
        let Some(Decl::StructGen(specialized)) = analysis.search_struct("pair__int") else {
            panic!("expected struct specialization");
        };
        let FieldKind::Member { data_type, .. } = &specialized.fields.items[0].kind else {
            panic!("expected member field");
        };
        assert_eq!(*data_type, DataType::Int);
        let FieldKind::Member { data_type, .. } = &specialized.fields.items[1].kind else {
            panic!("expected member field");
        };
        assert_eq!(*data_type, DataType::Ptr(Some(Box::new(DataType::Int))));
    }

    #[test]
    fn test_typedef_cascades_into_struct() {
        let (mut comp, file) = setup();

        add(
            &mut comp,
            file,
            Decl::Struct(StructDecl {
                name: Some("vec".to_string()),
                generic_params: Some(generic_params(vec![generic("T")])),
                fields: Some(Fields {
                    items: vec![Field {
                        name: Some("data".to_string()),
                        kind: FieldKind::Member {
                            data_type: DataType::Ptr(Some(Box::new(generic("T")))),
                            bit: None,
                        },
                    }],
                }),
            }),
        );
        add(
            &mut comp,
            file,
            Decl::Typedef(TypedefDecl {
                name: "ints".to_string(),
                generic_params: None,
                data_type: DataType::Struct {
                    name: Some("vec".to_string()),
                    generic_params: Some(generic_params(vec![DataType::Int])),
                },
            }),
        );

        Monomorphizer::new(&mut comp).run().unwrap();

        assert!(
            comp.file(file)
                .analysis
                .search_struct("vec__int")
                .is_some()
        );
    }

    #[test]
    fn test_prototype_instantiation_is_an_error() {
        let (mut comp, file) = setup();

        add(
            &mut comp,
            file,
            Decl::Function(FunctionDecl {
                name: "f".to_string(),
                generic_params: Some(generic_params(vec![generic("T")])),
                return_data_type: DataType::Void,
                params: None,
                body: None,
            }),
        );
        add(
            &mut comp,
            file,
            function(
                "main",
                None,
                Body {
                    items: vec![Item::Expr(call(
                        "f",
                        Some(generic_params(vec![DataType::Int])),
                    ))],
                },
            ),
        );

        let err = Monomorphizer::new(&mut comp).run().unwrap_err();
        assert!(matches!(err, CompileError::PrototypeInstantiation { .. }));
    }

    #[test]
    fn test_unknown_callee_is_an_error() {
        let (mut comp, file) = setup();
        add(
            &mut comp,
            file,
            function(
                "main",
                None,
                Body {
                    items: vec![Item::Expr(call(
                        "missing",
                        Some(generic_params(vec![DataType::Int])),
                    ))],
                },
            ),
        );

        let err = Monomorphizer::new(&mut comp).run().unwrap_err();
        assert!(matches!(err, CompileError::MissingDeclaration { .. }));
    }

    #[test]
    fn test_non_generic_calls_are_left_alone() {
        let (mut comp, file) = setup();
        add(&mut comp, file, function("helper", None, Body::default()));
        add(
            &mut comp,
            file,
            function(
                "main",
                None,
                Body {
                    items: vec![
                        Item::Expr(call("helper", None)),
                        Item::Expr(Expr::Literal(Literal::Int(3))),
                    ],
                },
            ),
        );

        Monomorphizer::new(&mut comp).run().unwrap();
        // base decls only, nothing generated
        assert_eq!(comp.file(file).analysis.store.all_len(), 2);
    }
}
