//! Abstract syntax tree for Mica declarations.
//!
//! The Mica parser (upstream of this crate's visitor) produces these nodes
//! after name resolution. The monomorphization visitor walks them to
//! discover every concrete instantiation of a generic function, struct,
//! union or typedef, and synthesizes the specialized `*Gen` declarations.

/// An ordered list of generic parameters.
///
/// On a declaration these are `DataType::Generic` placeholders; at a call or
/// use site they are the (possibly still generic) argument types.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParams {
    pub params: Vec<DataType>,
}

impl GenericParams {
    pub fn new(params: Vec<DataType>) -> Self {
        GenericParams { params }
    }

    /// True when at least one parameter still contains a generic
    /// placeholder.
    pub fn has_generic(&self) -> bool {
        self.params.iter().any(DataType::has_generic)
    }

    /// Position of the generic placeholder `name` in this parameter list.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .position(|p| matches!(p, DataType::Generic(n) if n == name))
    }

    /// The canonical serialized name of an instantiation of `base` with
    /// these parameters. Specializations are deduplicated by this name, so
    /// it must be collision-free: every constructor gets a distinct prefix
    /// and nested types serialize recursively.
    pub fn serialize_name(&self, base: &str) -> String {
        let mut name = base.to_string();
        for param in &self.params {
            name.push_str("__");
            name.push_str(&param.serialize());
        }
        name
    }
}

/// A parameter of a function declaration or function data type.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParam {
    pub name: Option<String>,
    pub data_type: Option<DataType>,
}

/// The data types of the Mica language.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Array {
        data_type: Box<DataType>,
        size: Option<usize>,
    },
    Function {
        return_data_type: Box<DataType>,
        params: Option<Vec<FunctionParam>>,
        function_data_type: Option<Box<DataType>>,
    },
    Ptr(Option<Box<DataType>>),
    Struct {
        name: Option<String>,
        generic_params: Option<GenericParams>,
    },
    Union {
        name: Option<String>,
        generic_params: Option<GenericParams>,
    },
    Typedef {
        name: String,
        generic_params: Option<GenericParams>,
    },
    /// An unsubstituted generic placeholder.
    Generic(String),
    Bool,
    Char,
    Double,
    Float,
    Int,
    Long,
    LongLong,
    Short,
    UChar,
    UInt,
    ULong,
    ULongLong,
    UShort,
    Void,
}

impl DataType {
    /// True when the type contains a generic placeholder anywhere.
    pub fn has_generic(&self) -> bool {
        match self {
            DataType::Generic(_) => true,
            DataType::Array { data_type, .. } => data_type.has_generic(),
            DataType::Ptr(inner) => inner.as_ref().is_some_and(|dt| dt.has_generic()),
            DataType::Function {
                return_data_type,
                params,
                function_data_type,
            } => {
                return_data_type.has_generic()
                    || params.as_ref().is_some_and(|ps| {
                        ps.iter()
                            .any(|p| p.data_type.as_ref().is_some_and(DataType::has_generic))
                    })
                    || function_data_type
                        .as_ref()
                        .is_some_and(|dt| dt.has_generic())
            }
            DataType::Struct { generic_params, .. }
            | DataType::Union { generic_params, .. }
            | DataType::Typedef { generic_params, .. } => generic_params
                .as_ref()
                .is_some_and(GenericParams::has_generic),
            _ => false,
        }
    }

    /// Canonical serialized form, used as a component of mangled
    /// specialization names.
    pub fn serialize(&self) -> String {
        match self {
            DataType::Array { data_type, size } => match size {
                Some(n) => format!("arr{}_{}", n, data_type.serialize()),
                None => format!("arr_{}", data_type.serialize()),
            },
            DataType::Function {
                return_data_type,
                params,
                ..
            } => {
                let mut s = format!("fn_{}", return_data_type.serialize());
                if let Some(params) = params {
                    for param in params {
                        s.push('_');
                        match &param.data_type {
                            Some(dt) => s.push_str(&dt.serialize()),
                            None => s.push_str("unknown"),
                        }
                    }
                }
                s
            }
            DataType::Ptr(inner) => match inner {
                Some(dt) => format!("ptr_{}", dt.serialize()),
                None => "ptr".to_string(),
            },
            DataType::Struct {
                name,
                generic_params,
            } => serialize_named("s", name.as_deref(), generic_params.as_ref()),
            DataType::Union {
                name,
                generic_params,
            } => serialize_named("u", name.as_deref(), generic_params.as_ref()),
            DataType::Typedef {
                name,
                generic_params,
            } => serialize_named("t", Some(name), generic_params.as_ref()),
            DataType::Generic(name) => format!("g_{}", name),
            DataType::Bool => "bool".to_string(),
            DataType::Char => "char".to_string(),
            DataType::Double => "double".to_string(),
            DataType::Float => "float".to_string(),
            DataType::Int => "int".to_string(),
            DataType::Long => "long".to_string(),
            DataType::LongLong => "longlong".to_string(),
            DataType::Short => "short".to_string(),
            DataType::UChar => "uchar".to_string(),
            DataType::UInt => "uint".to_string(),
            DataType::ULong => "ulong".to_string(),
            DataType::ULongLong => "ulonglong".to_string(),
            DataType::UShort => "ushort".to_string(),
            DataType::Void => "void".to_string(),
        }
    }
}

fn serialize_named(
    prefix: &str,
    name: Option<&str>,
    generic_params: Option<&GenericParams>,
) -> String {
    let base = match name {
        Some(name) => format!("{}_{}", prefix, name),
        None => format!("{}_anon", prefix),
    };
    match generic_params {
        Some(gp) => gp.serialize_name(&base),
        None => base,
    }
}

/// Substitute generic placeholders in `data_type`.
///
/// A placeholder is replaced by looking up its position in
/// `decl_generic_params` (the declaration's own parameter list) and taking
/// the type at the same position in `called_generic_params`. Placeholders
/// with no binding are left in place.
pub fn substitute_data_type(
    data_type: &DataType,
    decl_generic_params: Option<&GenericParams>,
    called_generic_params: Option<&GenericParams>,
) -> DataType {
    match data_type {
        DataType::Generic(name) => {
            if let (Some(decl), Some(called)) = (decl_generic_params, called_generic_params)
                && let Some(index) = decl.index_of(name)
                && let Some(concrete) = called.params.get(index)
            {
                return concrete.clone();
            }
            data_type.clone()
        }
        DataType::Array { data_type, size } => DataType::Array {
            data_type: Box::new(substitute_data_type(
                data_type,
                decl_generic_params,
                called_generic_params,
            )),
            size: *size,
        },
        DataType::Ptr(inner) => DataType::Ptr(inner.as_ref().map(|dt| {
            Box::new(substitute_data_type(
                dt,
                decl_generic_params,
                called_generic_params,
            ))
        })),
        DataType::Function {
            return_data_type,
            params,
            function_data_type,
        } => DataType::Function {
            return_data_type: Box::new(substitute_data_type(
                return_data_type,
                decl_generic_params,
                called_generic_params,
            )),
            params: params.as_ref().map(|ps| {
                ps.iter()
                    .map(|p| FunctionParam {
                        name: p.name.clone(),
                        data_type: p.data_type.as_ref().map(|dt| {
                            substitute_data_type(dt, decl_generic_params, called_generic_params)
                        }),
                    })
                    .collect()
            }),
            function_data_type: function_data_type.as_ref().map(|dt| {
                Box::new(substitute_data_type(
                    dt,
                    decl_generic_params,
                    called_generic_params,
                ))
            }),
        },
        DataType::Struct {
            name,
            generic_params,
        } => DataType::Struct {
            name: name.clone(),
            generic_params: substitute_generic_params_opt(
                generic_params.as_ref(),
                decl_generic_params,
                called_generic_params,
            ),
        },
        DataType::Union {
            name,
            generic_params,
        } => DataType::Union {
            name: name.clone(),
            generic_params: substitute_generic_params_opt(
                generic_params.as_ref(),
                decl_generic_params,
                called_generic_params,
            ),
        },
        DataType::Typedef {
            name,
            generic_params,
        } => DataType::Typedef {
            name: name.clone(),
            generic_params: substitute_generic_params_opt(
                generic_params.as_ref(),
                decl_generic_params,
                called_generic_params,
            ),
        },
        other => other.clone(),
    }
}

fn substitute_generic_params_opt(
    generic_params: Option<&GenericParams>,
    decl_generic_params: Option<&GenericParams>,
    called_generic_params: Option<&GenericParams>,
) -> Option<GenericParams> {
    generic_params
        .map(|gp| substitute_generic_params(gp, decl_generic_params, called_generic_params))
}

/// Substitute every parameter of `unresolved` against the caller's binding.
pub fn substitute_generic_params(
    unresolved: &GenericParams,
    decl_generic_params: Option<&GenericParams>,
    called_generic_params: Option<&GenericParams>,
) -> GenericParams {
    GenericParams::new(
        unresolved
            .params
            .iter()
            .map(|dt| substitute_data_type(dt, decl_generic_params, called_generic_params))
            .collect(),
    )
}

// ============================================================================
//                              DECLARATIONS
// ============================================================================

/// Fields of a struct or union. Anonymous nested struct/union members own
/// their children directly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields {
    pub items: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Option<String>,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Member {
        data_type: DataType,
        bit: Option<u8>,
    },
    Struct(Fields),
    Union(Fields),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub generic_params: Option<GenericParams>,
    pub return_data_type: DataType,
    pub params: Option<Vec<FunctionParam>>,
    /// `None` for a prototype.
    pub body: Option<Body>,
}

/// A monomorphized copy of a generic function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionGenDecl {
    pub base: String,
    pub generic_params: GenericParams,
    pub name: String,
    pub return_data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: Option<String>,
    pub generic_params: Option<GenericParams>,
    /// `None` for a forward declaration.
    pub fields: Option<Fields>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructGenDecl {
    pub base: String,
    pub generic_params: GenericParams,
    pub name: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDecl {
    pub name: String,
    pub generic_params: Option<GenericParams>,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefGenDecl {
    pub base: String,
    pub generic_params: GenericParams,
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub data_type: DataType,
    pub expr: Option<Expr>,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariantDecl {
    pub name: String,
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: Option<String>,
    pub variants: Option<Vec<EnumVariantDecl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelDecl {
    pub name: String,
}

/// A global or local declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Enum(EnumDecl),
    EnumVariant(EnumVariantDecl),
    Function(FunctionDecl),
    FunctionGen(FunctionGenDecl),
    Label(LabelDecl),
    Struct(StructDecl),
    StructGen(StructGenDecl),
    Typedef(TypedefDecl),
    TypedefGen(TypedefGenDecl),
    Union(StructDecl),
    UnionGen(StructGenDecl),
    Variable(VariableDecl),
}

impl Decl {
    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Enum(d) => d.name.as_deref(),
            Decl::EnumVariant(d) => Some(&d.name),
            Decl::Function(d) => Some(&d.name),
            Decl::FunctionGen(d) => Some(&d.name),
            Decl::Label(d) => Some(&d.name),
            Decl::Struct(d) | Decl::Union(d) => d.name.as_deref(),
            Decl::StructGen(d) | Decl::UnionGen(d) => Some(&d.name),
            Decl::Typedef(d) => Some(&d.name),
            Decl::TypedefGen(d) => Some(&d.name),
            Decl::Variable(d) => Some(&d.name),
        }
    }

    /// True for a declaration without its definition.
    pub fn is_prototype(&self) -> bool {
        match self {
            Decl::Function(d) => d.body.is_none(),
            Decl::Struct(d) | Decl::Union(d) => d.fields.is_none(),
            Decl::Enum(d) => d.variants.is_none(),
            _ => false,
        }
    }

    /// True when the declaration itself is generic (and therefore not a
    /// monomorphization leaf).
    pub fn has_generic(&self) -> bool {
        match self {
            Decl::Function(d) => d.generic_params.is_some(),
            Decl::Struct(d) | Decl::Union(d) => d.generic_params.is_some(),
            Decl::Typedef(d) => d.generic_params.is_some(),
            _ => false,
        }
    }

    pub fn is_local(&self) -> bool {
        match self {
            Decl::Variable(d) => d.is_local,
            Decl::Label(_) => true,
            _ => false,
        }
    }

    pub fn generic_params(&self) -> Option<&GenericParams> {
        match self {
            Decl::Function(d) => d.generic_params.as_ref(),
            Decl::Struct(d) | Decl::Union(d) => d.generic_params.as_ref(),
            Decl::Typedef(d) => d.generic_params.as_ref(),
            Decl::FunctionGen(d) => Some(&d.generic_params),
            Decl::StructGen(d) | Decl::UnionGen(d) => Some(&d.generic_params),
            Decl::TypedefGen(d) => Some(&d.generic_params),
            _ => None,
        }
    }

    /// True for the synthesized specialization forms.
    pub fn is_gen(&self) -> bool {
        matches!(
            self,
            Decl::FunctionGen(_) | Decl::StructGen(_) | Decl::UnionGen(_) | Decl::TypedefGen(_)
        )
    }
}

// ============================================================================
//                         EXPRESSIONS & STATEMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Char(char),
    Float(f64),
    Int(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Alignof(Box<Expr>),
    ArrayAccess {
        array: Box<Expr>,
        access: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cast {
        data_type: DataType,
        expr: Box<Expr>,
    },
    DataType(DataType),
    FunctionCall {
        identifier: String,
        generic_params: Option<GenericParams>,
        params: Vec<Expr>,
    },
    FunctionCallBuiltin {
        identifier: String,
        params: Vec<Expr>,
    },
    Grouping(Box<Expr>),
    Identifier(String),
    Initializer {
        items: Vec<Expr>,
    },
    Literal(Literal),
    Nullptr,
    Sizeof(Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        if_: Box<Expr>,
        else_: Box<Expr>,
    },
    Unary(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub cond: Expr,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Body),
    Break,
    Case,
    Continue,
    Default,
    DoWhile {
        cond: Expr,
        body: Body,
    },
    For {
        init_clauses: Option<Vec<Item>>,
        cond: Option<Expr>,
        update_exprs: Option<Vec<Expr>>,
        body: Body,
    },
    Goto(String),
    If {
        if_: IfBranch,
        else_ifs: Vec<IfBranch>,
        else_: Option<Body>,
    },
    Return(Option<Expr>),
    Switch {
        expr: Expr,
        body: Body,
    },
    While {
        cond: Expr,
        body: Body,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Decl(Decl),
    Expr(Expr),
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_name_is_deterministic() {
        let params = GenericParams::new(vec![
            DataType::Int,
            DataType::Ptr(Some(Box::new(DataType::Char))),
        ]);
        assert_eq!(params.serialize_name("vec"), "vec__int__ptr_char");
    }

    #[test]
    fn test_serialize_distinguishes_nesting() {
        // [ptr(int)] and [ptr, int] must not collide.
        let nested = GenericParams::new(vec![DataType::Ptr(Some(Box::new(DataType::Int)))]);
        let flat = GenericParams::new(vec![DataType::Ptr(None), DataType::Int]);
        assert_ne!(nested.serialize_name("f"), flat.serialize_name("f"));
    }

    #[test]
    fn test_substitute_binds_by_position() {
        let decl = GenericParams::new(vec![
            DataType::Generic("T".to_string()),
            DataType::Generic("U".to_string()),
        ]);
        let called = GenericParams::new(vec![DataType::Int, DataType::Double]);

        let dt = DataType::Ptr(Some(Box::new(DataType::Generic("U".to_string()))));
        let substituted = substitute_data_type(&dt, Some(&decl), Some(&called));
        assert_eq!(substituted, DataType::Ptr(Some(Box::new(DataType::Double))));
    }

    #[test]
    fn test_substitute_leaves_unbound_placeholders() {
        let dt = DataType::Generic("T".to_string());
        let substituted = substitute_data_type(&dt, None, None);
        assert_eq!(substituted, dt);
    }

    #[test]
    fn test_substitute_recurses_into_named_types() {
        let decl = GenericParams::new(vec![DataType::Generic("T".to_string())]);
        let called = GenericParams::new(vec![DataType::Int]);

        let dt = DataType::Struct {
            name: Some("pair".to_string()),
            generic_params: Some(GenericParams::new(vec![DataType::Generic("T".to_string())])),
        };
        let substituted = substitute_data_type(&dt, Some(&decl), Some(&called));
        assert_eq!(
            substituted,
            DataType::Struct {
                name: Some("pair".to_string()),
                generic_params: Some(GenericParams::new(vec![DataType::Int])),
            }
        );
        assert!(!substituted.has_generic());
    }

    #[test]
    fn test_prototype_detection() {
        let proto = Decl::Function(FunctionDecl {
            name: "f".to_string(),
            generic_params: None,
            return_data_type: DataType::Void,
            params: None,
            body: None,
        });
        assert!(proto.is_prototype());

        let def = Decl::Function(FunctionDecl {
            name: "f".to_string(),
            generic_params: None,
            return_data_type: DataType::Void,
            params: None,
            body: Some(Body::default()),
        });
        assert!(!def.is_prototype());
    }

    #[test]
    fn test_has_generic_through_function_type() {
        let dt = DataType::Function {
            return_data_type: Box::new(DataType::Void),
            params: Some(vec![FunctionParam {
                name: None,
                data_type: Some(DataType::Generic("T".to_string())),
            }]),
            function_data_type: None,
        };
        assert!(dt.has_generic());
    }
}
