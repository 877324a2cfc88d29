//! Token model for the C front-end.
//!
//! The scanner produces these tokens and the resolver consumes and produces
//! them. Preprocessor directives are single tokens carrying their nested
//! token sequences (a `#if` group owns the streams of all of its branches),
//! so the resolver can treat a whole conditional as one opaque unit when it
//! skips a dead branch.
//!
//! Tokens live in a `TokenArena` and are referenced by `TokenId` handles;
//! see the `stream` module.

use crate::location::Location;
use crate::stream::TokenStream;

/// C keywords, including the C23 spellings and the legacy `_Xxx` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Alignas,
    Alignof,
    Asm,
    Auto,
    Bool,
    Break,
    Case,
    Char,
    Const,
    Constexpr,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extern,
    False,
    Float,
    For,
    Goto,
    If,
    Inline,
    Int,
    Long,
    Nullptr,
    Register,
    Restrict,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    StaticAssert,
    Struct,
    Switch,
    ThreadLocal,
    True,
    Typedef,
    Typeof,
    TypeofUnqual,
    Union,
    Unsigned,
    Void,
    Volatile,
    While,
    UnderscoreAlignas,
    UnderscoreAlignof,
    UnderscoreAtomic,
    UnderscoreBitInt,
    UnderscoreBool,
    UnderscoreComplex,
    UnderscoreDecimal128,
    UnderscoreDecimal32,
    UnderscoreDecimal64,
    UnderscoreGeneric,
    UnderscoreImaginary,
    UnderscoreNoreturn,
    UnderscoreStaticAssert,
    UnderscoreThreadLocal,
}

impl Keyword {
    /// Classify an identifier as a keyword, if it is one.
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        let kw = match ident {
            "alignas" => Keyword::Alignas,
            "alignof" => Keyword::Alignof,
            "asm" => Keyword::Asm,
            "auto" => Keyword::Auto,
            "bool" => Keyword::Bool,
            "break" => Keyword::Break,
            "case" => Keyword::Case,
            "char" => Keyword::Char,
            "const" => Keyword::Const,
            "constexpr" => Keyword::Constexpr,
            "continue" => Keyword::Continue,
            "default" => Keyword::Default,
            "do" => Keyword::Do,
            "double" => Keyword::Double,
            "else" => Keyword::Else,
            "enum" => Keyword::Enum,
            "extern" => Keyword::Extern,
            "false" => Keyword::False,
            "float" => Keyword::Float,
            "for" => Keyword::For,
            "goto" => Keyword::Goto,
            "if" => Keyword::If,
            "inline" => Keyword::Inline,
            "int" => Keyword::Int,
            "long" => Keyword::Long,
            "nullptr" => Keyword::Nullptr,
            "register" => Keyword::Register,
            "restrict" => Keyword::Restrict,
            "return" => Keyword::Return,
            "short" => Keyword::Short,
            "signed" => Keyword::Signed,
            "sizeof" => Keyword::Sizeof,
            "static" => Keyword::Static,
            "static_assert" => Keyword::StaticAssert,
            "struct" => Keyword::Struct,
            "switch" => Keyword::Switch,
            "thread_local" => Keyword::ThreadLocal,
            "true" => Keyword::True,
            "typedef" => Keyword::Typedef,
            "typeof" => Keyword::Typeof,
            "typeof_unqual" => Keyword::TypeofUnqual,
            "union" => Keyword::Union,
            "unsigned" => Keyword::Unsigned,
            "void" => Keyword::Void,
            "volatile" => Keyword::Volatile,
            "while" => Keyword::While,
            "_Alignas" => Keyword::UnderscoreAlignas,
            "_Alignof" => Keyword::UnderscoreAlignof,
            "_Atomic" => Keyword::UnderscoreAtomic,
            "_BitInt" => Keyword::UnderscoreBitInt,
            "_Bool" => Keyword::UnderscoreBool,
            "_Complex" => Keyword::UnderscoreComplex,
            "_Decimal128" => Keyword::UnderscoreDecimal128,
            "_Decimal32" => Keyword::UnderscoreDecimal32,
            "_Decimal64" => Keyword::UnderscoreDecimal64,
            "_Generic" => Keyword::UnderscoreGeneric,
            "_Imaginary" => Keyword::UnderscoreImaginary,
            "_Noreturn" => Keyword::UnderscoreNoreturn,
            "_Static_assert" => Keyword::UnderscoreStaticAssert,
            "_Thread_local" => Keyword::UnderscoreThreadLocal,
            _ => return None,
        };

        Some(kw)
    }

    /// The source spelling of this keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Alignas => "alignas",
            Keyword::Alignof => "alignof",
            Keyword::Asm => "asm",
            Keyword::Auto => "auto",
            Keyword::Bool => "bool",
            Keyword::Break => "break",
            Keyword::Case => "case",
            Keyword::Char => "char",
            Keyword::Const => "const",
            Keyword::Constexpr => "constexpr",
            Keyword::Continue => "continue",
            Keyword::Default => "default",
            Keyword::Do => "do",
            Keyword::Double => "double",
            Keyword::Else => "else",
            Keyword::Enum => "enum",
            Keyword::Extern => "extern",
            Keyword::False => "false",
            Keyword::Float => "float",
            Keyword::For => "for",
            Keyword::Goto => "goto",
            Keyword::If => "if",
            Keyword::Inline => "inline",
            Keyword::Int => "int",
            Keyword::Long => "long",
            Keyword::Nullptr => "nullptr",
            Keyword::Register => "register",
            Keyword::Restrict => "restrict",
            Keyword::Return => "return",
            Keyword::Short => "short",
            Keyword::Signed => "signed",
            Keyword::Sizeof => "sizeof",
            Keyword::Static => "static",
            Keyword::StaticAssert => "static_assert",
            Keyword::Struct => "struct",
            Keyword::Switch => "switch",
            Keyword::ThreadLocal => "thread_local",
            Keyword::True => "true",
            Keyword::Typedef => "typedef",
            Keyword::Typeof => "typeof",
            Keyword::TypeofUnqual => "typeof_unqual",
            Keyword::Union => "union",
            Keyword::Unsigned => "unsigned",
            Keyword::Void => "void",
            Keyword::Volatile => "volatile",
            Keyword::While => "while",
            Keyword::UnderscoreAlignas => "_Alignas",
            Keyword::UnderscoreAlignof => "_Alignof",
            Keyword::UnderscoreAtomic => "_Atomic",
            Keyword::UnderscoreBitInt => "_BitInt",
            Keyword::UnderscoreBool => "_Bool",
            Keyword::UnderscoreComplex => "_Complex",
            Keyword::UnderscoreDecimal128 => "_Decimal128",
            Keyword::UnderscoreDecimal32 => "_Decimal32",
            Keyword::UnderscoreDecimal64 => "_Decimal64",
            Keyword::UnderscoreGeneric => "_Generic",
            Keyword::UnderscoreImaginary => "_Imaginary",
            Keyword::UnderscoreNoreturn => "_Noreturn",
            Keyword::UnderscoreStaticAssert => "_Static_assert",
            Keyword::UnderscoreThreadLocal => "_Thread_local",
        }
    }
}

/// Suffix of an integer literal. The suffix is split off by the scanner, so
/// the literal's value string never contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntSuffix {
    #[default]
    None,
    L,
    Ll,
    U,
    Ul,
    Ull,
}

impl IntSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntSuffix::None => "",
            IntSuffix::L => "L",
            IntSuffix::Ll => "LL",
            IntSuffix::U => "U",
            IntSuffix::Ul => "UL",
            IntSuffix::Ull => "ULL",
        }
    }
}

/// Suffix of a floating literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatSuffix {
    #[default]
    None,
    F,
    L,
}

impl FloatSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            FloatSuffix::None => "",
            FloatSuffix::F => "F",
            FloatSuffix::L => "L",
        }
    }
}

/// Payload of an integer literal. Decimal, octal, hexadecimal and binary
/// literals share this layout; the value string excludes the base prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralInt {
    pub value: String,
    pub suffix: IntSuffix,
}

impl LiteralInt {
    pub fn new(value: impl Into<String>, suffix: IntSuffix) -> Self {
        LiteralInt {
            value: value.into(),
            suffix,
        }
    }
}

/// Payload of a floating literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralFloat {
    pub value: String,
    pub suffix: FloatSuffix,
}

/// One parameter of a function-like macro.
///
/// `is_used` is set while the scanner reads the define's body: a parameter
/// whose index never appears does not need its argument resolved at call
/// sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineParam {
    pub name: Option<String>,
    pub is_variadic: bool,
    pub is_used: bool,
}

impl DefineParam {
    pub fn named(name: impl Into<String>) -> Self {
        DefineParam {
            name: Some(name.into()),
            is_variadic: false,
            is_used: false,
        }
    }

    pub fn variadic() -> Self {
        DefineParam {
            name: None,
            is_variadic: true,
            is_used: false,
        }
    }
}

/// Payload of a `#define` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorDefine {
    pub name: String,
    /// `None` for an object-like macro; `Some` (possibly empty) for a
    /// function-like macro.
    pub params: Option<Vec<DefineParam>>,
    pub body: TokenStream,
    pub is_variadic: bool,
}

impl PreprocessorDefine {
    /// Index of the first variadic parameter, if the macro has one.
    pub fn variadic_param_index(&self) -> Option<usize> {
        self.params
            .as_ref()
            .and_then(|params| params.iter().position(|p| p.is_variadic))
    }

    pub fn param_count(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.len())
    }
}

/// Payload of `#if` and `#elif`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorIf {
    pub cond: TokenStream,
    pub content: TokenStream,
}

/// Payload of `#ifdef`, `#ifndef`, `#elifdef` and `#elifndef`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorIfdef {
    pub identifier: String,
    pub content: TokenStream,
}

/// Payload of `#else`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorElse {
    pub content: TokenStream,
}

/// Payload of `#include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorInclude {
    pub path: String,
}

/// Payload of `#line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorLine {
    pub line: String,
}

/// What kind of sub-stream an end-of-token sentinel terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EotContext {
    /// The body of a `#define`.
    Define,
    /// The operand region of a stringification.
    Stringification,
    /// Any other nested stream (conditional branch bodies, conditions).
    Other,
}

/// The predefined macros of the standard plus the `__has_feature` builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedMacro {
    Date,
    File,
    HasFeature,
    Line,
    Stdc,
    StdcHosted,
    StdcVersion,
    Time,
}

impl PredefinedMacro {
    pub fn from_ident(ident: &str) -> Option<PredefinedMacro> {
        let macro_ = match ident {
            "__DATE__" => PredefinedMacro::Date,
            "__FILE__" => PredefinedMacro::File,
            "__has_feature" => PredefinedMacro::HasFeature,
            "__LINE__" => PredefinedMacro::Line,
            "__STDC__" => PredefinedMacro::Stdc,
            "__STDC_HOSTED__" => PredefinedMacro::StdcHosted,
            "__STDC_VERSION__" => PredefinedMacro::StdcVersion,
            "__TIME__" => PredefinedMacro::Time,
            _ => return None,
        };

        Some(macro_)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PredefinedMacro::Date => "__DATE__",
            PredefinedMacro::File => "__FILE__",
            PredefinedMacro::HasFeature => "__has_feature",
            PredefinedMacro::Line => "__LINE__",
            PredefinedMacro::Stdc => "__STDC__",
            PredefinedMacro::StdcHosted => "__STDC_HOSTED__",
            PredefinedMacro::StdcVersion => "__STDC_VERSION__",
            PredefinedMacro::Time => "__TIME__",
        }
    }
}

/// Check whether an identifier names a standard predefined macro, for
/// `defined(...)` probes.
pub fn is_standard_predefined_macro(name: &str) -> bool {
    PredefinedMacro::from_ident(name).is_some()
}

/// The tagged variant of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Punctuation and operators.
    Amp,
    AmpAmp,
    AmpEq,
    Arrow,
    Bang,
    BangEq,
    Caret,
    CaretEq,
    Colon,
    Comma,
    Dot,
    Ellipsis,
    Eq,
    EqEq,
    Gt,
    GtEq,
    GtGt,
    GtGtEq,
    Hash,
    HashHash,
    LBrace,
    LBracket,
    LParen,
    Lt,
    LtEq,
    LtLt,
    LtLtEq,
    Minus,
    MinusEq,
    MinusMinus,
    Percent,
    PercentEq,
    Pipe,
    PipeEq,
    PipePipe,
    Plus,
    PlusEq,
    PlusPlus,
    Question,
    RBrace,
    RBracket,
    RParen,
    Semicolon,
    Slash,
    SlashEq,
    Star,
    StarEq,
    Tilde,

    Keyword(Keyword),
    Identifier(String),

    LiteralInt(LiteralInt),
    LiteralOctal(LiteralInt),
    LiteralHex(LiteralInt),
    LiteralBin(LiteralInt),
    LiteralFloat(LiteralFloat),
    LiteralChar(char),
    LiteralString(String),

    PreprocessorDefine(PreprocessorDefine),
    PreprocessorIf(PreprocessorIf),
    PreprocessorElif(PreprocessorIf),
    PreprocessorIfdef(PreprocessorIfdef),
    PreprocessorIfndef(PreprocessorIfdef),
    PreprocessorElifdef(PreprocessorIfdef),
    PreprocessorElifndef(PreprocessorIfdef),
    PreprocessorElse(PreprocessorElse),
    PreprocessorInclude(PreprocessorInclude),
    PreprocessorEmbed(String),
    PreprocessorLine(PreprocessorLine),
    PreprocessorPragma(String),
    PreprocessorError(String),
    PreprocessorWarning(String),
    PreprocessorUndef(String),

    /// The operand of `defined(...)` inside a `#if`/`#elif` condition.
    MacroDefined(String),
    /// Reference to a macro parameter by index into the owning define's
    /// parameter list.
    MacroParam { index: usize },
    /// The `__VA_ARGS__` sentinel.
    MacroParamVariadic,

    Predefined(PredefinedMacro),

    /// Terminator of a nested preprocessor sub-stream.
    Eot(EotContext),
    /// Terminator of the top-level stream of a file.
    Eof,
}

impl TokenKind {
    /// True for the directives that participate in conditional groups.
    pub fn is_conditional_preprocessor(&self) -> bool {
        matches!(
            self,
            TokenKind::PreprocessorIf(_)
                | TokenKind::PreprocessorIfdef(_)
                | TokenKind::PreprocessorIfndef(_)
                | TokenKind::PreprocessorElif(_)
                | TokenKind::PreprocessorElifdef(_)
                | TokenKind::PreprocessorElifndef(_)
                | TokenKind::PreprocessorElse(_)
        )
    }

    /// True for the conditional directives that open a new group.
    pub fn opens_conditional_group(&self) -> bool {
        matches!(
            self,
            TokenKind::PreprocessorIf(_)
                | TokenKind::PreprocessorIfdef(_)
                | TokenKind::PreprocessorIfndef(_)
        )
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, location: Location) -> Self {
        Token { kind, location }
    }

    /// The printable form of a token, as used by stringification and by the
    /// CLI when rendering a resolved stream.
    ///
    /// Integer literals include their suffix, identifiers produce their
    /// name, character literals the raw character, string literals their
    /// surrounding quotes. Preprocessor-only tokens have no printable form.
    pub fn printable(&self) -> Option<String> {
        let s = match &self.kind {
            TokenKind::Amp => "&".to_string(),
            TokenKind::AmpAmp => "&&".to_string(),
            TokenKind::AmpEq => "&=".to_string(),
            TokenKind::Arrow => "->".to_string(),
            TokenKind::Bang => "!".to_string(),
            TokenKind::BangEq => "!=".to_string(),
            TokenKind::Caret => "^".to_string(),
            TokenKind::CaretEq => "^=".to_string(),
            TokenKind::Colon => ":".to_string(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::Dot => ".".to_string(),
            TokenKind::Ellipsis => "...".to_string(),
            TokenKind::Eq => "=".to_string(),
            TokenKind::EqEq => "==".to_string(),
            TokenKind::Gt => ">".to_string(),
            TokenKind::GtEq => ">=".to_string(),
            TokenKind::GtGt => ">>".to_string(),
            TokenKind::GtGtEq => ">>=".to_string(),
            TokenKind::Hash => "#".to_string(),
            TokenKind::HashHash => "##".to_string(),
            TokenKind::LBrace => "{".to_string(),
            TokenKind::LBracket => "[".to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::Lt => "<".to_string(),
            TokenKind::LtEq => "<=".to_string(),
            TokenKind::LtLt => "<<".to_string(),
            TokenKind::LtLtEq => "<<=".to_string(),
            TokenKind::Minus => "-".to_string(),
            TokenKind::MinusEq => "-=".to_string(),
            TokenKind::MinusMinus => "--".to_string(),
            TokenKind::Percent => "%".to_string(),
            TokenKind::PercentEq => "%=".to_string(),
            TokenKind::Pipe => "|".to_string(),
            TokenKind::PipeEq => "|=".to_string(),
            TokenKind::PipePipe => "||".to_string(),
            TokenKind::Plus => "+".to_string(),
            TokenKind::PlusEq => "+=".to_string(),
            TokenKind::PlusPlus => "++".to_string(),
            TokenKind::Question => "?".to_string(),
            TokenKind::RBrace => "}".to_string(),
            TokenKind::RBracket => "]".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::Semicolon => ";".to_string(),
            TokenKind::Slash => "/".to_string(),
            TokenKind::SlashEq => "/=".to_string(),
            TokenKind::Star => "*".to_string(),
            TokenKind::StarEq => "*=".to_string(),
            TokenKind::Tilde => "~".to_string(),
            TokenKind::Keyword(kw) => kw.as_str().to_string(),
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::LiteralInt(lit) => format!("{}{}", lit.value, lit.suffix.as_str()),
            TokenKind::LiteralOctal(lit) => format!("0{}{}", lit.value, lit.suffix.as_str()),
            TokenKind::LiteralHex(lit) => format!("0x{}{}", lit.value, lit.suffix.as_str()),
            TokenKind::LiteralBin(lit) => format!("0b{}{}", lit.value, lit.suffix.as_str()),
            TokenKind::LiteralFloat(lit) => format!("{}{}", lit.value, lit.suffix.as_str()),
            TokenKind::LiteralChar(c) => c.to_string(),
            TokenKind::LiteralString(s) => format!("\"{}\"", s),
            TokenKind::Predefined(p) => p.as_str().to_string(),
            _ => return None,
        };

        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        for ident in ["int", "while", "_Bool", "typeof_unqual", "thread_local"] {
            let kw = Keyword::from_ident(ident).expect("should be a keyword");
            assert_eq!(kw.as_str(), ident);
        }
        assert!(Keyword::from_ident("integer").is_none());
        assert!(Keyword::from_ident("Int").is_none());
    }

    #[test]
    fn test_variadic_param_index() {
        let define = PreprocessorDefine {
            name: "F".to_string(),
            params: Some(vec![
                DefineParam::named("a"),
                DefineParam::named("b"),
                DefineParam::variadic(),
            ]),
            body: TokenStream::new(),
            is_variadic: true,
        };
        assert_eq!(define.variadic_param_index(), Some(2));
        assert_eq!(define.param_count(), 3);

        let object_like = PreprocessorDefine {
            name: "N".to_string(),
            params: None,
            body: TokenStream::new(),
            is_variadic: false,
        };
        assert_eq!(object_like.variadic_param_index(), None);
        assert_eq!(object_like.param_count(), 0);
    }

    #[test]
    fn test_printable_forms() {
        let loc = Location::builtin(crate::location::FileId::PREDEFINED);

        let int = Token::new(
            TokenKind::LiteralInt(LiteralInt::new("42", IntSuffix::Ul)),
            loc,
        );
        assert_eq!(int.printable().unwrap(), "42UL");

        let hex = Token::new(
            TokenKind::LiteralHex(LiteralInt::new("ff", IntSuffix::None)),
            loc,
        );
        assert_eq!(hex.printable().unwrap(), "0xff");

        let string = Token::new(TokenKind::LiteralString("hi".to_string()), loc);
        assert_eq!(string.printable().unwrap(), "\"hi\"");

        let eof = Token::new(TokenKind::Eof, loc);
        assert!(eof.printable().is_none());
    }

    #[test]
    fn test_conditional_classification() {
        let ifdef = TokenKind::PreprocessorIfdef(PreprocessorIfdef {
            identifier: "X".to_string(),
            content: TokenStream::new(),
        });
        assert!(ifdef.is_conditional_preprocessor());
        assert!(ifdef.opens_conditional_group());

        let else_ = TokenKind::PreprocessorElse(PreprocessorElse {
            content: TokenStream::new(),
        });
        assert!(else_.is_conditional_preprocessor());
        assert!(!else_.opens_conditional_group());

        assert!(!TokenKind::Comma.is_conditional_preprocessor());
    }
}
