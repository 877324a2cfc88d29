//! End-to-end preprocessor tests: raw C text in, resolved token stream out.

use micac::token::{IntSuffix, Keyword, LiteralInt};
use micac::{preprocess_source, CompilerConfig, TokenKind};
use std::fs;

fn kinds(source: &str) -> Vec<TokenKind> {
    let unit = preprocess_source("test.c", source, &CompilerConfig::new())
        .expect("preprocessing should succeed");
    unit.tokens().iter().map(|t| t.kind.clone()).collect()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

fn int(value: &str) -> TokenKind {
    TokenKind::LiteralInt(LiteralInt::new(value, IntSuffix::None))
}

#[test]
fn test_object_macro_in_declaration() {
    assert_eq!(
        kinds("#define N 3\nint a[N];\n"),
        vec![
            TokenKind::Keyword(Keyword::Int),
            ident("a"),
            TokenKind::LBracket,
            int("3"),
            TokenKind::RBracket,
            TokenKind::Semicolon,
        ]
    );
}

#[test]
fn test_function_macro_duplicates_argument() {
    assert_eq!(
        kinds("#define SQ(x) ((x)*(x))\nSQ(1+2)\n"),
        vec![
            TokenKind::LParen,
            TokenKind::LParen,
            int("1"),
            TokenKind::Plus,
            int("2"),
            TokenKind::RParen,
            TokenKind::Star,
            TokenKind::LParen,
            int("1"),
            TokenKind::Plus,
            int("2"),
            TokenKind::RParen,
            TokenKind::RParen,
        ]
    );
}

#[test]
fn test_paste_produces_one_identifier() {
    assert_eq!(
        kinds("#define GLUE(a,b) a##b\nGLUE(foo,bar)\n"),
        vec![ident("foobar")]
    );
}

#[test]
fn test_stringify_joins_with_single_spaces() {
    assert_eq!(
        kinds("#define STR(x) #x\nSTR(hello world)\n"),
        vec![TokenKind::LiteralString("hello world".to_string())]
    );
}

#[test]
fn test_if_selects_true_branch() {
    assert_eq!(kinds("#if 1+1==2\nA\n#else\nB\n#endif\n"), vec![ident("A")]);
}

#[test]
fn test_ifdef_without_define_selects_else() {
    assert_eq!(kinds("#ifdef X\nA\n#else\nB\n#endif\n"), vec![ident("B")]);
}

#[test]
fn test_conditional_with_elif_chain() {
    let source = "#define MODE 2\n\
                  #if MODE == 1\none\n\
                  #elif MODE == 2\ntwo\n\
                  #elif MODE == 3\nthree\n\
                  #else\nother\n\
                  #endif\n";
    assert_eq!(kinds(source), vec![ident("two")]);
}

#[test]
fn test_variadic_macro_forwards_arguments() {
    assert_eq!(
        kinds("#define FIRST_AND_REST(a, ...) a; __VA_ARGS__\nFIRST_AND_REST(x, y, z)\n"),
        vec![
            ident("x"),
            TokenKind::Semicolon,
            ident("y"),
            TokenKind::Comma,
            ident("z"),
        ]
    );
}

#[test]
fn test_paste_then_keyword() {
    assert_eq!(
        kinds("#define K(a) a##nt\nK(i) x;\n"),
        vec![
            TokenKind::Keyword(Keyword::Int),
            ident("x"),
            TokenKind::Semicolon,
        ]
    );
}

#[test]
fn test_macro_defined_inside_expression() {
    let source = "#define A 1\n#if defined(A) && !defined(B)\nyes\n#endif\n";
    assert_eq!(kinds(source), vec![ident("yes")]);
}

// ---------------------------------------------------------------------
// Includes
// ---------------------------------------------------------------------

fn preprocess_in_dir(
    dir: &std::path::Path,
    source: &str,
    config: &CompilerConfig,
) -> Result<micac::Preprocessed, String> {
    let main = dir.join("main.c");
    fs::write(&main, source).unwrap();
    micac::preprocess_file(&main, config)
}

#[test]
fn test_include_splices_at_directive() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("util.h"), "int helper(void);\n").unwrap();

    let unit = preprocess_in_dir(
        temp.path(),
        "#include \"util.h\"\nint main(void);\n",
        &CompilerConfig::new(),
    )
    .unwrap();

    assert_eq!(unit.render(), "int helper ( void ) ; int main ( void ) ;");
}

#[test]
fn test_include_defines_visible_after_splice() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("limits.h"), "#define MAX 100\n").unwrap();

    let unit = preprocess_in_dir(
        temp.path(),
        "#include \"limits.h\"\nint a[MAX];\n",
        &CompilerConfig::new(),
    )
    .unwrap();

    assert_eq!(unit.render(), "int a [ 100 ] ;");
}

#[test]
fn test_include_guard_dedups_declarations() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
        temp.path().join("guarded.h"),
        "#ifndef GUARDED_H\n#define GUARDED_H\nint value;\n#endif\n",
    )
    .unwrap();

    let once = preprocess_in_dir(
        temp.path(),
        "#include \"guarded.h\"\n",
        &CompilerConfig::new(),
    )
    .unwrap();
    let twice = preprocess_in_dir(
        temp.path(),
        "#include \"guarded.h\"\n#include \"guarded.h\"\n",
        &CompilerConfig::new(),
    )
    .unwrap();

    assert_eq!(once.render(), "int value ;");
    assert_eq!(twice.render(), once.render());
}

#[test]
fn test_include_dirs_searched_before_local_dir() {
    let temp = tempfile::tempdir().unwrap();
    let sys = temp.path().join("sys");
    let src = temp.path().join("src");
    fs::create_dir_all(&sys).unwrap();
    fs::create_dir_all(&src).unwrap();

    // Same header name in both; the configured dir wins.
    fs::write(sys.join("pick.h"), "int from_sys;\n").unwrap();
    fs::write(src.join("pick.h"), "int from_local;\n").unwrap();

    let config = CompilerConfig::new().with_include_dir(&sys);
    let unit = preprocess_in_dir(&src, "#include \"pick.h\"\n", &config).unwrap();
    assert_eq!(unit.render(), "int from_sys ;");
}

#[test]
fn test_local_dir_is_fallback() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("only_local.h"), "int local_only;\n").unwrap();

    let unit = preprocess_in_dir(
        temp.path(),
        "#include <only_local.h>\n",
        &CompilerConfig::new(),
    )
    .unwrap();
    assert_eq!(unit.render(), "int local_only ;");
}

#[test]
fn test_transitive_include() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("inner.h"), "#define DEPTH 2\n").unwrap();
    fs::write(
        temp.path().join("outer.h"),
        "#include \"inner.h\"\nint nested[DEPTH];\n",
    )
    .unwrap();

    let unit = preprocess_in_dir(
        temp.path(),
        "#include \"outer.h\"\nint after[DEPTH];\n",
        &CompilerConfig::new(),
    )
    .unwrap();
    assert_eq!(unit.render(), "int nested [ 2 ] ; int after [ 2 ] ;");
}

#[test]
fn test_missing_include_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let err = preprocess_in_dir(
        temp.path(),
        "#include \"no_such_file.h\"\n",
        &CompilerConfig::new(),
    )
    .unwrap_err();
    assert!(err.contains("no_such_file.h"));
}
