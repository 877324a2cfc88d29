//! C scanner.
//!
//! Produces the token stream the resolver consumes. Ordinary C tokens are
//! lexed one by one; preprocessor directives become single tokens carrying
//! their nested streams:
//!
//! - a `#define` owns its body, with parameter references replaced by
//!   `MacroParam` tokens and `__VA_ARGS__` by `MacroParamVariadic`;
//! - a conditional group (`#if`/`#ifdef`/`#ifndef` ... `#endif`) owns the
//!   first branch's body followed, flat, by one token per sibling branch
//!   (`#elif`, `#elifdef`, `#elifndef`, `#else`), each owning its own body;
//! - `defined(X)` inside a condition becomes a `MacroDefined` token.
//!
//! Nested sub-streams are `Eot`-terminated; the top-level stream ends with
//! `Eof`. Backslash-newline splices lines everywhere; comments are skipped.

use crate::error::CompileError;
use crate::location::{FileId, Location};
use crate::stream::{TokenArena, TokenId, TokenStream};
use crate::token::{
    DefineParam, EotContext, FloatSuffix, IntSuffix, Keyword, LiteralFloat, LiteralInt,
    PredefinedMacro, PreprocessorDefine, PreprocessorElse, PreprocessorIf, PreprocessorIfdef,
    PreprocessorInclude, PreprocessorLine, Token, TokenKind,
};

/// Scan `source` into a token stream registered in `arena`.
pub fn scan(
    source: &str,
    file: FileId,
    arena: &mut TokenArena,
) -> Result<TokenStream, CompileError> {
    let mut scanner = Scanner {
        src: source.as_bytes(),
        pos: 0,
        line: 0,
        column: 0,
        at_line_start: true,
        file,
        arena,
    };
    scanner.scan_stream()
}

/// What ended a conditional-group element scan.
enum Terminator {
    Elif(TokenStream),
    Elifdef(String),
    Elifndef(String),
    Else,
    Endif,
}

/// One step of scanning inside or outside a conditional group.
enum Element {
    Token(TokenId),
    Terminator(Terminator),
    End,
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
    file: FileId,
    arena: &'a mut TokenArena,
}

impl<'a> Scanner<'a> {
    // ------------------------------------------------------------------
    // Cursor primitives
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> u8 {
        self.src[self.pos]
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> u8 {
        let c = self.src[self.pos];
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        c
    }

    fn mark(&self) -> (usize, usize, usize) {
        (self.line, self.column, self.pos)
    }

    fn location_from(&self, start: (usize, usize, usize)) -> Location {
        Location::new(
            self.file,
            start.0,
            start.1,
            start.2,
            self.line,
            self.column,
            self.pos,
        )
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Scan {
            message: message.into(),
            location: Location::new(
                self.file,
                self.line,
                self.column,
                self.pos,
                self.line,
                self.column,
                self.pos,
            ),
        }
    }

    /// Skip whitespace, comments and spliced newlines. With
    /// `stop_at_newline`, an unspliced newline is left in place so
    /// directive payloads stay line-bounded.
    fn skip_trivia(&mut self, stop_at_newline: bool) {
        loop {
            if self.at_end() {
                return;
            }
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                }
                b'\n' => {
                    if stop_at_newline {
                        return;
                    }
                    self.advance();
                    self.at_line_start = true;
                }
                b'\\' => {
                    // Line splice: backslash immediately before a newline.
                    match (self.peek_at(1), self.peek_at(2)) {
                        (Some(b'\n'), _) => {
                            self.advance();
                            self.advance();
                        }
                        (Some(b'\r'), Some(b'\n')) => {
                            self.advance();
                            self.advance();
                            self.advance();
                        }
                        _ => return,
                    }
                }
                b'/' => match self.peek_at(1) {
                    Some(b'/') => {
                        while !self.at_end() && self.peek() != b'\n' {
                            self.advance();
                        }
                    }
                    Some(b'*') => {
                        self.advance();
                        self.advance();
                        loop {
                            if self.at_end() {
                                return;
                            }
                            if self.peek() == b'*' && self.peek_at(1) == Some(b'/') {
                                self.advance();
                                self.advance();
                                break;
                            }
                            self.advance();
                        }
                    }
                    _ => return,
                },
                _ => return,
            }
        }
    }

    /// True when the cursor sits at the end of the current directive line.
    fn at_directive_end(&mut self) -> bool {
        self.skip_trivia(true);
        self.at_end() || self.peek() == b'\n'
    }

    /// Consume the rest of the current directive line.
    fn skip_to_line_end(&mut self) {
        while !self.at_directive_end() {
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn scan_stream(&mut self) -> Result<TokenStream, CompileError> {
        let mut stream = TokenStream::new();

        loop {
            match self.scan_element(false)? {
                Element::Token(id) => stream.append(id),
                Element::Terminator(_) => {
                    unreachable!("terminators are rejected outside a group")
                }
                Element::End => break,
            }
        }

        let eof_location = self.location_from(self.mark());
        stream.append(self.arena.alloc(Token::new(TokenKind::Eof, eof_location)));
        Ok(stream)
    }

    /// Scan the next token or directive. Inside a conditional group,
    /// sibling and closing directives surface as terminators instead of
    /// tokens.
    fn scan_element(&mut self, inside_group: bool) -> Result<Element, CompileError> {
        loop {
            self.skip_trivia(false);
            if self.at_end() {
                return Ok(Element::End);
            }

            if self.at_line_start && self.peek() == b'#' {
                let start = self.mark();
                self.at_line_start = false;
                self.advance(); // `#`

                if self.at_directive_end() {
                    continue; // null directive
                }

                if !is_ident_start(self.peek()) {
                    return Err(self.error("expected a directive name after `#`"));
                }
                let name = self.lex_ident_text();

                match name.as_str() {
                    "elif" => {
                        if !inside_group {
                            return Err(self.error("`#elif` without a matching `#if`"));
                        }
                        let cond = self.scan_cond_line()?;
                        return Ok(Element::Terminator(Terminator::Elif(cond)));
                    }
                    "elifdef" | "elifndef" => {
                        if !inside_group {
                            return Err(
                                self.error(format!("`#{}` without a matching `#if`", name))
                            );
                        }
                        let identifier = self.scan_directive_identifier()?;
                        self.skip_to_line_end();
                        return Ok(Element::Terminator(if name == "elifdef" {
                            Terminator::Elifdef(identifier)
                        } else {
                            Terminator::Elifndef(identifier)
                        }));
                    }
                    "else" => {
                        if !inside_group {
                            return Err(self.error("`#else` without a matching `#if`"));
                        }
                        self.skip_to_line_end();
                        return Ok(Element::Terminator(Terminator::Else));
                    }
                    "endif" => {
                        if !inside_group {
                            return Err(self.error("`#endif` without a matching `#if`"));
                        }
                        self.skip_to_line_end();
                        return Ok(Element::Terminator(Terminator::Endif));
                    }
                    _ => {
                        let id = self.scan_directive(&name, start)?;
                        return Ok(Element::Token(id));
                    }
                }
            }

            self.at_line_start = false;
            let token = self.lex_token()?;
            return Ok(Element::Token(self.arena.alloc(token)));
        }
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    fn scan_directive(
        &mut self,
        name: &str,
        start: (usize, usize, usize),
    ) -> Result<TokenId, CompileError> {
        let kind = match name {
            "define" => self.scan_define()?,
            "undef" => {
                let identifier = self.scan_directive_identifier()?;
                self.skip_to_line_end();
                TokenKind::PreprocessorUndef(identifier)
            }
            "include" => self.scan_include()?,
            "if" => {
                let cond = self.scan_cond_line()?;
                return self.scan_conditional_group(CondOpener::If(cond), start);
            }
            "ifdef" => {
                let identifier = self.scan_directive_identifier()?;
                self.skip_to_line_end();
                return self.scan_conditional_group(CondOpener::Ifdef(identifier), start);
            }
            "ifndef" => {
                let identifier = self.scan_directive_identifier()?;
                self.skip_to_line_end();
                return self.scan_conditional_group(CondOpener::Ifndef(identifier), start);
            }
            "error" => TokenKind::PreprocessorError(self.scan_line_text()),
            "warning" => TokenKind::PreprocessorWarning(self.scan_line_text()),
            "pragma" => TokenKind::PreprocessorPragma(self.scan_line_text()),
            "embed" => TokenKind::PreprocessorEmbed(self.scan_line_text()),
            "line" => TokenKind::PreprocessorLine(PreprocessorLine {
                line: self.scan_line_text(),
            }),
            other => {
                return Err(self.error(format!("unknown preprocessor directive `#{}`", other)));
            }
        };

        Ok(self.arena.alloc(Token::new(kind, self.location_from(start))))
    }

    fn scan_directive_identifier(&mut self) -> Result<String, CompileError> {
        if self.at_directive_end() || !is_ident_start(self.peek()) {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.lex_ident_text())
    }

    /// The raw text payload of `#error`, `#warning`, `#pragma`, ...
    fn scan_line_text(&mut self) -> String {
        let mut text = String::new();
        loop {
            if self.at_end() || self.peek() == b'\n' {
                break;
            }
            if self.peek() == b'\\' && self.peek_at(1) == Some(b'\n') {
                self.advance();
                self.advance();
                continue;
            }
            text.push(self.advance() as char);
        }
        text.trim().to_string()
    }

    fn scan_include(&mut self) -> Result<TokenKind, CompileError> {
        if self.at_directive_end() {
            return Err(self.error("expected a path after `#include`"));
        }

        let close = match self.peek() {
            b'<' => b'>',
            b'"' => b'"',
            _ => return Err(self.error("expected `<path>` or \"path\" after `#include`")),
        };
        self.advance();

        let mut path = String::new();
        loop {
            if self.at_end() || self.peek() == b'\n' {
                return Err(self.error("unterminated include path"));
            }
            let c = self.advance();
            if c == close {
                break;
            }
            path.push(c as char);
        }
        self.skip_to_line_end();

        Ok(TokenKind::PreprocessorInclude(PreprocessorInclude { path }))
    }

    // ------------------------------------------------------------------
    // #define
    // ------------------------------------------------------------------

    fn scan_define(&mut self) -> Result<TokenKind, CompileError> {
        let name = self.scan_directive_identifier()?;

        // A parameter list only exists when `(` hugs the macro name.
        let mut params: Option<Vec<DefineParam>> = None;
        if !self.at_end() && self.peek() == b'(' {
            self.advance();
            params = Some(self.scan_define_params()?);
        }

        let is_variadic = params
            .as_ref()
            .is_some_and(|ps| ps.iter().any(|p| p.is_variadic));

        let mut body = TokenStream::new();
        while !self.at_directive_end() {
            let token = self.lex_token()?;
            let kind = match token.kind {
                TokenKind::Identifier(ident) => {
                    if ident == "__VA_ARGS__" && is_variadic {
                        if let Some(ps) = params.as_mut()
                            && let Some(variadic) = ps.iter_mut().find(|p| p.is_variadic)
                        {
                            variadic.is_used = true;
                        }
                        TokenKind::MacroParamVariadic
                    } else if let Some(index) = params.as_mut().and_then(|ps| {
                        ps.iter()
                            .position(|p| p.name.as_deref() == Some(ident.as_str()))
                    }) {
                        params.as_mut().expect("params present")[index].is_used = true;
                        TokenKind::MacroParam { index }
                    } else {
                        TokenKind::Identifier(ident)
                    }
                }
                other => other,
            };
            body.append(self.arena.alloc(Token::new(kind, token.location)));
        }

        let eot_location = self.location_from(self.mark());
        body.append(
            self.arena
                .alloc(Token::new(TokenKind::Eot(EotContext::Define), eot_location)),
        );

        Ok(TokenKind::PreprocessorDefine(PreprocessorDefine {
            name,
            params,
            body,
            is_variadic,
        }))
    }

    fn scan_define_params(&mut self) -> Result<Vec<DefineParam>, CompileError> {
        let mut params = Vec::new();

        loop {
            self.skip_trivia(true);
            if self.at_end() || self.peek() == b'\n' {
                return Err(self.error("unterminated macro parameter list"));
            }
            if self.peek() == b')' {
                self.advance();
                break;
            }

            if self.peek() == b'.' {
                if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
                    self.advance();
                    self.advance();
                    self.advance();
                    params.push(DefineParam::variadic());
                } else {
                    return Err(self.error("expected `...` in macro parameter list"));
                }
            } else if is_ident_start(self.peek()) {
                params.push(DefineParam::named(self.lex_ident_text()));
            } else {
                return Err(self.error("expected a macro parameter name"));
            }

            self.skip_trivia(true);
            match self.peek_at(0) {
                Some(b',') => {
                    self.advance();
                }
                Some(b')') => {}
                _ => return Err(self.error("expected `,` or `)` in macro parameter list")),
            }
        }

        Ok(params)
    }

    // ------------------------------------------------------------------
    // Conditions and conditional groups
    // ------------------------------------------------------------------

    /// Scan the condition tokens of `#if`/`#elif` up to the end of the
    /// line, turning `defined(X)` / `defined X` into `MacroDefined`.
    fn scan_cond_line(&mut self) -> Result<TokenStream, CompileError> {
        let mut cond = TokenStream::new();

        while !self.at_directive_end() {
            let token = self.lex_token()?;

            if let TokenKind::Identifier(name) = &token.kind
                && name == "defined"
            {
                let id = self.scan_defined_operand(token.location)?;
                cond.append(id);
                continue;
            }

            cond.append(self.arena.alloc(token));
        }

        let eot_location = self.location_from(self.mark());
        cond.append(
            self.arena
                .alloc(Token::new(TokenKind::Eot(EotContext::Other), eot_location)),
        );
        Ok(cond)
    }

    fn scan_defined_operand(&mut self, start: Location) -> Result<TokenId, CompileError> {
        self.skip_trivia(true);
        if self.at_end() || self.peek() == b'\n' {
            return Err(self.error("expected an operand for `defined`"));
        }

        let name = if self.peek() == b'(' {
            self.advance();
            self.skip_trivia(true);
            if self.at_end() || !is_ident_start(self.peek()) {
                return Err(self.error("expected an identifier inside `defined(...)`"));
            }
            let name = self.lex_ident_text();
            self.skip_trivia(true);
            if self.at_end() || self.peek() != b')' {
                return Err(self.error("expected `)` closing `defined(...)`"));
            }
            self.advance();
            name
        } else if is_ident_start(self.peek()) {
            self.lex_ident_text()
        } else {
            return Err(self.error("expected an identifier after `defined`"));
        };

        let location = start.span_to(&self.location_from(self.mark()));
        Ok(self
            .arena
            .alloc(Token::new(TokenKind::MacroDefined(name), location)))
    }

    fn scan_conditional_group(
        &mut self,
        opener: CondOpener,
        start: (usize, usize, usize),
    ) -> Result<TokenId, CompileError> {
        let mut content = TokenStream::new();

        // First branch body, flat in the group's content.
        let mut terminator = loop {
            match self.scan_element(true)? {
                Element::Token(id) => content.append(id),
                Element::Terminator(t) => break t,
                Element::End => return Err(self.error("unterminated conditional directive")),
            }
        };

        // Each sibling branch becomes one token appended to the group's
        // content, owning its own Eot-terminated body.
        while !matches!(terminator, Terminator::Endif) {
            let sibling_start = self.mark();
            let mut body = TokenStream::new();
            let next_terminator = loop {
                match self.scan_element(true)? {
                    Element::Token(id) => body.append(id),
                    Element::Terminator(t) => break t,
                    Element::End => {
                        return Err(self.error("unterminated conditional directive"));
                    }
                }
            };
            let eot_location = self.location_from(self.mark());
            body.append(
                self.arena
                    .alloc(Token::new(TokenKind::Eot(EotContext::Other), eot_location)),
            );

            let sibling_kind = match terminator {
                Terminator::Elif(cond) => TokenKind::PreprocessorElif(PreprocessorIf {
                    cond,
                    content: body,
                }),
                Terminator::Elifdef(identifier) => {
                    TokenKind::PreprocessorElifdef(PreprocessorIfdef {
                        identifier,
                        content: body,
                    })
                }
                Terminator::Elifndef(identifier) => {
                    TokenKind::PreprocessorElifndef(PreprocessorIfdef {
                        identifier,
                        content: body,
                    })
                }
                Terminator::Else => TokenKind::PreprocessorElse(PreprocessorElse { content: body }),
                Terminator::Endif => unreachable!("loop condition"),
            };
            content.append(
                self.arena
                    .alloc(Token::new(sibling_kind, self.location_from(sibling_start))),
            );

            terminator = next_terminator;
        }

        let eot_location = self.location_from(self.mark());
        content.append(
            self.arena
                .alloc(Token::new(TokenKind::Eot(EotContext::Other), eot_location)),
        );

        let kind = match opener {
            CondOpener::If(cond) => TokenKind::PreprocessorIf(PreprocessorIf { cond, content }),
            CondOpener::Ifdef(identifier) => TokenKind::PreprocessorIfdef(PreprocessorIfdef {
                identifier,
                content,
            }),
            CondOpener::Ifndef(identifier) => TokenKind::PreprocessorIfndef(PreprocessorIfdef {
                identifier,
                content,
            }),
        };

        Ok(self.arena.alloc(Token::new(kind, self.location_from(start))))
    }

    // ------------------------------------------------------------------
    // Plain tokens
    // ------------------------------------------------------------------

    fn lex_ident_text(&mut self) -> String {
        let start = self.pos;
        while !self.at_end() && is_ident_continue(self.peek()) {
            self.advance();
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn lex_token(&mut self) -> Result<Token, CompileError> {
        let start = self.mark();
        let c = self.peek();

        if is_ident_start(c) {
            let ident = self.lex_ident_text();
            let kind = if let Some(keyword) = Keyword::from_ident(&ident) {
                TokenKind::Keyword(keyword)
            } else if let Some(predefined) = PredefinedMacro::from_ident(&ident) {
                TokenKind::Predefined(predefined)
            } else {
                TokenKind::Identifier(ident)
            };
            return Ok(Token::new(kind, self.location_from(start)));
        }

        if c.is_ascii_digit() {
            let kind = self.lex_number()?;
            return Ok(Token::new(kind, self.location_from(start)));
        }

        if c == b'"' {
            let kind = self.lex_string()?;
            return Ok(Token::new(kind, self.location_from(start)));
        }

        if c == b'\'' {
            let kind = self.lex_char()?;
            return Ok(Token::new(kind, self.location_from(start)));
        }

        let kind = self.lex_punctuation()?;
        Ok(Token::new(kind, self.location_from(start)))
    }

    fn lex_number(&mut self) -> Result<TokenKind, CompileError> {
        if self.peek() == b'0' {
            match self.peek_at(1) {
                Some(b'x') | Some(b'X') => {
                    self.advance();
                    self.advance();
                    let value = self.lex_digits(|c| c.is_ascii_hexdigit());
                    if value.is_empty() {
                        return Err(self.error("expected hexadecimal digits after `0x`"));
                    }
                    return Ok(TokenKind::LiteralHex(LiteralInt::new(
                        value,
                        self.lex_int_suffix()?,
                    )));
                }
                Some(b'b') | Some(b'B') => {
                    self.advance();
                    self.advance();
                    let value = self.lex_digits(|c| c == b'0' || c == b'1');
                    if value.is_empty() {
                        return Err(self.error("expected binary digits after `0b`"));
                    }
                    return Ok(TokenKind::LiteralBin(LiteralInt::new(
                        value,
                        self.lex_int_suffix()?,
                    )));
                }
                Some(c) if c.is_ascii_digit() => {
                    self.advance(); // leading 0
                    let value = self.lex_digits(|c| (b'0'..=b'7').contains(&c));
                    return Ok(TokenKind::LiteralOctal(LiteralInt::new(
                        value,
                        self.lex_int_suffix()?,
                    )));
                }
                _ => {}
            }
        }

        let mut value = self.lex_digits(|c| c.is_ascii_digit());

        let is_float = match self.peek_at(0) {
            Some(b'.') => self.peek_at(1).is_none_or(|c| !is_ident_start(c)),
            Some(b'e') | Some(b'E') => true,
            _ => false,
        };

        if is_float {
            if self.peek() == b'.' {
                value.push(self.advance() as char);
                value.push_str(&self.lex_digits(|c| c.is_ascii_digit()));
            }
            if matches!(self.peek_at(0), Some(b'e') | Some(b'E')) {
                value.push(self.advance() as char);
                if matches!(self.peek_at(0), Some(b'+') | Some(b'-')) {
                    value.push(self.advance() as char);
                }
                let exponent = self.lex_digits(|c| c.is_ascii_digit());
                if exponent.is_empty() {
                    return Err(self.error("expected an exponent"));
                }
                value.push_str(&exponent);
            }
            let suffix = match self.peek_at(0) {
                Some(b'f') | Some(b'F') => {
                    self.advance();
                    FloatSuffix::F
                }
                Some(b'l') | Some(b'L') => {
                    self.advance();
                    FloatSuffix::L
                }
                _ => FloatSuffix::None,
            };
            return Ok(TokenKind::LiteralFloat(LiteralFloat { value, suffix }));
        }

        Ok(TokenKind::LiteralInt(LiteralInt::new(
            value,
            self.lex_int_suffix()?,
        )))
    }

    fn lex_digits(&mut self, accept: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while !self.at_end() && accept(self.peek()) {
            self.advance();
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn lex_int_suffix(&mut self) -> Result<IntSuffix, CompileError> {
        let mut unsigned = false;
        let mut longs: u8 = 0;

        while let Some(c) = self.peek_at(0) {
            match c {
                b'u' | b'U' => {
                    if unsigned {
                        return Err(self.error("duplicate `u` suffix"));
                    }
                    unsigned = true;
                    self.advance();
                }
                b'l' | b'L' => {
                    if longs >= 2 {
                        return Err(self.error("too many `l` suffixes"));
                    }
                    longs += 1;
                    self.advance();
                }
                _ => break,
            }
        }

        Ok(match (unsigned, longs) {
            (false, 0) => IntSuffix::None,
            (false, 1) => IntSuffix::L,
            (false, _) => IntSuffix::Ll,
            (true, 0) => IntSuffix::U,
            (true, 1) => IntSuffix::Ul,
            (true, _) => IntSuffix::Ull,
        })
    }

    fn lex_string(&mut self) -> Result<TokenKind, CompileError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            if self.at_end() || self.peek() == b'\n' {
                return Err(self.error("unterminated string literal"));
            }
            let c = self.advance();
            if c == b'"' {
                break;
            }
            if c == b'\\' {
                // Keep the escape as written; the literal stores source
                // text between the quotes.
                if self.at_end() {
                    return Err(self.error("unterminated string literal"));
                }
                value.push('\\');
                value.push(self.advance() as char);
                continue;
            }
            value.push(c as char);
        }
        Ok(TokenKind::LiteralString(value))
    }

    fn lex_char(&mut self) -> Result<TokenKind, CompileError> {
        self.advance(); // opening quote
        if self.at_end() || self.peek() == b'\n' {
            return Err(self.error("unterminated character literal"));
        }

        let c = self.advance();
        let value = if c == b'\\' {
            if self.at_end() {
                return Err(self.error("unterminated character literal"));
            }
            match self.advance() {
                b'n' => '\n',
                b't' => '\t',
                b'r' => '\r',
                b'0' => '\0',
                b'\\' => '\\',
                b'\'' => '\'',
                b'"' => '"',
                other => return Err(self.error(format!("unknown escape `\\{}`", other as char))),
            }
        } else {
            c as char
        };

        if self.at_end() || self.peek() != b'\'' {
            return Err(self.error("expected `'` closing a character literal"));
        }
        self.advance();
        Ok(TokenKind::LiteralChar(value))
    }

    fn lex_punctuation(&mut self) -> Result<TokenKind, CompileError> {
        let c = self.advance();

        macro_rules! follow {
            ($byte:expr) => {
                if self.peek_at(0) == Some($byte) {
                    self.advance();
                    true
                } else {
                    false
                }
            };
        }

        let kind = match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'?' => TokenKind::Question,
            b'~' => TokenKind::Tilde,
            b'.' => {
                if self.peek_at(0) == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            b'#' => {
                if follow!(b'#') {
                    TokenKind::HashHash
                } else {
                    TokenKind::Hash
                }
            }
            b'+' => {
                if follow!(b'+') {
                    TokenKind::PlusPlus
                } else if follow!(b'=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if follow!(b'-') {
                    TokenKind::MinusMinus
                } else if follow!(b'=') {
                    TokenKind::MinusEq
                } else if follow!(b'>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => {
                if follow!(b'=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            b'/' => {
                if follow!(b'=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            b'%' => {
                if follow!(b'=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            b'=' => {
                if follow!(b'=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            b'!' => {
                if follow!(b'=') {
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.peek_at(0) == Some(b'<') {
                    self.advance();
                    if follow!(b'=') {
                        TokenKind::LtLtEq
                    } else {
                        TokenKind::LtLt
                    }
                } else if follow!(b'=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek_at(0) == Some(b'>') {
                    self.advance();
                    if follow!(b'=') {
                        TokenKind::GtGtEq
                    } else {
                        TokenKind::GtGt
                    }
                } else if follow!(b'=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b'&' => {
                if follow!(b'&') {
                    TokenKind::AmpAmp
                } else if follow!(b'=') {
                    TokenKind::AmpEq
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if follow!(b'|') {
                    TokenKind::PipePipe
                } else if follow!(b'=') {
                    TokenKind::PipeEq
                } else {
                    TokenKind::Pipe
                }
            }
            b'^' => {
                if follow!(b'=') {
                    TokenKind::CaretEq
                } else {
                    TokenKind::Caret
                }
            }
            other => {
                return Err(self.error(format!("unexpected character `{}`", other as char)));
            }
        };

        Ok(kind)
    }
}

enum CondOpener {
    If(TokenStream),
    Ifdef(String),
    Ifndef(String),
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_kinds(source: &str) -> (TokenArena, Vec<TokenKind>) {
        let mut arena = TokenArena::new();
        let stream = scan(source, FileId::new(0, crate::location::FileKind::Source), &mut arena)
            .expect("scan should succeed");
        let kinds = stream.iter().map(|id| arena.kind(id).clone()).collect();
        (arena, kinds)
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.to_string())
    }

    fn int(value: &str) -> TokenKind {
        TokenKind::LiteralInt(LiteralInt::new(value, IntSuffix::None))
    }

    #[test]
    fn test_plain_declaration() {
        let (_, kinds) = scan_kinds("int a[3];\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Int),
                ident("a"),
                TokenKind::LBracket,
                int("3"),
                TokenKind::RBracket,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let (_, kinds) = scan_kinds("a /* block\ncomment */ b // line\nc\n");
        assert_eq!(kinds, vec![ident("a"), ident("b"), ident("c"), TokenKind::Eof]);
    }

    #[test]
    fn test_multi_character_operators() {
        let (_, kinds) = scan_kinds("<<= >>= ... -> ## ++\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::LtLtEq,
                TokenKind::GtGtEq,
                TokenKind::Ellipsis,
                TokenKind::Arrow,
                TokenKind::HashHash,
                TokenKind::PlusPlus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literal_bases_and_suffixes() {
        let (_, kinds) = scan_kinds("0xff 0b101 017 42ul 3.5f 1e3 'x'\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::LiteralHex(LiteralInt::new("ff", IntSuffix::None)),
                TokenKind::LiteralBin(LiteralInt::new("101", IntSuffix::None)),
                TokenKind::LiteralOctal(LiteralInt::new("17", IntSuffix::None)),
                TokenKind::LiteralInt(LiteralInt::new("42", IntSuffix::Ul)),
                TokenKind::LiteralFloat(LiteralFloat {
                    value: "3.5".to_string(),
                    suffix: FloatSuffix::F,
                }),
                TokenKind::LiteralFloat(LiteralFloat {
                    value: "1e3".to_string(),
                    suffix: FloatSuffix::None,
                }),
                TokenKind::LiteralChar('x'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal_keeps_escapes() {
        let (_, kinds) = scan_kinds("\"a\\\"b\"\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::LiteralString("a\\\"b".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_object_like_define() {
        let (arena, kinds) = scan_kinds("#define N 3\n");
        assert_eq!(kinds.len(), 2); // define + EOF
        let TokenKind::PreprocessorDefine(define) = &kinds[0] else {
            panic!("expected a define, got {:?}", kinds[0]);
        };
        assert_eq!(define.name, "N");
        assert!(define.params.is_none());
        assert!(!define.is_variadic);

        let body: Vec<_> = define.body.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(body, vec![int("3"), TokenKind::Eot(EotContext::Define)]);
    }

    #[test]
    fn test_function_like_define_marks_used_params() {
        let (arena, kinds) = scan_kinds("#define F(a, b) a + a\n");
        let TokenKind::PreprocessorDefine(define) = &kinds[0] else {
            panic!("expected a define");
        };
        let params = define.params.as_ref().unwrap();
        assert_eq!(params.len(), 2);
        assert!(params[0].is_used);
        assert!(!params[1].is_used);

        let body: Vec<_> = define.body.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(
            body,
            vec![
                TokenKind::MacroParam { index: 0 },
                TokenKind::Plus,
                TokenKind::MacroParam { index: 0 },
                TokenKind::Eot(EotContext::Define),
            ]
        );
    }

    #[test]
    fn test_variadic_define() {
        let (arena, kinds) = scan_kinds("#define P(fmt, ...) fmt __VA_ARGS__\n");
        let TokenKind::PreprocessorDefine(define) = &kinds[0] else {
            panic!("expected a define");
        };
        assert!(define.is_variadic);
        assert_eq!(define.variadic_param_index(), Some(1));
        let params = define.params.as_ref().unwrap();
        assert!(params[1].is_variadic);
        assert!(params[1].is_used);

        let body: Vec<_> = define.body.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(
            body,
            vec![
                TokenKind::MacroParam { index: 0 },
                TokenKind::MacroParamVariadic,
                TokenKind::Eot(EotContext::Define),
            ]
        );
    }

    #[test]
    fn test_define_body_with_stringify_and_paste() {
        let (arena, kinds) = scan_kinds("#define G(x) #x x##x\n");
        let TokenKind::PreprocessorDefine(define) = &kinds[0] else {
            panic!("expected a define");
        };
        let body: Vec<_> = define.body.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(
            body,
            vec![
                TokenKind::Hash,
                TokenKind::MacroParam { index: 0 },
                TokenKind::MacroParam { index: 0 },
                TokenKind::HashHash,
                TokenKind::MacroParam { index: 0 },
                TokenKind::Eot(EotContext::Define),
            ]
        );
    }

    #[test]
    fn test_line_splice_extends_define_body() {
        let (arena, kinds) = scan_kinds("#define M a \\\n b\nc\n");
        let TokenKind::PreprocessorDefine(define) = &kinds[0] else {
            panic!("expected a define");
        };
        let body: Vec<_> = define.body.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(
            body,
            vec![ident("a"), ident("b"), TokenKind::Eot(EotContext::Define)]
        );
        // `c` is outside the define.
        assert_eq!(kinds[1], ident("c"));
    }

    #[test]
    fn test_include_forms() {
        let (_, kinds) = scan_kinds("#include <stdio.h>\n#include \"util.h\"\n");
        assert_eq!(
            kinds[0],
            TokenKind::PreprocessorInclude(PreprocessorInclude {
                path: "stdio.h".to_string()
            })
        );
        assert_eq!(
            kinds[1],
            TokenKind::PreprocessorInclude(PreprocessorInclude {
                path: "util.h".to_string()
            })
        );
    }

    #[test]
    fn test_conditional_group_structure() {
        let (arena, kinds) = scan_kinds("#if A\nx\n#elif B\ny\n#else\nz\n#endif\n");
        assert_eq!(kinds.len(), 2); // group token + EOF

        let TokenKind::PreprocessorIf(group) = &kinds[0] else {
            panic!("expected an #if group, got {:?}", kinds[0]);
        };

        let cond: Vec<_> = group.cond.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(cond, vec![ident("A"), TokenKind::Eot(EotContext::Other)]);

        let content: Vec<_> = group
            .content
            .iter()
            .map(|id| arena.kind(id).clone())
            .collect();
        assert_eq!(content.len(), 4); // x, elif token, else token, EOT
        assert_eq!(content[0], ident("x"));
        assert!(matches!(content[1], TokenKind::PreprocessorElif(_)));
        assert!(matches!(content[2], TokenKind::PreprocessorElse(_)));
        assert!(matches!(content[3], TokenKind::Eot(EotContext::Other)));

        let TokenKind::PreprocessorElif(elif) = &content[1] else {
            unreachable!();
        };
        let elif_body: Vec<_> = elif
            .content
            .iter()
            .map(|id| arena.kind(id).clone())
            .collect();
        assert_eq!(elif_body, vec![ident("y"), TokenKind::Eot(EotContext::Other)]);
    }

    #[test]
    fn test_nested_conditional_is_one_token() {
        let (arena, kinds) = scan_kinds("#if A\n#if B\nx\n#endif\n#endif\n");
        let TokenKind::PreprocessorIf(outer) = &kinds[0] else {
            panic!("expected an #if group");
        };
        let content: Vec<_> = outer
            .content
            .iter()
            .map(|id| arena.kind(id).clone())
            .collect();
        assert_eq!(content.len(), 2); // nested group + EOT
        assert!(matches!(content[0], TokenKind::PreprocessorIf(_)));
    }

    #[test]
    fn test_ifdef_and_defined() {
        let (arena, kinds) = scan_kinds("#ifdef X\na\n#endif\n#if defined(Y) && defined Z\nb\n#endif\n");
        let TokenKind::PreprocessorIfdef(ifdef) = &kinds[0] else {
            panic!("expected #ifdef");
        };
        assert_eq!(ifdef.identifier, "X");

        let TokenKind::PreprocessorIf(group) = &kinds[1] else {
            panic!("expected #if");
        };
        let cond: Vec<_> = group.cond.iter().map(|id| arena.kind(id).clone()).collect();
        assert_eq!(
            cond,
            vec![
                TokenKind::MacroDefined("Y".to_string()),
                TokenKind::AmpAmp,
                TokenKind::MacroDefined("Z".to_string()),
                TokenKind::Eot(EotContext::Other),
            ]
        );
    }

    #[test]
    fn test_error_and_warning_payloads() {
        let (_, kinds) = scan_kinds("#error something broke\n#warning be careful\n");
        assert_eq!(
            kinds[0],
            TokenKind::PreprocessorError("something broke".to_string())
        );
        assert_eq!(
            kinds[1],
            TokenKind::PreprocessorWarning("be careful".to_string())
        );
    }

    #[test]
    fn test_undef_and_pragma() {
        let (_, kinds) = scan_kinds("#undef X\n#pragma once\n");
        assert_eq!(kinds[0], TokenKind::PreprocessorUndef("X".to_string()));
        assert_eq!(kinds[1], TokenKind::PreprocessorPragma("once".to_string()));
    }

    #[test]
    fn test_predefined_macros_get_dedicated_kinds() {
        let (_, kinds) = scan_kinds("__FILE__ __LINE__\n");
        assert_eq!(kinds[0], TokenKind::Predefined(PredefinedMacro::File));
        assert_eq!(kinds[1], TokenKind::Predefined(PredefinedMacro::Line));
    }

    #[test]
    fn test_stray_endif_is_an_error() {
        let mut arena = TokenArena::new();
        let err = scan(
            "#endif\n",
            FileId::new(0, crate::location::FileKind::Source),
            &mut arena,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Scan { .. }));
    }

    #[test]
    fn test_unterminated_group_is_an_error() {
        let mut arena = TokenArena::new();
        let err = scan(
            "#if 1\nx\n",
            FileId::new(0, crate::location::FileKind::Source),
            &mut arena,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Scan { .. }));
    }

    #[test]
    fn test_empty_source_is_just_eof() {
        let (_, kinds) = scan_kinds("");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_hash_must_start_line_to_be_a_directive() {
        // Mid-line `#` lexes as punctuation, not as a directive.
        let (_, kinds) = scan_kinds("a # b\n");
        assert_eq!(
            kinds,
            vec![ident("a"), TokenKind::Hash, ident("b"), TokenKind::Eof]
        );
    }
}
