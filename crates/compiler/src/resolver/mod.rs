//! The preprocessor resolver.
//!
//! Walks a scanned token stream left to right and produces the flat
//! `ResolvedTokens` sequence the parser consumes: macros expand, conditional
//! groups reduce to the tokens of exactly one branch, `#include` splices the
//! included file's resolved tokens at the point of the directive, and the
//! `#`/`##` operators build new tokens from the per-call parameter buffers.
//!
//! Sub-resolvers (macro bodies, conditional branches, included files,
//! argument parsing) run to completion before the parent resumes; macro
//! arguments are fully resolved before the body of the target macro.
//! Everything is single-threaded and direct-style recursive.

mod expr;
mod macro_call;

pub use macro_call::{MacroCall, MacroCallParam, MacroCallParams};

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::CompileError;
use crate::location::FileId;
use crate::registry::{Compilation, DefineRecord, IncludeKind};
use crate::stream::{ResolvedTokens, TokenId, TokenStream};
use crate::token::{
    is_standard_predefined_macro, IntSuffix, Keyword, LiteralFloat, LiteralInt, PreprocessorDefine,
    PreprocessorIf, PreprocessorIfdef, Token, TokenKind,
};

/// Resolve the scanned stream of `file` into a flat token sequence.
///
/// Fatal errors abort the translation unit. `#error` and `#warning` are
/// recorded in the compilation's diagnostic sink; the caller decides the
/// exit status from the sink's error count.
pub fn resolve_file(comp: &mut Compilation, file: FileId) -> Result<ResolvedTokens, CompileError> {
    let tokens = comp.file(file).stream.clone();
    Resolver::new(comp, file, tokens).run()
}

struct Resolver<'c> {
    comp: &'c mut Compilation,
    /// The file whose defines table this resolver mutates. Included headers
    /// are resolved with the including file's context, which is how their
    /// defines become visible to it.
    file: FileId,
    tokens: TokenStream,
    pos: usize,
    out: ResolvedTokens,
    macro_call: Option<Rc<MacroCall>>,
    /// Re-classify identifiers against the keyword table; toggled only by
    /// the `##` rescan pathway.
    look_for_keyword: bool,
    /// Depth of in-flight `##` merges; the rescan runs when it returns to
    /// zero.
    count_merged_id: usize,
}

impl<'c> Resolver<'c> {
    fn new(comp: &'c mut Compilation, file: FileId, tokens: TokenStream) -> Self {
        Resolver {
            comp,
            file,
            tokens,
            pos: 0,
            out: ResolvedTokens::new(),
            macro_call: None,
            look_for_keyword: false,
            count_merged_id: 0,
        }
    }

    fn run(mut self) -> Result<ResolvedTokens, CompileError> {
        self.run_loop()?;
        Ok(self.out)
    }

    fn run_loop(&mut self) -> Result<(), CompileError> {
        while self.pos < self.tokens.len() {
            self.resolve_token()?;
            self.pos += 1;
        }
        Ok(())
    }

    /// Run a fresh sub-resolver over `tokens`, extending `out`.
    fn resolve_stream_into(
        &mut self,
        tokens: TokenStream,
        out: ResolvedTokens,
        macro_call: Option<Rc<MacroCall>>,
        look_for_keyword: bool,
    ) -> Result<ResolvedTokens, CompileError> {
        let mut sub = Resolver {
            comp: &mut *self.comp,
            file: self.file,
            tokens,
            pos: 0,
            out,
            macro_call,
            look_for_keyword,
            count_merged_id: 0,
        };
        sub.run_loop()?;
        Ok(sub.out)
    }

    fn current_id(&self) -> TokenId {
        self.tokens
            .get(self.pos)
            .expect("resolver cursor within stream")
    }

    fn current_kind(&self) -> &TokenKind {
        self.comp.arena.kind(self.current_id())
    }

    fn current_token(&self) -> &Token {
        self.comp.arena.get(self.current_id())
    }

    /// True when the cursor sits on the final token of the stream.
    fn at_stream_end(&self) -> bool {
        self.pos + 1 >= self.tokens.len()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn resolve_token(&mut self) -> Result<(), CompileError> {
        let id = self.current_id();
        match self.comp.arena.kind(id) {
            TokenKind::Identifier(_) => self.resolve_identifier(id),
            TokenKind::MacroDefined(_) => self.resolve_macro_defined(id),
            TokenKind::MacroParam { .. } => self.resolve_macro_param(id),
            TokenKind::MacroParamVariadic => self.resolve_macro_param_variadic(id),
            TokenKind::PreprocessorDefine(_) => self.resolve_preprocessor_define(id),
            TokenKind::PreprocessorIf(_)
            | TokenKind::PreprocessorIfdef(_)
            | TokenKind::PreprocessorIfndef(_) => self.resolve_preprocessor_conditional(id),
            TokenKind::PreprocessorInclude(_) => self.resolve_preprocessor_include(id),
            TokenKind::PreprocessorUndef(_) => self.resolve_preprocessor_undef(id),
            TokenKind::PreprocessorError(_) => self.resolve_preprocessor_error(id),
            TokenKind::PreprocessorWarning(_) => self.resolve_preprocessor_warning(id),
            TokenKind::PreprocessorEmbed(_) => Err(CompileError::Unsupported {
                what: "`#embed`",
                location: self.comp.arena.get(id).location,
            }),
            TokenKind::PreprocessorLine(_) => Err(CompileError::Unsupported {
                what: "`#line`",
                location: self.comp.arena.get(id).location,
            }),
            TokenKind::PreprocessorPragma(_) => Err(CompileError::Unsupported {
                what: "`#pragma`",
                location: self.comp.arena.get(id).location,
            }),
            TokenKind::Predefined(macro_) => Err(CompileError::Unsupported {
                what: match macro_ {
                    crate::token::PredefinedMacro::Date => "`__DATE__`",
                    crate::token::PredefinedMacro::File => "`__FILE__`",
                    crate::token::PredefinedMacro::HasFeature => "`__has_feature`",
                    crate::token::PredefinedMacro::Line => "`__LINE__`",
                    crate::token::PredefinedMacro::Stdc => "`__STDC__`",
                    crate::token::PredefinedMacro::StdcHosted => "`__STDC_HOSTED__`",
                    crate::token::PredefinedMacro::StdcVersion => "`__STDC_VERSION__`",
                    crate::token::PredefinedMacro::Time => "`__TIME__`",
                },
                location: self.comp.arena.get(id).location,
            }),
            TokenKind::Hash => self.resolve_stringification(),
            TokenKind::HashHash => self.resolve_merged_id(),
            // Consumed only through conditional-group handling; contribute
            // nothing on their own.
            TokenKind::Eot(_)
            | TokenKind::PreprocessorElif(_)
            | TokenKind::PreprocessorElifdef(_)
            | TokenKind::PreprocessorElifndef(_)
            | TokenKind::PreprocessorElse(_) => Ok(()),
            _ => {
                self.out.push(id);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Identifiers and macro calls
    // ------------------------------------------------------------------

    fn resolve_identifier(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::Identifier(name) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on identifier");
        };

        if self.look_for_keyword
            && let Some(keyword) = Keyword::from_ident(name)
        {
            let location = self.comp.arena.get(id).location;
            let keyword_id = self
                .comp
                .arena
                .alloc(Token::new(TokenKind::Keyword(keyword), location));
            self.out.push(keyword_id);
            return Ok(());
        }

        if let Some(record) = self.comp.get_define(self.file, name) {
            let TokenKind::PreprocessorDefine(define) = self.comp.arena.kind(record.token).clone()
            else {
                unreachable!("define records point at define tokens");
            };
            return self.resolve_macro_call(id, &define);
        }

        self.out.push(id);
        Ok(())
    }

    fn resolve_macro_call(
        &mut self,
        identifier: TokenId,
        define: &PreprocessorDefine,
    ) -> Result<(), CompileError> {
        let location = self.comp.arena.get(identifier).location;

        if self.at_stream_end() {
            return Err(CompileError::Expected {
                what: "at least an end-of-file token after the macro name",
                location,
            });
        }

        let next_kind = self.comp.arena.kind(
            self.tokens
                .get(self.pos + 1)
                .expect("peeked within stream"),
        );

        let macro_call = if matches!(next_kind, TokenKind::LParen) {
            self.pos += 1; // skip the macro identifier
            self.parse_macro_call_params(define, location)?
        } else {
            if define.param_count() != 0 {
                return Err(CompileError::MacroArity {
                    name: define.name.clone(),
                    expected: define.param_count(),
                    location,
                });
            }
            MacroCall::Empty
        };

        let body_out = self.resolve_stream_into(
            define.body.clone(),
            ResolvedTokens::new(),
            Some(Rc::new(macro_call)),
            false,
        )?;
        self.out.merge(&body_out);
        Ok(())
    }

    /// Parse a parenthesized argument list. On entry the cursor sits on the
    /// macro identifier's `(`; on success it is left on the closing `)`.
    fn parse_macro_call_params(
        &mut self,
        define: &PreprocessorDefine,
        call_location: crate::location::Location,
    ) -> Result<MacroCall, CompileError> {
        let variadic_index = define.variadic_param_index();
        let params_len = define.param_count();

        self.pos += 1; // skip `(`

        let mut params = MacroCallParams::new();
        let mut count: usize = 0;

        while !matches!(self.current_kind(), TokenKind::RParen | TokenKind::Eof) {
            let is_variadic = variadic_index.is_some_and(|vi| count >= vi);

            if count >= params_len {
                return Err(CompileError::MacroArity {
                    name: define.name.clone(),
                    expected: params_len,
                    location: call_location,
                });
            }

            let declared = define.params.as_ref().expect("params checked non-empty");
            let is_used = if is_variadic {
                declared.last().expect("variadic param exists").is_used
            } else {
                declared[count].is_used
            };

            let param = self.parse_macro_call_param(is_variadic, is_used)?;

            if !matches!(self.current_kind(), TokenKind::RParen) {
                if !matches!(self.current_kind(), TokenKind::Comma) {
                    return Err(CompileError::Expected {
                        what: "`,` between macro arguments",
                        location: self.current_token().location,
                    });
                }
                self.pos += 1;
            }

            params.add(param);
            count += 1;
        }

        if !matches!(self.current_kind(), TokenKind::RParen) {
            return Err(CompileError::Expected {
                what: "`)` closing the macro call",
                location: self.current_token().location,
            });
        }

        if count != params_len {
            return Err(CompileError::MacroArity {
                name: define.name.clone(),
                expected: params_len,
                location: call_location,
            });
        }

        Ok(MacroCall::WithParams(params))
    }

    /// Parse one argument in a sub-resolver sharing this stream, then adopt
    /// its cursor.
    fn parse_macro_call_param(
        &mut self,
        is_variadic: bool,
        is_used: bool,
    ) -> Result<MacroCallParam, CompileError> {
        let mut sub = Resolver {
            comp: &mut *self.comp,
            file: self.file,
            tokens: self.tokens.clone(),
            pos: self.pos,
            out: ResolvedTokens::new(),
            macro_call: self.macro_call.clone(),
            look_for_keyword: false,
            count_merged_id: 0,
        };
        let result = sub.parse_tokens_in_macro_call_param(is_variadic, is_used);
        self.pos = sub.pos;
        let out = sub.out;
        result?;
        Ok(MacroCallParam::new(out))
    }

    /// A non-variadic argument stops before a top-level comma or the closing
    /// parenthesis; a variadic argument stops only before the closing
    /// parenthesis.
    fn parse_tokens_in_macro_call_param(
        &mut self,
        is_variadic: bool,
        is_used: bool,
    ) -> Result<(), CompileError> {
        loop {
            let kind = self.current_kind();
            if matches!(kind, TokenKind::RParen | TokenKind::Eof)
                || (matches!(kind, TokenKind::Comma) && !is_variadic)
            {
                return Ok(());
            }

            let opener = match kind {
                TokenKind::LParen => Some(TokenKind::RParen),
                TokenKind::LBrace => Some(TokenKind::RBrace),
                TokenKind::LBracket => Some(TokenKind::RBracket),
                _ => None,
            };

            self.resolve_or_keep_raw(is_used)?;

            match opener {
                Some(closing) => self.parse_macro_call_target(closing, is_used)?,
                None => self.pos += 1,
            }
        }
    }

    /// Consume a balanced `(...)`, `{...}` or `[...]` group. The opener has
    /// already been handled; the cursor is advanced past the matching
    /// closer.
    fn parse_macro_call_target(
        &mut self,
        closing: TokenKind,
        is_used: bool,
    ) -> Result<(), CompileError> {
        self.pos += 1; // past the opener

        loop {
            if matches!(self.current_kind(), TokenKind::Eof) {
                return Err(CompileError::Expected {
                    what: "a closing bracket before the end of the stream",
                    location: self.current_token().location,
                });
            }

            let kind = self.current_kind().clone();
            self.resolve_or_keep_raw(is_used)?;

            match kind {
                TokenKind::LParen => {
                    self.parse_macro_call_target(TokenKind::RParen, is_used)?;
                    continue;
                }
                TokenKind::LBrace => {
                    self.parse_macro_call_target(TokenKind::RBrace, is_used)?;
                    continue;
                }
                TokenKind::LBracket => {
                    self.parse_macro_call_target(TokenKind::RBracket, is_used)?;
                    continue;
                }
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    if kind == closing {
                        self.pos += 1;
                        return Ok(());
                    }
                    return Err(CompileError::UnexpectedClose {
                        location: self.current_token().location,
                    });
                }
                _ => {}
            }

            self.pos += 1;
        }
    }

    /// Arguments bound to used parameters are resolved; arguments bound to
    /// parameters the macro body never mentions are captured verbatim.
    fn resolve_or_keep_raw(&mut self, is_used: bool) -> Result<(), CompileError> {
        if is_used {
            self.resolve_token()
        } else {
            self.out.push(self.current_id());
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Macro-time tokens
    // ------------------------------------------------------------------

    fn resolve_macro_defined(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::MacroDefined(name) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on MacroDefined");
        };
        let is_def = self.is_macro_defined(&name.clone());
        let location = self.comp.arena.get(id).location;

        let literal = self.comp.arena.alloc(Token::new(
            TokenKind::LiteralInt(LiteralInt::new(if is_def { "1" } else { "0" }, IntSuffix::None)),
            location,
        ));
        self.out.push(literal);
        Ok(())
    }

    fn is_macro_defined(&self, name: &str) -> bool {
        self.comp.get_define(self.file, name).is_some() || is_standard_predefined_macro(name)
    }

    fn macro_call_params(
        &self,
        location: crate::location::Location,
    ) -> Result<&MacroCallParams, CompileError> {
        self.macro_call
            .as_ref()
            .and_then(|call| call.params())
            .ok_or(CompileError::MacroOperand {
                message: "macro parameter used outside of a macro expansion",
                location,
            })
    }

    fn resolve_macro_param(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::MacroParam { index } = *self.comp.arena.kind(id) else {
            unreachable!("dispatched on MacroParam");
        };
        let location = self.comp.arena.get(id).location;

        let params = self.macro_call_params(location)?;
        let content = params
            .get(index)
            .ok_or(CompileError::MacroOperand {
                message: "macro parameter index out of range",
                location,
            })?
            .resolved_content
            .clone();
        self.out.merge(&content);
        Ok(())
    }

    fn resolve_macro_param_variadic(&mut self, id: TokenId) -> Result<(), CompileError> {
        let location = self.comp.arena.get(id).location;
        let params = self.macro_call_params(location)?;
        let content = params
            .variadic()
            .ok_or(CompileError::MacroOperand {
                message: "`__VA_ARGS__` used in a call without variadic arguments",
                location,
            })?
            .resolved_content
            .clone();
        self.out.merge(&content);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    fn resolve_preprocessor_define(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::PreprocessorDefine(define) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on define");
        };
        let name = define.name.clone();
        let record = DefineRecord {
            token: id,
            file: self.file,
        };
        if self.comp.add_define(self.file, name, record) {
            // TODO: diagnose a redefinition whose body differs from the
            // first definition.
        }
        Ok(())
    }

    fn resolve_preprocessor_undef(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::PreprocessorUndef(name) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on undef");
        };
        let name = name.clone();
        self.comp.undef_define(self.file, &name);
        Ok(())
    }

    fn resolve_preprocessor_error(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::PreprocessorError(message) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on error directive");
        };
        let message = message.clone();
        let location = self.comp.arena.get(id).location;
        self.comp.sink.error(message, Some(location));
        Ok(())
    }

    fn resolve_preprocessor_warning(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::PreprocessorWarning(message) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on warning directive");
        };
        let message = message.clone();
        let location = self.comp.arena.get(id).location;
        self.comp.sink.warning(message, Some(location));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    fn resolve_preprocessor_conditional(&mut self, id: TokenId) -> Result<(), CompileError> {
        match self.comp.arena.kind(id).clone() {
            TokenKind::PreprocessorIf(PreprocessorIf { cond, content }) => {
                self.resolve_preprocessor_if(&cond, true, &content)
            }
            TokenKind::PreprocessorElif(PreprocessorIf { cond, content }) => {
                self.resolve_preprocessor_if(&cond, false, &content)
            }
            TokenKind::PreprocessorIfdef(PreprocessorIfdef {
                identifier,
                content,
            }) => self.resolve_preprocessor_ifdef(&identifier, true, &content, false),
            TokenKind::PreprocessorIfndef(PreprocessorIfdef {
                identifier,
                content,
            }) => self.resolve_preprocessor_ifdef(&identifier, true, &content, true),
            TokenKind::PreprocessorElifdef(PreprocessorIfdef {
                identifier,
                content,
            }) => self.resolve_preprocessor_ifdef(&identifier, false, &content, false),
            TokenKind::PreprocessorElifndef(PreprocessorIfdef {
                identifier,
                content,
            }) => self.resolve_preprocessor_ifdef(&identifier, false, &content, true),
            TokenKind::PreprocessorElse(else_) => self.resolve_branch_content(&else_.content),
            _ => Ok(()),
        }
    }

    fn resolve_branch_content(&mut self, content: &TokenStream) -> Result<(), CompileError> {
        let out = std::mem::take(&mut self.out);
        let result = self.resolve_stream_into(content.clone(), out, None, false);
        match result {
            Ok(out) => {
                self.out = out;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_preprocessor_if(
        &mut self,
        cond: &TokenStream,
        is_if_branch: bool,
        content: &TokenStream,
    ) -> Result<(), CompileError> {
        let resolved_cond =
            self.resolve_stream_into(cond.clone(), ResolvedTokens::new(), None, false)?;
        let location = cond
            .first()
            .map(|id| self.comp.arena.get(id).location)
            .unwrap_or_else(|| crate::location::Location::builtin(self.file));
        let cond_res = expr::is_true(&self.comp.arena, &resolved_cond, location)?;

        if cond_res {
            return self.resolve_branch_content(content);
        }

        self.resolve_next_conditional_preprocessor(content, is_if_branch)
    }

    fn resolve_preprocessor_ifdef(
        &mut self,
        identifier: &str,
        is_if_branch: bool,
        content: &TokenStream,
        reverse: bool,
    ) -> Result<(), CompileError> {
        let is_def = self.is_macro_defined(identifier);

        if is_def != reverse {
            return self.resolve_branch_content(content);
        }

        self.resolve_next_conditional_preprocessor(content, is_if_branch)
    }

    /// The taken branch was false: advance to the next sibling conditional
    /// of the same group and recurse. Nested conditional groups are single
    /// tokens, so the scan treats them as opaque units; it terminates at the
    /// group's end-of-token sentinel.
    fn resolve_next_conditional_preprocessor(
        &mut self,
        content: &TokenStream,
        is_if_branch: bool,
    ) -> Result<(), CompileError> {
        if is_if_branch {
            let mut sub = Resolver {
                comp: &mut *self.comp,
                file: self.file,
                tokens: content.clone(),
                pos: 0,
                out: std::mem::take(&mut self.out),
                macro_call: None,
                look_for_keyword: false,
                count_merged_id: 0,
            };
            sub.next_conditional_preprocessor();
            let result = if sub.pos < sub.tokens.len() && !sub.at_stream_end() {
                let current = sub.current_id();
                sub.resolve_preprocessor_conditional(current)
            } else {
                Ok(())
            };
            self.out = sub.out;
            result
        } else {
            self.pos += 1;
            self.next_conditional_preprocessor();
            if self.pos < self.tokens.len() && !self.at_stream_end() {
                let current = self.current_id();
                return self.resolve_preprocessor_conditional(current);
            }
            Ok(())
        }
    }

    fn next_conditional_preprocessor(&mut self) {
        while self.pos < self.tokens.len() {
            let kind = self.current_kind();
            if matches!(kind, TokenKind::Eot(_)) {
                return;
            }
            if kind.is_conditional_preprocessor() && !kind.opens_conditional_group() {
                return;
            }
            self.pos += 1;
        }
    }

    // ------------------------------------------------------------------
    // Includes
    // ------------------------------------------------------------------

    fn resolve_preprocessor_include(&mut self, id: TokenId) -> Result<(), CompileError> {
        let TokenKind::PreprocessorInclude(include) = self.comp.arena.kind(id) else {
            unreachable!("dispatched on include");
        };
        let path = include.path.clone();
        let location = self.comp.arena.get(id).location;

        let include_dirs = self.comp.include_dirs.clone();
        for dir in &include_dirs {
            if self.load_include(dir, &path, IncludeKind::System)? {
                return Ok(());
            }
        }

        // Fall back to the directory of the file containing the directive.
        let including_dir = self
            .comp
            .file(location.file)
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if self.load_include(&including_dir, &path, IncludeKind::Local)? {
            return Ok(());
        }

        Err(CompileError::IncludeNotFound { path, location })
    }

    fn load_include(
        &mut self,
        dir: &Path,
        include_path: &str,
        kind: IncludeKind,
    ) -> Result<bool, CompileError> {
        let full_path = dir.join(include_path);
        if !full_path.is_file() {
            return Ok(false);
        }

        let header = self.comp.add_or_get_header(&full_path, self.file)?;
        self.comp.record_include(self.file, full_path, kind);

        // The header's stream is resolved in this resolver's context: its
        // defines land in the including file's table and its tokens splice
        // in at the directive.
        let header_stream = self.comp.file(header).stream.clone();
        let out = std::mem::take(&mut self.out);
        let result = self.resolve_stream_into(header_stream, out, None, false);
        match result {
            Ok(out) => {
                self.out = out;
                self.out.pop_if_trailing_eof(&self.comp.arena);
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Stringification
    // ------------------------------------------------------------------

    fn resolve_stringification(&mut self) -> Result<(), CompileError> {
        let hash_location = self.current_token().location;

        if self.at_stream_end() {
            return Err(CompileError::MacroOperand {
                message: "`#` must be followed by a macro parameter",
                location: hash_location,
            });
        }

        let operand = self
            .tokens
            .get(self.pos + 1)
            .expect("peeked within stream");
        let content = match self.comp.arena.kind(operand) {
            TokenKind::MacroParam { index } => {
                let index = *index;
                let params = self.macro_call_params(hash_location)?;
                params
                    .get(index)
                    .ok_or(CompileError::MacroOperand {
                        message: "macro parameter index out of range",
                        location: hash_location,
                    })?
                    .resolved_content
                    .clone()
            }
            TokenKind::MacroParamVariadic => {
                let params = self.macro_call_params(hash_location)?;
                params
                    .variadic()
                    .ok_or(CompileError::MacroOperand {
                        message: "`__VA_ARGS__` used in a call without variadic arguments",
                        location: hash_location,
                    })?
                    .resolved_content
                    .clone()
            }
            _ => {
                return Err(CompileError::MacroOperand {
                    message: "`#` must be followed by a macro parameter",
                    location: hash_location,
                });
            }
        };

        let string_id = self.perform_stringification(&content, hash_location);
        self.out.push(string_id);
        self.pos += 1; // skip `#`; the driver then steps past the parameter
        Ok(())
    }

    /// Join the printable form of every token with single spaces and wrap
    /// the result in a string literal spanning the operand.
    fn perform_stringification(
        &mut self,
        content: &ResolvedTokens,
        fallback: crate::location::Location,
    ) -> TokenId {
        let mut parts: Vec<String> = Vec::new();
        for id in content.iter() {
            if let Some(part) = self.comp.arena.get(id).printable() {
                parts.push(part);
            }
        }

        let location = match (content.get(0), content.last()) {
            (Some(first), Some(last)) => {
                let start = self.comp.arena.get(first).location;
                let end = self.comp.arena.get(last).location;
                start.span_to(&end)
            }
            _ => fallback,
        };

        self.comp.arena.alloc(Token::new(
            TokenKind::LiteralString(parts.join(" ")),
            location,
        ))
    }

    // ------------------------------------------------------------------
    // Token pasting
    // ------------------------------------------------------------------

    fn merged_lhs_content(&self, id: TokenId) -> Result<String, CompileError> {
        let token = self.comp.arena.get(id);
        match &token.kind {
            TokenKind::Identifier(name) => Ok(name.clone()),
            TokenKind::LiteralInt(lit)
            | TokenKind::LiteralOctal(lit)
            | TokenKind::LiteralHex(lit)
            | TokenKind::LiteralBin(lit) => Ok(lit.value.clone()),
            TokenKind::LiteralFloat(lit) => Ok(lit.value.clone()),
            _ => Err(CompileError::MacroOperand {
                message: "this token cannot be the left operand of `##`",
                location: token.location,
            }),
        }
    }

    fn merged_rhs_content(&self, id: TokenId) -> Result<String, CompileError> {
        let token = self.comp.arena.get(id);
        match &token.kind {
            TokenKind::Identifier(name) => Ok(name.clone()),
            TokenKind::LiteralInt(lit) => Ok(lit.value.clone()),
            _ => Err(CompileError::MacroOperand {
                message: "this token cannot be the right operand of `##`",
                location: token.location,
            }),
        }
    }

    /// Build the merged token, preserving the kind of the left operand.
    fn perform_merged_id(
        &mut self,
        lhs: TokenId,
        merged: String,
        location: crate::location::Location,
    ) -> TokenId {
        let kind = match self.comp.arena.kind(lhs) {
            TokenKind::Identifier(_) => TokenKind::Identifier(merged),
            TokenKind::LiteralInt(_) => {
                TokenKind::LiteralInt(LiteralInt::new(merged, IntSuffix::None))
            }
            TokenKind::LiteralOctal(_) => {
                TokenKind::LiteralOctal(LiteralInt::new(merged, IntSuffix::None))
            }
            TokenKind::LiteralHex(_) => {
                TokenKind::LiteralHex(LiteralInt::new(merged, IntSuffix::None))
            }
            TokenKind::LiteralBin(_) => {
                TokenKind::LiteralBin(LiteralInt::new(merged, IntSuffix::None))
            }
            TokenKind::LiteralFloat(_) => TokenKind::LiteralFloat(LiteralFloat {
                value: merged,
                suffix: crate::token::FloatSuffix::None,
            }),
            _ => unreachable!("operand kinds checked before merging"),
        };
        self.comp.arena.alloc(Token::new(kind, location))
    }

    fn resolve_merged_id(&mut self) -> Result<(), CompileError> {
        let hash_hash_location = self.current_token().location;

        if self.out.count() == 0 {
            return Err(CompileError::MacroOperand {
                message: "`##` has no left operand",
                location: hash_hash_location,
            });
        }

        let last_token_index = self.out.count() - 1;
        self.count_merged_id += 1;

        self.pos += 1; // past `##`
        if self.pos >= self.tokens.len() {
            return Err(CompileError::MacroOperand {
                message: "expected a right operand for `##`",
                location: hash_hash_location,
            });
        }
        self.resolve_token()?;

        let lhs = self.out.get(last_token_index).expect("lhs still in buffer");
        if last_token_index + 1 >= self.out.count() {
            return Err(CompileError::MacroOperand {
                message: "expected a right operand for `##`",
                location: hash_hash_location,
            });
        }
        let rhs = self
            .out
            .get(last_token_index + 1)
            .expect("rhs bounds checked");

        let lhs_content = self.merged_lhs_content(lhs)?;
        let rhs_content = self.merged_rhs_content(rhs)?;
        let location = self
            .comp
            .arena
            .get(lhs)
            .location
            .span_to(&self.comp.arena.get(rhs).location);

        let merged = self.perform_merged_id(lhs, format!("{}{}", lhs_content, rhs_content), location);
        self.out.replace(last_token_index, merged);
        self.out.remove(last_token_index + 1);

        self.count_merged_id -= 1;
        if self.count_merged_id == 0 {
            // Re-scan the merged token so a keyword (or a further macro)
            // can surface.
            let eof = self
                .comp
                .arena
                .alloc(Token::new(TokenKind::Eof, location.at_end()));
            let rescan_tokens: TokenStream = [merged, eof].into_iter().collect();
            let mut rescanned =
                self.resolve_stream_into(rescan_tokens, ResolvedTokens::new(), None, true)?;
            rescanned.pop_if_trailing_eof(&self.comp.arena);
            self.out.insert_after_many(&rescanned, last_token_index);
        }

        self.out.remove(last_token_index);
        Ok(())
    }
}
