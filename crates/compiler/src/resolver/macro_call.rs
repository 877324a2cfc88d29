//! The invocation environment of a currently-expanding macro.
//!
//! Each actual argument is resolved once, up front, into its own
//! `ResolvedTokens` buffer; `MacroParam` tokens in the macro body splice the
//! corresponding buffer into the output. The whole environment is shared
//! behind an `Rc` so the sub-resolvers parsing nested arguments see the
//! active invocation.

use crate::stream::ResolvedTokens;

/// One already-resolved actual argument.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCallParam {
    pub resolved_content: ResolvedTokens,
}

impl MacroCallParam {
    pub fn new(resolved_content: ResolvedTokens) -> Self {
        MacroCallParam { resolved_content }
    }
}

/// The ordered arguments of one macro invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroCallParams {
    params: Vec<MacroCallParam>,
}

impl MacroCallParams {
    pub fn new() -> Self {
        MacroCallParams::default()
    }

    pub fn add(&mut self, param: MacroCallParam) {
        self.params.push(param);
    }

    pub fn get(&self, index: usize) -> Option<&MacroCallParam> {
        self.params.get(index)
    }

    /// The variadic argument: everything captured after the last named
    /// parameter.
    pub fn variadic(&self) -> Option<&MacroCallParam> {
        self.params.last()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A bound macro invocation: either a zero-argument invocation without
/// parentheses, or a parsed argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroCall {
    Empty,
    WithParams(MacroCallParams),
}

impl MacroCall {
    pub fn params(&self) -> Option<&MacroCallParams> {
        match self {
            MacroCall::Empty => None,
            MacroCall::WithParams(params) => Some(params),
        }
    }
}
