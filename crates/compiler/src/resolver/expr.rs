//! Constant-expression evaluation for `#if` and `#elif`.
//!
//! The condition's tokens are resolved first, so macros and `defined(X)`
//! probes have already reduced to primary forms by the time this parser
//! runs. What remains is parsed into a small expression tree and evaluated
//! over `i64`; the branch is taken iff the result is non-zero.
//!
//! Identifiers that survive macro expansion evaluate to 0, as C requires.
//! Exactly one top-level expression is permitted.

use crate::error::CompileError;
use crate::location::Location;
use crate::stream::{ResolvedTokens, TokenArena, TokenId};
use crate::token::{Keyword, TokenKind};

/// Parsed form of a `#if` condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    Int(i64),
    Unary {
        op: UnaryOp,
        expr: Box<ConstExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ConstExpr>,
        right: Box<ConstExpr>,
    },
    Ternary {
        cond: Box<ConstExpr>,
        if_: Box<ConstExpr>,
        else_: Box<ConstExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    /// Binding power; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }

    fn from_kind(kind: &TokenKind) -> Option<BinaryOp> {
        let op = match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::LtLt => BinaryOp::Shl,
            TokenKind::GtGt => BinaryOp::Shr,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::Ge,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::BangEq => BinaryOp::Ne,
            TokenKind::Amp => BinaryOp::BitAnd,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::AmpAmp => BinaryOp::And,
            TokenKind::PipePipe => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }
}

/// Parse and evaluate a resolved condition. `location` anchors diagnostics
/// for conditions that resolved to nothing at all.
pub fn evaluate(
    arena: &TokenArena,
    tokens: &ResolvedTokens,
    location: Location,
) -> Result<i64, CompileError> {
    let mut parser = CondParser {
        arena,
        tokens,
        pos: 0,
        location,
    };
    let expr = parser.parse_ternary()?;
    if !parser.at_end() {
        return Err(parser.error("expected only one expression"));
    }
    eval(&expr, location)
}

/// Convenience wrapper: true iff the condition evaluates non-zero.
pub fn is_true(
    arena: &TokenArena,
    tokens: &ResolvedTokens,
    location: Location,
) -> Result<bool, CompileError> {
    Ok(evaluate(arena, tokens, location)? != 0)
}

struct CondParser<'a> {
    arena: &'a TokenArena,
    tokens: &'a ResolvedTokens,
    pos: usize,
    location: Location,
}

impl<'a> CondParser<'a> {
    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::ConstExpr {
            message: message.into(),
            location: self.current_location(),
        }
    }

    fn current_location(&self) -> Location {
        self.current_id()
            .map(|id| self.arena.get(id).location)
            .unwrap_or(self.location)
    }

    fn current_id(&self) -> Option<TokenId> {
        self.tokens.get(self.pos)
    }

    fn current_kind(&self) -> Option<&TokenKind> {
        self.current_id().map(|id| self.arena.kind(id))
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        match self.current_kind() {
            None => true,
            Some(TokenKind::Eot(_)) | Some(TokenKind::Eof) => {
                self.tokens.get(self.pos + 1).is_none()
            }
            _ => false,
        }
    }

    fn parse_ternary(&mut self) -> Result<ConstExpr, CompileError> {
        let cond = self.parse_binary(0)?;

        if matches!(self.current_kind(), Some(TokenKind::Question)) {
            self.advance();
            let if_ = self.parse_ternary()?;
            if !matches!(self.current_kind(), Some(TokenKind::Colon)) {
                return Err(self.error("expected `:`"));
            }
            self.advance();
            let else_ = self.parse_ternary()?;
            return Ok(ConstExpr::Ternary {
                cond: Box::new(cond),
                if_: Box::new(if_),
                else_: Box::new(else_),
            });
        }

        Ok(cond)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<ConstExpr, CompileError> {
        let mut left = self.parse_unary()?;

        while let Some(kind) = self.current_kind() {
            let Some(op) = BinaryOp::from_kind(kind) else {
                break;
            };
            let precedence = op.precedence();
            if precedence <= min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence)?;
            left = ConstExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ConstExpr, CompileError> {
        let op = match self.current_kind() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Plus) => Some(UnaryOp::Pos),
            Some(TokenKind::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(ConstExpr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ConstExpr, CompileError> {
        let Some(kind) = self.current_kind() else {
            return Err(self.error("expected an expression"));
        };

        let expr = match kind {
            TokenKind::LiteralInt(lit) => ConstExpr::Int(self.parse_int(&lit.value, 10)?),
            TokenKind::LiteralOctal(lit) => ConstExpr::Int(self.parse_int(&lit.value, 8)?),
            TokenKind::LiteralHex(lit) => ConstExpr::Int(self.parse_int(&lit.value, 16)?),
            TokenKind::LiteralBin(lit) => ConstExpr::Int(self.parse_int(&lit.value, 2)?),
            TokenKind::LiteralChar(c) => ConstExpr::Int(*c as i64),
            TokenKind::Keyword(Keyword::True) => ConstExpr::Int(1),
            TokenKind::Keyword(Keyword::False) => ConstExpr::Int(0),
            // An identifier that survived macro expansion is not a macro:
            // it evaluates to 0.
            TokenKind::Identifier(_) => ConstExpr::Int(0),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_ternary()?;
                if !matches!(self.current_kind(), Some(TokenKind::RParen)) {
                    return Err(self.error("expected `)`"));
                }
                self.advance();
                return Ok(inner);
            }
            other => {
                return Err(self.error(format!("unexpected token {:?}", other)));
            }
        };

        self.advance();
        Ok(expr)
    }

    fn parse_int(&self, value: &str, radix: u32) -> Result<i64, CompileError> {
        u64::from_str_radix(value, radix)
            .map(|v| v as i64)
            .map_err(|_| self.error(format!("integer literal `{}` is out of range", value)))
    }
}

fn eval(expr: &ConstExpr, location: Location) -> Result<i64, CompileError> {
    let err = |message: &str| CompileError::ConstExpr {
        message: message.to_string(),
        location,
    };

    match expr {
        ConstExpr::Int(v) => Ok(*v),
        ConstExpr::Unary { op, expr } => {
            let v = eval(expr, location)?;
            Ok(match op {
                UnaryOp::Not => (v == 0) as i64,
                UnaryOp::Neg => v.wrapping_neg(),
                UnaryOp::Pos => v,
                UnaryOp::BitNot => !v,
            })
        }
        ConstExpr::Binary { op, left, right } => {
            let l = eval(left, location)?;

            // && and || short-circuit so a dead operand never faults.
            match op {
                BinaryOp::And => {
                    if l == 0 {
                        return Ok(0);
                    }
                    return Ok((eval(right, location)? != 0) as i64);
                }
                BinaryOp::Or => {
                    if l != 0 {
                        return Ok(1);
                    }
                    return Ok((eval(right, location)? != 0) as i64);
                }
                _ => {}
            }

            let r = eval(right, location)?;
            Ok(match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(err("division by zero"));
                    }
                    l.wrapping_div(r)
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        return Err(err("remainder by zero"));
                    }
                    l.wrapping_rem(r)
                }
                BinaryOp::Shl => {
                    if !(0..64).contains(&r) {
                        return Err(err("shift amount out of range"));
                    }
                    l.wrapping_shl(r as u32)
                }
                BinaryOp::Shr => {
                    if !(0..64).contains(&r) {
                        return Err(err("shift amount out of range"));
                    }
                    l.wrapping_shr(r as u32)
                }
                BinaryOp::Lt => (l < r) as i64,
                BinaryOp::Le => (l <= r) as i64,
                BinaryOp::Gt => (l > r) as i64,
                BinaryOp::Ge => (l >= r) as i64,
                BinaryOp::Eq => (l == r) as i64,
                BinaryOp::Ne => (l != r) as i64,
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitXor => l ^ r,
                BinaryOp::BitOr => l | r,
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            })
        }
        ConstExpr::Ternary { cond, if_, else_ } => {
            if eval(cond, location)? != 0 {
                eval(if_, location)
            } else {
                eval(else_, location)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FileId;
    use crate::token::{IntSuffix, LiteralInt, Token};

    fn build(kinds: Vec<TokenKind>) -> (TokenArena, ResolvedTokens) {
        let mut arena = TokenArena::new();
        let mut tokens = ResolvedTokens::new();
        let loc = Location::builtin(FileId::PREDEFINED);
        for kind in kinds {
            tokens.push(arena.alloc(Token::new(kind, loc)));
        }
        (arena, tokens)
    }

    fn int(value: &str) -> TokenKind {
        TokenKind::LiteralInt(LiteralInt::new(value, IntSuffix::None))
    }

    fn eval_kinds(kinds: Vec<TokenKind>) -> Result<i64, CompileError> {
        let (arena, tokens) = build(kinds);
        evaluate(&arena, &tokens, Location::builtin(FileId::PREDEFINED))
    }

    #[test]
    fn test_arithmetic_precedence() {
        // 1 + 2 * 3 == 7
        let result = eval_kinds(vec![
            int("1"),
            TokenKind::Plus,
            int("2"),
            TokenKind::Star,
            int("3"),
        ])
        .unwrap();
        assert_eq!(result, 7);
    }

    #[test]
    fn test_comparison_and_logic() {
        // 1 + 1 == 2 -> 1
        let result = eval_kinds(vec![
            int("1"),
            TokenKind::Plus,
            int("1"),
            TokenKind::EqEq,
            int("2"),
        ])
        .unwrap();
        assert_eq!(result, 1);

        // 0 || 2 -> 1 (normalized)
        let result = eval_kinds(vec![int("0"), TokenKind::PipePipe, int("2")]).unwrap();
        assert_eq!(result, 1);
    }

    #[test]
    fn test_unary_operators() {
        let result = eval_kinds(vec![TokenKind::Bang, int("0")]).unwrap();
        assert_eq!(result, 1);

        let result = eval_kinds(vec![TokenKind::Minus, int("5")]).unwrap();
        assert_eq!(result, -5);

        let result = eval_kinds(vec![TokenKind::Tilde, int("0")]).unwrap();
        assert_eq!(result, -1);
    }

    #[test]
    fn test_parenthesized_grouping() {
        // (1 + 2) * 3 == 9
        let result = eval_kinds(vec![
            TokenKind::LParen,
            int("1"),
            TokenKind::Plus,
            int("2"),
            TokenKind::RParen,
            TokenKind::Star,
            int("3"),
        ])
        .unwrap();
        assert_eq!(result, 9);
    }

    #[test]
    fn test_ternary() {
        // 0 ? 10 : 20
        let result = eval_kinds(vec![
            int("0"),
            TokenKind::Question,
            int("10"),
            TokenKind::Colon,
            int("20"),
        ])
        .unwrap();
        assert_eq!(result, 20);
    }

    #[test]
    fn test_bases() {
        assert_eq!(
            eval_kinds(vec![TokenKind::LiteralHex(LiteralInt::new(
                "ff",
                IntSuffix::None
            ))])
            .unwrap(),
            255
        );
        assert_eq!(
            eval_kinds(vec![TokenKind::LiteralOctal(LiteralInt::new(
                "17",
                IntSuffix::None
            ))])
            .unwrap(),
            15
        );
        assert_eq!(
            eval_kinds(vec![TokenKind::LiteralBin(LiteralInt::new(
                "101",
                IntSuffix::None
            ))])
            .unwrap(),
            5
        );
    }

    #[test]
    fn test_identifiers_evaluate_to_zero() {
        let result = eval_kinds(vec![TokenKind::Identifier("UNDEFINED".to_string())]).unwrap();
        assert_eq!(result, 0);
    }

    #[test]
    fn test_short_circuit_protects_dead_operand() {
        // 0 && 1/0 -> 0 without a division fault
        let result = eval_kinds(vec![
            int("0"),
            TokenKind::AmpAmp,
            int("1"),
            TokenKind::Slash,
            int("0"),
        ])
        .unwrap();
        assert_eq!(result, 0);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let err = eval_kinds(vec![int("1"), TokenKind::Slash, int("0")]).unwrap_err();
        assert!(matches!(err, CompileError::ConstExpr { .. }));
    }

    #[test]
    fn test_trailing_tokens_are_fatal() {
        let err = eval_kinds(vec![int("1"), int("2")]).unwrap_err();
        assert!(matches!(err, CompileError::ConstExpr { .. }));
    }

    #[test]
    fn test_empty_condition_is_fatal() {
        let err = eval_kinds(vec![]).unwrap_err();
        assert!(matches!(err, CompileError::ConstExpr { .. }));
    }
}
