//! Recursive-descent parser producing the expression AST.
//!
//! Precedence, lowest first:
//!
//! | Level | Operators |
//! |---|---|
//! | or | `or` `\|\|` |
//! | and | `and` `&&` |
//! | not | `not` `!` |
//! | comparison | `==` `!=` `<` `<=` `>` `>=` `in` `not in` (chainable) |
//! | additive | `+` `-` |
//! | multiplicative | `*` `/` `%` |
//! | unary | `-` |
//! | postfix | `[index]` `.member` `(args)` |

use super::ExpressionError;
use super::lexer::{Token, TokenKind};
use super::value::Value;

/// Bracket / parenthesis nesting allowed before parsing gives up.
const MAX_NESTING: usize = 64;

/// Binary and postfix operators allowed in one expression. Chains like
/// `a + b + c` nest left, so this bounds tree depth the way
/// [`MAX_NESTING`] does for brackets.
pub(crate) const MAX_OPERATORS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Literal(Value),
    Name(String),
    List(Vec<Node>),
    Neg(Box<Node>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Arith(ArithOp, Box<Node>, Box<Node>),
    /// `first op1 second op2 third ...`, Python-style chaining.
    Compare(Box<Node>, Vec<(CmpOp, Node)>),
    Index(Box<Node>, Box<Node>),
    Member(Box<Node>, String),
    Call(Box<Node>, Vec<Node>),
}

pub(crate) fn parse(tokens: &[Token], source_len: usize) -> Result<Node, ExpressionError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
        source_len,
    };
    if tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }
    let node = parser.or_expr()?;
    if parser.pos < tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(node)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    operators: usize,
    source_len: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ExpressionError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        let position = self
            .tokens
            .get(self.pos)
            .map_or(self.source_len, |t| t.position);
        ExpressionError::Syntax {
            position,
            message: message.into(),
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn link(&mut self) -> Result<(), ExpressionError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.error("expression has too many operators"));
        }
        Ok(())
    }

    fn or_expr(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            self.link()?;
            let right = self.and_expr()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            self.link()?;
            let right = self.not_expr()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Node, ExpressionError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let inner = self.not_expr()?;
            self.leave();
            return Ok(Node::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek()? {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::LtEq,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::GtEq,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if self.peek_at(1) == Some(&TokenKind::In) => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Node, ExpressionError> {
        let first = self.additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Node::Compare(Box::new(first), rest))
        }
    }

    fn additive(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.link()?;
            let right = self.multiplicative()?;
            left = Node::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                Some(TokenKind::Percent) => ArithOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.link()?;
            let right = self.unary()?;
            left = Node::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let inner = self.unary()?;
            self.leave();
            return Ok(Node::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.primary()?;
        loop {
            if matches!(
                self.peek(),
                Some(TokenKind::LBracket | TokenKind::Dot | TokenKind::LParen)
            ) {
                self.link()?;
            }
            match self.peek() {
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    self.enter()?;
                    let index = self.or_expr()?;
                    self.leave();
                    self.expect(&TokenKind::RBracket, "']'")?;
                    node = Node::Index(Box::new(node), Box::new(index));
                }
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    match self.advance().map(|t| t.kind.clone()) {
                        Some(TokenKind::Ident(name)) => {
                            node = Node::Member(Box::new(node), name);
                        }
                        _ => {
                            self.pos -= 1;
                            return Err(self.error("expected member name after '.'"));
                        }
                    }
                }
                Some(TokenKind::LParen) => {
                    self.pos += 1;
                    let args = self.sequence(&TokenKind::RParen, "')'")?;
                    node = Node::Call(Box::new(node), args);
                }
                _ => return Ok(node),
            }
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: &TokenKind, what: &str) -> Result<Vec<Node>, ExpressionError> {
        self.enter()?;
        let mut items = Vec::new();
        if !self.eat(close) {
            loop {
                items.push(self.or_expr()?);
                if self.eat(close) {
                    break;
                }
                self.expect(&TokenKind::Comma, &format!("',' or {what}"))?;
                if self.eat(close) {
                    break;
                }
            }
        }
        self.leave();
        Ok(items)
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        let Some(token) = self.advance() else {
            return Err(self.error("unexpected end of expression"));
        };
        let node = match token.kind.clone() {
            TokenKind::Number(n) => Node::Literal(Value::Number(n)),
            TokenKind::Str(s) => Node::Literal(Value::Str(s)),
            TokenKind::True => Node::Literal(Value::Bool(true)),
            TokenKind::False => Node::Literal(Value::Bool(false)),
            TokenKind::Null => Node::Literal(Value::Null),
            TokenKind::Ident(name) => Node::Name(name),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.or_expr()?;
                self.leave();
                self.expect(&TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBracket => Node::List(self.sequence(&TokenKind::RBracket, "']'")?),
            _ => {
                self.pos -= 1;
                return Err(self.error("expected a value"));
            }
        };
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;

    fn parse_src(src: &str) -> Result<Node, ExpressionError> {
        parse(&tokenize(src)?, src.len())
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let node = parse_src("1 + 2 * 3").expect("parse");
        let Node::Arith(ArithOp::Add, _, right) = node else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*right, Node::Arith(ArithOp::Mul, _, _)));
    }

    #[test]
    fn not_in_is_a_single_operator() {
        let node = parse_src("'x' not in titles").expect("parse");
        let Node::Compare(_, rest) = node else {
            panic!("expected comparison");
        };
        assert_eq!(rest[0].0, CmpOp::NotIn);
    }

    #[test]
    fn comparisons_chain() {
        let node = parse_src("1 < x <= 5").expect("parse");
        let Node::Compare(_, rest) = node else {
            panic!("expected comparison");
        };
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn call_with_trailing_comma() {
        let node = parse_src("has('a', 2,)").expect("parse");
        let Node::Call(_, args) = node else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn malformed_inputs_report_syntax_errors() {
        for src in ["", "inventory[", "a >=", "(1 + 2", "a b", "x.", "1 +* 2"] {
            assert!(
                matches!(parse_src(src), Err(ExpressionError::Syntax { .. })),
                "{src:?} should not parse"
            );
        }
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let sum = vec!["1"; 10_000].join(" + ");
        let conj = vec!["x"; 10_000].join(" and ");
        let lookups = format!("inventory{}", "['a']".repeat(10_000));
        for src in [format!("{sum} > 0"), conj, lookups] {
            assert!(
                matches!(parse_src(&src), Err(ExpressionError::Syntax { .. })),
                "{} chars should not parse",
                src.len()
            );
        }
        let within = vec!["1"; MAX_OPERATORS + 1].join(" + ");
        assert!(parse_src(&within).is_ok());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let src = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(parse_src(&src).is_err());
    }
}
