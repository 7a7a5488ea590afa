//! Recursive-descent parser producing the expression tree.
//!
//! Precedence, lowest first:
//!
//! | level | operators                  | associativity |
//! |-------|----------------------------|---------------|
//! | 1     | `?:`                       | right         |
//! | 2     | `\|\|`                     | left          |
//! | 3     | `&&`                       | left          |
//! | 4     | `== != < <= > >=`          | left          |
//! | 5     | `+ -`                      | left          |
//! | 6     | `* / mlt dv`               | left          |
//! | 7     | unary `- + !`              | prefix        |
//! | 8     | `^ pw`                     | right         |

use crate::core::error::{ExpressionError, ExpressionResult};
use crate::expr::evaluator::CellId;
use crate::expr::functions::{self, Function};
use crate::expr::lexer::{tokenize, Token, TokenKind};
use crate::expr::ops::{BinaryOp, UnaryOp};
use crate::expr::value::Value;

/// Node of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable {
        name: String,
        cell: Option<CellId>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    MatrixLiteral {
        rows: Vec<Vec<Expr>>,
    },
}

impl Expr {
    /// Visit every node depth-first.
    pub fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Variable { .. } => {}
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk(visit);
                then_branch.walk(visit);
                else_branch.walk(visit);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.walk(visit)),
            Expr::MatrixLiteral { rows } => rows.iter().flatten().for_each(|e| e.walk(visit)),
        }
    }

    /// Visit every node depth-first, mutably.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Variable { .. } => {}
            Expr::Unary { operand, .. } => operand.walk_mut(visit),
            Expr::Binary { left, right, .. } => {
                left.walk_mut(visit);
                right.walk_mut(visit);
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk_mut(visit);
                then_branch.walk_mut(visit);
                else_branch.walk_mut(visit);
            }
            Expr::Call { args, .. } => args.iter_mut().for_each(|a| a.walk_mut(visit)),
            Expr::MatrixLiteral { rows } => rows.iter_mut().flatten().for_each(|e| e.walk_mut(visit)),
        }
    }
}

/// Built-in constants, substituted at parse time.
fn constant(name: &str) -> Option<Value> {
    match name {
        "_pi" => Some(Value::Float(std::f64::consts::PI)),
        "_e" => Some(Value::Float(std::f64::consts::E)),
        _ => None,
    }
}

/// Parse `source` into an expression tree.
pub fn parse(source: &str) -> ExpressionResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    if parser.peek() == &TokenKind::End {
        return Err(ExpressionError::Parse {
            position: 0,
            message: "empty expression".to_string(),
        });
    }
    let expr = parser.ternary()?;
    parser.expect(TokenKind::End)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].position
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ExpressionResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", kind.describe(), self.peek().describe())))
        }
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError::Parse {
            position: self.position(),
            message,
        }
    }

    /// Identifier-spelled operator (`mlt`, `dv`, `pw`) at the cursor.
    fn word_operator(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Identifier(name) if name == word)
    }

    fn ternary(&mut self) -> ExpressionResult<Expr> {
        let condition = self.logical_or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_branch = self.ternary()?;
        self.expect(TokenKind::Colon)?;
        let else_branch = self.ternary()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn logical_or(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.logical_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.logical_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.comparison()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.comparison()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ if self.word_operator("mlt") => BinaryOp::ElemMul,
                _ if self.word_operator("dv") => BinaryOp::ElemDiv,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> ExpressionResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> ExpressionResult<Expr> {
        let base = self.primary()?;
        let op = match self.peek() {
            TokenKind::Caret => BinaryOp::Pow,
            _ if self.word_operator("pw") => BinaryOp::ElemPow,
            _ => return Ok(base),
        };
        self.advance();
        // Right associative; the exponent may carry its own sign
        let exponent = self.unary()?;
        Ok(binary(op, base, exponent))
    }

    fn primary(&mut self) -> ExpressionResult<Expr> {
        let position = self.position();
        match self.advance() {
            TokenKind::Integer(i) => Ok(Expr::Literal(Value::Integer(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            TokenKind::LeftParen => {
                let inner = self.ternary()?;
                self.expect(TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBrace => self.matrix_literal(),
            TokenKind::Identifier(name) => {
                if self.peek() == &TokenKind::LeftParen {
                    self.advance();
                    self.call(name, position)
                } else if let Some(value) = constant(&name) {
                    Ok(Expr::Literal(value))
                } else {
                    Ok(Expr::Variable { name, cell: None })
                }
            }
            other => Err(ExpressionError::Parse {
                position,
                message: format!("unexpected {}", other.describe()),
            }),
        }
    }

    fn call(&mut self, name: String, position: usize) -> ExpressionResult<Expr> {
        let function = functions::lookup(&name).ok_or(ExpressionError::UnknownFunction { name })?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RightParen) {
            loop {
                args.push(self.ternary()?);
                if self.eat(&TokenKind::RightParen) {
                    break;
                }
                if !self.eat(&TokenKind::Comma) {
                    return Err(ExpressionError::Parse {
                        position,
                        message: format!("unterminated call to '{}'", function.name()),
                    });
                }
            }
        }
        Ok(Expr::Call { function, args })
    }

    fn matrix_literal(&mut self) -> ExpressionResult<Expr> {
        let mut rows = vec![Vec::new()];
        loop {
            let element = self.ternary()?;
            if let Some(row) = rows.last_mut() {
                row.push(element);
            }
            match self.advance() {
                TokenKind::Comma => {}
                TokenKind::Semicolon => rows.push(Vec::new()),
                TokenKind::RightBrace => return Ok(Expr::MatrixLiteral { rows }),
                other => {
                    return Err(self.error(format!("expected ',', ';' or '}}' in matrix, found {}", other.describe())))
                }
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Variable {
            name: name.to_string(),
            cell: None,
        }
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * c").unwrap();
        assert_eq!(expr, binary(BinaryOp::Add, var("a"), binary(BinaryOp::Mul, var("b"), var("c"))));
    }

    #[test]
    fn test_unary_binds_looser_than_power() {
        let expr = parse("-a^2").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_ternary_is_right_associative() {
        let expr = parse("a ? b : c ? d : e").unwrap();
        match expr {
            Expr::Ternary { else_branch, .. } => assert!(matches!(*else_branch, Expr::Ternary { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_word_operators() {
        let expr = parse("a mlt b").unwrap();
        assert_eq!(expr, binary(BinaryOp::ElemMul, var("a"), var("b")));
        let expr = parse("a pw 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::ElemPow, .. }));
    }

    #[test]
    fn test_matrix_literal() {
        match parse("{1, 2; 3, 4}").unwrap() {
            Expr::MatrixLiteral { rows } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1].len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_constants_are_literals() {
        assert_eq!(parse("_pi").unwrap(), Expr::Literal(Value::Float(std::f64::consts::PI)));
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("frobnicate(im1b1)").unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownFunction { name } if name == "frobnicate"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("a +").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("ndvi(a b)").is_err());
    }
}
