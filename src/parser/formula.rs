//! Plain-formula front-end
//!
//! Hand-written lexer and Pratt parser for the infix formula strings the
//! reader falls back to when MathML is unavailable. Supports implicit
//! multiplication (`k1 A` reads as `k1 * A`), both `^` and `**` for
//! exponentiation, infix comparisons, and call syntax for everything else.
//! Builtin call forms (`pow`, `lt`, `and`, `piecewise`, ...) are lexed as
//! ordinary calls here and canonicalized into dedicated node kinds by the
//! parser facade, so textual `and`/`or` never collide with target-language
//! keywords.

use crate::error::SbmlSolError;
use crate::expr::{BinOp, Expr, RelOp};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
}

impl Token {
    fn starts_primary(&self) -> bool {
        matches!(
            self,
            Token::Number(_) | Token::Ident(_) | Token::LParen
        )
    }
}

fn lex(input: &str) -> Result<Vec<Token>, SbmlSolError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(SbmlSolError::parse(input, "single '=' is not an operator"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(SbmlSolError::parse(input, "unexpected '!'"));
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent suffix like 1.5e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| SbmlSolError::parse(&text, "malformed numeric literal"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(SbmlSolError::parse(
                    input,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Parse a formula string into an expression tree.
///
/// The output may still contain builtin call forms (`piecewise`, `and`,
/// `pow`, ...); the facade canonicalizes those.
pub fn parse(input: &str) -> Result<Expr, SbmlSolError> {
    let tokens = lex(input)?;
    let mut parser = Parser {
        input,
        tokens,
        position: 0,
    };
    let expr = parser.parse_expression(0)?;
    if parser.position != parser.tokens.len() {
        return Err(SbmlSolError::parse(
            input,
            format!("unexpected trailing input at token {}", parser.position),
        ));
    }
    Ok(expr)
}

// Binding powers, low to high. Exponentiation is right-associative and
// binds tighter than unary minus on its left (-x^2 reads -(x^2)).
const BP_COMPARISON: u8 = 10;
const BP_ADDITIVE: u8 = 20;
const BP_MULTIPLICATIVE: u8 = 30;
const BP_UNARY: u8 = 40;
const BP_POWER: u8 = 50;

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), SbmlSolError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(SbmlSolError::parse(
                self.input,
                format!("expected {:?}, found {:?}", expected, other),
            )),
        }
    }

    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, SbmlSolError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let (op_bp, right_bp, op): (u8, u8, Option<Token>) = match self.peek() {
                Some(Token::Caret) => (BP_POWER, BP_POWER, Some(Token::Caret)),
                Some(Token::Star) => (BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1, Some(Token::Star)),
                Some(Token::Slash) => {
                    (BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1, Some(Token::Slash))
                }
                Some(Token::Plus) => (BP_ADDITIVE, BP_ADDITIVE + 1, Some(Token::Plus)),
                Some(Token::Minus) => (BP_ADDITIVE, BP_ADDITIVE + 1, Some(Token::Minus)),
                Some(token @ (Token::Lt | Token::Gt | Token::Le | Token::Ge | Token::EqEq
                | Token::Ne)) => (BP_COMPARISON, BP_COMPARISON + 1, Some(token.clone())),
                // adjacency is implicit multiplication
                Some(token) if token.starts_primary() => {
                    (BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1, None)
                }
                _ => break,
            };

            if op_bp < min_bp {
                break;
            }

            if let Some(op) = op {
                self.advance();
                let rhs = self.parse_expression(right_bp)?;
                lhs = match op {
                    Token::Caret => Expr::Binary(BinOp::Pow, Box::new(lhs), Box::new(rhs)),
                    Token::Star => Expr::Binary(BinOp::Mul, Box::new(lhs), Box::new(rhs)),
                    Token::Slash => Expr::Binary(BinOp::Div, Box::new(lhs), Box::new(rhs)),
                    Token::Plus => Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs)),
                    Token::Minus => Expr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs)),
                    Token::Lt => Expr::Relation(RelOp::Lt, Box::new(lhs), Box::new(rhs)),
                    Token::Gt => Expr::Relation(RelOp::Gt, Box::new(lhs), Box::new(rhs)),
                    Token::Le => Expr::Relation(RelOp::Le, Box::new(lhs), Box::new(rhs)),
                    Token::Ge => Expr::Relation(RelOp::Ge, Box::new(lhs), Box::new(rhs)),
                    Token::EqEq => Expr::Relation(RelOp::Eq, Box::new(lhs), Box::new(rhs)),
                    Token::Ne => Expr::Relation(RelOp::Ne, Box::new(lhs), Box::new(rhs)),
                    _ => unreachable!(),
                };
            } else {
                // implicit multiplication: no token to consume
                let rhs = self.parse_expression(BP_MULTIPLICATIVE + 1)?;
                lhs = Expr::Binary(BinOp::Mul, Box::new(lhs), Box::new(rhs));
            }
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, SbmlSolError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Minus) => {
                // folding negation keeps literal exponents literal (-1
                // stays an integer for powi selection)
                let operand = self.parse_expression(BP_UNARY)?;
                Ok(-operand)
            }
            Some(Token::Plus) => self.parse_expression(BP_UNARY),
            other => Err(SbmlSolError::parse(
                self.input,
                format!("expected an operand, found {:?}", other),
            )),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SbmlSolError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(0)?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => {
                    return Err(SbmlSolError::parse(
                        self.input,
                        format!("expected ',' or ')' in argument list, found {:?}", other),
                    ));
                }
            }
        }
        Ok(args)
    }
}
