//! Formula parser: turns an arithmetic formula into an [`Expr`] tree.
//!
//! Supports numeric literals (with exponent), identifiers, unary `+`/`-`,
//! binary `+ - * /`, right-associative `**` and parentheses. Formulas longer
//! than [`MAX_TOKENS`] tokens or nested deeper than [`MAX_NESTING`]
//! parentheses are rejected, which keeps parsing, evaluation and drop depth
//! bounded.

use thiserror::Error;

/// Longest formula accepted, in tokens.
pub const MAX_TOKENS: usize = 512;

/// Deepest parenthesis nesting accepted.
pub const MAX_NESTING: usize = 32;

/// Arithmetic expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Reference to a named field.
    Variable(String),
    /// Unary negation.
    Neg(Box<Expr>),
    /// Binary arithmetic operation.
    BinaryOp {
        /// The operator.
        op: Op,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `**`
    Pow,
}

/// Errors produced while tokenizing or parsing a formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// The formula contains no tokens.
    #[error("empty formula")]
    Empty,

    /// A character outside the formula alphabet was found.
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    /// A numeric literal could not be read.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// The formula ended in the middle of an expression.
    #[error("unexpected end of formula")]
    UnexpectedEnd,

    /// A token appeared where it is not allowed.
    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),

    /// An opening parenthesis was never closed.
    #[error("missing closing parenthesis")]
    MissingParen,

    /// A signed operand was used as the base of `**`; write `(-a) ** b` or
    /// `-(a ** b)` instead.
    #[error("unary operator before '**' at position {0} needs parentheses")]
    UnaryBeforePower(usize),

    /// The formula has more tokens than [`MAX_TOKENS`].
    #[error("formula too long: {0} tokens")]
    TooLong(usize),

    /// Parentheses are nested deeper than [`MAX_NESTING`].
    #[error("formula nested too deeply")]
    TooDeep,
}

impl Expr {
    /// Names of all variables referenced by this expression, in order of
    /// first appearance.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_variables(self, &mut names);
        names
    }
}

fn collect_variables<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Variable(name) => {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Expr::Neg(inner) => collect_variables(inner, names),
        Expr::BinaryOp { left, right, .. } => {
            collect_variables(left, names);
            collect_variables(right, names);
        }
    }
}

/// Parse a formula into an expression tree.
///
/// The input is not sanitized here; characters outside the formula alphabet
/// are reported as [`FormulaError::UnexpectedChar`].
///
/// # Errors
///
/// Returns an error if the formula is empty or malformed.
pub fn parse(formula: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::TooLong(tokens.len()));
    }

    let (expr, pos) = parse_add_sub(&tokens, 0, 0)?;
    if pos < tokens.len() {
        return Err(FormulaError::UnexpectedToken(pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::StarStar);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                let mut seen_dot = false;
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        num_str.push(d);
                        chars.next();
                    } else if d == '.' && !seen_dot {
                        seen_dot = true;
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }

                // Exponent part: e, optional sign, at least one digit
                if matches!(chars.peek(), Some(&('e' | 'E'))) {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    if lookahead.peek().is_some_and(char::is_ascii_digit) {
                        while let Some(&d) = lookahead.peek() {
                            if d.is_ascii_digit() {
                                exponent.push(d);
                                lookahead.next();
                            } else {
                                break;
                            }
                        }
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }

                // A literal running straight into a name, as in `2x`, is malformed
                if let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        num_str.push(next);
                        return Err(FormulaError::InvalidNumber(num_str));
                    }
                }

                let num: f64 = num_str
                    .parse()
                    .map_err(|_| FormulaError::InvalidNumber(num_str.clone()))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(FormulaError::UnexpectedChar(c)),
        }
    }

    Ok(tokens)
}

// Lowest precedence: addition and subtraction. `depth` counts enclosing
// parentheses.
fn parse_add_sub(
    tokens: &[Token],
    pos: usize,
    depth: usize,
) -> Result<(Expr, usize), FormulaError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, depth)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(
    tokens: &[Token],
    pos: usize,
    depth: usize,
) -> Result<(Expr, usize), FormulaError> {
    let (mut left, mut pos) = parse_unary(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1, depth)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

// Prefix + and -. A signed operand may not be followed by **, so -2 ** 2 is
// rejected while 2 ** -2 and (-2) ** 2 are fine.
fn parse_unary(
    tokens: &[Token],
    pos: usize,
    depth: usize,
) -> Result<(Expr, usize), FormulaError> {
    match tokens.get(pos) {
        Some(Token::Plus | Token::Minus) => {
            let (expr, pos) = parse_signed(tokens, pos, depth)?;
            if let Some(Token::StarStar) = tokens.get(pos) {
                return Err(FormulaError::UnaryBeforePower(pos));
            }
            Ok((expr, pos))
        }
        _ => parse_power(tokens, pos, depth),
    }
}

fn parse_signed(
    tokens: &[Token],
    pos: usize,
    depth: usize,
) -> Result<(Expr, usize), FormulaError> {
    match tokens.get(pos) {
        Some(Token::Plus) => parse_signed(tokens, pos + 1, depth),
        Some(Token::Minus) => {
            let (expr, pos) = parse_signed(tokens, pos + 1, depth)?;
            Ok((Expr::Neg(Box::new(expr)), pos))
        }
        _ => parse_primary(tokens, pos, depth),
    }
}

// Exponentiation (**) - right-associative
fn parse_power(
    tokens: &[Token],
    pos: usize,
    depth: usize,
) -> Result<(Expr, usize), FormulaError> {
    let (base, pos) = parse_primary(tokens, pos, depth)?;

    if let Some(Token::StarStar) = tokens.get(pos) {
        let (exponent, new_pos) = parse_unary(tokens, pos + 1, depth)?;
        return Ok((
            Expr::BinaryOp {
                op: Op::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            new_pos,
        ));
    }

    Ok((base, pos))
}

fn parse_primary(
    tokens: &[Token],
    pos: usize,
    depth: usize,
) -> Result<(Expr, usize), FormulaError> {
    match tokens.get(pos) {
        None => Err(FormulaError::UnexpectedEnd),
        Some(Token::Number(n)) => Ok((Expr::Number(*n), pos + 1)),
        Some(Token::Ident(name)) => Ok((Expr::Variable(name.clone()), pos + 1)),
        Some(Token::LParen) => {
            if depth >= MAX_NESTING {
                return Err(FormulaError::TooDeep);
            }
            let (expr, pos) = parse_add_sub(tokens, pos + 1, depth + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                None => Err(FormulaError::MissingParen),
                Some(_) => Err(FormulaError::UnexpectedToken(pos)),
            }
        }
        Some(_) => Err(FormulaError::UnexpectedToken(pos)),
    }
}
