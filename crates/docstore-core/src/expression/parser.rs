//! Lexer and recursive-descent parser for the expression language.
//!
//! Keywords and function names are case-insensitive. Placeholders must match
//! `#[A-Za-z_][A-Za-z0-9_]*` or `:[A-Za-z_][A-Za-z0-9_]*`.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use super::ast::{
    AddAction, AttributePath, CompareOp, DeleteAction, Expr, FunctionName, LogicalOp, Operand,
    PathElement, Projection, SetAction, SetValue, UpdateExpr,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// An unexpected token was encountered.
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// The expression is empty or ended prematurely.
    #[error("unexpected end of expression")]
    UnexpectedEof,
    /// A `#` or `:` sigil not followed by a valid placeholder name.
    #[error("invalid placeholder after '{sigil}': placeholders must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidPlaceholder {
        /// The sigil character.
        sigil: char,
    },
    /// A value placeholder has no entry in the value map.
    #[error("unresolved value placeholder {name}")]
    UnresolvedValue {
        /// The placeholder, sigil included.
        name: String,
    },
    /// An operand is not valid where it appears.
    #[error("invalid operand for {operation}: {message}")]
    InvalidOperand {
        /// The operation.
        operation: String,
        /// Explanation.
        message: String,
    },
    /// Operand types are incompatible at evaluation time.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Explanation.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    /// `#name`, sigil included.
    NamePlaceholder(String),
    /// `:value`, sigil included.
    ValuePlaceholder(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
    Function(FunctionName),
    Size,
    IfNotExists,
    ListAppend,
    Number(usize),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::NamePlaceholder(s) | Self::ValuePlaceholder(s) => f.write_str(s),
            Self::Eq => f.write_str("'='"),
            Self::Ne => f.write_str("'<>'"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Dot => f.write_str("'.'"),
            Self::Comma => f.write_str("','"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Between => f.write_str("BETWEEN"),
            Self::In => f.write_str("IN"),
            Self::Set => f.write_str("SET"),
            Self::Remove => f.write_str("REMOVE"),
            Self::Add => f.write_str("ADD"),
            Self::Delete => f.write_str("DELETE"),
            Self::Function(name) => write!(f, "{name}"),
            Self::Size => f.write_str("size"),
            Self::IfNotExists => f.write_str("if_not_exists"),
            Self::ListAppend => f.write_str("list_append"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Eof => f.write_str("end of expression"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump(&mut self, tok: Token) -> Token {
        self.chars.next();
        tok
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }

        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        let tok = match ch {
            '#' => Token::NamePlaceholder(self.read_placeholder('#')?),
            ':' => Token::ValuePlaceholder(self.read_placeholder(':')?),
            '=' => self.bump(Token::Eq),
            '<' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('=') => self.bump(Token::Le),
                    Some('>') => self.bump(Token::Ne),
                    _ => Token::Lt,
                }
            }
            '>' => {
                self.chars.next();
                if self.chars.peek() == Some(&'=') {
                    self.bump(Token::Ge)
                } else {
                    Token::Gt
                }
            }
            '+' => self.bump(Token::Plus),
            '-' => self.bump(Token::Minus),
            '.' => self.bump(Token::Dot),
            ',' => self.bump(Token::Comma),
            '(' => self.bump(Token::LParen),
            ')' => self.bump(Token::RParen),
            '[' => self.bump(Token::LBracket),
            ']' => self.bump(Token::RBracket),
            c if c.is_ascii_digit() => self.read_index()?,
            c if is_ident_start(c) => keyword_or_identifier(self.read_ident_chars()),
            _ => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "valid token".to_owned(),
                    found: format!("'{ch}'"),
                });
            }
        };
        Ok(tok)
    }

    fn read_placeholder(&mut self, sigil: char) -> Result<String, ExpressionError> {
        self.chars.next();
        if !self.chars.peek().is_some_and(|c| is_ident_start(*c)) {
            return Err(ExpressionError::InvalidPlaceholder { sigil });
        }
        Ok(format!("{sigil}{}", self.read_ident_chars()))
    }

    fn read_index(&mut self) -> Result<Token, ExpressionError> {
        let mut digits = String::new();
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.chars.next();
        }
        digits
            .parse()
            .map(Token::Number)
            .map_err(|_| ExpressionError::InvalidOperand {
                operation: "list index".to_owned(),
                message: format!("'{digits}' is not a valid index"),
            })
    }

    fn read_ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_ident_continue(c) {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        s
    }
}

fn keyword_or_identifier(ident: String) -> Token {
    match ident.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "between" => Token::Between,
        "in" => Token::In,
        "set" => Token::Set,
        "remove" => Token::Remove,
        "add" => Token::Add,
        "delete" => Token::Delete,
        "attribute_exists" => Token::Function(FunctionName::AttributeExists),
        "attribute_not_exists" => Token::Function(FunctionName::AttributeNotExists),
        "attribute_type" => Token::Function(FunctionName::AttributeType),
        "begins_with" => Token::Function(FunctionName::BeginsWith),
        "contains" => Token::Function(FunctionName::Contains),
        "size" => Token::Size,
        "if_not_exists" => Token::IfNotExists,
        "list_append" => Token::ListAppend,
        _ => Token::Identifier(ident),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Longest accepted expression, in bytes.
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// Deepest accepted nesting of parentheses and `NOT`.
pub const MAX_NESTING_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ExpressionError> {
        if input.len() > MAX_EXPRESSION_LENGTH {
            return Err(ExpressionError::InvalidOperand {
                operation: "expression".to_owned(),
                message: format!(
                    "{} bytes exceeds the limit of {MAX_EXPRESSION_LENGTH}",
                    input.len()
                ),
            });
        }
        let tokens = Lexer::new(input).tokenize()?;
        if tokens.first() == Some(&Token::Eof) {
            return Err(ExpressionError::UnexpectedEof);
        }
        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ExpressionError::InvalidOperand {
                operation: "expression".to_owned(),
                message: format!("nesting deeper than {MAX_NESTING_DEPTH} levels"),
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ExpressionError {
        match self.peek() {
            Token::Eof => ExpressionError::UnexpectedEof,
            found => ExpressionError::UnexpectedToken {
                expected: expected.to_owned(),
                found: found.to_string(),
            },
        }
    }

    fn finish(&self) -> Result<(), ExpressionError> {
        if matches!(self.peek(), Token::Eof) {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: "end of expression".to_owned(),
                found: self.peek().to_string(),
            })
        }
    }

    /// Parse `item (, item)*`.
    fn comma_list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<Vec<T>, ExpressionError> {
        let mut out = vec![item(self)?];
        while self.eat(&Token::Comma) {
            out.push(item(self)?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Conditions (OR < AND < NOT < primary)
// ---------------------------------------------------------------------------

impl Parser {
    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::LParen) {
            let expr = self.nested(Self::parse_or)?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        if let Token::Function(name) = *self.peek() {
            self.advance();
            return self.parse_function(name);
        }

        let operand = self.parse_operand()?;
        self.parse_postfix(operand)
    }

    fn parse_function(&mut self, name: FunctionName) -> Result<Expr, ExpressionError> {
        self.expect(&Token::LParen)?;
        let args = self.comma_list(Self::parse_operand)?;
        self.expect(&Token::RParen)?;

        if args.len() != name.arity() {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: format!("expected {} argument(s), got {}", name.arity(), args.len()),
            });
        }
        if !matches!(args[0], Operand::Path(_)) {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: "first argument must be an attribute path".to_owned(),
            });
        }
        Ok(Expr::Function { name, args })
    }

    fn parse_postfix(&mut self, left: Operand) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::Between => {
                self.advance();
                let low = self.parse_operand()?;
                self.expect(&Token::And)?;
                let high = self.parse_operand()?;
                return Ok(Expr::Between {
                    value: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                });
            }
            Token::In => {
                self.advance();
                self.expect(&Token::LParen)?;
                let list = self.comma_list(Self::parse_operand)?;
                self.expect(&Token::RParen)?;
                return Ok(Expr::In {
                    value: Box::new(left),
                    list,
                });
            }
            _ => return Err(self.unexpected("comparison operator, BETWEEN, or IN")),
        };
        self.advance();
        let right = self.parse_operand()?;
        Ok(Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }
}

// ---------------------------------------------------------------------------
// Operands and paths
// ---------------------------------------------------------------------------

impl Parser {
    fn parse_operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.peek() {
            Token::ValuePlaceholder(_) => {
                let Token::ValuePlaceholder(name) = self.advance() else {
                    return Err(ExpressionError::UnexpectedEof);
                };
                Ok(Operand::Value(name))
            }
            Token::Size => {
                self.advance();
                self.expect(&Token::LParen)?;
                let path = self.parse_path()?;
                self.expect(&Token::RParen)?;
                Ok(Operand::Size(path))
            }
            _ => Ok(Operand::Path(self.parse_path()?)),
        }
    }

    fn parse_path(&mut self) -> Result<AttributePath, ExpressionError> {
        let mut elements = vec![self.parse_path_name()?];
        loop {
            if self.eat(&Token::Dot) {
                elements.push(self.parse_path_name()?);
            } else if self.eat(&Token::LBracket) {
                let Token::Number(idx) = self.advance() else {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "list index".to_owned(),
                        found: self.tokens[self.pos - 1].to_string(),
                    });
                };
                self.expect(&Token::RBracket)?;
                elements.push(PathElement::Index(idx));
            } else {
                return Ok(AttributePath { elements });
            }
        }
    }

    fn parse_path_name(&mut self) -> Result<PathElement, ExpressionError> {
        match self.peek() {
            Token::Identifier(_) | Token::NamePlaceholder(_) => match self.advance() {
                Token::Identifier(name) | Token::NamePlaceholder(name) => {
                    Ok(PathElement::Attribute(name))
                }
                _ => Err(ExpressionError::UnexpectedEof),
            },
            _ => Err(self.unexpected("attribute name or #name")),
        }
    }
}

// ---------------------------------------------------------------------------
// Update expressions
// ---------------------------------------------------------------------------

impl Parser {
    fn parse_update(&mut self) -> Result<UpdateExpr, ExpressionError> {
        let mut update = UpdateExpr::default();

        while !matches!(self.peek(), Token::Eof) {
            match self.advance() {
                Token::Set => {
                    let actions = self.comma_list(Self::parse_set_action)?;
                    update.set_actions.extend(actions);
                }
                Token::Remove => {
                    let paths = self.comma_list(Self::parse_path)?;
                    update.remove_paths.extend(paths);
                }
                Token::Add => {
                    let actions = self.comma_list(|p| {
                        Ok(AddAction {
                            path: p.parse_path()?,
                            value: p.parse_operand()?,
                        })
                    })?;
                    update.add_actions.extend(actions);
                }
                Token::Delete => {
                    let actions = self.comma_list(|p| {
                        Ok(DeleteAction {
                            path: p.parse_path()?,
                            value: p.parse_operand()?,
                        })
                    })?;
                    update.delete_actions.extend(actions);
                }
                other => {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "SET, REMOVE, ADD, or DELETE".to_owned(),
                        found: other.to_string(),
                    });
                }
            }
        }

        Ok(update)
    }

    fn parse_set_action(&mut self) -> Result<SetAction, ExpressionError> {
        let path = self.parse_path()?;
        self.expect(&Token::Eq)?;
        let value = self.parse_set_value()?;
        Ok(SetAction { path, value })
    }

    /// `term (('+' | '-') term)*`, left associative.
    fn parse_set_value(&mut self) -> Result<SetValue, ExpressionError> {
        let mut value = self.parse_set_term()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.parse_set_term()?;
                value = SetValue::Plus(Box::new(value), Box::new(rhs));
            } else if self.eat(&Token::Minus) {
                let rhs = self.parse_set_term()?;
                value = SetValue::Minus(Box::new(value), Box::new(rhs));
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_set_term(&mut self) -> Result<SetValue, ExpressionError> {
        if self.eat(&Token::IfNotExists) {
            self.expect(&Token::LParen)?;
            let path = self.parse_path()?;
            self.expect(&Token::Comma)?;
            let fallback = self.parse_operand()?;
            self.expect(&Token::RParen)?;
            return Ok(SetValue::IfNotExists(path, fallback));
        }
        if self.eat(&Token::ListAppend) {
            self.expect(&Token::LParen)?;
            let first = self.parse_operand()?;
            self.expect(&Token::Comma)?;
            let second = self.parse_operand()?;
            self.expect(&Token::RParen)?;
            return Ok(SetValue::ListAppend(first, second));
        }
        Ok(SetValue::Operand(self.parse_operand()?))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a condition, filter, or key-condition expression.
pub fn parse_condition(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_or()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse an update expression (SET / REMOVE / ADD / DELETE).
pub fn parse_update(input: &str) -> Result<UpdateExpr, ExpressionError> {
    let mut parser = Parser::new(input)?;
    parser.parse_update()
}

/// Parse a projection expression.
pub fn parse_projection(input: &str) -> Result<Projection, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let paths = parser.comma_list(Parser::parse_path)?;
    parser.finish()?;
    Ok(Projection { paths })
}
