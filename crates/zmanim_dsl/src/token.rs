//! Lexical tokens.

use std::fmt;

use crate::catalog::{ConditionVar, DayBase, Direction, Function, NamedMethod, Primitive};

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    /// Duration literal, in minutes.
    Duration(f64),
    /// `21-May`
    DateLiteral { day: u32, month: u32 },
    Str(String),
    Primitive(Primitive),
    Function(Function),
    Direction(Direction),
    Base(DayBase),
    Custom,
    Var(ConditionVar),
    Named(NamedMethod),
    /// `@key`
    Reference(String),
    /// Identifier that matched no keyword.
    Ident(String),
    If,
    Else,
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Gt,
    Lt,
    Ge,
    Le,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl TokenKind {
    /// Classify a bare identifier against every keyword table.
    pub fn keyword(word: &str) -> Self {
        match word {
            "if" => return Self::If,
            "else" => return Self::Else,
            "true" => return Self::True,
            "false" => return Self::False,
            "custom" => return Self::Custom,
            _ => {}
        }
        if let Some(p) = Primitive::from_name(word) {
            Self::Primitive(p)
        } else if let Some(f) = Function::from_name(word) {
            Self::Function(f)
        } else if let Some(d) = Direction::from_name(word) {
            Self::Direction(d)
        } else if let Some(b) = DayBase::from_name(word) {
            Self::Base(b)
        } else if let Some(v) = ConditionVar::from_name(word) {
            Self::Var(v)
        } else if let Some(m) = NamedMethod::from_name(word) {
            Self::Named(m)
        } else {
            Self::Ident(word.to_string())
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Duration(m) => write!(f, "{m}min"),
            Self::DateLiteral { day, month } => {
                write!(f, "{day}-{}", crate::catalog::month_abbrev(*month))
            }
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Function(func) => f.write_str(func.name()),
            Self::Direction(d) => f.write_str(d.name()),
            Self::Base(b) => f.write_str(b.name()),
            Self::Custom => f.write_str("custom"),
            Self::Var(v) => f.write_str(v.name()),
            Self::Named(m) => f.write_str(m.name()),
            Self::Reference(k) => write!(f, "@{k}"),
            Self::Ident(s) => f.write_str(s),
            Self::If => f.write_str("if"),
            Self::Else => f.write_str("else"),
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::Slash => f.write_str("/"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBrace => f.write_str("{"),
            Self::RBrace => f.write_str("}"),
            Self::Comma => f.write_str(","),
            Self::Gt => f.write_str(">"),
            Self::Lt => f.write_str("<"),
            Self::Ge => f.write_str(">="),
            Self::Le => f.write_str("<="),
            Self::EqEq => f.write_str("=="),
            Self::NotEq => f.write_str("!="),
            Self::AndAnd => f.write_str("&&"),
            Self::OrOr => f.write_str("||"),
            Self::Bang => f.write_str("!"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}
