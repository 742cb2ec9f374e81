//! Formula tokenizer.
//!
//! Produces a flat token vector terminated by [`TokenKind::Eof`]. Duration
//! literals (`72min`, `1hr`, `1h 30min`) and date literals (`21-May`) are
//! recognized here so the parser only sees single tokens for them.

use crate::catalog::month_from_name;
use crate::error::DslError;
use crate::token::{Position, Token, TokenKind};

/// Unit multipliers to minutes.
fn duration_unit(word: &str) -> Option<f64> {
    match word {
        "m" | "min" | "mins" | "minute" | "minutes" => Some(1.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(60.0),
        _ => None,
    }
}

/// Tokenize a formula.
pub fn tokenize(src: &str) -> Result<Vec<Token>, DslError> {
    Lexer::new(src).run()
}

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    column: usize,
}

#[derive(Clone, Copy)]
struct Mark {
    idx: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            idx: 0,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            idx: self.idx,
            line: self.line,
            column: self.column,
        }
    }

    fn reset(&mut self, m: Mark) {
        self.idx = m.idx;
        self.line = m.line;
        self.column = m.column;
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>, pos: Position) -> DslError {
        DslError::parse(message, pos.line, pos.column)
    }

    fn run(mut self) -> Result<Vec<Token>, DslError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let pos = self.pos();
            let Some(c) = self.peek() else {
                out.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
                return Ok(out);
            };
            let kind = if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                self.number(pos)?
            } else if c.is_alphabetic() || c == '_' {
                TokenKind::keyword(&self.word())
            } else if c == '@' {
                self.bump();
                let key = self.word();
                if key.is_empty() {
                    return Err(self.error("expected a key after '@'", pos));
                }
                TokenKind::Reference(key)
            } else if c == '"' || c == '\'' {
                self.string(pos)?
            } else {
                self.operator(pos)?
            };
            out.push(Token { kind, pos });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), DslError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(self.error("unterminated comment", start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn word(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn digits(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn letters(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn number(&mut self, pos: Position) -> Result<TokenKind, DslError> {
        let text = self.digits();
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("invalid number '{text}'"), pos))?;

        match self.peek() {
            Some(c) if c.is_alphabetic() => {
                let unit = self.word();
                let factor = duration_unit(&unit)
                    .ok_or_else(|| self.error(format!("invalid duration '{text}{unit}'"), pos))?;
                let mut minutes = value * factor;
                if factor == 60.0 {
                    minutes += self.trailing_minutes();
                }
                Ok(TokenKind::Duration(minutes))
            }
            Some('-') if !text.contains('.') => Ok(self.date_literal(&text, pos)?
                .unwrap_or(TokenKind::Number(value))),
            _ => Ok(TokenKind::Number(value)),
        }
    }

    /// The `30min` of `1h 30min`, if present.
    fn trailing_minutes(&mut self) -> f64 {
        let mark = self.mark();
        while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
            self.bump();
        }
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.reset(mark);
            return 0.0;
        }
        let text = self.digits();
        let unit = self.letters();
        let followed_by_word = self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_');
        match (text.parse::<f64>(), duration_unit(&unit)) {
            (Ok(v), Some(factor)) if factor == 1.0 && !followed_by_word => v,
            _ => {
                self.reset(mark);
                0.0
            }
        }
    }

    /// `21-May`; leaves the input untouched when the word after `-` is not a month.
    fn date_literal(&mut self, day_text: &str, pos: Position) -> Result<Option<TokenKind>, DslError> {
        let mark = self.mark();
        self.bump();
        let name = self.letters();
        let Some(month) = month_from_name(&name) else {
            self.reset(mark);
            return Ok(None);
        };
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.reset(mark);
            return Ok(None);
        }
        let day: u32 = day_text
            .parse()
            .map_err(|_| self.error(format!("invalid day '{day_text}'"), pos))?;
        if !(1..=31).contains(&day) {
            return Err(self.error(format!("invalid day in date literal '{day_text}-{name}'"), pos));
        }
        Ok(Some(TokenKind::DateLiteral { day, month }))
    }

    fn string(&mut self, pos: Position) -> Result<TokenKind, DslError> {
        let quote = self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(c) if Some(c) == quote => return Ok(TokenKind::Str(s)),
                Some('\n') | None => return Err(self.error("unterminated string", pos)),
                Some(c) => s.push(c),
            }
        }
    }

    fn operator(&mut self, pos: Position) -> Result<TokenKind, DslError> {
        let Some(c) = self.bump() else {
            return Ok(TokenKind::Eof);
        };
        let next = self.peek();
        let two = |lexer: &mut Self, kind: TokenKind| -> Result<TokenKind, DslError> {
            lexer.bump();
            Ok(kind)
        };
        match (c, next) {
            ('&', Some('&')) => two(self, TokenKind::AndAnd),
            ('|', Some('|')) => two(self, TokenKind::OrOr),
            ('=', Some('=')) => two(self, TokenKind::EqEq),
            ('!', Some('=')) => two(self, TokenKind::NotEq),
            ('>', Some('=')) => two(self, TokenKind::Ge),
            ('<', Some('=')) => two(self, TokenKind::Le),
            ('!', _) => Ok(TokenKind::Bang),
            ('>', _) => Ok(TokenKind::Gt),
            ('<', _) => Ok(TokenKind::Lt),
            ('+', _) => Ok(TokenKind::Plus),
            ('-', _) => Ok(TokenKind::Minus),
            ('*', _) => Ok(TokenKind::Star),
            ('/', _) => Ok(TokenKind::Slash),
            ('(', _) => Ok(TokenKind::LParen),
            (')', _) => Ok(TokenKind::RParen),
            ('{', _) => Ok(TokenKind::LBrace),
            ('}', _) => Ok(TokenKind::RBrace),
            (',', _) => Ok(TokenKind::Comma),
            _ => Err(self.error(format!("unexpected character '{c}'"), pos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Direction, Function, Primitive};

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_offset() {
        assert_eq!(
            kinds("visible_sunrise - 72min"),
            vec![
                TokenKind::Primitive(Primitive::VisibleSunrise),
                TokenKind::Minus,
                TokenKind::Duration(72.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn duration_forms() {
        assert_eq!(kinds("1hr")[0], TokenKind::Duration(60.0));
        assert_eq!(kinds("2h")[0], TokenKind::Duration(120.0));
        assert_eq!(kinds("90min")[0], TokenKind::Duration(90.0));
        assert_eq!(kinds("1h 30min")[0], TokenKind::Duration(90.0));
        assert_eq!(kinds("1.5hr")[0], TokenKind::Duration(90.0));
    }

    #[test]
    fn compound_duration_needs_minute_unit() {
        // "1h 30" is a duration followed by a number, not 90 minutes.
        assert_eq!(
            kinds("1h 30"),
            vec![TokenKind::Duration(60.0), TokenKind::Number(30.0), TokenKind::Eof]
        );
    }

    #[test]
    fn invalid_duration_unit() {
        let err = tokenize("sunrise + 5invalid").unwrap_err();
        assert!(err.to_string().contains("invalid duration"), "{err}");
    }

    #[test]
    fn date_literal_vs_subtraction() {
        assert_eq!(
            kinds("21-May")[0],
            TokenKind::DateLiteral { day: 21, month: 5 }
        );
        assert_eq!(
            kinds("21-x"),
            vec![
                TokenKind::Number(21.0),
                TokenKind::Minus,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn impossible_day_rejected() {
        assert!(tokenize("45-May").is_err());
    }

    #[test]
    fn comments_skipped() {
        assert_eq!(
            kinds("/* dawn */ solar(16.1, before_sunrise) // 16.1 degrees"),
            vec![
                TokenKind::Function(Function::Solar),
                TokenKind::LParen,
                TokenKind::Number(16.1),
                TokenKind::Comma,
                TokenKind::Direction(Direction::BeforeVisibleSunrise),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_comment() {
        assert!(tokenize("sunrise /* oops").is_err());
    }

    #[test]
    fn references_and_operators() {
        assert_eq!(
            kinds("@alos >= 5 && !(x != 'a')"),
            vec![
                TokenKind::Reference("alos".into()),
                TokenKind::Ge,
                TokenKind::Number(5.0),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::NotEq,
                TokenKind::Str("a".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_track_lines() {
        let toks = tokenize("sunrise\n  + 5min").unwrap();
        assert_eq!(toks[1].pos, Position { line: 2, column: 3 });
        assert_eq!(toks[2].pos, Position { line: 2, column: 5 });
    }

    #[test]
    fn stray_character() {
        let err = tokenize("sunrise # 5").unwrap_err();
        assert!(matches!(err, DslError::Parse { line: 1, column: 9, .. }), "{err:?}");
    }
}
