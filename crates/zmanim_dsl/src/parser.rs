//! Recursive-descent parser.
//!
//! ```text
//! formula     := expr EOF
//! expr        := term (('+' | '-') term)*
//! term        := unary (('*' | '/') unary)*
//! unary       := '-' unary | factor
//! factor      := literal | primitive | named | var | '@' key
//!              | function '(' args ')' | '(' expr ')' | conditional
//! conditional := 'if' '(' cond ')' '{' expr '}' ['else' ('{' expr '}' | conditional)]
//! cond        := and ('||' and)*
//! and         := not ('&&' not)*
//! not         := '!' not | '(' cond ')' | expr [cmp expr]
//! ```

use crate::ast::{Base, BinaryOp, Call, CompareOp, Cond, Expr};
use crate::catalog::{Direction, Function};
use crate::error::DslError;
use crate::lexer::tokenize;
use crate::token::{Position, Token, TokenKind};

/// Deepest nesting of parentheses, calls, conditionals and prefix operators
/// accepted before parsing stops with an error.
pub const MAX_NESTING: usize = 128;

/// Parse formula text into a syntax tree.
pub fn parse(src: &str) -> Result<Expr, DslError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// One argument of a function call before shape checking.
enum Arg {
    Expr(Expr),
    Direction(Direction),
    Base(Base),
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.idx)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn pos(&self) -> Position {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map_or_else(Position::default, |t| t.pos)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, pos: Position, message: impl Into<String>) -> DslError {
        DslError::parse(message, pos.line, pos.column)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), DslError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error_at(
                self.pos(),
                format!("expected '{kind}', found '{}'", self.peek()),
            ))
        }
    }

    fn expect_eof(&self) -> Result<(), DslError> {
        match self.peek() {
            TokenKind::Eof => Ok(()),
            other => Err(self.error_at(self.pos(), format!("unexpected '{other}' after expression"))),
        }
    }

    /// Runs `f` one nesting level deeper. Every recursive production passes
    /// through here, so stack use is bounded by [`MAX_NESTING`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, DslError>) -> Result<T, DslError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_at(
                self.pos(),
                format!("formula nested deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn expr(&mut self) -> Result<Expr, DslError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, DslError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, DslError> {
        self.nested(Self::unary_inner)
    }

    fn unary_inner(&mut self) -> Result<Expr, DslError> {
        if *self.peek() != TokenKind::Minus {
            return self.factor();
        }
        let pos = self.pos();
        self.advance();
        match self.unary()? {
            Expr::Number(n) => Ok(Expr::Number(-n)),
            Expr::Duration(m) => Ok(Expr::Duration(-m)),
            _ => Err(self.error_at(pos, "unary minus can only be applied to numbers and durations")),
        }
    }

    fn factor(&mut self) -> Result<Expr, DslError> {
        let pos = self.pos();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Duration(m) => Ok(Expr::Duration(m)),
            TokenKind::Str(s) => Ok(Expr::Text(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::DateLiteral { day, month } => Ok(Expr::DateLiteral { day, month }),
            TokenKind::Primitive(p) => Ok(Expr::Primitive(p)),
            TokenKind::Named(m) => Ok(Expr::Named(m)),
            TokenKind::Var(v) => Ok(Expr::Var(v)),
            TokenKind::Reference(key) => Ok(Expr::Reference(key)),
            TokenKind::Function(func) => self.call(func, pos),
            TokenKind::If => self.conditional(),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => Err(DslError::UnknownSymbol(name)),
            TokenKind::Direction(d) => Err(self.error_at(
                pos,
                format!("direction '{}' is only valid as a function argument", d.name()),
            )),
            TokenKind::Base(b) => Err(self.error_at(
                pos,
                format!("base '{}' is only valid as a function argument", b.name()),
            )),
            TokenKind::Custom => Err(self.error_at(pos, "custom() is only valid as a base argument")),
            TokenKind::Eof => Err(self.error_at(pos, "unexpected end of input")),
            other => Err(self.error_at(pos, format!("unexpected '{other}'"))),
        }
    }

    fn conditional(&mut self) -> Result<Expr, DslError> {
        self.expect(&TokenKind::LParen)?;
        let condition = self.cond()?;
        self.expect(&TokenKind::RParen)?;
        let then = self.block()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.eat(&TokenKind::If) {
                Some(Box::new(self.conditional()?))
            } else {
                Some(Box::new(self.block()?))
            }
        } else {
            None
        };
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise,
        })
    }

    fn block(&mut self) -> Result<Expr, DslError> {
        self.expect(&TokenKind::LBrace)?;
        let e = self.expr()?;
        self.expect(&TokenKind::RBrace)?;
        Ok(e)
    }

    fn cond(&mut self) -> Result<Cond, DslError> {
        let mut lhs = self.and_cond()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.and_cond()?;
            lhs = Cond::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_cond(&mut self) -> Result<Cond, DslError> {
        let mut lhs = self.not_cond()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.not_cond()?;
            lhs = Cond::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_cond(&mut self) -> Result<Cond, DslError> {
        self.nested(Self::not_cond_inner)
    }

    fn not_cond_inner(&mut self) -> Result<Cond, DslError> {
        if self.eat(&TokenKind::Bang) {
            return Ok(Cond::Not(Box::new(self.not_cond()?)));
        }
        if *self.peek() == TokenKind::LParen {
            // `(cond)` and `(expr) > x` both start with '('; try the
            // condition first and fall back when an operator follows.
            let start = self.idx;
            self.advance();
            if let Ok(inner) = self.cond() {
                if self.eat(&TokenKind::RParen) && !self.continues_expression() {
                    return Ok(inner);
                }
            }
            self.idx = start;
        }
        self.comparison()
    }

    fn continues_expression(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Gt
                | TokenKind::Lt
                | TokenKind::Ge
                | TokenKind::Le
                | TokenKind::EqEq
                | TokenKind::NotEq
        )
    }

    fn comparison(&mut self) -> Result<Cond, DslError> {
        let lhs = self.expr()?;
        let op = match self.peek() {
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Le => CompareOp::Le,
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::Ne,
            _ => return Ok(Cond::Value(lhs)),
        };
        self.advance();
        let rhs = self.expr()?;
        Ok(Cond::Compare { op, lhs, rhs })
    }

    fn args(&mut self) -> Result<Vec<(Arg, Position)>, DslError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            let pos = self.pos();
            let arg = match self.peek().clone() {
                TokenKind::Direction(d) => {
                    self.advance();
                    Arg::Direction(d)
                }
                TokenKind::Base(b) => {
                    self.advance();
                    Arg::Base(Base::Named(b))
                }
                TokenKind::Custom => {
                    self.advance();
                    Arg::Base(self.custom_base(pos)?)
                }
                _ => Arg::Expr(self.expr()?),
            };
            args.push((arg, pos));
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }

    fn custom_base(&mut self, pos: Position) -> Result<Base, DslError> {
        let args = self.args()?;
        let mut exprs = Vec::with_capacity(args.len());
        for (arg, p) in args {
            match arg {
                Arg::Expr(e) => exprs.push(e),
                _ => return Err(self.error_at(p, "custom() arguments must be time expressions")),
            }
        }
        let [start, end]: [Expr; 2] = exprs
            .try_into()
            .map_err(|_| self.error_at(pos, "custom() requires exactly 2 arguments"))?;
        Ok(Base::Custom(Box::new(start), Box::new(end)))
    }

    fn call(&mut self, func: Function, pos: Position) -> Result<Expr, DslError> {
        let args = self.args()?;
        let name = func.name();
        let call = match func {
            Function::Solar | Function::SeasonalSolar | Function::FixedOffset => {
                let [(value, _), (dir, dir_pos)] = self.exactly::<2>(args, name, pos)?;
                let value = self.expr_arg(value, name, pos)?;
                let direction = self.direction_arg(dir, name, dir_pos)?;
                match func {
                    Function::Solar => Call::Solar {
                        degrees: value,
                        direction,
                    },
                    Function::SeasonalSolar => {
                        self.require_day_edge(direction, name, dir_pos)?;
                        Call::SeasonalSolar {
                            degrees: value,
                            direction,
                        }
                    }
                    _ => Call::FixedOffset {
                        minutes: value,
                        direction,
                    },
                }
            }
            Function::ProportionalHours => {
                let [(hours, _), (base, base_pos)] = self.exactly::<2>(args, name, pos)?;
                Call::ProportionalHours {
                    hours: self.expr_arg(hours, name, pos)?,
                    base: self.base_arg(base, name, base_pos)?,
                }
            }
            Function::ProportionalMinutes => {
                if !(2..=3).contains(&args.len()) {
                    return Err(self.error_at(
                        pos,
                        format!("{name}() requires 2 or 3 arguments, got {}", args.len()),
                    ));
                }
                let mut it = args.into_iter();
                let (minutes, _) = it.next().ok_or_else(|| self.arity(name, pos))?;
                let (dir, dir_pos) = it.next().ok_or_else(|| self.arity(name, pos))?;
                let direction = self.direction_arg(dir, name, dir_pos)?;
                self.require_day_edge(direction, name, dir_pos)?;
                let base = match it.next() {
                    Some((b, p)) => Some(self.base_arg(b, name, p)?),
                    None => None,
                };
                Call::ProportionalMinutes {
                    minutes: self.expr_arg(minutes, name, pos)?,
                    direction,
                    base,
                }
            }
            Function::Midpoint | Function::EarlierOf | Function::LaterOf => {
                let [(a, _), (b, _)] = self.exactly::<2>(args, name, pos)?;
                let a = self.expr_arg(a, name, pos)?;
                let b = self.expr_arg(b, name, pos)?;
                match func {
                    Function::Midpoint => Call::Midpoint(a, b),
                    Function::EarlierOf => Call::EarlierOf(a, b),
                    _ => Call::LaterOf(a, b),
                }
            }
            Function::FirstValid => {
                if args.len() < 2 {
                    return Err(self.error_at(pos, format!("{name}() requires at least 2 arguments")));
                }
                let exprs = args
                    .into_iter()
                    .map(|(a, _)| self.expr_arg(a, name, pos).map(|b| *b))
                    .collect::<Result<Vec<_>, _>>()?;
                Call::FirstValid(exprs)
            }
        };
        Ok(Expr::Call(call))
    }

    fn arity(&self, name: &str, pos: Position) -> DslError {
        self.error_at(pos, format!("{name}() has the wrong number of arguments"))
    }

    fn exactly<const N: usize>(
        &self,
        args: Vec<(Arg, Position)>,
        name: &str,
        pos: Position,
    ) -> Result<[(Arg, Position); N], DslError> {
        let got = args.len();
        args.try_into().map_err(|_| {
            self.error_at(
                pos,
                format!("{name}() requires exactly {N} arguments, got {got}"),
            )
        })
    }

    fn expr_arg(&self, arg: Arg, name: &str, pos: Position) -> Result<Box<Expr>, DslError> {
        match arg {
            Arg::Expr(e) => Ok(Box::new(e)),
            Arg::Direction(d) => Err(self.error_at(
                pos,
                format!("{name}(): unexpected direction '{}'", d.name()),
            )),
            Arg::Base(b) => Err(self.error_at(pos, format!("{name}(): unexpected base '{b}'"))),
        }
    }

    fn direction_arg(&self, arg: Arg, name: &str, pos: Position) -> Result<Direction, DslError> {
        match arg {
            Arg::Direction(d) => Ok(d),
            _ => Err(self.error_at(pos, format!("{name}(): expected a direction"))),
        }
    }

    fn base_arg(&self, arg: Arg, name: &str, pos: Position) -> Result<Base, DslError> {
        match arg {
            Arg::Base(b) => Ok(b),
            _ => Err(self.error_at(pos, format!("{name}(): expected a base"))),
        }
    }

    fn require_day_edge(&self, d: Direction, name: &str, pos: Position) -> Result<(), DslError> {
        if d.is_day_edge() {
            Ok(())
        } else {
            Err(self.error_at(
                pos,
                format!(
                    "{name}(): direction '{}' is not allowed; use before_visible_sunrise, \
                     after_visible_sunset, before_geometric_sunrise or after_geometric_sunset",
                    d.name()
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConditionVar, DayBase, NamedMethod, Primitive};

    #[test]
    fn precedence() {
        let e = parse("sunrise + 10min * 2").unwrap();
        assert_eq!(
            e,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Primitive(Primitive::VisibleSunrise)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Duration(10.0)),
                    rhs: Box::new(Expr::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn left_associative_subtraction() {
        let e = parse("sunset - 5min - 3min").unwrap();
        assert_eq!(e.to_string(), "((visible_sunset - 5min) - 3min)");
    }

    #[test]
    fn unary_minus_folds_into_literal() {
        assert_eq!(parse("-5").unwrap(), Expr::Number(-5.0));
        assert_eq!(parse("-72min").unwrap(), Expr::Duration(-72.0));
    }

    #[test]
    fn unary_minus_on_time_rejected() {
        let err = parse("-sunrise").unwrap_err();
        assert!(err.to_string().contains("unary minus"), "{err}");
    }

    #[test]
    fn solar_call() {
        let e = parse("solar(16.1, before_sunrise)").unwrap();
        assert_eq!(e, NamedMethod::Alos16_1.expand());
    }

    #[test]
    fn proportional_hours_with_base() {
        let e = parse("proportional_hours(3, mga)").unwrap();
        assert_eq!(
            e,
            Expr::Call(Call::ProportionalHours {
                hours: Box::new(Expr::Number(3.0)),
                base: Base::Named(DayBase::Mga72),
            })
        );
    }

    #[test]
    fn custom_base_arity() {
        let err = parse("proportional_hours(3, custom(sunrise))").unwrap_err();
        assert!(err.to_string().contains("2 arguments"), "{err}");
        assert!(parse("proportional_hours(3, custom(@alos, @tzeis))").is_ok());
    }

    #[test]
    fn two_argument_functions() {
        for f in ["midpoint", "earlier_of", "later_of"] {
            assert!(parse(&format!("{f}(sunrise, sunset)")).is_ok());
            let err = parse(&format!("{f}(sunrise)")).unwrap_err();
            assert!(err.to_string().contains("exactly 2"), "{f}: {err}");
        }
    }

    #[test]
    fn first_valid_needs_two() {
        assert!(parse("first_valid(sunrise)").is_err());
        assert!(parse("first_valid(solar(16.1, before_sunrise), sunrise - 72min)").is_ok());
    }

    #[test]
    fn seasonal_direction_restricted() {
        assert!(parse("seasonal_solar(16.1, before_visible_sunrise)").is_ok());
        assert!(parse("seasonal_solar(16.1, before_noon)").is_err());
        assert!(parse("proportional_minutes(72, after_geometric_sunset)").is_ok());
        assert!(parse("proportional_minutes(72, after_sunrise)").is_err());
    }

    #[test]
    fn unknown_identifier() {
        assert_eq!(
            parse("moonrise + 5min").unwrap_err(),
            DslError::UnknownSymbol("moonrise".into())
        );
    }

    #[test]
    fn conditional_with_else_if() {
        let e = parse(
            "if (latitude > 50 && month >= 5) { sunrise } else if (season == \"winter\") { sunset } else { solar_noon }",
        )
        .unwrap();
        let Expr::Conditional { condition, otherwise, .. } = e else {
            panic!("expected conditional");
        };
        assert!(matches!(*condition, Cond::And(..)));
        assert!(matches!(otherwise.as_deref(), Some(Expr::Conditional { .. })));
    }

    #[test]
    fn parenthesized_condition_and_expression() {
        let grouped = parse("if ((latitude > 50) || !(month == 6)) { sunrise }").unwrap();
        let Expr::Conditional { condition, .. } = grouped else {
            panic!("expected conditional");
        };
        assert!(matches!(*condition, Cond::Or(..)));

        let arith = parse("if ((latitude + 1) > 30) { sunrise }").unwrap();
        let Expr::Conditional { condition, .. } = arith else {
            panic!("expected conditional");
        };
        assert!(matches!(
            *condition,
            Cond::Compare {
                op: CompareOp::Gt,
                lhs: Expr::Binary { .. },
                ..
            }
        ));
    }

    #[test]
    fn condition_var_and_date_literal() {
        let e = parse("if (date >= 21-May) { sunrise }").unwrap();
        let Expr::Conditional { condition, .. } = e else {
            panic!("expected conditional");
        };
        assert_eq!(
            *condition,
            Cond::Compare {
                op: CompareOp::Ge,
                lhs: Expr::Var(ConditionVar::Date),
                rhs: Expr::DateLiteral { day: 21, month: 5 },
            }
        );
    }

    #[test]
    fn error_position_reported() {
        let err = parse("sunrise +\n  )").unwrap_err();
        assert!(
            matches!(err, DslError::Parse { line: 2, column: 3, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let deep = format!("{}sunrise{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(err, DslError::Parse { .. }), "{err:?}");
        assert!(err.to_string().contains("nested deeper"));

        let negations = format!("{}5", "-".repeat(10_000));
        assert!(matches!(parse(&negations), Err(DslError::Parse { .. })));

        let conds = format!("if ({}true) {{ sunrise }}", "!".repeat(10_000));
        assert!(matches!(parse(&conds), Err(DslError::Parse { .. })));

        let calls = format!("{}sunrise{}", "first_valid(sunset, ".repeat(5_000), ")".repeat(5_000));
        assert!(matches!(parse(&calls), Err(DslError::Parse { .. })));
    }

    #[test]
    fn moderate_nesting_parses() {
        let src = format!("{}sunrise + 1min{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&src).is_ok());
        let src = format!("if ({}true) {{ sunrise }}", "!".repeat(40));
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse("sunrise sunset").is_err());
    }

    #[test]
    fn display_round_trips() {
        for src in [
            "visible_sunrise - 72min",
            "proportional_hours(3, custom(@alos, solar(8.5, after_sunset)))",
            "if (latitude > 50 || !(season == \"winter\")) { sunrise } else { sunset + -5min }",
            "first_valid(solar(16.1, before_sunrise), sunrise - 1h 30min, alos_72)",
            "proportional_minutes(72, before_visible_sunrise, mga_16_1)",
            "midpoint(@a, @b) + (@c - @d) / 2",
        ] {
            let tree = parse(src).unwrap();
            let again = parse(&tree.to_string()).unwrap();
            assert_eq!(tree, again, "{src}");
        }
    }
}
