//! Formula syntax tree.
//!
//! Function calls are parsed into typed [`Call`] variants, so arity and
//! keyword-argument checks happen once, in the parser. `Display` prints a
//! canonical form that re-parses to an equal tree.

use std::fmt;

use crate::catalog::{ConditionVar, DayBase, Direction, NamedMethod, Primitive, month_abbrev};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// Day definition for `proportional_hours` and `proportional_minutes`.
#[derive(Debug, Clone, PartialEq)]
pub enum Base {
    Named(DayBase),
    /// `custom(start, end)`
    Custom(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `solar(degrees, direction)`
    Solar { degrees: Box<Expr>, direction: Direction },
    /// `seasonal_solar(degrees, direction)`
    SeasonalSolar { degrees: Box<Expr>, direction: Direction },
    /// `fixed_offset(minutes, direction)`
    FixedOffset { minutes: Box<Expr>, direction: Direction },
    /// `proportional_hours(hours, base)`
    ProportionalHours { hours: Box<Expr>, base: Base },
    /// `proportional_minutes(minutes, direction[, base])`
    ProportionalMinutes {
        minutes: Box<Expr>,
        direction: Direction,
        base: Option<Base>,
    },
    Midpoint(Box<Expr>, Box<Expr>),
    FirstValid(Vec<Expr>),
    EarlierOf(Box<Expr>, Box<Expr>),
    LaterOf(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Minutes.
    Duration(f64),
    Text(String),
    Bool(bool),
    DateLiteral { day: u32, month: u32 },
    Var(ConditionVar),
    Primitive(Primitive),
    Named(NamedMethod),
    Reference(String),
    Call(Call),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Cond>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

/// Boolean condition of an `if`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Compare {
        op: CompareOp,
        lhs: Expr,
        rhs: Expr,
    },
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    /// `true`, `false`, or another boolean-valued expression.
    Value(Expr),
}

impl Expr {
    /// Visit this node and all descendants, depth first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Self::Call(call) => call.walk(f),
            Self::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(f);
                then.walk(f);
                if let Some(e) = otherwise {
                    e.walk(f);
                }
            }
            _ => {}
        }
    }
}

impl Call {
    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        match self {
            Self::Solar { degrees, .. } | Self::SeasonalSolar { degrees, .. } => degrees.walk(f),
            Self::FixedOffset { minutes, .. } => minutes.walk(f),
            Self::ProportionalHours { hours, base } => {
                hours.walk(f);
                base.walk(f);
            }
            Self::ProportionalMinutes { minutes, base, .. } => {
                minutes.walk(f);
                if let Some(b) = base {
                    b.walk(f);
                }
            }
            Self::Midpoint(a, b) | Self::EarlierOf(a, b) | Self::LaterOf(a, b) => {
                a.walk(f);
                b.walk(f);
            }
            Self::FirstValid(args) => args.iter().for_each(|a| a.walk(f)),
        }
    }

    pub fn name(&self) -> &'static str {
        use crate::catalog::Function;
        let func = match self {
            Self::Solar { .. } => Function::Solar,
            Self::SeasonalSolar { .. } => Function::SeasonalSolar,
            Self::FixedOffset { .. } => Function::FixedOffset,
            Self::ProportionalHours { .. } => Function::ProportionalHours,
            Self::ProportionalMinutes { .. } => Function::ProportionalMinutes,
            Self::Midpoint(..) => Function::Midpoint,
            Self::FirstValid(_) => Function::FirstValid,
            Self::EarlierOf(..) => Function::EarlierOf,
            Self::LaterOf(..) => Function::LaterOf,
        };
        func.name()
    }
}

impl Base {
    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        if let Self::Custom(start, end) = self {
            start.walk(f);
            end.walk(f);
        }
    }
}

impl Cond {
    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        match self {
            Self::Compare { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.walk(f);
                b.walk(f);
            }
            Self::Not(c) => c.walk(f),
            Self::Value(e) => e.walk(f),
        }
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(b) => f.write_str(b.name()),
            Self::Custom(start, end) => write!(f, "custom({start}, {end})"),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Self::Solar { degrees, direction } | Self::SeasonalSolar { degrees, direction } => {
                write!(f, "{name}({degrees}, {})", direction.name())
            }
            Self::FixedOffset { minutes, direction } => {
                write!(f, "{name}({minutes}, {})", direction.name())
            }
            Self::ProportionalHours { hours, base } => write!(f, "{name}({hours}, {base})"),
            Self::ProportionalMinutes {
                minutes,
                direction,
                base,
            } => {
                write!(f, "{name}({minutes}, {}", direction.name())?;
                if let Some(b) = base {
                    write!(f, ", {b}")?;
                }
                f.write_str(")")
            }
            Self::Midpoint(a, b) | Self::EarlierOf(a, b) | Self::LaterOf(a, b) => {
                write!(f, "{name}({a}, {b})")
            }
            Self::FirstValid(args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => fmt_number(f, *n),
            Self::Duration(m) => {
                fmt_number(f, *m)?;
                f.write_str("min")
            }
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Bool(b) => write!(f, "{b}"),
            Self::DateLiteral { day, month } => write!(f, "{day}-{}", month_abbrev(*month)),
            Self::Var(v) => f.write_str(v.name()),
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Named(m) => f.write_str(m.name()),
            Self::Reference(k) => write!(f, "@{k}"),
            Self::Call(c) => write!(f, "{c}"),
            Self::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                write!(f, "if ({condition}) {{ {then} }}")?;
                if let Some(e) = otherwise {
                    write!(f, " else {{ {e} }}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.symbol()),
            Self::And(a, b) => write!(f, "({a} && {b})"),
            Self::Or(a, b) => write!(f, "({a} || {b})"),
            Self::Not(c) => write!(f, "!({c})"),
            Self::Value(e) => write!(f, "{e}"),
        }
    }
}
