//! Minimal typed PromQL expression tree.
//!
//! Only the constructs the memory queries need are modelled: vector
//! selectors, aggregations with an optional `by` clause, arithmetic with
//! optional `on(..) group_left(..)` matching, and subqueries of the
//! `*_over_time(expr[range:step])` form. Trees are immutable once built and
//! rendered to text through [`std::fmt::Display`].

#![forbid(unsafe_code)]

use std::fmt::{self, Write as _};

use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    Equal,
    Regex,
}

impl MatchOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOp::Equal => "=",
            MatchOp::Regex => "=~",
        }
    }
}

/// One `label<op>"value"` matcher. The value is stored unescaped and quoted
/// at render time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matcher {
    pub label: String,
    pub op: MatchOp,
    pub value: String,
}

impl Matcher {
    pub fn equal(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), op: MatchOp::Equal, value: value.into() }
    }

    pub fn regex(label: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self { label: label.into(), op: MatchOp::Regex, value: pattern.into() }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}\"{}\"", self.label, self.op.as_str(), escape_string(&self.value))
    }
}

/// Escape a value for a double-quoted PromQL string literal.
pub fn escape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Ordered matcher list rendered as `{a="x", b=~"y"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selector {
    matchers: SmallVec<[Matcher; 6]>,
}

impl Selector {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, m: Matcher) { self.matchers.push(m); }

    pub fn with(mut self, m: Matcher) -> Self {
        self.matchers.push(m);
        self
    }

    pub fn matchers(&self) -> &[Matcher] { &self.matchers }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.matchers.iter().map(|m| m.label.as_str())
    }

    pub fn get(&self, label: &str) -> Option<&Matcher> {
        self.matchers.iter().find(|m| m.label == label)
    }

    pub fn is_empty(&self) -> bool { self.matchers.is_empty() }
}

impl FromIterator<Matcher> for Selector {
    fn from_iter<T: IntoIterator<Item = Matcher>>(iter: T) -> Self {
        Self { matchers: iter.into_iter().collect() }
    }
}

impl Extend<Matcher> for Selector {
    fn extend<T: IntoIterator<Item = Matcher>>(&mut self, iter: T) {
        self.matchers.extend(iter);
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('{')?;
        for (i, m) in self.matchers.iter().enumerate() {
            if i > 0 { f.write_str(", ")?; }
            write!(f, "{}", m)?;
        }
        f.write_char('}')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggOp {
    Max,
    Sum,
    Count,
}

impl AggOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggOp::Max => "max",
            AggOp::Sum => "sum",
            AggOp::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeFn {
    MaxOverTime,
    CountOverTime,
}

impl RangeFn {
    pub fn as_str(self) -> &'static str {
        match self {
            RangeFn::MaxOverTime => "max_over_time",
            RangeFn::CountOverTime => "count_over_time",
        }
    }
}

/// `on(<on>) group_left(<group_left>)` vector matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VectorMatching {
    pub on: Vec<String>,
    pub group_left: Vec<String>,
}

impl VectorMatching {
    pub fn on(labels: &[&str]) -> Self {
        Self { on: owned(labels), group_left: Vec::new() }
    }

    pub fn group_left(mut self, labels: &[&str]) -> Self {
        self.group_left = owned(labels);
        self
    }
}

impl fmt::Display for VectorMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "on({})", self.on.join(", "))?;
        if !self.group_left.is_empty() {
            write!(f, " group_left({})", self.group_left.join(", "))?;
        }
        Ok(())
    }
}

fn owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| (*s).to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Vector {
        metric: String,
        selector: Selector,
    },
    Aggregate {
        op: AggOp,
        arg: Box<Expr>,
        by: Vec<String>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        matching: Option<VectorMatching>,
    },
    /// `func(arg[range:step])`. Range and step are opaque and rendered as given.
    Subquery {
        func: RangeFn,
        arg: Box<Expr>,
        range: String,
        step: String,
    },
}

impl Expr {
    pub fn vector(metric: impl Into<String>, selector: Selector) -> Self {
        Expr::Vector { metric: metric.into(), selector }
    }

    pub fn aggregate(op: AggOp, arg: Expr) -> Self {
        Expr::Aggregate { op, arg: Box::new(arg), by: Vec::new() }
    }

    pub fn aggregate_by(op: AggOp, arg: Expr, by: &[&str]) -> Self {
        Expr::Aggregate { op, arg: Box::new(arg), by: owned(by) }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), matching: None }
    }

    pub fn binary_matching(op: BinOp, lhs: Expr, rhs: Expr, matching: VectorMatching) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), matching: Some(matching) }
    }

    pub fn subquery(func: RangeFn, arg: Expr, range: impl Into<String>, step: impl Into<String>) -> Self {
        Expr::Subquery { func, arg: Box::new(arg), range: range.into(), step: step.into() }
    }

    /// Visit every vector selector in left-to-right render order.
    pub fn for_each_vector<'a>(&'a self, f: &mut impl FnMut(&'a str, &'a Selector)) {
        match self {
            Expr::Vector { metric, selector } => f(metric, selector),
            Expr::Aggregate { arg, .. } | Expr::Subquery { arg, .. } => arg.for_each_vector(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_vector(f);
                rhs.for_each_vector(f);
            }
        }
    }

    /// Metric names referenced by this expression, in render order.
    pub fn metric_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.for_each_vector(&mut |m, _| out.push(m));
        out
    }

    fn binary_precedence(&self) -> Option<u8> {
        match self {
            Expr::Binary { op, .. } => Some(op.precedence()),
            _ => None,
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr, parent: u8, right: bool) -> fmt::Result {
    let wrap = match e.binary_precedence() {
        Some(p) => p < parent || (right && p == parent),
        None => false,
    };
    if wrap { write!(f, "({})", e) } else { write!(f, "{}", e) }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Vector { metric, selector } => {
                f.write_str(metric)?;
                if !selector.is_empty() { write!(f, "{}", selector)?; }
                Ok(())
            }
            Expr::Aggregate { op, arg, by } => {
                write!(f, "{}({})", op.as_str(), arg)?;
                if !by.is_empty() { write!(f, " by ({})", by.join(", "))?; }
                Ok(())
            }
            Expr::Binary { op, lhs, rhs, matching } => {
                let p = op.precedence();
                write_operand(f, lhs, p, false)?;
                write!(f, " {} ", op.as_str())?;
                if let Some(m) = matching { write!(f, "{} ", m)?; }
                write_operand(f, rhs, p, true)
            }
            Expr::Subquery { func, arg, range, step } => {
                write!(f, "{}({}[{}:{}])", func.as_str(), arg, range, step)
            }
        }
    }
}
