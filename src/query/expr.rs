//! Predicate expressions over declared columns

use std::fmt;
use crate::storage::Statement;
use crate::value::Value;

/// A column of a declared entity, e.g. `hero.age`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub entity: &'static str,
    pub name: &'static str,
}

impl Column {
    pub const fn new(entity: &'static str, name: &'static str) -> Self {
        Self { entity, name }
    }

    /// Qualified SQL name
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.entity, self.name)
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::from(self).eq(other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        Expr::from(self).ne(other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::from(self).lt(other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        Expr::from(self).le(other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::from(self).gt(other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        Expr::from(self).ge(other)
    }

    pub fn is_null(self) -> Expr {
        Expr::from(self).is_null()
    }

    pub fn is_not_null(self) -> Expr {
        Expr::from(self).is_not_null()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.name)
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical NOT.
    Not,
    /// Is null check.
    IsNull,
    /// Is not null check.
    IsNotNull,
}

/// Boolean or scalar expression used in filters and join conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference.
    Column(Column),
    /// Literal value.
    Literal(Value),
    /// Binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
}

impl Expr {
    /// Create a literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Create a binary expression.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    // Comparison operators

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Eq, other.into())
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::NotEq, other.into())
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Lt, other.into())
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::LtEq, other.into())
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::Gt, other.into())
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        Self::binary(self, BinaryOp::GtEq, other.into())
    }

    // Logical operators

    pub fn and(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    // Null checks

    pub fn is_null(self) -> Self {
        Self::unary(UnaryOp::IsNull, self)
    }

    pub fn is_not_null(self) -> Self {
        Self::unary(UnaryOp::IsNotNull, self)
    }

    /// Every column referenced by this expression
    pub fn columns(&self) -> Vec<Column> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<Column>) {
        match self {
            Self::Column(c) => out.push(*c),
            Self::Literal(_) => {}
            Self::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Unary { expr, .. } => expr.collect_columns(out),
        }
    }

    /// Render as SQL, binding literals as parameters of `stmt`.
    ///
    /// Comparing against a NULL literal renders `IS NULL` / `IS NOT NULL`.
    pub fn to_sql(&self, stmt: &mut Statement) -> String {
        match self {
            Self::Column(c) => c.qualified(),
            Self::Literal(v) => stmt.bind(v.clone()),
            Self::Binary { left, op, right } => {
                if matches!(right.as_ref(), Self::Literal(Value::Null)) {
                    match op {
                        BinaryOp::Eq => return format!("{} IS NULL", left.to_sql(stmt)),
                        BinaryOp::NotEq => return format!("{} IS NOT NULL", left.to_sql(stmt)),
                        _ => {}
                    }
                }
                let l = left.to_sql(stmt);
                let r = right.to_sql(stmt);
                format!("({} {} {})", l, op.as_sql(), r)
            }
            Self::Unary { op, expr } => {
                let inner = expr.to_sql(stmt);
                match op {
                    UnaryOp::Not => format!("(NOT {})", inner),
                    UnaryOp::IsNull => format!("{} IS NULL", inner),
                    UnaryOp::IsNotNull => format!("{} IS NOT NULL", inner),
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(c) => write!(f, "{}", c),
            Self::Literal(v) => write!(f, "{}", v),
            Self::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Self::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {}", expr),
                UnaryOp::IsNull => write!(f, "{} IS NULL", expr),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", expr),
            },
        }
    }
}

impl From<Column> for Expr {
    fn from(c: Column) -> Self {
        Self::Column(c)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Self::Literal(v.into())
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Self::Literal(v.into())
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Self::Literal(v.into())
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Self::Literal(v.into())
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Self::Literal(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Expr {
    fn from(v: Option<T>) -> Self {
        Self::Literal(v.into())
    }
}

fn fold(exprs: impl IntoIterator<Item = Expr>, op: BinaryOp, empty: i64) -> Expr {
    exprs
        .into_iter()
        .reduce(|acc, e| Expr::binary(acc, op, e))
        .unwrap_or(Expr::Literal(Value::Integer(empty)))
}

/// Conjunction of all predicates (true when empty)
pub fn and_(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    fold(exprs, BinaryOp::And, 1)
}

/// Disjunction of all predicates (false when empty)
pub fn or_(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    fold(exprs, BinaryOp::Or, 0)
}
