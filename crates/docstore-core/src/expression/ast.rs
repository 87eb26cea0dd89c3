//! Syntax trees for condition, update and projection expressions.
//!
//! Placeholders keep their sigil: a `#yr` path element is stored as
//! `PathElement::Attribute("#yr")` and a `:yyyy` operand as
//! `Operand::Value(":yyyy")`, matching the keys of the caller's name and value
//! maps.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Condition expression: key conditions, filters and write conditions.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `left op right`.
    Compare {
        /// Left-hand operand.
        left: Box<Operand>,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand operand.
        right: Box<Operand>,
    },
    /// `value BETWEEN low AND high`, bounds inclusive.
    Between {
        /// Value to test.
        value: Box<Operand>,
        /// Lower bound.
        low: Box<Operand>,
        /// Upper bound.
        high: Box<Operand>,
    },
    /// `value IN (a, b, ...)`.
    In {
        /// Value to search for.
        value: Box<Operand>,
        /// Candidates.
        list: Vec<Operand>,
    },
    /// `left AND right` / `left OR right`.
    Logical {
        /// Logical operator.
        op: LogicalOp,
        /// Left-hand expression.
        left: Box<Expr>,
        /// Right-hand expression.
        right: Box<Expr>,
    },
    /// `NOT expr`.
    Not(Box<Expr>),
    /// Boolean function call.
    Function {
        /// Function name.
        name: FunctionName,
        /// Arguments.
        args: Vec<Operand>,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// The operator seen from the other side: `a < b` is `b > a`.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Eq | Self::Ne => self,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Whether the operator needs an ordering rather than just equality.
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// AND.
    And,
    /// OR.
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// Boolean functions usable as conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    /// `attribute_exists(path)`
    AttributeExists,
    /// `attribute_not_exists(path)`
    AttributeNotExists,
    /// `attribute_type(path, :type)`
    AttributeType,
    /// `begins_with(path, :prefix)`
    BeginsWith,
    /// `contains(path, :operand)`
    Contains,
}

impl FunctionName {
    /// Number of arguments the function takes.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::AttributeExists | Self::AttributeNotExists => 1,
            Self::AttributeType | Self::BeginsWith | Self::Contains => 2,
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::AttributeType => "attribute_type",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
        })
    }
}

/// A value producer inside an expression.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Document path (`info.rating`, `#yr`, `actors[0]`).
    Path(AttributePath),
    /// Value placeholder, sigil included (`:yyyy`).
    Value(String),
    /// `size(path)`.
    Size(AttributePath),
}

impl Operand {
    /// The path this operand reads, if it reads one.
    #[must_use]
    pub fn path(&self) -> Option<&AttributePath> {
        match self {
            Self::Path(p) | Self::Size(p) => Some(p),
            Self::Value(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{p}"),
            Self::Value(v) => f.write_str(v),
            Self::Size(p) => write!(f, "size({p})"),
        }
    }
}

/// A document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    /// Elements in order; the first is always an attribute.
    pub elements: Vec<PathElement>,
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    /// Attribute name or `#placeholder`.
    Attribute(String),
    /// List index.
    Index(usize),
}

impl AttributePath {
    /// Whether the path is a single top-level attribute.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.elements.len() == 1
    }

    /// Resolve `#name` placeholders through `names`. Unknown placeholders
    /// are left as written.
    #[must_use]
    pub fn resolve(&self, names: &HashMap<String, String>) -> ResolvedPath {
        ResolvedPath(
            self.elements
                .iter()
                .map(|elem| match elem {
                    PathElement::Attribute(name) => ResolvedElement::Attribute(
                        names.get(name).cloned().unwrap_or_else(|| name.clone()),
                    ),
                    PathElement::Index(idx) => ResolvedElement::Index(*idx),
                })
                .collect(),
        )
    }

    /// The resolved top-level attribute name.
    #[must_use]
    pub fn top_name<'a>(&'a self, names: &'a HashMap<String, String>) -> Option<&'a str> {
        let Some(PathElement::Attribute(name)) = self.elements.first() else {
            return None;
        };
        Some(names.get(name).map_or(name.as_str(), String::as_str))
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.elements.iter().enumerate() {
            match elem {
                PathElement::Attribute(name) if i == 0 => write!(f, "{name}")?,
                PathElement::Attribute(name) => write!(f, ".{name}")?,
                PathElement::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// A path with every placeholder substituted.
///
/// Paths order element by element, list indexes numerically, so sibling
/// indexes of one list sort by position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedPath(pub Vec<ResolvedElement>);

/// One step of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolvedElement {
    /// Attribute name.
    Attribute(String),
    /// List index.
    Index(usize),
}

impl ResolvedPath {
    /// Whether one path is a prefix of the other (or both are equal).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// Whether the paths disagree on map-vs-list access at the first point
    /// where they differ.
    #[must_use]
    pub fn conflicts(&self, other: &Self) -> bool {
        for (a, b) in self.0.iter().zip(&other.0) {
            match (a, b) {
                (ResolvedElement::Attribute(x), ResolvedElement::Attribute(y)) if x != y => {
                    return false;
                }
                (ResolvedElement::Index(x), ResolvedElement::Index(y)) if x != y => return false,
                (ResolvedElement::Attribute(_), ResolvedElement::Index(_))
                | (ResolvedElement::Index(_), ResolvedElement::Attribute(_)) => return true,
                _ => {}
            }
        }
        false
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.0.iter().enumerate() {
            match elem {
                ResolvedElement::Attribute(name) if i == 0 => write!(f, "{name}")?,
                ResolvedElement::Attribute(name) => write!(f, ".{name}")?,
                ResolvedElement::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// Update expression: all four clause kinds.
#[derive(Debug, Clone, Default)]
pub struct UpdateExpr {
    /// `SET path = value, ...`
    pub set_actions: Vec<SetAction>,
    /// `REMOVE path, ...`
    pub remove_paths: Vec<AttributePath>,
    /// `ADD path value, ...`
    pub add_actions: Vec<AddAction>,
    /// `DELETE path value, ...`
    pub delete_actions: Vec<DeleteAction>,
}

impl UpdateExpr {
    /// Whether no clause has any action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set_actions.is_empty()
            && self.remove_paths.is_empty()
            && self.add_actions.is_empty()
            && self.delete_actions.is_empty()
    }

    /// Every path the update writes to, in clause order.
    pub fn target_paths(&self) -> impl Iterator<Item = &AttributePath> {
        self.set_actions
            .iter()
            .map(|a| &a.path)
            .chain(self.remove_paths.iter())
            .chain(self.add_actions.iter().map(|a| &a.path))
            .chain(self.delete_actions.iter().map(|a| &a.path))
    }
}

/// `path = value`.
#[derive(Debug, Clone)]
pub struct SetAction {
    /// Target.
    pub path: AttributePath,
    /// Right-hand side.
    pub value: SetValue,
}

/// Right-hand side of a SET action.
#[derive(Debug, Clone)]
pub enum SetValue {
    /// Plain operand.
    Operand(Operand),
    /// `left + right`.
    Plus(Box<SetValue>, Box<SetValue>),
    /// `left - right`.
    Minus(Box<SetValue>, Box<SetValue>),
    /// `if_not_exists(path, fallback)`.
    IfNotExists(AttributePath, Operand),
    /// `list_append(a, b)`.
    ListAppend(Operand, Operand),
}

/// `path value` in an ADD clause.
#[derive(Debug, Clone)]
pub struct AddAction {
    /// Target.
    pub path: AttributePath,
    /// Number or set to add.
    pub value: Operand,
}

/// `path value` in a DELETE clause.
#[derive(Debug, Clone)]
pub struct DeleteAction {
    /// Target.
    pub path: AttributePath,
    /// Set of elements to remove.
    pub value: Operand,
}

/// Projection expression: comma-separated paths.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Requested paths.
    pub paths: Vec<AttributePath>,
}

// ---------------------------------------------------------------------------
// Placeholder collection
// ---------------------------------------------------------------------------

/// Placeholders referenced by an expression, sigils included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    /// `#name` tokens.
    pub names: BTreeSet<String>,
    /// `:value` tokens.
    pub values: BTreeSet<String>,
}

impl Placeholders {
    /// Record every `#name` in a path.
    pub fn visit_path(&mut self, path: &AttributePath) {
        for elem in &path.elements {
            if let PathElement::Attribute(name) = elem {
                if name.starts_with('#') {
                    self.names.insert(name.clone());
                }
            }
        }
    }

    /// Record the placeholders of an operand.
    pub fn visit_operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Path(p) | Operand::Size(p) => self.visit_path(p),
            Operand::Value(v) => {
                self.values.insert(v.clone());
            }
        }
    }

    /// Record the placeholders of a condition expression.
    pub fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Compare { left, right, .. } => {
                self.visit_operand(left);
                self.visit_operand(right);
            }
            Expr::Between { value, low, high } => {
                self.visit_operand(value);
                self.visit_operand(low);
                self.visit_operand(high);
            }
            Expr::In { value, list } => {
                self.visit_operand(value);
                list.iter().for_each(|op| self.visit_operand(op));
            }
            Expr::Logical { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::Not(inner) => self.visit_expr(inner),
            Expr::Function { args, .. } => args.iter().for_each(|op| self.visit_operand(op)),
        }
    }

    /// Record the placeholders of an update expression.
    pub fn visit_update(&mut self, update: &UpdateExpr) {
        for action in &update.set_actions {
            self.visit_path(&action.path);
            self.visit_set_value(&action.value);
        }
        update.remove_paths.iter().for_each(|p| self.visit_path(p));
        for action in &update.add_actions {
            self.visit_path(&action.path);
            self.visit_operand(&action.value);
        }
        for action in &update.delete_actions {
            self.visit_path(&action.path);
            self.visit_operand(&action.value);
        }
    }

    fn visit_set_value(&mut self, value: &SetValue) {
        match value {
            SetValue::Operand(op) => self.visit_operand(op),
            SetValue::Plus(a, b) | SetValue::Minus(a, b) => {
                self.visit_set_value(a);
                self.visit_set_value(b);
            }
            SetValue::IfNotExists(path, op) => {
                self.visit_path(path);
                self.visit_operand(op);
            }
            SetValue::ListAppend(a, b) => {
                self.visit_operand(a);
                self.visit_operand(b);
            }
        }
    }
}
