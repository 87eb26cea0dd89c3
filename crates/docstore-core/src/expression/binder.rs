//! Binding expression text to its placeholder maps.
//!
//! A [`Binder`] parses each expression of a request once, checks that every
//! `#name` and `:value` it references has an entry, runs the local type
//! checks, and records which entries were used. Entries that no expression
//! of the request referenced are reported once, when the binder is
//! finished.

use std::collections::HashMap;
use std::fmt;

use docstore_model::{AttributeValue, ScalarAttributeType};
use tracing::warn;

use super::ast::{
    AttributePath, Expr, FunctionName, Operand, Placeholders, Projection, SetValue, UpdateExpr,
};
use super::evaluator::EvalContext;
use super::parser::{ExpressionError, parse_condition, parse_projection, parse_update};
use crate::error::BindingError;

/// `#name` placeholder to attribute name.
pub type NameMap = HashMap<String, String>;

/// `:value` placeholder to attribute value.
pub type ValueMap = HashMap<String, AttributeValue>;

// ---------------------------------------------------------------------------
// Grammars
// ---------------------------------------------------------------------------

/// One of the three expression grammars.
pub trait Grammar: Sized + Clone + fmt::Debug {
    /// Parse expression text.
    fn parse(text: &str) -> Result<Self, ExpressionError>;

    /// The placeholders the syntax tree references.
    fn placeholders(&self) -> Placeholders;

    /// Reject operands that can never have the type their position needs.
    fn check_types(&self, scope: &TypeScope<'_>) -> Result<(), BindingError>;
}

impl Grammar for Expr {
    fn parse(text: &str) -> Result<Self, ExpressionError> {
        parse_condition(text)
    }

    fn placeholders(&self) -> Placeholders {
        let mut found = Placeholders::default();
        found.visit_expr(self);
        found
    }

    fn check_types(&self, scope: &TypeScope<'_>) -> Result<(), BindingError> {
        scope.check_condition(self)
    }
}

impl Grammar for UpdateExpr {
    fn parse(text: &str) -> Result<Self, ExpressionError> {
        parse_update(text)
    }

    fn placeholders(&self) -> Placeholders {
        let mut found = Placeholders::default();
        found.visit_update(self);
        found
    }

    fn check_types(&self, scope: &TypeScope<'_>) -> Result<(), BindingError> {
        scope.check_update(self)
    }
}

impl Grammar for Projection {
    fn parse(text: &str) -> Result<Self, ExpressionError> {
        parse_projection(text)
    }

    fn placeholders(&self) -> Placeholders {
        let mut found = Placeholders::default();
        self.paths.iter().for_each(|p| found.visit_path(p));
        found
    }

    fn check_types(&self, _scope: &TypeScope<'_>) -> Result<(), BindingError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bound expression
// ---------------------------------------------------------------------------

/// A parsed expression with the placeholder entries it references.
#[derive(Debug, Clone)]
pub struct BoundExpression<T> {
    text: String,
    ast: T,
    names: NameMap,
    values: ValueMap,
}

impl<T> BoundExpression<T> {
    /// The original expression text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The syntax tree.
    #[must_use]
    pub fn ast(&self) -> &T {
        &self.ast
    }

    /// Name entries referenced by the expression.
    #[must_use]
    pub fn names(&self) -> &NameMap {
        &self.names
    }

    /// Value entries referenced by the expression.
    #[must_use]
    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    /// An evaluation context for `item` using this expression's entries.
    #[must_use]
    pub fn context<'a>(&'a self, item: &'a HashMap<String, AttributeValue>) -> EvalContext<'a> {
        EvalContext {
            item,
            names: &self.names,
            values: &self.values,
        }
    }
}

impl<T> fmt::Display for BoundExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

/// Declared scalar types of a collection's attributes.
pub trait AttributeTypes: fmt::Debug + Send + Sync {
    /// The declared type of a top-level attribute, if it has one.
    fn declared_type(&self, attribute: &str) -> Option<ScalarAttributeType>;
}

/// Binds the expressions of one request against shared placeholder maps.
#[derive(Debug)]
pub struct Binder<'a> {
    names: &'a NameMap,
    values: &'a ValueMap,
    types: Option<&'a dyn AttributeTypes>,
    used: Placeholders,
    warn_unused: bool,
}

impl<'a> Binder<'a> {
    /// Create a binder over the request's maps.
    #[must_use]
    pub fn new(names: &'a NameMap, values: &'a ValueMap) -> Self {
        Self {
            names,
            values,
            types: None,
            used: Placeholders::default(),
            warn_unused: true,
        }
    }

    /// Check operands against the declared attribute types of a collection.
    #[must_use]
    pub fn with_types(mut self, types: &'a dyn AttributeTypes) -> Self {
        self.types = Some(types);
        self
    }

    /// Enable or disable the unused-entry warnings emitted by [`Binder::finish`].
    #[must_use]
    pub fn warn_unused(mut self, enabled: bool) -> Self {
        self.warn_unused = enabled;
        self
    }

    /// Parse and bind one expression.
    pub fn bind<T: Grammar>(&mut self, text: &str) -> Result<BoundExpression<T>, BindingError> {
        let ast = T::parse(text).map_err(|source| BindingError::Syntax {
            expression: text.to_owned(),
            source,
        })?;

        let refs = ast.placeholders();
        let unresolved = |token: &String| BindingError::UnresolvedPlaceholder {
            token: token.clone(),
            expression: text.to_owned(),
        };

        let mut names = NameMap::with_capacity(refs.names.len());
        for token in &refs.names {
            let name = self.names.get(token).ok_or_else(|| unresolved(token))?;
            names.insert(token.clone(), name.clone());
        }
        let mut values = ValueMap::with_capacity(refs.values.len());
        for token in &refs.values {
            let value = self.values.get(token).ok_or_else(|| unresolved(token))?;
            values.insert(token.clone(), value.clone());
        }

        ast.check_types(&TypeScope {
            names: &names,
            values: &values,
            types: self.types,
        })?;

        self.used.names.extend(refs.names);
        self.used.values.extend(refs.values);

        Ok(BoundExpression {
            text: text.to_owned(),
            ast,
            names,
            values,
        })
    }

    /// Bind an optional expression.
    pub fn bind_opt<T: Grammar>(
        &mut self,
        text: Option<&str>,
    ) -> Result<Option<BoundExpression<T>>, BindingError> {
        text.map(|t| self.bind(t)).transpose()
    }

    /// Map entries that no bound expression referenced, sorted.
    #[must_use]
    pub fn unused(&self) -> Vec<&str> {
        let names = self
            .names
            .keys()
            .filter(|k| !self.used.names.contains(*k));
        let values = self
            .values
            .keys()
            .filter(|k| !self.used.values.contains(*k));
        let mut unused: Vec<&str> = names.chain(values).map(String::as_str).collect();
        unused.sort_unstable();
        unused
    }

    /// Finish the request, warning once for every unused entry. Returns the
    /// unused entries.
    pub fn finish(self) -> Vec<String> {
        let unused: Vec<String> = self.unused().into_iter().map(str::to_owned).collect();
        if self.warn_unused {
            for token in &unused {
                warn!(placeholder = %token, "expression map entry is not used by any expression");
            }
        }
        unused
    }
}

/// Bind a single expression on its own.
pub fn bind<T: Grammar>(
    text: &str,
    names: &NameMap,
    values: &ValueMap,
) -> Result<BoundExpression<T>, BindingError> {
    let mut binder = Binder::new(names, values);
    let bound = binder.bind(text)?;
    binder.finish();
    Ok(bound)
}

// ---------------------------------------------------------------------------
// Type checks
// ---------------------------------------------------------------------------

/// What the type checks can see: the bound entries and the declared types.
#[derive(Debug)]
pub struct TypeScope<'a> {
    names: &'a NameMap,
    values: &'a ValueMap,
    types: Option<&'a dyn AttributeTypes>,
}

/// The statically known type of an operand.
enum Known {
    /// A declared attribute or `size(...)`.
    Anchor { label: String, ty: &'static str },
    /// A supplied value.
    Value(&'static str),
    Unknown,
}

impl Known {
    fn ty(&self) -> Option<&'static str> {
        match self {
            Self::Anchor { ty, .. } | Self::Value(ty) => Some(ty),
            Self::Unknown => None,
        }
    }
}

fn mismatch(attribute: impl Into<String>, expected: &str, got: &str) -> BindingError {
    BindingError::TypeMismatch {
        attribute: attribute.into(),
        expected: expected.to_owned(),
        got: got.to_owned(),
    }
}

impl TypeScope<'_> {
    fn label(&self, path: &AttributePath) -> String {
        path.resolve(self.names).to_string()
    }

    fn value_type(&self, operand: &Operand) -> Option<&'static str> {
        match operand {
            Operand::Value(token) => self.values.get(token).map(AttributeValue::type_descriptor),
            _ => None,
        }
    }

    fn classify(&self, operand: &Operand) -> Known {
        match operand {
            Operand::Value(_) => self.value_type(operand).map_or(Known::Unknown, Known::Value),
            Operand::Size(path) => Known::Anchor {
                label: format!("size({})", self.label(path)),
                ty: "N",
            },
            Operand::Path(path) if path.is_top_level() => self
                .types
                .and_then(|t| t.declared_type(path.top_name(self.names)?))
                .map_or(Known::Unknown, |ty| Known::Anchor {
                    label: self.label(path),
                    ty: ty.as_str(),
                }),
            Operand::Path(_) => Known::Unknown,
        }
    }

    fn check_pair(&self, a: &Operand, b: &Operand) -> Result<(), BindingError> {
        match (&self.classify(a), &self.classify(b)) {
            (Known::Anchor { label, ty }, other) | (other, Known::Anchor { label, ty }) => {
                match other.ty() {
                    Some(got) if got != *ty => Err(mismatch(label.as_str(), ty, got)),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn check_condition(&self, expr: &Expr) -> Result<(), BindingError> {
        match expr {
            Expr::Compare { left, right, .. } => self.check_pair(left, right),
            Expr::Between { value, low, high } => {
                self.check_pair(value, low)?;
                self.check_pair(value, high)?;
                match (self.value_type(low), self.value_type(high)) {
                    (Some(lo), Some(hi)) if lo != hi => {
                        Err(mismatch(format!("between bounds of {value}"), lo, hi))
                    }
                    _ => Ok(()),
                }
            }
            Expr::In { value, list } => list.iter().try_for_each(|c| self.check_pair(value, c)),
            Expr::Logical { left, right, .. } => {
                self.check_condition(left)?;
                self.check_condition(right)
            }
            Expr::Not(inner) => self.check_condition(inner),
            Expr::Function { name, args } => self.check_function(*name, args),
        }
    }

    fn check_function(&self, name: FunctionName, args: &[Operand]) -> Result<(), BindingError> {
        let (Some(target), Some(arg)) = (args.first(), args.get(1)) else {
            return Ok(());
        };
        match name {
            FunctionName::BeginsWith => {
                if let Some(got) = self.value_type(arg).filter(|t| !matches!(*t, "S" | "B")) {
                    return Err(mismatch(format!("begins_with prefix for {target}"), "S or B", got));
                }
                self.check_pair(target, arg)
            }
            FunctionName::AttributeType => match self.value_type(arg) {
                Some(got) if got != "S" => {
                    Err(mismatch(format!("attribute_type name for {target}"), "S", got))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn check_update(&self, update: &UpdateExpr) -> Result<(), BindingError> {
        for action in &update.set_actions {
            self.check_set_value(&action.path, &action.value)?;
        }
        for action in &update.add_actions {
            if let Some(got) = self
                .value_type(&action.value)
                .filter(|t| !matches!(*t, "N" | "SS" | "NS" | "BS"))
            {
                return Err(mismatch(self.label(&action.path), "N or a set", got));
            }
        }
        for action in &update.delete_actions {
            if let Some(got) = self
                .value_type(&action.value)
                .filter(|t| !matches!(*t, "SS" | "NS" | "BS"))
            {
                return Err(mismatch(self.label(&action.path), "a set", got));
            }
        }
        Ok(())
    }

    fn check_set_value(&self, target: &AttributePath, value: &SetValue) -> Result<(), BindingError> {
        match value {
            SetValue::Plus(a, b) | SetValue::Minus(a, b) => {
                for side in [a, b] {
                    if let SetValue::Operand(op) = &**side {
                        if let Some(got) = self.value_type(op).filter(|t| *t != "N") {
                            return Err(mismatch(self.label(target), "N", got));
                        }
                    }
                    self.check_set_value(target, side)?;
                }
                Ok(())
            }
            SetValue::ListAppend(a, b) => {
                for op in [a, b] {
                    if let Some(got) = self.value_type(op).filter(|t| *t != "L") {
                        return Err(mismatch(self.label(target), "L", got));
                    }
                }
                Ok(())
            }
            SetValue::Operand(_) | SetValue::IfNotExists(..) => Ok(()),
        }
    }
}
