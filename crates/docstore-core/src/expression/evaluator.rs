//! Evaluation of parsed expressions against a document.
//!
//! An [`EvalContext`] binds one item to the name and value maps of a bound
//! expression. Conditions evaluate to booleans, updates produce a new
//! attribute map, and projections produce the requested sub-document.

use std::collections::HashMap;

use docstore_model::{AttributeValue, Number};

use super::ast::{
    AddAction, AttributePath, CompareOp, DeleteAction, Expr, FunctionName, LogicalOp, Operand,
    Projection, ResolvedElement, ResolvedPath, SetValue, UpdateExpr,
};
use super::parser::ExpressionError;

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// An item together with the placeholder maps of the expression applied to it.
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// The document being evaluated.
    pub item: &'a HashMap<String, AttributeValue>,
    /// `#name` to attribute name.
    pub names: &'a HashMap<String, String>,
    /// `:value` to attribute value.
    pub values: &'a HashMap<String, AttributeValue>,
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Evaluate a condition against the item.
    ///
    /// Comparisons involving a missing attribute are false. Values of
    /// different types never compare equal.
    pub fn evaluate(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        match expr {
            Expr::Compare { left, op, right } => {
                let (Some(l), Some(r)) = (self.resolve_operand(left)?, self.resolve_operand(right)?)
                else {
                    return Ok(false);
                };
                compare_values(&l, &r, *op)
            }
            Expr::Between { value, low, high } => {
                let (Some(v), Some(lo), Some(hi)) = (
                    self.resolve_operand(value)?,
                    self.resolve_operand(low)?,
                    self.resolve_operand(high)?,
                ) else {
                    return Ok(false);
                };
                Ok(compare_values(&v, &lo, CompareOp::Ge)? && compare_values(&v, &hi, CompareOp::Le)?)
            }
            Expr::In { value, list } => {
                let Some(v) = self.resolve_operand(value)? else {
                    return Ok(false);
                };
                for candidate in list {
                    if let Some(c) = self.resolve_operand(candidate)? {
                        if compare_values(&v, &c, CompareOp::Eq)? {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Expr::Logical { op, left, right } => match op {
                LogicalOp::And => Ok(self.evaluate(left)? && self.evaluate(right)?),
                LogicalOp::Or => Ok(self.evaluate(left)? || self.evaluate(right)?),
            },
            Expr::Not(inner) => self.evaluate(inner).map(|v| !v),
            Expr::Function { name, args } => self.eval_function(*name, args),
        }
    }

    fn eval_function(&self, name: FunctionName, args: &[Operand]) -> Result<bool, ExpressionError> {
        let Some(Operand::Path(path)) = args.first() else {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: "first argument must be an attribute path".to_owned(),
            });
        };
        let attr = self.resolve_path(path);

        match name {
            FunctionName::AttributeExists => Ok(attr.is_some()),
            FunctionName::AttributeNotExists => Ok(attr.is_none()),
            FunctionName::AttributeType => {
                let Some(AttributeValue::S(expected)) = self.second_arg(name, args)? else {
                    return Err(ExpressionError::TypeMismatch {
                        message: "attribute_type expects a string type descriptor".to_owned(),
                    });
                };
                Ok(attr.is_some_and(|v| v.type_descriptor() == expected))
            }
            FunctionName::BeginsWith => {
                let prefix = self.second_arg(name, args)?;
                match (attr, prefix) {
                    (Some(AttributeValue::S(s)), Some(AttributeValue::S(p))) => Ok(s.starts_with(&p)),
                    (Some(AttributeValue::B(b)), Some(AttributeValue::B(p))) => Ok(b.starts_with(&p)),
                    (_, Some(AttributeValue::S(_) | AttributeValue::B(_))) => Ok(false),
                    _ => Err(ExpressionError::TypeMismatch {
                        message: "begins_with prefix must be a string or binary".to_owned(),
                    }),
                }
            }
            FunctionName::Contains => {
                let (Some(attr), Some(needle)) = (attr, self.second_arg(name, args)?) else {
                    return Ok(false);
                };
                Ok(match (attr, &needle) {
                    (AttributeValue::S(s), AttributeValue::S(sub)) => s.contains(sub.as_str()),
                    (AttributeValue::Ss(set), AttributeValue::S(v))
                    | (AttributeValue::Ns(set), AttributeValue::N(v)) => set.contains(v),
                    (AttributeValue::Bs(set), AttributeValue::B(v)) => set.contains(v),
                    (AttributeValue::L(list), _) => list.contains(&needle),
                    _ => false,
                })
            }
        }
    }

    fn second_arg(
        &self,
        name: FunctionName,
        args: &[Operand],
    ) -> Result<Option<AttributeValue>, ExpressionError> {
        let Some(arg) = args.get(1) else {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: "missing second argument".to_owned(),
            });
        };
        self.resolve_operand(arg)
    }
}

// ---------------------------------------------------------------------------
// Operand resolution
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Resolve an operand to a value. `Ok(None)` means the path is absent.
    pub fn resolve_operand(
        &self,
        operand: &Operand,
    ) -> Result<Option<AttributeValue>, ExpressionError> {
        match operand {
            Operand::Path(path) => Ok(self.resolve_path(path).cloned()),
            Operand::Value(name) => self
                .values
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| ExpressionError::UnresolvedValue { name: name.clone() }),
            Operand::Size(path) => Ok(self
                .resolve_path(path)
                .map(|v| AttributeValue::N(attribute_size(v).to_string()))),
        }
    }

    /// Walk a path through the item, substituting `#name` placeholders.
    #[must_use]
    pub fn resolve_path(&self, path: &AttributePath) -> Option<&AttributeValue> {
        lookup(self.item, &path.resolve(self.names))
    }

    fn require_operand(
        &self,
        operand: &Operand,
        operation: &str,
    ) -> Result<AttributeValue, ExpressionError> {
        self.resolve_operand(operand)?
            .ok_or_else(|| ExpressionError::InvalidOperand {
                operation: operation.to_owned(),
                message: format!("{operand} does not exist in the item"),
            })
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Apply an update to a copy of the item.
    ///
    /// Every right-hand side reads the item as it was before the update.
    pub fn apply_update(
        &self,
        update: &UpdateExpr,
    ) -> Result<HashMap<String, AttributeValue>, ExpressionError> {
        let mut result = self.item.clone();

        for action in &update.set_actions {
            let value = self.resolve_set_value(&action.value)?;
            set_at(&mut result, &action.path.resolve(self.names), value)?;
        }
        // Every REMOVE path names an element of the original item, so later
        // list positions go first and earlier removals cannot shift them.
        let mut removals: Vec<ResolvedPath> = update
            .remove_paths
            .iter()
            .map(|path| path.resolve(self.names))
            .collect();
        removals.sort_unstable_by(|a, b| b.cmp(a));
        for path in &removals {
            remove_at(&mut result, path);
        }
        for action in &update.add_actions {
            self.apply_add(&mut result, action)?;
        }
        for action in &update.delete_actions {
            self.apply_delete(&mut result, action)?;
        }

        Ok(result)
    }

    fn resolve_set_value(&self, value: &SetValue) -> Result<AttributeValue, ExpressionError> {
        match value {
            SetValue::Operand(op) => self.require_operand(op, "SET"),
            SetValue::Plus(a, b) => {
                numeric_arithmetic(&self.resolve_set_value(a)?, &self.resolve_set_value(b)?, true)
            }
            SetValue::Minus(a, b) => numeric_arithmetic(
                &self.resolve_set_value(a)?,
                &self.resolve_set_value(b)?,
                false,
            ),
            SetValue::IfNotExists(path, fallback) => match self.resolve_path(path) {
                Some(existing) => Ok(existing.clone()),
                None => self.require_operand(fallback, "if_not_exists"),
            },
            SetValue::ListAppend(a, b) => {
                match (
                    self.require_operand(a, "list_append")?,
                    self.require_operand(b, "list_append")?,
                ) {
                    (AttributeValue::L(mut first), AttributeValue::L(second)) => {
                        first.extend(second);
                        Ok(AttributeValue::L(first))
                    }
                    _ => Err(ExpressionError::TypeMismatch {
                        message: "list_append requires two list operands".to_owned(),
                    }),
                }
            }
        }
    }

    fn apply_add(
        &self,
        item: &mut HashMap<String, AttributeValue>,
        action: &AddAction,
    ) -> Result<(), ExpressionError> {
        let add = self.require_operand(&action.value, "ADD")?;
        let path = action.path.resolve(self.names);

        let merged = match (lookup(item, &path), add) {
            (Some(current @ AttributeValue::N(_)), add @ AttributeValue::N(_)) => {
                numeric_arithmetic(current, &add, true)?
            }
            (Some(AttributeValue::Ss(current)), AttributeValue::Ss(added)) => {
                AttributeValue::Ss(set_union(current, added))
            }
            (Some(AttributeValue::Ns(current)), AttributeValue::Ns(added)) => {
                AttributeValue::Ns(set_union(current, added))
            }
            (Some(AttributeValue::Bs(current)), AttributeValue::Bs(added)) => {
                AttributeValue::Bs(set_union(current, added))
            }
            (
                None,
                add @ (AttributeValue::N(_)
                | AttributeValue::Ss(_)
                | AttributeValue::Ns(_)
                | AttributeValue::Bs(_)),
            ) => add,
            _ => {
                return Err(ExpressionError::TypeMismatch {
                    message: format!("ADD to {path} requires a number or a set of the same type"),
                });
            }
        };

        set_at(item, &path, merged)
    }

    fn apply_delete(
        &self,
        item: &mut HashMap<String, AttributeValue>,
        action: &DeleteAction,
    ) -> Result<(), ExpressionError> {
        let remove = self.require_operand(&action.value, "DELETE")?;
        let path = action.path.resolve(self.names);
        let Some(current) = lookup(item, &path) else {
            return Ok(());
        };

        let remaining = match (current, &remove) {
            (AttributeValue::Ss(cur), AttributeValue::Ss(del)) => {
                AttributeValue::Ss(set_difference(cur, del))
            }
            (AttributeValue::Ns(cur), AttributeValue::Ns(del)) => {
                AttributeValue::Ns(set_difference(cur, del))
            }
            (AttributeValue::Bs(cur), AttributeValue::Bs(del)) => {
                AttributeValue::Bs(set_difference(cur, del))
            }
            _ => {
                return Err(ExpressionError::TypeMismatch {
                    message: format!("DELETE from {path} requires a set of the same type"),
                });
            }
        };

        // An emptied set is removed.
        let emptied = matches!(&remaining, AttributeValue::Ss(v) | AttributeValue::Ns(v) if v.is_empty())
            || matches!(&remaining, AttributeValue::Bs(v) if v.is_empty());
        if emptied {
            remove_at(item, &path);
            Ok(())
        } else {
            set_at(item, &path, remaining)
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Keep only the projected paths, rebuilding their nested structure.
    /// Absent paths are skipped.
    #[must_use]
    pub fn apply_projection(&self, projection: &Projection) -> HashMap<String, AttributeValue> {
        let mut result = HashMap::new();
        for path in &projection.paths {
            let resolved = path.resolve(self.names);
            if let Some(value) = lookup(self.item, &resolved) {
                insert_at_path(&mut result, &resolved, value.clone());
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Read the value at a resolved path.
#[must_use]
pub fn lookup<'i>(
    item: &'i HashMap<String, AttributeValue>,
    path: &ResolvedPath,
) -> Option<&'i AttributeValue> {
    let (ResolvedElement::Attribute(top), rest) = path.0.split_first()? else {
        return None;
    };
    rest.iter()
        .try_fold(item.get(top)?, |current, elem| match elem {
            ResolvedElement::Attribute(name) => current.as_m()?.get(name),
            ResolvedElement::Index(idx) => current.as_l()?.get(*idx),
        })
}

/// Insert `value` into `result` at `path`, creating the enclosing maps and
/// merging with what is already there. A list index yields a list holding
/// just that element.
pub fn insert_at_path(
    result: &mut HashMap<String, AttributeValue>,
    path: &ResolvedPath,
    value: AttributeValue,
) {
    let Some((ResolvedElement::Attribute(top), rest)) = path.0.split_first() else {
        return;
    };
    if rest.is_empty() {
        result.insert(top.clone(), value);
        return;
    }
    let nested = wrap_in_path(rest, value);
    match result.get_mut(top) {
        Some(existing) => merge_values(existing, nested),
        None => {
            result.insert(top.clone(), nested);
        }
    }
}

fn wrap_in_path(path: &[ResolvedElement], value: AttributeValue) -> AttributeValue {
    let Some((head, tail)) = path.split_first() else {
        return value;
    };
    let inner = wrap_in_path(tail, value);
    match head {
        ResolvedElement::Attribute(name) => AttributeValue::M(HashMap::from([(name.clone(), inner)])),
        ResolvedElement::Index(_) => AttributeValue::L(vec![inner]),
    }
}

fn merge_values(target: &mut AttributeValue, source: AttributeValue) {
    match (target, source) {
        (AttributeValue::M(target_map), AttributeValue::M(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (AttributeValue::L(target_list), AttributeValue::L(source_list)) => {
            target_list.extend(source_list);
        }
        (target, source) => *target = source,
    }
}

fn invalid_update_path(path: &ResolvedPath) -> ExpressionError {
    ExpressionError::InvalidOperand {
        operation: "update".to_owned(),
        message: format!("the document path {path} is invalid for update"),
    }
}

/// Write `value` at `path`. Intermediate containers must already exist; an
/// index past the end of a list appends.
fn set_at(
    item: &mut HashMap<String, AttributeValue>,
    path: &ResolvedPath,
    value: AttributeValue,
) -> Result<(), ExpressionError> {
    let Some((ResolvedElement::Attribute(top), rest)) = path.0.split_first() else {
        return Err(invalid_update_path(path));
    };
    if rest.is_empty() {
        item.insert(top.clone(), value);
        return Ok(());
    }
    item.get_mut(top)
        .and_then(|container| set_in_value(container, rest, value))
        .ok_or_else(|| invalid_update_path(path))
}

fn set_in_value(
    target: &mut AttributeValue,
    path: &[ResolvedElement],
    value: AttributeValue,
) -> Option<()> {
    let (head, tail) = path.split_first()?;
    match (target, head) {
        (AttributeValue::M(map), ResolvedElement::Attribute(name)) => {
            if tail.is_empty() {
                map.insert(name.clone(), value);
                Some(())
            } else {
                set_in_value(map.get_mut(name)?, tail, value)
            }
        }
        (AttributeValue::L(list), ResolvedElement::Index(idx)) => {
            if tail.is_empty() {
                if *idx < list.len() {
                    list[*idx] = value;
                } else {
                    list.push(value);
                }
                Some(())
            } else {
                set_in_value(list.get_mut(*idx)?, tail, value)
            }
        }
        _ => None,
    }
}

/// Remove the value at `path`; absent paths are ignored.
fn remove_at(item: &mut HashMap<String, AttributeValue>, path: &ResolvedPath) {
    let Some((ResolvedElement::Attribute(top), rest)) = path.0.split_first() else {
        return;
    };
    if rest.is_empty() {
        item.remove(top);
    } else if let Some(container) = item.get_mut(top) {
        remove_in_value(container, rest);
    }
}

fn remove_in_value(target: &mut AttributeValue, path: &[ResolvedElement]) {
    let Some((head, tail)) = path.split_first() else {
        return;
    };
    match (target, head) {
        (AttributeValue::M(map), ResolvedElement::Attribute(name)) => {
            if tail.is_empty() {
                map.remove(name);
            } else if let Some(next) = map.get_mut(name) {
                remove_in_value(next, tail);
            }
        }
        (AttributeValue::L(list), ResolvedElement::Index(idx)) => {
            if tail.is_empty() {
                if *idx < list.len() {
                    list.remove(*idx);
                }
            } else if let Some(next) = list.get_mut(*idx) {
                remove_in_value(next, tail);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Compare two values. Values of different types only satisfy `<>`.
pub(crate) fn compare_values(
    left: &AttributeValue,
    right: &AttributeValue,
    op: CompareOp,
) -> Result<bool, ExpressionError> {
    match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Ok(compare_ord(a, b, op)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            Ok(compare_ord(&parse_number(a)?, &parse_number(b)?, op))
        }
        (AttributeValue::B(a), AttributeValue::B(b)) => Ok(compare_ord(a, b, op)),
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => Ok(compare_ord(a, b, op)),
        (AttributeValue::Null(_), AttributeValue::Null(_)) => {
            Ok(matches!(op, CompareOp::Eq | CompareOp::Le | CompareOp::Ge))
        }
        (a, b) if a.type_descriptor() == b.type_descriptor() => match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Ne => Ok(a != b),
            _ => Ok(false),
        },
        _ => Ok(matches!(op, CompareOp::Ne)),
    }
}

fn compare_ord<T: Ord + ?Sized>(a: &T, b: &T, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

fn parse_number(s: &str) -> Result<Number, ExpressionError> {
    s.parse::<Number>()
        .map_err(|e| ExpressionError::TypeMismatch {
            message: e.to_string(),
        })
}

fn numeric_arithmetic(
    a: &AttributeValue,
    b: &AttributeValue,
    is_add: bool,
) -> Result<AttributeValue, ExpressionError> {
    let (AttributeValue::N(na), AttributeValue::N(nb)) = (a, b) else {
        return Err(ExpressionError::TypeMismatch {
            message: format!(
                "arithmetic requires number operands, got {} and {}",
                a.type_descriptor(),
                b.type_descriptor()
            ),
        });
    };
    let (x, y) = (parse_number(na)?, parse_number(nb)?);
    let sum = if is_add { x.checked_add(&y) } else { x.checked_sub(&y) };
    sum.map(|n| AttributeValue::N(n.to_string()))
        .map_err(|e| ExpressionError::InvalidOperand {
            operation: "arithmetic".to_owned(),
            message: e.to_string(),
        })
}

fn set_union<T: Clone + PartialEq>(current: &[T], added: Vec<T>) -> Vec<T> {
    let mut merged = current.to_vec();
    for v in added {
        if !merged.contains(&v) {
            merged.push(v);
        }
    }
    merged
}

fn set_difference<T: Clone + PartialEq>(current: &[T], removed: &[T]) -> Vec<T> {
    current
        .iter()
        .filter(|v| !removed.contains(v))
        .cloned()
        .collect()
}

/// `size()` of a value: string length in bytes, binary length, element count
/// for sets, lists and maps.
#[must_use]
pub fn attribute_size(val: &AttributeValue) -> usize {
    match val {
        AttributeValue::S(s) => s.len(),
        AttributeValue::N(n) => n.len(),
        AttributeValue::B(b) => b.len(),
        AttributeValue::Ss(v) | AttributeValue::Ns(v) => v.len(),
        AttributeValue::Bs(v) => v.len(),
        AttributeValue::Bool(_) | AttributeValue::Null(_) => 1,
        AttributeValue::L(v) => v.len(),
        AttributeValue::M(m) => m.len(),
    }
}
