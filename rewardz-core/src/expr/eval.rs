//! Tree-walking evaluator.

use std::cmp::Ordering;

use super::parser::{ArithOp, CmpOp, Node};
use super::value::Value;
use super::{Context, ExpressionError};

pub(crate) struct Evaluator<'c, 'a> {
    ctx: &'c Context<'a>,
    depth: usize,
}

fn type_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::Type(message.into())
}

impl<'c, 'a> Evaluator<'c, 'a> {
    pub(crate) fn new(ctx: &'c Context<'a>, depth: usize) -> Self {
        Self { ctx, depth }
    }

    pub(crate) fn eval(&self, node: &Node) -> Result<Value, ExpressionError> {
        match node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Name(name) => self
                .ctx
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UndefinedName(name.clone())),
            Node::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            )),
            Node::Neg(inner) => match self.eval(inner)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(type_error(format!("cannot negate {}", other.type_name()))),
            },
            Node::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            Node::And(left, right) => {
                if !self.eval(left)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(right)?.is_truthy()))
            }
            Node::Or(left, right) => {
                if self.eval(left)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(right)?.is_truthy()))
            }
            Node::Arith(op, left, right) => arith(*op, self.eval(left)?, self.eval(right)?),
            Node::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, node) in rest {
                    let right = self.eval(node)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Node::Index(target, index) => index_value(self.eval(target)?, &self.eval(index)?),
            Node::Member(target, name) => match self.eval(target)? {
                Value::Map(mut entries) => Ok(entries.remove(name).unwrap_or(Value::Null)),
                other => Err(type_error(format!(
                    "cannot read .{name} of {}",
                    other.type_name()
                ))),
            },
            Node::Call(callee, args) => self.call(callee, args),
        }
    }

    fn call(&self, callee: &Node, args: &[Node]) -> Result<Value, ExpressionError> {
        // Builtins are only consulted when the context does not shadow them.
        if let Node::Name(name) = callee {
            if self.ctx.get(name).is_none() {
                if let Some(builtin) = Builtin::from_name(name) {
                    let args = self.eval_args(args)?;
                    return builtin.apply(args);
                }
            }
        }

        match self.eval(callee)? {
            Value::Helper(helper) => {
                let bound = helper.apply(self.eval_args(args)?);
                let Some(functions) = self.ctx.functions() else {
                    return Err(ExpressionError::NotCallable(bound.helper_id));
                };
                functions.call(&bound, self.ctx.root(), self.depth + 1)
            }
            other => Err(ExpressionError::NotCallable(describe(callee, &other))),
        }
    }

    fn eval_args(&self, args: &[Node]) -> Result<Vec<Value>, ExpressionError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }
}

fn describe(callee: &Node, value: &Value) -> String {
    match callee {
        Node::Name(name) => format!("{name} ({})", value.type_name()),
        _ => value.type_name().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn arith(op: ArithOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    match (op, left, right) {
        (ArithOp::Add, Value::Str(mut a), Value::Str(b)) => {
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (ArithOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (op, Value::Number(a), Value::Number(b)) => {
            let n = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => {
                    if b == 0.0 {
                        return Err(ExpressionError::DivisionByZero);
                    }
                    a / b
                }
                ArithOp::Rem => {
                    if b == 0.0 {
                        return Err(ExpressionError::DivisionByZero);
                    }
                    // Result takes the divisor's sign.
                    a - b * (a / b).floor()
                }
            };
            Ok(Value::Number(n))
        }
        (op, a, b) => Err(type_error(format!(
            "unsupported operands for {op:?}: {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    let ordering = |accept: fn(Ordering) -> bool| -> Result<bool, ExpressionError> {
        match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(false),
            (Value::Number(a), Value::Number(b)) => Ok(a.partial_cmp(b).is_some_and(accept)),
            (Value::Str(a), Value::Str(b)) => Ok(accept(a.cmp(b))),
            (a, b) => Err(type_error(format!(
                "cannot order {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    };

    match op {
        CmpOp::Eq => Ok(left == right),
        CmpOp::NotEq => Ok(left != right),
        CmpOp::Lt => ordering(Ordering::is_lt),
        CmpOp::LtEq => ordering(Ordering::is_le),
        CmpOp::Gt => ordering(Ordering::is_gt),
        CmpOp::GtEq => ordering(Ordering::is_ge),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, ExpressionError> {
    match (container, item) {
        (Value::Null, _) => Ok(false),
        (Value::List(items), item) => Ok(items.contains(item)),
        (Value::Map(entries), Value::Str(key)) => Ok(entries.contains_key(key)),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (c, i) => Err(type_error(format!(
            "cannot test {} membership in {}",
            i.type_name(),
            c.type_name()
        ))),
    }
}

/// Convert an index to a position, counting from the end when negative.
fn position(index: f64, len: usize) -> Result<Option<usize>, ExpressionError> {
    if index.fract() != 0.0 || !index.is_finite() {
        return Err(type_error(format!("index {index} is not an integer")));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let i = index as i64;
    #[allow(clippy::cast_possible_wrap)]
    let len = len as i64;
    let resolved = if i < 0 { len + i } else { i };
    #[allow(clippy::cast_sign_loss)]
    Ok((0..len).contains(&resolved).then_some(resolved as usize))
}

fn index_value(target: Value, index: &Value) -> Result<Value, ExpressionError> {
    match (target, index) {
        (Value::Map(mut entries), Value::Str(key)) => {
            Ok(entries.remove(key).unwrap_or(Value::Null))
        }
        (Value::List(mut items), Value::Number(n)) => Ok(position(*n, items.len())?
            .map_or(Value::Null, |i| items.swap_remove(i))),
        (Value::Str(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(position(*n, chars.len())?
                .map_or(Value::Null, |i| Value::Str(chars[i].to_string())))
        }
        (t, i) => Err(type_error(format!(
            "cannot index {} with {}",
            t.type_name(),
            i.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Builtin {
    Len,
    Sum,
    Min,
    Max,
    Get,
    Count,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Self::Len,
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "get" => Self::Get,
            "count" => Self::Count,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Get => "get",
            Self::Count => "count",
        }
    }

    fn arity(self, expected: usize, args: &[Value]) -> Result<(), ExpressionError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ExpressionError::Arity {
                name: self.name().to_string(),
                expected,
                found: args.len(),
            })
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply(self, mut args: Vec<Value>) -> Result<Value, ExpressionError> {
        match self {
            Self::Len => {
                self.arity(1, &args)?;
                let n = match &args[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(entries) => entries.len(),
                    other => return Err(type_error(format!("len() of {}", other.type_name()))),
                };
                Ok(Value::Number(n as f64))
            }
            Self::Sum => {
                self.arity(1, &args)?;
                let total = match &args[0] {
                    Value::Null => 0.0,
                    Value::List(items) => sum_numbers(items.iter())?,
                    Value::Map(entries) => sum_numbers(entries.values())?,
                    other => return Err(type_error(format!("sum() of {}", other.type_name()))),
                };
                Ok(Value::Number(total))
            }
            Self::Min | Self::Max => {
                if args.is_empty() {
                    return Err(ExpressionError::Arity {
                        name: self.name().to_string(),
                        expected: 1,
                        found: 0,
                    });
                }
                let candidates = match args.pop() {
                    Some(Value::List(items)) if args.is_empty() => items,
                    Some(last) => {
                        args.push(last);
                        args
                    }
                    None => Vec::new(),
                };
                let mut best: Option<f64> = None;
                for v in &candidates {
                    let n = v.as_number().ok_or_else(|| {
                        type_error(format!("{}() of {}", self.name(), v.type_name()))
                    })?;
                    best = Some(match (best, self) {
                        (None, _) => n,
                        (Some(b), Self::Min) => b.min(n),
                        (Some(b), _) => b.max(n),
                    });
                }
                best.map(Value::Number)
                    .ok_or_else(|| type_error(format!("{}() of an empty list", self.name())))
            }
            Self::Get => {
                let default = match args.len() {
                    2 => Value::Null,
                    3 => args.pop().unwrap_or_default(),
                    found => {
                        return Err(ExpressionError::Arity {
                            name: "get".to_string(),
                            expected: 3,
                            found,
                        });
                    }
                };
                let key = args.pop().unwrap_or_default();
                let target = args.pop().unwrap_or_default();
                let found = match target {
                    Value::Null => Value::Null,
                    target => index_value(target, &key)?,
                };
                Ok(if found == Value::Null { default } else { found })
            }
            Self::Count => {
                self.arity(2, &args)?;
                match &args[0] {
                    Value::List(items) => {
                        Ok(Value::Number(items.iter().filter(|v| **v == args[1]).count() as f64))
                    }
                    other => Err(type_error(format!("count() of {}", other.type_name()))),
                }
            }
        }
    }
}

fn sum_numbers<'v>(mut values: impl Iterator<Item = &'v Value>) -> Result<f64, ExpressionError> {
    values.try_fold(0.0, |acc, v| {
        v.as_number()
            .map(|n| acc + n)
            .ok_or_else(|| type_error(format!("cannot sum {}", v.type_name())))
    })
}
