use crate::ast::{BinaryOp, Expr, ExprKind, IndexStep, Program, Routine, RoutineId, Stmt, UnaryOp, RESULT_SLOT};
use crate::error::{PascalError, Span};
use crate::value::Value;
use log::{trace, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

/// Receives each `writeln` line in program order.
pub trait OutputSink {
    fn write_line(&mut self, line: &str);
}

impl OutputSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Writes lines to standard output, flushing after each one.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        let mut stdout = io::stdout().lock();
        // A closed pipe is not a program error.
        if let Err(error) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
            warn!("failed to write output line: {}", error);
        }
    }
}

/// Name to value mapping for one activation. Calls clone the caller's
/// environment wholesale rather than chaining to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }
}

pub struct Evaluator<'p, 'o> {
    routines: &'p [Routine],
    output: &'o mut dyn OutputSink,
}

impl<'p, 'o> Evaluator<'p, 'o> {
    pub fn new(routines: &'p [Routine], output: &'o mut dyn OutputSink) -> Self {
        Self { routines, output }
    }

    /// Runs the program body against a fresh environment seeded with the
    /// program's constants and default-initialized variables, and returns
    /// the final environment.
    pub fn evaluate_program(&mut self, program: &Program) -> Result<Environment, PascalError> {
        let mut env = Environment::new();
        for (name, value) in &program.constants {
            env.define(name, value.clone());
        }
        for (name, ty) in &program.variables {
            env.define(name, ty.default_value());
        }

        self.execute(&program.body, &mut env)?;
        Ok(env)
    }

    pub fn execute(&mut self, stmt: &Stmt, env: &mut Environment) -> Result<(), PascalError> {
        match stmt {
            Stmt::Block { statements, .. } => {
                for statement in statements {
                    self.execute(statement, env)?;
                }
                Ok(())
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate_condition(condition, env)? {
                    self.execute(then_branch, env)?;
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt, env)?;
                }
                Ok(())
            }
            Stmt::While { condition, body, .. } => {
                while self.evaluate_condition(condition, env)? {
                    self.execute(body, env)?;
                }
                Ok(())
            }
            Stmt::For {
                variable,
                initializer,
                limit,
                body,
                span,
            } => {
                self.execute(initializer, env)?;
                let limit_value = self.evaluate_expression(limit, env)?;
                let limit = expect_integer(&limit_value, &limit.span)?;

                loop {
                    let current = read_integer(env, variable, span)?;
                    if current > limit {
                        break;
                    }
                    self.execute(body, env)?;

                    // The body may have assigned the loop variable. At
                    // i64::MAX it already reached any limit, so stop there.
                    match read_integer(env, variable, span)?.checked_add(1) {
                        Some(next) => env.define(variable, Value::Integer(next)),
                        None => break,
                    }
                }
                Ok(())
            }
            Stmt::Writeln { args, .. } => {
                let mut line = String::new();
                for arg in args {
                    let value = self.evaluate_expression(arg, env)?;
                    line.push_str(&value.to_string());
                }
                self.output.write_line(&line);
                Ok(())
            }
            Stmt::Assign { name, value, .. } => {
                let value = self.evaluate_expression(value, env)?;
                env.define(name, value);
                Ok(())
            }
            Stmt::ArrayWrite {
                name,
                path,
                value,
                span,
            } => {
                let mut offsets = Vec::with_capacity(path.len());
                for step in path {
                    let index = self.evaluate_expression(&step.index, env)?;
                    let index = expect_integer(&index, &step.index.span)?;
                    offsets.push((element_offset(index, step.low, step.high, &step.index.span)?, step));
                }
                let value = self.evaluate_expression(value, env)?;

                let target = env.get_mut(name).ok_or_else(|| {
                    PascalError::runtime_error(*span, format!("Undefined variable '{}'", name))
                })?;
                store(target, &offsets, value, span)
            }
            Stmt::ProcedureCall {
                routine, args, span, ..
            } => {
                self.invoke(*routine, args, env, span)?;
                Ok(())
            }
            Stmt::NoOp { .. } => Ok(()),
        }
    }

    pub fn evaluate_expression(&mut self, expr: &Expr, env: &Environment) -> Result<Value, PascalError> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Variable(name) => env.get(name).cloned().ok_or_else(|| {
                PascalError::runtime_error(expr.span, format!("Undefined variable '{}'", name))
            }),
            ExprKind::ToReal(operand) => {
                let value = self.evaluate_expression(operand, env)?;
                Ok(widen(value))
            }
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                let left_val = self.evaluate_expression(left, env)?;
                let right_val = self.evaluate_expression(right, env)?;
                evaluate_binary_op(*operator, left_val, right_val, &expr.span)
            }
            ExprKind::Unary { operator, operand } => {
                let operand_val = self.evaluate_expression(operand, env)?;
                evaluate_unary_op(*operator, operand_val, &expr.span)
            }
            ExprKind::Index {
                array,
                index,
                low,
                high,
            } => {
                let array_val = self.evaluate_expression(array, env)?;
                let index_val = self.evaluate_expression(index, env)?;
                let offset = element_offset(expect_integer(&index_val, &index.span)?, *low, *high, &index.span)?;
                match array_val {
                    Value::Array(items) => Ok(items
                        .get(&offset)
                        .cloned()
                        .unwrap_or_else(|| expr.ty.default_value())),
                    other => Err(PascalError::runtime_error(
                        array.span,
                        format!("Cannot index a value of type {}", other.type_name()),
                    )),
                }
            }
            ExprKind::Call { routine, name, args } => {
                self.invoke(*routine, args, env, &expr.span)?.ok_or_else(|| {
                    PascalError::runtime_error(
                        expr.span,
                        format!("'{}' does not return a value", name),
                    )
                })
            }
        }
    }

    fn evaluate_condition(&mut self, condition: &Expr, env: &Environment) -> Result<bool, PascalError> {
        match self.evaluate_expression(condition, env)? {
            Value::Boolean(b) => Ok(b),
            other => Err(PascalError::runtime_error(
                condition.span,
                format!("Condition must be Boolean, got {}", other.type_name()),
            )),
        }
    }

    /// Arguments are evaluated in the caller's environment. The callee runs
    /// in a full copy of it; nothing it writes is visible to the caller.
    fn invoke(
        &mut self,
        id: RoutineId,
        args: &[Expr],
        env: &Environment,
        span: &Span,
    ) -> Result<Option<Value>, PascalError> {
        let routines = self.routines;
        let routine = routines.get(id).ok_or_else(|| {
            PascalError::runtime_error(*span, format!("Unknown routine #{}", id))
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate_expression(arg, env)?);
        }
        trace!("calling '{}' with {} argument(s)", routine.name, values.len());

        let mut frame = env.clone();
        for (param, value) in routine.params.iter().zip(values) {
            frame.define(&param.name, value);
        }
        for (name, ty) in &routine.locals {
            frame.define(name, ty.default_value());
        }
        if let Some(ty) = &routine.return_type {
            frame.define(RESULT_SLOT, ty.default_value());
        }

        self.execute(&routine.body, &mut frame)?;

        Ok(match routine.return_type {
            Some(_) => frame.get(RESULT_SLOT).cloned(),
            None => None,
        })
    }
}

fn store(
    target: &mut Value,
    path: &[(usize, &IndexStep)],
    value: Value,
    span: &Span,
) -> Result<(), PascalError> {
    let Some(((offset, step), rest)) = path.split_first() else {
        *target = value;
        return Ok(());
    };

    match target {
        Value::Array(items) => {
            let element = items
                .entry(*offset)
                .or_insert_with(|| step.item.default_value());
            store(element, rest, value, span)
        }
        other => Err(PascalError::runtime_error(
            *span,
            format!("Cannot index a value of type {}", other.type_name()),
        )),
    }
}

/// Position of `index` within storage for an array declared `low..high`.
fn element_offset(index: i64, low: i64, high: i64, span: &Span) -> Result<usize, PascalError> {
    if index < low || index > high {
        return Err(PascalError::runtime_error(
            *span,
            format!("Index {} is out of bounds {}..{}", index, low, high),
        ));
    }
    // Bounds may span more than i64::MAX.
    let offset = i128::from(index) - i128::from(low);
    usize::try_from(offset).map_err(|_| {
        PascalError::runtime_error(
            *span,
            format!("Index {} of {}..{} cannot be addressed", index, low, high),
        )
    })
}

fn widen(value: Value) -> Value {
    match value {
        Value::Integer(n) => Value::Real(n as f64),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|(offset, item)| (offset, widen(item)))
                .collect(),
        ),
        other => other,
    }
}

fn expect_integer(value: &Value, span: &Span) -> Result<i64, PascalError> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(PascalError::runtime_error(
            *span,
            format!("Expected Integer, got {}", other.type_name()),
        )),
    }
}

fn read_integer(env: &Environment, name: &str, span: &Span) -> Result<i64, PascalError> {
    match env.get(name) {
        Some(value) => expect_integer(value, span),
        None => Err(PascalError::runtime_error(
            *span,
            format!("Undefined variable '{}'", name),
        )),
    }
}

fn overflow(span: &Span) -> PascalError {
    PascalError::runtime_error(*span, "Integer overflow".to_string())
}

fn division_by_zero(span: &Span) -> PascalError {
    PascalError::runtime_error(*span, "Division by zero".to_string())
}

/// Integer division rounding toward negative infinity.
pub fn floor_div(left: i64, right: i64) -> Option<i64> {
    let quotient = left.checked_div(right)?;
    if left % right != 0 && ((left < 0) != (right < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

/// Remainder matching `floor_div`; takes the sign of the divisor.
pub fn floor_mod(left: i64, right: i64) -> Option<i64> {
    let quotient = floor_div(left, right)?;
    left.checked_sub(quotient.checked_mul(right)?)
}

fn mismatch(operator: &str, left: &Value, right: &Value, span: &Span) -> PascalError {
    PascalError::runtime_error(
        *span,
        format!(
            "Operator '{}' cannot be applied to {} and {}",
            operator,
            left.type_name(),
            right.type_name()
        ),
    )
}

pub fn evaluate_binary_op(
    operator: BinaryOp,
    left: Value,
    right: Value,
    span: &Span,
) -> Result<Value, PascalError> {
    match operator {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply => match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match operator {
                    BinaryOp::Add => l.checked_add(*r),
                    BinaryOp::Subtract => l.checked_sub(*r),
                    _ => l.checked_mul(*r),
                };
                result.map(Value::Integer).ok_or_else(|| overflow(span))
            }
            _ => match (left.as_real(), right.as_real()) {
                (Some(l), Some(r)) => Ok(Value::Real(match operator {
                    BinaryOp::Add => l + r,
                    BinaryOp::Subtract => l - r,
                    _ => l * r,
                })),
                _ => Err(mismatch(operator.symbol(), &left, &right, span)),
            },
        },
        BinaryOp::Divide => match (left.as_real(), right.as_real()) {
            (Some(_), Some(r)) if r == 0.0 => Err(division_by_zero(span)),
            (Some(l), Some(r)) => Ok(Value::Real(l / r)),
            _ => Err(mismatch(operator.symbol(), &left, &right, span)),
        },
        BinaryOp::IntDiv | BinaryOp::Modulo => match (&left, &right) {
            (Value::Integer(_), Value::Integer(0)) => Err(division_by_zero(span)),
            (Value::Integer(l), Value::Integer(r)) => {
                let result = if operator == BinaryOp::IntDiv {
                    floor_div(*l, *r)
                } else {
                    floor_mod(*l, *r)
                };
                result.map(Value::Integer).ok_or_else(|| overflow(span))
            }
            _ => Err(mismatch(operator.symbol(), &left, &right, span)),
        },
        BinaryOp::Equal => Ok(Value::Boolean(left == right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (&left, &right) {
                (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
                _ => match (left.as_real(), right.as_real()) {
                    (Some(l), Some(r)) => l.partial_cmp(&r),
                    _ => return Err(mismatch(operator.symbol(), &left, &right, span)),
                },
            };
            let result = match ordering {
                Some(Ordering::Less) => {
                    matches!(operator, BinaryOp::Less | BinaryOp::LessEqual)
                }
                Some(Ordering::Equal) => {
                    matches!(operator, BinaryOp::LessEqual | BinaryOp::GreaterEqual)
                }
                Some(Ordering::Greater) => {
                    matches!(operator, BinaryOp::Greater | BinaryOp::GreaterEqual)
                }
                None => false,
            };
            Ok(Value::Boolean(result))
        }
        BinaryOp::And | BinaryOp::Or => match (&left, &right) {
            (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(if operator == BinaryOp::And {
                *l && *r
            } else {
                *l || *r
            })),
            _ => Err(mismatch(operator.symbol(), &left, &right, span)),
        },
    }
}

pub fn evaluate_unary_op(operator: UnaryOp, operand: Value, span: &Span) -> Result<Value, PascalError> {
    match (operator, operand) {
        (UnaryOp::Plus, value @ (Value::Integer(_) | Value::Real(_))) => Ok(value),
        (UnaryOp::Negate, Value::Integer(n)) => {
            n.checked_neg().map(Value::Integer).ok_or_else(|| overflow(span))
        }
        (UnaryOp::Negate, Value::Real(n)) => Ok(Value::Real(-n)),
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (operator, operand) => Err(PascalError::runtime_error(
            *span,
            format!(
                "Operator '{}' cannot be applied to {}",
                operator.symbol(),
                operand.type_name()
            ),
        )),
    }
}
