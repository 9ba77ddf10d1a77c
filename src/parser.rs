use crate::ast::{BinaryOp, Expr, ExprKind, IndexStep, Program, Routine, RoutineId, Stmt, UnaryOp, RESULT_SLOT};
use crate::error::{PascalError, Span};
use crate::evaluator::{Environment, Evaluator};
use crate::lexer::{describe, Lexer, Token, TokenType};
use crate::symbol::{Symbol, SymbolKind, SymbolTable};
use crate::types::{Param, Type};
use crate::value::Value;
use log::debug;

/// Declarations collected from one `declarations` section.
#[derive(Debug, Default)]
struct Declarations {
    constants: Vec<(String, Value)>,
    variables: Vec<(String, Type)>,
}

/// Recursive-descent parser that resolves names, checks types and folds
/// constants while it builds the tree. The first error aborts the parse.
pub struct Parser {
    lexer: Lexer,
    symbols: SymbolTable,
    routines: Vec<Routine>,
    /// Routines whose bodies are being parsed, innermost last.
    enclosing: Vec<RoutineId>,
    /// Empty environment that constant expressions are evaluated against.
    constants: Environment,
    /// Set while parsing a constant initializer or an array bound.
    in_constant: bool,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            lexer: Lexer::new(source),
            symbols: SymbolTable::new(),
            routines: Vec::new(),
            enclosing: Vec::new(),
            constants: Environment::new(),
            in_constant: false,
        }
    }

    pub fn parse(&mut self) -> Result<Program, PascalError> {
        self.consume(TokenType::Program)?;
        let name = self.consume(TokenType::Identifier)?;
        self.consume(TokenType::Semicolon)?;

        let declarations = self.declarations()?;
        let body = self.block()?;

        self.consume(TokenType::Dot)?;
        self.consume(TokenType::Eof)?;

        debug!(
            "parsed program '{}': {} constant(s), {} variable(s), {} routine(s)",
            name.lexeme,
            declarations.constants.len(),
            declarations.variables.len(),
            self.routines.len()
        );

        Ok(Program {
            name: name.lexeme,
            constants: declarations.constants,
            variables: declarations.variables,
            routines: std::mem::take(&mut self.routines),
            body,
        })
    }

    /// Parses a standalone expression that must span the whole input.
    pub fn parse_expression(&mut self) -> Result<Expr, PascalError> {
        let expr = self.expression()?;
        self.consume(TokenType::Eof)?;
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declarations(&mut self) -> Result<Declarations, PascalError> {
        let mut declarations = Declarations::default();
        loop {
            match self.peek()?.token_type {
                TokenType::Const => self.const_declarations(&mut declarations)?,
                TokenType::Var => self.var_declarations(&mut declarations)?,
                TokenType::Function => self.routine_declaration(true)?,
                TokenType::Procedure => self.routine_declaration(false)?,
                _ => return Ok(declarations),
            }
        }
    }

    fn var_declarations(&mut self, declarations: &mut Declarations) -> Result<(), PascalError> {
        self.consume(TokenType::Var)?;
        loop {
            let names = self.identifier_list(false)?;
            self.consume(TokenType::Colon)?;
            let ty = self.type_spec()?;
            self.consume(TokenType::Semicolon)?;

            for name in names {
                self.symbols
                    .declare(Symbol::storage(&name.lexeme, ty.clone(), name.span))?;
                declarations.variables.push((name.lexeme, ty.clone()));
            }

            if !self.check(TokenType::Identifier)? {
                return Ok(());
            }
        }
    }

    fn const_declarations(&mut self, declarations: &mut Declarations) -> Result<(), PascalError> {
        self.consume(TokenType::Const)?;
        loop {
            let names = self.identifier_list(true)?;
            let declared = if self.match_token(TokenType::Colon)? {
                Some(self.type_spec()?)
            } else {
                None
            };
            let equal = self.consume(TokenType::Equal)?;
            let initializer = self.constant_expression()?;
            self.consume(TokenType::Semicolon)?;

            let (ty, initializer) = match declared {
                Some(ty) => {
                    let initializer = self.coerce(initializer, &ty, equal.span, "constant declaration")?;
                    (ty, initializer)
                }
                None => (initializer.ty.clone(), initializer),
            };
            let value = self.evaluate_constant(&initializer).map_err(|error| {
                PascalError::semantic_error(
                    error.span,
                    format!("Invalid constant expression: {}", error.message),
                )
            })?;

            for name in names {
                self.symbols.declare(Symbol::new(
                    &name.lexeme,
                    SymbolKind::Constant(value.clone()),
                    ty.clone(),
                    name.span,
                ))?;
                declarations.constants.push((name.lexeme, value.clone()));
            }

            if !self.check(TokenType::Identifier)? {
                return Ok(());
            }
        }
    }

    /// `function name(params): type; declarations block;` or the procedure
    /// form without a result type. The routine's symbol is registered before
    /// its body is parsed so the body can call it; the body is attached to
    /// the reserved routine slot afterwards.
    fn routine_declaration(&mut self, is_function: bool) -> Result<(), PascalError> {
        let keyword = self.advance()?;
        let name = self.consume(TokenType::Identifier)?;

        let mut params = Vec::new();
        if self.match_token(TokenType::LeftParen)? {
            params = self.parameters()?;
            self.consume(TokenType::RightParen)?;
        }
        let return_type = if is_function {
            self.consume(TokenType::Colon)?;
            Some(self.type_spec()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon)?;

        let id = self.routines.len();
        let signature: Vec<Param> = params
            .iter()
            .map(|(token, ty)| Param {
                name: token.lexeme.clone(),
                ty: ty.clone(),
            })
            .collect();
        let (kind, ty) = match &return_type {
            Some(returns) => (
                SymbolKind::Function(id),
                Type::Function {
                    params: signature.clone(),
                    returns: Box::new(returns.clone()),
                },
            ),
            None => (
                SymbolKind::Procedure(id),
                Type::Procedure {
                    params: signature.clone(),
                },
            ),
        };
        self.symbols.declare(Symbol::new(&name.lexeme, kind, ty, name.span))?;

        self.routines.push(Routine {
            name: name.lexeme.clone(),
            params: signature,
            return_type,
            locals: Vec::new(),
            body: Stmt::NoOp { span: name.span },
            span: keyword.span.to(&name.span),
        });

        self.symbols.push_scope();
        self.enclosing.push(id);
        let parsed = self.routine_body(&params);
        self.enclosing.pop();
        self.symbols.pop_scope();
        let (locals, body) = parsed?;

        self.consume(TokenType::Semicolon)?;

        debug!("attached body of {} '{}'", keyword.lexeme, name.lexeme);
        let routine = &mut self.routines[id];
        routine.locals = locals;
        routine.body = body;
        Ok(())
    }

    fn routine_body(&mut self, params: &[(Token, Type)]) -> Result<(Vec<(String, Type)>, Stmt), PascalError> {
        for (token, ty) in params {
            self.symbols
                .declare(Symbol::storage(&token.lexeme, ty.clone(), token.span))?;
        }
        let declarations = self.declarations()?;
        let body = self.block()?;
        Ok((declarations.variables, body))
    }

    /// `group (";" group)*` where `group ::= ID ("," ID)* ":" type`.
    fn parameters(&mut self) -> Result<Vec<(Token, Type)>, PascalError> {
        let mut params = Vec::new();
        if self.check(TokenType::RightParen)? {
            return Ok(params);
        }

        loop {
            let names = self.identifier_list(false)?;
            self.consume(TokenType::Colon)?;
            let ty = self.type_spec()?;
            for name in names {
                params.push((name, ty.clone()));
            }
            if !self.match_token(TokenType::Semicolon)? {
                return Ok(params);
            }
        }
    }

    fn identifier_list(&mut self, allow_trailing_comma: bool) -> Result<Vec<Token>, PascalError> {
        let mut names = vec![self.consume(TokenType::Identifier)?];
        while self.match_token(TokenType::Comma)? {
            if allow_trailing_comma && self.check(TokenType::Colon)? {
                break;
            }
            names.push(self.consume(TokenType::Identifier)?);
        }
        Ok(names)
    }

    fn type_spec(&mut self) -> Result<Type, PascalError> {
        let token = self.advance()?;
        match token.token_type {
            TokenType::IntegerType => Ok(Type::Integer),
            TokenType::RealType => Ok(Type::Real),
            TokenType::BooleanType => Ok(Type::Boolean),
            TokenType::ArrayType => {
                self.consume(TokenType::LeftBracket)?;
                let low = self.array_bound()?;
                self.consume(TokenType::Range)?;
                let high = self.array_bound()?;
                self.consume(TokenType::RightBracket)?;
                self.consume(TokenType::Of)?;
                let item = self.type_spec()?;

                if low > high {
                    return Err(PascalError::semantic_error_with_help(
                        token.span,
                        format!("Array lower bound {} is greater than upper bound {}", low, high),
                        "Declare arrays as Array[low..high] with low <= high.".to_string(),
                    ));
                }

                Ok(Type::Array {
                    low,
                    high,
                    item: Box::new(item),
                })
            }
            _ => Err(PascalError::syntax_error(token.span, "type", &describe(&token))),
        }
    }

    fn array_bound(&mut self) -> Result<i64, PascalError> {
        let bound = self.constant_expression()?;
        if bound.ty != Type::Integer {
            return Err(PascalError::semantic_error(
                bound.span,
                format!("Array bounds must be Integer, found {}", bound.ty),
            ));
        }
        match self.evaluate_constant(&bound)? {
            Value::Integer(n) => Ok(n),
            other => Err(PascalError::semantic_error(
                bound.span,
                format!("Array bounds must be Integer, found {}", other.type_name()),
            )),
        }
    }

    fn constant_expression(&mut self) -> Result<Expr, PascalError> {
        let saved = std::mem::replace(&mut self.in_constant, true);
        let expr = self.expression();
        self.in_constant = saved;
        expr
    }

    fn evaluate_constant(&self, expr: &Expr) -> Result<Value, PascalError> {
        let mut discarded: Vec<String> = Vec::new();
        Evaluator::new(&[], &mut discarded).evaluate_expression(expr, &self.constants)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> Result<Stmt, PascalError> {
        let begin = self.consume(TokenType::Begin)?;
        let mut statements = vec![self.statement()?];
        while self.match_token(TokenType::Semicolon)? {
            statements.push(self.statement()?);
        }
        let end = self.consume(TokenType::End)?;

        Ok(Stmt::Block {
            statements,
            span: begin.span.to(&end.span),
        })
    }

    fn statement(&mut self) -> Result<Stmt, PascalError> {
        let token = self.peek()?;
        match token.token_type {
            TokenType::Begin => self.block(),
            TokenType::If => self.if_statement(),
            TokenType::While => self.while_statement(),
            TokenType::For => self.for_statement(),
            TokenType::Writeln => self.writeln_statement(),
            TokenType::Identifier => self.identifier_statement(),
            _ => Ok(Stmt::NoOp { span: token.span }),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, PascalError> {
        let keyword = self.advance()?;
        let condition = self.condition("if")?;
        self.consume(TokenType::Then)?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(TokenType::Else)? {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        let end_span = match &else_branch {
            Some(else_stmt) => *else_stmt.span(),
            None => *then_branch.span(),
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: keyword.span.to(&end_span),
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, PascalError> {
        let keyword = self.advance()?;
        let condition = self.condition("while")?;
        self.consume(TokenType::Do)?;
        let body = Box::new(self.statement()?);
        let span = keyword.span.to(body.span());

        Ok(Stmt::While {
            condition,
            body,
            span,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, PascalError> {
        let keyword = self.advance()?;
        let variable = self.consume(TokenType::Identifier)?;
        let symbol = self.lookup(&variable)?.clone();
        if !matches!(symbol.kind, SymbolKind::Variable) || symbol.ty != Type::Integer {
            return Err(PascalError::semantic_error(
                variable.span,
                format!(
                    "Loop variable '{}' must be an Integer variable, found {} of type {}",
                    variable.lexeme,
                    symbol.kind_name(),
                    symbol.ty
                ),
            ));
        }
        let initializer = self.assignment(&variable, &Type::Integer, variable.lexeme.clone())?;

        self.consume(TokenType::To)?;
        let limit = self.expression()?;
        if limit.ty != Type::Integer {
            return Err(PascalError::semantic_error(
                limit.span,
                format!("Loop limit must be Integer, found {}", limit.ty),
            ));
        }
        self.consume(TokenType::Do)?;
        let body = Box::new(self.statement()?);
        let span = keyword.span.to(body.span());

        Ok(Stmt::For {
            variable: variable.lexeme,
            initializer: Box::new(initializer),
            limit,
            body,
            span,
        })
    }

    fn writeln_statement(&mut self) -> Result<Stmt, PascalError> {
        let keyword = self.advance()?;
        let mut args = Vec::new();
        let mut end_span = keyword.span;

        if self.match_token(TokenType::LeftParen)? {
            if !self.check(TokenType::RightParen)? {
                loop {
                    args.push(self.expression()?);
                    if !self.match_token(TokenType::Comma)? {
                        break;
                    }
                }
            }
            end_span = self.consume(TokenType::RightParen)?.span;
        }

        Ok(Stmt::Writeln {
            args,
            span: keyword.span.to(&end_span),
        })
    }

    /// Assignment, array write, or procedure call, decided by the kind of
    /// the leading identifier.
    fn identifier_statement(&mut self) -> Result<Stmt, PascalError> {
        let name = self.advance()?;
        let symbol = self.lookup(&name)?.clone();

        match symbol.kind {
            SymbolKind::Procedure(id) => {
                let (args, span) = self.call_arguments(&symbol, &name)?;
                Ok(Stmt::ProcedureCall {
                    routine: id,
                    name: name.lexeme,
                    args,
                    span,
                })
            }
            SymbolKind::Function(id) => {
                let assigning = self.check(TokenType::Assign)?;
                match (&symbol.ty, assigning) {
                    (Type::Function { returns, .. }, true) if self.enclosing.last() == Some(&id) => {
                        self.assignment(&name, returns, RESULT_SLOT.to_string())
                    }
                    (_, true) => Err(PascalError::semantic_error_with_help(
                        name.span,
                        format!("Cannot assign to function '{}' outside its own body", name.lexeme),
                        "A function's result is set by assigning to its name inside the function.".to_string(),
                    )),
                    (_, false) => Err(PascalError::semantic_error_with_help(
                        name.span,
                        format!("Function '{}' cannot be used as a statement", name.lexeme),
                        "Assign the result to a variable, or declare it as a procedure.".to_string(),
                    )),
                }
            }
            SymbolKind::Constant(_) => Err(PascalError::semantic_error(
                name.span,
                format!("Cannot assign to constant '{}'", name.lexeme),
            )),
            SymbolKind::Variable | SymbolKind::Array => {
                if self.check(TokenType::LeftParen)? {
                    return Err(not_callable(&symbol, &name));
                }
                if !self.check(TokenType::LeftBracket)? {
                    return self.assignment(&name, &symbol.ty, name.lexeme.clone());
                }

                let mut ty = symbol.ty.clone();
                let mut path = Vec::new();
                while self.check(TokenType::LeftBracket)? {
                    let bracket = self.advance()?;
                    let (low, high, item) = match &ty {
                        Type::Array { low, high, item } => (*low, *high, (**item).clone()),
                        other => return Err(not_an_array(&name, other, bracket.span)),
                    };
                    let index = self.index_expression()?;
                    self.consume(TokenType::RightBracket)?;
                    path.push(IndexStep {
                        index,
                        low,
                        high,
                        item: item.clone(),
                    });
                    ty = item;
                }

                let assign = self.consume(TokenType::Assign)?;
                let value = self.expression()?;
                let value = self.coerce(
                    value,
                    &ty,
                    assign.span,
                    &format!("assignment to '{}'", name.lexeme),
                )?;
                let span = name.span.to(&value.span);

                Ok(Stmt::ArrayWrite {
                    name: name.lexeme,
                    path,
                    value,
                    span,
                })
            }
        }
    }

    /// `:= expr` into `slot`, checked against `ty`.
    fn assignment(&mut self, target: &Token, ty: &Type, slot: String) -> Result<Stmt, PascalError> {
        let assign = self.consume(TokenType::Assign)?;
        let value = self.expression()?;
        let value = self.coerce(
            value,
            ty,
            assign.span,
            &format!("assignment to '{}'", target.lexeme),
        )?;
        let span = target.span.to(&value.span);

        Ok(Stmt::Assign {
            name: slot,
            value,
            span,
        })
    }

    fn condition(&mut self, keyword: &str) -> Result<Expr, PascalError> {
        let condition = self.expression()?;
        if condition.ty != Type::Boolean {
            return Err(PascalError::semantic_error(
                condition.span,
                format!("Condition of '{}' must be Boolean, found {}", keyword, condition.ty),
            ));
        }
        Ok(condition)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// `factor (("+"|"-"|"="|"<"|">"|"<="|">=") factor)*`
    pub fn expression(&mut self) -> Result<Expr, PascalError> {
        let mut expr = self.factor()?;

        loop {
            let operator_token = self.peek()?;
            let operator = match operator_token.token_type {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Subtract,
                TokenType::Equal => BinaryOp::Equal,
                TokenType::Less => BinaryOp::Less,
                TokenType::Greater => BinaryOp::Greater,
                TokenType::LessEqual => BinaryOp::LessEqual,
                TokenType::GreaterEqual => BinaryOp::GreaterEqual,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.factor()?;
            expr = self.binary(expr, operator, &operator_token, right)?;
        }
    }

    /// `term (("*"|"/"|"div"|"mod"|"and"|"or") term)*`
    fn factor(&mut self) -> Result<Expr, PascalError> {
        let mut expr = self.term()?;

        loop {
            let operator_token = self.peek()?;
            let operator = match operator_token.token_type {
                TokenType::Star => BinaryOp::Multiply,
                TokenType::Slash => BinaryOp::Divide,
                TokenType::Div => BinaryOp::IntDiv,
                TokenType::Mod => BinaryOp::Modulo,
                TokenType::And => BinaryOp::And,
                TokenType::Or => BinaryOp::Or,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.term()?;
            expr = self.binary(expr, operator, &operator_token, right)?;
        }
    }

    fn term(&mut self) -> Result<Expr, PascalError> {
        let token = self.advance()?;

        match token.token_type {
            TokenType::Integer => {
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    PascalError::lex_error(token.span, format!("Invalid number literal: {}", token.lexeme))
                })?;
                Ok(Expr::new(ExprKind::Literal(Value::Integer(value)), Type::Integer, token.span))
            }
            TokenType::Real => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    PascalError::lex_error(token.span, format!("Invalid number literal: {}", token.lexeme))
                })?;
                Ok(Expr::new(ExprKind::Literal(Value::Real(value)), Type::Real, token.span))
            }
            TokenType::String => Ok(Expr::new(
                ExprKind::Literal(Value::String(token.lexeme)),
                Type::String,
                token.span,
            )),
            TokenType::True | TokenType::False => Ok(Expr::new(
                ExprKind::Literal(Value::Boolean(token.token_type == TokenType::True)),
                Type::Boolean,
                token.span,
            )),
            // `not` takes a whole expression; signs bind to the next term
            // so that `-7 div 2` is `(-7) div 2`.
            TokenType::Not => {
                let operand = self.expression()?;
                self.unary(UnaryOp::Not, &token, operand)
            }
            TokenType::Plus | TokenType::Minus => {
                let operator = if token.token_type == TokenType::Plus {
                    UnaryOp::Plus
                } else {
                    UnaryOp::Negate
                };
                let operand = self.term()?;
                self.unary(operator, &token, operand)
            }
            TokenType::LeftParen => {
                let expr = self.expression()?;
                self.consume(TokenType::RightParen)?;
                Ok(expr)
            }
            TokenType::Identifier => self.identifier_term(token),
            _ => Err(PascalError::syntax_error(token.span, "expression", &describe(&token))),
        }
    }

    fn identifier_term(&mut self, name: Token) -> Result<Expr, PascalError> {
        let symbol = self.lookup(&name)?.clone();

        if self.in_constant && !matches!(symbol.kind, SymbolKind::Constant(_)) {
            return Err(PascalError::semantic_error_with_help(
                name.span,
                format!("'{}' is a {}, not a constant", name.lexeme, symbol.kind_name()),
                "Constant initializers and array bounds may only use literals and constants.".to_string(),
            ));
        }

        let mut expr = match symbol.kind {
            SymbolKind::Constant(ref value) => {
                Expr::new(ExprKind::Literal(value.clone()), symbol.ty.clone(), name.span)
            }
            SymbolKind::Variable | SymbolKind::Array => {
                if self.check(TokenType::LeftParen)? {
                    return Err(not_callable(&symbol, &name));
                }
                Expr::new(ExprKind::Variable(name.lexeme.clone()), symbol.ty.clone(), name.span)
            }
            SymbolKind::Function(id) => {
                let returns = match &symbol.ty {
                    Type::Function { returns, .. } => (**returns).clone(),
                    _ => return Err(not_callable(&symbol, &name)),
                };
                let (args, span) = self.call_arguments(&symbol, &name)?;
                Expr::new(
                    ExprKind::Call {
                        routine: id,
                        name: name.lexeme.clone(),
                        args,
                    },
                    returns,
                    span,
                )
            }
            SymbolKind::Procedure(_) => {
                return Err(PascalError::semantic_error_with_help(
                    name.span,
                    format!("Procedure '{}' does not return a value", name.lexeme),
                    "Only functions can be used inside expressions.".to_string(),
                ));
            }
        };

        while self.check(TokenType::LeftBracket)? {
            expr = self.index(expr, &name)?;
        }
        Ok(expr)
    }

    fn index(&mut self, array: Expr, name: &Token) -> Result<Expr, PascalError> {
        let bracket = self.consume(TokenType::LeftBracket)?;
        let (low, high, item) = match &array.ty {
            Type::Array { low, high, item } => (*low, *high, (**item).clone()),
            other => return Err(not_an_array(name, other, bracket.span)),
        };
        let index = self.index_expression()?;
        let close = self.consume(TokenType::RightBracket)?;
        let span = array.span.to(&close.span);

        Ok(Expr::new(
            ExprKind::Index {
                array: Box::new(array),
                index: Box::new(index),
                low,
                high,
            },
            item,
            span,
        ))
    }

    fn index_expression(&mut self) -> Result<Expr, PascalError> {
        let index = self.expression()?;
        if index.ty != Type::Integer {
            return Err(PascalError::semantic_error(
                index.span,
                format!("Array index must be Integer, found {}", index.ty),
            ));
        }
        Ok(index)
    }

    /// Optional `"(" args ")"` after a routine name, checked against the
    /// routine's parameters. Returns the arguments and the span of the call.
    fn call_arguments(&mut self, symbol: &Symbol, name: &Token) -> Result<(Vec<Expr>, Span), PascalError> {
        let params = match &symbol.ty {
            Type::Function { params, .. } | Type::Procedure { params } => params.clone(),
            _ => return Err(not_callable(symbol, name)),
        };

        let mut args = Vec::new();
        let mut end_span = name.span;
        if self.match_token(TokenType::LeftParen)? {
            if !self.check(TokenType::RightParen)? {
                loop {
                    args.push(self.expression()?);
                    if !self.match_token(TokenType::Comma)? {
                        break;
                    }
                }
            }
            end_span = self.consume(TokenType::RightParen)?.span;
        }
        let span = name.span.to(&end_span);

        if args.len() != params.len() {
            return Err(PascalError::semantic_error_with_help(
                span,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    name.lexeme,
                    params.len(),
                    args.len()
                ),
                format!("Signature: {} {}", name.lexeme, symbol.ty),
            ));
        }

        let mut checked = Vec::with_capacity(args.len());
        for (arg, param) in args.into_iter().zip(&params) {
            let arg_span = arg.span;
            checked.push(self.coerce(
                arg,
                &param.ty,
                arg_span,
                &format!("argument '{}' of '{}'", param.name, name.lexeme),
            )?);
        }
        Ok((checked, span))
    }

    fn binary(&self, left: Expr, operator: BinaryOp, operator_token: &Token, right: Expr) -> Result<Expr, PascalError> {
        let (l, r) = (&left.ty, &right.ty);
        let ty = match operator {
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply => match (l, r) {
                (Type::Integer, Type::Integer) => Some(Type::Integer),
                _ if l.is_numeric() && r.is_numeric() => Some(Type::Real),
                _ => None,
            },
            BinaryOp::Divide => (l.is_numeric() && r.is_numeric()).then_some(Type::Real),
            BinaryOp::IntDiv | BinaryOp::Modulo => {
                (*l == Type::Integer && *r == Type::Integer).then_some(Type::Integer)
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                (*l == Type::Integer && *r == Type::Integer).then_some(Type::Boolean)
            }
            BinaryOp::Equal => {
                (l.same_as(r) && !matches!(l, Type::Array { .. })).then_some(Type::Boolean)
            }
            BinaryOp::And | BinaryOp::Or => {
                (*l == Type::Boolean && *r == Type::Boolean).then_some(Type::Boolean)
            }
        };

        let ty = ty.ok_or_else(|| {
            PascalError::semantic_error(
                operator_token.span,
                format!(
                    "Operator '{}' cannot be applied to {} and {}",
                    operator.symbol(),
                    l,
                    r
                ),
            )
        })?;

        let span = left.span.to(&right.span);
        Ok(self.fold(Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            ty,
            span,
        )))
    }

    fn unary(&self, operator: UnaryOp, operator_token: &Token, operand: Expr) -> Result<Expr, PascalError> {
        let valid = match operator {
            UnaryOp::Plus | UnaryOp::Negate => operand.ty.is_numeric(),
            UnaryOp::Not => operand.ty == Type::Boolean,
        };
        if !valid {
            return Err(PascalError::semantic_error(
                operator_token.span,
                format!(
                    "Operator '{}' cannot be applied to {}",
                    operator.symbol(),
                    operand.ty
                ),
            ));
        }

        let ty = operand.ty.clone();
        let span = operator_token.span.to(&operand.span);
        Ok(self.fold(Expr::new(
            ExprKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            ty,
            span,
        )))
    }

    /// Checks that `expr` may be stored where `target` is expected, widening
    /// Integer to Real where needed.
    fn coerce(&self, expr: Expr, target: &Type, span: Span, context: &str) -> Result<Expr, PascalError> {
        if !target.accepts(&expr.ty) {
            return Err(PascalError::semantic_error(
                span,
                format!(
                    "Type mismatch in {}: expected {}, found {}",
                    context, target, expr.ty
                ),
            ));
        }

        if !needs_widening(target, &expr.ty) {
            return Ok(expr);
        }
        let expr_span = expr.span;
        Ok(self.fold(Expr::new(
            ExprKind::ToReal(Box::new(expr)),
            target.clone(),
            expr_span,
        )))
    }

    /// Replaces a node whose operands are all literals by its value. Nodes
    /// that would fail (e.g. division by zero) are left for run time.
    fn fold(&self, expr: Expr) -> Expr {
        let foldable = match &expr.kind {
            ExprKind::Binary { left, right, .. } => left.is_literal() && right.is_literal(),
            ExprKind::Unary { operand, .. } | ExprKind::ToReal(operand) => operand.is_literal(),
            _ => false,
        };
        if !foldable {
            return expr;
        }

        match self.evaluate_constant(&expr) {
            Ok(value) => Expr::new(ExprKind::Literal(value), expr.ty, expr.span),
            Err(_) => expr,
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn lookup(&self, name: &Token) -> Result<&Symbol, PascalError> {
        self.symbols.resolve(&name.lexeme).ok_or_else(|| {
            PascalError::semantic_error_with_help(
                name.span,
                format!("Undeclared identifier '{}'", name.lexeme),
                "Declare it in a 'var' or 'const' section before using it.".to_string(),
            )
        })
    }

    fn peek(&mut self) -> Result<Token, PascalError> {
        self.lexer.peek()
    }

    fn advance(&mut self) -> Result<Token, PascalError> {
        self.lexer.next_token()
    }

    fn check(&mut self, token_type: TokenType) -> Result<bool, PascalError> {
        Ok(self.peek()?.token_type == token_type)
    }

    fn match_token(&mut self, token_type: TokenType) -> Result<bool, PascalError> {
        if self.check(token_type)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume(&mut self, token_type: TokenType) -> Result<Token, PascalError> {
        self.lexer.expect(token_type)
    }
}

fn needs_widening(target: &Type, source: &Type) -> bool {
    match (target, source) {
        (Type::Real, Type::Integer) => true,
        (Type::Array { item: a, .. }, Type::Array { item: b, .. }) => needs_widening(a, b),
        _ => false,
    }
}

fn not_callable(symbol: &Symbol, name: &Token) -> PascalError {
    PascalError::semantic_error(
        name.span,
        format!(
            "'{}' is a {} of type {} and cannot be called",
            name.lexeme,
            symbol.kind_name(),
            symbol.ty
        ),
    )
}

fn not_an_array(name: &Token, ty: &Type, span: Span) -> PascalError {
    PascalError::semantic_error(
        span,
        format!("Cannot index '{}': {} is not an array", name.lexeme, ty),
    )
}
