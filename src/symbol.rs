use crate::ast::RoutineId;
use crate::error::{PascalError, Span};
use crate::types::Type;
use crate::value::Value;
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    /// Folded at parse time.
    Constant(Value),
    Variable,
    Array,
    /// Index into the program's routine table, whose body may still be
    /// a placeholder while the declaration is being parsed.
    Function(RoutineId),
    Procedure(RoutineId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub span: Span,
}

impl Symbol {
    pub fn new(name: &str, kind: SymbolKind, ty: Type, span: Span) -> Self {
        Self {
            name: name.to_string(),
            kind,
            ty,
            span,
        }
    }

    /// A storage symbol of the right kind for `ty`.
    pub fn storage(name: &str, ty: Type, span: Span) -> Self {
        let kind = match ty {
            Type::Array { .. } => SymbolKind::Array,
            _ => SymbolKind::Variable,
        };
        Self::new(name, kind, ty, span)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SymbolKind::Constant(_) => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::Array => "array",
            SymbolKind::Function(_) => "function",
            SymbolKind::Procedure(_) => "procedure",
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    symbols: HashMap<String, Symbol>,
}

/// Stack of scopes. Lookups walk `nested` from the innermost scope
/// outward and finish at `global`, which holds program-level declarations.
#[derive(Debug, Default)]
pub struct SymbolTable {
    global: Scope,
    nested: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.nested.len() + 1
    }

    pub fn push_scope(&mut self) {
        self.nested.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.nested.pop();
    }

    fn current_mut(&mut self) -> &mut Scope {
        match self.nested.last_mut() {
            Some(scope) => scope,
            None => &mut self.global,
        }
    }

    pub fn declare(&mut self, symbol: Symbol) -> Result<(), PascalError> {
        let depth = self.depth();
        let scope = self.current_mut();

        if let Some(existing) = scope.symbols.get(&symbol.name) {
            return Err(PascalError::semantic_error_with_help(
                symbol.span,
                format!("'{}' is already declared in this scope", symbol.name),
                format!(
                    "'{}' was first declared as a {} at line {}, column {}.",
                    existing.name,
                    existing.kind_name(),
                    existing.span.line,
                    existing.span.column
                ),
            ));
        }

        debug!(
            "declared {} '{}': {} (scope depth {})",
            symbol.kind_name(),
            symbol.name,
            symbol.ty,
            depth
        );
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.nested
            .iter()
            .rev()
            .chain(std::iter::once(&self.global))
            .find_map(|scope| scope.symbols.get(name))
    }
}
