//! Embedded expression language for quest rules and helper bodies.
//!
//! Source text is tokenized ([`lexer`]), parsed into an AST ([`parser`])
//! once, and evaluated ([`eval`]) any number of times against a
//! [`Context`]. Evaluation is pure: it reads the context and never mutates
//! it.
//!
//! ```text
//! inventory['ancient_scroll'] >= 2 and 'Explorer' not in titles
//! rarity_counts.legendary > 0 or has_set('dragon', 3)
//! ```
//!
//! The grammar has no loops, assignments or conditionals. Helper calls are
//! the only indirection and their nesting depth is capped by
//! [`MAX_CALL_DEPTH`], so every evaluation terminates.

mod eval;
mod lexer;
mod parser;
mod value;

use std::collections::HashMap;

use thiserror::Error;

pub use value::{BoundHelper, Value};

use parser::Node;

/// Maximum nesting of helper invocations inside one evaluation.
pub const MAX_CALL_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to parse or evaluate an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The source text is not a valid expression.
    #[error("Syntax error at offset {position}: {message}")]
    Syntax {
        /// Byte offset into the source.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A name was referenced that is neither in the context nor a builtin.
    #[error("Undefined name: {0}")]
    UndefinedName(String),

    /// An operator or builtin was applied to values of the wrong type.
    #[error("Type error: {0}")]
    Type(String),

    /// Something that is not a helper was called like a function.
    #[error("Not callable: {0}")]
    NotCallable(String),

    /// A helper or builtin received the wrong number of arguments.
    #[error("{name} expects {expected} argument(s), got {found}")]
    Arity {
        /// Callee name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// Division or modulo by zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// Helper calls nested deeper than [`MAX_CALL_DEPTH`].
    #[error("Helper call depth limit ({0}) exceeded")]
    RecursionLimit(usize),
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Resolves [`BoundHelper`] calls made from inside an expression.
///
/// Implemented by [`crate::helpers::HelperSet`]. `depth` is the current call
/// nesting and must be forwarded (plus one) to nested evaluations.
pub trait FunctionTable {
    /// Invoke `helper` with its bound arguments against `root`, the
    /// outermost evaluation context.
    ///
    /// # Errors
    /// Returns an [`ExpressionError`] if the helper is unknown or its body
    /// fails to evaluate.
    fn call(
        &self,
        helper: &BoundHelper,
        root: &Context<'_>,
        depth: usize,
    ) -> Result<Value, ExpressionError>;
}

/// A scope of named values visible to an expression.
///
/// Scopes chain: a child context (helper arguments) shadows its parent
/// (facts). Helper calls always resolve against the root of the chain, so
/// one helper's arguments never leak into another.
pub struct Context<'a> {
    values: HashMap<String, Value>,
    parent: Option<&'a Context<'a>>,
    functions: Option<&'a dyn FunctionTable>,
}

impl<'a> Context<'a> {
    /// An empty root context with no helpers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            parent: None,
            functions: None,
        }
    }

    /// A root context over the given values.
    #[must_use]
    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self {
            values,
            parent: None,
            functions: None,
        }
    }

    /// A child scope whose own values shadow `parent`'s.
    #[must_use]
    pub fn child(parent: &'a Context<'a>, values: HashMap<String, Value>) -> Self {
        Self {
            values,
            parent: Some(parent),
            functions: parent.functions,
        }
    }

    /// Attach the table that resolves helper calls.
    #[must_use]
    pub fn with_functions(mut self, functions: &'a dyn FunctionTable) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Bind a name in this scope, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look a name up through the scope chain.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.get(name)),
        }
    }

    /// The outermost scope of the chain.
    #[must_use]
    pub fn root(&self) -> &Context<'a> {
        let mut ctx = self;
        while let Some(parent) = ctx.parent {
            ctx = parent;
        }
        ctx
    }

    pub(crate) fn functions(&self) -> Option<&'a dyn FunctionTable> {
        self.functions
    }
}

impl Default for Context<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Context")
            .field("names", &names)
            .field("has_parent", &self.parent.is_some())
            .field("has_functions", &self.functions.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Compiled expressions
// ---------------------------------------------------------------------------

/// A parsed expression, ready to be evaluated repeatedly.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse `source` into an expression.
    ///
    /// # Errors
    /// Returns [`ExpressionError::Syntax`] if the text is malformed.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = lexer::tokenize(source)?;
        let root = parser::parse(&tokens, source.len())?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `ctx`.
    ///
    /// # Errors
    /// Returns an [`ExpressionError`] on undefined names, type mismatches,
    /// division by zero or helper failures.
    pub fn evaluate(&self, ctx: &Context<'_>) -> Result<Value, ExpressionError> {
        self.evaluate_at_depth(ctx, 0)
    }

    /// Evaluate as a nested helper body `depth` calls deep.
    ///
    /// # Errors
    /// As [`Expression::evaluate`], plus [`ExpressionError::RecursionLimit`]
    /// once `depth` exceeds [`MAX_CALL_DEPTH`].
    pub fn evaluate_at_depth(
        &self,
        ctx: &Context<'_>,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        if depth > MAX_CALL_DEPTH {
            return Err(ExpressionError::RecursionLimit(MAX_CALL_DEPTH));
        }
        eval::Evaluator::new(ctx, depth).eval(&self.root)
    }
}

/// Parse and evaluate `source` in one step.
///
/// # Errors
/// Returns an [`ExpressionError`] on syntax or evaluation failure.
pub fn evaluate(source: &str, ctx: &Context<'_>) -> Result<Value, ExpressionError> {
    Expression::parse(source)?.evaluate(ctx)
}
