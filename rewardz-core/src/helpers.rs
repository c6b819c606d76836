//! Declarative helpers: named, parameterized expression fragments that
//! quest rules can call like functions.
//!
//! ```toml
//! [[helpers]]
//! id = "has_at_least"
//! expression = "get(inventory, item, 0) >= n"
//! args = ["item", "n"]
//! ```
//!
//! A quest rule can then say `has_at_least('ancient_scroll', 3)`.
//!
//! Helpers are compiled once at load time but never capture facts: the
//! context only holds a [`BoundHelper`] reference, and the body is evaluated
//! against whatever facts the calling context carries at call time.
//! Supplying fewer arguments than parameters yields a partially applied
//! helper that can be called again with the rest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::expr::{BoundHelper, Context, Expression, ExpressionError, FunctionTable, Value};

/// Helper definition as written in the rule document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperDef {
    /// Name the helper is bound under.
    pub id: String,
    /// Body expression.
    pub expression: String,
    /// Positional parameter names.
    #[serde(default)]
    pub args: Vec<String>,
}

/// A helper whose body has been parsed.
#[derive(Debug, Clone)]
pub struct CompiledHelper {
    id: String,
    params: Vec<String>,
    body: Result<Expression, ExpressionError>,
}

impl CompiledHelper {
    /// Parse a helper definition. A malformed body is kept and reported
    /// each time the helper is invoked.
    #[must_use]
    pub fn compile(def: &HelperDef) -> Self {
        Self {
            id: def.id.clone(),
            params: def.args.clone(),
            body: Expression::parse(&def.expression),
        }
    }

    /// Helper id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parameter names.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// The body's parse error, if any.
    #[must_use]
    pub fn parse_error(&self) -> Option<&ExpressionError> {
        self.body.as_ref().err()
    }

    /// Evaluate the body against `facts` with `args` bound to the
    /// parameters. Arguments shadow facts of the same name.
    ///
    /// # Errors
    /// Returns the body's parse error, an [`ExpressionError::Arity`] when
    /// too many arguments are supplied, or any evaluation error.
    pub fn invoke(
        &self,
        facts: &Context<'_>,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        let body = self.body.as_ref().map_err(Clone::clone)?;
        match args.len().cmp(&self.params.len()) {
            std::cmp::Ordering::Less => {
                return Ok(Value::Helper(BoundHelper {
                    helper_id: self.id.clone(),
                    bound_args: args,
                }));
            }
            std::cmp::Ordering::Greater => {
                return Err(ExpressionError::Arity {
                    name: self.id.clone(),
                    expected: self.params.len(),
                    found: args.len(),
                });
            }
            std::cmp::Ordering::Equal => {}
        }

        let locals: HashMap<String, Value> = self.params.iter().cloned().zip(args).collect();
        let scope = Context::child(facts, locals);
        body.evaluate_at_depth(&scope, depth)
    }
}

/// All helpers of a rule set, in definition order.
#[derive(Debug, Clone, Default)]
pub struct HelperSet {
    helpers: Vec<CompiledHelper>,
    index: HashMap<String, usize>,
}

impl HelperSet {
    /// Compile every definition. A later definition with a duplicate id
    /// replaces the earlier one in lookups.
    #[must_use]
    pub fn compile(defs: &[HelperDef]) -> Self {
        let helpers: Vec<CompiledHelper> = defs.iter().map(CompiledHelper::compile).collect();
        let index = helpers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.id.clone(), i))
            .collect();
        Self { helpers, index }
    }

    /// Look a helper up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CompiledHelper> {
        self.index.get(id).map(|&i| &self.helpers[i])
    }

    /// Iterate in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledHelper> {
        self.helpers.iter()
    }

    /// Number of helpers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Whether there are no helpers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    /// Build a root evaluation context: `facts` plus every helper bound by
    /// name. Helper names shadow facts of the same name.
    #[must_use]
    pub fn context(&self, facts: HashMap<String, Value>) -> Context<'_> {
        let mut ctx = Context::from_values(facts).with_functions(self);
        for helper in &self.helpers {
            ctx.insert(helper.id.clone(), Value::Helper(BoundHelper::new(&helper.id)));
        }
        ctx
    }
}

impl FunctionTable for HelperSet {
    fn call(
        &self,
        helper: &BoundHelper,
        root: &Context<'_>,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        let compiled = self
            .get(&helper.helper_id)
            .ok_or_else(|| ExpressionError::UndefinedName(helper.helper_id.clone()))?;
        compiled.invoke(root, helper.bound_args.clone(), depth)
    }
}
