use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::rules::RuleSet;

/// A value stored in a [`Context`] variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Variable {
	Bool(bool),
	Text(String),
}

impl From<bool> for Variable {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<&str> for Variable {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<String> for Variable {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}

/// Whether a context drives block or inline tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextMode {
	Block,
	Inline,
}

/// The immutable state threaded through tokenization: the active rule set
/// and a bag of named variables that scope nested syntax.
///
/// Contexts are values. [`Context::switch_variable`] returns a new context
/// and leaves the receiver untouched, so parses running on different threads
/// with the same rule set never observe each other's overrides.
#[derive(Clone)]
pub struct Context {
	rules: RuleSet,
	mode: ContextMode,
	depth: usize,
	variables: Arc<BTreeMap<String, Variable>>,
}

impl Context {
	/// Set for the outermost block level of a document.
	pub const IS_TOP: &'static str = "IsTop";
	/// Set while tokenizing the content of a block quote.
	pub const IS_BLOCK_QUOTE: &'static str = "IsBlockQuote";
	/// Set while tokenizing the content of a list item.
	pub const IS_IN_LIST: &'static str = "IsInList";
	/// Set while tokenizing the text of a link. Nested links are not allowed.
	pub const IS_IN_LINK: &'static str = "IsInLink";
	/// Set for inline-mode contexts.
	pub const IS_INLINE: &'static str = "IsInline";
	/// Set while tokenizing the content of an included file.
	pub const IS_INCLUDE: &'static str = "IsInclude";
	/// Deepest nesting of quotes, list items and inline spans. Rules that
	/// would nest further decline to match and the text rules take over.
	pub const MAX_NESTING: usize = 100;

	/// Create a top-level block context.
	pub fn new(rules: RuleSet) -> Self {
		let mut variables = BTreeMap::new();
		variables.insert(Self::IS_TOP.to_string(), Variable::Bool(true));

		Self {
			rules,
			mode: ContextMode::Block,
			depth: 0,
			variables: Arc::new(variables),
		}
	}

	pub fn rules(&self) -> &RuleSet {
		&self.rules
	}

	pub fn mode(&self) -> ContextMode {
		self.mode
	}

	/// How many nested constructs enclose this context.
	pub fn depth(&self) -> usize {
		self.depth
	}

	/// Whether a rule may open one more nested construct.
	pub fn can_nest(&self) -> bool {
		self.depth < Self::MAX_NESTING
	}

	pub fn variable(&self, key: &str) -> Option<&Variable> {
		self.variables.get(key)
	}

	/// True when `key` is set to `Variable::Bool(true)`.
	pub fn is(&self, key: &str) -> bool {
		matches!(self.variables.get(key), Some(Variable::Bool(true)))
	}

	pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
		self.variables.iter().map(|(key, value)| (key.as_str(), value))
	}

	/// Return a copy of this context with `key` set to `value`.
	#[must_use]
	pub fn switch_variable(&self, key: impl Into<String>, value: impl Into<Variable>) -> Self {
		let mut next = self.clone();
		Arc::make_mut(&mut next.variables).insert(key.into(), value.into());
		next
	}

	/// The inline-mode pairing of this context. Variables carry across.
	#[must_use]
	pub fn inline_context(&self) -> Self {
		let mut next = self.switch_variable(Self::IS_INLINE, true);
		next.mode = ContextMode::Inline;
		next
	}

	/// The block-mode pairing of this context.
	#[must_use]
	pub fn block_context(&self) -> Self {
		let mut next = self.switch_variable(Self::IS_INLINE, false);
		next.mode = ContextMode::Block;
		next
	}

	/// One level deeper, for the content of an inline span.
	#[must_use]
	pub fn descend(&self) -> Self {
		let mut next = self.clone();
		next.depth += 1;
		next
	}

	/// Derive the context used for nested block content such as block quotes
	/// and list items.
	#[must_use]
	pub fn nested(&self, key: &str) -> Self {
		self.switch_variable(Self::IS_TOP, false)
			.switch_variable(key, true)
			.descend()
	}
}

impl fmt::Debug for Context {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("mode", &self.mode)
			.field("depth", &self.depth)
			.field("variables", &self.variables)
			.field("rules", &self.rules)
			.finish()
	}
}
