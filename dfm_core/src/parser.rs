//! The rule-driven tokenizer.
//!
//! Tokenization runs in two passes:
//!
//! 1. [`Parser::tokenize_blocks`] walks the input and, at every position,
//!    tries the block rules of the active [`Context`] in order. The first rule
//!    that matches produces the next token. Blocks whose inline content
//!    depends on the rest of the document, such as paragraphs that may use
//!    link definitions declared further down, are emitted as
//!    [`BlockKind::Pending`] placeholders.
//! 2. [`Parser::resolve_pending`] replaces every placeholder once the whole
//!    document has been seen.
//!
//! [`Parser::parse`] runs both passes. A parse never loops forever: a rule that
//! returns a token without consuming input fails with
//! [`DfmError::StalledRule`], and input no rule accepts fails with
//! [`DfmError::NoRuleMatched`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::trace;

use crate::BlockKind;
use crate::BlockToken;
use crate::Context;
use crate::DfmError;
use crate::DfmResult;
use crate::InlineToken;
use crate::Point;
use crate::Position;
use crate::SourceCursor;
use crate::rules::normalize_label;

/// A link reference definition, `[label]: href "title"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDefinition {
	pub href: String,
	pub title: Option<String>,
}

/// Per-document tokenizer state.
///
/// The parser owns nothing but the state collected while tokenizing one
/// document (link definitions). Rules and variables live in the [`Context`],
/// which is passed into every call.
#[derive(Debug, Default)]
pub struct Parser {
	file: Option<PathBuf>,
	links: RefCell<HashMap<String, LinkDefinition>>,
}

impl Parser {
	/// A parser for input without a file path.
	pub fn new() -> Self {
		Self::default()
	}

	/// A parser for the content of `file`. The path is only used to report
	/// positions; nothing is read from disk.
	pub fn with_file(file: Option<&Path>) -> Self {
		Self {
			file: file.map(Path::to_path_buf),
			links: RefCell::default(),
		}
	}

	/// The file being tokenized, if any.
	pub fn file(&self) -> Option<&Path> {
		self.file.as_deref()
	}

	/// Record a link definition. The first definition of a label wins.
	pub fn define_link(&self, label: &str, definition: LinkDefinition) {
		self.links
			.borrow_mut()
			.entry(normalize_label(label))
			.or_insert(definition);
	}

	/// Look up a link definition. Labels are matched case-insensitively with
	/// runs of whitespace collapsed.
	pub fn link_definition(&self, label: &str) -> Option<LinkDefinition> {
		self.links.borrow().get(&normalize_label(label)).cloned()
	}

	/// Run both tokenization passes over `text` and wrap the result in a
	/// document root.
	///
	/// The returned tree contains no [`BlockKind::Pending`] token and its root
	/// spans the whole input.
	///
	/// ```
	/// use dfm_core::Context;
	/// use dfm_core::Flavor;
	/// use dfm_core::parser::Parser;
	///
	/// let context = Context::new(Flavor::Dfm.rules().unwrap());
	/// let root = Parser::new().parse(&context, "# Title\n\nBody\n").unwrap();
	///
	/// assert_eq!(root.children().len(), 2);
	/// assert_eq!(root.position.end.offset, 14);
	/// ```
	pub fn parse(&self, context: &Context, text: &str) -> DfmResult<BlockToken> {
		let mut source = SourceCursor::new(text);
		let tokens = self.tokenize_blocks(context, &mut source)?;
		let children = self.resolve_pending(tokens)?;
		let position = Position::from_points(Point::default(), source.point());

		Ok(BlockToken::document(children, position))
	}

	/// First pass: apply the block rules of `context` until the input is
	/// exhausted.
	///
	/// Every rule is tried from a checkpoint of `source`, so a rule that
	/// declines may leave the cursor anywhere. The returned tokens may contain
	/// [`BlockKind::Pending`] placeholders.
	///
	/// # Errors
	///
	/// [`DfmError::NoRuleMatched`] when no rule accepts the remaining input,
	/// [`DfmError::StalledRule`] when a rule matches without consuming, and
	/// any error a rule raises from nested tokenization.
	pub fn tokenize_blocks(
		&self,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Vec<BlockToken>> {
		let mut tokens = Vec::new();

		'input: while !source.is_empty() {
			for rule in context.rules().block_rules() {
				let checkpoint = source.clone();
				let Some(token) = rule.try_match(self, context, source)? else {
					*source = checkpoint;
					continue;
				};

				if source.consumed() <= checkpoint.consumed() {
					let point = checkpoint.point();
					return Err(DfmError::StalledRule {
						rule: rule.name(),
						line: point.line,
						column: point.column,
					});
				}

				trace!(
					rule = rule.name(),
					line = token.position.start.line,
					"matched block rule"
				);
				tokens.push(token);
				continue 'input;
			}

			let point = source.point();
			return Err(DfmError::NoRuleMatched {
				snippet: source.snippet(),
				line: point.line,
				column: point.column,
			});
		}

		Ok(tokens)
	}

	/// Apply the inline rules of `context` until the input is exhausted.
	///
	/// Inline tokenization has a single pass and fails the same way as
	/// [`Parser::tokenize_blocks`].
	pub fn tokenize_inlines(
		&self,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Vec<InlineToken>> {
		let mut tokens = Vec::new();

		'input: while !source.is_empty() {
			for rule in context.rules().inline_rules() {
				let checkpoint = source.clone();
				let Some(token) = rule.try_match(self, context, source)? else {
					*source = checkpoint;
					continue;
				};

				if source.consumed() <= checkpoint.consumed() {
					let point = checkpoint.point();
					return Err(DfmError::StalledRule {
						rule: rule.name(),
						line: point.line,
						column: point.column,
					});
				}

				tokens.push(token);
				continue 'input;
			}

			let point = source.point();
			return Err(DfmError::NoRuleMatched {
				snippet: source.snippet(),
				line: point.line,
				column: point.column,
			});
		}

		Ok(tokens)
	}

	/// Tokenize nested block content that starts at `origin` in the file.
	///
	/// Rules use this for the content of containers such as block quotes and
	/// list items, after stripping their markers. Positions of the returned
	/// tokens are relative to the file, not to `text`.
	pub fn tokenize_block_text(
		&self,
		context: &Context,
		text: &str,
		origin: Point,
	) -> DfmResult<Vec<BlockToken>> {
		let mut source = SourceCursor::with_origin(text, origin);
		self.tokenize_blocks(context, &mut source)
	}

	/// Tokenize inline content that starts at `origin` in the file. The
	/// context is switched to inline mode.
	pub fn tokenize_inline_text(
		&self,
		context: &Context,
		text: &str,
		origin: Point,
	) -> DfmResult<Vec<InlineToken>> {
		let context = context.inline_context();
		let mut source = SourceCursor::with_origin(text, origin);
		self.tokenize_inlines(&context, &mut source)
	}

	/// Second pass: replace every [`BlockKind::Pending`] placeholder with the
	/// token its continuation produces.
	///
	/// Children of containers are resolved too. Each continuation runs with
	/// the context captured when its rule matched.
	///
	/// # Errors
	///
	/// [`DfmError::UnresolvedPending`] when a continuation produces another
	/// placeholder instead of a final token.
	pub fn resolve_pending(&self, tokens: Vec<BlockToken>) -> DfmResult<Vec<BlockToken>> {
		tokens
			.into_iter()
			.map(|token| self.resolve_token(token))
			.collect()
	}

	fn resolve_token(&self, token: BlockToken) -> DfmResult<BlockToken> {
		let resumed = match &token.kind {
			BlockKind::Pending(deferred) => Some(deferred.resume(self)?),
			_ => None,
		};
		let mut token = resumed.unwrap_or(token);

		if let BlockKind::Pending(deferred) = &token.kind {
			return Err(DfmError::UnresolvedPending {
				rule: deferred.rule,
			});
		}

		if let Some(children) = token.children_mut() {
			let pending = std::mem::take(children);
			*children = self.resolve_pending(pending)?;
		}

		Ok(token)
	}
}
