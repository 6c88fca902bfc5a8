//! Pluggable tokenization rules.
//!
//! A rule recognizes one markdown construct at the start of the remaining
//! input. Rules are tried in list order and the first match wins, so a rule
//! set is fully described by the order of its entries. Flavors are built by
//! substituting entries in that list (see [`crate::flavor`]).

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::BlockToken;
use crate::Context;
use crate::DfmError;
use crate::DfmResult;
use crate::InlineToken;
use crate::SourceCursor;
use crate::parser::Parser;

pub mod block;
pub mod dfm;
pub mod inline;

/// Recognizes one block-level construct.
///
/// Returning `Ok(None)` means "no match"; the parser restores the cursor and
/// tries the next rule. A returned token must have consumed at least one
/// character. Errors are reserved for failures of nested tokenization.
///
/// Rules are shared between threads through the [`RuleSet`], so any state
/// they keep must be immutable after construction. Per-document state, such
/// as link definitions, lives in the [`Parser`].
pub trait BlockRule: Send + Sync {
	/// The name the rule is addressed by in a [`RuleSetBuilder`] and reported
	/// under in errors and token trees.
	fn name(&self) -> &'static str;

	/// Try to match at the start of `source`.
	///
	/// On a match the rule advances `source` past the matched text and
	/// returns the token. Nested content is tokenized through `parser` with
	/// a context derived from `context`.
	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>>;
}

/// Recognizes one inline-level construct.
///
/// The contract matches [`BlockRule`]: `Ok(None)` for no match, and a
/// returned token must have consumed input. Inline rules run against the
/// text of one block at a time.
pub trait InlineRule: Send + Sync {
	/// The name the rule is addressed by in a [`RuleSetBuilder`].
	fn name(&self) -> &'static str;

	/// Try to match at the start of `source`, advancing it on success.
	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>>;
}

/// An ordered, immutable collection of block and inline rules.
///
/// Cloning is cheap and the lists are shared between all parses using the
/// set.
#[derive(Clone)]
pub struct RuleSet {
	block: Arc<[Arc<dyn BlockRule>]>,
	inline: Arc<[Arc<dyn InlineRule>]>,
}

impl RuleSet {
	/// An empty builder. A usable set needs a catch-all `text` rule last in
	/// both lists.
	pub fn builder() -> RuleSetBuilder {
		RuleSetBuilder::default()
	}

	/// Start a builder from the rules of this set.
	pub fn to_builder(&self) -> RuleSetBuilder {
		RuleSetBuilder {
			block: self.block.to_vec(),
			inline: self.inline.to_vec(),
		}
	}

	/// The block rules in the order they are tried.
	pub fn block_rules(&self) -> &[Arc<dyn BlockRule>] {
		&self.block
	}

	/// The inline rules in the order they are tried.
	pub fn inline_rules(&self) -> &[Arc<dyn InlineRule>] {
		&self.inline
	}

	/// Names of the block rules, in order.
	pub fn block_names(&self) -> Vec<&'static str> {
		self.block.iter().map(|rule| rule.name()).collect()
	}

	pub fn inline_names(&self) -> Vec<&'static str> {
		self.inline.iter().map(|rule| rule.name()).collect()
	}
}

impl fmt::Debug for RuleSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuleSet")
			.field("block", &self.block_names())
			.field("inline", &self.inline_names())
			.finish()
	}
}

/// Builds a [`RuleSet`].
///
/// Rules are addressed by [`BlockRule::name`] or [`InlineRule::name`]. When
/// several rules share a name the first one is used. Lookups of a name that
/// is not in the list fail with [`DfmError::UnknownRule`].
///
/// ```
/// use dfm_core::Flavor;
/// use dfm_core::rules::block::HeadingRule;
///
/// let rules = Flavor::Gfm
/// 	.rules()
/// 	.unwrap()
/// 	.to_builder()
/// 	.remove_block("hr")
/// 	.unwrap()
/// 	.insert_block_before("heading", HeadingRule::exact("title", 1).unwrap())
/// 	.unwrap()
/// 	.build();
///
/// assert!(!rules.block_names().contains(&"hr"));
/// ```
#[derive(Default, Clone)]
pub struct RuleSetBuilder {
	block: Vec<Arc<dyn BlockRule>>,
	inline: Vec<Arc<dyn InlineRule>>,
}

impl RuleSetBuilder {
	/// Append a block rule. It is tried after every rule already present.
	#[must_use]
	pub fn block(mut self, rule: impl BlockRule + 'static) -> Self {
		self.block.push(Arc::new(rule));
		self
	}

	/// Append an inline rule.
	#[must_use]
	pub fn inline(mut self, rule: impl InlineRule + 'static) -> Self {
		self.inline.push(Arc::new(rule));
		self
	}

	/// Put `rule` in the place of the block rule called `name`.
	pub fn replace_block(mut self, name: &str, rule: impl BlockRule + 'static) -> DfmResult<Self> {
		let index = find(&self.block, name, |rule| rule.name())?;
		self.block[index] = Arc::new(rule);
		Ok(self)
	}

	/// Insert `rule` so that it is tried right before the block rule called
	/// `name`, and therefore wins where both match.
	pub fn insert_block_before(
		mut self,
		name: &str,
		rule: impl BlockRule + 'static,
	) -> DfmResult<Self> {
		let index = find(&self.block, name, |rule| rule.name())?;
		self.block.insert(index, Arc::new(rule));
		Ok(self)
	}

	/// Insert `rule` so that it is tried right after the block rule called
	/// `name`. It only sees input that rule declined.
	pub fn insert_block_after(
		mut self,
		name: &str,
		rule: impl BlockRule + 'static,
	) -> DfmResult<Self> {
		let index = find(&self.block, name, |rule| rule.name())?;
		self.block.insert(index + 1, Arc::new(rule));
		Ok(self)
	}

	/// Drop the block rule called `name`.
	pub fn remove_block(mut self, name: &str) -> DfmResult<Self> {
		let index = find(&self.block, name, |rule| rule.name())?;
		self.block.remove(index);
		Ok(self)
	}

	/// Put `rule` in the place of the inline rule called `name`.
	pub fn replace_inline(
		mut self,
		name: &str,
		rule: impl InlineRule + 'static,
	) -> DfmResult<Self> {
		let index = find(&self.inline, name, |rule| rule.name())?;
		self.inline[index] = Arc::new(rule);
		Ok(self)
	}

	/// Insert `rule` right before the inline rule called `name`.
	pub fn insert_inline_before(
		mut self,
		name: &str,
		rule: impl InlineRule + 'static,
	) -> DfmResult<Self> {
		let index = find(&self.inline, name, |rule| rule.name())?;
		self.inline.insert(index, Arc::new(rule));
		Ok(self)
	}

	/// Insert `rule` right after the inline rule called `name`.
	pub fn insert_inline_after(
		mut self,
		name: &str,
		rule: impl InlineRule + 'static,
	) -> DfmResult<Self> {
		let index = find(&self.inline, name, |rule| rule.name())?;
		self.inline.insert(index + 1, Arc::new(rule));
		Ok(self)
	}

	/// Drop the inline rule called `name`.
	pub fn remove_inline(mut self, name: &str) -> DfmResult<Self> {
		let index = find(&self.inline, name, |rule| rule.name())?;
		self.inline.remove(index);
		Ok(self)
	}

	/// Freeze the lists into a shareable [`RuleSet`].
	pub fn build(self) -> RuleSet {
		RuleSet {
			block: self.block.into(),
			inline: self.inline.into(),
		}
	}
}

fn find<T: ?Sized>(
	rules: &[Arc<T>],
	name: &str,
	rule_name: impl Fn(&T) -> &'static str,
) -> DfmResult<usize> {
	rules
		.iter()
		.position(|rule| rule_name(&**rule) == name)
		.ok_or_else(|| DfmError::UnknownRule(name.to_string()))
}

/// Compile a rule pattern. Patterns are always anchored to the start of the
/// remaining input; an unanchored pattern is wrapped in `^(?:...)`.
pub fn compile(rule: &str, pattern: &str) -> DfmResult<Regex> {
	let anchored = if is_anchored(pattern) {
		pattern.to_string()
	} else {
		format!("^(?:{pattern})")
	};

	Regex::new(&anchored).map_err(|e| {
		DfmError::InvalidPattern {
			rule: rule.to_string(),
			reason: e.to_string(),
		}
	})
}

fn is_anchored(pattern: &str) -> bool {
	let mut rest = pattern;
	// Skip leading flag groups such as `(?i)` or `(?s)`.
	while let Some(stripped) = rest.strip_prefix("(?") {
		let Some(end) = stripped.find(')') else {
			return false;
		};
		let flags = &stripped[..end];
		if flags.contains(':') {
			return false;
		}
		rest = &stripped[end + 1..];
	}
	rest.starts_with('^')
}

/// Split `text` into lines, keeping the trailing `\n` of each line.
pub(crate) fn lines_with_endings(text: &str) -> impl Iterator<Item = &str> {
	text.split_inclusive('\n')
}

pub(crate) fn is_blank(line: &str) -> bool {
	line.trim().is_empty()
}

/// Count leading spaces, expanding tabs to the next multiple of four.
pub(crate) fn indentation(line: &str) -> usize {
	let mut width = 0;
	for ch in line.chars() {
		match ch {
			' ' => width += 1,
			'\t' => width += 4 - width % 4,
			_ => break,
		}
	}
	width
}

/// Remove up to `width` columns of leading whitespace.
pub(crate) fn strip_indent(line: &str, width: usize) -> &str {
	let mut removed = 0;
	for (index, ch) in line.char_indices() {
		if removed >= width {
			return &line[index..];
		}
		match ch {
			' ' => removed += 1,
			'\t' => removed += 4 - removed % 4,
			_ => return &line[index..],
		}
	}
	""
}

/// Whether `line` starts an ATX heading.
pub(crate) fn is_atx_heading(line: &str) -> bool {
	let trimmed = line.trim_start_matches(' ');
	if line.len() - trimmed.len() > 3 {
		return false;
	}
	let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
	(1..=6).contains(&hashes)
		&& trimmed[hashes..]
			.chars()
			.next()
			.is_none_or(|ch| ch == ' ' || ch == '\t' || ch == '\n')
}

/// Whether `line` is a thematic break.
pub(crate) fn is_hr(line: &str) -> bool {
	if indentation(line) > 3 {
		return false;
	}
	let content: String = line.chars().filter(|ch| !ch.is_whitespace()).collect();
	let Some(first) = content.chars().next() else {
		return false;
	};
	matches!(first, '-' | '*' | '_') && content.len() >= 3 && content.chars().all(|ch| ch == first)
}

/// Whether `line` opens a fenced code block.
pub(crate) fn is_fence(line: &str) -> bool {
	if indentation(line) > 3 {
		return false;
	}
	let trimmed = line.trim_start();
	trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

pub(crate) fn is_blockquote_start(line: &str) -> bool {
	indentation(line) <= 3 && line.trim_start().starts_with('>')
}

/// A list marker at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListMarker {
	/// Columns before the marker.
	pub indent: usize,
	/// `b'-'`, `b'*'`, `b'+'` for bullets, `b'.'` or `b')'` for ordered.
	pub delimiter: u8,
	pub ordered: bool,
	pub start: Option<u64>,
	/// Columns from the line start to the item content.
	pub content_indent: usize,
	/// Byte offset of the item content within the marker line.
	pub content_offset: usize,
}

pub(crate) fn list_marker(line: &str) -> Option<ListMarker> {
	let indent = indentation(line);
	if indent > 3 && !line.starts_with('\t') {
		return None;
	}
	let rest = line.trim_start_matches([' ', '\t']);
	let bytes = rest.as_bytes();
	let first = *bytes.first()?;

	let (marker_len, delimiter, ordered, start) = if matches!(first, b'-' | b'*' | b'+') {
		(1, first, false, None)
	} else {
		let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
		if digits == 0 || digits > 9 {
			return None;
		}
		let delimiter = *bytes.get(digits)?;
		if !matches!(delimiter, b'.' | b')') {
			return None;
		}
		let start = rest[..digits].parse().ok();
		(digits + 1, delimiter, true, start)
	};

	let after = &rest[marker_len..];
	let spaces = after.bytes().take_while(|b| *b == b' ').count();
	let at_line_end = after[spaces..].is_empty() || after[spaces..].starts_with('\n');
	if spaces == 0 && !at_line_end {
		return None;
	}
	// Five or more spaces mean indented code inside the item.
	let padding = if spaces > 4 || at_line_end { 1 } else { spaces };
	let leading = line.len() - rest.len();
	let content_offset = if at_line_end {
		leading + marker_len + spaces
	} else {
		leading + marker_len + padding
	};

	Some(ListMarker {
		indent,
		delimiter,
		ordered,
		start,
		content_indent: indent + marker_len + padding,
		content_offset,
	})
}

/// Whether `line` interrupts a running paragraph.
pub(crate) fn interrupts_paragraph(line: &str, in_list: bool) -> bool {
	is_atx_heading(line)
		|| is_hr(line)
		|| is_fence(line)
		|| is_blockquote_start(line)
		|| (in_list && list_marker(line).is_some())
}

/// Consume consecutive non-blank lines forming a paragraph. The first line is
/// always taken. Returns the byte length of the paragraph lines (without
/// trailing blank lines).
pub(crate) fn paragraph_len(text: &str, in_list: bool) -> usize {
	let mut len = 0;
	for (index, line) in lines_with_endings(text).enumerate() {
		if index > 0 && (is_blank(line) || interrupts_paragraph(line, in_list)) {
			break;
		}
		if index == 0 && is_blank(line) {
			return line.len();
		}
		len += line.len();
	}
	len
}

/// Length of the run of newlines at the start of `text`.
pub(crate) fn leading_newlines(text: &str) -> usize {
	text.bytes().take_while(|b| *b == b'\n').count()
}

/// Normalize a link label for reference lookups.
pub(crate) fn normalize_label(label: &str) -> String {
	label
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.to_lowercase()
}
