//! Block rules of the `markdown` and `gfm` flavors.
//!
//! Container rules ([`BlockquoteRule`], [`ListRule`]) strip their markers and
//! hand the content back to the parser with a nested [`Context`]. Leaf rules
//! that carry inline content emit two-phase tokens through
//! `deferred_inline`.

use regex::Regex;

use super::BlockRule;
use super::ListMarker;
use super::compile;
use super::indentation;
use super::interrupts_paragraph;
use super::is_blank;
use super::is_blockquote_start;
use super::is_hr;
use super::leading_newlines;
use super::lines_with_endings;
use super::list_marker;
use super::paragraph_len;
use super::strip_indent;
use crate::Alignment;
use crate::BlockKind;
use crate::BlockToken;
use crate::Context;
use crate::Deferred;
use crate::DfmResult;
use crate::InlineToken;
use crate::Point;
use crate::Position;
use crate::SourceCursor;
use crate::parser::LinkDefinition;
use crate::parser::Parser;

/// Build a two-phase token whose inline content is tokenized once all link
/// definitions of the document are known.
pub(crate) fn deferred_inline(
	rule: &'static str,
	position: Position,
	text: &str,
	origin: Point,
	context: &Context,
	build: impl Fn(Vec<InlineToken>) -> BlockKind + Send + Sync + 'static,
) -> BlockToken {
	let deferred = Deferred::new(
		rule,
		position,
		text,
		origin,
		context.clone(),
		move |parser, deferred| {
			let content =
				parser.tokenize_inline_text(&deferred.context, &deferred.source, deferred.origin)?;
			Ok(BlockToken::new(deferred.rule, deferred.position, build(content)))
		},
	);

	BlockToken::new(rule, position, BlockKind::Pending(deferred))
}

/// Blank lines.
pub struct NewlineRule {
	pattern: Regex,
}

impl NewlineRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("newline", r"^(?:[ \t]*\n)+|^[ \t]+$")?,
		})
	}
}

impl BlockRule for NewlineRule {
	fn name(&self) -> &'static str {
		"newline"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let Some(found) = self.pattern.find(source.remaining()) else {
			return Ok(None);
		};
		let (_, position) = source.consume(found.end());

		Ok(Some(BlockToken::new(self.name(), position, BlockKind::Newline)))
	}
}

/// Code indented by four spaces.
pub struct IndentedCodeRule;

impl BlockRule for IndentedCodeRule {
	fn name(&self) -> &'static str {
		"code"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let remaining = source.remaining();
		let mut len = 0;
		let mut code_end = 0;

		for line in lines_with_endings(remaining) {
			if is_blank(line) {
				if code_end == 0 {
					return Ok(None);
				}
				len += line.len();
				continue;
			}
			if indentation(line) < 4 {
				break;
			}
			len += line.len();
			code_end = len;
		}

		if code_end == 0 {
			return Ok(None);
		}

		let (matched, position) = source.consume(code_end);
		let text: String = lines_with_endings(matched)
			.map(|line| strip_indent(line, 4))
			.collect();

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Code {
				lang: None,
				text: text.trim_end_matches('\n').to_string(),
			},
		)))
	}
}

/// Fenced code blocks, `` ``` `` or `~~~`.
pub struct FencesRule {
	pattern: Regex,
}

impl FencesRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("fences", r"^( {0,3})(`{3,}|~{3,})[ \t]*([^\n]*?)[ \t]*(?:\n|$)")?,
		})
	}
}

impl BlockRule for FencesRule {
	fn name(&self) -> &'static str {
		"fences"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let remaining = source.remaining();
		let Some(captures) = self.pattern.captures(remaining) else {
			return Ok(None);
		};

		let indent = captures[1].len();
		let fence = &captures[2];
		let fence_char = fence.as_bytes()[0];
		let info = captures[3].trim();
		if fence_char == b'`' && info.contains('`') {
			return Ok(None);
		}

		let opening_len = captures[0].len();
		let mut len = opening_len;
		let mut text = String::new();

		for line in lines_with_endings(&remaining[opening_len..]) {
			len += line.len();
			if is_closing_fence(line, fence_char, fence.len()) {
				break;
			}
			text.push_str(strip_indent(line, indent));
		}

		let lang = info.split_whitespace().next().map(ToString::to_string);
		let (_, position) = source.consume(len);

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Code {
				lang,
				text: text.trim_end_matches('\n').to_string(),
			},
		)))
	}
}

fn is_closing_fence(line: &str, fence_char: u8, min_len: usize) -> bool {
	if indentation(line) > 3 {
		return false;
	}
	let trimmed = line.trim();
	let run = trimmed.bytes().take_while(|b| *b == fence_char).count();
	run >= min_len && run == trimmed.len()
}

/// ATX headings, `# Title`.
///
/// The base flavor accepts `#Title`; the GFM variant requires whitespace after
/// the hashes. [`HeadingRule::exact`] builds a variant that only matches one
/// level, under its own rule name.
pub struct HeadingRule {
	name: &'static str,
	pattern: Regex,
	exact_level: Option<u8>,
}

impl HeadingRule {
	const BASE: &'static str = r"^ *(#{1,6}) *([^\n]+?) *#* *(?:\n+|$)";
	const GFM: &'static str = r"^ {0,3}(#{1,6})[ \t]+([^\n]+?)(?:[ \t]+#+)?[ \t]*(?:\n+|$)";

	/// The heading rule of the `markdown` flavor.
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			name: "heading",
			pattern: compile("heading", Self::BASE)?,
			exact_level: None,
		})
	}

	/// The heading rule of the `gfm` and `dfm` flavors.
	pub fn gfm() -> DfmResult<Self> {
		Ok(Self {
			name: "heading",
			pattern: compile("heading", Self::GFM)?,
			exact_level: None,
		})
	}

	/// A GFM heading rule that only matches headings of `level`.
	pub fn exact(name: &'static str, level: u8) -> DfmResult<Self> {
		Ok(Self {
			name,
			pattern: compile(name, Self::GFM)?,
			exact_level: Some(level),
		})
	}
}

impl BlockRule for HeadingRule {
	fn name(&self) -> &'static str {
		self.name
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};

		let depth = captures[1].len() as u8;
		if self.exact_level.is_some_and(|level| level != depth) {
			return Ok(None);
		}

		let content = captures.get(2).map_or("", |m| m.as_str());
		let content_start = captures.get(2).map_or(0, |m| m.start());
		let origin = source.point().advanced(&source.remaining()[..content_start]);
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(deferred_inline(
			self.name,
			position,
			content,
			origin,
			context,
			move |content| {
				BlockKind::Heading {
					depth,
					id: None,
					content,
				}
			},
		)))
	}
}

/// Setext headings, underlined with `===` or `---`.
pub struct LHeadingRule {
	pattern: Regex,
}

impl LHeadingRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("lheading", r"^([^\n]+)\n {0,3}(={2,}|-{2,})[ \t]*(?:\n+|$)")?,
		})
	}
}

impl BlockRule for LHeadingRule {
	fn name(&self) -> &'static str {
		"lheading"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};

		let title = &captures[1];
		if interrupts_paragraph(title, true) || title.trim_start().starts_with('<') {
			return Ok(None);
		}

		let depth = if captures[2].starts_with('=') { 1 } else { 2 };
		let text = title.trim().to_string();
		let origin = source.point();
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(deferred_inline(
			self.name(),
			position,
			&text,
			origin,
			context,
			move |content| {
				BlockKind::Heading {
					depth,
					id: None,
					content,
				}
			},
		)))
	}
}

/// Thematic breaks.
pub struct HrRule {
	pattern: Regex,
}

impl HrRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile(
				"hr",
				r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})(?:\n+|$)",
			)?,
		})
	}
}

impl BlockRule for HrRule {
	fn name(&self) -> &'static str {
		"hr"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let Some(found) = self.pattern.find(source.remaining()) else {
			return Ok(None);
		};
		let (_, position) = source.consume(found.end());

		Ok(Some(BlockToken::new(self.name(), position, BlockKind::Hr)))
	}
}

/// Block quotes. The quote content is tokenized with
/// [`Context::IS_BLOCK_QUOTE`] set, which enables the callout rules.
///
/// Quotes nested deeper than [`Context::MAX_NESTING`] are not opened; their
/// markers stay in the text of the innermost quote.
pub struct BlockquoteRule;

impl BlockRule for BlockquoteRule {
	fn name(&self) -> &'static str {
		"blockquote"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !context.can_nest() {
			return Ok(None);
		}

		let remaining = source.remaining();
		let mut len = 0;
		let mut content = String::new();

		for (index, line) in lines_with_endings(remaining).enumerate() {
			if is_blockquote_start(line) {
				content.push_str(strip_quote_marker(line));
			} else if index == 0 || is_blank(line) || interrupts_paragraph(line, true) {
				break;
			} else {
				// Lazy continuation of the quoted paragraph.
				content.push_str(line.trim_start());
			}
			len += line.len();
		}

		if len == 0 {
			return Ok(None);
		}

		let origin = source.point();
		let (_, position) = source.consume(len);
		let nested = context.nested(Context::IS_BLOCK_QUOTE);
		let children = parser.tokenize_block_text(&nested, &content, origin)?;

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Blockquote {
				children: group_callouts(children),
			},
		)))
	}
}

fn strip_quote_marker(line: &str) -> &str {
	let trimmed = line.trim_start_matches(' ');
	let without_marker = trimmed.strip_prefix('>').unwrap_or(trimmed);
	without_marker
		.strip_prefix(' ')
		.or_else(|| without_marker.strip_prefix('\t'))
		.unwrap_or(without_marker)
}

/// Move the blocks following a note or section marker into that marker.
fn group_callouts(children: Vec<BlockToken>) -> Vec<BlockToken> {
	let mut grouped: Vec<BlockToken> = Vec::with_capacity(children.len());

	for child in children {
		let is_marker = matches!(
			child.kind,
			BlockKind::Note { .. } | BlockKind::Section { .. } | BlockKind::Video { .. }
		);

		if !is_marker {
			if let Some(last) = grouped.last_mut() {
				if let BlockKind::Note { children, .. } | BlockKind::Section { children, .. } =
					&mut last.kind
				{
					last.position.end = child.position.end;
					children.push(child);
					continue;
				}
			}
		}

		grouped.push(child);
	}

	grouped
}

/// Bullet and ordered lists, including GFM task items.
///
/// Items are tokenized with [`Context::IS_IN_LIST`] set. A list is loose when
/// any two of its items, or two blocks of one item, are separated by a blank
/// line. Like quotes, lists stop nesting at [`Context::MAX_NESTING`].
pub struct ListRule;

struct ItemScan {
	marker: ListMarker,
	start: usize,
	end: usize,
	content: String,
	has_inner_blank: bool,
}

impl BlockRule for ListRule {
	fn name(&self) -> &'static str {
		"list"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !context.can_nest() {
			return Ok(None);
		}

		let remaining = source.remaining();
		let Some(first) = lines_with_endings(remaining).next() else {
			return Ok(None);
		};
		let Some(marker) = list_marker(first) else {
			return Ok(None);
		};
		if is_hr(first) {
			return Ok(None);
		}

		let mut items = vec![ItemScan {
			marker,
			start: 0,
			end: first.len(),
			content: item_first_line(first, &marker).to_string(),
			has_inner_blank: false,
		}];
		let mut loose = false;
		let mut offset = first.len();
		let mut pending_blank = 0;

		for line in lines_with_endings(&remaining[first.len()..]) {
			let Some(current) = items.last_mut() else {
				break;
			};

			if is_blank(line) {
				pending_blank += line.len();
				offset += line.len();
				continue;
			}

			if indentation(line) >= current.marker.content_indent {
				if pending_blank > 0 {
					current.content.push('\n');
					current.has_inner_blank = true;
				}
				current
					.content
					.push_str(strip_indent(line, current.marker.content_indent));
				offset += line.len();
				current.end = offset;
				pending_blank = 0;
				continue;
			}

			if let Some(next) = list_marker(line) {
				if !is_hr(line) && continues_list(&marker, &next) {
					loose |= pending_blank > 0;
					items.push(ItemScan {
						marker: next,
						start: offset,
						end: offset + line.len(),
						content: item_first_line(line, &next).to_string(),
						has_inner_blank: false,
					});
					offset += line.len();
					pending_blank = 0;
					continue;
				}
			}

			if pending_blank == 0 && !interrupts_paragraph(line, true) {
				current.content.push_str(line.trim_start());
				offset += line.len();
				current.end = offset;
				continue;
			}

			break;
		}

		let Some(list_end) = items.last().map(|item| item.end) else {
			return Ok(None);
		};
		loose |= items.iter().any(|item| item.has_inner_blank);

		let start_point = source.point();
		let nested = context.nested(Context::IS_IN_LIST);
		let mut tokens = Vec::with_capacity(items.len());

		for item in &items {
			let item_start = start_point.advanced(&remaining[..item.start]);
			let item_end = start_point.advanced(&remaining[..item.end]);
			let (checked, content) = split_task_marker(&item.content);
			let children = parser.tokenize_block_text(&nested, content, item_start)?;

			tokens.push(BlockToken::new(
				self.name(),
				Position::from_points(item_start, item_end),
				BlockKind::ListItem {
					checked,
					loose,
					children,
				},
			));
		}

		let (_, position) = source.consume(list_end);

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::List {
				ordered: marker.ordered,
				start: marker.start,
				loose,
				items: tokens,
			},
		)))
	}
}

fn continues_list(first: &ListMarker, next: &ListMarker) -> bool {
	first.ordered == next.ordered && first.delimiter == next.delimiter
}

fn item_first_line<'a>(line: &'a str, marker: &ListMarker) -> &'a str {
	line.get(marker.content_offset..).unwrap_or("")
}

fn split_task_marker(content: &str) -> (Option<bool>, &str) {
	for (prefix, checked) in [("[ ] ", false), ("[x] ", true), ("[X] ", true)] {
		if let Some(rest) = content.strip_prefix(prefix) {
			return (Some(checked), rest);
		}
	}
	(None, content)
}

/// Raw HTML blocks.
pub struct HtmlRule {
	pattern: Regex,
}

impl HtmlRule {
	const BLOCK_TAGS: &'static [&'static str] = &[
		"address",
		"article",
		"aside",
		"blockquote",
		"body",
		"caption",
		"center",
		"col",
		"colgroup",
		"dd",
		"details",
		"dialog",
		"div",
		"dl",
		"dt",
		"fieldset",
		"figcaption",
		"figure",
		"footer",
		"form",
		"h1",
		"h2",
		"h3",
		"h4",
		"h5",
		"h6",
		"header",
		"hr",
		"iframe",
		"li",
		"main",
		"nav",
		"ol",
		"p",
		"pre",
		"script",
		"section",
		"style",
		"summary",
		"table",
		"tbody",
		"td",
		"tfoot",
		"th",
		"thead",
		"title",
		"tr",
		"ul",
		"video",
		"textarea",
	];

	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("html", r"^ {0,3}<(!--|/?([A-Za-z][A-Za-z0-9-]*))")?,
		})
	}
}

impl BlockRule for HtmlRule {
	fn name(&self) -> &'static str {
		"html"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let remaining = source.remaining();
		let Some(captures) = self.pattern.captures(remaining) else {
			return Ok(None);
		};

		let len = if &captures[1] == "!--" {
			match remaining.find("-->") {
				Some(end) => line_end(remaining, end + 3),
				None => remaining.len(),
			}
		} else {
			let tag = captures[2].to_ascii_lowercase();
			if !Self::BLOCK_TAGS.contains(&tag.as_str()) {
				return Ok(None);
			}
			if matches!(tag.as_str(), "pre" | "script" | "style" | "textarea") {
				let closing = format!("</{tag}>");
				match remaining.to_ascii_lowercase().find(&closing) {
					Some(end) => line_end(remaining, end + closing.len()),
					None => remaining.len(),
				}
			} else {
				lines_with_endings(remaining)
					.take_while(|line| !is_blank(line))
					.map(str::len)
					.sum()
			}
		};

		let (raw, position) = source.consume(len);

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Html {
				raw: raw.to_string(),
			},
		)))
	}
}

/// Byte offset of the end of the line containing `offset`, including its
/// newline.
fn line_end(text: &str, offset: usize) -> usize {
	text[offset..]
		.find('\n')
		.map_or(text.len(), |index| offset + index + 1)
}

/// Link reference definitions, `[label]: href "title"`. They are recorded in
/// the parser and leave an [`BlockKind::Ignore`] token behind. Only the top
/// level of a document defines links.
pub struct DefRule {
	pattern: Regex,
}

impl DefRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile(
				"def",
				r#"^ {0,3}\[([^\]\n]+)\]:[ \t]*\n?[ \t]*<?([^\s>]+)>?(?:[ \t]+(?:"([^"\n]*)"|'([^'\n]*)'|\(([^)\n]*)\)))?[ \t]*(?:\n+|$)"#,
			)?,
		})
	}
}

impl BlockRule for DefRule {
	fn name(&self) -> &'static str {
		"def"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !context.is(Context::IS_TOP) {
			return Ok(None);
		}
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};

		let label = &captures[1];
		if label.starts_with('!') || label.starts_with('^') {
			return Ok(None);
		}

		let title = captures
			.get(3)
			.or_else(|| captures.get(4))
			.or_else(|| captures.get(5))
			.map(|m| m.as_str().to_string());
		parser.define_link(
			label,
			LinkDefinition {
				href: captures[2].to_string(),
				title,
			},
		);
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(BlockToken::new(self.name(), position, BlockKind::Ignore)))
	}
}

/// GFM tables.
pub struct TableRule {
	delimiter: Regex,
}

impl TableRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			delimiter: compile(
				"table",
				r"^ {0,3}\|?[ \t]*:?-+:?[ \t]*(?:\|[ \t]*:?-+:?[ \t]*)*\|?[ \t]*\n?$",
			)?,
		})
	}
}

impl BlockRule for TableRule {
	fn name(&self) -> &'static str {
		"table"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let remaining = source.remaining();
		let mut lines = lines_with_endings(remaining);
		let (Some(header_line), Some(delimiter_line)) = (lines.next(), lines.next()) else {
			return Ok(None);
		};
		if !header_line.contains('|') || !self.delimiter.is_match(delimiter_line) {
			return Ok(None);
		}

		let header = split_cells(header_line);
		let align: Vec<Option<Alignment>> = split_cells(delimiter_line)
			.iter()
			.map(|cell| parse_alignment(cell))
			.collect();
		if header.len() != align.len() {
			return Ok(None);
		}

		let mut len = header_line.len() + delimiter_line.len();
		let mut rows = Vec::new();
		for line in lines {
			if is_blank(line) || !line.contains('|') {
				break;
			}
			let mut cells = split_cells(line);
			cells.resize(header.len(), String::new());
			rows.push(cells);
			len += line.len();
		}

		let origin = source.point();
		let (matched, position) = source.consume(len);
		let deferred = Deferred::new(
			self.name(),
			position,
			matched,
			origin,
			context.clone(),
			move |parser, deferred| {
				let cell = |text: &String| {
					parser.tokenize_inline_text(&deferred.context, text, deferred.origin)
				};
				let header = header.iter().map(cell).collect::<DfmResult<Vec<_>>>()?;
				let rows = rows
					.iter()
					.map(|row| row.iter().map(cell).collect::<DfmResult<Vec<_>>>())
					.collect::<DfmResult<Vec<_>>>()?;

				Ok(BlockToken::new(
					deferred.rule,
					deferred.position,
					BlockKind::Table {
						align: align.clone(),
						header,
						rows,
					},
				))
			},
		);

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Pending(deferred),
		)))
	}
}

fn split_cells(line: &str) -> Vec<String> {
	let trimmed = line.trim();
	let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
	let trimmed = match trimmed.strip_suffix('|') {
		Some(rest) if !rest.ends_with('\\') => rest,
		_ => trimmed,
	};

	let mut cells = Vec::new();
	let mut cell = String::new();
	let mut chars = trimmed.chars().peekable();
	while let Some(ch) = chars.next() {
		match ch {
			'\\' if chars.peek() == Some(&'|') => {
				cell.push('|');
				chars.next();
			}
			'|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
			_ => cell.push(ch),
		}
	}
	cells.push(cell.trim().to_string());
	cells
}

fn parse_alignment(cell: &str) -> Option<Alignment> {
	match (cell.starts_with(':'), cell.ends_with(':')) {
		(true, true) => Some(Alignment::Center),
		(true, false) => Some(Alignment::Left),
		(false, true) => Some(Alignment::Right),
		(false, false) => None,
	}
}

/// Top-level paragraphs. Inside list items the `text` rule takes over.
pub struct ParagraphRule;

impl BlockRule for ParagraphRule {
	fn name(&self) -> &'static str {
		"paragraph"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if context.is(Context::IS_IN_LIST) {
			return Ok(None);
		}

		let remaining = source.remaining();
		let len = paragraph_len(remaining, false);
		if len == 0 || is_blank(&remaining[..len]) {
			return Ok(None);
		}

		let text = paragraph_text(&remaining[..len]);
		let len = len + leading_newlines(&remaining[len..]);
		let origin = source.point();
		let (_, position) = source.consume(len);

		Ok(Some(deferred_inline(
			self.name(),
			position,
			&text,
			origin,
			context,
			|content| BlockKind::Paragraph { content },
		)))
	}
}

/// The catch-all block rule. It always consumes at least the current line, so
/// every rule set ending with it makes progress on any input.
pub struct TextRule;

impl BlockRule for TextRule {
	fn name(&self) -> &'static str {
		"text"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let remaining = source.remaining();
		let len = match paragraph_len(remaining, context.is(Context::IS_IN_LIST)) {
			0 => remaining.len(),
			len => len,
		};

		let text = paragraph_text(&remaining[..len]);
		let len = len + leading_newlines(&remaining[len..]);
		let origin = source.point();
		let (_, position) = source.consume(len);

		Ok(Some(deferred_inline(
			self.name(),
			position,
			&text,
			origin,
			context,
			|content| BlockKind::Text { content },
		)))
	}
}

/// Join paragraph lines, dropping the leading indentation of each line.
fn paragraph_text(lines: &str) -> String {
	lines_with_endings(lines)
		.map(str::trim_start)
		.collect::<String>()
		.trim_end()
		.to_string()
}
