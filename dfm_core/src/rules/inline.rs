//! Inline rules of the `markdown` and `gfm` flavors.
//!
//! Span rules (links, emphasis, deletions) tokenize their content with a
//! context one level deeper and decline once [`Context::MAX_NESTING`] is
//! reached, leaving the delimiters to the [`TextRule`].

use regex::Regex;

use super::InlineRule;
use super::compile;
use crate::Context;
use crate::DfmResult;
use crate::InlineKind;
use crate::InlineToken;
use crate::Point;
use crate::SourceCursor;
use crate::parser::LinkDefinition;
use crate::parser::Parser;

/// Backslash escapes of ASCII punctuation.
pub struct EscapeRule {
	pattern: Regex,
}

impl EscapeRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("escape", r#"^\\([\\`*{}\[\]()#+\-.!_<>~|@"'])"#)?,
		})
	}
}

impl InlineRule for EscapeRule {
	fn name(&self) -> &'static str {
		"escape"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};
		let text = captures[1].to_string();
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Escape { text },
		)))
	}
}

/// `<https://example.com>` and `<user@example.com>`.
pub struct AutoLinkRule {
	pattern: Regex,
}

impl AutoLinkRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile(
				"autolink",
				r"^<([A-Za-z][A-Za-z0-9+.\-]{1,31}:[^\s<>]*|[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+)>",
			)?,
		})
	}
}

impl InlineRule for AutoLinkRule {
	fn name(&self) -> &'static str {
		"autolink"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};

		let text = captures[1].to_string();
		let href = if !text.contains(':') && text.contains('@') {
			format!("mailto:{text}")
		} else {
			text.clone()
		};
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::AutoLink { href, text },
		)))
	}
}

/// Bare `https://` and `www.` links. Disabled inside link text.
pub struct UrlRule {
	pattern: Regex,
}

impl UrlRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("url", r#"^(?:https?://|www\.)[^\s<]*[^\s<?!.,:*_~)'"]"#)?,
		})
	}
}

impl InlineRule for UrlRule {
	fn name(&self) -> &'static str {
		"url"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		if context.is(Context::IS_IN_LINK) {
			return Ok(None);
		}
		let Some(found) = self.pattern.find(source.remaining()) else {
			return Ok(None);
		};

		let text = found.as_str().to_string();
		let href = if text.starts_with("www.") {
			format!("http://{text}")
		} else {
			text.clone()
		};
		let (_, position) = source.consume(found.end());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::AutoLink { href, text },
		)))
	}
}

/// Inline HTML tags and comments.
pub struct TagRule {
	pattern: Regex,
}

impl TagRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile(
				"tag",
				r#"^(?:<!--[\s\S]*?-->|</?[A-Za-z][A-Za-z0-9\-]*(?:\s+[A-Za-z_:][\w:.\-]*(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*\s*/?>)"#,
			)?,
		})
	}
}

impl InlineRule for TagRule {
	fn name(&self) -> &'static str {
		"tag"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let Some(found) = self.pattern.find(source.remaining()) else {
			return Ok(None);
		};
		let (raw, position) = source.consume(found.end());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Tag {
				raw: raw.to_string(),
			},
		)))
	}
}

/// Inline links and images, `[text](href "title")`.
pub struct LinkRule;

impl InlineRule for LinkRule {
	fn name(&self) -> &'static str {
		"link"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let remaining = source.remaining();
		let Some(label) = LinkLabel::parse(remaining) else {
			return Ok(None);
		};
		if !label.image && (context.is(Context::IS_IN_LINK) || !context.can_nest()) {
			return Ok(None);
		}
		let Some((destination, len)) = parse_destination(&remaining[label.len..]) else {
			return Ok(None);
		};

		let origin = source.point().advanced(&remaining[..label.text_start]);
		let (_, position) = source.consume(label.len + len);
		let kind = label.into_kind(parser, context, origin, destination)?;

		Ok(Some(InlineToken::new(self.name(), position, kind)))
	}
}

/// Reference links, `[text][label]` and `[text][]`.
pub struct RefLinkRule;

impl InlineRule for RefLinkRule {
	fn name(&self) -> &'static str {
		"reflink"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let remaining = source.remaining();
		let Some(label) = LinkLabel::parse(remaining) else {
			return Ok(None);
		};
		if !label.image && (context.is(Context::IS_IN_LINK) || !context.can_nest()) {
			return Ok(None);
		}

		let rest = &remaining[label.len..];
		let Some(reference) = rest.strip_prefix('[') else {
			return Ok(None);
		};
		let Some(close) = reference.find(']') else {
			return Ok(None);
		};
		let key = match &reference[..close] {
			"" => label.text,
			key if key.contains('[') => return Ok(None),
			key => key,
		};
		let Some(definition) = parser.link_definition(key) else {
			return Ok(None);
		};

		let origin = source.point().advanced(&remaining[..label.text_start]);
		let (_, position) = source.consume(label.len + close + 2);
		let kind = label.into_kind(parser, context, origin, definition)?;

		Ok(Some(InlineToken::new(self.name(), position, kind)))
	}
}

/// Shortcut reference links, `[label]`.
pub struct NoLinkRule;

impl InlineRule for NoLinkRule {
	fn name(&self) -> &'static str {
		"nolink"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let remaining = source.remaining();
		let Some(label) = LinkLabel::parse(remaining) else {
			return Ok(None);
		};
		if !label.image && (context.is(Context::IS_IN_LINK) || !context.can_nest()) {
			return Ok(None);
		}
		let Some(definition) = parser.link_definition(label.text) else {
			return Ok(None);
		};

		let origin = source.point().advanced(&remaining[..label.text_start]);
		let (_, position) = source.consume(label.len);
		let kind = label.into_kind(parser, context, origin, definition)?;

		Ok(Some(InlineToken::new(self.name(), position, kind)))
	}
}

/// Longest bracketed text a link may have, in bytes. Brackets left open for
/// longer are plain text.
const MAX_LABEL_LEN: usize = 999;

/// The bracketed part of a link or image.
struct LinkLabel<'a> {
	image: bool,
	text: &'a str,
	text_start: usize,
	/// Bytes up to and including the closing `]`.
	len: usize,
}

impl<'a> LinkLabel<'a> {
	fn parse(input: &'a str) -> Option<Self> {
		let (image, text_start) = if input.starts_with("![") {
			(true, 2)
		} else if input.starts_with('[') {
			(false, 1)
		} else {
			return None;
		};

		let mut depth = 1;
		let mut escaped = false;
		for (index, ch) in input[text_start..].char_indices() {
			if index > MAX_LABEL_LEN {
				break;
			}
			match ch {
				_ if escaped => escaped = false,
				'\\' => escaped = true,
				'[' => depth += 1,
				']' => {
					depth -= 1;
					if depth == 0 {
						let end = text_start + index;
						return Some(Self {
							image,
							text: &input[text_start..end],
							text_start,
							len: end + 1,
						});
					}
				}
				_ => {}
			}
		}

		None
	}

	fn into_kind(
		self,
		parser: &Parser,
		context: &Context,
		origin: Point,
		destination: LinkDefinition,
	) -> DfmResult<InlineKind> {
		if self.image {
			return Ok(InlineKind::Image {
				src: destination.href,
				title: destination.title,
				alt: self.text.to_string(),
			});
		}

		let inner = context.switch_variable(Context::IS_IN_LINK, true).descend();
		let children = parser.tokenize_inline_text(&inner, self.text, origin)?;

		Ok(InlineKind::Link {
			href: destination.href,
			title: destination.title,
			children,
		})
	}
}

/// Parse `(href "title")` at the start of `input`. Returns the destination and
/// the number of bytes consumed.
fn parse_destination(input: &str) -> Option<(LinkDefinition, usize)> {
	let inner = input.strip_prefix('(')?;
	let mut offset = 1;
	let skip_spaces = |text: &str| text.len() - text.trim_start().len();

	offset += skip_spaces(inner);
	let rest = &input[offset..];

	let (href, href_len) = if let Some(angled) = rest.strip_prefix('<') {
		let end = angled.find(['>', '\n'])?;
		if angled.as_bytes()[end] != b'>' {
			return None;
		}
		(angled[..end].to_string(), end + 2)
	} else {
		let mut depth = 0usize;
		let mut end = rest.len();
		for (index, ch) in rest.char_indices() {
			match ch {
				'(' => depth += 1,
				')' if depth == 0 => {
					end = index;
					break;
				}
				')' => depth -= 1,
				ch if ch.is_whitespace() => {
					end = index;
					break;
				}
				_ => {}
			}
		}
		(rest[..end].to_string(), end)
	};
	offset += href_len;
	offset += skip_spaces(&input[offset..]);

	let rest = &input[offset..];
	let mut title = None;
	if let Some(quote) = rest.chars().next().filter(|ch| matches!(ch, '"' | '\'' | '(')) {
		let closing = if quote == '(' { ')' } else { quote };
		let end = rest[1..].find(closing)?;
		title = Some(rest[1..=end].to_string());
		offset += end + 2;
		offset += skip_spaces(&input[offset..]);
	}

	if !input[offset..].starts_with(')') {
		return None;
	}

	Some((LinkDefinition { href, title }, offset + 1))
}

/// Find the closing delimiter of an emphasis-like span. `delimiter` closes only
/// when it is not immediately followed by another delimiter character.
fn find_closing(content: &str, delimiter: &str) -> Option<usize> {
	let delimiter_char = delimiter.chars().next()?;
	let mut escaped = false;

	for (index, ch) in content.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		if ch == '\\' {
			escaped = true;
			continue;
		}
		if index == 0 || !content[index..].starts_with(delimiter) {
			continue;
		}
		let after = &content[index + delimiter.len()..];
		if after.starts_with(delimiter_char) {
			continue;
		}
		return Some(index);
	}

	None
}

fn delimited<'a>(input: &'a str, delimiter: &str) -> Option<(&'a str, usize)> {
	let content = input.strip_prefix(delimiter)?;
	if content.starts_with(char::is_whitespace) {
		return None;
	}
	let end = find_closing(content, delimiter)?;
	if content[..end].ends_with(char::is_whitespace) {
		return None;
	}
	Some((&content[..end], delimiter.len() * 2 + end))
}

/// `**strong**` and `__strong__`.
pub struct StrongRule;

impl InlineRule for StrongRule {
	fn name(&self) -> &'static str {
		"strong"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		if !context.can_nest() {
			return Ok(None);
		}

		let remaining = source.remaining();
		let Some((content, len)) =
			delimited(remaining, "**").or_else(|| delimited(remaining, "__"))
		else {
			return Ok(None);
		};

		let origin = source.point().advanced(&remaining[..2]);
		let children = parser.tokenize_inline_text(&context.descend(), content, origin)?;
		let (_, position) = source.consume(len);

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Strong { children },
		)))
	}
}

/// `*em*` and `_em_`.
pub struct EmRule;

impl EmRule {
	fn find_end(content: &str, delimiter: char) -> Option<usize> {
		let doubled = delimiter.to_string().repeat(2);
		let mut chars = content.char_indices().peekable();
		let mut escaped = false;

		while let Some((index, ch)) = chars.next() {
			if escaped {
				escaped = false;
				continue;
			}
			if ch == '\\' {
				escaped = true;
				continue;
			}
			if ch != delimiter {
				continue;
			}
			if content[index..].starts_with(&doubled) {
				chars.next();
				continue;
			}
			if index == 0 {
				return None;
			}
			let next = content[index + 1..].chars().next();
			if delimiter == '_' && next.is_some_and(char::is_alphanumeric) {
				continue;
			}
			return Some(index);
		}

		None
	}
}

impl InlineRule for EmRule {
	fn name(&self) -> &'static str {
		"em"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		if !context.can_nest() {
			return Ok(None);
		}

		let remaining = source.remaining();
		let Some(delimiter) = remaining.chars().next().filter(|ch| matches!(ch, '*' | '_')) else {
			return Ok(None);
		};
		let content = &remaining[1..];
		if content.starts_with(char::is_whitespace) {
			return Ok(None);
		}
		let Some(end) = Self::find_end(content, delimiter) else {
			return Ok(None);
		};
		let inner = &content[..end];
		if inner.ends_with(char::is_whitespace) {
			return Ok(None);
		}

		let origin = source.point().advanced(&remaining[..1]);
		let children = parser.tokenize_inline_text(&context.descend(), inner, origin)?;
		let (_, position) = source.consume(end + 2);

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Em { children },
		)))
	}
}

/// `~~deleted~~`.
pub struct DelRule;

impl InlineRule for DelRule {
	fn name(&self) -> &'static str {
		"del"
	}

	fn try_match(
		&self,
		parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		if !context.can_nest() {
			return Ok(None);
		}

		let remaining = source.remaining();
		let Some((content, len)) = delimited(remaining, "~~") else {
			return Ok(None);
		};

		let origin = source.point().advanced(&remaining[..2]);
		let children = parser.tokenize_inline_text(&context.descend(), content, origin)?;
		let (_, position) = source.consume(len);

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Del { children },
		)))
	}
}

/// Code spans delimited by backtick runs of equal length.
pub struct CodeRule;

impl InlineRule for CodeRule {
	fn name(&self) -> &'static str {
		"code"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let remaining = source.remaining();
		let run = remaining.bytes().take_while(|b| *b == b'`').count();
		if run == 0 {
			return Ok(None);
		}

		let mut search = run;
		let end = loop {
			let Some(found) = remaining[search..].find('`') else {
				return Ok(None);
			};
			let start = search + found;
			let closing = remaining[start..].bytes().take_while(|b| *b == b'`').count();
			if closing == run {
				break start;
			}
			search = start + closing;
		};

		let raw = remaining[run..end].replace('\n', " ");
		let code = match raw.strip_prefix(' ').and_then(|rest| rest.strip_suffix(' ')) {
			Some(inner) if !inner.trim().is_empty() => inner.to_string(),
			_ => raw,
		};
		let (_, position) = source.consume(end + run);

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::CodeSpan { code },
		)))
	}
}

/// Hard line breaks: two trailing spaces or a backslash before a newline.
pub struct BrRule {
	pattern: Regex,
}

impl BrRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("br", r"^(?: {2,}|\\)\n")?,
		})
	}
}

impl InlineRule for BrRule {
	fn name(&self) -> &'static str {
		"br"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let Some(found) = self.pattern.find(source.remaining()) else {
			return Ok(None);
		};
		let (_, position) = source.consume(found.end());

		Ok(Some(InlineToken::new(self.name(), position, InlineKind::Br)))
	}
}

/// Plain text up to the next character another inline rule may start at.
///
/// The GFM variant also stops in front of bare URLs.
pub struct TextRule {
	gfm: bool,
}

impl TextRule {
	pub fn new() -> Self {
		Self { gfm: false }
	}

	pub fn gfm() -> Self {
		Self { gfm: true }
	}

	fn is_stop(&self, text: &str, index: usize, previous: Option<char>) -> bool {
		let rest = &text[index..];
		let Some(ch) = rest.chars().next() else {
			return true;
		};
		let after_word = previous.is_some_and(char::is_alphanumeric);

		match ch {
			'\\' | '<' | '!' | '[' | '*' | '`' | '~' => true,
			'_' | '@' => !after_word,
			' ' => {
				let spaces = rest.bytes().take_while(|b| *b == b' ').count();
				spaces >= 2 && rest[spaces..].starts_with('\n')
			}
			'h' | 'w' if self.gfm && !after_word => {
				rest.starts_with("http://") || rest.starts_with("https://") || rest.starts_with("www.")
			}
			_ => false,
		}
	}
}

impl Default for TextRule {
	fn default() -> Self {
		Self::new()
	}
}

impl InlineRule for TextRule {
	fn name(&self) -> &'static str {
		"text"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<InlineToken>> {
		let remaining = source.remaining();
		let mut chars = remaining.char_indices();
		let Some((_, first)) = chars.next() else {
			return Ok(None);
		};

		let mut previous = first;
		let mut len = remaining.len();
		for (index, ch) in chars {
			if self.is_stop(remaining, index, Some(previous)) {
				len = index;
				break;
			}
			previous = ch;
		}

		let (text, position) = source.consume(len);

		Ok(Some(InlineToken::text(self.name(), position, text)))
	}
}
