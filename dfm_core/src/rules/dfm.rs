//! DocFX extensions: file inclusion, callouts, sections, video embeds and
//! cross references.

use regex::Captures;
use regex::Regex;

use super::BlockRule;
use super::InlineRule;
use super::compile;
use crate::BlockKind;
use crate::BlockToken;
use crate::Context;
use crate::DfmResult;
use crate::IncludeDirective;
use crate::InlineKind;
use crate::InlineToken;
use crate::SourceCursor;
use crate::parser::Parser;

const INCLUDE_TARGET: &str = r#"\[((?:[^\[\]\n]|\[[^\[\]\n]*\])*)\]\([ \t]*(<[^>\n]*>|[^\s)]+)(?:[ \t]+"[^"\n]*"|[ \t]+'[^'\n]*')?[ \t]*\)\]"#;

fn include_directive(captures: &Captures<'_>, raw: &str) -> Option<IncludeDirective> {
	let title = captures.get(2).map_or("", |m| m.as_str());
	let path = captures.get(3).map_or("", |m| m.as_str());
	let path = path
		.strip_prefix('<')
		.and_then(|inner| inner.strip_suffix('>'))
		.unwrap_or(path)
		.trim();
	if path.is_empty() {
		return None;
	}

	Some(IncludeDirective {
		title: title.to_string(),
		path: path.to_string(),
		raw: raw.trim_end().to_string(),
	})
}

/// `[!include[title](path)]` on a line of its own.
pub struct IncludeBlockRule {
	pattern: Regex,
}

impl IncludeBlockRule {
	pub fn new() -> DfmResult<Self> {
		let pattern = format!(r"(?i)^\[!include(\+)?{INCLUDE_TARGET}[ \t]*(?:\n+|$)");

		Ok(Self {
			pattern: compile("include_block", &pattern)?,
		})
	}
}

impl BlockRule for IncludeBlockRule {
	fn name(&self) -> &'static str {
		"include_block"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		_context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};
		let Some(directive) = include_directive(&captures, &captures[0]) else {
			return Ok(None);
		};
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Include(directive),
		)))
	}
}

/// `[!include[title](path)]` within a line of text.
pub struct IncludeInlineRule {
	pattern: Regex,
}

impl IncludeInlineRule {
	pub fn new() -> DfmResult<Self> {
		let pattern = format!(r"(?i)^\[!include(-)?{INCLUDE_TARGET}");

		Ok(Self {
			pattern: compile("include_inline", &pattern)?,
		})
	}
}

impl InlineRule for IncludeInlineRule {
	fn name(&self) -> &'static str {
		"include_inline"
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
		let Some(directive) = include_directive(&captures, &captures[0]) else {
			return Ok(None);
		};
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Include(directive),
		)))
	}
}

/// `[!NOTE]` and friends. Only valid at the start of quoted content; the
/// blockquote rule moves the following blocks into the note. Text after the
/// marker on the same line opens the note body.
pub struct NoteRule {
	pattern: Regex,
}

impl NoteRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile(
				"note",
				r"(?i)^\[!(NOTE|TIP|WARNING|IMPORTANT|CAUTION)\](?:[ \t]*(?:\n+|$)|[ \t]+)",
			)?,
		})
	}
}

impl BlockRule for NoteRule {
	fn name(&self) -> &'static str {
		"note"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !context.is(Context::IS_BLOCK_QUOTE) {
			return Ok(None);
		}
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};
		let kind = captures[1].to_ascii_uppercase();
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Note {
				kind,
				children: Vec::new(),
			},
		)))
	}
}

/// `[!div class="..."]` containers inside block quotes.
pub struct SectionRule {
	pattern: Regex,
}

impl SectionRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("section", r"(?i)^\[!div(?:[ \t]+([^\]\n]*))?\][ \t]*(?:\n+|$)")?,
		})
	}
}

impl BlockRule for SectionRule {
	fn name(&self) -> &'static str {
		"section"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !context.is(Context::IS_BLOCK_QUOTE) {
			return Ok(None);
		}
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};
		let attributes = captures
			.get(1)
			.map_or_else(String::new, |m| m.as_str().trim().to_string());
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Section {
				attributes,
				children: Vec::new(),
			},
		)))
	}
}

/// `[!Video https://...]` embeds inside block quotes.
pub struct VideoRule {
	pattern: Regex,
}

impl VideoRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("video", r"(?i)^\[!video[ \t]+([^\]\s]+)\][ \t]*(?:\n+|$)")?,
		})
	}
}

impl BlockRule for VideoRule {
	fn name(&self) -> &'static str {
		"video"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !context.is(Context::IS_BLOCK_QUOTE) {
			return Ok(None);
		}
		let Some(captures) = self.pattern.captures(source.remaining()) else {
			return Ok(None);
		};
		let url = captures[1].to_string();
		let (_, position) = source.consume(captures[0].len());

		Ok(Some(BlockToken::new(
			self.name(),
			position,
			BlockKind::Video { url },
		)))
	}
}

/// `<xref:uid>`.
pub struct XrefAutoRule {
	pattern: Regex,
}

impl XrefAutoRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile("xref_auto", r"^<xref:([^\s<>]+)>")?,
		})
	}
}

impl InlineRule for XrefAutoRule {
	fn name(&self) -> &'static str {
		"xref_auto"
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
		let uid = captures[1].to_string();
		let (raw, position) = source.consume(captures[0].len());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Xref {
				uid,
				raw: raw.to_string(),
			},
		)))
	}
}

/// `@uid` and `@"uid with spaces"`.
pub struct XrefShortRule {
	pattern: Regex,
}

impl XrefShortRule {
	pub fn new() -> DfmResult<Self> {
		Ok(Self {
			pattern: compile(
				"xref_short",
				r#"^@(?:"([^"\n]+)"|'([^'\n]+)'|([A-Za-z](?:[\w.\-*#?`()]*[\w*#`()])?))"#,
			)?,
		})
	}
}

impl InlineRule for XrefShortRule {
	fn name(&self) -> &'static str {
		"xref_short"
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
		let Some(uid) = captures
			.get(1)
			.or_else(|| captures.get(2))
			.or_else(|| captures.get(3))
			.map(|m| m.as_str().to_string())
		else {
			return Ok(None);
		};
		let (raw, position) = source.consume(captures[0].len());

		Ok(Some(InlineToken::new(
			self.name(),
			position,
			InlineKind::Xref {
				uid,
				raw: raw.to_string(),
			},
		)))
	}
}
