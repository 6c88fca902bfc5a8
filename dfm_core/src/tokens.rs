use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::Context;
use crate::DfmResult;
use crate::Point;
use crate::Position;
use crate::parser::Parser;

/// A block-level node of the token tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockToken {
	/// Name of the rule that produced this token.
	pub rule: &'static str,
	/// Where the token came from in its source file.
	pub position: Position,
	#[serde(flatten)]
	pub kind: BlockKind,
}

/// The block token variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum BlockKind {
	/// The root of a parsed document.
	Document { children: Vec<BlockToken> },
	/// One or more blank lines.
	Newline,
	/// Input consumed for its side effect only, e.g. a link definition.
	Ignore,
	Heading {
		depth: u8,
		id: Option<String>,
		content: Vec<InlineToken>,
	},
	Paragraph { content: Vec<InlineToken> },
	/// Loose text inside list items. Rendered bare in tight lists.
	Text { content: Vec<InlineToken> },
	Code { lang: Option<String>, text: String },
	Hr,
	Blockquote { children: Vec<BlockToken> },
	List {
		ordered: bool,
		start: Option<u64>,
		loose: bool,
		items: Vec<BlockToken>,
	},
	ListItem {
		checked: Option<bool>,
		loose: bool,
		children: Vec<BlockToken>,
	},
	Html { raw: String },
	Table {
		align: Vec<Option<Alignment>>,
		header: Vec<Vec<InlineToken>>,
		rows: Vec<Vec<Vec<InlineToken>>>,
	},
	/// `> [!NOTE]` style callout. Children are the quote content following
	/// the marker.
	Note {
		kind: String,
		children: Vec<BlockToken>,
	},
	/// `> [!div class="..."]` container.
	Section {
		attributes: String,
		children: Vec<BlockToken>,
	},
	Video { url: String },
	/// An unexpanded `[!include[...](...)]` block.
	Include(IncludeDirective),
	/// The expanded content of an include.
	Included {
		path: PathBuf,
		children: Vec<BlockToken>,
	},
	/// Source text rendered verbatim (escaped), used when an include fails.
	Raw { text: String },
	/// A two-phase placeholder, resolved by [`Parser::resolve_pending`].
	#[serde(skip_serializing)]
	Pending(Deferred),
}

/// An inline-level node of the token tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineToken {
	pub rule: &'static str,
	pub position: Position,
	#[serde(flatten)]
	pub kind: InlineKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum InlineKind {
	Text { text: String },
	Escape { text: String },
	Link {
		href: String,
		title: Option<String>,
		children: Vec<InlineToken>,
	},
	Image {
		src: String,
		title: Option<String>,
		alt: String,
	},
	Strong { children: Vec<InlineToken> },
	Em { children: Vec<InlineToken> },
	Del { children: Vec<InlineToken> },
	CodeSpan { code: String },
	Br,
	/// Inline HTML, passed through untouched.
	Tag { raw: String },
	AutoLink { href: String, text: String },
	/// A cross reference, `<xref:uid>` or `@uid`.
	Xref { uid: String, raw: String },
	Include(IncludeDirective),
	Included {
		path: PathBuf,
		children: Vec<InlineToken>,
	},
	Raw { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Alignment {
	Left,
	Center,
	Right,
}

impl Alignment {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Left => "left",
			Self::Center => "center",
			Self::Right => "right",
		}
	}
}

/// The parsed form of `[!include[title](path)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeDirective {
	pub title: String,
	pub path: String,
	/// The original directive text, rendered when the include can't be
	/// expanded.
	pub raw: String,
}

/// Continuation stored in a [`Deferred`] token.
pub type Resume = Arc<dyn Fn(&Parser, &Deferred) -> DfmResult<BlockToken> + Send + Sync>;

/// A block whose final form depends on state that is only complete after the
/// first tokenization pass, such as link definitions declared later in the
/// document.
#[derive(Clone)]
pub struct Deferred {
	pub rule: &'static str,
	pub position: Position,
	/// The raw text the continuation works on.
	pub source: String,
	/// Location of `source` in the file.
	pub origin: Point,
	/// The context at the time the rule matched.
	pub context: Context,
	resume: Resume,
}

impl Deferred {
	pub fn new(
		rule: &'static str,
		position: Position,
		source: impl Into<String>,
		origin: Point,
		context: Context,
		resume: impl Fn(&Parser, &Deferred) -> DfmResult<BlockToken> + Send + Sync + 'static,
	) -> Self {
		Self {
			rule,
			position,
			source: source.into(),
			origin,
			context,
			resume: Arc::new(resume),
		}
	}

	/// Run the continuation against the completed parser state.
	pub fn resume(&self, parser: &Parser) -> DfmResult<BlockToken> {
		(self.resume)(parser, self)
	}
}

impl fmt::Debug for Deferred {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Deferred")
			.field("rule", &self.rule)
			.field("position", &self.position)
			.field("source", &self.source)
			.finish_non_exhaustive()
	}
}

impl PartialEq for Deferred {
	fn eq(&self, other: &Self) -> bool {
		self.rule == other.rule
			&& self.position == other.position
			&& self.source == other.source
			&& Arc::ptr_eq(&self.resume, &other.resume)
	}
}

/// Field-less discriminant of [`BlockKind`], used as the renderer table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
	Document,
	Newline,
	Ignore,
	Heading,
	Paragraph,
	Text,
	Code,
	Hr,
	Blockquote,
	List,
	ListItem,
	Html,
	Table,
	Note,
	Section,
	Video,
	Include,
	Included,
	Raw,
	Pending,
}

impl BlockTag {
	pub const ALL: [BlockTag; 20] = [
		Self::Document,
		Self::Newline,
		Self::Ignore,
		Self::Heading,
		Self::Paragraph,
		Self::Text,
		Self::Code,
		Self::Hr,
		Self::Blockquote,
		Self::List,
		Self::ListItem,
		Self::Html,
		Self::Table,
		Self::Note,
		Self::Section,
		Self::Video,
		Self::Include,
		Self::Included,
		Self::Raw,
		Self::Pending,
	];
}

/// Field-less discriminant of [`InlineKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InlineTag {
	Text,
	Escape,
	Link,
	Image,
	Strong,
	Em,
	Del,
	CodeSpan,
	Br,
	Tag,
	AutoLink,
	Xref,
	Include,
	Included,
	Raw,
}

impl InlineTag {
	pub const ALL: [InlineTag; 15] = [
		Self::Text,
		Self::Escape,
		Self::Link,
		Self::Image,
		Self::Strong,
		Self::Em,
		Self::Del,
		Self::CodeSpan,
		Self::Br,
		Self::Tag,
		Self::AutoLink,
		Self::Xref,
		Self::Include,
		Self::Included,
		Self::Raw,
	];
}

impl BlockToken {
	pub fn new(rule: &'static str, position: Position, kind: BlockKind) -> Self {
		Self {
			rule,
			position,
			kind,
		}
	}

	/// Wrap top-level tokens into a document root.
	pub fn document(children: Vec<BlockToken>, position: Position) -> Self {
		Self::new("document", position, BlockKind::Document { children })
	}

	pub fn tag(&self) -> BlockTag {
		self.kind.tag()
	}

	/// Child blocks, empty for leaves.
	pub fn children(&self) -> &[BlockToken] {
		match &self.kind {
			BlockKind::Document { children }
			| BlockKind::Blockquote { children }
			| BlockKind::ListItem { children, .. }
			| BlockKind::Note { children, .. }
			| BlockKind::Section { children, .. }
			| BlockKind::Included { children, .. } => children,
			BlockKind::List { items, .. } => items,
			_ => &[],
		}
	}

	/// Mutable access to the child list of container blocks.
	pub fn children_mut(&mut self) -> Option<&mut Vec<BlockToken>> {
		match &mut self.kind {
			BlockKind::Document { children }
			| BlockKind::Blockquote { children }
			| BlockKind::ListItem { children, .. }
			| BlockKind::Note { children, .. }
			| BlockKind::Section { children, .. }
			| BlockKind::Included { children, .. } => Some(children),
			BlockKind::List { items, .. } => Some(items),
			_ => None,
		}
	}

	/// The inline sequences owned by a leaf block. Tables own one per cell.
	pub fn inlines(&self) -> Vec<&[InlineToken]> {
		match &self.kind {
			BlockKind::Heading { content, .. }
			| BlockKind::Paragraph { content }
			| BlockKind::Text { content } => vec![content.as_slice()],
			BlockKind::Table { header, rows, .. } => {
				header
					.iter()
					.chain(rows.iter().flatten())
					.map(Vec::as_slice)
					.collect()
			}
			_ => Vec::new(),
		}
	}

	pub fn inlines_mut(&mut self) -> Vec<&mut Vec<InlineToken>> {
		match &mut self.kind {
			BlockKind::Heading { content, .. }
			| BlockKind::Paragraph { content }
			| BlockKind::Text { content } => vec![content],
			BlockKind::Table { header, rows, .. } => {
				header.iter_mut().chain(rows.iter_mut().flatten()).collect()
			}
			_ => Vec::new(),
		}
	}

	pub fn is_container(&self) -> bool {
		self.kind.is_container()
	}
}

impl BlockKind {
	pub fn tag(&self) -> BlockTag {
		match self {
			Self::Document { .. } => BlockTag::Document,
			Self::Newline => BlockTag::Newline,
			Self::Ignore => BlockTag::Ignore,
			Self::Heading { .. } => BlockTag::Heading,
			Self::Paragraph { .. } => BlockTag::Paragraph,
			Self::Text { .. } => BlockTag::Text,
			Self::Code { .. } => BlockTag::Code,
			Self::Hr => BlockTag::Hr,
			Self::Blockquote { .. } => BlockTag::Blockquote,
			Self::List { .. } => BlockTag::List,
			Self::ListItem { .. } => BlockTag::ListItem,
			Self::Html { .. } => BlockTag::Html,
			Self::Table { .. } => BlockTag::Table,
			Self::Note { .. } => BlockTag::Note,
			Self::Section { .. } => BlockTag::Section,
			Self::Video { .. } => BlockTag::Video,
			Self::Include(_) => BlockTag::Include,
			Self::Included { .. } => BlockTag::Included,
			Self::Raw { .. } => BlockTag::Raw,
			Self::Pending(_) => BlockTag::Pending,
		}
	}

	fn is_container(&self) -> bool {
		matches!(
			self,
			Self::Document { .. }
				| Self::Blockquote { .. }
				| Self::List { .. }
				| Self::ListItem { .. }
				| Self::Note { .. }
				| Self::Section { .. }
				| Self::Included { .. }
		)
	}
}

impl InlineToken {
	pub fn new(rule: &'static str, position: Position, kind: InlineKind) -> Self {
		Self {
			rule,
			position,
			kind,
		}
	}

	pub fn text(rule: &'static str, position: Position, text: impl Into<String>) -> Self {
		Self::new(rule, position, InlineKind::Text { text: text.into() })
	}

	pub fn tag(&self) -> InlineTag {
		match &self.kind {
			InlineKind::Text { .. } => InlineTag::Text,
			InlineKind::Escape { .. } => InlineTag::Escape,
			InlineKind::Link { .. } => InlineTag::Link,
			InlineKind::Image { .. } => InlineTag::Image,
			InlineKind::Strong { .. } => InlineTag::Strong,
			InlineKind::Em { .. } => InlineTag::Em,
			InlineKind::Del { .. } => InlineTag::Del,
			InlineKind::CodeSpan { .. } => InlineTag::CodeSpan,
			InlineKind::Br => InlineTag::Br,
			InlineKind::Tag { .. } => InlineTag::Tag,
			InlineKind::AutoLink { .. } => InlineTag::AutoLink,
			InlineKind::Xref { .. } => InlineTag::Xref,
			InlineKind::Include(_) => InlineTag::Include,
			InlineKind::Included { .. } => InlineTag::Included,
			InlineKind::Raw { .. } => InlineTag::Raw,
		}
	}

	pub fn children(&self) -> &[InlineToken] {
		match &self.kind {
			InlineKind::Link { children, .. }
			| InlineKind::Strong { children }
			| InlineKind::Em { children }
			| InlineKind::Del { children }
			| InlineKind::Included { children, .. } => children,
			_ => &[],
		}
	}

	pub fn children_mut(&mut self) -> Option<&mut Vec<InlineToken>> {
		match &mut self.kind {
			InlineKind::Link { children, .. }
			| InlineKind::Strong { children }
			| InlineKind::Em { children }
			| InlineKind::Del { children }
			| InlineKind::Included { children, .. } => Some(children),
			_ => None,
		}
	}

	/// Append the visible text of this token to `out`.
	pub fn collect_text(&self, out: &mut String) {
		match &self.kind {
			InlineKind::Text { text }
			| InlineKind::Escape { text }
			| InlineKind::Raw { text }
			| InlineKind::AutoLink { text, .. } => out.push_str(text),
			InlineKind::CodeSpan { code } => out.push_str(code),
			InlineKind::Image { alt, .. } => out.push_str(alt),
			InlineKind::Xref { uid, .. } => out.push_str(uid),
			InlineKind::Include(directive) => out.push_str(&directive.raw),
			InlineKind::Br => out.push(' '),
			InlineKind::Tag { .. } => {}
			InlineKind::Link { .. }
			| InlineKind::Strong { .. }
			| InlineKind::Em { .. }
			| InlineKind::Del { .. }
			| InlineKind::Included { .. } => {
				for child in self.children() {
					child.collect_text(out);
				}
			}
		}
	}
}

/// The visible text of an inline sequence, without markup.
pub fn plain_text(tokens: &[InlineToken]) -> String {
	let mut out = String::new();
	for token in tokens {
		token.collect_text(&mut out);
	}
	out
}
