use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

use crate::BlockKind;
use crate::BlockTag;
use crate::BlockToken;
use crate::InlineKind;
use crate::InlineTag;
use crate::InlineToken;

pub type BlockRenderFn =
	Arc<dyn Fn(&HtmlRenderer, &BlockToken, &mut String) -> fmt::Result + Send + Sync>;
pub type InlineRenderFn =
	Arc<dyn Fn(&HtmlRenderer, &InlineToken, &mut String) -> fmt::Result + Send + Sync>;

/// Renders token trees to HTML through two dispatch tables, one per token
/// level, keyed by the token's tag. Entries can be replaced with
/// [`HtmlRenderer::register_block`] and [`HtmlRenderer::register_inline`].
///
/// A token whose tag has no entry renders nothing. Entries write into a
/// `String`, so the only error they report is one raised by the entry itself.
#[derive(Clone)]
pub struct HtmlRenderer {
	blocks: HashMap<BlockTag, BlockRenderFn>,
	inlines: HashMap<InlineTag, InlineRenderFn>,
}

impl Default for HtmlRenderer {
	fn default() -> Self {
		let mut renderer = Self::empty();

		renderer
			.register_block(BlockTag::Document, render_children)
			.register_block(BlockTag::Newline, render_nothing)
			.register_block(BlockTag::Ignore, render_nothing)
			.register_block(BlockTag::Pending, render_nothing)
			.register_block(BlockTag::Heading, render_heading)
			.register_block(BlockTag::Paragraph, render_paragraph)
			.register_block(BlockTag::Text, render_text)
			.register_block(BlockTag::Code, render_code)
			.register_block(BlockTag::Hr, |_, _, out| out.write_str("<hr>\n"))
			.register_block(BlockTag::Blockquote, render_blockquote)
			.register_block(BlockTag::List, render_list)
			.register_block(BlockTag::ListItem, render_list_item)
			.register_block(BlockTag::Html, render_html)
			.register_block(BlockTag::Table, render_table)
			.register_block(BlockTag::Note, render_note)
			.register_block(BlockTag::Section, render_section)
			.register_block(BlockTag::Video, render_video)
			.register_block(BlockTag::Include, render_raw_block)
			.register_block(BlockTag::Included, render_children)
			.register_block(BlockTag::Raw, render_raw_block);

		renderer
			.register_inline(InlineTag::Text, render_inline_text)
			.register_inline(InlineTag::Escape, render_inline_text)
			.register_inline(InlineTag::Raw, render_inline_text)
			.register_inline(InlineTag::Include, render_inline_text)
			.register_inline(InlineTag::Link, render_link)
			.register_inline(InlineTag::Image, render_image)
			.register_inline(InlineTag::Strong, |renderer, token, out| {
				wrap_inline(renderer, "strong", token, out)
			})
			.register_inline(InlineTag::Em, |renderer, token, out| {
				wrap_inline(renderer, "em", token, out)
			})
			.register_inline(InlineTag::Del, |renderer, token, out| {
				wrap_inline(renderer, "del", token, out)
			})
			.register_inline(InlineTag::Included, |renderer, token, out| {
				renderer.render_inlines_into(token.children(), out)
			})
			.register_inline(InlineTag::CodeSpan, render_code_span)
			.register_inline(InlineTag::Br, |_, _, out| out.write_str("<br>\n"))
			.register_inline(InlineTag::Tag, render_tag)
			.register_inline(InlineTag::AutoLink, render_autolink)
			.register_inline(InlineTag::Xref, render_xref);

		renderer
	}
}

impl fmt::Debug for HtmlRenderer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HtmlRenderer")
			.field("blocks", &self.blocks.len())
			.field("inlines", &self.inlines.len())
			.finish()
	}
}

impl HtmlRenderer {
	/// A renderer without any entries.
	pub fn empty() -> Self {
		Self {
			blocks: HashMap::new(),
			inlines: HashMap::new(),
		}
	}

	pub fn register_block(
		&mut self,
		tag: BlockTag,
		render: impl Fn(&HtmlRenderer, &BlockToken, &mut String) -> fmt::Result + Send + Sync + 'static,
	) -> &mut Self {
		self.blocks.insert(tag, Arc::new(render));
		self
	}

	pub fn register_inline(
		&mut self,
		tag: InlineTag,
		render: impl Fn(&HtmlRenderer, &InlineToken, &mut String) -> fmt::Result + Send + Sync + 'static,
	) -> &mut Self {
		self.inlines.insert(tag, Arc::new(render));
		self
	}

	pub fn render(&self, token: &BlockToken) -> Result<String, fmt::Error> {
		let mut out = String::new();
		self.render_into(token, &mut out)?;
		Ok(out)
	}

	pub fn render_blocks(&self, tokens: &[BlockToken]) -> Result<String, fmt::Error> {
		let mut out = String::new();
		for token in tokens {
			self.render_into(token, &mut out)?;
		}
		Ok(out)
	}

	/// Render one block through its table entry.
	pub fn render_into(&self, token: &BlockToken, out: &mut String) -> fmt::Result {
		match self.blocks.get(&token.tag()) {
			Some(render) => render(self, token, out),
			None => Ok(()),
		}
	}

	pub fn render_inlines(&self, tokens: &[InlineToken]) -> Result<String, fmt::Error> {
		let mut out = String::new();
		self.render_inlines_into(tokens, &mut out)?;
		Ok(out)
	}

	pub fn render_inlines_into(&self, tokens: &[InlineToken], out: &mut String) -> fmt::Result {
		for token in tokens {
			if let Some(render) = self.inlines.get(&token.tag()) {
				render(self, token, out)?;
			}
		}
		Ok(())
	}
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for ch in text.chars() {
		match ch {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			_ => escaped.push(ch),
		}
	}
	escaped
}

/// Write the attributes of a `[!div ...]` section. Only well-formed
/// `name`, `name=value` and quoted `name="value"` pairs are kept and every
/// value is escaped.
fn write_attributes(raw: &str, out: &mut String) -> fmt::Result {
	let is_name_char = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.');
	let mut rest = raw;

	while let Some(start) = rest.find(|ch: char| ch.is_ascii_alphabetic() || ch == '_') {
		rest = &rest[start..];
		let name_len = rest.find(|ch: char| !is_name_char(ch)).unwrap_or(rest.len());
		let name = &rest[..name_len];
		rest = &rest[name_len..];

		let Some(after_equals) = rest.strip_prefix('=') else {
			write!(out, " {name}")?;
			continue;
		};

		let (value, consumed) = match after_equals.chars().next() {
			Some(quote @ ('"' | '\'')) => {
				let inner = &after_equals[1..];
				match inner.find(quote) {
					Some(end) => (&inner[..end], end + 2),
					None => (inner, inner.len() + 1),
				}
			}
			_ => {
				let end = after_equals
					.find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | '<' | '>'))
					.unwrap_or(after_equals.len());
				(&after_equals[..end], end)
			}
		};
		write!(out, " {name}=\"{}\"", escape_html(value))?;
		rest = &after_equals[consumed..];
	}

	Ok(())
}

fn render_nothing(_: &HtmlRenderer, _: &BlockToken, _: &mut String) -> fmt::Result {
	Ok(())
}

fn render_children(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	for child in token.children() {
		renderer.render_into(child, out)?;
	}
	Ok(())
}

fn render_heading(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Heading { depth, id, content } = &token.kind else {
		return Ok(());
	};

	match id {
		Some(id) => write!(out, "<h{depth} id=\"{}\">", escape_html(id))?,
		None => write!(out, "<h{depth}>")?,
	}
	renderer.render_inlines_into(content, out)?;
	writeln!(out, "</h{depth}>")
}

fn render_paragraph(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Paragraph { content } = &token.kind else {
		return Ok(());
	};

	out.push_str("<p>");
	renderer.render_inlines_into(content, out)?;
	out.write_str("</p>\n")
}

fn render_text(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Text { content } = &token.kind else {
		return Ok(());
	};

	renderer.render_inlines_into(content, out)
}

fn render_code(_: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Code { lang, text } = &token.kind else {
		return Ok(());
	};

	match lang {
		Some(lang) => write!(out, "<pre><code class=\"lang-{}\">", escape_html(lang))?,
		None => out.push_str("<pre><code>"),
	}
	out.push_str(&escape_html(text));
	out.write_str("\n</code></pre>\n")
}

fn render_blockquote(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let first = token
		.children()
		.iter()
		.find(|child| !matches!(child.kind, BlockKind::Newline));
	let is_callout = first.is_some_and(|child| {
		matches!(
			child.kind,
			BlockKind::Note { .. } | BlockKind::Section { .. } | BlockKind::Video { .. }
		)
	});

	if is_callout {
		return render_children(renderer, token, out);
	}

	out.push_str("<blockquote>\n");
	render_children(renderer, token, out)?;
	out.write_str("</blockquote>\n")
}

fn render_list(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::List { ordered, start, .. } = &token.kind else {
		return Ok(());
	};

	let tag = if *ordered { "ol" } else { "ul" };
	match start {
		Some(start) if *ordered && *start != 1 => writeln!(out, "<ol start=\"{start}\">")?,
		_ => writeln!(out, "<{tag}>")?,
	}
	render_children(renderer, token, out)?;
	writeln!(out, "</{tag}>")
}

fn render_list_item(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::ListItem {
		checked,
		loose,
		children,
	} = &token.kind
	else {
		return Ok(());
	};

	out.push_str("<li>");
	match checked {
		Some(true) => out.push_str("<input type=\"checkbox\" disabled=\"\" checked=\"\"> "),
		Some(false) => out.push_str("<input type=\"checkbox\" disabled=\"\"> "),
		None => {}
	}

	for child in children {
		match &child.kind {
			BlockKind::Text { content } if *loose => {
				out.push_str("<p>");
				renderer.render_inlines_into(content, out)?;
				out.push_str("</p>\n");
			}
			BlockKind::Text { .. } => {
				renderer.render_into(child, out)?;
				if children.len() > 1 {
					out.push('\n');
				}
			}
			_ => renderer.render_into(child, out)?,
		}
	}
	out.write_str("</li>\n")
}

fn render_html(_: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Html { raw } = &token.kind else {
		return Ok(());
	};

	out.push_str(raw);
	if !raw.ends_with('\n') {
		out.push('\n');
	}
	Ok(())
}

fn render_table(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Table {
		align,
		header,
		rows,
	} = &token.kind
	else {
		return Ok(());
	};

	let cell = |out: &mut String, tag: &str, index: usize, content: &[InlineToken]| {
		match align.get(index).copied().flatten() {
			Some(alignment) => write!(out, "<{tag} style=\"text-align:{}\">", alignment.as_str())?,
			None => write!(out, "<{tag}>")?,
		}
		renderer.render_inlines_into(content, out)?;
		writeln!(out, "</{tag}>")
	};

	out.push_str("<table>\n<thead>\n<tr>\n");
	for (index, content) in header.iter().enumerate() {
		cell(out, "th", index, content)?;
	}
	out.push_str("</tr>\n</thead>\n");

	if !rows.is_empty() {
		out.push_str("<tbody>\n");
		for row in rows {
			out.push_str("<tr>\n");
			for (index, content) in row.iter().enumerate() {
				cell(out, "td", index, content)?;
			}
			out.push_str("</tr>\n");
		}
		out.push_str("</tbody>\n");
	}
	out.write_str("</table>\n")
}

fn render_note(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Note { kind, .. } = &token.kind else {
		return Ok(());
	};

	let kind = escape_html(kind);
	writeln!(out, "<div class=\"{kind}\">\n<h5>{kind}</h5>")?;
	render_children(renderer, token, out)?;
	out.write_str("</div>\n")
}

fn render_section(renderer: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Section { attributes, .. } = &token.kind else {
		return Ok(());
	};

	out.push_str("<div");
	write_attributes(attributes, out)?;
	out.push_str(">\n");
	render_children(renderer, token, out)?;
	out.write_str("</div>\n")
}

fn render_video(_: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let BlockKind::Video { url } = &token.kind else {
		return Ok(());
	};

	writeln!(
		out,
		"<div class=\"embeddedvideo\"><iframe src=\"{}\" frameborder=\"0\" allowfullscreen=\"true\"></iframe></div>",
		escape_html(url)
	)
}

fn render_raw_block(_: &HtmlRenderer, token: &BlockToken, out: &mut String) -> fmt::Result {
	let text = match &token.kind {
		BlockKind::Raw { text } => text,
		BlockKind::Include(directive) => &directive.raw,
		_ => return Ok(()),
	};

	out.push_str(&escape_html(text));
	out.write_char('\n')
}

fn render_inline_text(_: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	let text = match &token.kind {
		InlineKind::Text { text } | InlineKind::Escape { text } | InlineKind::Raw { text } => text,
		InlineKind::Include(directive) => &directive.raw,
		_ => return Ok(()),
	};

	out.write_str(&escape_html(text))
}

fn wrap_inline(
	renderer: &HtmlRenderer,
	tag: &str,
	token: &InlineToken,
	out: &mut String,
) -> fmt::Result {
	write!(out, "<{tag}>")?;
	renderer.render_inlines_into(token.children(), out)?;
	write!(out, "</{tag}>")
}

fn render_link(renderer: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	let InlineKind::Link {
		href,
		title,
		children,
	} = &token.kind
	else {
		return Ok(());
	};

	write!(out, "<a href=\"{}\"", escape_html(href))?;
	if let Some(title) = title {
		write!(out, " title=\"{}\"", escape_html(title))?;
	}
	out.push('>');
	renderer.render_inlines_into(children, out)?;
	out.write_str("</a>")
}

fn render_image(_: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	let InlineKind::Image { src, title, alt } = &token.kind else {
		return Ok(());
	};

	write!(
		out,
		"<img src=\"{}\" alt=\"{}\"",
		escape_html(src),
		escape_html(alt)
	)?;
	if let Some(title) = title {
		write!(out, " title=\"{}\"", escape_html(title))?;
	}
	out.write_char('>')
}

fn render_code_span(_: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	let InlineKind::CodeSpan { code } = &token.kind else {
		return Ok(());
	};

	write!(out, "<code>{}</code>", escape_html(code))
}

fn render_tag(_: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	if let InlineKind::Tag { raw } = &token.kind {
		out.push_str(raw);
	}
	Ok(())
}

fn render_autolink(_: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	let InlineKind::AutoLink { href, text } = &token.kind else {
		return Ok(());
	};

	write!(
		out,
		"<a href=\"{}\">{}</a>",
		escape_html(href),
		escape_html(text)
	)
}

fn render_xref(_: &HtmlRenderer, token: &InlineToken, out: &mut String) -> fmt::Result {
	let InlineKind::Xref { uid, raw } = &token.kind else {
		return Ok(());
	};

	// `<xref:uid>` must resolve, `@uid` may be plain text.
	let strict = if raw.starts_with('<') { "True" } else { "False" };
	write!(
		out,
		"<xref href=\"{}\" data-throw-if-not-resolved=\"{strict}\" data-raw-source=\"{}\"></xref>",
		escape_html(uid),
		escape_html(raw)
	)
}
