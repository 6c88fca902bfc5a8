use std::collections::HashMap;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::BlockKind;
use crate::BlockToken;
use crate::Diagnostic;
use crate::DiagnosticKind;
use crate::InlineKind;
use crate::InlineToken;
use crate::Point;
use crate::RewriteScope;
use crate::Rewriter;
use crate::Severity;
use crate::Validator;
use crate::plain_text;

/// Assigns an `id` to every heading.
///
/// A heading starting with `<a name="x"></a>` (or `id="x"`) takes `x` and the
/// anchor tags are dropped. Other headings get a slug of their text. Repeated
/// ids in one document are suffixed with `-1`, `-2`, ...
#[derive(Debug, Default)]
pub struct HeadingIdRewriter {
	seen: HashMap<String, usize>,
}

impl HeadingIdRewriter {
	pub fn new() -> Self {
		Self::default()
	}

	fn unique(&mut self, base: String) -> String {
		let Some(count) = self.seen.get(&base).copied() else {
			self.seen.insert(base.clone(), 0);
			return base;
		};

		let mut suffix = count;
		let candidate = loop {
			suffix += 1;
			let candidate = format!("{base}-{suffix}");
			if !self.seen.contains_key(&candidate) {
				break candidate;
			}
		};
		self.seen.insert(base, suffix);
		self.seen.insert(candidate.clone(), 0);
		candidate
	}
}

impl Rewriter for HeadingIdRewriter {
	fn pre_process(&mut self, _root: &BlockToken, _scope: &mut RewriteScope<'_>) {
		self.seen.clear();
	}

	fn rewrite_block(
		&mut self,
		mut token: BlockToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<BlockToken> {
		let BlockKind::Heading { id, content, .. } = &mut token.kind else {
			return Some(token);
		};
		if id.is_some() {
			return Some(token);
		}

		let base = match explicit_anchor(content) {
			Some(anchor) => {
				content.drain(..2);
				anchor
			}
			None => slugify(&plain_text(content)),
		};
		*id = Some(self.unique(base));

		Some(token)
	}
}

/// The id of a leading `<a name="x"></a>` pair.
fn explicit_anchor(content: &[InlineToken]) -> Option<String> {
	let [open, close, ..] = content else {
		return None;
	};
	let (InlineKind::Tag { raw: open }, InlineKind::Tag { raw: close }) = (&open.kind, &close.kind)
	else {
		return None;
	};
	if !close.trim().eq_ignore_ascii_case("</a>") {
		return None;
	}

	anchor_id(open)
}

fn anchor_id(raw: &str) -> Option<String> {
	if !raw.get(..2)?.eq_ignore_ascii_case("<a") {
		return None;
	}
	let attributes = raw[2..].strip_suffix('>')?;
	if !attributes.starts_with(char::is_whitespace) {
		return None;
	}

	let (key, value) = attributes.trim().trim_end_matches('/').split_once('=')?;
	let key = key.trim();
	if !(key.eq_ignore_ascii_case("name") || key.eq_ignore_ascii_case("id")) {
		return None;
	}

	let value = value.trim().trim_matches(['"', '\'']);
	if value.is_empty() || value.contains(char::is_whitespace) {
		return None;
	}

	Some(value.to_string())
}

/// Lowercase the text, keep alphanumerics, `-` and `_`, and turn whitespace
/// into `-`.
pub fn slugify(text: &str) -> String {
	let mut slug = String::with_capacity(text.len());
	for ch in text.trim().chars() {
		if ch.is_alphanumeric() || ch == '_' || ch == '-' {
			slug.extend(ch.to_lowercase());
		} else if ch.is_whitespace() {
			slug.push('-');
		}
	}

	if slug.is_empty() {
		"heading".to_string()
	} else {
		slug
	}
}

/// Rewrites relative link and image targets of included content so they
/// resolve from the including file's directory.
#[derive(Debug, Clone)]
pub struct LinkRebaseRewriter {
	from_dir: PathBuf,
	to_dir: PathBuf,
}

impl LinkRebaseRewriter {
	/// `from_dir` is the directory of the included file, `to_dir` the
	/// directory of the file that includes it.
	pub fn new(from_dir: impl AsRef<Path>, to_dir: impl AsRef<Path>) -> Self {
		Self {
			from_dir: normalize_path(from_dir.as_ref()),
			to_dir: normalize_path(to_dir.as_ref()),
		}
	}

	/// Whether rebasing changes anything.
	pub fn is_identity(&self) -> bool {
		self.from_dir == self.to_dir
	}

	pub fn rebase(&self, target: &str) -> Option<String> {
		if !is_relative_target(target) {
			return None;
		}

		let split = target.find(['?', '#']).unwrap_or(target.len());
		let (path, suffix) = target.split_at(split);
		let absolute = normalize_path(&self.from_dir.join(path));
		let relative = pathdiff::diff_paths(&absolute, &self.to_dir)?;
		let relative = relative
			.components()
			.map(|component| component.as_os_str().to_string_lossy())
			.collect::<Vec<_>>()
			.join("/");

		Some(format!("{relative}{suffix}"))
	}
}

impl Rewriter for LinkRebaseRewriter {
	fn rewrite_inline(
		&mut self,
		mut token: InlineToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<InlineToken> {
		match &mut token.kind {
			InlineKind::Link { href: target, .. } | InlineKind::Image { src: target, .. } => {
				if let Some(rebased) = self.rebase(target) {
					*target = rebased;
				}
			}
			_ => {}
		}

		Some(token)
	}
}

fn is_relative_target(target: &str) -> bool {
	if target.is_empty() || target.starts_with(['#', '/', '\\', '?', '~']) {
		return false;
	}
	let scheme_end = target.find(':');
	let path_end = target.find(['/', '?', '#']).unwrap_or(target.len());
	!scheme_end.is_some_and(|colon| colon < path_end)
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				if !normalized.pop() {
					normalized.push("..");
				}
			}
			other => normalized.push(other.as_os_str()),
		}
	}
	normalized
}

/// What happens when a [`HtmlTagRule`] matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagBehavior {
	#[default]
	Warning,
	Error,
}

/// A rule restricting the HTML tags a document may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlTagRule {
	/// Tag names, matched case-insensitively.
	pub tags: Vec<String>,
	#[serde(default)]
	pub behavior: TagBehavior,
	/// Custom message. `{tag}` is replaced by the tag name.
	#[serde(default)]
	pub message: Option<String>,
	/// Only report opening tags.
	#[serde(default)]
	pub open_only: bool,
}

impl HtmlTagRule {
	pub fn new(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			tags: tags.into_iter().map(Into::into).collect(),
			behavior: TagBehavior::default(),
			message: None,
			open_only: false,
		}
	}

	fn matches(&self, tag: &HtmlTag<'_>) -> bool {
		(!self.open_only || !tag.closing)
			&& self
				.tags
				.iter()
				.any(|name| name.eq_ignore_ascii_case(tag.name))
	}

	fn message(&self, tag: &HtmlTag<'_>) -> String {
		match &self.message {
			Some(message) => message.replace("{tag}", tag.name),
			None => format!("HTML tag <{}> is not allowed", tag.name),
		}
	}
}

/// Reports HTML tags disallowed by a list of [`HtmlTagRule`]s.
#[derive(Debug, Clone, Default)]
pub struct TagValidator {
	rules: Vec<HtmlTagRule>,
}

impl TagValidator {
	pub fn new(rules: Vec<HtmlTagRule>) -> Self {
		Self { rules }
	}

	fn check(&self, html: &str, start: Point, scope: &mut RewriteScope<'_>) {
		for (offset, tag) in html_tags(html) {
			for rule in self.rules.iter().filter(|rule| rule.matches(&tag)) {
				let severity = match rule.behavior {
					TagBehavior::Warning => Severity::Warning,
					TagBehavior::Error => Severity::Error,
				};
				let point = start.advanced(&html[..offset]);
				scope.diagnostics.push(
					Diagnostic::warning(DiagnosticKind::DisallowedTag, rule.message(&tag))
						.with_severity(severity)
						.at(scope.file, point),
				);
			}
		}
	}
}

impl Validator for TagValidator {
	fn validate_block(&mut self, token: &BlockToken, scope: &mut RewriteScope<'_>) {
		if let BlockKind::Html { raw } = &token.kind {
			self.check(raw, token.position.start, scope);
		}
	}

	fn validate_inline(&mut self, token: &InlineToken, scope: &mut RewriteScope<'_>) {
		if let InlineKind::Tag { raw } = &token.kind {
			self.check(raw, token.position.start, scope);
		}
	}
}

struct HtmlTag<'a> {
	name: &'a str,
	closing: bool,
}

/// The tags opened or closed in an HTML fragment, with their byte offsets.
/// Comments are skipped.
fn html_tags(html: &str) -> Vec<(usize, HtmlTag<'_>)> {
	let mut tags = Vec::new();
	let mut index = 0;

	while let Some(found) = html[index..].find('<') {
		let start = index + found;
		let rest = &html[start + 1..];
		if rest.starts_with("!--") {
			index = rest
				.find("-->")
				.map_or(html.len(), |end| start + 1 + end + 3);
			continue;
		}

		let closing = rest.starts_with('/');
		let name_start = usize::from(closing);
		let name_len = rest[name_start..]
			.find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-'))
			.unwrap_or(rest.len() - name_start);
		let name = &rest[name_start..name_start + name_len];
		if name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
			tags.push((start, HtmlTag { name, closing }));
		}
		index = start + 1;
	}

	tags
}
