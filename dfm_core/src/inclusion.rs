use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::BlockKind;
use crate::BlockToken;
use crate::Diagnostic;
use crate::DiagnosticKind;
use crate::Diagnostics;
use crate::DfmResult;
use crate::DocumentVisitor;
use crate::IncludeDirective;
use crate::InlineKind;
use crate::InlineToken;
use crate::LinkRebaseRewriter;
use crate::Position;
use crate::RewriteScope;
use crate::normalize_line_endings;
use crate::rewriters::normalize_path;

/// The content of an include target and the path it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInclude {
	pub content: String,
	pub path: PathBuf,
}

/// Locates the target of an `[!include]` directive.
///
/// `from` is the file containing the directive, if known. Returning `None`
/// means the target does not exist; the directive is then rendered verbatim.
pub trait IncludeResolver: Send + Sync {
	fn resolve(&self, path: &str, from: Option<&Path>) -> Option<ResolvedInclude>;
}

/// Resolves includes on disk, relative to the including file's directory or,
/// for top-level input without a path, to a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileSystemResolver {
	base_dir: Option<PathBuf>,
}

impl FileSystemResolver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
		Self {
			base_dir: Some(base_dir.into()),
		}
	}

	fn candidate(&self, path: &str, from: Option<&Path>) -> PathBuf {
		let target = Path::new(path);
		if target.is_absolute() {
			return target.to_path_buf();
		}

		match (from.and_then(Path::parent), &self.base_dir) {
			(Some(dir), _) => dir.join(target),
			(None, Some(base_dir)) => base_dir.join(target),
			(None, None) => target.to_path_buf(),
		}
	}
}

impl IncludeResolver for FileSystemResolver {
	fn resolve(&self, path: &str, from: Option<&Path>) -> Option<ResolvedInclude> {
		let candidate = self.candidate(path, from);
		let resolved = match std::fs::canonicalize(&candidate) {
			Ok(resolved) => resolved,
			Err(e) => {
				debug!(path = %candidate.display(), error = %e, "include target not found");
				return None;
			}
		};

		match std::fs::read_to_string(&resolved) {
			Ok(content) => {
				Some(ResolvedInclude {
					content: normalize_line_endings(&content),
					path: resolved,
				})
			}
			Err(e) => {
				debug!(path = %resolved.display(), error = %e, "include target unreadable");
				None
			}
		}
	}
}

/// Resolves includes from an in-memory map of normalized paths to content.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
	files: HashMap<PathBuf, String>,
}

impl MemoryResolver {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
		self.insert(path, content);
		self
	}

	pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
		self.files
			.insert(normalize_path(path.as_ref()), content.into());
	}
}

impl IncludeResolver for MemoryResolver {
	fn resolve(&self, path: &str, from: Option<&Path>) -> Option<ResolvedInclude> {
		let relative = from
			.and_then(Path::parent)
			.map(|dir| normalize_path(&dir.join(path)));
		let candidates = relative.into_iter().chain([normalize_path(Path::new(path))]);

		for candidate in candidates {
			if let Some(content) = self.files.get(&candidate) {
				return Some(ResolvedInclude {
					content: content.clone(),
					path: candidate,
				});
			}
		}

		None
	}
}

/// The files currently being expanded, outermost first.
///
/// Each top-level document owns its chain; it is passed down explicitly
/// through the expansion and never shared between documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionChain {
	paths: Vec<PathBuf>,
}

impl InclusionChain {
	pub fn new(root: Option<&Path>) -> Self {
		Self {
			paths: root.map(Path::to_path_buf).into_iter().collect(),
		}
	}

	pub fn paths(&self) -> &[PathBuf] {
		&self.paths
	}

	pub fn contains(&self, path: &Path) -> bool {
		self.paths.iter().any(|open| open == path)
	}

	/// Push `path` for the lifetime of the returned guard. Fails when `path`
	/// is already open.
	pub fn enter(&mut self, path: &Path) -> Result<InclusionGuard<'_>, CircularReference> {
		if self.contains(path) {
			let mut chain = self.paths.clone();
			chain.push(path.to_path_buf());
			return Err(CircularReference { chain });
		}

		self.paths.push(path.to_path_buf());
		Ok(InclusionGuard { chain: self })
	}
}

/// Keeps a path on the [`InclusionChain`] and pops it when dropped, however
/// the nested expansion ends.
#[derive(Debug)]
pub struct InclusionGuard<'a> {
	chain: &'a mut InclusionChain,
}

impl Deref for InclusionGuard<'_> {
	type Target = InclusionChain;

	fn deref(&self) -> &Self::Target {
		self.chain
	}
}

impl DerefMut for InclusionGuard<'_> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.chain
	}
}

impl Drop for InclusionGuard<'_> {
	fn drop(&mut self) {
		self.chain.paths.pop();
	}
}

/// A path that would be entered while already open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularReference {
	/// The open paths followed by the path that closes the cycle.
	pub chain: Vec<PathBuf>,
}

impl fmt::Display for CircularReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("circular reference: ")?;
		for (index, path) in self.chain.iter().enumerate() {
			if index > 0 {
				f.write_str(" --> ")?;
			}
			write!(f, "{}", path.display())?;
		}
		Ok(())
	}
}

impl std::error::Error for CircularReference {}

/// Builds the token tree of an included file, running the full pipeline
/// (including nested expansion) with `chain` as the open include stack.
pub trait IncludeBuilder {
	fn build_included(
		&self,
		content: &str,
		path: &Path,
		chain: &mut InclusionChain,
		diagnostics: &mut Diagnostics,
	) -> DfmResult<BlockToken>;
}

/// Replaces include directives with the content they point to.
///
/// Missing targets and cycles leave the directive text in place as a `Raw`
/// token and record a diagnostic.
pub struct Expander<'a> {
	resolver: &'a dyn IncludeResolver,
	builder: &'a dyn IncludeBuilder,
}

impl<'a> Expander<'a> {
	pub fn new(resolver: &'a dyn IncludeResolver, builder: &'a dyn IncludeBuilder) -> Self {
		Self { resolver, builder }
	}

	/// Expand every include in the tree of `file`.
	pub fn expand(
		&self,
		root: BlockToken,
		file: Option<&Path>,
		chain: &mut InclusionChain,
		diagnostics: &mut Diagnostics,
	) -> DfmResult<BlockToken> {
		let mut state = ExpandState {
			file,
			chain,
			diagnostics,
		};
		self.expand_block(root, &mut state)
	}

	fn expand_block(&self, mut token: BlockToken, state: &mut ExpandState<'_, '_>) -> DfmResult<BlockToken> {
		if let BlockKind::Include(directive) = &token.kind {
			let kind = match self.load(directive, token.position, state)? {
				Some((path, root)) => {
					BlockKind::Included {
						path,
						children: into_children(root),
					}
				}
				None => {
					BlockKind::Raw {
						text: directive.raw.clone(),
					}
				}
			};
			return Ok(BlockToken::new(token.rule, token.position, kind));
		}

		if let Some(children) = token.children_mut() {
			let previous = std::mem::take(children);
			for child in previous {
				children.push(self.expand_block(child, state)?);
			}
		}
		for inlines in token.inlines_mut() {
			let previous = std::mem::take(inlines);
			*inlines = self.expand_inlines(previous, state)?;
		}

		Ok(token)
	}

	fn expand_inlines(
		&self,
		tokens: Vec<InlineToken>,
		state: &mut ExpandState<'_, '_>,
	) -> DfmResult<Vec<InlineToken>> {
		let mut expanded = Vec::with_capacity(tokens.len());

		for mut token in tokens {
			if let InlineKind::Include(directive) = &token.kind {
				let kind = match self.load(directive, token.position, state)? {
					Some((path, root)) => {
						InlineKind::Included {
							path,
							children: inline_content(root),
						}
					}
					None => {
						InlineKind::Raw {
							text: directive.raw.clone(),
						}
					}
				};
				expanded.push(InlineToken::new(token.rule, token.position, kind));
				continue;
			}

			if let Some(children) = token.children_mut() {
				let previous = std::mem::take(children);
				*children = self.expand_inlines(previous, state)?;
			}
			expanded.push(token);
		}

		Ok(expanded)
	}

	/// Resolve, check and build one include target. `None` means the
	/// directive stays unexpanded.
	fn load(
		&self,
		directive: &IncludeDirective,
		position: Position,
		state: &mut ExpandState<'_, '_>,
	) -> DfmResult<Option<(PathBuf, BlockToken)>> {
		let Some(resolved) = self.resolver.resolve(&directive.path, state.file) else {
			state.diagnostics.push(
				Diagnostic::warning(
					DiagnosticKind::IncludeNotFound,
					format!("cannot resolve include `{}`", directive.path),
				)
				.at(state.file, position.start),
			);
			return Ok(None);
		};

		let mut guard = match state.chain.enter(&resolved.path) {
			Ok(guard) => guard,
			Err(cycle) => {
				state.diagnostics.push(
					Diagnostic::warning(DiagnosticKind::CircularReference, cycle.to_string())
						.at(state.file, position.start),
				);
				return Ok(None);
			}
		};

		debug!(
			path = %resolved.path.display(),
			depth = guard.paths().len(),
			"expanding include"
		);
		let root = self.builder.build_included(
			&resolved.content,
			&resolved.path,
			&mut guard,
			state.diagnostics,
		)?;
		drop(guard);

		let root = match (state.file.and_then(Path::parent), resolved.path.parent()) {
			(Some(to_dir), Some(from_dir)) => {
				let mut rebase = LinkRebaseRewriter::new(from_dir, to_dir);
				if rebase.is_identity() {
					root
				} else {
					let mut scope = RewriteScope::new(Some(resolved.path.as_path()), state.diagnostics);
					DocumentVisitor::new(&mut rebase).visit(root, &mut scope)?
				}
			}
			_ => root,
		};

		Ok(Some((resolved.path, root)))
	}
}

struct ExpandState<'f, 'c> {
	file: Option<&'f Path>,
	chain: &'c mut InclusionChain,
	diagnostics: &'c mut Diagnostics,
}

fn into_children(root: BlockToken) -> Vec<BlockToken> {
	match root.kind {
		BlockKind::Document { children } => children,
		_ => vec![root],
	}
}

/// The inline content of an included document. A single paragraph yields its
/// inlines; several blocks are joined with a space.
fn inline_content(root: BlockToken) -> Vec<InlineToken> {
	let mut leaves = Vec::new();
	collect_leaf_inlines(root, &mut leaves);

	let mut joined = Vec::new();
	for (index, inlines) in leaves.into_iter().enumerate() {
		if index > 0 {
			if let Some(first) = inlines.first() {
				joined.push(InlineToken::text("include_inline", first.position, " "));
			}
		}
		joined.extend(inlines);
	}
	joined
}

fn collect_leaf_inlines(token: BlockToken, leaves: &mut Vec<Vec<InlineToken>>) {
	match token.kind {
		BlockKind::Heading { content, .. }
		| BlockKind::Paragraph { content }
		| BlockKind::Text { content } => {
			if !content.is_empty() {
				leaves.push(content);
			}
		}
		BlockKind::Document { children }
		| BlockKind::Blockquote { children }
		| BlockKind::ListItem { children, .. }
		| BlockKind::Note { children, .. }
		| BlockKind::Section { children, .. }
		| BlockKind::Included { children, .. }
		| BlockKind::List {
			items: children, ..
		} => {
			for child in children {
				collect_leaf_inlines(child, leaves);
			}
		}
		_ => {}
	}
}
