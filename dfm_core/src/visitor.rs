use std::path::Path;

use crate::BlockToken;
use crate::DfmError;
use crate::DfmResult;
use crate::Diagnostics;
use crate::InlineToken;

/// What a rewriter can see besides the tokens: the file being processed and
/// the diagnostics sink for that file.
pub struct RewriteScope<'a> {
	pub file: Option<&'a Path>,
	pub diagnostics: &'a mut Diagnostics,
}

impl<'a> RewriteScope<'a> {
	pub fn new(file: Option<&'a Path>, diagnostics: &'a mut Diagnostics) -> Self {
		Self { file, diagnostics }
	}
}

/// A pass over a document tree.
///
/// Every method defaults to passing the token through. Returning `None` from
/// a rewrite method removes the token; returning a different token replaces
/// it.
pub trait Rewriter {
	fn pre_process(&mut self, _root: &BlockToken, _scope: &mut RewriteScope<'_>) {}

	fn rewrite_block(
		&mut self,
		token: BlockToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<BlockToken> {
		Some(token)
	}

	fn rewrite_inline(
		&mut self,
		token: InlineToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<InlineToken> {
		Some(token)
	}

	fn post_process(&mut self, _root: &BlockToken, _scope: &mut RewriteScope<'_>) {}
}

/// Drives one [`Rewriter`] over a document.
///
/// The root is rewritten first. Below it the walk is post-order: a container's
/// children are rewritten before the container itself, and a leaf block's
/// inline tokens before the leaf.
pub struct DocumentVisitor<'r> {
	rewriter: &'r mut dyn Rewriter,
}

impl<'r> DocumentVisitor<'r> {
	pub fn new(rewriter: &'r mut dyn Rewriter) -> Self {
		Self { rewriter }
	}

	pub fn visit(
		&mut self,
		root: BlockToken,
		scope: &mut RewriteScope<'_>,
	) -> DfmResult<BlockToken> {
		self.rewriter.pre_process(&root, scope);
		let root = self
			.rewriter
			.rewrite_block(root, scope)
			.ok_or(DfmError::RootRemoved)?;
		let root = self.visit_contents(root, scope);
		self.rewriter.post_process(&root, scope);

		Ok(root)
	}

	fn visit_contents(&mut self, mut token: BlockToken, scope: &mut RewriteScope<'_>) -> BlockToken {
		if let Some(children) = token.children_mut() {
			let previous = std::mem::take(children);
			for child in previous {
				if let Some(child) = self.visit_block(child, scope) {
					children.push(child);
				}
			}
		}

		for inlines in token.inlines_mut() {
			let previous = std::mem::take(inlines);
			*inlines = self.visit_inlines(previous, scope);
		}

		token
	}

	fn visit_block(&mut self, token: BlockToken, scope: &mut RewriteScope<'_>) -> Option<BlockToken> {
		let token = self.visit_contents(token, scope);
		self.rewriter.rewrite_block(token, scope)
	}

	fn visit_inlines(
		&mut self,
		tokens: Vec<InlineToken>,
		scope: &mut RewriteScope<'_>,
	) -> Vec<InlineToken> {
		let mut visited = Vec::with_capacity(tokens.len());

		for mut token in tokens {
			if let Some(children) = token.children_mut() {
				let previous = std::mem::take(children);
				*children = self.visit_inlines(previous, scope);
			}
			if let Some(token) = self.rewriter.rewrite_inline(token, scope) {
				visited.push(token);
			}
		}

		visited
	}
}

/// Runs several rewriters, each as a full pass over the document.
#[derive(Default)]
pub struct RewriterChain {
	rewriters: Vec<Box<dyn Rewriter>>,
}

impl RewriterChain {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, rewriter: impl Rewriter + 'static) -> Self {
		self.rewriters.push(Box::new(rewriter));
		self
	}

	pub fn push(&mut self, rewriter: Box<dyn Rewriter>) {
		self.rewriters.push(rewriter);
	}

	pub fn is_empty(&self) -> bool {
		self.rewriters.is_empty()
	}

	pub fn run(&mut self, root: BlockToken, scope: &mut RewriteScope<'_>) -> DfmResult<BlockToken> {
		let mut root = root;
		for rewriter in &mut self.rewriters {
			root = DocumentVisitor::new(rewriter.as_mut()).visit(root, scope)?;
		}
		Ok(root)
	}
}

/// A read-only check over a document.
pub trait Validator {
	fn validate_block(&mut self, _token: &BlockToken, _scope: &mut RewriteScope<'_>) {}

	fn validate_inline(&mut self, _token: &InlineToken, _scope: &mut RewriteScope<'_>) {}
}

/// Runs many validators within a single traversal.
#[derive(Default)]
pub struct ValidatorGroup {
	validators: Vec<Box<dyn Validator>>,
}

impl ValidatorGroup {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, validator: impl Validator + 'static) -> Self {
		self.validators.push(Box::new(validator));
		self
	}

	pub fn push(&mut self, validator: Box<dyn Validator>) {
		self.validators.push(validator);
	}

	pub fn is_empty(&self) -> bool {
		self.validators.is_empty()
	}
}

impl Rewriter for ValidatorGroup {
	fn rewrite_block(
		&mut self,
		token: BlockToken,
		scope: &mut RewriteScope<'_>,
	) -> Option<BlockToken> {
		for validator in &mut self.validators {
			validator.validate_block(&token, scope);
		}
		Some(token)
	}

	fn rewrite_inline(
		&mut self,
		token: InlineToken,
		scope: &mut RewriteScope<'_>,
	) -> Option<InlineToken> {
		for validator in &mut self.validators {
			validator.validate_inline(&token, scope);
		}
		Some(token)
	}
}
