use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::instrument;

use crate::BlockTag;
use crate::BlockToken;
use crate::Context;
use crate::DfmResult;
use crate::Diagnostics;
use crate::DocumentVisitor;
use crate::Expander;
use crate::FileSystemResolver;
use crate::Flavor;
use crate::HeadingIdRewriter;
use crate::HtmlRenderer;
use crate::HtmlTagRule;
use crate::IncludeBuilder;
use crate::IncludeResolver;
use crate::InclusionChain;
use crate::InlineTag;
use crate::InlineToken;
use crate::RewriteScope;
use crate::Rewriter;
use crate::RewriterChain;
use crate::SourceDocument;
use crate::TagValidator;
use crate::Validator;
use crate::ValidatorGroup;
use crate::parser::Parser;
use crate::rewriters::normalize_path;
use crate::rules::RuleSet;

/// Creates a fresh rewriter for every document, so rewriter state never
/// leaks between documents or threads.
pub type RewriterFactory = Arc<dyn Fn() -> Box<dyn Rewriter> + Send + Sync>;

/// Creates a fresh validator for every document.
pub type ValidatorFactory = Arc<dyn Fn() -> Box<dyn Validator> + Send + Sync>;

/// A parsed, rewritten and include-expanded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
	pub path: Option<PathBuf>,
	pub root: BlockToken,
	pub diagnostics: Diagnostics,
}

/// The HTML of a document together with what went wrong while building it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
	pub path: Option<PathBuf>,
	pub html: String,
	pub diagnostics: Diagnostics,
}

/// The markdown pipeline: tokenize, rewrite, validate, expand includes and
/// render.
///
/// An engine is immutable once built and can be shared between threads. All
/// per-document state (link definitions, heading ids, the include chain and
/// diagnostics) is created for each call.
#[derive(Clone)]
pub struct Engine {
	rules: RuleSet,
	heading_ids: bool,
	rewriters: Vec<RewriterFactory>,
	validators: Vec<ValidatorFactory>,
	renderer: Arc<HtmlRenderer>,
	resolver: Arc<dyn IncludeResolver>,
}

impl Engine {
	/// An engine for the default flavor, resolving includes on disk.
	pub fn new() -> DfmResult<Self> {
		Self::builder().build()
	}

	pub fn builder() -> EngineBuilder {
		EngineBuilder::default()
	}

	pub fn rules(&self) -> &RuleSet {
		&self.rules
	}

	pub fn renderer(&self) -> &HtmlRenderer {
		&self.renderer
	}

	/// The top-level context documents are tokenized with.
	pub fn context(&self) -> Context {
		Context::new(self.rules.clone())
	}

	/// Tokenize `text` without running rewriters or expanding includes.
	pub fn tokenize(&self, text: &str) -> DfmResult<BlockToken> {
		Parser::new().parse(&self.context(), text)
	}

	/// Build the token tree of a document.
	#[instrument(skip_all, fields(path = ?source.path()))]
	pub fn parse(&self, source: &SourceDocument) -> DfmResult<Document> {
		let file = source.path();
		let root_path = file.map(|path| std::fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path)));
		let mut chain = InclusionChain::new(root_path.as_deref());
		let mut diagnostics = Diagnostics::new();

		let root = self.process(
			&source.content,
			file,
			&self.context(),
			&mut chain,
			&mut diagnostics,
		)?;
		debug!(diagnostics = diagnostics.len(), "parsed document");

		Ok(Document {
			path: source.path.clone(),
			root,
			diagnostics,
		})
	}

	/// Build the token tree of a string without a file path.
	pub fn parse_str(&self, text: &str) -> DfmResult<Document> {
		self.parse(&SourceDocument::new(text))
	}

	pub fn render(&self, document: &Document) -> DfmResult<String> {
		Ok(self.renderer.render(&document.root)?)
	}

	/// Parse and render a document.
	pub fn markup(&self, source: &SourceDocument) -> DfmResult<RenderedDocument> {
		let document = self.parse(source)?;
		let html = self.render(&document)?;

		Ok(RenderedDocument {
			path: document.path,
			html,
			diagnostics: document.diagnostics,
		})
	}

	pub fn markup_str(&self, text: &str) -> DfmResult<RenderedDocument> {
		self.markup(&SourceDocument::new(text))
	}

	fn rewriter_chain(&self) -> RewriterChain {
		let mut chain = RewriterChain::new();
		if self.heading_ids {
			chain.push(Box::new(HeadingIdRewriter::new()));
		}
		for factory in &self.rewriters {
			chain.push(factory());
		}
		chain
	}

	fn validator_group(&self) -> ValidatorGroup {
		let mut group = ValidatorGroup::new();
		for factory in &self.validators {
			group.push(factory());
		}
		group
	}

	fn process(
		&self,
		text: &str,
		file: Option<&Path>,
		context: &Context,
		chain: &mut InclusionChain,
		diagnostics: &mut Diagnostics,
	) -> DfmResult<BlockToken> {
		let parser = Parser::with_file(file);
		let root = parser.parse(context, text)?;

		let root = {
			let mut scope = RewriteScope::new(file, diagnostics);
			let root = self.rewriter_chain().run(root, &mut scope)?;
			let mut validators = self.validator_group();
			if validators.is_empty() {
				root
			} else {
				DocumentVisitor::new(&mut validators).visit(root, &mut scope)?
			}
		};

		Expander::new(self.resolver.as_ref(), self).expand(root, file, chain, diagnostics)
	}
}

impl IncludeBuilder for Engine {
	fn build_included(
		&self,
		content: &str,
		path: &Path,
		chain: &mut InclusionChain,
		diagnostics: &mut Diagnostics,
	) -> DfmResult<BlockToken> {
		let context = self.context().switch_variable(Context::IS_INCLUDE, true);
		self.process(content, Some(path), &context, chain, diagnostics)
	}
}

impl fmt::Debug for Engine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Engine")
			.field("rules", &self.rules)
			.field("heading_ids", &self.heading_ids)
			.field("rewriters", &self.rewriters.len())
			.field("validators", &self.validators.len())
			.finish_non_exhaustive()
	}
}

/// Configures an [`Engine`].
///
/// ```rust
/// use dfm_core::Engine;
/// use dfm_core::Flavor;
/// use dfm_core::MemoryResolver;
///
/// let engine = Engine::builder()
/// 	.flavor(Flavor::Dfm)
/// 	.resolver(MemoryResolver::new().with_file("part.md", "Shared text"))
/// 	.build()
/// 	.unwrap();
/// let rendered = engine.markup_str("[!include[Part](part.md)]").unwrap();
/// assert_eq!(rendered.html, "<p>Shared text</p>\n");
/// ```
pub struct EngineBuilder {
	flavor: Flavor,
	rules: Option<RuleSet>,
	heading_ids: bool,
	tag_rules: Vec<HtmlTagRule>,
	rewriters: Vec<RewriterFactory>,
	validators: Vec<ValidatorFactory>,
	renderer: HtmlRenderer,
	resolver: Arc<dyn IncludeResolver>,
}

impl Default for EngineBuilder {
	fn default() -> Self {
		Self {
			flavor: Flavor::default(),
			rules: None,
			heading_ids: true,
			tag_rules: Vec::new(),
			rewriters: Vec::new(),
			validators: Vec::new(),
			renderer: HtmlRenderer::default(),
			resolver: Arc::new(FileSystemResolver::new()),
		}
	}
}

impl EngineBuilder {
	/// Use the rule list of `flavor`. Ignored when [`EngineBuilder::rules`]
	/// is set.
	#[must_use]
	pub fn flavor(mut self, flavor: Flavor) -> Self {
		self.flavor = flavor;
		self
	}

	/// Use a custom rule set.
	#[must_use]
	pub fn rules(mut self, rules: RuleSet) -> Self {
		self.rules = Some(rules);
		self
	}

	#[must_use]
	pub fn heading_ids(mut self, enabled: bool) -> Self {
		self.heading_ids = enabled;
		self
	}

	/// Run a rewriter after the built-in ones. `factory` is called once per
	/// document, including every included file.
	#[must_use]
	pub fn rewriter<R>(mut self, factory: impl Fn() -> R + Send + Sync + 'static) -> Self
	where
		R: Rewriter + 'static,
	{
		self.rewriters
			.push(Arc::new(move || Box::new(factory()) as Box<dyn Rewriter>));
		self
	}

	#[must_use]
	pub fn validator<V>(mut self, factory: impl Fn() -> V + Send + Sync + 'static) -> Self
	where
		V: Validator + 'static,
	{
		self.validators
			.push(Arc::new(move || Box::new(factory()) as Box<dyn Validator>));
		self
	}

	/// Report HTML tags matching `rules`.
	#[must_use]
	pub fn tag_rules(mut self, rules: Vec<HtmlTagRule>) -> Self {
		self.tag_rules.extend(rules);
		self
	}

	#[must_use]
	pub fn renderer(mut self, renderer: HtmlRenderer) -> Self {
		self.renderer = renderer;
		self
	}

	/// Override how one block token type is rendered.
	#[must_use]
	pub fn register_block(
		mut self,
		tag: BlockTag,
		render: impl Fn(&HtmlRenderer, &BlockToken, &mut String) -> fmt::Result + Send + Sync + 'static,
	) -> Self {
		self.renderer.register_block(tag, render);
		self
	}

	/// Override how one inline token type is rendered.
	#[must_use]
	pub fn register_inline(
		mut self,
		tag: InlineTag,
		render: impl Fn(&HtmlRenderer, &InlineToken, &mut String) -> fmt::Result + Send + Sync + 'static,
	) -> Self {
		self.renderer.register_inline(tag, render);
		self
	}

	#[must_use]
	pub fn resolver(mut self, resolver: impl IncludeResolver + 'static) -> Self {
		self.resolver = Arc::new(resolver);
		self
	}

	pub fn build(self) -> DfmResult<Engine> {
		let rules = match self.rules {
			Some(rules) => rules,
			None => self.flavor.rules()?,
		};

		let mut validators = self.validators;
		if !self.tag_rules.is_empty() {
			let tag_rules = self.tag_rules;
			validators.push(Arc::new(move || {
				Box::new(TagValidator::new(tag_rules.clone())) as Box<dyn Validator>
			}));
		}

		Ok(Engine {
			rules,
			heading_ids: self.heading_ids,
			rewriters: self.rewriters,
			validators,
			renderer: Arc::new(self.renderer),
			resolver: self.resolver,
		})
	}
}
