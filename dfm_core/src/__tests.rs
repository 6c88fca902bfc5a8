use std::path::Path;
use std::path::PathBuf;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::*;
use crate::parser::Parser;
use crate::rules::BlockRule;
use crate::rules::block::HeadingRule;

fn render(input: &str) -> DfmResult<String> {
	Ok(Engine::new()?.markup_str(input)?.html)
}

fn render_with(flavor: Flavor, input: &str) -> DfmResult<String> {
	let engine = Engine::builder().flavor(flavor).build()?;
	Ok(engine.markup_str(input)?.html)
}

fn memory_engine(resolver: MemoryResolver) -> DfmResult<Engine> {
	Engine::builder().resolver(resolver).build()
}

fn contains_pending(token: &BlockToken) -> bool {
	matches!(token.kind, BlockKind::Pending(_)) || token.children().iter().any(contains_pending)
}

#[rstest]
#[case::atx_heading("# Hello\n", "<h1 id=\"hello\">Hello</h1>\n")]
#[case::closed_heading("## Title ##\n", "<h2 id=\"title\">Title</h2>\n")]
#[case::setext_heading("Title\n=====\n", "<h1 id=\"title\">Title</h1>\n")]
#[case::paragraph("Just text.\n", "<p>Just text.</p>\n")]
#[case::emphasis(
	"Some *em* and **strong** text\n",
	"<p>Some <em>em</em> and <strong>strong</strong> text</p>\n"
)]
#[case::strikethrough("~~gone~~\n", "<p><del>gone</del></p>\n")]
#[case::code_span("Use `cargo` here\n", "<p>Use <code>cargo</code> here</p>\n")]
#[case::hard_break("line one  \nline two\n", "<p>line one<br>\nline two</p>\n")]
#[case::escape("\\*not em\\*\n", "<p>*not em*</p>\n")]
#[case::escaped_text("a < b & c\n", "<p>a &lt; b &amp; c</p>\n")]
#[case::link(
	"[DocFX](https://dotnet.github.io/docfx \"Title\")\n",
	"<p><a href=\"https://dotnet.github.io/docfx\" title=\"Title\">DocFX</a></p>\n"
)]
#[case::image(
	"![Logo](logo.png \"The logo\")\n",
	"<p><img src=\"logo.png\" alt=\"Logo\" title=\"The logo\"></p>\n"
)]
#[case::autolink(
	"<https://example.com>\n",
	"<p><a href=\"https://example.com\">https://example.com</a></p>\n"
)]
#[case::email_autolink(
	"<me@example.com>\n",
	"<p><a href=\"mailto:me@example.com\">me@example.com</a></p>\n"
)]
#[case::bare_url(
	"Visit https://example.com today\n",
	"<p>Visit <a href=\"https://example.com\">https://example.com</a> today</p>\n"
)]
#[case::www_url(
	"www.example.com\n",
	"<p><a href=\"http://www.example.com\">www.example.com</a></p>\n"
)]
#[case::reference_link(
	"[docs][ref]\n\n[ref]: https://example.com\n",
	"<p><a href=\"https://example.com\">docs</a></p>\n"
)]
#[case::shortcut_reference("[docs]\n\n[docs]: /docs\n", "<p><a href=\"/docs\">docs</a></p>\n")]
#[case::hr("***\n", "<hr>\n")]
#[case::fenced_code(
	"```rust\nfn main() {}\n```\n",
	"<pre><code class=\"lang-rust\">fn main() {}\n</code></pre>\n"
)]
#[case::indented_code("    let x = 1;\n", "<pre><code>let x = 1;\n</code></pre>\n")]
#[case::blockquote("> quoted\n", "<blockquote>\n<p>quoted</p>\n</blockquote>\n")]
#[case::html_block("<div>\nhi\n</div>\n", "<div>\nhi\n</div>\n")]
#[case::inline_html("Press <kbd>Ctrl</kbd>\n", "<p>Press <kbd>Ctrl</kbd></p>\n")]
#[case::tight_list("- one\n- two\n", "<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n")]
#[case::loose_list("- a\n\n- b\n", "<ul>\n<li><p>a</p>\n</li>\n<li><p>b</p>\n</li>\n</ul>\n")]
#[case::ordered_list(
	"3. three\n4. four\n",
	"<ol start=\"3\">\n<li>three</li>\n<li>four</li>\n</ol>\n"
)]
#[case::task_list(
	"- [x] done\n- [ ] todo\n",
	"<ul>\n<li><input type=\"checkbox\" disabled=\"\" checked=\"\"> done</li>\n<li><input \
	 type=\"checkbox\" disabled=\"\"> todo</li>\n</ul>\n"
)]
#[case::note(
	"> [!NOTE]\n> Be careful.\n",
	"<div class=\"NOTE\">\n<h5>NOTE</h5>\n<p>Be careful.</p>\n</div>\n"
)]
#[case::note_case_insensitive(
	"> [!Tip]\n> Try this.\n",
	"<div class=\"TIP\">\n<h5>TIP</h5>\n<p>Try this.</p>\n</div>\n"
)]
#[case::note_on_marker_line(
	"> [!NOTE] Be careful.\n",
	"<div class=\"NOTE\">\n<h5>NOTE</h5>\n<p>Be careful.</p>\n</div>\n"
)]
#[case::section(
	"> [!div class=\"op_single_selector\"]\n> Text\n",
	"<div class=\"op_single_selector\">\n<p>Text</p>\n</div>\n"
)]
#[case::section_attributes_escaped(
	"> [!div class=\"a\\\"><script>\"]\n> Text\n",
	"<div class=\"a\\\" script>\n<p>Text</p>\n</div>\n"
)]
#[case::video(
	"> [!Video https://www.youtube.com/embed/abc]\n",
	"<div class=\"embeddedvideo\"><iframe src=\"https://www.youtube.com/embed/abc\" \
	 frameborder=\"0\" allowfullscreen=\"true\"></iframe></div>\n"
)]
#[case::xref(
	"See <xref:System.String> and @System.Int32.\n",
	"<p>See <xref href=\"System.String\" data-throw-if-not-resolved=\"True\" \
	 data-raw-source=\"&lt;xref:System.String&gt;\"></xref> and <xref href=\"System.Int32\" \
	 data-throw-if-not-resolved=\"False\" data-raw-source=\"@System.Int32\"></xref>.</p>\n"
)]
#[case::quoted_xref(
	"@\"System.String\"\n",
	"<p><xref href=\"System.String\" data-throw-if-not-resolved=\"False\" \
	 data-raw-source=\"@&quot;System.String&quot;\"></xref></p>\n"
)]
#[case::email_is_not_xref("me@example.com\n", "<p>me@example.com</p>\n")]
fn render_dfm(#[case] input: &str, #[case] expected: &str) -> DfmResult<()> {
	let html = render(input)?;
	assert_eq!(html, expected);

	Ok(())
}

#[test]
fn render_table() -> DfmResult<()> {
	let html = render("| Name | Value |\n| :--- | ---: |\n| a | 1 |\n")?;
	insta::assert_snapshot!(html, @r#"
	<table>
	<thead>
	<tr>
	<th style="text-align:left">Name</th>
	<th style="text-align:right">Value</th>
	</tr>
	</thead>
	<tbody>
	<tr>
	<td style="text-align:left">a</td>
	<td style="text-align:right">1</td>
	</tr>
	</tbody>
	</table>
	"#);

	Ok(())
}

#[rstest]
#[case::markdown_has_no_strikethrough(Flavor::Markdown, "~~del~~\n", "<p>~~del~~</p>\n")]
#[case::gfm_strikethrough(Flavor::Gfm, "~~del~~\n", "<p><del>del</del></p>\n")]
#[case::markdown_heading_without_space(Flavor::Markdown, "#Title\n", "<h1 id=\"title\">Title</h1>\n")]
#[case::gfm_heading_needs_space(Flavor::Gfm, "#Title\n", "<p>#Title</p>\n")]
#[case::markdown_has_no_bare_urls(
	Flavor::Markdown,
	"see https://example.com\n",
	"<p>see https://example.com</p>\n"
)]
fn render_flavors(
	#[case] flavor: Flavor,
	#[case] input: &str,
	#[case] expected: &str,
) -> DfmResult<()> {
	let html = render_with(flavor, input)?;
	assert_eq!(html, expected);

	Ok(())
}

#[test]
fn flavor_rule_order() -> DfmResult<()> {
	assert_eq!(
		Flavor::Markdown.rules()?.block_names(),
		vec![
			"newline",
			"code",
			"fences",
			"heading",
			"lheading",
			"hr",
			"blockquote",
			"list",
			"html",
			"def",
			"paragraph",
			"text"
		]
	);
	assert_eq!(
		Flavor::Dfm.rules()?.block_names(),
		vec![
			"newline",
			"code",
			"fences",
			"include_block",
			"heading",
			"lheading",
			"hr",
			"note",
			"section",
			"video",
			"blockquote",
			"list",
			"html",
			"def",
			"table",
			"paragraph",
			"text"
		]
	);
	assert_eq!(
		Flavor::Dfm.rules()?.inline_names(),
		vec![
			"escape",
			"include_inline",
			"xref_auto",
			"autolink",
			"url",
			"tag",
			"link",
			"reflink",
			"nolink",
			"strong",
			"em",
			"code",
			"br",
			"del",
			"xref_short",
			"text"
		]
	);

	Ok(())
}

#[rstest]
#[case::lowercase("gfm", Flavor::Gfm)]
#[case::uppercase("DFM", Flavor::Dfm)]
#[case::markdown("markdown", Flavor::Markdown)]
fn parse_flavor_names(#[case] input: &str, #[case] expected: Flavor) -> DfmResult<()> {
	let flavor: Flavor = input.parse()?;
	assert_eq!(flavor, expected);
	assert_eq!(flavor.to_string(), expected.as_str());

	Ok(())
}

#[test]
fn unknown_flavor_name() {
	let result = "commonmark".parse::<Flavor>();
	assert!(matches!(result, Err(DfmError::UnknownFlavor(name)) if name == "commonmark"));
}

#[test]
fn heading_token_tree() -> DfmResult<()> {
	let engine = Engine::new()?;
	let document = engine.parse_str("# Hello\n")?;

	let [heading] = document.root.children() else {
		panic!("expected a single block, got {:?}", document.root.children());
	};
	let BlockKind::Heading { depth, id, content } = &heading.kind else {
		panic!("expected a heading, got {heading:?}");
	};
	assert_eq!(heading.rule, "heading");
	assert_eq!(heading.position, Position::new(1, 1, 0, 2, 1, 8));
	assert_eq!(*depth, 1);
	assert_eq!(id.as_deref(), Some("hello"));
	assert_eq!(plain_text(content), "Hello");
	assert_eq!(content[0].position, Position::new(1, 3, 2, 1, 8, 7));
	assert!(document.diagnostics.is_empty());

	Ok(())
}

#[test]
fn tokenize_skips_rewriters() -> DfmResult<()> {
	let engine = Engine::new()?;
	let root = engine.tokenize("# Hello\n")?;

	let BlockKind::Heading { id, .. } = &root.children()[0].kind else {
		panic!("expected a heading");
	};
	assert_eq!(*id, None);

	Ok(())
}

#[test]
fn pending_tokens_resolve_after_first_pass() -> DfmResult<()> {
	let engine = Engine::new()?;
	let context = engine.context();
	let parser = Parser::new();
	let mut source = SourceCursor::new("[a]\n\n[a]: /target\n");

	let tokens = parser.tokenize_blocks(&context, &mut source)?;
	assert_eq!(tokens.len(), 2);
	assert!(matches!(tokens[0].kind, BlockKind::Pending(_)));
	assert!(matches!(tokens[1].kind, BlockKind::Ignore));

	let resolved = parser.resolve_pending(tokens)?;
	let BlockKind::Paragraph { content } = &resolved[0].kind else {
		panic!("expected a paragraph, got {:?}", resolved[0]);
	};
	let InlineKind::Link { href, .. } = &content[0].kind else {
		panic!("expected a link, got {:?}", content[0]);
	};
	assert_eq!(href, "/target");

	Ok(())
}

#[test]
fn parse_leaves_no_pending_tokens() -> DfmResult<()> {
	let engine = Engine::new()?;
	let input = "# Title\n\n> quote with [ref]\n\n- item [ref]\n- | not | a table |\n\n| a | b \
	             |\n| - | - |\n| [ref] | x |\n\n[ref]: /r\n";
	let document = engine.parse_str(input)?;
	assert!(!contains_pending(&document.root));

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::stars("***")]
#[case::open_bracket("[")]
#[case::open_image("![")]
#[case::lone_angle("<")]
#[case::lone_backtick("`")]
#[case::pipe("|")]
#[case::empty_quote("> ")]
#[case::empty_bullet("- ")]
#[case::empty_ordered("1.")]
#[case::tab("\t")]
#[case::tildes("~~")]
#[case::at("@")]
#[case::underscore("_")]
#[case::backslash("\\")]
#[case::broken_include("[!include[")]
#[case::open_comment("<!--")]
#[case::open_fence("```")]
#[case::hash("#")]
#[case::trailing_spaces("a  \n")]
#[case::unclosed_strong("**a")]
#[case::unclosed_link("[a](b")]
#[case::nested_quotes("> > > deep\n>\n> > [!NOTE]\n")]
#[case::unicode("héllo *wörld* `ü`\n")]
fn tokenization_terminates(#[case] input: &str) -> DfmResult<()> {
	let engine = Engine::new()?;
	let document = engine.parse_str(input)?;
	assert!(!contains_pending(&document.root));
	assert_eq!(document.root.position.end.offset, input.len());

	Ok(())
}

#[test]
fn rendering_is_idempotent() -> DfmResult<()> {
	let engine = Engine::new()?;
	let input = "# Guide\n\n> [!WARNING]\n> Careful with *this*.\n\n| a | b |\n| - | - |\n| 1 | 2 |\n";
	let document = engine.parse_str(input)?;

	let first = engine.render(&document)?;
	let second = engine.render(&document)?;
	assert_eq!(first, second);
	assert_eq!(first, engine.markup_str(input)?.html);

	Ok(())
}

#[test]
fn engine_is_shared_between_threads() -> DfmResult<()> {
	let engine = Engine::new()?;
	let inputs = [
		"# One\n\n# One\n",
		"> [!NOTE]\n> Two\n",
		"- [x] three\n",
		"[four][f]\n\n[f]: /four\n",
	];
	let expected = inputs
		.iter()
		.map(|input| engine.markup_str(input).map(|rendered| rendered.html))
		.collect::<DfmResult<Vec<_>>>()?;

	std::thread::scope(|scope| {
		for (input, expected) in inputs.iter().zip(&expected) {
			let engine = &engine;
			scope.spawn(move || {
				for _ in 0..20 {
					let html = engine
						.markup_str(input)
						.map(|rendered| rendered.html)
						.unwrap_or_else(|e| panic!("render failed: {e}"));
					assert_eq!(&html, expected);
				}
			});
		}
	});

	Ok(())
}

#[test]
fn context_switch_leaves_receiver_untouched() -> DfmResult<()> {
	let base = Context::new(Flavor::Dfm.rules()?);
	let quoted = base.nested(Context::IS_BLOCK_QUOTE);

	assert!(base.is(Context::IS_TOP));
	assert!(!base.is(Context::IS_BLOCK_QUOTE));
	assert!(quoted.is(Context::IS_BLOCK_QUOTE));
	assert!(!quoted.is(Context::IS_TOP));

	let inline = quoted.inline_context();
	assert_eq!(inline.mode(), ContextMode::Inline);
	assert!(inline.is(Context::IS_INLINE));
	assert!(inline.is(Context::IS_BLOCK_QUOTE));
	assert_eq!(inline.block_context().mode(), ContextMode::Block);

	Ok(())
}

#[test]
fn context_isolated_across_threads() -> DfmResult<()> {
	let base = Context::new(Flavor::Dfm.rules()?);

	std::thread::scope(|scope| {
		for index in 0..4 {
			let base = &base;
			scope.spawn(move || {
				let context = base.switch_variable("Thread", index.to_string());
				assert_eq!(
					context.variable("Thread"),
					Some(&Variable::Text(index.to_string()))
				);
			});
		}
	});
	assert_eq!(base.variable("Thread"), None);

	Ok(())
}

#[test]
fn custom_rule_runs_before_builtin() -> DfmResult<()> {
	let rules = Flavor::Dfm
		.rules()?
		.to_builder()
		.insert_block_before("heading", HeadingRule::exact("title", 1)?)?
		.build();
	let engine = Engine::builder().rules(rules).build()?;
	let root = engine.tokenize("# A\n## B\n")?;

	let names: Vec<&str> = root.children().iter().map(|token| token.rule).collect();
	assert_eq!(names, vec!["title", "heading"]);

	Ok(())
}

#[test]
fn custom_rule_after_builtin_never_matches() -> DfmResult<()> {
	let rules = Flavor::Dfm
		.rules()?
		.to_builder()
		.insert_block_after("heading", HeadingRule::exact("title", 1)?)?
		.build();
	let engine = Engine::builder().rules(rules).build()?;
	let root = engine.tokenize("# A\n## B\n")?;

	let names: Vec<&str> = root.children().iter().map(|token| token.rule).collect();
	assert_eq!(names, vec!["heading", "heading"]);

	Ok(())
}

/// Matches every line. Without `consume` it returns a token without
/// advancing; with it, it emits a placeholder that never settles.
struct BrokenRule {
	consume: bool,
}

impl BlockRule for BrokenRule {
	fn name(&self) -> &'static str {
		"broken"
	}

	fn try_match(
		&self,
		_parser: &Parser,
		context: &Context,
		source: &mut SourceCursor<'_>,
	) -> DfmResult<Option<BlockToken>> {
		if !self.consume {
			return Ok(Some(BlockToken::new(
				"broken",
				Position::default(),
				BlockKind::Hr,
			)));
		}

		let origin = source.point();
		let len = source.remaining().find('\n').map_or(source.remaining().len(), |end| end + 1);
		let (text, position) = source.consume(len);
		let deferred = Deferred::new(
			"broken",
			position,
			text,
			origin,
			context.clone(),
			|_, deferred| {
				Ok(BlockToken::new(
					deferred.rule,
					deferred.position,
					BlockKind::Pending(deferred.clone()),
				))
			},
		);

		Ok(Some(BlockToken::new(
			"broken",
			position,
			BlockKind::Pending(deferred),
		)))
	}
}

#[rstest]
#[case::zero_length_match(false, "rule `broken` matched without consuming input at 1:1")]
#[case::pending_never_settles(true, "pending token from rule `broken` was not resolved")]
fn broken_rule_fails_the_parse(#[case] consume: bool, #[case] expected: &str) -> DfmResult<()> {
	let rules = Flavor::Dfm
		.rules()?
		.to_builder()
		.insert_block_before("newline", BrokenRule { consume })?
		.build();
	let engine = Engine::builder().rules(rules).build()?;

	let error = engine.tokenize("anything\n").err().map(|error| error.to_string());
	assert_eq!(error.as_deref(), Some(expected));

	Ok(())
}

#[test]
fn deeply_nested_quotes_stop_at_limit() -> DfmResult<()> {
	let depth = 2000;
	let html = render(&format!("{} x\n", ">".repeat(depth)))?;

	assert_eq!(html.matches("<blockquote>").count(), Context::MAX_NESTING);
	assert!(html.contains(&format!(
		"<p>{} x</p>",
		"&gt;".repeat(depth - Context::MAX_NESTING)
	)));

	Ok(())
}

#[test]
fn deeply_nested_lists_stop_at_limit() -> DfmResult<()> {
	let html = render(&format!("{}x\n", "- ".repeat(300)))?;

	assert_eq!(html.matches("<ul>").count(), Context::MAX_NESTING);
	assert!(html.contains(&format!("{}x", "- ".repeat(300 - Context::MAX_NESTING))));

	Ok(())
}

#[test]
fn nesting_depth_grows_with_each_level() -> DfmResult<()> {
	let base = Engine::new()?.context();
	assert_eq!(base.depth(), 0);
	assert!(base.can_nest());

	let mut nested = base.clone();
	for _ in 0..Context::MAX_NESTING {
		nested = nested.nested(Context::IS_BLOCK_QUOTE);
	}
	assert_eq!(nested.depth(), Context::MAX_NESTING);
	assert!(!nested.can_nest());
	assert_eq!(nested.inline_context().depth(), Context::MAX_NESTING);
	assert_eq!(base.descend().depth(), 1);

	Ok(())
}

#[test]
fn unclosed_brackets_stay_text() -> DfmResult<()> {
	let brackets = "[a".repeat(5000);
	assert_eq!(render(&format!("{brackets}\n"))?, format!("<p>{brackets}</p>\n"));

	let long_text = "a".repeat(1200);
	let html = render(&format!("[{long_text}](/target)\n"))?;
	assert!(!html.contains("<a href"));
	assert!(html.contains(&long_text));

	Ok(())
}

#[test]
fn link_definitions_only_at_top_level() -> DfmResult<()> {
	let html = render("> [a]: /quoted\n\n- [b]: /listed\n\n[a] [b]\n")?;

	assert!(html.contains("[a]: /quoted"));
	assert!(html.contains("[b]: /listed"));
	assert!(!html.contains("<a href"));

	Ok(())
}

#[test]
fn removed_rule_no_longer_matches() -> DfmResult<()> {
	let rules = Flavor::Dfm.rules()?.to_builder().remove_block("hr")?.build();
	let engine = Engine::builder().rules(rules).build()?;

	assert!(!engine.rules().block_names().contains(&"hr"));
	assert_eq!(engine.markup_str("---\n")?.html, "<p>---</p>\n");

	Ok(())
}

#[test]
fn unknown_rule_name_fails() -> DfmResult<()> {
	let result = Flavor::Dfm
		.rules()?
		.to_builder()
		.insert_block_before("nope", HeadingRule::gfm()?);
	assert!(matches!(result, Err(DfmError::UnknownRule(name)) if name == "nope"));

	Ok(())
}

#[test]
fn rule_set_without_text_reports_no_match() -> DfmResult<()> {
	let rules = RuleSet::builder().block(HeadingRule::gfm()?).build();
	let engine = Engine::builder().rules(rules).build()?;
	let result = engine.parse_str("plain\n");

	assert!(matches!(
		result,
		Err(DfmError::NoRuleMatched {
			line: 1,
			column: 1,
			..
		})
	));

	Ok(())
}

#[rstest]
#[case::words("Hello World", "hello-world")]
#[case::punctuation("What's new?", "whats-new")]
#[case::underscores("a_b-c", "a_b-c")]
#[case::unicode("Ünïcode Text", "ünïcode-text")]
#[case::empty("  ", "heading")]
fn slugify_heading_text(#[case] input: &str, #[case] expected: &str) {
	assert_eq!(slugify(input), expected);
}

#[test]
fn duplicate_heading_ids_are_suffixed() -> DfmResult<()> {
	let html = render("# Intro\n\n# Intro\n\n# Intro\n")?;
	assert_eq!(
		html,
		"<h1 id=\"intro\">Intro</h1>\n<h1 id=\"intro-1\">Intro</h1>\n<h1 \
		 id=\"intro-2\">Intro</h1>\n"
	);

	Ok(())
}

#[test]
fn explicit_anchor_sets_heading_id() -> DfmResult<()> {
	let html = render("## <a name=\"custom\"></a>Title\n")?;
	assert_eq!(html, "<h2 id=\"custom\">Title</h2>\n");

	Ok(())
}

#[test]
fn heading_ids_can_be_disabled() -> DfmResult<()> {
	let engine = Engine::builder().heading_ids(false).build()?;
	assert_eq!(engine.markup_str("# Hello\n")?.html, "<h1>Hello</h1>\n");

	Ok(())
}

#[derive(Default)]
struct Recorder {
	events: Vec<String>,
}

impl Rewriter for Recorder {
	fn pre_process(&mut self, _root: &BlockToken, _scope: &mut RewriteScope<'_>) {
		self.events.push("pre".to_string());
	}

	fn rewrite_block(
		&mut self,
		token: BlockToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<BlockToken> {
		self.events.push(format!("{:?}", token.tag()));
		Some(token)
	}

	fn rewrite_inline(
		&mut self,
		token: InlineToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<InlineToken> {
		self.events.push(format!("inline:{:?}", token.tag()));
		Some(token)
	}

	fn post_process(&mut self, _root: &BlockToken, _scope: &mut RewriteScope<'_>) {
		self.events.push("post".to_string());
	}
}

#[test]
fn visitor_walks_root_first_then_post_order() -> DfmResult<()> {
	let root = Engine::new()?.tokenize("- a\n")?;
	let mut recorder = Recorder::default();
	let mut diagnostics = Diagnostics::new();
	let mut scope = RewriteScope::new(None, &mut diagnostics);

	DocumentVisitor::new(&mut recorder).visit(root, &mut scope)?;
	assert_eq!(
		recorder.events,
		vec![
			"pre",
			"Document",
			"inline:Text",
			"Text",
			"ListItem",
			"List",
			"post"
		]
	);

	Ok(())
}

struct DropHr;

impl Rewriter for DropHr {
	fn rewrite_block(
		&mut self,
		token: BlockToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<BlockToken> {
		(!matches!(token.kind, BlockKind::Hr)).then_some(token)
	}
}

struct Shout;

impl Rewriter for Shout {
	fn rewrite_inline(
		&mut self,
		mut token: InlineToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<InlineToken> {
		if let InlineKind::Text { text } = &mut token.kind {
			*text = text.to_uppercase();
		}
		Some(token)
	}
}

struct DropRoot;

impl Rewriter for DropRoot {
	fn rewrite_block(
		&mut self,
		token: BlockToken,
		_scope: &mut RewriteScope<'_>,
	) -> Option<BlockToken> {
		(!matches!(token.kind, BlockKind::Document { .. })).then_some(token)
	}
}

#[test]
fn rewriters_remove_and_replace_tokens() -> DfmResult<()> {
	let engine = Engine::builder()
		.rewriter(|| DropHr)
		.rewriter(|| Shout)
		.build()?;
	assert_eq!(
		engine.markup_str("a\n\n***\n\nb\n")?.html,
		"<p>A</p>\n<p>B</p>\n"
	);

	Ok(())
}

#[test]
fn removing_the_root_is_an_error() -> DfmResult<()> {
	let engine = Engine::builder().rewriter(|| DropRoot).build()?;
	assert!(matches!(
		engine.parse_str("text\n"),
		Err(DfmError::RootRemoved)
	));

	Ok(())
}

#[test]
fn rewriter_chain_runs_each_pass_in_order() -> DfmResult<()> {
	let root = Engine::new()?.tokenize("# Heading\n")?;
	let mut diagnostics = Diagnostics::new();
	let mut scope = RewriteScope::new(None, &mut diagnostics);
	let mut chain = RewriterChain::new()
		.with(Shout)
		.with(HeadingIdRewriter::new());

	let root = chain.run(root, &mut scope)?;
	let BlockKind::Heading { id, .. } = &root.children()[0].kind else {
		panic!("expected a heading");
	};
	assert_eq!(id.as_deref(), Some("heading"));

	Ok(())
}

#[test]
fn tag_validator_reports_disallowed_tags() -> DfmResult<()> {
	let mut script = HtmlTagRule::new(["script"]);
	script.behavior = TagBehavior::Error;
	script.open_only = true;
	let mut bold = HtmlTagRule::new(["b"]);
	bold.message = Some("avoid <{tag}>".to_string());

	let engine = Engine::builder().tag_rules(vec![script, bold]).build()?;
	let rendered = engine.markup_str("<script>alert(1)</script>\n\nSome <b>bold</b> text\n")?;

	assert_eq!(rendered.diagnostics.count(DiagnosticKind::DisallowedTag), 3);
	assert!(rendered.diagnostics.has_errors());
	let messages: Vec<&str> = rendered
		.diagnostics
		.iter()
		.map(|diagnostic| diagnostic.message.as_str())
		.collect();
	assert_eq!(
		messages,
		vec!["HTML tag <script> is not allowed", "avoid <b>", "avoid <b>"]
	);
	assert_eq!(rendered.diagnostics[1].line, 3);
	assert_eq!(rendered.diagnostics[1].column, 6);

	Ok(())
}

#[test]
fn tag_validator_ignores_comments() -> DfmResult<()> {
	let engine = Engine::builder()
		.tag_rules(vec![HtmlTagRule::new(["b"])])
		.build()?;
	let rendered = engine.markup_str("<!-- <b>commented</b> -->\n")?;
	assert!(rendered.diagnostics.is_empty());

	Ok(())
}

#[test]
fn block_include_expands_target() -> DfmResult<()> {
	let resolver = MemoryResolver::new().with_file("docs/part.md", "## Part\n\nShared.\n");
	let engine = memory_engine(resolver)?;
	let source = SourceDocument::with_path("docs/index.md", "[!include[Part](part.md)]\n");

	let document = engine.parse(&source)?;
	let [included] = document.root.children() else {
		panic!("expected one block, got {:?}", document.root.children());
	};
	let BlockKind::Included { path, children } = &included.kind else {
		panic!("expected an include, got {included:?}");
	};
	assert_eq!(path, &PathBuf::from("docs/part.md"));
	assert_eq!(children.len(), 2);
	assert_eq!(
		engine.render(&document)?,
		"<h2 id=\"part\">Part</h2>\n<p>Shared.</p>\n"
	);

	Ok(())
}

#[test]
fn include_directive_is_case_insensitive() -> DfmResult<()> {
	let engine = memory_engine(MemoryResolver::new().with_file("part.md", "Hi"))?;
	assert_eq!(
		engine.markup_str("[!INCLUDE[Part](part.md)]\n")?.html,
		"<p>Hi</p>\n"
	);

	Ok(())
}

#[test]
fn inline_include_joins_paragraph_content() -> DfmResult<()> {
	let engine = memory_engine(MemoryResolver::new().with_file("snippet.md", "**bold** text\n"))?;
	let html = engine
		.markup_str("Before [!include-[inline](snippet.md)] after\n")?
		.html;
	assert_eq!(html, "<p>Before <strong>bold</strong> text after</p>\n");

	Ok(())
}

#[test]
fn missing_include_reports_one_diagnostic() -> DfmResult<()> {
	let engine = memory_engine(MemoryResolver::new())?;
	let rendered = engine.markup_str("[!include[Sample](missing.md)]")?;

	assert_eq!(rendered.diagnostics.len(), 1);
	assert_eq!(
		rendered.diagnostics.count(DiagnosticKind::IncludeNotFound),
		1
	);
	assert_eq!(rendered.html, "[!include[Sample](missing.md)]\n");

	Ok(())
}

#[test]
#[traced_test]
fn missing_include_is_logged() {
	let engine = memory_engine(MemoryResolver::new()).unwrap_or_else(|e| panic!("engine: {e}"));
	let rendered = engine
		.markup_str("Text [!include-[x](nope.md)] here\n")
		.unwrap_or_else(|e| panic!("markup: {e}"));

	assert_eq!(
		rendered.html,
		"<p>Text [!include-[x](nope.md)] here</p>\n"
	);
	assert!(logs_contain("include-not-found"));
}

#[test]
fn circular_include_is_reported_once() -> DfmResult<()> {
	let resolver = MemoryResolver::new()
		.with_file("a.md", "[!include[B](b.md)]\n")
		.with_file("b.md", "[!include[A](a.md)]\n");
	let engine = memory_engine(resolver)?;
	let source = SourceDocument::with_path("a.md", "[!include[B](b.md)]\n");

	let rendered = engine.markup(&source)?;
	assert_eq!(
		rendered.diagnostics.count(DiagnosticKind::CircularReference),
		1
	);
	assert_eq!(
		rendered.diagnostics[0].message,
		"circular reference: a.md --> b.md --> a.md"
	);
	assert_eq!(rendered.html, "[!include[A](a.md)]\n");

	Ok(())
}

#[test]
fn sibling_includes_of_the_same_file_are_not_cycles() -> DfmResult<()> {
	let engine = memory_engine(MemoryResolver::new().with_file("part.md", "Part"))?;
	let rendered = engine.markup_str("[!include[1](part.md)]\n[!include[2](part.md)]\n")?;

	assert!(rendered.diagnostics.is_empty());
	assert_eq!(rendered.html, "<p>Part</p>\n<p>Part</p>\n");

	Ok(())
}

#[test]
fn included_links_are_rebased() -> DfmResult<()> {
	let resolver = MemoryResolver::new().with_file(
		"docs/sub/part.md",
		"[link](../other.md) ![img](images/a.png) [web](https://example.com)\n",
	);
	let engine = memory_engine(resolver)?;
	let source = SourceDocument::with_path("docs/index.md", "[!include[Part](sub/part.md)]\n");

	assert_eq!(
		engine.markup(&source)?.html,
		"<p><a href=\"other.md\">link</a> <img src=\"sub/images/a.png\" alt=\"img\"> <a \
		 href=\"https://example.com\">web</a></p>\n"
	);

	Ok(())
}

#[test]
fn included_content_is_parsed_with_include_context() -> DfmResult<()> {
	let engine = memory_engine(MemoryResolver::new().with_file("part.md", "Part"))?;
	let context = engine.context().switch_variable(Context::IS_INCLUDE, true);
	assert!(context.is(Context::IS_INCLUDE));
	assert!(!engine.context().is(Context::IS_INCLUDE));

	let mut chain = InclusionChain::new(Some(Path::new("index.md")));
	let mut diagnostics = Diagnostics::new();
	let root = engine.build_included("Part", Path::new("part.md"), &mut chain, &mut diagnostics)?;
	assert_eq!(engine.renderer().render(&root)?, "<p>Part</p>\n");
	assert_eq!(chain.paths(), &[PathBuf::from("index.md")]);

	Ok(())
}

#[test]
fn inclusion_chain_guard_pops_on_drop() {
	let mut chain = InclusionChain::new(Some(Path::new("a.md")));

	{
		let mut guard = chain
			.enter(Path::new("b.md"))
			.unwrap_or_else(|e| panic!("unexpected cycle: {e}"));
		assert_eq!(guard.paths().len(), 2);
		assert!(guard.contains(Path::new("b.md")));

		let cycle = guard.enter(Path::new("a.md")).err();
		assert_eq!(
			cycle.map(|cycle| cycle.to_string()),
			Some("circular reference: a.md --> b.md --> a.md".to_string())
		);
	}

	assert_eq!(chain.paths(), &[PathBuf::from("a.md")]);
}

#[test]
fn memory_resolver_prefers_including_directory() {
	let resolver = MemoryResolver::new()
		.with_file("docs/part.md", "nested")
		.with_file("part.md", "top");

	let nested = resolver.resolve("part.md", Some(Path::new("docs/index.md")));
	let top = resolver.resolve("part.md", None);
	let parent = resolver.resolve("../part.md", Some(Path::new("docs/index.md")));

	assert_eq!(nested.map(|found| found.content), Some("nested".to_string()));
	assert_eq!(top.map(|found| found.content), Some("top".to_string()));
	assert_eq!(parent.map(|found| found.path), Some(PathBuf::from("part.md")));
}

#[test]
fn file_system_include_and_self_cycle() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().canonicalize()?;
	std::fs::create_dir_all(root.join("shared"))?;
	std::fs::write(root.join("shared/part.md"), "Shared\r\ntext\r\n")?;
	std::fs::write(
		root.join("index.md"),
		"[!include[Part](shared/part.md)]\n\n[!include[Self](index.md)]\n",
	)?;

	let engine = Engine::new()?;
	let source = SourceDocument::read(root.join("index.md"))?;
	let rendered = engine.markup(&source)?;

	assert_eq!(
		rendered.html,
		"<p>Shared\ntext</p>\n[!include[Self](index.md)]\n"
	);
	assert_eq!(
		rendered.diagnostics.count(DiagnosticKind::CircularReference),
		1
	);

	Ok(())
}

#[test]
fn file_system_resolver_uses_base_dir_without_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("part.md"), "From base")?;

	let engine = Engine::builder()
		.resolver(FileSystemResolver::with_base_dir(tmp.path()))
		.build()?;
	assert_eq!(
		engine.markup_str("[!include[Part](part.md)]\n")?.html,
		"<p>From base</p>\n"
	);

	Ok(())
}

#[rstest]
#[case::sibling("images/a.png", Some("sub/images/a.png"))]
#[case::parent_with_fragment("../other.md#top", Some("other.md#top"))]
#[case::query("file.md?view=1", Some("sub/file.md?view=1"))]
#[case::absolute_url("https://example.com", None)]
#[case::mailto("mailto:me@example.com", None)]
#[case::anchor("#section", None)]
#[case::rooted("/docs/a.md", None)]
fn rebase_link_targets(#[case] target: &str, #[case] expected: Option<&str>) {
	let rebase = LinkRebaseRewriter::new("docs/sub", "docs");
	assert!(!rebase.is_identity());
	assert_eq!(rebase.rebase(target).as_deref(), expected);
}

#[test]
fn custom_renderer_entry() -> DfmResult<()> {
	let engine = Engine::builder()
		.register_block(BlockTag::Hr, |_, _, out| {
			out.push_str("<hr/>\n");
			Ok(())
		})
		.register_inline(InlineTag::CodeSpan, |_, token, out| {
			if let InlineKind::CodeSpan { code } = &token.kind {
				out.push_str("<kbd>");
				out.push_str(&escape_html(code));
				out.push_str("</kbd>");
			}
			Ok(())
		})
		.build()?;

	assert_eq!(
		engine.markup_str("`a<b`\n\n---\n")?.html,
		"<p><kbd>a&lt;b</kbd></p>\n<hr/>\n"
	);

	Ok(())
}

#[test]
fn empty_renderer_outputs_nothing() -> DfmResult<()> {
	let engine = Engine::builder().renderer(HtmlRenderer::empty()).build()?;
	assert_eq!(engine.markup_str("# Title\n\ntext\n")?.html, "");

	Ok(())
}

#[test]
fn diagnostic_display() {
	let diagnostic = Diagnostic::warning(DiagnosticKind::IncludeNotFound, "cannot resolve")
		.at(Some(Path::new("docs/a.md")), Point::new(3, 5, 20));
	assert_eq!(
		diagnostic.to_string(),
		"docs/a.md:3:5: warning[include-not-found]: cannot resolve"
	);

	let error = Diagnostic::warning(DiagnosticKind::DisallowedTag, "no")
		.with_severity(Severity::Error)
		.at(None, Point::default());
	assert_eq!(error.to_string(), "<input>:1:1: error[disallowed-tag]: no");
}

#[test]
fn document_serializes_to_json() -> AnyEmptyResult {
	let engine = Engine::new()?;
	let document = engine.parse_str("# Hi\n")?;
	let json = serde_json::to_value(&document.root)?;

	assert_eq!(json["type"], "document");
	assert_eq!(json["children"][0]["type"], "heading");
	assert_eq!(json["children"][0]["id"], "hi");
	assert_eq!(json["children"][0]["content"][0]["text"], "Hi");

	Ok(())
}

#[test]
fn load_config_from_candidates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	assert!(DfmConfig::load(tmp.path())?.is_none());

	std::fs::create_dir_all(tmp.path().join(".config"))?;
	std::fs::write(
		tmp.path().join(".config/dfm.toml"),
		"flavor = \"gfm\"\n\n[headings]\nids = false\n\n[exclude]\npatterns = [\"drafts/\"]\n\n[[tags]]\ntags = [\"script\"]\nbehavior = \"error\"\n",
	)?;

	let config = DfmConfig::load(tmp.path())?.ok_or("config not found")?;
	assert_eq!(config.flavor, Flavor::Gfm);
	assert!(!config.headings.ids);
	assert_eq!(config.exclude.patterns, vec!["drafts/".to_string()]);
	assert_eq!(config.tags.len(), 1);
	assert_eq!(config.tags[0].behavior, TagBehavior::Error);
	assert_eq!(config.output.extension, "html");
	assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);

	let engine = config.engine(tmp.path())?;
	let rendered = engine.markup_str("# T\n\n<script></script>\n")?;
	assert_eq!(rendered.html, "<h1>T</h1>\n<script></script>\n");
	assert!(rendered.diagnostics.has_errors());

	Ok(())
}

#[test]
fn root_config_takes_precedence() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("dfm.toml"), "flavor = \"markdown\"\n")?;
	std::fs::write(tmp.path().join(".dfm.toml"), "flavor = \"gfm\"\n")?;

	assert_eq!(
		DfmConfig::resolve_path(tmp.path()),
		Some(tmp.path().join("dfm.toml"))
	);
	let config = DfmConfig::load(tmp.path())?.ok_or("config not found")?;
	assert_eq!(config.flavor, Flavor::Markdown);

	Ok(())
}

#[test]
fn invalid_config_is_an_error() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("dfm.toml"), "flavor = \"textile\"\n")?;

	assert!(matches!(
		DfmConfig::load(tmp.path()),
		Err(DfmError::ConfigParse(_))
	));

	Ok(())
}

#[test]
fn sample_config_parses_to_defaults() -> DfmResult<()> {
	let config = DfmConfig::parse(SAMPLE_CONFIG)?;
	assert_eq!(config.flavor, Flavor::Dfm);
	assert!(config.headings.ids);
	assert!(config.files.patterns.is_empty());
	assert!(config.tags.is_empty());
	assert_eq!(config.output.extension, "html");

	Ok(())
}

#[rstest]
#[case::md("md")]
#[case::dotted_upper(".MD")]
#[case::markdown("markdown")]
#[case::empty("")]
fn markdown_output_extension_is_rejected(#[case] extension: &str) {
	let content = format!("[output]\nextension = \"{extension}\"\n");

	assert!(matches!(
		DfmConfig::parse(&content),
		Err(DfmError::InvalidOutputExtension(found)) if found == extension
	));
}

#[test]
fn write_outputs_never_overwrites_sources() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().canonicalize()?;
	write_project(&root)?;

	let mut project = Project::open(&root)?;
	project.config.output.extension = "md".to_string();
	let engine = project.engine()?;
	let report = project.build(&engine, &CancellationFlag::new());

	assert!(matches!(
		project.write_outputs(&report),
		Err(DfmError::InvalidOutputExtension(_))
	));
	assert_eq!(
		std::fs::read_to_string(root.join("docs/shared/part.md"))?,
		"Shared [link](../other.md)\n"
	);

	Ok(())
}

fn write_project(root: &Path) -> std::io::Result<()> {
	std::fs::create_dir_all(root.join("docs/shared"))?;
	std::fs::create_dir_all(root.join("drafts"))?;
	std::fs::create_dir_all(root.join(".hidden"))?;
	std::fs::write(root.join("dfm.toml"), "[exclude]\npatterns = [\"drafts/\"]\n")?;
	std::fs::write(root.join(".gitignore"), "ignored.md\n")?;
	std::fs::write(
		root.join("docs/index.md"),
		"# Index\n\n[!include[Shared](shared/part.md)]\n",
	)?;
	std::fs::write(root.join("docs/shared/part.md"), "Shared [link](../other.md)\n")?;
	std::fs::write(root.join("drafts/draft.md"), "# Draft\n")?;
	std::fs::write(root.join(".hidden/secret.md"), "# Secret\n")?;
	std::fs::write(root.join("ignored.md"), "# Ignored\n")?;
	std::fs::write(root.join("notes.txt"), "not markdown\n")
}

#[test]
fn project_discovers_markdown_files() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().canonicalize()?;
	write_project(&root)?;

	let project = Project::open(&root)?;
	assert_eq!(
		project.files,
		vec![root.join("docs/index.md"), root.join("docs/shared/part.md")]
	);

	Ok(())
}

#[test]
fn project_file_patterns_and_size_limit() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().canonicalize()?;
	write_project(&root)?;
	std::fs::write(
		root.join("dfm.toml"),
		"max_file_size = 64\ndisable_gitignore = true\n\n[files]\npatterns = \
		 [\"**/index.md\", \"ignored.md\", \"docs/big.md\"]\n",
	)?;
	std::fs::write(root.join("docs/big.md"), "x".repeat(100))?;

	let project = Project::open(&root)?;
	assert_eq!(
		project.files,
		vec![root.join("docs/index.md"), root.join("ignored.md")]
	);

	Ok(())
}

#[test]
fn project_builds_in_parallel_and_writes_html() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().canonicalize()?;
	write_project(&root)?;

	let project = Project::open(&root)?;
	let engine = project.engine()?;
	let report = project.build(&engine, &CancellationFlag::new());

	assert!(!report.has_errors());
	assert_eq!(report.diagnostic_count(), 0);
	let index = report
		.rendered()
		.find(|rendered| rendered.path.as_deref() == Some(root.join("docs/index.md").as_path()))
		.ok_or("index not built")?;
	assert_eq!(
		index.html,
		"<h1 id=\"index\">Index</h1>\n<p>Shared <a href=\"other.md\">link</a></p>\n"
	);

	assert_eq!(project.write_outputs(&report)?, 2);
	assert!(root.join("docs/index.html").is_file());
	assert!(root.join("docs/shared/part.html").is_file());

	Ok(())
}

#[test]
fn cancelled_build_fails_every_document() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().canonicalize()?;
	write_project(&root)?;

	let project = Project::open(&root)?;
	let engine = project.engine()?;
	let cancellation = CancellationFlag::new();
	cancellation.cancel();
	let report = project.build(&engine, &cancellation);

	assert!(report.has_errors());
	assert_eq!(report.rendered().count(), 0);
	assert!(
		report
			.failures()
			.all(|(_, error)| matches!(error, DfmError::Cancelled(_)))
	);

	Ok(())
}
