use serde::Deserialize;
use serde::Serialize;

use crate::DfmError;
use crate::DfmResult;
use crate::rules::RuleSet;
use crate::rules::block;
use crate::rules::dfm;
use crate::rules::inline;

/// The markdown dialects the engine ships with. Each one is a rule list built
/// by editing the previous flavor's list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
	/// The base markdown rules.
	Markdown,
	/// GitHub flavored markdown: strict ATX headings, tables, strikethrough
	/// and bare URLs.
	Gfm,
	/// DocFX flavored markdown: GFM plus includes, callouts, sections, video
	/// and cross references.
	#[default]
	Dfm,
}

impl Flavor {
	pub fn rules(self) -> DfmResult<RuleSet> {
		match self {
			Self::Markdown => markdown(),
			Self::Gfm => gfm(),
			Self::Dfm => dfm(),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Markdown => "markdown",
			Self::Gfm => "gfm",
			Self::Dfm => "dfm",
		}
	}
}

impl std::fmt::Display for Flavor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Flavor {
	type Err = DfmError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.to_ascii_lowercase().as_str() {
			"markdown" => Ok(Self::Markdown),
			"gfm" => Ok(Self::Gfm),
			"dfm" => Ok(Self::Dfm),
			_ => Err(DfmError::UnknownFlavor(value.to_string())),
		}
	}
}

fn markdown() -> DfmResult<RuleSet> {
	let rules = RuleSet::builder()
		.block(block::NewlineRule::new()?)
		.block(block::IndentedCodeRule)
		.block(block::FencesRule::new()?)
		.block(block::HeadingRule::new()?)
		.block(block::LHeadingRule::new()?)
		.block(block::HrRule::new()?)
		.block(block::BlockquoteRule)
		.block(block::ListRule)
		.block(block::HtmlRule::new()?)
		.block(block::DefRule::new()?)
		.block(block::ParagraphRule)
		.block(block::TextRule)
		.inline(inline::EscapeRule::new()?)
		.inline(inline::AutoLinkRule::new()?)
		.inline(inline::TagRule::new()?)
		.inline(inline::LinkRule)
		.inline(inline::RefLinkRule)
		.inline(inline::NoLinkRule)
		.inline(inline::StrongRule)
		.inline(inline::EmRule)
		.inline(inline::CodeRule)
		.inline(inline::BrRule::new()?)
		.inline(inline::TextRule::new());

	Ok(rules.build())
}

fn gfm() -> DfmResult<RuleSet> {
	let rules = markdown()?
		.to_builder()
		.replace_block("heading", block::HeadingRule::gfm()?)?
		.insert_block_before("paragraph", block::TableRule::new()?)?
		.insert_inline_before("tag", inline::UrlRule::new()?)?
		.insert_inline_before("text", inline::DelRule)?
		.replace_inline("text", inline::TextRule::gfm())?;

	Ok(rules.build())
}

fn dfm() -> DfmResult<RuleSet> {
	let rules = gfm()?
		.to_builder()
		.insert_block_before("heading", dfm::IncludeBlockRule::new()?)?
		.insert_block_before("blockquote", dfm::NoteRule::new()?)?
		.insert_block_before("blockquote", dfm::SectionRule::new()?)?
		.insert_block_before("blockquote", dfm::VideoRule::new()?)?
		.insert_inline_before("autolink", dfm::IncludeInlineRule::new()?)?
		.insert_inline_before("autolink", dfm::XrefAutoRule::new()?)?
		.insert_inline_before("text", dfm::XrefShortRule::new()?)?;

	Ok(rules.build())
}
