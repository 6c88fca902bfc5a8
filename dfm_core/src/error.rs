use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum DfmError {
	#[error(transparent)]
	#[diagnostic(code(dfm::io_error))]
	Io(#[from] std::io::Error),

	#[error("no rule matched the remaining input at {line}:{column}: `{snippet}`")]
	#[diagnostic(
		code(dfm::no_rule_matched),
		help("every rule set needs a catch-all `text` rule as its last entry")
	)]
	NoRuleMatched {
		snippet: String,
		line: usize,
		column: usize,
	},

	#[error("rule `{rule}` matched without consuming input at {line}:{column}")]
	#[diagnostic(
		code(dfm::stalled_rule),
		help("a rule must consume at least one character when it returns a token")
	)]
	StalledRule {
		rule: &'static str,
		line: usize,
		column: usize,
	},

	#[error("rewriter removed the document root")]
	#[diagnostic(
		code(dfm::root_removed),
		help("`rewrite_block` must return a token for the root, even if it is unchanged")
	)]
	RootRemoved,

	#[error("pending token from rule `{rule}` was not resolved")]
	#[diagnostic(code(dfm::unresolved_pending))]
	UnresolvedPending { rule: &'static str },

	#[error("invalid pattern for rule `{rule}`: {reason}")]
	#[diagnostic(code(dfm::invalid_pattern))]
	InvalidPattern { rule: String, reason: String },

	#[error("unknown rule `{0}` in rule set")]
	#[diagnostic(
		code(dfm::unknown_rule),
		help("rule names are matched exactly, e.g. `heading`, `paragraph`, `text`")
	)]
	UnknownRule(String),

	#[error("unknown flavor `{0}`")]
	#[diagnostic(code(dfm::unknown_flavor), help("expected one of `markdown`, `gfm` or `dfm`"))]
	UnknownFlavor(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(dfm::config_parse),
		help("check that dfm.toml is valid TOML with optional [headings], [include] and [exclude] sections")
	)]
	ConfigParse(String),

	#[error("output extension `{0}` would overwrite markdown sources")]
	#[diagnostic(
		code(dfm::invalid_output_extension),
		help("set [output] extension in dfm.toml to a non-markdown extension such as `html`")
	)]
	InvalidOutputExtension(String),

	#[error("symlink cycle detected at `{path}`")]
	#[diagnostic(code(dfm::symlink_cycle))]
	SymlinkCycle { path: String },

	#[error("failed to write HTML")]
	#[diagnostic(code(dfm::render))]
	Render(#[from] std::fmt::Error),

	#[error("build cancelled before `{0}` was processed")]
	#[diagnostic(code(dfm::cancelled))]
	Cancelled(String),
}

pub type DfmResult<T> = Result<T, DfmError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
