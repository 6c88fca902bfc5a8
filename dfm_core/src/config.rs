use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::DfmError;
use crate::DfmResult;
use crate::Engine;
use crate::FileSystemResolver;
use crate::Flavor;
use crate::HtmlTagRule;

/// Default maximum file size in bytes (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["dfm.toml", ".dfm.toml", ".config/dfm.toml"];

/// The config written by `dfm init`.
pub const SAMPLE_CONFIG: &str = r#"# Markdown dialect: "markdown", "gfm" or "dfm".
flavor = "dfm"

[headings]
# Give every heading an id attribute.
ids = true

[include]
# Directory for resolving includes in input without a file path.
# base_dir = "docs"

[files]
# Glob patterns for the markdown files to build. Empty means all of them.
patterns = []

[exclude]
# Gitignore-style patterns for markdown files to skip.
patterns = []

[output]
extension = "html"

# [[tags]]
# tags = ["script", "iframe"]
# behavior = "warning"
# message = "<{tag}> is not allowed in documentation"
# open_only = true
"#;

/// Configuration loaded from `dfm.toml`.
///
/// ```toml
/// flavor = "dfm"
///
/// [headings]
/// ids = true
///
/// [include]
/// base_dir = "docs"
///
/// [exclude]
/// patterns = ["drafts/"]
///
/// [[tags]]
/// tags = ["script"]
/// behavior = "error"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DfmConfig {
	/// The markdown dialect. Defaults to `dfm`.
	#[serde(default)]
	pub flavor: Flavor,
	#[serde(default)]
	pub headings: HeadingsConfig,
	#[serde(default)]
	pub include: IncludeConfig,
	/// Glob patterns restricting which markdown files are built.
	#[serde(default)]
	pub files: FilesConfig,
	/// Exclusion configuration using gitignore-style patterns.
	#[serde(default)]
	pub exclude: ExcludeConfig,
	/// HTML tag restrictions checked on every document.
	#[serde(default)]
	pub tags: Vec<HtmlTagRule>,
	#[serde(default)]
	pub output: OutputConfig,
	/// Maximum file size in bytes to build. Files larger than this are
	/// skipped. Defaults to 10 MB.
	#[serde(default = "default_max_file_size")]
	pub max_file_size: u64,
	/// When true, `.gitignore` files are not used for filtering.
	#[serde(default)]
	pub disable_gitignore: bool,
}

impl Default for DfmConfig {
	fn default() -> Self {
		Self {
			flavor: Flavor::default(),
			headings: HeadingsConfig::default(),
			include: IncludeConfig::default(),
			files: FilesConfig::default(),
			exclude: ExcludeConfig::default(),
			tags: Vec::new(),
			output: OutputConfig::default(),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
		}
	}
}

fn default_max_file_size() -> u64 {
	DEFAULT_MAX_FILE_SIZE
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadingsConfig {
	/// Assign ids to headings. Defaults to `true`.
	#[serde(default = "default_true")]
	pub ids: bool,
}

impl Default for HeadingsConfig {
	fn default() -> Self {
		Self { ids: true }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncludeConfig {
	/// Base directory, relative to the project root, for includes in input
	/// that has no file path.
	#[serde(default)]
	pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesConfig {
	/// Glob patterns relative to the project root, e.g. `"docs/**/*.md"`.
	/// When empty every markdown file is built.
	#[serde(default)]
	pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExcludeConfig {
	/// Gitignore-style patterns for files and directories to skip. These are
	/// relative to the project root.
	///
	/// Examples: `"build/"`, `"*.draft.md"`, `"!important.md"`.
	#[serde(default)]
	pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
	/// File extension of rendered documents. Defaults to `html`.
	#[serde(default = "default_extension")]
	pub extension: String,
}

impl Default for OutputConfig {
	fn default() -> Self {
		Self {
			extension: default_extension(),
		}
	}
}

fn default_extension() -> String {
	"html".to_string()
}

impl DfmConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> DfmResult<Option<DfmConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;

		Ok(Some(config))
	}

	/// Parse and validate a config.
	pub fn parse(content: &str) -> DfmResult<DfmConfig> {
		let config: DfmConfig =
			toml::from_str(content).map_err(|e| DfmError::ConfigParse(e.to_string()))?;
		config.validate()?;

		Ok(config)
	}

	/// Reject settings that would make a build destroy its input. Rendered
	/// files are written next to their sources, so the output extension must
	/// not be a markdown one.
	pub fn validate(&self) -> DfmResult<()> {
		let extension = self.output.extension.trim_start_matches('.');
		let is_markdown = extension.is_empty()
			|| extension.eq_ignore_ascii_case("md")
			|| extension.eq_ignore_ascii_case("markdown");

		if is_markdown {
			return Err(DfmError::InvalidOutputExtension(
				self.output.extension.clone(),
			));
		}

		Ok(())
	}

	/// Build an engine for the project at `root`.
	pub fn engine(&self, root: &Path) -> DfmResult<Engine> {
		let base_dir = self
			.include
			.base_dir
			.as_ref()
			.map_or_else(|| root.to_path_buf(), |dir| root.join(dir));

		Engine::builder()
			.flavor(self.flavor)
			.heading_ids(self.headings.ids)
			.tag_rules(self.tags.clone())
			.resolver(FileSystemResolver::with_base_dir(base_dir))
			.build()
	}
}
