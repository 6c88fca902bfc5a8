use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use dfm_core::Flavor;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render DocFX flavored markdown to HTML.",
	long_about = "dfm renders DocFX flavored markdown (DFM) to HTML.\n\nOn top of GitHub flavored \
	              markdown it understands file includes, note callouts, div sections, embedded \
	              video and cross references.\n\nQuick start:\n  dfm init           Create a \
	              dfm.toml config\n  dfm render doc.md  Print the HTML of one file\n  dfm check  \
	              Report include and tag problems\n  dfm build          Write HTML next to every \
	              markdown file"
)]
pub struct DfmCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Log what the engine is doing to stderr.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Create a `dfm.toml` with the default settings.
	///
	/// Does nothing when a config file already exists.
	Init,
	/// Render one markdown file to HTML.
	///
	/// Includes are resolved relative to the file. Settings come from the
	/// project's `dfm.toml`, if any. Diagnostics are printed to stderr.
	Render {
		/// The markdown file to render.
		file: PathBuf,

		/// Write the HTML to this file instead of stdout.
		#[arg(long, short)]
		out: Option<PathBuf>,

		/// Override the flavor from the config.
		#[arg(long, value_enum)]
		flavor: Option<FlavorArg>,
	},
	/// Print the token tree of a markdown file as JSON.
	///
	/// The tree is printed after rewriting and include expansion, the same
	/// tree `render` turns into HTML.
	Tokens {
		/// The markdown file to tokenize.
		file: PathBuf,

		/// Override the flavor from the config.
		#[arg(long, value_enum)]
		flavor: Option<FlavorArg>,
	},
	/// Build every markdown file of the project and report diagnostics.
	///
	/// Nothing is written. Exits with a non-zero status code when a document
	/// fails to build or reports an error, such as a disallowed HTML tag
	/// configured with `behavior = "error"`.
	Check {
		/// Output format for check results. Use `text` for human-readable
		/// output, `json` for programmatic consumption, or `github` for
		/// GitHub Actions annotations that appear inline on PRs.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,

		/// Also fail on warnings, such as includes that cannot be found.
		#[arg(long, default_value_t = false)]
		strict: bool,
	},
	/// Render every markdown file of the project and write the HTML next to
	/// its source.
	Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlavorArg {
	/// Plain markdown.
	Markdown,
	/// GitHub flavored markdown.
	Gfm,
	/// DocFX flavored markdown.
	Dfm,
}

impl From<FlavorArg> for Flavor {
	fn from(value: FlavorArg) -> Self {
		match value {
			FlavorArg::Markdown => Flavor::Markdown,
			FlavorArg::Gfm => Flavor::Gfm,
			FlavorArg::Dfm => Flavor::Dfm,
		}
	}
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
	/// GitHub Actions annotation format. Emits `::warning` or `::error`
	/// annotations that appear inline on pull request diffs.
	Github,
}
