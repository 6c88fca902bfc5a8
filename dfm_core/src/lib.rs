//! `dfm_core` is the core library for [dfm](https://github.com/dfm-rs/dfm), a rule-driven engine for DocFX flavored markdown. It tokenizes markdown with ordered, swappable rule lists, rewrites the token tree, expands `[!include]` directives and renders HTML.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Markdown file
//!   → Block rules (first match wins, leaf content captured as pending tokens)
//!   → Pending resolution (inline rules run once every link definition is known)
//!   → Rewriters (heading ids, custom passes) and validators (HTML tag rules)
//!   → Include expansion (each included file runs the whole pipeline)
//!   → HTML renderer (one table entry per token type)
//! ```
//!
//! ## Modules
//!
//! - [`rules`] - The block and inline rules and the ordered [`rules::RuleSet`] they live in.
//! - [`flavor`] - The `markdown`, `gfm` and `dfm` rule lists, each built by editing the previous one.
//! - [`config`] - Configuration loading from `dfm.toml`.
//! - [`project`] - Markdown discovery and parallel builds of a whole directory.
//!
//! ## Key Types
//!
//! - [`Engine`] - The configured pipeline. Immutable and shareable between threads.
//! - [`Context`] - The copy-on-write state threaded through tokenization.
//! - [`BlockToken`] / [`InlineToken`] - The token tree.
//! - [`Rewriter`] / [`Validator`] - Passes over a parsed tree.
//! - [`IncludeResolver`] - Locates include targets, on disk or in memory.
//! - [`HtmlRenderer`] - The table-driven HTML renderer.
//!
//! ## Quick Start
//!
//! ```rust
//! use dfm_core::Engine;
//!
//! let engine = Engine::new().unwrap();
//! let rendered = engine.markup_str("# Hello\n").unwrap();
//! assert_eq!(rendered.html, "<h1 id=\"hello\">Hello</h1>\n");
//! ```

pub use config::*;
pub use context::*;
pub use diagnostics::*;
pub use engine::*;
pub use error::*;
pub use flavor::*;
pub use inclusion::*;
pub use parser::*;
pub use position::*;
pub use project::*;
pub use render::*;
pub use rewriters::*;
pub use rules::BlockRule;
pub use rules::InlineRule;
pub use rules::RuleSet;
pub use rules::RuleSetBuilder;
pub use source::*;
pub use tokens::*;
pub use visitor::*;

pub mod config;
mod context;
mod diagnostics;
mod engine;
#[allow(unused_assignments)]
mod error;
pub mod flavor;
mod inclusion;
pub mod parser;
mod position;
pub mod project;
mod render;
mod rewriters;
pub mod rules;
mod source;
mod tokens;
mod visitor;

#[cfg(test)]
mod __tests;
