//! Path conventions and file transforms for the sitepipe asset pipeline.
//!
//! Every transform reads its inputs from the [`Paths`] table and writes
//! [`OutputFile`] records under the build output directory. Templating, style
//! compilation and minification are delegated to `minijinja`, `grass`,
//! `lightningcss` and oxc.

pub mod clean;
pub mod copy;
pub mod error;
pub mod html;
pub mod output;
pub mod paths;
pub mod scripts;
pub mod styles;
pub mod templates;
pub mod vendor;

pub use error::AssetError;
pub use output::{emit, OutputFile};
pub use paths::{Location, Paths};
pub use styles::{StyleCompiler, StyleConfig};
pub use templates::TemplateExpander;
