//! ccfront: source-to-source front end for the CC concurrent C dialect.
//!
//! The library surface is the [`Frontend`] facade: feed it a `.cc` buffer or
//! path and it returns plain C (and, when a host parser is wired in, the
//! typed AST). The host C parser is an external collaborator reached through
//! the [`cc_stub::StubParser`] trait; without one the pipeline runs in a
//! documented text-only mode.

use cc_ast::Node;
use cc_diag::LowerError;
use cc_stub::StubParser;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub mod config;
pub mod pipeline;
pub mod prelude;

pub use cc_diag::Rewrite;
pub use config::Config;
pub use pipeline::LowerOutput;

#[derive(Default)]
pub struct Frontend {
    parser: Option<Box<dyn StubParser>>,
    config: Config,
}

impl Frontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(mut self, parser: Box<dyn StubParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lower one in-memory translation unit to plain C.
    pub fn lower_string(&self, source: &str, filename: &str) -> Result<String, LowerError> {
        let out = pipeline::lower(self.parser.as_deref(), source, filename)?;
        self.run_debug_hooks(&out, source, filename);
        if let Some(path) = &self.config.file.output.dump_lowered
            && let Err(e) = fs::write(path, &out.text)
        {
            // The dump is best-effort; the lowering itself succeeded.
            warn!(target: "pipeline", path = %path.display(), error = %e, "lowered dump failed");
        }
        Ok(out.text)
    }

    /// File-mode entry: read `path`, lower, write `out_path`.
    pub fn lower_file(&self, path: &Path, out_path: &Path) -> Result<(), LowerError> {
        let source = fs::read_to_string(path)
            .map_err(|e| LowerError::io(format!("reading {}", path.display()), e))?;
        let filename = path.to_string_lossy().into_owned();
        if self.config.file.debug.keep_preprocessed {
            let pp_path = out_path.with_extension("pp.c");
            if let Err(e) = fs::write(&pp_path, prelude::preprocess_simple(&source, &filename)) {
                warn!(target: "pipeline", path = %pp_path.display(), error = %e, "keeping preprocessed copy failed");
            }
        }
        let lowered = self.lower_string(&source, &filename)?;
        fs::write(out_path, lowered)
            .map_err(|e| LowerError::io(format!("writing {}", out_path.display()), e))?;
        info!(target: "pipeline", from = %path.display(), to = %out_path.display(), "wrote lowered unit");
        Ok(())
    }

    /// Parse a buffer to the typed AST. Requires a host parser.
    pub fn parse_string(&self, source: &str, filename: &str) -> Result<Node, LowerError> {
        let parser = self.parser.as_deref().ok_or_else(|| {
            LowerError::internal("parse_string requires a host parser; none is wired in")
        })?;
        let text = prelude::preprocess_simple(source, filename);
        let stubs = parser.parse(&text, filename)?;
        if self.config.file.debug.stub_nodes {
            eprintln!("{}", stubs.dump());
        }
        cc_build::build_file(&stubs, &text, filename)
    }

    /// Parse a file to the typed AST. Requires a host parser.
    pub fn parse_file(&self, path: &Path) -> Result<Node, LowerError> {
        let source = fs::read_to_string(path)
            .map_err(|e| LowerError::io(format!("reading {}", path.display()), e))?;
        self.parse_string(&source, &path.to_string_lossy())
    }

    fn run_debug_hooks(&self, out: &LowerOutput, source: &str, filename: &str) {
        if self.config.file.debug.stub_nodes
            && let Some(dump) = &out.stub_dump
        {
            eprintln!("{dump}");
        }
        if self.config.file.debug.async_ir {
            match cc_async::debug_ir(source, filename) {
                Ok(dump) if !dump.is_empty() => eprintln!("{dump}"),
                Ok(_) => {}
                Err(e) => warn!(target: "pipeline.async", error = %e, "async IR dump failed"),
            }
        }
    }
}
