//! Deterministic checks and fixers run over a generated project tree.
//!
//! - [`resolve_imports`]: rewrites intra-project Python imports to absolute
//!   dotted paths and creates missing `__init__.py` markers
//! - [`prune_requirements`]: drops `requirements.txt` entries nothing imports
//! - [`StaticValidator`]: per-file syntax and structure diagnostics
//!
//! Fixers update the in-memory [`mvpfactory_shared::ArtifactSet`] and the
//! on-disk copy together so the two never drift apart.

mod pruner;
mod resolver;
mod validator;

pub use pruner::{MANIFEST_PATH, prune_requirements};
pub use resolver::resolve_imports;
pub use validator::{Diagnostic, DiagnosticKind, StaticValidator};
