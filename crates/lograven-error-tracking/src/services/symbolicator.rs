//! Source-map resolution hook
//!
//! Minified browser stacks fingerprint badly: every deploy moves every
//! frame. A [`Symbolicator`] may map the raw trace back to original sources
//! before fingerprinting. Lookups live outside this crate; the default
//! implementation leaves traces alone.

use async_trait::async_trait;

#[async_trait]
pub trait Symbolicator: Send + Sync {
    /// Mapped trace for `raw`, or `None` when no mapping applies
    async fn symbolicate(&self, project_id: i32, release: Option<&str>, raw: &str)
        -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSymbolicator;

#[async_trait]
impl Symbolicator for PassthroughSymbolicator {
    async fn symbolicate(
        &self,
        _project_id: i32,
        _release: Option<&str>,
        _raw: &str,
    ) -> Option<String> {
        None
    }
}
