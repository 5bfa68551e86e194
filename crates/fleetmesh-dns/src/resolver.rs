//! Resolver-control seam.

use tracing::debug;

/// Hooks into the resolver process that serves the hosts file.
///
/// The registry calls these after rewriting the file; the node agent
/// owning the resolver supplies the real implementation (cache flush
/// plus SIGHUP or equivalent).
pub trait ResolverControl: Send + Sync {
    /// Drop any cached answers for records that may have changed.
    fn flush_cache(&self);

    /// Make the resolver re-read its hosts file.
    fn reload(&self) -> std::io::Result<()>;
}

/// Control implementation used when no resolver process is attached.
pub struct NoopResolver;

impl ResolverControl for NoopResolver {
    fn flush_cache(&self) {
        debug!("no resolver attached, cache flush skipped");
    }

    fn reload(&self) -> std::io::Result<()> {
        debug!("no resolver attached, reload skipped");
        Ok(())
    }
}
