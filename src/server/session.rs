//! Working-directory state for one server process lifetime.
//!
//! The original deployment kept the last-used directory in process-global
//! state; here it is explicit session state threaded through the execution
//! loop, so resolution is unit-testable without standing up pipes.

use std::path::{Path, PathBuf};

use crate::{AppError, Result};

/// Result of resolving the directory for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirResolution {
    /// The directory exists; execution may proceed there.
    Usable(PathBuf),
    /// The resolved path does not exist; execution must be refused.
    Missing(PathBuf),
}

/// Server-side session state: the last directory a request executed in.
///
/// Initialized empty at server start, lives for the process lifetime, never
/// persisted across restarts. Owned and mutated exclusively by the
/// execution loop.
#[derive(Debug, Default)]
pub struct ExecSession {
    last_working_dir: Option<PathBuf>,
}

impl ExecSession {
    /// Fresh session with no directory history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last directory a request resolved to, if any.
    #[must_use]
    pub fn last_working_dir(&self) -> Option<&Path> {
        self.last_working_dir.as_deref()
    }

    /// Resolve the directory for one request: the explicit request path,
    /// else the last-used directory, else the process current directory.
    ///
    /// A resolution to an existing directory is persisted as the new
    /// last-used directory; [`DirResolution::Missing`] leaves the persisted
    /// state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] only when no explicit or remembered path
    /// exists and the process current directory cannot be determined.
    pub fn resolve_working_dir(&mut self, requested: Option<&Path>) -> Result<DirResolution> {
        let candidate = match requested {
            Some(path) => path.to_path_buf(),
            None => match &self.last_working_dir {
                Some(last) => last.clone(),
                None => std::env::current_dir()
                    .map_err(|err| AppError::Io(format!("cannot read current dir: {err}")))?,
            },
        };

        if candidate.exists() {
            self.last_working_dir = Some(candidate.clone());
            Ok(DirResolution::Usable(candidate))
        } else {
            Ok(DirResolution::Missing(candidate))
        }
    }
}
