//! Registry of output paths with an active execution

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::domain::errors::DomainError;
use crate::engine::handle::RequestId;

/// Maps output path to the request currently writing it
#[derive(Debug, Clone, Default)]
pub struct OutputRegistry {
    active: Arc<Mutex<HashMap<PathBuf, RequestId>>>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `output` for `request`, failing with a conflict if it is taken
    pub fn claim(&self, output: &Path, request: RequestId) -> Result<OutputLease, DomainError> {
        let key = registry_key(output);
        let mut active = self.lock();

        if let Some(holder) = active.get(&key) {
            return Err(DomainError::Conflict {
                output: output.to_path_buf(),
                active: holder.to_string(),
            });
        }

        active.insert(key.clone(), request);
        debug!("Request {} holds output {}", request, key.display());

        Ok(OutputLease {
            registry: self.clone(),
            key,
            request,
        })
    }

    /// Request currently holding `output`, if any
    pub fn holder(&self, output: &Path) -> Option<RequestId> {
        self.lock().get(&registry_key(output)).copied()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, key: &Path, request: RequestId) {
        let mut active = self.lock();
        if active.get(key) == Some(&request) {
            active.remove(key);
            debug!("Request {} released output {}", request, key.display());
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, RequestId>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive hold on an output path, released on drop
#[derive(Debug)]
pub struct OutputLease {
    registry: OutputRegistry,
    key: PathBuf,
    request: RequestId,
}

impl OutputLease {
    pub fn path(&self) -> &Path {
        &self.key
    }

    pub fn request(&self) -> RequestId {
        self.request
    }
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.request);
    }
}

/// Normalise a path so that `a/./b.mp4` and `a/b.mp4` collide
fn registry_key(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;

    #[test]
    fn test_second_claim_conflicts_until_release() {
        let registry = OutputRegistry::new();
        let first = RequestId::new();
        let second = RequestId::new();

        let lease = registry.claim(Path::new("out/clip.mp4"), first).unwrap();
        let err = registry
            .claim(Path::new("out/./clip.mp4"), second)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictError);
        assert!(err.to_string().contains(&first.to_string()));
        assert_eq!(registry.holder(Path::new("out/clip.mp4")), Some(first));

        drop(lease);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.claim(Path::new("out/clip.mp4"), second).is_ok());
    }

    #[test]
    fn test_distinct_outputs_do_not_conflict() {
        let registry = OutputRegistry::new();
        let _a = registry.claim(Path::new("a.mp4"), RequestId::new()).unwrap();
        let _b = registry.claim(Path::new("b.mp4"), RequestId::new()).unwrap();
        assert_eq!(registry.active_count(), 2);
    }
}
