use std::sync::Arc;

use crate::dispatch::backend::{Backend, BackendStatus};
use crate::error::{BalancerError, Result};

/// Fixed, ordered set of backends. Membership never changes after startup,
/// so the pool itself needs no lock.
#[derive(Debug)]
pub struct Pool<L> {
    backends: Vec<Arc<Backend<L>>>,
}

impl<L> Pool<L> {
    /// Fails with a configuration error when `backends` is empty.
    pub fn new(backends: Vec<Backend<L>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(BalancerError::Configuration(
                "backend pool must contain at least one backend".to_string(),
            ));
        }
        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Backend<L>>> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Backend<L>>> {
        self.backends.iter()
    }

    pub fn status(&self) -> Vec<BackendStatus> {
        self.backends.iter().map(|b| b.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::job::BackendKind;
    use std::time::Duration;

    #[test]
    fn empty_pool_is_a_configuration_error() {
        let err = Pool::<()>::new(Vec::new()).unwrap_err();
        assert!(matches!(err, BalancerError::Configuration(_)));
    }

    #[test]
    fn pool_keeps_configured_order() {
        let pool = Pool::new(vec![
            Backend::new(0, "a:80".into(), BackendKind::Video, Duration::from_secs(1), ()),
            Backend::new(1, "b:80".into(), BackendKind::Music, Duration::from_secs(1), ()),
        ])
        .unwrap();
        let endpoints: Vec<&str> = pool.iter().map(|b| b.endpoint()).collect();
        assert_eq!(endpoints, vec!["a:80", "b:80"]);
        assert_eq!(pool.status()[1].kind, BackendKind::Music);
    }
}
