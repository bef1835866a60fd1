use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::{
    types::{
        HashMap,
        HashSet,
    },
    uri::Uri,
};

/// Names of procedures made active by a group of clients.
///
/// A registry is owned by whoever creates it and shared by cloning. Every client built with the
/// same registry records its confirmed procedures here, and [`Rpc`][`crate::peer::Rpc`]
/// proxies consult it to reject calls to unknown names before reaching the router.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    procedures: Arc<RwLock<HashMap<Uri, usize>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an active registration of the procedure.
    pub async fn insert(&self, procedure: Uri) {
        *self.procedures.write().await.entry(procedure).or_default() += 1;
    }

    /// Removes one active registration of the procedure.
    ///
    /// The name stays known while other clients still have it registered.
    pub async fn remove(&self, procedure: &Uri) {
        let mut procedures = self.procedures.write().await;
        if let Some(count) = procedures.get_mut(procedure) {
            *count -= 1;
            if *count == 0 {
                procedures.remove(procedure);
            }
        }
    }

    pub async fn contains(&self, procedure: &Uri) -> bool {
        self.procedures.read().await.contains_key(procedure)
    }

    /// Snapshot of all known procedure names.
    pub async fn procedures(&self) -> HashSet<Uri> {
        self.procedures.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod registry_test {
    use crate::{
        core::uri::Uri,
        peer::registry::Registry,
    };

    #[tokio::test]
    async fn counts_registrations_across_clients() {
        let registry = Registry::new();
        let other = registry.clone();
        let procedure = Uri::try_from("com.example.say_hello").unwrap();

        registry.insert(procedure.clone()).await;
        other.insert(procedure.clone()).await;
        assert!(registry.contains(&procedure).await);

        registry.remove(&procedure).await;
        assert!(other.contains(&procedure).await);

        other.remove(&procedure).await;
        assert!(!registry.contains(&procedure).await);
        assert!(registry.procedures().await.is_empty());
    }

    #[tokio::test]
    async fn ignores_removal_of_unknown_procedure() {
        let registry = Registry::new();
        registry
            .remove(&Uri::try_from("com.example.missing").unwrap())
            .await;
        assert!(registry.procedures().await.is_empty());
    }
}
