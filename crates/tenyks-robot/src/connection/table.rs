//! Fixed table of connections, keyed by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Connection;

/// Built once at startup and never resized.
#[derive(Clone, Default)]
pub struct ConnectionTable {
    connections: Arc<BTreeMap<String, Arc<dyn Connection>>>,
}

impl ConnectionTable {
    pub fn new(connections: impl IntoIterator<Item = Arc<dyn Connection>>) -> Self {
        let connections = connections
            .into_iter()
            .map(|conn| (conn.name().to_string(), conn))
            .collect();
        Self {
            connections: Arc::new(connections),
        }
    }

    /// Look up a connection by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Connection>> {
        self.connections.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Connection>> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl std::fmt::Debug for ConnectionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.connections.keys()).finish()
    }
}
