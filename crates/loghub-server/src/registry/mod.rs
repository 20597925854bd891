// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client registry.
//!
//! Owns every admitted [`Client`] and hands out `Arc` handles to the
//! ingestion core. The attached [`ClientIntegrityTask`] periodically
//! evicts dead clients; handles cached across a sweep are re-resolved by
//! id rather than trusted.

mod client;
mod integrity;

pub use client::{Client, Token};
pub use integrity::ClientIntegrityTask;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::Configuration;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("client already registered: {0}")]
    DuplicateClient(String),

    #[error("malformed client id: {0:?}")]
    MalformedClientId(String),
}

pub struct Registry {
    configuration: Arc<Configuration>,
    clients: RwLock<HashMap<String, Arc<Client>>>,
    integrity_task: RwLock<Option<Arc<ClientIntegrityTask>>>,
}

impl Registry {
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self {
            configuration,
            clients: RwLock::new(HashMap::new()),
            integrity_task: RwLock::new(None),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn find_client(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients
            .read()
            .ok()
            .and_then(|clients| clients.get(client_id).cloned())
    }

    /// Admits a client. Ids must be envelope-safe (no ':' separator) and
    /// unique.
    pub fn register_client(&self, client: Client) -> Result<Arc<Client>, RegistryError> {
        let id = client.id().to_string();
        if id.is_empty()
            || id.len() > 64
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RegistryError::MalformedClientId(id));
        }

        let client = Arc::new(client);
        let mut clients = match self.clients.write() {
            Ok(clients) => clients,
            Err(poisoned) => poisoned.into_inner(),
        };
        if clients.contains_key(&id) {
            return Err(RegistryError::DuplicateClient(id));
        }
        debug!(client_id = %id, "client registered");
        clients.insert(id, Arc::clone(&client));
        Ok(client)
    }

    pub fn remove_client(&self, client_id: &str) -> bool {
        match self.clients.write() {
            Ok(mut clients) => clients.remove(client_id).is_some(),
            Err(_) => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Evicts every client that is no longer alive at `now`. Called by the
    /// integrity task.
    pub(crate) fn sweep_dead_clients(&self, now: u64) -> usize {
        let mut clients = match self.clients.write() {
            Ok(clients) => clients,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = clients.len();
        clients.retain(|_, client| client.is_alive(now));
        before - clients.len()
    }

    pub fn client_integrity_task(&self) -> Option<Arc<ClientIntegrityTask>> {
        self.integrity_task.read().ok().and_then(|task| task.clone())
    }

    pub fn set_client_integrity_task(&self, task: Arc<ClientIntegrityTask>) {
        if let Ok(mut slot) = self.integrity_task.write() {
            *slot = Some(task);
        }
    }
}
