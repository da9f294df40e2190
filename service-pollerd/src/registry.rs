use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use shared::types::{NewService, ServiceRecord, ServiceStatus};
use crate::error::{RegistryError, RegistryResult};
use crate::store::{db::RecordStore, hash};

/// Commands sent to the registry thread
pub enum RegistryCommand {
    FindAll(oneshot::Sender<RegistryResult<Vec<ServiceRecord>>>),
    FindByName(String, oneshot::Sender<RegistryResult<Option<ServiceRecord>>>),
    Create(NewService, oneshot::Sender<RegistryResult<ServiceRecord>>),
    SetStatus {
        name: String,
        status: ServiceStatus,
        reply: oneshot::Sender<RegistryResult<()>>,
    },
    Update {
        name: String,
        service: NewService,
        reply: oneshot::Sender<RegistryResult<ServiceRecord>>,
    },
    Delete(String, oneshot::Sender<RegistryResult<()>>),
    Shutdown,
}

/// Business rules over the record store. Every check-then-write sequence
/// runs to completion before the next command is taken, so a name cannot be
/// claimed twice between the existence check and the insert.
pub struct Registry {
    store: RecordStore,
    digest_tx: watch::Sender<String>,
}

impl Registry {
    pub fn new(store: RecordStore, digest_tx: watch::Sender<String>) -> Self {
        Self { store, digest_tx }
    }

    pub fn find_all(&self) -> RegistryResult<Vec<ServiceRecord>> {
        Ok(self.store.get_all()?)
    }

    pub fn find_by_name(&self, name: &str) -> RegistryResult<Option<ServiceRecord>> {
        Ok(self.store.get(name)?)
    }

    pub fn create_one(&self, service: NewService) -> RegistryResult<ServiceRecord> {
        ensure_complete(&service)?;

        if self.store.get(&service.name)?.is_some() {
            return Err(RegistryError::DuplicateName(service.name));
        }

        let record = self.store.insert(&service)?;
        self.publish_digest();
        tracing::info!("Registered service {} ({})", record.name, record.url);
        Ok(record)
    }

    pub fn set_status(&self, name: &str, status: ServiceStatus) -> RegistryResult<()> {
        let current = self
            .store
            .get(name)?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if !current.status.can_transition_to(status) {
            return Err(RegistryError::Invalid(format!(
                "status of {} cannot move from {} to {}",
                name, current.status, status
            )));
        }

        if self.store.set_status(name, status)? == 0 {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        if current.status != status {
            tracing::info!("Service {} is now {} (was {})", name, status, current.status);
            self.publish_digest();
        }
        Ok(())
    }

    /// Full replace of name and url. The status goes back to `UNKNOWN`
    /// because the old probe result says nothing about the new target.
    pub fn update(&self, name: &str, service: NewService) -> RegistryResult<ServiceRecord> {
        ensure_complete(&service)?;

        if self.store.get(name)?.is_none() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if service.name != name && self.store.get(&service.name)?.is_some() {
            return Err(RegistryError::DuplicateName(service.name));
        }

        if self.store.replace(name, &service)? == 0 {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        let record = self
            .store
            .get(&service.name)?
            .ok_or_else(|| RegistryError::NotFound(service.name.clone()))?;

        self.publish_digest();
        tracing::info!("Updated service {} -> {} ({})", name, record.name, record.url);
        Ok(record)
    }

    pub fn delete_by_name(&self, name: &str) -> RegistryResult<()> {
        if self.store.get(name)?.is_none() {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        if self.store.delete(name)? == 0 {
            return Err(RegistryError::NotFound(name.to_string()));
        }

        self.publish_digest();
        tracing::info!("Removed service {}", name);
        Ok(())
    }

    fn publish_digest(&self) {
        match self.store.get_all() {
            Ok(records) => {
                self.digest_tx.send_replace(hash::compute_digest(&records));
            }
            Err(e) => tracing::warn!("Failed to recompute watch-list digest: {}", e),
        }
    }
}

fn ensure_complete(service: &NewService) -> RegistryResult<()> {
    if service.name.trim().is_empty() || service.url.trim().is_empty() {
        return Err(RegistryError::Invalid("url and name are mandatory".to_string()));
    }
    Ok(())
}

/// Handle to interact with the registry thread
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
    digest_rx: watch::Receiver<String>,
}

impl RegistryHandle {
    /// Spawn the registry thread that owns the store connection
    pub fn spawn(registry: Registry) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);
        let digest_rx = registry.digest_tx.subscribe();

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::FindAll(reply) => {
                        let _ = reply.send(registry.find_all());
                    }
                    RegistryCommand::FindByName(name, reply) => {
                        let _ = reply.send(registry.find_by_name(&name));
                    }
                    RegistryCommand::Create(service, reply) => {
                        let _ = reply.send(registry.create_one(service));
                    }
                    RegistryCommand::SetStatus { name, status, reply } => {
                        let _ = reply.send(registry.set_status(&name, status));
                    }
                    RegistryCommand::Update { name, service, reply } => {
                        let _ = reply.send(registry.update(&name, service));
                    }
                    RegistryCommand::Delete(name, reply) => {
                        let _ = reply.send(registry.delete_by_name(&name));
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx, digest_rx }
    }

    /// Receiver for the watch-list digest, updated after every mutation
    pub fn subscribe_digest(&self) -> watch::Receiver<String> {
        self.digest_rx.clone()
    }

    pub async fn find_all(&self) -> RegistryResult<Vec<ServiceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::FindAll(reply)).await?;
        rx.await?
    }

    pub async fn find_by_name(&self, name: impl Into<String>) -> RegistryResult<Option<ServiceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::FindByName(name.into(), reply)).await?;
        rx.await?
    }

    /// Insert a new service with status `UNKNOWN`. Fails with
    /// `DuplicateName` if the name is taken.
    pub async fn create_one(&self, service: NewService) -> RegistryResult<ServiceRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Create(service, reply)).await?;
        rx.await?
    }

    pub async fn set_status(&self, name: impl Into<String>, status: ServiceStatus) -> RegistryResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::SetStatus {
            name: name.into(),
            status,
            reply,
        }).await?;
        rx.await?
    }

    pub async fn update(&self, name: impl Into<String>, service: NewService) -> RegistryResult<ServiceRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Update {
            name: name.into(),
            service,
            reply,
        }).await?;
        rx.await?
    }

    pub async fn delete_by_name(&self, name: impl Into<String>) -> RegistryResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Delete(name.into(), reply)).await?;
        rx.await?
    }

    /// Stop the registry thread
    pub async fn shutdown(&self) -> RegistryResult<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn spawn_in_memory() -> RegistryHandle {
        let store = RecordStore::open(":memory:").unwrap();
        let (digest_tx, _) = watch::channel(hash::compute_digest(&[]));
        RegistryHandle::spawn(Registry::new(store, digest_tx))
    }

    pub(crate) fn service(name: &str, url: &str) -> NewService {
        NewService {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let registry = spawn_in_memory();

        registry.create_one(service("svc1", "https://example.com")).await.unwrap();

        let all = registry.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "svc1");
        assert_eq!(all[0].status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let registry = spawn_in_memory();

        registry.create_one(service("svc1", "https://example.com")).await.unwrap();
        let err = registry.create_one(service("svc1", "https://example.com")).await.unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "svc1"));
        assert_eq!(registry.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_claim_a_name_once() {
        let registry = spawn_in_memory();

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .create_one(service("shared", &format!("https://host{}.example.com", i)))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        let mut duplicates = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(RegistryError::DuplicateName(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(duplicates, 15);
        assert_eq!(registry.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_service_never_persisted() {
        let registry = spawn_in_memory();

        let err = registry.create_one(service("", "https://example.com")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
        let err = registry.create_one(service("svc1", " ")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));

        assert!(registry.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_resets_status() {
        let registry = spawn_in_memory();
        let created = registry.create_one(service("svc1", "https://example.com")).await.unwrap();
        registry.set_status("svc1", ServiceStatus::Ok).await.unwrap();

        let updated = registry
            .update("svc1", service("svc1", "https://example.org"))
            .await
            .unwrap();

        assert_eq!(updated.status, ServiceStatus::Unknown);
        assert_eq!(updated.url, "https://example.org");
        assert_eq!(updated.created_at, created.created_at);

        let stored = registry.find_by_name("svc1").await.unwrap().unwrap();
        assert_eq!(stored.status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_update_renames() {
        let registry = spawn_in_memory();
        registry.create_one(service("svc1", "https://example.com")).await.unwrap();

        registry
            .update("svc1", service("svc2", "https://other.com"))
            .await
            .unwrap();

        assert!(registry.find_by_name("svc1").await.unwrap().is_none());
        let renamed = registry.find_by_name("svc2").await.unwrap().unwrap();
        assert_eq!(renamed.status, ServiceStatus::Unknown);
        assert_eq!(renamed.url, "https://other.com");
    }

    #[tokio::test]
    async fn test_rename_onto_taken_name_writes_nothing() {
        let registry = spawn_in_memory();
        registry.create_one(service("svc1", "https://example.com")).await.unwrap();
        registry.create_one(service("svc2", "https://other.com")).await.unwrap();
        registry.set_status("svc1", ServiceStatus::Ok).await.unwrap();
        let before = registry.find_all().await.unwrap();

        let err = registry
            .update("svc1", service("svc2", "https://third.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateName(_)));
        assert_eq!(registry.find_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_target_leaves_store_unchanged() {
        let registry = spawn_in_memory();
        registry.create_one(service("svc1", "https://example.com")).await.unwrap();
        let before = registry.find_all().await.unwrap();

        let err = registry.set_status("ghost", ServiceStatus::Ok).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        let err = registry
            .update("ghost", service("ghost", "https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        let err = registry.delete_by_name("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        assert_eq!(registry.find_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_set_status_cannot_reset_to_unknown() {
        let registry = spawn_in_memory();
        registry.create_one(service("svc1", "https://example.com")).await.unwrap();
        registry.set_status("svc1", ServiceStatus::Fail).await.unwrap();

        let err = registry.set_status("svc1", ServiceStatus::Unknown).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));

        let stored = registry.find_by_name("svc1").await.unwrap().unwrap();
        assert_eq!(stored.status, ServiceStatus::Fail);
    }

    #[tokio::test]
    async fn test_delete() {
        let registry = spawn_in_memory();
        registry.create_one(service("svc1", "https://example.com")).await.unwrap();

        registry.delete_by_name("svc1").await.unwrap();
        assert!(registry.find_by_name("svc1").await.unwrap().is_none());
        assert!(registry.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_all_is_idempotent() {
        let registry = spawn_in_memory();
        registry.create_one(service("b", "https://b.example.com")).await.unwrap();
        registry.create_one(service("a", "https://a.example.com")).await.unwrap();

        let first = registry.find_all().await.unwrap();
        let second = registry.find_all().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_digest_follows_mutations() {
        let registry = spawn_in_memory();
        let digest_rx = registry.subscribe_digest();
        let empty = digest_rx.borrow().clone();

        registry.create_one(service("svc1", "https://example.com")).await.unwrap();
        let after_create = digest_rx.borrow().clone();
        assert_ne!(empty, after_create);

        registry.find_all().await.unwrap();
        assert_eq!(*digest_rx.borrow(), after_create);

        registry.set_status("svc1", ServiceStatus::Ok).await.unwrap();
        let after_status = digest_rx.borrow().clone();
        assert_ne!(after_create, after_status);

        registry.delete_by_name("svc1").await.unwrap();
        assert_eq!(*digest_rx.borrow(), empty);
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_report_closed() {
        let registry = spawn_in_memory();
        registry.shutdown().await.unwrap();

        let err = registry.find_all().await.unwrap_err();
        assert!(matches!(err, RegistryError::Closed));
    }
}
