//! Common test utilities
//!
//! [`FakeCluster`] stands in for the API server: it assigns names from
//! `generateName`, bumps `resourceVersion` on every write, honours
//! finalizers on delete, and fans every change out to open watches.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]

use async_trait::async_trait;
use compute_domain_controller::device_class::{DeviceClassManager, DeviceClassTemplate};
use compute_domain_controller::error::StoreError;
use compute_domain_controller::manager::ManagerConfig;
use compute_domain_controller::source::{LabelFilter, WatchSource};
use compute_domain_controller::store::ObjectStore;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::resource::v1beta1::DeviceClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use kube_runtime::watcher::{self, Event};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DRIVER: &str = "compute-domain.nvidia.com";
pub const OWNER_LABEL: &str = "resource.nvidia.com/computeDomain";
pub const FINALIZER: &str = "resource.nvidia.com/computeDomain";

type Subscriber = (LabelFilter, mpsc::UnboundedSender<watcher::Result<Event<DeviceClass>>>);

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<String, DeviceClass>,
    next_version: u64,
    next_suffix: u64,
    subscribers: Vec<Subscriber>,
}

impl ClusterState {
    fn bump(&mut self, obj: &mut DeviceClass) {
        self.next_version += 1;
        obj.metadata.resource_version = Some(self.next_version.to_string());
    }

    fn publish(&mut self, before: Option<&DeviceClass>, after: Option<&DeviceClass>) {
        self.subscribers.retain(|(filter, tx)| {
            let event = match (
                after.filter(|o| matches(filter, o)),
                before.filter(|o| matches(filter, o)),
            ) {
                (Some(now), _) => Event::Apply(now.clone()),
                (None, Some(gone)) => Event::Delete(after.unwrap_or(gone).clone()),
                (None, None) => return true,
            };
            tx.unbounded_send(Ok(event)).is_ok()
        });
    }
}

fn matches(filter: &LabelFilter, obj: &DeviceClass) -> bool {
    match filter {
        LabelFilter::Exists(key) => obj.labels().contains_key(key),
        LabelFilter::Equals(key, value) => obj.labels().get(key) == Some(value),
    }
}

/// Current time as a Kubernetes `Time`
pub fn now() -> Time {
    let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(ts)).expect("RFC3339 timestamp")
}

/// In-memory API server for DeviceClass objects
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
    /// When set, watches never deliver their initial snapshot
    withhold_snapshot: AtomicBool,
    /// When set, watches end right after `Init`
    end_watches: AtomicBool,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A cluster whose watches stay open but never finish the initial list
    pub fn unsynced() -> Arc<Self> {
        let cluster = Self::default();
        cluster.withhold_snapshot.store(true, Ordering::SeqCst);
        Arc::new(cluster)
    }

    /// A cluster whose watches end before the initial list completes
    pub fn ending() -> Arc<Self> {
        let cluster = Self::default();
        cluster.end_watches.store(true, Ordering::SeqCst);
        Arc::new(cluster)
    }

    pub fn get(&self, name: &str) -> Option<DeviceClass> {
        self.state.lock().unwrap().objects.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Store an object directly, bypassing the manager
    pub fn insert(&self, mut obj: DeviceClass) {
        let mut state = self.state.lock().unwrap();
        state.bump(&mut obj);
        let before = state.objects.insert(obj.name_any(), obj.clone());
        state.publish(before.as_ref(), Some(&obj));
    }

    /// Remove an object outright, finalizers or not, and tell every watch
    pub fn remove(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(gone) = state.objects.remove(name) {
            state.publish(Some(&gone), None);
        }
    }

    /// Close every open watch stream
    pub fn close_watches(&self) {
        self.state.lock().unwrap().subscribers.clear();
    }

    /// Remove an object without telling any watch, leaving caches stale
    pub fn purge_silently(&self, name: &str) {
        self.state.lock().unwrap().objects.remove(name);
    }

    pub fn store_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

impl WatchSource<DeviceClass> for FakeCluster {
    fn watch(&self, filter: &LabelFilter) -> BoxStream<'static, watcher::Result<Event<DeviceClass>>> {
        let (tx, rx) = mpsc::unbounded();
        if self.end_watches.load(Ordering::SeqCst) {
            let _ = tx.unbounded_send(Ok(Event::Init));
            return rx.boxed();
        }
        if self.withhold_snapshot.load(Ordering::SeqCst) {
            // Keep the sender alive so the stream stays open
            self.state.lock().unwrap().subscribers.push((filter.clone(), tx));
            return rx.boxed();
        }

        let mut state = self.state.lock().unwrap();
        let _ = tx.unbounded_send(Ok(Event::Init));
        for obj in state.objects.values().filter(|o| matches(filter, o)) {
            let _ = tx.unbounded_send(Ok(Event::InitApply(obj.clone())));
        }
        let _ = tx.unbounded_send(Ok(Event::InitDone));
        state.subscribers.push((filter.clone(), tx));
        rx.boxed()
    }
}

#[async_trait]
impl ObjectStore<DeviceClass> for FakeCluster {
    async fn create(&self, obj: &DeviceClass) -> Result<DeviceClass, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let mut obj = obj.clone();
        let name = match (&obj.metadata.name, &obj.metadata.generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => {
                state.next_suffix += 1;
                format!("{prefix}{:05}", state.next_suffix)
            }
            (None, None) => return Err(StoreError::MissingName),
        };
        if state.objects.contains_key(&name) {
            return Err(StoreError::AlreadyExists { name });
        }

        obj.metadata.name = Some(name.clone());
        obj.metadata.uid = Some(format!("dc-uid-{}", state.next_version + 1));
        state.bump(&mut obj);
        state.objects.insert(name, obj.clone());
        state.publish(None, Some(&obj));
        Ok(obj)
    }

    async fn update(&self, obj: &DeviceClass) -> Result<DeviceClass, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let name = obj.metadata.name.clone().ok_or(StoreError::MissingName)?;
        let Some(current) = state.objects.get(&name).cloned() else {
            return Err(StoreError::NotFound { name });
        };
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != current.metadata.resource_version
        {
            return Err(StoreError::Conflict { name });
        }

        let mut obj = obj.clone();
        // deletionTimestamp is owned by the server
        obj.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        state.bump(&mut obj);
        if obj.metadata.deletion_timestamp.is_some() && obj.finalizers().is_empty() {
            state.objects.remove(&name);
            state.publish(Some(&current), None);
            let mut gone = obj.clone();
            gone.metadata.labels = current.metadata.labels.clone();
            return Ok(gone);
        }
        state.objects.insert(name, obj.clone());
        state.publish(Some(&current), Some(&obj));
        Ok(obj)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let Some(current) = state.objects.get(name).cloned() else {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        };

        if current.finalizers().is_empty() {
            state.objects.remove(name);
            state.publish(Some(&current), None);
            return Ok(());
        }
        if current.metadata.deletion_timestamp.is_none() {
            let mut marked = current.clone();
            marked.metadata.deletion_timestamp = Some(now());
            state.bump(&mut marked);
            state.objects.insert(name.to_string(), marked.clone());
            state.publish(Some(&current), Some(&marked));
        }
        Ok(())
    }
}

pub fn manager_config() -> ManagerConfig {
    ManagerConfig {
        owner_label_key: OWNER_LABEL.to_string(),
        finalizer: FINALIZER.to_string(),
        initial_sync_timeout: Duration::from_secs(5),
    }
}

pub fn manager(cluster: &Arc<FakeCluster>) -> DeviceClassManager {
    manager_with(cluster, manager_config())
}

pub fn manager_with(cluster: &Arc<FakeCluster>, config: ManagerConfig) -> DeviceClassManager {
    DeviceClassManager::new(
        config,
        Arc::clone(cluster) as Arc<dyn WatchSource<DeviceClass>>,
        Arc::clone(cluster) as Arc<dyn ObjectStore<DeviceClass>>,
        Arc::new(DeviceClassTemplate::new(DRIVER)),
    )
}

/// A DeviceClass labelled for `owner`, as created by some other writer
pub fn labelled_device_class(name: &str, owner: &str) -> DeviceClass {
    DeviceClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(OWNER_LABEL.to_string(), owner.to_string())])),
            finalizers: Some(vec![FINALIZER.to_string()]),
            ..Default::default()
        },
        spec: Default::default(),
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Run `fut` with a five-second ceiling
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation should complete")
}
