//! Leader election using Kubernetes Leases
//!
//! Only the leader drives cluster state. Leadership is tried once at startup
//! and then kept up to date by a background task: the leader renews its
//! lease, a follower keeps retrying and takes over once the lease expires.
//!
//! Updates carry the lease's resourceVersion, so two instances racing for an
//! expired lease cannot both win; the loser sees 409 Conflict.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::MANAGER;
use crate::metrics;
use crate::{Error, Result};

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Name of the lease guarding `app_name`
pub fn lease_name(app_name: &str) -> String {
    format!("{}-operator-leader", app_name)
}

/// Live view of this instance's leadership
#[derive(Debug, Clone, Default)]
pub struct LeaderFlag(Arc<AtomicBool>);

impl LeaderFlag {
    /// Flag that never changes, for single-instance runs and tests
    pub fn fixed(is_leader: bool) -> Self {
        Self(Arc::new(AtomicBool::new(is_leader)))
    }

    pub fn is_leader(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, is_leader: bool) {
        let was = self.0.swap(is_leader, Ordering::SeqCst);
        if was != is_leader {
            metrics::record_leader(is_leader);
        }
    }
}

/// Leader elector using Kubernetes Leases
pub struct LeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    retry_interval: Duration,
    flag: LeaderFlag,
}

impl LeaderElector {
    /// Create an elector with default timing (30s lease, 10s renew, 5s retry)
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            lease_duration: LEASE_DURATION,
            renew_interval: RENEW_INTERVAL,
            retry_interval: RETRY_INTERVAL,
            flag: LeaderFlag::default(),
        }
    }

    /// Try for the lease once, then keep leadership current in the background
    ///
    /// The background task stops on `cancel` and releases the lease if held.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) -> (LeaderFlag, JoinHandle<()>) {
        metrics::record_leader(false);
        self.step().await;

        let flag = self.flag.clone();
        let elector = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            elector.run(cancel).await;
        });

        (flag, handle)
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            let wait = if self.flag.is_leader() {
                self.renew_interval
            } else {
                self.retry_interval
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => self.step().await,
            }
        }

        if self.flag.is_leader() {
            if let Err(e) = self.release_lease().await {
                warn!(identity = %self.identity, error = %e, "Failed to release lease");
            }
            self.flag.set(false);
        }
    }

    /// One acquire-or-renew round, updating the flag
    async fn step(&self) {
        let was_leader = self.flag.is_leader();
        match self.try_acquire_or_renew().await {
            Ok(true) => {
                if !was_leader {
                    info!(identity = %self.identity, lease = %self.lease_name, "Leadership acquired");
                }
                self.flag.set(true);
            }
            Ok(false) => {
                if was_leader {
                    warn!(identity = %self.identity, "Leadership lost");
                } else {
                    debug!(identity = %self.identity, "Lease held by another instance");
                }
                self.flag.set(false);
            }
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "Lease update failed");
                // A leader that cannot renew must assume the lease is gone
                self.flag.set(false);
            }
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let existing = match api.get(&self.lease_name).await {
            Ok(lease) => Some(lease),
            Err(kube::Error::Api(e)) if e.code == 404 => None,
            Err(e) => return Err(e.into()),
        };

        let Some(lease) = existing else {
            return self.create_lease(&api, now).await;
        };

        let spec = lease.spec.as_ref();
        let holder = spec.and_then(|s| s.holder_identity.as_ref());
        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);

        if holder == Some(&self.identity) {
            let acquired = spec.and_then(|s| s.acquire_time.clone());
            return self
                .replace_lease(&api, &lease, now, acquired, transitions)
                .await;
        }

        let renew_time = spec.and_then(|s| s.renew_time.as_ref());
        let duration_secs = spec.and_then(|s| s.lease_duration_seconds);
        let is_expired = match (renew_time, duration_secs) {
            (Some(rt), Some(duration)) => now > rt.0 + chrono::Duration::seconds(duration as i64),
            _ => true,
        };

        if is_expired {
            let acquired = self
                .replace_lease(&api, &lease, now, Some(MicroTime(now)), transitions + 1)
                .await?;
            if acquired {
                info!(identity = %self.identity, transitions = transitions + 1, "Took over expired lease");
            }
            Ok(acquired)
        } else {
            Ok(false)
        }
    }

    fn lease_spec(
        &self,
        now: chrono::DateTime<Utc>,
        acquire_time: Option<MicroTime>,
        transitions: i32,
    ) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
            acquire_time,
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    async fn create_lease(&self, api: &Api<Lease>, now: chrono::DateTime<Utc>) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.lease_spec(now, Some(MicroTime(now)), 0)),
        };

        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!(identity = %self.identity, "Created new lease");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Compare-and-swap on the lease's resourceVersion
    async fn replace_lease(
        &self,
        api: &Api<Lease>,
        existing: &Lease,
        now: chrono::DateTime<Utc>,
        acquire_time: Option<MicroTime>,
        transitions: i32,
    ) -> Result<bool> {
        let resource_version = existing
            .metadata
            .resource_version
            .clone()
            .ok_or_else(|| Error::KubeError("Lease missing resourceVersion".to_string()))?;

        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version: Some(resource_version),
                ..Default::default()
            },
            spec: Some(self.lease_spec(now, acquire_time, transitions)),
        };

        match api
            .replace(&self.lease_name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease update conflict");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the holder so another instance can take over without waiting for expiry
    async fn release_lease(&self) -> Result<()> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let past = Utc::now() - chrono::Duration::seconds(60);
        let patch = json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": MicroTime(past)
            }
        });

        api.patch(
            &self.lease_name,
            &PatchParams::apply(MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        info!(identity = %self.identity, "Lease released");
        Ok(())
    }
}
