//! Reconciliation driver for the webhook server
//!
//! Lifecycle events are dispatched through a table built once at
//! construction. Every handler funnels into the same reconciliation, which
//! only runs on the leader:
//!
//! Maintenance → resolve image → ensure certificates → render → apply → Active
//!
//! An unresolvable image or invalid ports stop the run with a Blocked or
//! WaitingForResource status before anything is applied.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use super::leader::LeaderFlag;
use super::status::{ControllerStatus, SETTING_DESIRED_STATE};
use crate::adapters::oci_image::ImageResolver;
use crate::adapters::service_builder::get_service_endpoint;
use crate::certs::{self, CertificateStore};
use crate::config::{Identity, PortConfig};
use crate::crd::StaticResources;
use crate::metrics::{
    record_leader, record_status, RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS,
};
use crate::reconcilers::{render, ReconciliationInput, StateApplier};
use crate::{Error, Result};

/// Lifecycle events that trigger a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Install,
    UpgradeCharm,
    ConfigChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Install,
        EventKind::UpgradeCharm,
        EventKind::ConfigChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::UpgradeCharm => "upgrade-charm",
            EventKind::ConfigChanged => "config-changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event together with the configuration current when it fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub kind: EventKind,
    pub ports: PortConfig,
}

impl Trigger {
    pub fn new(kind: EventKind, ports: PortConfig) -> Self {
        Self { kind, ports }
    }
}

/// Event handler stored in the dispatch table
pub type Handler<S, R, A> =
    for<'a> fn(&'a mut Driver<S, R, A>, Trigger) -> BoxFuture<'a, Result<()>>;

/// Drives the webhook server towards its desired state
pub struct Driver<S, R, A> {
    identity: Identity,
    resources: StaticResources,
    store: S,
    resolver: R,
    applier: A,
    leader: LeaderFlag,
    status: ControllerStatus,
    handlers: BTreeMap<EventKind, Handler<S, R, A>>,
}

impl<S, R, A> Driver<S, R, A>
where
    S: CertificateStore + Send + Sync + 'static,
    R: ImageResolver + Send + Sync + 'static,
    A: StateApplier + Send + Sync + 'static,
{
    /// Wire up a driver; the certificate store is not touched until the first event
    pub fn new(
        identity: Identity,
        resources: StaticResources,
        store: S,
        resolver: R,
        applier: A,
        leader: LeaderFlag,
    ) -> Self {
        let mut handlers: BTreeMap<EventKind, Handler<S, R, A>> = BTreeMap::new();
        handlers.insert(EventKind::Install, set_desired_state::<S, R, A>);
        handlers.insert(EventKind::UpgradeCharm, set_desired_state::<S, R, A>);
        handlers.insert(EventKind::ConfigChanged, set_desired_state::<S, R, A>);

        let status = ControllerStatus::Active;
        record_status(status.label());

        Self {
            identity,
            resources,
            store,
            resolver,
            applier,
            leader,
            status,
            handlers,
        }
    }

    pub fn status(&self) -> &ControllerStatus {
        &self.status
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    pub fn is_leader(&self) -> bool {
        self.leader.is_leader()
    }

    /// Run the handler registered for the trigger's event
    pub async fn dispatch(&mut self, trigger: Trigger) -> Result<()> {
        let kind = trigger.kind.as_str();
        let handler = *self.handlers.get(&trigger.kind).ok_or_else(|| {
            Error::ValidationError(format!("No handler registered for {}", kind))
        })?;

        let result = handler(self, trigger).await;
        if let Err(e) = &result {
            error!("Failed to handle {}: {}", kind, e);
        }
        result
    }

    fn set_status(&mut self, status: ControllerStatus) {
        if status != self.status {
            info!("Status: {}", status);
        }
        record_status(status.label());
        self.status = status;
    }

    #[instrument(skip_all, fields(event = %trigger.kind, app = %self.identity.app_name, namespace = %self.identity.namespace))]
    async fn reconcile(&mut self, trigger: Trigger) -> Result<()> {
        let is_leader = self.leader.is_leader();
        record_leader(is_leader);
        if !is_leader {
            info!("Not the leader, skipping");
            return Ok(());
        }

        let kind = trigger.kind.as_str();
        let start = std::time::Instant::now();
        RECONCILIATIONS.with_label_values(&[kind]).inc();

        let result = self.converge(trigger).await;

        let duration = start.elapsed().as_secs_f64();
        RECONCILE_DURATION.with_label_values(&[kind]).observe(duration);

        if result.is_err() {
            RECONCILIATION_ERRORS.with_label_values(&[kind]).inc();
        } else {
            debug!("Reconciled in {:.2}s: {}", duration, self.status);
        }
        result
    }

    async fn converge(&mut self, trigger: Trigger) -> Result<()> {
        self.set_status(ControllerStatus::Maintenance(
            SETTING_DESIRED_STATE.to_string(),
        ));

        if let Err(e) = trigger.ports.validate() {
            warn!("Invalid configuration: {}", e);
            self.set_status(ControllerStatus::Blocked(e.to_string()));
            return Ok(());
        }

        let image = match self.resolver.fetch() {
            Ok(image) => image,
            Err(e) => {
                warn!("Image not resolved: {}", e);
                self.set_status(ControllerStatus::from(&e));
                return Ok(());
            }
        };

        let Identity {
            namespace,
            app_name,
        } = &self.identity;
        let cert_bundle = certs::ensure(&self.store, || certs::generate(app_name, namespace))?;

        let input = ReconciliationInput {
            namespace: namespace.clone(),
            app_name: app_name.clone(),
            image,
            metrics_port: trigger.ports.metrics_port,
            webhook_port: trigger.ports.webhook_port,
            cert_bundle,
        };
        let state = render(&input, &self.resources)?;

        self.applier.apply(&state).await?;

        for endpoint in state.services.iter().filter_map(get_service_endpoint) {
            info!("Webhook server reachable at {}", endpoint);
        }

        self.set_status(ControllerStatus::Active);
        Ok(())
    }
}

/// Shared handler for every lifecycle event
fn set_desired_state<S, R, A>(driver: &mut Driver<S, R, A>, trigger: Trigger) -> BoxFuture<'_, Result<()>>
where
    S: CertificateStore + Send + Sync + 'static,
    R: ImageResolver + Send + Sync + 'static,
    A: StateApplier + Send + Sync + 'static,
{
    driver.reconcile(trigger).boxed()
}
