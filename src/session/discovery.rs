use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{AdapterFault, SessionError};
use crate::hw::CharacteristicInfo;
use crate::protocol::{
    CharacteristicRole, DiscoveryFollowUp, ServiceRole, classify_characteristic, classify_service,
    is_cccd, normalise_uuid,
};

/// Aggregate discovery progress for one peripheral.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display)]
pub enum DiscoveryState {
    #[display("idle")]
    Idle,
    #[display("services_requested")]
    ServicesRequested,
    /// Transient; logged while service identifiers are classified.
    #[display("services_discovered")]
    ServicesDiscovered,
    #[display("characteristics_requested")]
    CharacteristicsRequested,
    #[display("characteristics_discovered")]
    CharacteristicsDiscovered,
    #[display("descriptors_requested")]
    DescriptorsRequested,
    #[display("ready")]
    Ready,
    #[display("failed ({_0})")]
    Failed(DiscoveryFailure),
}

impl DiscoveryState {
    /// Returns whether no further discovery events are accepted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

/// Why discovery stopped before reaching [`DiscoveryState::Ready`].
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display)]
pub enum DiscoveryFailure {
    #[display("{_0}")]
    Adapter(AdapterFault),
    #[display("peripheral disconnected")]
    Disconnected,
    #[display("peripheral exposes no supported services")]
    NoSupportedServices,
}

impl From<&DiscoveryFailure> for SessionError {
    fn from(failure: &DiscoveryFailure) -> Self {
        match failure {
            DiscoveryFailure::Disconnected => Self::Disconnected,
            other => Self::DiscoveryFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Inputs consumed by [`DiscoveryMachine::on_event`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DiscoveryEvent {
    Connected,
    ConnectFailed(AdapterFault),
    ServicesDiscovered(Result<Vec<String>, AdapterFault>),
    CharacteristicsDiscovered {
        service: String,
        result: Result<Vec<CharacteristicInfo>, AdapterFault>,
    },
    DescriptorsDiscovered {
        characteristic: String,
        result: Result<Vec<String>, AdapterFault>,
    },
    NotificationStateChanged {
        characteristic: String,
        result: Result<bool, AdapterFault>,
    },
    Disconnected,
}

/// Adapter requests the machine wants issued next.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DiscoveryAction {
    DiscoverServices,
    DiscoverCharacteristics(String),
    DiscoverDescriptors(String),
    EnableNotifications(String),
}

/// A characteristic bound to a logical role.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicBinding {
    service: ServiceRole,
    characteristic: String,
}

impl CharacteristicBinding {
    /// Returns the role of the owning service.
    #[must_use]
    pub fn service(&self) -> &ServiceRole {
        &self.service
    }

    /// Returns the normalised characteristic UUID.
    #[must_use]
    pub fn characteristic(&self) -> &str {
        &self.characteristic
    }
}

/// At most one binding per logical role.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BindingTable {
    by_role: BTreeMap<CharacteristicRole, CharacteristicBinding>,
}

impl BindingTable {
    /// Returns the binding for a role.
    #[must_use]
    pub fn get(&self, role: CharacteristicRole) -> Option<&CharacteristicBinding> {
        self.by_role.get(&role)
    }

    /// Returns the role bound to a characteristic UUID.
    #[must_use]
    pub fn role_for(&self, characteristic: &str) -> Option<CharacteristicRole> {
        let wanted = normalise_uuid(characteristic);
        self.by_role
            .iter()
            .find(|(_, binding)| binding.characteristic == wanted)
            .map(|(role, _)| *role)
    }

    /// Iterates over bindings in role order.
    pub fn iter(&self) -> impl Iterator<Item = (CharacteristicRole, &CharacteristicBinding)> {
        self.by_role.iter().map(|(role, binding)| (*role, binding))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_role.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_role.is_empty()
    }

    /// Binds a role, replacing any previous binding. Returns `false` when the
    /// identical binding already existed.
    fn bind(&mut self, role: CharacteristicRole, binding: CharacteristicBinding) -> bool {
        match self.by_role.insert(role, binding.clone()) {
            Some(previous) if previous == binding => false,
            Some(previous) => {
                debug!(
                    %role,
                    from = %previous.characteristic,
                    to = %binding.characteristic,
                    "rebinding characteristic role"
                );
                true
            }
            None => true,
        }
    }

    fn unbind(&mut self, role: CharacteristicRole) {
        self.by_role.remove(&role);
    }

    fn clear(&mut self) {
        self.by_role.clear();
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum BranchState {
    CharacteristicsRequested,
    AwaitingFollowUps {
        pending_notify: BTreeSet<String>,
        pending_descriptors: BTreeSet<String>,
    },
    Ready,
}

#[derive(Debug, Clone)]
struct Branch {
    role: ServiceRole,
    state: BranchState,
}

impl Branch {
    fn settle(&mut self) {
        if let BranchState::AwaitingFollowUps {
            pending_notify,
            pending_descriptors,
        } = &self.state
            && pending_notify.is_empty()
            && pending_descriptors.is_empty()
        {
            self.state = BranchState::Ready;
        }
    }
}

/// Ordered discovery for one peripheral.
///
/// Pure: it consumes adapter outcomes and returns the requests to issue next.
/// Sibling service branches progress independently and in any order; the
/// aggregate state is `Ready` only once every explored branch is.
#[derive(Debug, Clone)]
pub struct DiscoveryMachine {
    state: DiscoveryState,
    services: Vec<(String, ServiceRole)>,
    branches: BTreeMap<String, Branch>,
    bindings: BindingTable,
    notify_requested: HashSet<String>,
}

impl Default for DiscoveryMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DiscoveryState::Idle,
            services: Vec::new(),
            branches: BTreeMap::new(),
            bindings: BindingTable::default(),
            notify_requested: HashSet::new(),
        }
    }

    /// Returns the aggregate discovery state.
    #[must_use]
    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    /// Returns the current role bindings.
    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Returns every discovered service with its classified role.
    #[must_use]
    pub fn services(&self) -> &[(String, ServiceRole)] {
        &self.services
    }

    /// Advances the machine with one adapter outcome.
    pub fn on_event(&mut self, event: DiscoveryEvent) -> Vec<DiscoveryAction> {
        if matches!(event, DiscoveryEvent::Disconnected) {
            match self.state {
                DiscoveryState::Failed(_) => {}
                DiscoveryState::Ready => {
                    debug!("ready peripheral disconnected");
                    self.tear_down(DiscoveryFailure::Disconnected);
                }
                _ => self.fail(DiscoveryFailure::Disconnected),
            }
            return Vec::new();
        }
        if self.state.is_terminal() {
            trace!(state = %self.state, ?event, "ignoring discovery event in terminal state");
            return Vec::new();
        }

        match event {
            DiscoveryEvent::Connected => self.on_connected(),
            DiscoveryEvent::ConnectFailed(fault) => {
                self.fail(DiscoveryFailure::Adapter(fault));
                Vec::new()
            }
            DiscoveryEvent::ServicesDiscovered(result) => match result {
                Ok(services) => self.on_services(services),
                Err(fault) => {
                    self.fail(DiscoveryFailure::Adapter(fault));
                    Vec::new()
                }
            },
            DiscoveryEvent::CharacteristicsDiscovered { service, result } => match result {
                Ok(characteristics) => self.on_characteristics(&service, characteristics),
                Err(fault) => {
                    self.fail(DiscoveryFailure::Adapter(fault));
                    Vec::new()
                }
            },
            DiscoveryEvent::DescriptorsDiscovered {
                characteristic,
                result,
            } => {
                match result {
                    Ok(descriptors) => self.on_descriptors(&characteristic, &descriptors),
                    Err(fault) => self.fail(DiscoveryFailure::Adapter(fault)),
                }
                Vec::new()
            }
            DiscoveryEvent::NotificationStateChanged {
                characteristic,
                result,
            } => {
                match result {
                    Ok(_) => self.on_notify_ack(&characteristic),
                    Err(fault) => self.fail(DiscoveryFailure::Adapter(fault)),
                }
                Vec::new()
            }
            DiscoveryEvent::Disconnected => Vec::new(),
        }
    }

    /// Fails discovery and tears down partial bindings.
    pub fn fail(&mut self, failure: DiscoveryFailure) {
        warn!(%failure, from = %self.state, "discovery failed");
        self.tear_down(failure);
    }

    fn tear_down(&mut self, failure: DiscoveryFailure) {
        self.state = DiscoveryState::Failed(failure);
        self.branches.clear();
        self.bindings.clear();
        self.notify_requested.clear();
    }

    fn transition(&mut self, next: DiscoveryState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "discovery state changed");
            self.state = next;
        }
    }

    fn on_connected(&mut self) -> Vec<DiscoveryAction> {
        if self.state != DiscoveryState::Idle {
            trace!(state = %self.state, "duplicate connect acknowledgement");
            return Vec::new();
        }
        self.transition(DiscoveryState::ServicesRequested);
        vec![DiscoveryAction::DiscoverServices]
    }

    fn on_services(&mut self, services: Vec<String>) -> Vec<DiscoveryAction> {
        if self.state != DiscoveryState::ServicesRequested {
            trace!(state = %self.state, "duplicate services callback");
            return Vec::new();
        }
        self.transition(DiscoveryState::ServicesDiscovered);

        let mut actions = Vec::new();
        for service in services {
            let uuid = normalise_uuid(&service);
            if self.services.iter().any(|(known, _)| *known == uuid) {
                continue;
            }
            let role = classify_service(&uuid);
            debug!(service = %uuid, %role, "classified service");
            self.services.push((uuid.clone(), role.clone()));

            if role.is_explored() {
                self.branches.insert(
                    uuid.clone(),
                    Branch {
                        role,
                        state: BranchState::CharacteristicsRequested,
                    },
                );
                actions.push(DiscoveryAction::DiscoverCharacteristics(uuid));
            }
        }

        if self.branches.is_empty() {
            self.fail(DiscoveryFailure::NoSupportedServices);
            return Vec::new();
        }
        self.refresh();
        actions
    }

    fn on_characteristics(
        &mut self,
        service: &str,
        characteristics: Vec<CharacteristicInfo>,
    ) -> Vec<DiscoveryAction> {
        let service = normalise_uuid(service);
        let Some(branch) = self.branches.get_mut(&service) else {
            trace!(%service, "characteristics for unexplored service");
            return Vec::new();
        };
        if branch.state != BranchState::CharacteristicsRequested {
            trace!(%service, "duplicate characteristics callback");
            return Vec::new();
        }

        let mut actions = Vec::new();
        let mut pending_notify = BTreeSet::new();
        let mut pending_descriptors = BTreeSet::new();
        for info in characteristics {
            let uuid = normalise_uuid(info.uuid());
            let Some(role) = classify_characteristic(&branch.role, &uuid) else {
                trace!(characteristic = %uuid, "unrecognised characteristic");
                continue;
            };
            let binding = CharacteristicBinding {
                service: branch.role.clone(),
                characteristic: uuid.clone(),
            };
            if self.bindings.bind(role, binding) {
                debug!(%role, characteristic = %uuid, "bound characteristic");
            }

            match role.follow_up() {
                DiscoveryFollowUp::None => {}
                DiscoveryFollowUp::EnableNotifications => {
                    if self.notify_requested.insert(uuid.clone()) {
                        pending_notify.insert(uuid.clone());
                        actions.push(DiscoveryAction::EnableNotifications(uuid));
                    }
                }
                DiscoveryFollowUp::InspectDescriptors => {
                    pending_descriptors.insert(uuid.clone());
                    actions.push(DiscoveryAction::DiscoverDescriptors(uuid));
                }
            }
        }

        branch.state = BranchState::AwaitingFollowUps {
            pending_notify,
            pending_descriptors,
        };
        branch.settle();
        self.refresh();
        actions
    }

    fn on_descriptors(&mut self, characteristic: &str, descriptors: &[String]) {
        let characteristic = normalise_uuid(characteristic);
        let Some(branch) = self.branches.values_mut().find(|branch| {
            matches!(
                &branch.state,
                BranchState::AwaitingFollowUps { pending_descriptors, .. }
                    if pending_descriptors.contains(&characteristic)
            )
        }) else {
            trace!(%characteristic, "unexpected descriptors callback");
            return;
        };
        if let BranchState::AwaitingFollowUps {
            pending_descriptors,
            ..
        } = &mut branch.state
        {
            pending_descriptors.remove(&characteristic);
        }
        branch.settle();

        if !descriptors.iter().any(|descriptor| is_cccd(descriptor))
            && let Some(role) = self.bindings.role_for(&characteristic)
        {
            warn!(%role, %characteristic, "characteristic lacks a configuration descriptor; unbinding");
            self.bindings.unbind(role);
        }
        self.refresh();
    }

    fn on_notify_ack(&mut self, characteristic: &str) {
        let characteristic = normalise_uuid(characteristic);
        let Some(branch) = self.branches.values_mut().find(|branch| {
            matches!(
                &branch.state,
                BranchState::AwaitingFollowUps { pending_notify, .. }
                    if pending_notify.contains(&characteristic)
            )
        }) else {
            trace!(%characteristic, "unexpected notification acknowledgement");
            return;
        };
        if let BranchState::AwaitingFollowUps { pending_notify, .. } = &mut branch.state {
            pending_notify.remove(&characteristic);
        }
        branch.settle();
        self.refresh();
    }

    fn refresh(&mut self) {
        let branches = || self.branches.values().map(|branch| &branch.state);
        let next = if branches().any(|state| *state == BranchState::CharacteristicsRequested) {
            DiscoveryState::CharacteristicsRequested
        } else if branches().any(|state| {
            matches!(state, BranchState::AwaitingFollowUps { pending_descriptors, .. } if !pending_descriptors.is_empty())
        }) {
            DiscoveryState::DescriptorsRequested
        } else if branches().any(|state| *state != BranchState::Ready) {
            DiscoveryState::CharacteristicsDiscovered
        } else {
            DiscoveryState::Ready
        };
        self.transition(next);
    }
}
