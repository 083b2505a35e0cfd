//! Lab topology: host roles, host specs, and the planner.
//!
//! The topology is ordered and the order is load-bearing: the domain
//! controller and the other infrastructure hosts must be realized before the
//! workstations that join the domain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::errors::TopologyError;

/// Lab subnet for statically addressed hosts (VirtualBox host-only default).
const SUBNET: [u8; 3] = [192, 168, 56];

/// The role a host plays in the lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    /// Central log collection and search host.
    Logger,
    /// Windows domain controller.
    DomainController,
    /// Windows event forwarding host.
    Forwarder,
    /// Domain-joined workstation.
    Workstation,
}

impl HostRole {
    /// Returns true for the three singleton infrastructure roles.
    #[must_use]
    pub const fn is_infrastructure(self) -> bool {
        !matches!(self, Self::Workstation)
    }
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logger => write!(f, "logger"),
            Self::DomainController => write!(f, "domain_controller"),
            Self::Forwarder => write!(f, "forwarder"),
            Self::Workstation => write!(f, "workstation"),
        }
    }
}

/// One host to bring up. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// The environment manager's name for the host.
    pub name: String,
    /// The host's role.
    pub role: HostRole,
    /// Static address on the lab subnet, if the host has one.
    pub static_address: Option<Ipv4Addr>,
}

impl HostSpec {
    /// Creates a new host spec.
    #[must_use]
    pub fn new(name: impl Into<String>, role: HostRole) -> Self {
        Self {
            name: name.into(),
            role,
            static_address: None,
        }
    }

    /// Sets the static address.
    #[must_use]
    pub const fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.static_address = Some(address);
        self
    }
}

/// The ordered list of hosts for a run.
///
/// Invariant: exactly one of each infrastructure role, at least one
/// workstation, and no duplicate names. Enforced on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    hosts: Vec<HostSpec>,
}

impl Topology {
    /// Builds a topology, validating the structural invariants.
    pub fn new(hosts: Vec<HostSpec>) -> Result<Self, TopologyError> {
        let mut role_counts: HashMap<HostRole, usize> = HashMap::new();
        let mut seen = std::collections::HashSet::new();

        for host in &hosts {
            *role_counts.entry(host.role).or_insert(0) += 1;
            if !seen.insert(host.name.clone()) {
                return Err(TopologyError::DuplicateName {
                    name: host.name.clone(),
                });
            }
        }

        for role in [HostRole::Logger, HostRole::DomainController, HostRole::Forwarder] {
            let count = role_counts.get(&role).copied().unwrap_or(0);
            if count != 1 {
                return Err(TopologyError::RoleCardinality {
                    role: role.to_string(),
                    count,
                });
            }
        }

        if role_counts.get(&HostRole::Workstation).copied().unwrap_or(0) == 0 {
            return Err(TopologyError::NoWorkstations);
        }

        Ok(Self { hosts })
    }

    /// The hosts in bring-up order.
    #[must_use]
    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// Number of hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// True when the topology is empty (never for a validated topology).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Number of workstation hosts.
    #[must_use]
    pub fn workstation_count(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| h.role == HostRole::Workstation)
            .count()
    }

    /// Looks up the host with the given role, for singleton roles.
    #[must_use]
    pub fn host_with_role(&self, role: HostRole) -> Option<&HostSpec> {
        self.hosts.iter().find(|h| h.role == role)
    }
}

/// Plans the fixed-plus-variable host list for a run.
///
/// Produces the three infrastructure hosts followed by `workstation_count`
/// workstations named `workstation-0 .. workstation-(n-1)`.
pub fn plan(workstation_count: usize) -> Result<Topology, TopologyError> {
    if workstation_count == 0 {
        return Err(TopologyError::NoWorkstations);
    }

    let mut hosts = vec![
        HostSpec::new("logger", HostRole::Logger)
            .with_address(Ipv4Addr::new(SUBNET[0], SUBNET[1], SUBNET[2], 105)),
        HostSpec::new("dc", HostRole::DomainController)
            .with_address(Ipv4Addr::new(SUBNET[0], SUBNET[1], SUBNET[2], 102)),
        HostSpec::new("wef", HostRole::Forwarder)
            .with_address(Ipv4Addr::new(SUBNET[0], SUBNET[1], SUBNET[2], 103)),
    ];

    for i in 0..workstation_count {
        let octet = u8::try_from(110 + i).map_err(|_| TopologyError::RoleCardinality {
            role: HostRole::Workstation.to_string(),
            count: workstation_count,
        })?;
        hosts.push(
            HostSpec::new(format!("workstation-{i}"), HostRole::Workstation)
                .with_address(Ipv4Addr::new(SUBNET[0], SUBNET[1], SUBNET[2], octet)),
        );
    }

    Topology::new(hosts)
}
