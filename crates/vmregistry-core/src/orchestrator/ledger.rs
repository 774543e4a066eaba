//! Step names and the committed-resources ledger
//!
//! Lifecycle sequences do not roll back. Instead every resource change is
//! recorded as a [`Commit`] as soon as the backend confirms it, and the
//! list travels with any error so operators can reconcile by hand.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A stage of a lifecycle sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ProvisionStorage,
    AllocateAddress,
    RenderTemplate,
    DefineDomain,
    StartDomain,
    RegisterDns,
    LookupDomain,
    ReadDescription,
    RemoveDns,
    StopDomain,
    UndefineDomain,
    RemoveVolume,
    ListInventory,
    FindInventory,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ProvisionStorage => "provision_storage",
            Step::AllocateAddress => "allocate_address",
            Step::RenderTemplate => "render_template",
            Step::DefineDomain => "define_domain",
            Step::StartDomain => "start_domain",
            Step::RegisterDns => "register_dns",
            Step::LookupDomain => "lookup_domain",
            Step::ReadDescription => "read_description",
            Step::RemoveDns => "remove_dns",
            Step::StopDomain => "stop_domain",
            Step::UndefineDomain => "undefine_domain",
            Step::RemoveVolume => "remove_volume",
            Step::ListInventory => "list_inventory",
            Step::FindInventory => "find_inventory",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource change already applied to a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Commit {
    VolumeCreated { volume: String },
    ImageCloned { source: String, volume: String },
    DomainDefined { domain: String },
    DomainStarted { domain: String },
    RecordUpserted { fqdn: String, ip: String },
    RecordDeleted { fqdn: String },
    DomainStopped { domain: String },
    DomainUndefined { domain: String },
    VolumeRemoved { volume: String },
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Commit::VolumeCreated { volume } => write!(f, "volume {} created", volume),
            Commit::ImageCloned { source, volume } => {
                write!(f, "image {} cloned onto {}", source, volume)
            }
            Commit::DomainDefined { domain } => write!(f, "domain {} defined", domain),
            Commit::DomainStarted { domain } => write!(f, "domain {} started", domain),
            Commit::RecordUpserted { fqdn, ip } => write!(f, "record {} A {} registered", fqdn, ip),
            Commit::RecordDeleted { fqdn } => write!(f, "record {} deleted", fqdn),
            Commit::DomainStopped { domain } => write!(f, "domain {} stopped", domain),
            Commit::DomainUndefined { domain } => write!(f, "domain {} undefined", domain),
            Commit::VolumeRemoved { volume } => write!(f, "volume {} removed", volume),
        }
    }
}

/// `Display` adapter for a commit list, for log fields
pub(crate) struct Committed<'a>(pub &'a [Commit]);

impl fmt::Display for Committed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        for (i, commit) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", commit)?;
        }
        Ok(())
    }
}

/// Per-sequence bookkeeping: cancellation checks, commits, failure wrapping
pub(crate) struct Ledger<'a> {
    operation: &'static str,
    vm: &'a str,
    cancel: &'a CancellationToken,
    committed: Vec<Commit>,
}

impl<'a> Ledger<'a> {
    pub(crate) fn new(operation: &'static str, vm: &'a str, cancel: &'a CancellationToken) -> Self {
        Self {
            operation,
            vm,
            cancel,
            committed: Vec::new(),
        }
    }

    /// Refuse to start `step` if the caller has cancelled
    pub(crate) fn begin(&self, step: Step) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            let err = Error::Cancelled {
                step,
                committed: self.committed.clone(),
            };
            self.report(step, &err);
            return Err(err);
        }
        debug!(operation = self.operation, vm = self.vm, step = %step, "Starting step");
        Ok(())
    }

    pub(crate) fn commit(&mut self, commit: Commit) {
        debug!(operation = self.operation, vm = self.vm, commit = %commit, "Committed");
        self.committed.push(commit);
    }

    pub(crate) fn committed(&self) -> &[Commit] {
        &self.committed
    }

    /// Wrap a backend failure at `step` in its step error and log it
    ///
    /// Steps without a dedicated error variant pass `source` through.
    pub(crate) fn fail(&self, step: Step, source: Error) -> Error {
        let name = self.vm.to_string();
        let committed = self.committed.clone();
        let source = Box::new(source);

        let err = match step {
            Step::ProvisionStorage => Error::StorageProvisioningFailed {
                name,
                committed,
                source,
            },
            Step::DefineDomain | Step::StartDomain => Error::DomainCreationFailed {
                name,
                committed,
                source,
            },
            Step::RegisterDns | Step::RemoveDns => Error::DnsUpdateFailed {
                name,
                committed,
                source,
            },
            Step::UndefineDomain => Error::DomainRemovalFailed {
                name,
                committed,
                source,
            },
            Step::RemoveVolume => Error::StorageRemovalFailed {
                name,
                committed,
                source,
            },
            _ => *source,
        };

        self.report(step, &err);
        err
    }

    /// Log an aborted sequence with what it left behind
    pub(crate) fn report(&self, step: Step, err: &Error) {
        error!(
            operation = self.operation,
            vm = self.vm,
            step = %step,
            committed = %Committed(&self.committed),
            error = %err,
            "Sequence aborted"
        );
    }
}
