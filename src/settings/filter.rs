use crate::error::Result;
use crate::network::filter::{EndpointFilter, IpTrie, PidSet};
use clap::Args;
use serde::{Deserialize, Serialize};

/// Which processes and remote ranges flow and socket events are reported for.
#[derive(Args, Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FilterSettings {
    /// Process ID to report (repeatable)
    #[arg(long = "pid", value_name = "PID")]
    #[serde(default)]
    pub pids: Vec<u32>,

    /// Process name to resolve to IDs at startup (repeatable)
    #[arg(long = "process", value_name = "NAME")]
    #[serde(default)]
    pub processes: Vec<String>,

    /// Remote address range in CIDR notation (repeatable)
    #[arg(long = "remote", value_name = "CIDR")]
    #[serde(default)]
    pub remotes: Vec<String>,
}

impl FilterSettings {
    pub fn merge(&mut self, cli: &FilterSettings) {
        self.pids.extend(cli.pids.iter().copied());
        self.processes.extend(cli.processes.iter().cloned());
        self.remotes.extend(cli.remotes.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty() && self.processes.is_empty() && self.remotes.is_empty()
    }

    /// Builds the endpoint filter, adding `resolved` process IDs to the
    /// configured ones.
    pub fn build(&self, resolved: impl IntoIterator<Item = u32>) -> Result<EndpointFilter> {
        let pids: PidSet = self.pids.iter().copied().collect();
        pids.extend(resolved);

        let remotes = IpTrie::new();
        for cidr in &self.remotes {
            remotes.insert_cidr(cidr)?;
        }
        Ok(EndpointFilter::new(pids, remotes))
    }
}
