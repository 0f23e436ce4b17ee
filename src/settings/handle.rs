use crate::network::core::HandleConfig;
use crate::network::types::{Layer, OpenFlags};
use clap::Args;
use serde::{Deserialize, Serialize};

fn default_filter() -> String {
    "true".to_string()
}

/// How a handle is opened: filter, layer, priority, flags and queue tuning.
#[derive(Args, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HandleSettings {
    /// Filter expression selecting the traffic to intercept
    #[arg(short, long, default_value = "true")]
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Layer to open the handle at (network, network-forward, flow, socket, reflect)
    #[arg(long, default_value_t = Layer::Network)]
    #[serde(default)]
    pub layer: Layer,

    /// Handle priority, from -30000 to 30000 (higher intercepts first)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    #[serde(default)]
    pub priority: i16,

    /// Copy packets instead of diverting them
    #[arg(long)]
    #[serde(default)]
    pub sniff: bool,

    /// Silently drop matching packets
    #[arg(long)]
    #[serde(default)]
    pub drop: bool,

    #[arg(long)]
    #[serde(default)]
    pub recv_only: bool,

    #[arg(long)]
    #[serde(default)]
    pub send_only: bool,

    /// Also capture IP fragments
    #[arg(long)]
    #[serde(default)]
    pub fragments: bool,

    /// Fail instead of installing the driver when it is not loaded
    #[arg(long)]
    #[serde(default)]
    pub no_install: bool,

    /// Maximum packets queued by the driver (32-16384)
    #[arg(long)]
    #[serde(default)]
    pub queue_length: Option<u64>,

    /// Maximum time in milliseconds a packet stays queued (100-16000)
    #[arg(long)]
    #[serde(default)]
    pub queue_time: Option<u64>,

    /// Maximum bytes queued by the driver (65535-33554432)
    #[arg(long)]
    #[serde(default)]
    pub queue_size: Option<u64>,

    /// Ports to keep out of the handle (repeatable)
    #[arg(long = "exclude-port", value_name = "PORT")]
    #[serde(default)]
    pub excluded_ports: Vec<u16>,
}

impl Default for HandleSettings {
    fn default() -> Self {
        HandleSettings {
            filter: default_filter(),
            layer: Layer::Network,
            priority: 0,
            sniff: false,
            drop: false,
            recv_only: false,
            send_only: false,
            fragments: false,
            no_install: false,
            queue_length: None,
            queue_time: None,
            queue_size: None,
            excluded_ports: Vec::new(),
        }
    }
}

impl HandleSettings {
    pub fn flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::empty();
        flags.set(OpenFlags::SNIFF, self.sniff);
        flags.set(OpenFlags::DROP, self.drop);
        flags.set(OpenFlags::RECV_ONLY, self.recv_only);
        flags.set(OpenFlags::SEND_ONLY, self.send_only);
        flags.set(OpenFlags::FRAGMENTS, self.fragments);
        flags.set(OpenFlags::NO_INSTALL, self.no_install);
        flags
    }

    /// Applies values given on the command line over settings from a file.
    /// Only values that differ from the defaults override.
    pub fn merge(&mut self, cli: &HandleSettings) {
        let defaults = HandleSettings::default();
        if cli.filter != defaults.filter {
            self.filter = cli.filter.clone();
        }
        if cli.layer != defaults.layer {
            self.layer = cli.layer;
        }
        if cli.priority != defaults.priority {
            self.priority = cli.priority;
        }
        self.sniff |= cli.sniff;
        self.drop |= cli.drop;
        self.recv_only |= cli.recv_only;
        self.send_only |= cli.send_only;
        self.fragments |= cli.fragments;
        self.no_install |= cli.no_install;
        self.queue_length = cli.queue_length.or(self.queue_length);
        self.queue_time = cli.queue_time.or(self.queue_time);
        self.queue_size = cli.queue_size.or(self.queue_size);
        for port in &cli.excluded_ports {
            if !self.excluded_ports.contains(port) {
                self.excluded_ports.push(*port);
            }
        }
    }

    /// Settings for a handle whose packets are received and sent back: a
    /// packet layer and no sniff, drop or single-direction flags.
    pub fn divert_and_reinject(&mut self) {
        if !self.layer.carries_packets() {
            self.layer = Layer::Network;
        }
        self.sniff = false;
        self.drop = false;
        self.recv_only = false;
        self.send_only = false;
    }

    pub fn to_config(&self) -> HandleConfig {
        let mut config = HandleConfig::with_filter(self.filter.clone())
            .layer(self.layer)
            .priority(self.priority)
            .flags(self.flags())
            .exclude_ports(self.excluded_ports.iter().copied());
        config.queue_length = self.queue_length;
        config.queue_time = self.queue_time;
        config.queue_size = self.queue_size;
        config
    }
}
