use crate::error::{DivertError, Result};
use crate::network::filter::validate_filter;
use crate::network::types::param::{PRIORITY_DEFAULT, PRIORITY_HIGHEST, PRIORITY_LOWEST};
use crate::network::types::{Layer, OpenFlags, Param};

/// Configuration for opening a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleConfig {
    /// Filter expression for packet matching
    pub filter: String,
    /// Layer the handle intercepts at
    pub layer: Layer,
    /// Priority for the handle (higher = earlier interception)
    pub priority: i16,
    pub flags: OpenFlags,
    /// Queue parameters applied after open; `None` keeps the driver default
    pub queue_length: Option<u64>,
    pub queue_time: Option<u64>,
    pub queue_size: Option<u64>,
    /// Ports whose traffic is kept out of the handle
    pub excluded_ports: Vec<u16>,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            filter: "true".to_string(),
            layer: Layer::Network,
            priority: PRIORITY_DEFAULT,
            flags: OpenFlags::empty(),
            queue_length: None,
            queue_time: None,
            queue_size: None,
            excluded_ports: Vec::new(),
        }
    }
}

impl HandleConfig {
    /// Creates a new HandleConfig with the given filter.
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Default::default()
        }
    }

    /// A sniffing, receive-only Flow layer configuration.
    pub fn flow(filter: impl Into<String>) -> Self {
        Self::with_filter(filter)
            .layer(Layer::Flow)
            .flags(OpenFlags::SNIFF | OpenFlags::RECV_ONLY)
    }

    /// A receive-only Socket layer configuration.
    pub fn socket(filter: impl Into<String>) -> Self {
        Self::with_filter(filter)
            .layer(Layer::Socket)
            .flags(OpenFlags::SNIFF | OpenFlags::RECV_ONLY)
    }

    /// A sniffing, receive-only Reflect layer configuration.
    pub fn reflect(filter: impl Into<String>) -> Self {
        Self::with_filter(filter)
            .layer(Layer::Reflect)
            .flags(OpenFlags::SNIFF | OpenFlags::RECV_ONLY)
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    /// Sets the priority for the handle.
    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn sniff(mut self) -> Self {
        self.flags |= OpenFlags::SNIFF;
        self
    }

    /// Sets whether the handle should be receive-only.
    pub fn recv_only(mut self, recv_only: bool) -> Self {
        self.flags.set(OpenFlags::RECV_ONLY, recv_only);
        self
    }

    pub fn send_only(mut self, send_only: bool) -> Self {
        self.flags.set(OpenFlags::SEND_ONLY, send_only);
        self
    }

    pub fn queue_length(mut self, packets: u64) -> Self {
        self.queue_length = Some(packets);
        self
    }

    pub fn queue_time(mut self, millis: u64) -> Self {
        self.queue_time = Some(millis);
        self
    }

    pub fn queue_size(mut self, bytes: u64) -> Self {
        self.queue_size = Some(bytes);
        self
    }

    /// Keeps traffic on `port` out of the handle.
    pub fn exclude_port(mut self, port: u16) -> Self {
        if !self.excluded_ports.contains(&port) {
            self.excluded_ports.push(port);
        }
        self
    }

    pub fn exclude_ports(self, ports: impl IntoIterator<Item = u16>) -> Self {
        ports.into_iter().fold(self, |config, port| config.exclude_port(port))
    }

    /// Builds the final filter string with any exclusions applied.
    pub fn build_filter(&self) -> String {
        if self.excluded_ports.is_empty() {
            return self.filter.trim().to_string();
        }

        // localPort/remotePort work for both TCP and UDP
        let exclusion = self
            .excluded_ports
            .iter()
            .map(|port| format!("localPort != {0} and remotePort != {0}", port))
            .collect::<Vec<_>>()
            .join(" and ");

        let filter = self.filter.trim();
        if filter.is_empty() || filter == "true" {
            return exclusion;
        }

        format!("({}) and {}", filter, exclusion)
    }

    /// Queue parameters to apply after the handle is opened.
    pub fn queue_params(&self) -> Vec<(Param, u64)> {
        [
            (Param::QueueLength, self.queue_length),
            (Param::QueueTime, self.queue_time),
            (Param::QueueSize, self.queue_size),
        ]
        .into_iter()
        .filter_map(|(param, value)| value.map(|v| (param, v)))
        .collect()
    }

    /// Rejects configurations the driver would refuse or that cannot work.
    pub fn validate(&self) -> Result<()> {
        validate_filter(&self.filter)?;

        if self.flags.contains(OpenFlags::RECV_ONLY | OpenFlags::SEND_ONLY) {
            return Err(DivertError::InvalidConfig(
                "recv-only and send-only are mutually exclusive".into(),
            ));
        }
        if self.flags.contains(OpenFlags::SNIFF | OpenFlags::DROP) {
            return Err(DivertError::InvalidConfig(
                "sniff and drop are mutually exclusive".into(),
            ));
        }

        let required = match self.layer {
            Layer::Flow | Layer::Reflect => OpenFlags::SNIFF | OpenFlags::RECV_ONLY,
            Layer::Socket => OpenFlags::RECV_ONLY,
            Layer::Network | Layer::NetworkForward => OpenFlags::empty(),
        };
        if !self.flags.contains(required) {
            return Err(DivertError::InvalidConfig(format!(
                "the {} layer requires flags {:?}",
                self.layer, required
            )));
        }

        if !(PRIORITY_LOWEST..=PRIORITY_HIGHEST).contains(&self.priority) {
            return Err(DivertError::InvalidConfig(format!(
                "priority {} outside [{}, {}]",
                self.priority, PRIORITY_LOWEST, PRIORITY_HIGHEST
            )));
        }

        for (param, value) in self.queue_params() {
            param.validate(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_config_default() {
        let config = HandleConfig::default();
        assert_eq!(config.filter, "true");
        assert_eq!(config.layer, Layer::Network);
        assert_eq!(config.priority, PRIORITY_DEFAULT);
        assert!(config.flags.is_empty());
        assert!(config.excluded_ports.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_handle_config_builder() {
        let config = HandleConfig::with_filter("tcp")
            .priority(100)
            .sniff()
            .recv_only(true)
            .queue_length(2048)
            .queue_time(1024);

        assert_eq!(config.filter, "tcp");
        assert_eq!(config.priority, 100);
        assert_eq!(config.flags, OpenFlags::SNIFF | OpenFlags::RECV_ONLY);
        assert_eq!(
            config.queue_params(),
            vec![(Param::QueueLength, 2048), (Param::QueueTime, 1024)]
        );
        assert!(config.validate().is_ok());

        let config = config.recv_only(false);
        assert_eq!(config.flags, OpenFlags::SNIFF);
    }

    #[test]
    fn test_build_filter_with_exclusions() {
        let config = HandleConfig::with_filter("tcp.DstPort == 80").exclude_ports([1420, 1420, 22]);
        assert_eq!(
            config.build_filter(),
            "(tcp.DstPort == 80) and localPort != 1420 and remotePort != 1420 \
             and localPort != 22 and remotePort != 22"
        );
    }

    #[test]
    fn test_build_filter_exclusion_replaces_true() {
        let config = HandleConfig::default().exclude_port(1420);
        assert_eq!(
            config.build_filter(),
            "localPort != 1420 and remotePort != 1420"
        );
    }

    #[test]
    fn test_build_filter_without_exclusions() {
        assert_eq!(HandleConfig::with_filter(" tcp ").build_filter(), "tcp");
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let config = HandleConfig::default().recv_only(true).send_only(true);
        assert!(matches!(config.validate(), Err(DivertError::InvalidConfig(_))));

        let config = HandleConfig::default().flags(OpenFlags::SNIFF | OpenFlags::DROP);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layer_flag_requirements() {
        assert!(HandleConfig::flow("true").validate().is_ok());
        assert!(HandleConfig::socket("true").validate().is_ok());
        assert!(HandleConfig::reflect("true").validate().is_ok());
        assert!(HandleConfig::with_filter("true")
            .layer(Layer::Flow)
            .sniff()
            .validate()
            .is_err());
        assert!(HandleConfig::with_filter("true")
            .layer(Layer::Socket)
            .validate()
            .is_err());
    }

    #[test]
    fn test_priority_and_queue_bounds() {
        assert!(HandleConfig::default().priority(30000).validate().is_ok());
        assert!(HandleConfig::default().priority(-30001).validate().is_err());
        assert!(matches!(
            HandleConfig::default().queue_length(8).validate(),
            Err(DivertError::InvalidParam { param: Param::QueueLength, value: 8 })
        ));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(matches!(
            HandleConfig::with_filter("(tcp").validate(),
            Err(DivertError::InvalidFilter(_))
        ));
    }
}
