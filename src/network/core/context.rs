use super::config::HandleConfig;
use super::handle::Handle;
use crate::error::{DivertError, Result};
use crate::network::driver::{Backend, Driver};
use crate::network::types::param::PRIORITY_DEFAULT;
use crate::network::types::{Layer, OpenFlags, Param, ShutdownMode, Version};
use log::{debug, info, warn};

/// An initialised connection to a driver backend.
///
/// Creating a context checks once that the driver is reachable and speaks a
/// supported version; every handle is then opened through it.
pub struct Context<B: Backend> {
    backend: B,
    version: Version,
}

impl<B: Backend> Context<B> {
    /// Probes the driver with a handle that matches nothing and checks the
    /// reported version against the supported set.
    pub fn new(backend: B) -> Result<Self> {
        let probe = backend.open("false", Layer::Network, PRIORITY_DEFAULT, OpenFlags::empty())?;

        let version = probe
            .get_param(Param::VersionMajor)
            .and_then(|major| {
                let minor = probe.get_param(Param::VersionMinor)?;
                Ok(Version { major, minor })
            });

        if let Err(e) = probe.shutdown(ShutdownMode::Both) {
            debug!("probe shutdown failed: {}", e);
        }
        probe.close()?;
        let version = version?;

        if !version.is_supported() {
            return Err(DivertError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            });
        }

        info!("WinDivert driver version {}", version);
        Ok(Context { backend, version })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Validates `config`, opens a handle and applies its queue parameters.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration for the new handle
    ///
    /// # Returns
    ///
    /// * `Ok(Handle)` - If the handle was created successfully
    /// * `Err(DivertError)` - If validation or the driver open failed
    pub fn open(&self, config: HandleConfig) -> Result<Handle> {
        config.validate()?;

        let filter = config.build_filter();
        info!("Opening {} handle with filter: {}", config.layer, filter);

        let driver = self
            .backend
            .open(&filter, config.layer, config.priority, config.flags)?;

        for (param, value) in config.queue_params() {
            match driver.set_param(param, value) {
                Ok(()) => info!("Set {} to {}", param, value),
                Err(e) => warn!("Failed to set {}: {}", param, e),
            }
        }

        Ok(Handle::new(Box::new(driver), config))
    }
}

#[cfg(windows)]
impl Context<crate::network::driver::WinDivertBackend> {
    /// Connects to the installed WinDivert driver.
    pub fn windivert() -> Result<Self> {
        Self::new(crate::network::driver::WinDivertBackend::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::network::driver::MemoryBackend;

    #[test]
    fn test_context_reads_version() {
        let backend = MemoryBackend::new().with_version(2, 1);
        let context = Context::new(backend.clone()).unwrap();
        assert_eq!(context.version(), Version { major: 2, minor: 1 });

        let probe = &backend.opened()[0];
        assert_eq!(probe.filter, "false");
        assert_eq!(probe.layer, Layer::Network);
    }

    #[test]
    fn test_unsupported_version() {
        for (major, minor) in [(1, 4), (2, 3), (3, 0)] {
            let backend = MemoryBackend::new().with_version(major, minor);
            assert!(matches!(
                Context::new(backend),
                Err(DivertError::UnsupportedVersion { .. })
            ));
        }
    }

    #[test]
    fn test_driver_unavailable() {
        let backend = MemoryBackend::new();
        backend.fail_next_open(2);
        assert!(matches!(Context::new(backend), Err(DivertError::Driver(2))));
    }

    #[test]
    fn test_open_applies_config() {
        let backend = MemoryBackend::new();
        let context = Context::new(backend.clone()).unwrap();
        let handle = context
            .open(
                HandleConfig::with_filter("udp")
                    .priority(10)
                    .sniff()
                    .queue_length(2048)
                    .exclude_port(1420),
            )
            .unwrap();

        assert_eq!(handle.get_param(Param::QueueLength).unwrap(), 2048);
        assert_eq!(handle.get_param(Param::QueueTime).unwrap(), 2000);

        let request = &backend.opened()[1];
        assert_eq!(
            request.filter,
            "(udp) and localPort != 1420 and remotePort != 1420"
        );
        assert_eq!(request.priority, 10);
        assert_eq!(request.flags, OpenFlags::SNIFF);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let backend = MemoryBackend::new();
        let context = Context::new(backend.clone()).unwrap();
        assert!(context.open(HandleConfig::with_filter("true").layer(Layer::Flow)).is_err());
        assert_eq!(backend.opened().len(), 1);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let backend = MemoryBackend::new();
        let context = Context::new(backend.clone()).unwrap();
        backend.fail_next_open(codes::ERROR_INVALID_PARAMETER);
        assert!(matches!(
            context.open(HandleConfig::default()),
            Err(DivertError::Driver(87))
        ));
    }
}
