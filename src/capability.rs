use tracing::info;

use crate::config::ImmersiveConfig;
use crate::events::ImmersiveMode;

/// What immersive sessions the device can host. Read-only once probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCapability {
    pub vr_supported: bool,
    pub ar_supported: bool,
}

impl SessionCapability {
    pub fn supports(&self, mode: ImmersiveMode) -> bool {
        match mode {
            ImmersiveMode::Vr => self.vr_supported,
            ImmersiveMode::PassthroughAr => self.ar_supported,
        }
    }
}

pub trait CapabilityProbe {
    fn probe(&self) -> SessionCapability;
}

/// Reports whatever the configuration declares.
#[derive(Debug, Clone)]
pub struct ConfiguredProbe {
    declared: SessionCapability,
}

impl ConfiguredProbe {
    pub fn new(cfg: &ImmersiveConfig) -> Self {
        Self {
            declared: SessionCapability {
                vr_supported: cfg.vr_supported,
                ar_supported: cfg.ar_supported,
            },
        }
    }
}

impl CapabilityProbe for ConfiguredProbe {
    fn probe(&self) -> SessionCapability {
        info!(
            vr = self.declared.vr_supported,
            ar = self.declared.ar_supported,
            "immersive capability probed"
        );
        self.declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_maps_each_mode() {
        let caps = SessionCapability {
            vr_supported: true,
            ar_supported: false,
        };
        assert!(caps.supports(ImmersiveMode::Vr));
        assert!(!caps.supports(ImmersiveMode::PassthroughAr));
    }

    #[test]
    fn configured_probe_echoes_config() {
        let cfg = ImmersiveConfig {
            ar_supported: true,
            ..Default::default()
        };
        let caps = ConfiguredProbe::new(&cfg).probe();
        assert_eq!(caps.ar_supported, true);
        assert_eq!(caps.vr_supported, cfg.vr_supported);
    }
}
