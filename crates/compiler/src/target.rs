//! Target capability lookup for `#pragma target`
//!
//! Arbitrary target identifiers are accepted; only the closed set below has
//! known capabilities. Unknown names keep the conservative default (no
//! exclusive load/store), with a warning from the pipeline.

/// Capabilities that drive lowering choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCapabilities {
    /// Exclusive-monitor instructions (LDREX/STREX) are available for
    /// 8/16/32-bit atomic read-modify-write loops
    pub has_ldrex_strex: bool,
}

impl Default for TargetCapabilities {
    fn default() -> Self {
        // Without a known target, fall back to interrupt masking
        TargetCapabilities {
            has_ldrex_strex: false,
        }
    }
}

/// The known targets and their capabilities
pub const KNOWN_TARGETS: &[(&str, TargetCapabilities)] = &[
    ("cortex-m0", TargetCapabilities { has_ldrex_strex: false }),
    ("cortex-m0plus", TargetCapabilities { has_ldrex_strex: false }),
    ("cortex-m23", TargetCapabilities { has_ldrex_strex: false }),
    ("cortex-m3", TargetCapabilities { has_ldrex_strex: true }),
    ("cortex-m4", TargetCapabilities { has_ldrex_strex: true }),
    ("cortex-m7", TargetCapabilities { has_ldrex_strex: true }),
    ("cortex-m33", TargetCapabilities { has_ldrex_strex: true }),
    ("rp2040", TargetCapabilities { has_ldrex_strex: false }),
    ("teensy40", TargetCapabilities { has_ldrex_strex: true }),
    ("teensy41", TargetCapabilities { has_ldrex_strex: true }),
    ("esp32", TargetCapabilities { has_ldrex_strex: false }),
    ("avr", TargetCapabilities { has_ldrex_strex: false }),
];

/// Look up a target by name; None means the name is unknown
pub fn lookup_target(name: &str) -> Option<TargetCapabilities> {
    KNOWN_TARGETS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, caps)| *caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_targets() {
        assert_eq!(
            lookup_target("cortex-m7"),
            Some(TargetCapabilities {
                has_ldrex_strex: true
            })
        );
        assert_eq!(
            lookup_target("cortex-m0"),
            Some(TargetCapabilities {
                has_ldrex_strex: false
            })
        );
    }

    #[test]
    fn test_unknown_target() {
        assert_eq!(lookup_target("z80"), None);
    }

    #[test]
    fn test_default_is_conservative() {
        assert!(!TargetCapabilities::default().has_ldrex_strex);
    }
}
