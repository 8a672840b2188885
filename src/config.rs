//! Backend configuration and kernel compile flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Backend configuration
///
/// Environment overrides:
/// - `GPUARRAY_CL_CACHE_CAPACITY`: number of contexts kept in each resource cache
/// - `GPUARRAY_CL_BUILD_OPTIONS`: options passed to the kernel compiler
/// - `GPUARRAY_CL_IN_ORDER=1`: never request out-of-order command queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Contexts kept per resource cache (1 = single slot)
    pub cache_capacity: usize,
    /// Options for the device compiler
    pub build_options: String,
    /// Request out-of-order execution when the device advertises it
    pub prefer_out_of_order: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 4,
            build_options: "-w".to_string(),
            prefer_out_of_order: true,
        }
    }
}

impl BackendConfig {
    pub const CACHE_CAPACITY_VAR: &'static str = "GPUARRAY_CL_CACHE_CAPACITY";
    pub const BUILD_OPTIONS_VAR: &'static str = "GPUARRAY_CL_BUILD_OPTIONS";
    pub const IN_ORDER_VAR: &'static str = "GPUARRAY_CL_IN_ORDER";

    /// Defaults with overrides from the environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::CACHE_CAPACITY_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.cache_capacity = n,
                _ => log::warn!(
                    "Ignoring {}={:?}: expected a positive integer",
                    Self::CACHE_CAPACITY_VAR,
                    raw
                ),
            }
        }
        if let Some(options) = lookup(Self::BUILD_OPTIONS_VAR) {
            config.build_options = options;
        }
        if let Some(v) = lookup(Self::IN_ORDER_VAR) {
            config.prefer_out_of_order = v != "1";
        }

        config
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    pub fn with_build_options(mut self, options: impl Into<String>) -> Self {
        self.build_options = options.into();
        self
    }
}

/// Flags selecting automatic preamble fragments for a kernel build
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KernelFlags(u32);

impl KernelFlags {
    pub const NONE: KernelFlags = KernelFlags(0);
    /// Portability macro preamble
    pub const CLUDA: KernelFlags = KernelFlags(1);
    /// Sub-word (byte/short) addressable stores
    pub const SMALL: KernelFlags = KernelFlags(1 << 1);
    /// Double precision
    pub const DOUBLE: KernelFlags = KernelFlags(1 << 2);
    /// Complex numbers (never supported by this backend)
    pub const COMPLEX: KernelFlags = KernelFlags(1 << 3);
    /// Half precision
    pub const HALF: KernelFlags = KernelFlags(1 << 4);
    /// Alternate low-level IR target (never supported by this backend)
    pub const PTX: KernelFlags = KernelFlags(1 << 5);

    pub fn contains(self, other: KernelFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: KernelFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for KernelFlags {
    type Output = KernelFlags;

    fn bitor(self, rhs: KernelFlags) -> KernelFlags {
        KernelFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for KernelFlags {
    fn bitor_assign(&mut self, rhs: KernelFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for KernelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(KernelFlags, &str); 6] = [
            (KernelFlags::CLUDA, "CLUDA"),
            (KernelFlags::SMALL, "SMALL"),
            (KernelFlags::DOUBLE, "DOUBLE"),
            (KernelFlags::COMPLEX, "COMPLEX"),
            (KernelFlags::HALF, "HALF"),
            (KernelFlags::PTX, "PTX"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "KernelFlags({})", set.join(" | "))
    }
}

/// Platform and device indices packed as `(platform << 16) | device`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceSelector(u32);

impl DeviceSelector {
    pub fn new(platform: u16, device: u16) -> Self {
        Self((u32::from(platform) << 16) | u32::from(device))
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn platform(self) -> usize {
        (self.0 >> 16) as usize
    }

    pub fn device(self) -> usize {
        (self.0 & 0xFFFF) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BackendConfig::default();
        assert_eq!(config.cache_capacity, 4);
        assert_eq!(config.build_options, "-w");
        assert!(config.prefer_out_of_order);
    }

    #[test]
    fn test_env_overrides() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("GPUARRAY_CL_CACHE_CAPACITY", "1"),
            ("GPUARRAY_CL_BUILD_OPTIONS", "-w -cl-mad-enable"),
            ("GPUARRAY_CL_IN_ORDER", "1"),
        ]));
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.build_options, "-w -cl-mad-enable");
        assert!(!config.prefer_out_of_order);
    }

    #[test]
    fn test_bad_capacity_is_ignored() {
        let config = BackendConfig::from_lookup(lookup(&[("GPUARRAY_CL_CACHE_CAPACITY", "0")]));
        assert_eq!(config.cache_capacity, 4);
        let config = BackendConfig::from_lookup(lookup(&[("GPUARRAY_CL_CACHE_CAPACITY", "many")]));
        assert_eq!(config.cache_capacity, 4);
    }

    #[test]
    fn test_builders() {
        let config = BackendConfig::default()
            .with_cache_capacity(0)
            .with_build_options("-cl-fast-relaxed-math");
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.build_options, "-cl-fast-relaxed-math");
        assert_eq!(BackendConfig::default().with_cache_capacity(16).cache_capacity, 16);
    }

    #[test]
    fn test_kernel_flags() {
        let flags = KernelFlags::CLUDA | KernelFlags::DOUBLE;
        assert!(flags.contains(KernelFlags::CLUDA));
        assert!(flags.contains(KernelFlags::DOUBLE));
        assert!(!flags.contains(KernelFlags::HALF));
        assert!(flags.intersects(KernelFlags::HALF | KernelFlags::DOUBLE));
        assert!(KernelFlags::NONE.is_empty());
        assert_eq!(format!("{:?}", flags), "KernelFlags(CLUDA | DOUBLE)");
    }

    #[test]
    fn test_device_selector() {
        let sel = DeviceSelector::new(2, 5);
        assert_eq!(sel.raw(), 0x0002_0005);
        assert_eq!(sel.platform(), 2);
        assert_eq!(sel.device(), 5);
        assert_eq!(DeviceSelector::from_raw(0x0001_0000).platform(), 1);
        assert_eq!(DeviceSelector::from_raw(0x0001_0000).device(), 0);
    }
}
