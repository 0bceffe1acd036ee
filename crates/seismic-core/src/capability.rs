//! Processor vector-capability probing.
//!
//! The probe runs once at startup; its result is passed by value into the
//! kernel registry, which gates every variant on it.

use std::fmt;

/// Bit set of vector instruction extensions available on this processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Capabilities(pub u32);

impl Capabilities {
    /// Flag: SSE (128-bit, x86_64).
    pub const SSE: u32 = 1 << 0;
    /// Flag: fused multiply-add (x86_64).
    pub const FMA: u32 = 1 << 7;
    /// Flag: AVX (256-bit float, x86_64).
    pub const AVX: u32 = 1 << 9;
    /// Flag: AVX2 (x86_64).
    pub const AVX2: u32 = 1 << 10;
    /// Flag: NEON (128-bit, ARM).
    pub const NEON: u32 = 1 << 13;
    /// Flag: Advanced SIMD (AArch64).
    pub const ASIMD: u32 = 1 << 14;

    const NAMES: [(u32, &'static str); 6] = [
        (Self::SSE, "SSE"),
        (Self::AVX, "AVX"),
        (Self::AVX2, "AVX2"),
        (Self::FMA, "FMA"),
        (Self::NEON, "NEON"),
        (Self::ASIMD, "ASIMD"),
    ];

    /// No extensions at all; only scalar kernels are usable.
    pub const fn none() -> Self {
        Self(0)
    }

    /// Build a mask from raw flag bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flag bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if every flag in `required` is present.
    pub const fn contains(&self, required: Capabilities) -> bool {
        required.0 & !self.0 == 0
    }

    /// Flags in `required` that this mask lacks.
    pub const fn missing(&self, required: Capabilities) -> Capabilities {
        Capabilities(required.0 & !self.0)
    }

    /// Check if no flag is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Probe the running processor.
    pub fn detect() -> Self {
        #[allow(unused_mut)]
        let mut bits = 0u32;

        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("sse") {
                bits |= Self::SSE;
            }
            if std::arch::is_x86_feature_detected!("avx") {
                bits |= Self::AVX;
            }
            if std::arch::is_x86_feature_detected!("avx2") {
                bits |= Self::AVX2;
            }
            if std::arch::is_x86_feature_detected!("fma") {
                bits |= Self::FMA;
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            if std::arch::is_aarch64_feature_detected!("neon") {
                bits |= Self::NEON | Self::ASIMD;
            }
        }

        let caps = Self(bits);
        tracing::debug!(capabilities = %caps, bits = caps.0, "probed processor capabilities");
        caps
    }

    /// Names of the extensions present, in report order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.0 & flag != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("scalar");
        }
        f.write_str(&self.names().join(" "))
    }
}
