//! Capability-gated kernel registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::Capabilities;
use crate::error::{Result, SeismicError};
use crate::kernel::{self, StencilKernel, STENCIL_RADIUS};

/// A registered kernel together with the machine and buffer requirements
/// it was written for.
#[derive(Clone)]
pub struct KernelVariant {
    /// Name used for selection.
    pub name: &'static str,
    /// Extensions the processor must report.
    pub requires: Capabilities,
    /// Byte alignment of the first interior cell (0 = none).
    pub alignment: usize,
    /// Floats per vector; partition chunks are rounded to this.
    pub vector_width: usize,
    /// Numeric backend.
    pub kernel: Arc<dyn StencilKernel>,
}

impl KernelVariant {
    /// Describe a variant.
    pub fn new(
        name: &'static str,
        requires: u32,
        alignment: usize,
        vector_width: usize,
        kernel: impl StencilKernel + 'static,
    ) -> Self {
        Self {
            name,
            requires: Capabilities::from_bits(requires),
            alignment,
            vector_width,
            kernel: Arc::new(kernel),
        }
    }
}

impl std::fmt::Debug for KernelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelVariant")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("alignment", &self.alignment)
            .field("vector_width", &self.vector_width)
            .finish()
    }
}

/// Immutable-after-setup table of kernel variants.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    variants: Vec<KernelVariant>,
    by_name: HashMap<&'static str, usize>,
}

impl KernelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every variant compiled for this architecture.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for variant in builtin_variants() {
            let name = variant.name;
            let result = registry.register(variant);
            debug_assert!(result.is_ok(), "builtin kernel '{}' rejected: {:?}", name, result);
            if let Err(err) = result {
                tracing::error!(kernel = name, error = %err, "builtin kernel rejected");
            }
        }
        registry
    }

    /// Add a variant.
    pub fn register(&mut self, variant: KernelVariant) -> Result<()> {
        if variant.name.is_empty() {
            return Err(SeismicError::InvalidRegistration("empty kernel name".to_string()));
        }
        if self.by_name.contains_key(variant.name) {
            return Err(SeismicError::InvalidRegistration(format!(
                "kernel '{}' already registered",
                variant.name
            )));
        }
        if variant.vector_width == 0 {
            return Err(SeismicError::InvalidRegistration(format!(
                "kernel '{}' has zero vector width",
                variant.name
            )));
        }
        let margin = STENCIL_RADIUS * std::mem::size_of::<f32>();
        if variant.alignment != 0 && (!variant.alignment.is_power_of_two() || variant.alignment < margin) {
            return Err(SeismicError::InvalidRegistration(format!(
                "kernel '{}' alignment {} is not 0 or a power of two of at least {}",
                variant.name, variant.alignment, margin
            )));
        }

        tracing::debug!(
            kernel = variant.name,
            requires = %variant.requires,
            alignment = variant.alignment,
            vector_width = variant.vector_width,
            "registered kernel"
        );
        self.by_name.insert(variant.name, self.variants.len());
        self.variants.push(variant);
        Ok(())
    }

    /// Look up `name` and check it runs on a processor reporting `caps`.
    pub fn select(&self, name: &str, caps: Capabilities) -> Result<&KernelVariant> {
        let variant = self
            .by_name
            .get(name)
            .map(|&idx| &self.variants[idx])
            .ok_or_else(|| {
                SeismicError::unsupported(name, format!("unknown kernel; known: {}", self.names().join(", ")))
            })?;

        if !caps.contains(variant.requires) {
            return Err(SeismicError::unsupported(
                name,
                format!("processor lacks {}", caps.missing(variant.requires)),
            ));
        }
        Ok(variant)
    }

    /// Variants usable on a processor reporting `caps`, in registration
    /// order.
    pub fn list_available(&self, caps: Capabilities) -> impl Iterator<Item = &KernelVariant> {
        self.variants.iter().filter(move |v| caps.contains(v.requires))
    }

    /// Every registered variant.
    pub fn iter(&self) -> impl Iterator<Item = &KernelVariant> {
        self.variants.iter()
    }

    /// Names of every registered variant.
    pub fn names(&self) -> Vec<&'static str> {
        self.variants.iter().map(|v| v.name).collect()
    }

    /// Number of registered variants.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Check if no variant is registered.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

fn builtin_variants() -> Vec<KernelVariant> {
    #[allow(unused_mut)]
    let mut variants = vec![
        KernelVariant::new("plain_naive", 0, 0, 1, kernel::PlainNaive),
        KernelVariant::new("plain_opt", 0, 0, 1, kernel::PlainOpt),
    ];

    #[cfg(target_arch = "x86_64")]
    {
        use crate::capability::Capabilities as C;
        variants.extend([
            KernelVariant::new("sse_unaligned", C::SSE, 0, 4, kernel::SseUnaligned),
            KernelVariant::new("sse_aligned", C::SSE, 16, 4, kernel::SseAligned),
            KernelVariant::new("sse_partial_aligned", C::SSE, 16, 4, kernel::SsePartialAligned),
            KernelVariant::new("avx_unaligned", C::AVX, 0, 8, kernel::AvxUnaligned),
            KernelVariant::new("fma_sse_unaligned", C::SSE | C::FMA, 0, 4, kernel::FmaSseUnaligned),
            KernelVariant::new(
                "fma_avx2_unaligned",
                C::AVX | C::AVX2 | C::FMA,
                0,
                8,
                kernel::FmaAvx2Unaligned,
            ),
        ]);
    }

    #[cfg(target_arch = "aarch64")]
    {
        use crate::capability::Capabilities as C;
        variants.push(KernelVariant::new(
            "neon_aligned",
            C::NEON | C::ASIMD,
            16,
            4,
            kernel::NeonAligned,
        ));
    }

    variants
}
