//! CPU feature detection for runtime SIMD dispatch.
//!
//! Detection runs once; every kernel asks [`SimdLevel::best`] instead of calling
//! `is_x86_feature_detected!` on its hot path.

use std::sync::OnceLock;

use strum_macros::Display;

/// Instruction set tier a numeric kernel may use.
///
/// Ordered from weakest to strongest so levels can be compared with `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SimdLevel {
    Scalar,
    /// 4-lane f32 on aarch64.
    Neon,
    /// 4-lane f32 on x86_64.
    Sse41,
    /// 8-lane f32 on x86_64, FMA included.
    Avx2,
}

static BEST: OnceLock<SimdLevel> = OnceLock::new();

impl SimdLevel {
    /// Strongest level supported by the running CPU (detected once).
    #[inline]
    pub fn best() -> SimdLevel {
        *BEST.get_or_init(detect)
    }

    /// Every level the running CPU supports, weakest first. Always starts with `Scalar`.
    pub fn available() -> Vec<SimdLevel> {
        let best = Self::best();
        [
            SimdLevel::Scalar,
            SimdLevel::Neon,
            SimdLevel::Sse41,
            SimdLevel::Avx2,
        ]
        .into_iter()
        .filter(|level| level.is_supported_under(best))
        .collect()
    }

    /// Number of f32 lanes processed per vector instruction.
    pub fn lanes(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Neon | SimdLevel::Sse41 => 4,
            SimdLevel::Avx2 => 8,
        }
    }

    fn is_supported_under(self, best: SimdLevel) -> bool {
        match self {
            SimdLevel::Scalar => true,
            // NEON and the x86 tiers never coexist on one target.
            SimdLevel::Neon => best == SimdLevel::Neon,
            SimdLevel::Sse41 | SimdLevel::Avx2 => best != SimdLevel::Neon && self <= best,
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn detect() -> SimdLevel {
    if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
        SimdLevel::Avx2
    } else if is_x86_feature_detected!("sse4.1") {
        SimdLevel::Sse41
    } else {
        SimdLevel::Scalar
    }
}

#[cfg(target_arch = "aarch64")]
fn detect() -> SimdLevel {
    // NEON is mandatory on aarch64.
    SimdLevel::Neon
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn detect() -> SimdLevel {
    SimdLevel::Scalar
}

/// Check if SSE4.1 kernels may run.
#[inline]
pub fn has_sse4_1() -> bool {
    SimdLevel::best() >= SimdLevel::Sse41
}

/// Check if AVX2 + FMA kernels may run.
#[inline]
pub fn has_avx2_fma() -> bool {
    SimdLevel::best() == SimdLevel::Avx2
}
