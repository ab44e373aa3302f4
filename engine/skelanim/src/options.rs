//! Runtime configuration for the animation pipeline

/// Options controlling sampling, propagation and per-frame group updates
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineOptions {
    /// Slerp falls back to normalized lerp when `1 - |dot|` drops below this
    pub slerp_epsilon: f32,
    /// Force a blend factor of 1.0 toward the first key when two actions are
    /// mixed during their first loop (avoids a pop when mixing walk/run cycles)
    pub mix_first_loop_snap: bool,
    /// When only the root bone moved, re-base the other bones with a single
    /// delta matrix instead of walking the hierarchy
    pub root_fast_path: bool,
    /// Compute model-view matrices in f64 and cull instances whose
    /// translation would overflow f32
    pub double_precision_model_view: bool,
    /// Blend relative shape keys
    pub shape_keys: bool,
    /// Fan instances out over the rayon thread pool (needs the `parallel` feature)
    pub parallel: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            slerp_epsilon: 1.0e-4,
            mix_first_loop_snap: true,
            root_fast_path: false,
            double_precision_model_view: true,
            shape_keys: true,
            parallel: true,
        }
    }
}

impl EngineOptions {
    /// Set the slerp epsilon
    pub fn with_slerp_epsilon(mut self, epsilon: f32) -> Self {
        self.slerp_epsilon = epsilon;
        self
    }

    /// Enable or disable the first-loop snap used while mixing two actions
    pub fn with_mix_first_loop_snap(mut self, enabled: bool) -> Self {
        self.mix_first_loop_snap = enabled;
        self
    }

    /// Enable or disable the root-only fast path
    pub fn with_root_fast_path(mut self, enabled: bool) -> Self {
        self.root_fast_path = enabled;
        self
    }

    /// Enable or disable the double precision model-view path
    pub fn with_double_precision(mut self, enabled: bool) -> Self {
        self.double_precision_model_view = enabled;
        self
    }

    /// Enable or disable shape-key blending
    pub fn with_shape_keys(mut self, enabled: bool) -> Self {
        self.shape_keys = enabled;
        self
    }

    /// Enable or disable parallel instance updates
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }
}
