use std::num::NonZeroU64;

use crate::topology::DEFAULT_SEND_WINDOW;
use crate::types::Window;

/// Knobs for a pipeline run.
///
/// # Examples
///
/// ```rust
/// use std::num::NonZeroU64;
/// use creditgate::runtime::RuntimeConfig;
/// use creditgate::types::Window;
///
/// let config = RuntimeConfig::default()
///     .with_default_send_window(Window::Bounded(4))
///     .with_source_quota(NonZeroU64::new(16).unwrap());
/// assert_eq!(config.default_send_window, Window::Bounded(4));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Send window for downstream edges declared without an explicit one.
    pub default_send_window: Window,
    /// Per-trigger work-unit quota applied to source stages.
    ///
    /// `None` leaves source drains unbounded, which is only safe when the
    /// sources' downstream windows are bounded or total work is bounded
    /// externally.
    pub source_quota: Option<NonZeroU64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_send_window: DEFAULT_SEND_WINDOW,
            source_quota: None,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_default_send_window(mut self, window: Window) -> Self {
        self.default_send_window = window;
        self
    }

    #[must_use]
    pub fn with_source_quota(mut self, quota: NonZeroU64) -> Self {
        self.source_quota = Some(quota);
        self
    }
}
