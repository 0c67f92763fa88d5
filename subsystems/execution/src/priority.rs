//! # Priority Management
//!
//! Guest thread priorities. Requests carrying the "default priority" high
//! bits are relative to the default baseline and get rebased into the
//! user-internal band; everything else is taken verbatim.

/// Guest default priority, as passed by guest code
pub const SCE_KERNEL_DEFAULT_PRIORITY: i32 = 0x1000_0100;

/// Default priority of a game application thread
pub const SCE_KERNEL_DEFAULT_PRIORITY_GAME_APP: i32 = 160;

/// Internal band that default-relative requests are rebased into
pub const SCE_KERNEL_DEFAULT_PRIORITY_USER_INTERNAL: i32 = SCE_KERNEL_DEFAULT_PRIORITY_GAME_APP;

/// High bits marking a default-relative request
const DEFAULT_RELATIVE_MASK: i32 = SCE_KERNEL_DEFAULT_PRIORITY & !0x0FFF_FFFF;

/// Thread priority (post-normalization)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(i32);

impl Priority {
    /// Default user priority
    pub const DEFAULT: Self = Self(SCE_KERNEL_DEFAULT_PRIORITY_USER_INTERNAL);

    /// Normalize a priority requested by guest code
    pub const fn normalize(requested: i32) -> Self {
        if Self::is_default_relative(requested) {
            Self(
                requested
                    .wrapping_sub(SCE_KERNEL_DEFAULT_PRIORITY)
                    .wrapping_add(SCE_KERNEL_DEFAULT_PRIORITY_USER_INTERNAL),
            )
        } else {
            Self(requested)
        }
    }

    /// Whether a request is expressed relative to the default baseline
    pub const fn is_default_relative(requested: i32) -> bool {
        requested & DEFAULT_RELATIVE_MASK != 0
    }

    /// Get the raw priority value
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}
