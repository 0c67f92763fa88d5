//! # Kernel Status Codes
//!
//! Numeric results returned to guest code at the create/launch boundary.

/// Success
pub const SCE_KERNEL_OK: u32 = 0;
/// Generic failure
pub const SCE_KERNEL_ERROR_ERROR: u32 = 0x8002_0001;
/// Invalid argument
pub const SCE_KERNEL_ERROR_INVALID_ARGUMENT: u32 = 0x8002_0003;
/// Generic thread failure
pub const SCE_KERNEL_ERROR_THREAD_ERROR: u32 = 0x8002_8000;
/// Malformed or duplicate thread id
pub const SCE_KERNEL_ERROR_ILLEGAL_THREAD_ID: u32 = 0x8002_8001;
/// No thread with this id
pub const SCE_KERNEL_ERROR_UNKNOWN_THREAD_ID: u32 = 0x8002_8002;
/// Thread is not in the expected state
pub const SCE_KERNEL_ERROR_NOT_DORMANT: u32 = 0x8002_8005;
