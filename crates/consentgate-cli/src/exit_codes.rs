//! Exit codes for the `consentgate` binary.
//! These are part of the CLI contract; scripts branch on them.

pub const SUCCESS: i32 = 0;
pub const POLICY_ERROR: i32 = 1; // Policy or config could not be loaded
pub const INTERNAL_ERROR: i32 = 2; // Unexpected failure, bad arguments
pub const STORAGE_ERROR: i32 = 3; // Filesystem failure or incomplete purge
pub const VENDOR_ERROR: i32 = 4; // Vendor call failed during simulation
pub const TRIPWIRE: i32 = 5; // Vendor activity observed while the gate was closed
