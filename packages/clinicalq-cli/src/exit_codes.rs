pub const SUCCESS: i32 = 0;
/// Capture, analysis or output failure
pub const EXECUTION_ERROR: i32 = 1;
/// Invalid config file, channel map, mode or repositioning policy
pub const CONFIG_ERROR: i32 = 2;
/// Board could not be prepared
pub const HARDWARE_UNAVAILABLE: i32 = 3;
