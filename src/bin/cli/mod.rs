pub mod args;
pub mod plain;
pub mod state;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Invalid arguments or configuration (e.g., bad URL or address)
    pub const CONFIG_ERROR: u8 = 2;
}
