//! Default value functions used by serde for config deserialization.

pub fn default_store_dir() -> String {
    "./store".to_string()
}

pub fn default_workers() -> usize {
    4
}

pub fn default_enqueue_timeout() -> u64 {
    30
}

pub fn default_shutdown_grace() -> u64 {
    5
}

pub fn default_true() -> bool {
    true
}

pub fn default_backfill_limit() -> u32 {
    500
}

pub fn default_command_timeout() -> u64 {
    300
}
