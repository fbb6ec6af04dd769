use std::env;

// Runtime/server constants (not battle tuning).

pub fn http_port() -> u16 {
    env::var("BATTLEMAP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3010)
}

pub fn ships_file() -> String {
    env::var("SHIPS_FILE").unwrap_or_else(|_| "config/ships.json".to_string())
}

pub fn snapshot_file() -> String {
    env::var("SNAPSHOT_FILE").unwrap_or_else(|_| "config/ships.snapshot.json".to_string())
}

pub fn map_width() -> f32 {
    env::var("MAP_WIDTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4000.0)
}

pub fn map_height() -> f32 {
    env::var("MAP_HEIGHT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000.0)
}

pub const UPDATE_BROADCAST_CAPACITY: usize = 128;
