pub mod history;
pub mod ship;

pub use history::{HISTORY_LIMIT, HistoryEntry, HistoryLog};
pub use ship::{Ship, ShipIcon, ShipInput, Shield, ShieldPatch};
