pub mod battle;

pub use battle::{AttackReport, BattleError, BattleSnapshot, BattleState, MapSize};
