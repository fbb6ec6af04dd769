// Authoritative battle state. Sole owner of all ship records; every mutation
// and every history push happens inside this type.

use crate::domain::history::{HistoryEntry, HistoryLog};
use crate::domain::ship::{self, Ship, ShipIcon, ShipInput, Shield};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

const DEFAULT_SHIP_NAME: &str = "Contact";
const DEFAULT_HP: f32 = 10.0;

/// Errors returned by battle state operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleError {
    /// Operation referenced a ship id that does not exist.
    NotFound,
}

/// Logical map dimensions, in the same units as ship positions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MapSize {
    pub width: f32,
    pub height: f32,
}

/// Full state of the map: dimensions plus every ship, in stable id order.
#[derive(Debug, Clone, Serialize)]
pub struct BattleSnapshot {
    pub map: MapSize,
    pub ships: Vec<Ship>,
}

/// Outcome of an attack or manually entered damage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackReport {
    pub attack_id: u64,
    pub attacker_id: String,
    pub target_id: String,
    /// Present only for dice-rolled attacks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<u8>,
    pub damage: f32,
    pub remaining_hp: f32,
}

/// In-memory authoritative store for one battle map. Callers never hold ship
/// references; operations return owned copies so the invariant enforcement
/// boundary stays inside this type.
pub struct BattleState {
    map_width: f32,
    map_height: f32,
    ships: HashMap<String, Ship>,
    history: HistoryLog,
    next_ship_id: u64,
    last_attack_id: u64,
}

impl BattleState {
    pub fn new(map_width: f32, map_height: f32) -> Self {
        Self {
            map_width,
            map_height,
            ships: HashMap::new(),
            history: HistoryLog::new(),
            next_ship_id: 1,
            last_attack_id: 0,
        }
    }

    /// Bulk-initializes ships from an externally parsed roster. Records keep
    /// their ids when present; the id counter is advanced past the highest
    /// `S<n>` suffix so later allocations never collide.
    pub fn load(&mut self, records: Vec<ShipInput>) {
        for record in records {
            let id = match record.id.clone().filter(|id| !id.is_empty()) {
                Some(id) => {
                    if let Some(n) = numeric_suffix(&id) {
                        self.next_ship_id = self.next_ship_id.max(n + 1);
                    }
                    id
                }
                None => self.alloc_id(),
            };
            let ship = self.materialize(id.clone(), &record);
            self.ships.insert(id, ship);
        }
    }

    /// Side-effect-free copy of the full state.
    pub fn snapshot(&self) -> BattleSnapshot {
        let mut ships: Vec<Ship> = self.ships.values().cloned().collect();
        ships.sort_by(|a, b| a.id.cmp(&b.id));
        BattleSnapshot {
            map: MapSize {
                width: self.map_width,
                height: self.map_height,
            },
            ships,
        }
    }

    /// Moves a ship, clamping the target into map bounds. Records a history
    /// entry only when the position actually changed.
    pub fn move_ship(&mut self, id: &str, x: f32, y: f32) -> Result<Ship, BattleError> {
        let (map_width, map_height) = (self.map_width, self.map_height);
        let ship = self.ships.get_mut(id).ok_or(BattleError::NotFound)?;

        let from = (ship.x, ship.y);
        ship.x = ship::clamp_position(x, map_width);
        ship.y = ship::clamp_position(y, map_height);
        let to = (ship.x, ship.y);

        let updated = ship.clone();
        if from != to {
            self.history.push(HistoryEntry::Move {
                id: updated.id.clone(),
                from,
                to,
            });
        }
        Ok(updated)
    }

    /// Dice-rolled attack: damage = max(0, 1d10 - 3).
    pub fn attack(
        &mut self,
        attacker_id: &str,
        target_id: &str,
    ) -> Result<AttackReport, BattleError> {
        let roll = rand::thread_rng().gen_range(1..=10u8);
        let damage = (roll as f32 - 3.0).max(0.0);
        self.resolve_attack(attacker_id, target_id, damage, Some(roll))
    }

    /// Manually entered damage. Negative amounts are treated as 0.
    pub fn apply_damage(
        &mut self,
        attacker_id: &str,
        target_id: &str,
        amount: f32,
    ) -> Result<AttackReport, BattleError> {
        self.resolve_attack(attacker_id, target_id, ship::clamp_pool(amount), None)
    }

    fn resolve_attack(
        &mut self,
        attacker_id: &str,
        target_id: &str,
        damage: f32,
        roll: Option<u8>,
    ) -> Result<AttackReport, BattleError> {
        if !self.ships.contains_key(attacker_id) {
            return Err(BattleError::NotFound);
        }
        let target = self.ships.get_mut(target_id).ok_or(BattleError::NotFound)?;

        let from = target.hp;
        if damage > 0.0 {
            target.hp = (target.hp - damage).max(0.0);
        }
        let to = target.hp;

        // Combat damage is undoable; a zero roll or an already-dead target
        // changes nothing and stays out of the history.
        if from != to {
            self.history.push(HistoryEntry::Damage {
                id: target_id.to_string(),
                from,
                to,
            });
        }

        self.last_attack_id += 1;
        Ok(AttackReport {
            attack_id: self.last_attack_id,
            attacker_id: attacker_id.to_string(),
            target_id: target_id.to_string(),
            roll,
            damage,
            remaining_hp: to,
        })
    }

    /// Applies a partial update. Every field normalizes through the same rules
    /// as creation; unknown fields never reach this point (serde drops them).
    ///
    /// Speed changes are recorded for undo. Direct hp/maxHp edits are GM
    /// corrections, not combat damage, and are deliberately not recorded.
    pub fn update_ship(&mut self, id: &str, patch: &ShipInput) -> Result<Ship, BattleError> {
        let (map_width, map_height) = (self.map_width, self.map_height);
        let ship = self.ships.get_mut(id).ok_or(BattleError::NotFound)?;

        if let Some(name) = &patch.name {
            ship.name = name.clone();
        }
        if let Some(icon) = patch.icon.as_deref() {
            // Unknown icon names keep the current icon.
            if let Some(parsed) = ShipIcon::parse(icon) {
                ship.icon = parsed;
            }
        }
        if let Some(x) = patch.x {
            ship.x = ship::clamp_position(x, map_width);
        }
        if let Some(y) = patch.y {
            ship.y = ship::clamp_position(y, map_height);
        }
        if let Some(hp) = patch.hp {
            ship.hp = ship::clamp_pool(hp);
        }
        if let Some(max_hp) = patch.max_hp {
            ship.max_hp = ship::clamp_pool(max_hp);
        }

        let mut speed_change = None;
        if let Some(speed) = patch.speed {
            let from = ship.speed;
            ship.speed = ship::clamp_round(speed, 0, 5);
            if ship.speed != from {
                speed_change = Some((from, ship.speed));
            }
        }

        if let Some(silhouette) = patch.silhouette {
            ship.silhouette = ship::clamp_round(silhouette, 3, 10);
        }
        if let Some(heading) = patch.heading {
            ship.heading = ship::normalize_heading(heading);
        }
        if let Some(number_of) = patch.number_of {
            ship.number_of = ship::clamp_round(number_of, 1, 16);
        }
        // Strain may exceed maxStrain; the source ruleset allows it, so no
        // cross-clamp here.
        if let Some(strain) = patch.strain {
            ship.strain = ship::clamp_pool(strain);
        }
        if let Some(max_strain) = patch.max_strain {
            ship.max_strain = ship::clamp_pool(max_strain);
        }

        if let Some(show_hp) = patch.show_hp {
            ship.show_hp = show_hp;
        }
        if let Some(show_speed) = patch.show_speed {
            ship.show_speed = show_speed;
        }
        if let Some(show_shield) = patch.show_shield {
            ship.show_shield = show_shield;
        }
        if let Some(show_strain) = patch.show_strain {
            ship.show_strain = show_strain;
        }
        if let Some(hide_from_viewer) = patch.hide_from_viewer {
            ship.hide_from_viewer = hide_from_viewer;
        }
        if let Some(shield) = &patch.shield {
            ship.shield = Shield::from_patch(shield);
        }

        if ship.hp > ship.max_hp {
            ship.hp = ship.max_hp;
        }

        let updated = ship.clone();
        if let Some((from, to)) = speed_change {
            self.history.push(HistoryEntry::SpeedChange {
                id: updated.id.clone(),
                from,
                to,
            });
        }
        Ok(updated)
    }

    /// Creates a ship with a freshly allocated id. Any id in the input is
    /// ignored; the store is the only id authority. Creation is not undoable.
    pub fn create_ship(&mut self, input: &ShipInput) -> Ship {
        let id = self.alloc_id();
        let ship = self.materialize(id.clone(), input);
        self.ships.insert(id, ship.clone());
        ship
    }

    /// Removes a ship and purges its history entries so undo never references
    /// a missing token.
    pub fn delete_ship(&mut self, id: &str) -> Result<(), BattleError> {
        if self.ships.remove(id).is_none() {
            return Err(BattleError::NotFound);
        }
        self.history.purge(id);
        Ok(())
    }

    /// Reverses the most recent recorded operation. Returns `None` when there
    /// is nothing to undo or the referenced ship no longer exists.
    pub fn undo_last(&mut self) -> Option<Ship> {
        let entry = self.history.pop()?;
        let ship = self.ships.get_mut(entry.ship_id())?;
        match entry {
            HistoryEntry::Move { from, .. } => {
                ship.x = from.0;
                ship.y = from.1;
            }
            HistoryEntry::SpeedChange { from, .. } => {
                ship.speed = from;
            }
            HistoryEntry::Damage { from, .. } => {
                // maxHp may have been edited since the damage was dealt.
                ship.hp = from.min(ship.max_hp);
            }
        }
        Some(ship.clone())
    }

    fn alloc_id(&mut self) -> String {
        let id = format!("S{}", self.next_ship_id);
        self.next_ship_id += 1;
        id
    }

    /// Builds a fully normalized ship from an all-optional record, filling
    /// defaults for anything absent.
    fn materialize(&self, id: String, input: &ShipInput) -> Ship {
        let max_hp = ship::clamp_pool(input.max_hp.unwrap_or(DEFAULT_HP));
        let hp = ship::clamp_pool(input.hp.unwrap_or(max_hp)).min(max_hp);
        Ship {
            id,
            name: input
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_SHIP_NAME.to_string()),
            icon: input
                .icon
                .as_deref()
                .and_then(ShipIcon::parse)
                .unwrap_or(ShipIcon::Fighter),
            x: ship::clamp_position(input.x.unwrap_or(self.map_width / 2.0), self.map_width),
            y: ship::clamp_position(input.y.unwrap_or(self.map_height / 2.0), self.map_height),
            hp,
            max_hp,
            speed: ship::clamp_round(input.speed.unwrap_or(0.0), 0, 5),
            silhouette: ship::clamp_round(input.silhouette.unwrap_or(3.0), 3, 10),
            heading: ship::normalize_heading(input.heading.unwrap_or(0.0)),
            number_of: ship::clamp_round(input.number_of.unwrap_or(1.0), 1, 16),
            strain: ship::clamp_pool(input.strain.unwrap_or(0.0)),
            max_strain: ship::clamp_pool(input.max_strain.unwrap_or(0.0)),
            show_hp: input.show_hp.unwrap_or(false),
            show_speed: input.show_speed.unwrap_or(false),
            show_shield: input.show_shield.unwrap_or(false),
            show_strain: input.show_strain.unwrap_or(false),
            hide_from_viewer: input.hide_from_viewer.unwrap_or(false),
            shield: input
                .shield
                .as_ref()
                .map(Shield::from_patch)
                .unwrap_or(Shield::None),
        }
    }
}

fn numeric_suffix(id: &str) -> Option<u64> {
    let digits = id.strip_prefix('S')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
