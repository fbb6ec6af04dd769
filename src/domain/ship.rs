// Domain records for battlemap tokens and their field-level invariants.

use serde::{Deserialize, Serialize};

/// Closed set of token icons the map clients know how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipIcon {
    Fighter,
    Wing,
    Shuttle,
    Corvette,
    Frigate,
}

impl ShipIcon {
    /// Parses a client-supplied icon name. Unknown names are rejected so the
    /// caller can keep the existing value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fighter" => Some(Self::Fighter),
            "wing" => Some(Self::Wing),
            "shuttle" => Some(Self::Shuttle),
            "corvette" => Some(Self::Corvette),
            "frigate" => Some(Self::Frigate),
            _ => None,
        }
    }
}

/// Shield coverage of a ship. Components are bounded to `[0, 4]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shield {
    None,
    Bilateral {
        front: u8,
        back: u8,
    },
    Directional {
        front: u8,
        back: u8,
        left: u8,
        right: u8,
    },
}

/// Raw shield input as clients send it. Kept lossless so the migration into
/// [`Shield`] happens in exactly one place.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShieldPatch {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    // Legacy single-value shape, upgraded to bilateral.
    pub value: Option<f32>,
    pub front: Option<f32>,
    pub back: Option<f32>,
    pub left: Option<f32>,
    pub right: Option<f32>,
}

impl Shield {
    /// Normalizes raw shield input. Missing components clamp to 0, the legacy
    /// `full { value }` shape upgrades to bilateral, and anything structurally
    /// unrecognizable falls back to `None`.
    pub fn from_patch(patch: &ShieldPatch) -> Self {
        match patch.kind.as_deref() {
            Some("bilateral") => Shield::Bilateral {
                front: clamp_shield_component(patch.front),
                back: clamp_shield_component(patch.back),
            },
            Some("directional") => Shield::Directional {
                front: clamp_shield_component(patch.front),
                back: clamp_shield_component(patch.back),
                left: clamp_shield_component(patch.left),
                right: clamp_shield_component(patch.right),
            },
            Some("full") => {
                let value = clamp_shield_component(patch.value);
                Shield::Bilateral {
                    front: value,
                    back: value,
                }
            }
            _ => Shield::None,
        }
    }
}

/// One token on the battle map. Owned exclusively by the battle state; all
/// mutation flows through its operations so positions stay inside map bounds
/// and `hp <= max_hp` holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ship {
    pub id: String,
    pub name: String,
    pub icon: ShipIcon,
    pub x: f32,
    pub y: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub speed: u8,
    pub silhouette: u8,
    pub heading: f32,
    pub number_of: u8,
    pub strain: f32,
    pub max_strain: f32,
    pub show_hp: bool,
    pub show_speed: bool,
    pub show_shield: bool,
    pub show_strain: bool,
    pub hide_from_viewer: bool,
    pub shield: Shield,
}

/// All-optional ship record used for the initial roster, runtime creation and
/// partial updates. Unknown JSON keys are dropped by serde, which doubles as
/// the patch allow-list. `id` is honored only when loading the roster.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShipInput {
    pub id: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub hp: Option<f32>,
    pub max_hp: Option<f32>,
    pub speed: Option<f32>,
    pub silhouette: Option<f32>,
    pub heading: Option<f32>,
    pub number_of: Option<f32>,
    pub strain: Option<f32>,
    pub max_strain: Option<f32>,
    pub show_hp: Option<bool>,
    pub show_speed: Option<bool>,
    pub show_shield: Option<bool>,
    pub show_strain: Option<bool>,
    pub hide_from_viewer: Option<bool>,
    pub shield: Option<ShieldPatch>,
}

// Stored state must never hold NaN or infinities; bad numbers become 0 before
// clamping.
pub(crate) fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

/// Clamps a coordinate into `[0, bound]`.
pub(crate) fn clamp_position(value: f32, bound: f32) -> f32 {
    finite_or_zero(value).clamp(0.0, bound)
}

/// Floors a resource pool value (hp, strain) at 0.
pub(crate) fn clamp_pool(value: f32) -> f32 {
    finite_or_zero(value).max(0.0)
}

/// Rounds and clamps one of the small integer fields (speed, silhouette,
/// squad count, shield components).
pub(crate) fn clamp_round(value: f32, min: u8, max: u8) -> u8 {
    let rounded = finite_or_zero(value).round();
    if rounded <= min as f32 {
        min
    } else if rounded >= max as f32 {
        max
    } else {
        rounded as u8
    }
}

/// Wraps a heading into `[0, 360)` degrees.
pub(crate) fn normalize_heading(value: f32) -> f32 {
    let wrapped = finite_or_zero(value).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for inputs just below zero.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

fn clamp_shield_component(value: Option<f32>) -> u8 {
    clamp_round(value.unwrap_or(0.0), 0, 4)
}
