//! Archetype movement doctrines for GridFray bots.
//!
//! Each doctrine is a pure function from a bot snapshot and the arena's query
//! surface to a [`Tactic`]. The worker loop applies the returned tactic with
//! a single locked arena call, so nothing here ever holds the arena lock
//! while deciding.

use gridfray_core::{Arena, Archetype, BotSnapshot, Direction, ItemKind, Position, Tactic};

/// Below this health every fragile archetype runs for a health potion.
const CRITICAL_HEALTH: i32 = 15;
/// Casters stop to channel a heal below this health.
const CASTER_REST_THRESHOLD: i32 = 30;
/// Health a caster restores per channeled heal.
const CASTER_REST_HEAL: i32 = 10;
/// Bulwarks look for a weapon pickup below this health.
const BULWARK_WEAPON_THRESHOLD: i32 = 40;
/// Ranged bots stop to focus their attack below this health.
const RANGED_FOCUS_THRESHOLD: i32 = 20;
/// Attack power a ranged bot gains per focus.
const RANGED_FOCUS_BONUS: i32 = 5;

/// Dispatch a bot to its archetype doctrine. This is the [`MovePolicy`] the
/// application wires into the worker loop.
///
/// [`MovePolicy`]: gridfray_core::MovePolicy
#[must_use]
pub fn archetype_policy(arena: &Arena, bot: &BotSnapshot) -> Tactic {
    match bot.archetype {
        Archetype::Melee => melee_doctrine(arena, bot),
        Archetype::Caster => caster_doctrine(arena, bot),
        Archetype::Bulwark => bulwark_doctrine(arena, bot),
        Archetype::Ranged => ranged_doctrine(arena, bot),
    }
}

/// Melee bots close on the nearest enemy, always.
fn melee_doctrine(arena: &Arena, bot: &BotSnapshot) -> Tactic {
    Tactic::Step(arena.nearest_enemy(bot.id))
}

/// Casters run for a potion when critical, channel a heal when merely low,
/// and otherwise hunt the nearest enemy.
fn caster_doctrine(arena: &Arena, bot: &BotSnapshot) -> Tactic {
    if bot.health < CRITICAL_HEALTH {
        if let Some(potion) = arena.nearest_item(bot.id, ItemKind::Health) {
            return Tactic::Step(step_toward(bot.position, potion, bot.speed));
        }
    }
    if bot.health < CASTER_REST_THRESHOLD {
        return Tactic::Heal(CASTER_REST_HEAL);
    }
    Tactic::Step(arena.nearest_enemy(bot.id))
}

/// Bulwarks pick up a weapon when worn down, and otherwise push toward the
/// weakest enemy on the board.
fn bulwark_doctrine(arena: &Arena, bot: &BotSnapshot) -> Tactic {
    if bot.health < BULWARK_WEAPON_THRESHOLD {
        if let Some(weapon) = arena.nearest_item(bot.id, ItemKind::Weapon) {
            return Tactic::Step(step_toward(bot.position, weapon, bot.speed));
        }
    }
    Tactic::Step(arena.weakest_enemy(bot.id))
}

/// Ranged bots run for a potion when critical, focus their attack when low,
/// and otherwise hunt the nearest enemy.
fn ranged_doctrine(arena: &Arena, bot: &BotSnapshot) -> Tactic {
    if bot.health < CRITICAL_HEALTH {
        if let Some(potion) = arena.nearest_item(bot.id, ItemKind::Health) {
            return Tactic::Step(step_toward(bot.position, potion, bot.speed));
        }
    }
    if bot.health < RANGED_FOCUS_THRESHOLD {
        return Tactic::Sharpen(RANGED_FOCUS_BONUS);
    }
    Tactic::Step(arena.nearest_enemy(bot.id))
}

/// Per-axis step of up to `speed` cells toward `to`, never overshooting.
#[must_use]
pub fn step_toward(from: Position, to: Position, speed: i32) -> Direction {
    let clamp_axis = |delta: i32| delta.signum() * delta.abs().min(speed);
    Direction::new(clamp_axis(to.x - from.x), clamp_axis(to.y - from.y))
}
