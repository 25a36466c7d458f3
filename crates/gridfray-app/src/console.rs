//! Colored console rendering of arena events.

use gridfray_core::{ArenaEvent, BotId, EventSink};
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Event sink that narrates the simulation to stdout.
///
/// Keeps an id-to-name table fed by `BotSpawned` events so later lines can
/// use bot names without the core carrying strings in every event.
pub struct ConsoleSink {
    quiet: bool,
    names: Mutex<HashMap<BotId, String>>,
}

impl ConsoleSink {
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            names: Mutex::new(HashMap::new()),
        }
    }

    fn name(&self, id: BotId) -> String {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn remember(&self, id: BotId, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, name.to_string());
    }
}

impl EventSink for ConsoleSink {
    fn record(&self, event: &ArenaEvent) {
        if let ArenaEvent::BotSpawned { id, name, .. } = event {
            self.remember(*id, name);
        }
        if self.quiet {
            return;
        }
        match event {
            ArenaEvent::BotSpawned {
                name,
                archetype,
                position,
                health,
                attack_power,
                defense_power,
                ..
            } => {
                println!(
                    "{} {name} ({archetype}) enters at {position} with {health} health, \
                     attack {attack_power}, defense {defense_power}",
                    "SPAWN".cyan()
                );
            }
            ArenaEvent::ItemSpawned { kind, position } => {
                println!("{} a {kind} appears at {position}", "ITEM SPAWNED".blue());
            }
            ArenaEvent::ItemSpawnRejected { kind, position } => {
                println!(
                    "{} cannot drop a {kind}: an item already occupies {position}",
                    "ITEM SPAWN FAILED".red()
                );
            }
            ArenaEvent::BotMoved { id, to, .. } => {
                println!("{} {} moved to {to}", "MOVE".yellow(), self.name(*id));
            }
            ArenaEvent::MoveRejected { id, reason } => {
                println!("{} {}: {reason}", "MOVE FAILED".red(), self.name(*id));
            }
            ArenaEvent::ItemCollected {
                id,
                kind,
                position,
                before,
                after,
            } => {
                println!(
                    "{} {} picked up a {kind} at {position} ({before} -> {after})",
                    "ITEM COLLECTED".green(),
                    self.name(*id)
                );
            }
            ArenaEvent::CollectRejected { id, kind, position } => {
                println!(
                    "{} {} cannot use the {kind} at {position}",
                    "COLLECT FAILED".red(),
                    self.name(*id)
                );
            }
            ArenaEvent::SelfHealed { id, before, after } => {
                println!(
                    "{} {} channeled from {before} to {after} health",
                    "HEAL".green(),
                    self.name(*id)
                );
            }
            ArenaEvent::AttackSharpened { id, before, after } => {
                println!(
                    "{} {} raised attack power from {before} to {after}",
                    "POWER UP".green(),
                    self.name(*id)
                );
            }
            ArenaEvent::BattleSearchEmpty { id } => {
                println!(
                    "{} {} found no adjacent targets",
                    "NO BATTLE".yellow(),
                    self.name(*id)
                );
            }
            ArenaEvent::BattleFought {
                attacker,
                target,
                damage,
                defense,
                before,
                after,
            } => {
                println!(
                    "{} {} hit {} for {damage} (defense {defense}): {before} -> {after}",
                    "BATTLE".yellow(),
                    self.name(*attacker),
                    self.name(*target)
                );
            }
            ArenaEvent::BotDefeated { name, .. } => {
                println!("{} {name} has fallen", "DEFEATED".magenta());
            }
            ArenaEvent::BotDeparted {
                name,
                health,
                victorious,
                ..
            } => {
                let outcome = if *victorious { "WON" } else { "LOST" };
                println!(
                    "{} {name} left with {health} health and {outcome}",
                    "BOT LEFT".yellow()
                );
            }
        }
    }
}
