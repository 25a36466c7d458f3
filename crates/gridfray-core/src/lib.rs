//! Shared arena state, lock instrumentation, and the bot worker loop for GridFray.
//!
//! Every mutation of the arena funnels through a single [`TimedMutex`], which
//! doubles as the per-thread wait-time ledger. Bots run as independent worker
//! threads driving [`run_bot`]; the [`Simulation`] coordinator launches them,
//! injects items on a timer, and collects timing statistics once the arena is
//! down to a single bot.

use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on bot health after any heal.
pub const MAX_HEALTH: i32 = 100;
/// Upper bound on bot attack power after any power-up.
pub const MAX_ATTACK_POWER: i32 = 100;
/// Health restored when a bot collects a [`ItemKind::Health`] item.
pub const HEALTH_ITEM_RESTORE: i32 = 30;
/// Attack power gained when a bot collects a [`ItemKind::Weapon`] item.
pub const WEAPON_ITEM_BONUS: i32 = 10;

/// Moore neighborhood offsets used when scanning for adjacent battle targets.
const MOORE_STEPS: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (1, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
];

/// Stable handle for a bot, assigned 0..N-1 at arena construction and never
/// reused for the lifetime of the run.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct BotId(pub usize);

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bot {}", self.0)
    }
}

/// Grid cell coordinate. Valid cells satisfy `0 <= x < width` and
/// `0 <= y < height`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to `other`.
    #[must_use]
    pub const fn manhattan_distance(self, other: Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Per-axis step applied to a position by `move_bot`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Direction {
    pub dx: i32,
    pub dy: i32,
}

impl Direction {
    /// The zero step (stay in place).
    pub const ZERO: Self = Self { dx: 0, dy: 0 };

    /// Construct a new direction.
    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Unit step (-1/0/+1 per axis) pointing from `from` toward `to`.
    #[must_use]
    pub const fn unit_toward(from: Position, to: Position) -> Self {
        Self {
            dx: (to.x - from.x).signum(),
            dy: (to.y - from.y).signum(),
        }
    }

    /// Whether both components are zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Fixed combat-role class determining a bot's base stats and doctrine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Archetype {
    Melee,
    Caster,
    Bulwark,
    Ranged,
}

impl Archetype {
    /// Every archetype, in registry order. Used for uniform random selection.
    pub const ALL: [Self; 4] = [Self::Melee, Self::Caster, Self::Bulwark, Self::Ranged];

    /// Base stats rolled into a freshly spawned bot of this archetype.
    #[must_use]
    pub const fn base_stats(self) -> BaseStats {
        match self {
            Self::Melee => BaseStats::new(75, 35, 5, 1),
            Self::Caster => BaseStats::new(50, 25, 2, 3),
            Self::Bulwark => BaseStats::new(100, 15, 10, 1),
            Self::Ranged => BaseStats::new(75, 25, 5, 2),
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Melee => "Melee",
            Self::Caster => "Caster",
            Self::Bulwark => "Bulwark",
            Self::Ranged => "Ranged",
        };
        f.write_str(label)
    }
}

/// Immutable stat block shared by all bots of one archetype.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseStats {
    pub health: i32,
    pub attack_power: i32,
    pub defense_power: i32,
    pub speed: i32,
}

impl BaseStats {
    #[must_use]
    pub const fn new(health: i32, attack_power: i32, defense_power: i32, speed: i32) -> Self {
        Self {
            health,
            attack_power,
            defense_power,
            speed,
        }
    }
}

/// Collectible kinds placed on the grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Health,
    Weapon,
}

impl ItemKind {
    /// Every item kind, in registry order. Used for uniform random selection.
    pub const ALL: [Self; 2] = [Self::Health, Self::Weapon];

    /// Single-character glyph used by grid renderers.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Health => 'H',
            Self::Weapon => 'W',
        }
    }

    /// Human-readable item description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Health => "health potion",
            Self::Weapon => "weapon add-on",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A collectible on the grid. Items are immutable once placed and destroyed
/// on collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub kind: ItemKind,
    pub position: Position,
}

/// Mutable bot entity, owned exclusively by the arena registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub name: String,
    pub archetype: Archetype,
    pub position: Position,
    pub health: i32,
    pub attack_power: i32,
    pub defense_power: i32,
    pub speed: i32,
    pub alive: bool,
}

impl Bot {
    /// Create a bot of `archetype` with its base stats at `position`.
    #[must_use]
    pub fn new(id: BotId, archetype: Archetype, position: Position) -> Self {
        let stats = archetype.base_stats();
        Self {
            id,
            name: format!("Bot_{}_{archetype}", id.0),
            archetype,
            position,
            health: stats.health,
            attack_power: stats.attack_power,
            defense_power: stats.defense_power,
            speed: stats.speed,
            alive: true,
        }
    }

    /// Apply incoming damage, offset by this bot's defense power. Health
    /// never drops below zero. Returns the resulting health.
    pub fn apply_damage(&mut self, attack_power: i32) -> i32 {
        self.health = (self.health - attack_power + self.defense_power).max(0);
        self.health
    }

    /// Restore health up to [`MAX_HEALTH`]. Dead bots cannot be healed.
    pub fn heal(&mut self, amount: i32) -> bool {
        if !self.alive {
            return false;
        }
        self.health = (self.health + amount).min(MAX_HEALTH);
        true
    }

    /// Raise attack power up to [`MAX_ATTACK_POWER`]. Dead bots cannot be
    /// boosted.
    pub fn sharpen(&mut self, amount: i32) -> bool {
        if !self.alive {
            return false;
        }
        self.attack_power = (self.attack_power + amount).min(MAX_ATTACK_POWER);
        true
    }

    /// Copy of the scalar state observed by strategies and workers.
    #[must_use]
    pub fn snapshot(&self) -> BotSnapshot {
        BotSnapshot {
            id: self.id,
            archetype: self.archetype,
            position: self.position,
            health: self.health,
            attack_power: self.attack_power,
            defense_power: self.defense_power,
            speed: self.speed,
            alive: self.alive,
        }
    }
}

/// Point-in-time copy of one bot's observable state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BotSnapshot {
    pub id: BotId,
    pub archetype: Archetype,
    pub position: Position,
    pub health: i32,
    pub attack_power: i32,
    pub defense_power: i32,
    pub speed: i32,
    pub alive: bool,
}

/// Point-in-time copy of the whole grid, for rendering and assertions.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArenaSnapshot {
    pub width: i32,
    pub height: i32,
    pub bots: Vec<BotSnapshot>,
    pub items: Vec<Item>,
}

/// Structured event emitted by the arena on every observable state change.
///
/// Rendering, coloring, and logging are collaborator concerns; the core only
/// reports what happened through the installed [`EventSink`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum ArenaEvent {
    BotSpawned {
        id: BotId,
        name: String,
        archetype: Archetype,
        position: Position,
        health: i32,
        attack_power: i32,
        defense_power: i32,
    },
    ItemSpawned {
        kind: ItemKind,
        position: Position,
    },
    ItemSpawnRejected {
        kind: ItemKind,
        position: Position,
    },
    BotMoved {
        id: BotId,
        from: Position,
        to: Position,
    },
    MoveRejected {
        id: BotId,
        reason: Rejection,
    },
    ItemCollected {
        id: BotId,
        kind: ItemKind,
        position: Position,
        before: i32,
        after: i32,
    },
    CollectRejected {
        id: BotId,
        kind: ItemKind,
        position: Position,
    },
    SelfHealed {
        id: BotId,
        before: i32,
        after: i32,
    },
    AttackSharpened {
        id: BotId,
        before: i32,
        after: i32,
    },
    BattleSearchEmpty {
        id: BotId,
    },
    BattleFought {
        attacker: BotId,
        target: BotId,
        damage: i32,
        defense: i32,
        before: i32,
        after: i32,
    },
    BotDefeated {
        id: BotId,
        name: String,
    },
    BotDeparted {
        id: BotId,
        name: String,
        health: i32,
        victorious: bool,
    },
}

/// Receiver for [`ArenaEvent`]s. Implementations must tolerate concurrent
/// calls from every worker thread.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ArenaEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &ArenaEvent) {}
}

/// Non-fatal refusal of an arena operation. The operation did not happen this
/// tick; callers proceed to their next loop iteration.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0} is not registered in the arena")]
    UnknownBot(BotId),
    #[error("move resolves to the current position {0}")]
    UnmovedPosition(Position),
    #[error("position {0} is occupied by another bot")]
    PositionOccupied(Position),
    #[error("no item at {0}")]
    NothingToCollect(Position),
    #[error("{0} is dead")]
    DeadBot(BotId),
    #[error("an item already occupies {0}")]
    ItemSlotTaken(Position),
    #[error("position {0} is outside the grid")]
    OutOfBounds(Position),
}

/// Fatal errors raised while constructing or driving an arena.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("layout places two entities of the same kind at {0}")]
    DuplicateLayoutPosition(Position),
    #[error("layout position {0} falls outside the grid")]
    LayoutOutOfBounds(Position),
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Mutual exclusion instrumented with a per-thread wait-time ledger.
///
/// `lock` measures the wall time the calling thread spends blocked on the
/// inner mutex and folds it into that thread's ledger entry. The ledger lives
/// behind its own mutex because every worker updates it concurrently. Release
/// is scoped: the returned guard unlocks on drop, on every exit path.
pub struct TimedMutex<T> {
    inner: Mutex<T>,
    waits: Mutex<HashMap<ThreadId, Duration>>,
}

impl<T> TimedMutex<T> {
    /// Wrap `value` in an instrumented mutex.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            waits: Mutex::new(HashMap::new()),
        }
    }

    /// Block until exclusive access is granted, charging the elapsed wait to
    /// the calling thread.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let start = Instant::now();
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let waited = start.elapsed();
        let mut waits = self.waits.lock().unwrap_or_else(PoisonError::into_inner);
        *waits.entry(thread::current().id()).or_default() += waited;
        guard
    }

    /// Cumulative wait charged to `id`.
    #[must_use]
    pub fn thread_wait(&self, id: ThreadId) -> Duration {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of the full wait ledger.
    #[must_use]
    pub fn wait_times(&self) -> HashMap<ThreadId, Duration> {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of every thread's recorded wait.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl<T: fmt::Debug> fmt::Debug for TimedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedMutex")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// Position- and index-keyed views over the live entities.
///
/// The two bot views always reference the same set: a slot is tombstoned in
/// the same critical section that erases the position entry. Dead bots stay
/// registered until their worker departs.
#[derive(Debug, Default)]
struct Registry {
    by_position: HashMap<Position, BotId>,
    slots: Vec<Option<Bot>>,
    items: HashMap<Position, Item>,
}

impl Registry {
    fn with_capacity(bots: usize, items: usize) -> Self {
        Self {
            by_position: HashMap::with_capacity(bots),
            slots: Vec::with_capacity(bots),
            items: HashMap::with_capacity(items),
        }
    }

    fn insert_bot(&mut self, bot: Bot) -> BotId {
        debug_assert_eq!(bot.id.0, self.slots.len());
        let id = bot.id;
        self.by_position.insert(bot.position, id);
        self.slots.push(Some(bot));
        id
    }

    fn bot(&self, id: BotId) -> Option<&Bot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn bot_mut(&mut self, id: BotId) -> Option<&mut Bot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn bot_id_at(&self, position: Position) -> Option<BotId> {
        self.by_position.get(&position).copied()
    }

    fn registered_count(&self) -> usize {
        self.by_position.len()
    }

    fn relocate_bot(&mut self, id: BotId, to: Position) {
        if let Some(bot) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            self.by_position.remove(&bot.position);
            bot.position = to;
            self.by_position.insert(to, id);
        }
    }

    fn remove_bot(&mut self, id: BotId) -> Option<Bot> {
        let bot = self.slots.get_mut(id.0)?.take()?;
        self.by_position.remove(&bot.position);
        Some(bot)
    }

    fn iter_bots(&self) -> impl Iterator<Item = &Bot> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    fn item_at(&self, position: Position) -> Option<Item> {
        self.items.get(&position).copied()
    }

    fn insert_item(&mut self, item: Item) {
        self.items.insert(item.position, item);
    }

    fn take_item(&mut self, position: Position) -> Option<Item> {
        self.items.remove(&position)
    }

    fn iter_items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Both bot views reference exactly the same live set.
    fn views_consistent(&self) -> bool {
        let live = self.slots.iter().filter(|slot| slot.is_some()).count();
        if self.by_position.len() != live {
            return false;
        }
        self.by_position.iter().all(|(position, id)| {
            self.bot(*id)
                .is_some_and(|bot| bot.position == *position && bot.id == *id)
        })
    }
}

/// Static configuration for one arena run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Grid width in cells.
    pub width: i32,
    /// Grid height in cells.
    pub height: i32,
    /// Number of bots placed at construction.
    pub bot_count: usize,
    /// Number of items placed at construction.
    pub item_count: usize,
    /// Optional RNG seed for reproducible placement and decisions.
    pub rng_seed: Option<u64>,
    /// Lower bound of the per-action worker sleep.
    pub min_action_delay_ms: u64,
    /// Upper bound of the per-action worker sleep.
    pub max_action_delay_ms: u64,
    /// Milliseconds between coordinator item drops; defaults to
    /// `width * height * 20` when unset.
    pub item_spawn_interval_ms: Option<u64>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 12,
            height: 12,
            bot_count: 7,
            item_count: 5,
            rng_seed: None,
            min_action_delay_ms: 100,
            max_action_delay_ms: 1_000,
            item_spawn_interval_ms: None,
        }
    }
}

impl ArenaConfig {
    /// Total number of grid cells.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Interval between coordinator item drops, also used as the warm-up
    /// sleep before the first drop.
    #[must_use]
    pub fn item_spawn_interval(&self) -> Duration {
        let millis = self
            .item_spawn_interval_ms
            .unwrap_or((self.width as u64) * (self.height as u64) * 20);
        Duration::from_millis(millis)
    }

    /// Check every construction parameter.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.width < 1 || self.height < 1 {
            return Err(ArenaError::InvalidConfig(
                "grid dimensions must be positive",
            ));
        }
        if self.bot_count == 0 {
            return Err(ArenaError::InvalidConfig("bot_count must be positive"));
        }
        if self.bot_count > self.cell_count() {
            return Err(ArenaError::InvalidConfig(
                "bot_count exceeds the number of grid cells",
            ));
        }
        if self.item_count > self.cell_count() {
            return Err(ArenaError::InvalidConfig(
                "item_count exceeds the number of grid cells",
            ));
        }
        if self.min_action_delay_ms > self.max_action_delay_ms {
            return Err(ArenaError::InvalidConfig(
                "min_action_delay_ms exceeds max_action_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Report on one resolved battle.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BattleReport {
    pub target: BotId,
    pub damage: i32,
    pub target_health: i32,
    pub defeated: bool,
}

/// Report on one collected item.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Collected {
    pub kind: ItemKind,
    pub position: Position,
    pub before: i32,
    pub after: i32,
}

/// The shared grid and its authoritative entity state.
///
/// All mutating operations serialize through one [`TimedMutex`]; events are
/// emitted after the guard drops so the sink never runs inside the critical
/// section.
pub struct Arena {
    config: ArenaConfig,
    state: TimedMutex<Registry>,
    exec_times: Mutex<HashMap<ThreadId, Duration>>,
    sink: Box<dyn EventSink>,
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Arena {
    /// Build an arena with random unique entity placement and no event sink.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Build an arena with random unique entity placement, reporting through
    /// `sink`.
    pub fn with_sink(config: ArenaConfig, sink: Box<dyn EventSink>) -> Result<Self, ArenaError> {
        config.validate()?;
        let mut rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let mut registry = Registry::with_capacity(config.bot_count, config.item_count);
        let mut events = Vec::with_capacity(config.bot_count + config.item_count);

        while registry.registered_count() < config.bot_count {
            let position = random_position(&config, &mut rng);
            if registry.bot_id_at(position).is_some() {
                continue;
            }
            let archetype = Archetype::ALL[rng.gen_range(0..Archetype::ALL.len())];
            let bot = Bot::new(BotId(registry.registered_count()), archetype, position);
            events.push(spawn_event(&bot));
            registry.insert_bot(bot);
        }

        let mut placed_items = 0;
        while placed_items < config.item_count {
            let position = random_position(&config, &mut rng);
            if registry.item_at(position).is_some() {
                continue;
            }
            let kind = ItemKind::ALL[rng.gen_range(0..ItemKind::ALL.len())];
            registry.insert_item(Item { kind, position });
            events.push(ArenaEvent::ItemSpawned { kind, position });
            placed_items += 1;
        }

        Ok(Self::from_parts(config, registry, events, sink))
    }

    /// Build an arena with an explicit entity layout instead of random
    /// placement. Useful for scripted scenarios and tests; `bot_count` and
    /// `item_count` in `config` are overridden by the layout lengths.
    pub fn with_layout(
        config: ArenaConfig,
        bots: &[(Archetype, Position)],
        items: &[(ItemKind, Position)],
        sink: Box<dyn EventSink>,
    ) -> Result<Self, ArenaError> {
        let config = ArenaConfig {
            bot_count: bots.len(),
            item_count: items.len(),
            ..config
        };
        config.validate()?;

        let mut registry = Registry::with_capacity(bots.len(), items.len());
        let mut events = Vec::with_capacity(bots.len() + items.len());

        for (index, &(archetype, position)) in bots.iter().enumerate() {
            if !in_bounds(&config, position) {
                return Err(ArenaError::LayoutOutOfBounds(position));
            }
            if registry.bot_id_at(position).is_some() {
                return Err(ArenaError::DuplicateLayoutPosition(position));
            }
            let bot = Bot::new(BotId(index), archetype, position);
            events.push(spawn_event(&bot));
            registry.insert_bot(bot);
        }

        for &(kind, position) in items {
            if !in_bounds(&config, position) {
                return Err(ArenaError::LayoutOutOfBounds(position));
            }
            if registry.item_at(position).is_some() {
                return Err(ArenaError::DuplicateLayoutPosition(position));
            }
            registry.insert_item(Item { kind, position });
            events.push(ArenaEvent::ItemSpawned { kind, position });
        }

        Ok(Self::from_parts(config, registry, events, sink))
    }

    fn from_parts(
        config: ArenaConfig,
        registry: Registry,
        events: Vec<ArenaEvent>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let arena = Self {
            config,
            state: TimedMutex::new(registry),
            exec_times: Mutex::new(HashMap::new()),
            sink,
        };
        for event in &events {
            arena.sink.record(event);
        }
        arena
    }

    /// The configuration this arena was built from.
    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Grid width in cells.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.config.width
    }

    /// Grid height in cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.config.height
    }

    /// Number of registered bots, dead-but-not-departed included.
    #[must_use]
    pub fn bot_count(&self) -> usize {
        self.state.lock().registered_count()
    }

    /// True iff exactly one bot remains registered.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        self.bot_count() == 1
    }

    /// Observable state of one bot, if it is still registered.
    #[must_use]
    pub fn snapshot(&self, id: BotId) -> Option<BotSnapshot> {
        self.state.lock().bot(id).map(Bot::snapshot)
    }

    /// Copy of the whole grid for rendering. Items are ordered row-major for
    /// stable output.
    #[must_use]
    pub fn view(&self) -> ArenaSnapshot {
        let state = self.state.lock();
        let bots = state.iter_bots().map(Bot::snapshot).collect();
        let mut items: Vec<Item> = state.iter_items().copied().collect();
        items.sort_by_key(|item| (item.position.y, item.position.x));
        ArenaSnapshot {
            width: self.config.width,
            height: self.config.height,
            bots,
            items,
        }
    }

    /// Whether both registry views reference the same live set. Exposed for
    /// invariant checks at quiescent points.
    #[must_use]
    pub fn views_consistent(&self) -> bool {
        self.state.lock().views_consistent()
    }

    /// Unit step toward the Manhattan-nearest live enemy, or zero when the
    /// bot is alone. Ties break in slot-index order.
    #[must_use]
    pub fn nearest_enemy(&self, id: BotId) -> Direction {
        let state = self.state.lock();
        let Some(me) = state.bot(id) else {
            return Direction::ZERO;
        };
        let mut best: Option<(i32, Position)> = None;
        for other in state.iter_bots() {
            if other.id == id || !other.alive {
                continue;
            }
            let distance = me.position.manhattan_distance(other.position);
            if best.is_none_or(|(closest, _)| distance < closest) {
                best = Some((distance, other.position));
            }
        }
        best.map_or(Direction::ZERO, |(_, target)| {
            Direction::unit_toward(me.position, target)
        })
    }

    /// Unit step toward the live enemy with the lowest health, or zero when
    /// the bot is alone. Ties break in slot-index order.
    #[must_use]
    pub fn weakest_enemy(&self, id: BotId) -> Direction {
        let state = self.state.lock();
        let Some(me) = state.bot(id) else {
            return Direction::ZERO;
        };
        let mut best: Option<(i32, Position)> = None;
        for other in state.iter_bots() {
            if other.id == id || !other.alive {
                continue;
            }
            if best.is_none_or(|(weakest, _)| other.health < weakest) {
                best = Some((other.health, other.position));
            }
        }
        best.map_or(Direction::ZERO, |(_, target)| {
            Direction::unit_toward(me.position, target)
        })
    }

    /// Absolute position of the Manhattan-nearest item of `kind`, or `None`
    /// when the closest qualifying item is half a grid or more away.
    #[must_use]
    pub fn nearest_item(&self, id: BotId, kind: ItemKind) -> Option<Position> {
        let state = self.state.lock();
        let me = state.bot(id)?;
        let mut best: Option<(i32, Position)> = None;
        for item in state.iter_items() {
            if item.kind != kind {
                continue;
            }
            let distance = me.position.manhattan_distance(item.position);
            if best.is_none_or(|(closest, _)| distance < closest) {
                best = Some((distance, item.position));
            }
        }
        let (closest, target) = best?;
        if closest < self.config.width / 2 && closest < self.config.height / 2 {
            Some(target)
        } else {
            None
        }
    }

    /// Relocate a bot by `direction`, clamped to the grid. Rejected when the
    /// clamped destination equals the current cell or holds another bot; a
    /// rejection leaves both registry views untouched.
    pub fn move_bot(&self, id: BotId, direction: Direction) -> Result<Position, Rejection> {
        let result = {
            let mut state = self.state.lock();
            match state.bot(id) {
                None => Err(Rejection::UnknownBot(id)),
                Some(bot) => {
                    let from = bot.position;
                    let to = Position::new(
                        (from.x + direction.dx).clamp(0, self.config.width - 1),
                        (from.y + direction.dy).clamp(0, self.config.height - 1),
                    );
                    if to == from {
                        Err(Rejection::UnmovedPosition(to))
                    } else if state.bot_id_at(to).is_some() {
                        Err(Rejection::PositionOccupied(to))
                    } else {
                        state.relocate_bot(id, to);
                        Ok((from, to))
                    }
                }
            }
        };
        match result {
            Ok((from, to)) => {
                self.emit(ArenaEvent::BotMoved { id, from, to });
                Ok(to)
            }
            Err(reason) => {
                self.emit(ArenaEvent::MoveRejected { id, reason });
                Err(reason)
            }
        }
    }

    /// Collect the item under the bot, if any, applying its effect capped at
    /// the stat maximum. Dead bots collect nothing and the item stays.
    pub fn collect_item(&self, id: BotId) -> Result<Collected, Rejection> {
        enum Outcome {
            Collected(Collected, BotId),
            Refused(BotId, ItemKind, Position),
        }
        let outcome = {
            let mut state = self.state.lock();
            let Some(bot) = state.bot(id) else {
                return Err(Rejection::UnknownBot(id));
            };
            let position = bot.position;
            let Some(item) = state.item_at(position) else {
                return Err(Rejection::NothingToCollect(position));
            };
            if !bot.alive {
                Outcome::Refused(id, item.kind, position)
            } else {
                let bot = state
                    .bot_mut(id)
                    .ok_or(Rejection::UnknownBot(id))?;
                let (before, after) = match item.kind {
                    ItemKind::Health => {
                        let before = bot.health;
                        bot.heal(HEALTH_ITEM_RESTORE);
                        (before, bot.health)
                    }
                    ItemKind::Weapon => {
                        let before = bot.attack_power;
                        bot.sharpen(WEAPON_ITEM_BONUS);
                        (before, bot.attack_power)
                    }
                };
                state.take_item(position);
                Outcome::Collected(
                    Collected {
                        kind: item.kind,
                        position,
                        before,
                        after,
                    },
                    id,
                )
            }
        };
        match outcome {
            Outcome::Collected(collected, id) => {
                self.emit(ArenaEvent::ItemCollected {
                    id,
                    kind: collected.kind,
                    position: collected.position,
                    before: collected.before,
                    after: collected.after,
                });
                Ok(collected)
            }
            Outcome::Refused(id, kind, position) => {
                self.emit(ArenaEvent::CollectRejected { id, kind, position });
                Err(Rejection::DeadBot(id))
            }
        }
    }

    /// Place a new item at `position` unless the cell is outside the grid or
    /// already holds an item.
    pub fn spawn_item(&self, position: Position, kind: ItemKind) -> Result<(), Rejection> {
        if !in_bounds(&self.config, position) {
            return Err(Rejection::OutOfBounds(position));
        }
        let placed = {
            let mut state = self.state.lock();
            if state.item_at(position).is_some() {
                false
            } else {
                state.insert_item(Item { kind, position });
                true
            }
        };
        if placed {
            self.emit(ArenaEvent::ItemSpawned { kind, position });
            Ok(())
        } else {
            self.emit(ArenaEvent::ItemSpawnRejected { kind, position });
            Err(Rejection::ItemSlotTaken(position))
        }
    }

    /// In-bounds Moore-neighborhood cells currently holding another bot.
    #[must_use]
    pub fn battle_candidates(&self, id: BotId) -> Vec<Position> {
        let state = self.state.lock();
        state
            .bot(id)
            .map(|bot| adjacent_occupied(&self.config, &state, bot.position))
            .unwrap_or_default()
    }

    /// Resolve a battle: the target's health drops by the attacker's attack
    /// power offset by the target's defense, floored at zero. A transition to
    /// zero marks the target dead (removal is the target worker's job).
    pub fn battle(&self, attacker: BotId, target: BotId) -> Result<BattleReport, Rejection> {
        let (report, events) = {
            let mut state = self.state.lock();
            resolve_battle(&mut state, attacker, target)?
        };
        for event in &events {
            self.sink.record(event);
        }
        Ok(report)
    }

    /// Pick a uniform random adjacent bot and battle it, all in one critical
    /// section. Returns `Ok(None)` when no neighbor is available.
    pub fn attack_adjacent(
        &self,
        id: BotId,
        rng: &mut dyn RngCore,
    ) -> Result<Option<BattleReport>, Rejection> {
        let (report, events) = {
            let mut state = self.state.lock();
            let Some(bot) = state.bot(id) else {
                return Err(Rejection::UnknownBot(id));
            };
            let candidates = adjacent_occupied(&self.config, &state, bot.position);
            if candidates.is_empty() {
                (None, vec![ArenaEvent::BattleSearchEmpty { id }])
            } else {
                let position = candidates[rng.gen_range(0..candidates.len())];
                let Some(target) = state.bot_id_at(position) else {
                    return Err(Rejection::UnknownBot(id));
                };
                let (report, events) = resolve_battle(&mut state, id, target)?;
                (Some(report), events)
            }
        };
        for event in &events {
            self.sink.record(event);
        }
        Ok(report)
    }

    /// Restore a bot's own health, capped at [`MAX_HEALTH`]. Returns the
    /// health before and after. Rejected for dead bots.
    pub fn self_heal(&self, id: BotId, amount: i32) -> Result<(i32, i32), Rejection> {
        let (before, after) = {
            let mut state = self.state.lock();
            let bot = state.bot_mut(id).ok_or(Rejection::UnknownBot(id))?;
            let before = bot.health;
            if !bot.heal(amount) {
                return Err(Rejection::DeadBot(id));
            }
            (before, bot.health)
        };
        self.emit(ArenaEvent::SelfHealed { id, before, after });
        Ok((before, after))
    }

    /// Raise a bot's own attack power, capped at [`MAX_ATTACK_POWER`].
    /// Returns the attack power before and after. Rejected for dead bots.
    pub fn sharpen_attack(&self, id: BotId, amount: i32) -> Result<(i32, i32), Rejection> {
        let (before, after) = {
            let mut state = self.state.lock();
            let bot = state.bot_mut(id).ok_or(Rejection::UnknownBot(id))?;
            let before = bot.attack_power;
            if !bot.sharpen(amount) {
                return Err(Rejection::DeadBot(id));
            }
            (before, bot.attack_power)
        };
        self.emit(ArenaEvent::AttackSharpened { id, before, after });
        Ok((before, after))
    }

    /// Erase a bot from both registry views and hand its entity back. Called
    /// by the bot's own worker on loop exit.
    pub fn remove_bot(&self, id: BotId) -> Option<Bot> {
        let bot = self.state.lock().remove_bot(id)?;
        self.emit(ArenaEvent::BotDeparted {
            id,
            name: bot.name.clone(),
            health: bot.health,
            victorious: bot.health > 0,
        });
        Some(bot)
    }

    /// Charge `elapsed` of active execution to the calling thread.
    pub fn record_exec_time(&self, elapsed: Duration) {
        let mut times = self
            .exec_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *times.entry(thread::current().id()).or_default() += elapsed;
    }

    /// Snapshot of the per-thread execution-time map.
    #[must_use]
    pub fn exec_times(&self) -> HashMap<ThreadId, Duration> {
        self.exec_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the per-thread lock-wait ledger.
    #[must_use]
    pub fn wait_times(&self) -> HashMap<ThreadId, Duration> {
        self.state.wait_times()
    }

    /// Sum of every thread's lock wait.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.state.total_wait()
    }

    fn emit(&self, event: ArenaEvent) {
        self.sink.record(&event);
    }
}

fn spawn_event(bot: &Bot) -> ArenaEvent {
    ArenaEvent::BotSpawned {
        id: bot.id,
        name: bot.name.clone(),
        archetype: bot.archetype,
        position: bot.position,
        health: bot.health,
        attack_power: bot.attack_power,
        defense_power: bot.defense_power,
    }
}

fn random_position(config: &ArenaConfig, rng: &mut SmallRng) -> Position {
    Position::new(
        rng.gen_range(0..config.width),
        rng.gen_range(0..config.height),
    )
}

fn in_bounds(config: &ArenaConfig, position: Position) -> bool {
    position.x >= 0 && position.x < config.width && position.y >= 0 && position.y < config.height
}

fn adjacent_occupied(config: &ArenaConfig, state: &Registry, origin: Position) -> Vec<Position> {
    let mut occupied = Vec::new();
    for (dx, dy) in MOORE_STEPS {
        let candidate = Position::new(origin.x + dx, origin.y + dy);
        if in_bounds(config, candidate) && state.bot_id_at(candidate).is_some() {
            occupied.push(candidate);
        }
    }
    occupied
}

fn resolve_battle(
    state: &mut Registry,
    attacker: BotId,
    target: BotId,
) -> Result<(BattleReport, Vec<ArenaEvent>), Rejection> {
    let damage = state
        .bot(attacker)
        .ok_or(Rejection::UnknownBot(attacker))?
        .attack_power;
    let victim = state.bot_mut(target).ok_or(Rejection::UnknownBot(target))?;
    let defense = victim.defense_power;
    let before = victim.health;
    let after = victim.apply_damage(damage);
    let defeated = before > 0 && after == 0;
    let mut events = vec![ArenaEvent::BattleFought {
        attacker,
        target,
        damage,
        defense,
        before,
        after,
    }];
    if defeated {
        victim.alive = false;
        events.push(ArenaEvent::BotDefeated {
            id: target,
            name: victim.name.clone(),
        });
    }
    Ok((
        BattleReport {
            target,
            damage,
            target_health: after,
            defeated,
        },
        events,
    ))
}

/// Action a strategy asks its worker to take this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tactic {
    /// Take one `move_bot` step in the given direction.
    Step(Direction),
    /// Hold position and restore the given amount of health.
    Heal(i32),
    /// Hold position and raise attack power by the given amount.
    Sharpen(i32),
}

/// Pluggable per-archetype decision callback. Pure with respect to the arena:
/// it may query but never mutate.
pub type MovePolicy = fn(&Arena, &BotSnapshot) -> Tactic;

/// Per-bot worker loop. Runs until the arena reports game over or the bot is
/// gone or dead, then removes the bot from both registry views and records
/// the worker's execution time.
pub fn run_bot(arena: &Arena, id: BotId, policy: MovePolicy, rng: &mut SmallRng) {
    let started = Instant::now();
    let min_delay = arena.config().min_action_delay_ms;
    let max_delay = arena.config().max_action_delay_ms;

    loop {
        if arena.is_game_over() {
            break;
        }

        // Standing on an item always means picking it up, whatever the
        // chosen action.
        let _ = arena.collect_item(id);

        let Some(me) = arena.snapshot(id) else {
            break;
        };
        if !me.alive {
            break;
        }

        if rng.gen_bool(0.5) {
            match policy(arena, &me) {
                Tactic::Step(direction) => {
                    let _ = arena.move_bot(id, direction);
                }
                Tactic::Heal(amount) => {
                    let _ = arena.self_heal(id, amount);
                }
                Tactic::Sharpen(amount) => {
                    let _ = arena.sharpen_attack(id, amount);
                }
            }
        } else {
            let _ = arena.attack_adjacent(id, rng);
        }

        thread::sleep(Duration::from_millis(rng.gen_range(min_delay..=max_delay)));
    }

    arena.remove_bot(id);
    arena.record_exec_time(started.elapsed());
}

/// Timing row for one worker, assembled after all workers have terminated.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerTiming {
    pub label: String,
    pub exec: Duration,
    pub wait: Duration,
}

impl WorkerTiming {
    /// Wait time as a percentage of execution time; zero when no execution
    /// time was recorded.
    #[must_use]
    pub fn wait_percent(&self) -> f64 {
        let exec_ms = self.exec.as_secs_f64() * 1_000.0;
        if exec_ms > 0.0 {
            (self.wait.as_secs_f64() * 1_000.0) * 100.0 / exec_ms
        } else {
            0.0
        }
    }
}

/// Aggregated timing statistics for a finished run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SimulationReport {
    pub timings: Vec<WorkerTiming>,
    pub total_wait: Duration,
}

/// Orchestrates one full run: launches a worker per bot, injects items on a
/// timer, and waits for every worker to terminate.
pub struct Simulation {
    arena: Arc<Arena>,
}

impl Simulation {
    /// Validate `config` and build the shared arena.
    pub fn new(config: ArenaConfig, sink: Box<dyn EventSink>) -> Result<Self, ArenaError> {
        Ok(Self {
            arena: Arc::new(Arena::with_sink(config, sink)?),
        })
    }

    /// Handle to the shared arena.
    #[must_use]
    pub fn arena(&self) -> Arc<Arena> {
        Arc::clone(&self.arena)
    }

    /// Run the simulation to completion and assemble the timing report.
    pub fn run(&self, policy: MovePolicy) -> Result<SimulationReport, ArenaError> {
        let config = self.arena.config().clone();
        let mut workers = Vec::with_capacity(config.bot_count);

        for index in 0..config.bot_count {
            let arena = Arc::clone(&self.arena);
            let label = format!("bot-{index}");
            let mut rng = match config.rng_seed {
                Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(index as u64 + 1)),
                None => SmallRng::from_entropy(),
            };
            let handle = thread::Builder::new()
                .name(label.clone())
                .spawn(move || run_bot(&arena, BotId(index), policy, &mut rng))?;
            workers.push((label, handle));
        }

        let interval = config.item_spawn_interval();
        let mut rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        thread::sleep(interval);
        loop {
            let position = random_position(&config, &mut rng);
            let kind = ItemKind::ALL[rng.gen_range(0..ItemKind::ALL.len())];
            let _ = self.arena.spawn_item(position, kind);

            if self.arena.bot_count() <= 1 {
                break;
            }
            thread::sleep(interval);
        }

        let mut identities = Vec::with_capacity(workers.len());
        for (label, handle) in workers {
            let thread_id = handle.thread().id();
            let _ = handle.join();
            identities.push((label, thread_id));
        }

        let exec_times = self.arena.exec_times();
        let wait_times = self.arena.wait_times();
        let timings = identities
            .into_iter()
            .map(|(label, thread_id)| WorkerTiming {
                label,
                exec: exec_times.get(&thread_id).copied().unwrap_or_default(),
                wait: wait_times.get(&thread_id).copied().unwrap_or_default(),
            })
            .collect();

        Ok(SimulationReport {
            timings,
            total_wait: self.arena.total_wait(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[derive(Clone, Default)]
    struct CaptureSink {
        events: Arc<Mutex<Vec<ArenaEvent>>>,
    }

    impl CaptureSink {
        fn events(&self) -> Vec<ArenaEvent> {
            self.events.lock().expect("capture sink").clone()
        }
    }

    impl EventSink for CaptureSink {
        fn record(&self, event: &ArenaEvent) {
            self.events.lock().expect("capture sink").push(event.clone());
        }
    }

    fn grid_config(width: i32, height: i32) -> ArenaConfig {
        ArenaConfig {
            width,
            height,
            rng_seed: Some(7),
            ..ArenaConfig::default()
        }
    }

    fn layout_arena(
        width: i32,
        height: i32,
        bots: &[(Archetype, Position)],
        items: &[(ItemKind, Position)],
    ) -> Arena {
        Arena::with_layout(grid_config(width, height), bots, items, Box::new(NullSink))
            .expect("layout arena")
    }

    #[test]
    fn base_stats_match_archetype_roles() {
        assert_eq!(Archetype::Melee.base_stats(), BaseStats::new(75, 35, 5, 1));
        assert_eq!(Archetype::Caster.base_stats(), BaseStats::new(50, 25, 2, 3));
        assert_eq!(
            Archetype::Bulwark.base_stats(),
            BaseStats::new(100, 15, 10, 1)
        );
        assert_eq!(Archetype::Ranged.base_stats(), BaseStats::new(75, 25, 5, 2));
    }

    #[test]
    fn timed_mutex_charges_wait_to_the_blocked_thread() {
        let mutex = Arc::new(TimedMutex::new(0_u32));
        let (ready_tx, ready_rx) = mpsc::channel();

        let holder = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let mut guard = mutex.lock();
                ready_tx.send(()).expect("signal main");
                thread::sleep(Duration::from_millis(40));
                *guard += 1;
            })
        };

        ready_rx.recv().expect("holder acquired");
        {
            let guard = mutex.lock();
            assert_eq!(*guard, 1);
        }
        holder.join().expect("holder joined");

        let main_wait = mutex.thread_wait(thread::current().id());
        assert!(main_wait > Duration::ZERO, "main thread never blocked");
        assert_eq!(mutex.wait_times().len(), 2);
        assert!(mutex.total_wait() >= main_wait);
    }

    #[test]
    fn config_validation_rejects_bad_parameters() {
        let zero_width = ArenaConfig {
            width: 0,
            ..ArenaConfig::default()
        };
        assert!(matches!(
            zero_width.validate(),
            Err(ArenaError::InvalidConfig(_))
        ));

        let crowded = ArenaConfig {
            width: 2,
            height: 2,
            bot_count: 5,
            ..ArenaConfig::default()
        };
        assert!(matches!(
            crowded.validate(),
            Err(ArenaError::InvalidConfig(_))
        ));

        let inverted = ArenaConfig {
            min_action_delay_ms: 500,
            max_action_delay_ms: 100,
            ..ArenaConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ArenaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn seeded_arena_places_unique_entities() {
        let arena = Arena::new(grid_config(12, 12)).expect("arena");
        let view = arena.view();

        assert_eq!(view.bots.len(), 7);
        assert_eq!(view.items.len(), 5);
        assert!(arena.views_consistent());

        let mut bot_positions: Vec<Position> = view.bots.iter().map(|bot| bot.position).collect();
        bot_positions.sort();
        bot_positions.dedup();
        assert_eq!(bot_positions.len(), 7, "bot positions must be unique");

        let mut ids: Vec<usize> = view.bots.iter().map(|bot| bot.id.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn move_bot_updates_both_views() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Bulwark, Position::new(4, 4)),
            ],
            &[],
        );

        let to = arena
            .move_bot(BotId(0), Direction::new(1, 0))
            .expect("move accepted");
        assert_eq!(to, Position::new(2, 1));
        assert_eq!(
            arena.snapshot(BotId(0)).expect("bot").position,
            Position::new(2, 1)
        );
        assert!(arena.views_consistent());
    }

    #[test]
    fn move_bot_rejects_occupied_destination() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Bulwark, Position::new(2, 1)),
            ],
            &[],
        );

        let result = arena.move_bot(BotId(0), Direction::new(1, 0));
        assert_eq!(result, Err(Rejection::PositionOccupied(Position::new(2, 1))));
        assert_eq!(
            arena.snapshot(BotId(0)).expect("mover").position,
            Position::new(1, 1)
        );
        assert_eq!(
            arena.snapshot(BotId(1)).expect("blocker").position,
            Position::new(2, 1)
        );
        assert!(arena.views_consistent());
    }

    #[test]
    fn move_bot_rejects_step_clamped_back_onto_itself() {
        let arena = layout_arena(3, 3, &[(Archetype::Melee, Position::new(2, 2))], &[]);

        let result = arena.move_bot(BotId(0), Direction::new(1, 0));
        assert_eq!(result, Err(Rejection::UnmovedPosition(Position::new(2, 2))));
        assert_eq!(
            arena.snapshot(BotId(0)).expect("bot").position,
            Position::new(2, 2)
        );
    }

    #[test]
    fn battle_applies_defense_adjusted_damage() {
        // Melee attacker: 35 attack. Bulwark target: 100 health, 10 defense.
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Bulwark, Position::new(2, 1)),
            ],
            &[],
        );

        let report = arena.battle(BotId(0), BotId(1)).expect("battle");
        assert_eq!(report.target_health, 75);
        assert!(!report.defeated);

        let report = arena.battle(BotId(0), BotId(1)).expect("battle");
        assert_eq!(report.target_health, 50);
        assert!(arena.snapshot(BotId(1)).expect("target").alive);
    }

    #[test]
    fn battle_marks_defeat_exactly_once() {
        // Melee attacker: 35 attack. Caster target: 50 health, 2 defense.
        let sink = CaptureSink::default();
        let arena = Arena::with_layout(
            grid_config(5, 5),
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Caster, Position::new(2, 1)),
            ],
            &[],
            Box::new(sink.clone()),
        )
        .expect("arena");

        let first = arena.battle(BotId(0), BotId(1)).expect("first blow");
        assert_eq!(first.target_health, 17);

        let second = arena.battle(BotId(0), BotId(1)).expect("killing blow");
        assert_eq!(second.target_health, 0);
        assert!(second.defeated);
        assert!(!arena.snapshot(BotId(1)).expect("target").alive);

        // A further battle against the corpse must not re-announce defeat.
        let third = arena.battle(BotId(0), BotId(1)).expect("redundant blow");
        assert!(!third.defeated);

        let defeats = sink
            .events()
            .iter()
            .filter(|event| matches!(event, ArenaEvent::BotDefeated { .. }))
            .count();
        assert_eq!(defeats, 1);
    }

    #[test]
    fn collect_heals_and_removes_item() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Bulwark, Position::new(4, 4)),
            ],
            &[(ItemKind::Health, Position::new(1, 1))],
        );

        // Soften the collector so the heal is observable: 75 - 15 + 5 = 65.
        arena.battle(BotId(1), BotId(0)).expect("soften");
        let hurt = arena.snapshot(BotId(0)).expect("bot").health;
        assert_eq!(hurt, 65);

        let collected = arena.collect_item(BotId(0)).expect("collect");
        assert_eq!(collected.before, 65);
        assert_eq!(collected.after, 95);
        assert_eq!(
            arena.collect_item(BotId(0)),
            Err(Rejection::NothingToCollect(Position::new(1, 1)))
        );
    }

    #[test]
    fn collect_caps_health_at_maximum() {
        let arena = layout_arena(
            5,
            5,
            &[(Archetype::Bulwark, Position::new(1, 1))],
            &[(ItemKind::Health, Position::new(1, 1))],
        );

        let collected = arena.collect_item(BotId(0)).expect("collect");
        assert_eq!(collected.before, MAX_HEALTH);
        assert_eq!(collected.after, MAX_HEALTH);
    }

    #[test]
    fn collect_rejected_for_dead_bot_leaves_item() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Caster, Position::new(2, 1)),
            ],
            &[(ItemKind::Health, Position::new(2, 1))],
        );

        arena.battle(BotId(0), BotId(1)).expect("first blow");
        arena.battle(BotId(0), BotId(1)).expect("killing blow");
        assert!(!arena.snapshot(BotId(1)).expect("target").alive);

        assert_eq!(
            arena.collect_item(BotId(1)),
            Err(Rejection::DeadBot(BotId(1)))
        );
        assert_eq!(arena.view().items.len(), 1, "item must survive the refusal");
    }

    #[test]
    fn weapon_pickups_cap_attack_power() {
        let arena = layout_arena(5, 5, &[(Archetype::Melee, Position::new(1, 1))], &[]);

        for _ in 0..8 {
            arena
                .spawn_item(Position::new(1, 1), ItemKind::Weapon)
                .expect("spawn");
            arena.collect_item(BotId(0)).expect("collect");
        }
        assert_eq!(
            arena.snapshot(BotId(0)).expect("bot").attack_power,
            MAX_ATTACK_POWER
        );
    }

    #[test]
    fn spawn_item_rejects_occupied_slot_and_out_of_bounds() {
        let arena = layout_arena(5, 5, &[(Archetype::Melee, Position::new(0, 0))], &[]);

        let position = Position::new(3, 3);
        arena.spawn_item(position, ItemKind::Health).expect("first");
        assert_eq!(
            arena.spawn_item(position, ItemKind::Weapon),
            Err(Rejection::ItemSlotTaken(position))
        );
        assert_eq!(arena.view().items.len(), 1);

        assert_eq!(
            arena.spawn_item(Position::new(9, 0), ItemKind::Health),
            Err(Rejection::OutOfBounds(Position::new(9, 0)))
        );
    }

    #[test]
    fn nearest_item_honors_range_cutoff() {
        let arena = layout_arena(
            10,
            10,
            &[(Archetype::Caster, Position::new(0, 0))],
            &[(ItemKind::Health, Position::new(3, 1))],
        );

        assert_eq!(
            arena.nearest_item(BotId(0), ItemKind::Health),
            Some(Position::new(3, 1))
        );
        assert_eq!(arena.nearest_item(BotId(0), ItemKind::Weapon), None);

        // Distance 5 is not under half of either grid dimension.
        let far = layout_arena(
            10,
            10,
            &[(Archetype::Caster, Position::new(0, 0))],
            &[(ItemKind::Health, Position::new(5, 0))],
        );
        assert_eq!(far.nearest_item(BotId(0), ItemKind::Health), None);
    }

    #[test]
    fn nearest_enemy_returns_unit_step() {
        let arena = layout_arena(
            8,
            8,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Caster, Position::new(4, 1)),
                (Archetype::Bulwark, Position::new(7, 7)),
            ],
            &[],
        );

        assert_eq!(arena.nearest_enemy(BotId(0)), Direction::new(1, 0));
        assert_eq!(arena.nearest_enemy(BotId(2)), Direction::new(-1, -1));
    }

    #[test]
    fn weakest_enemy_targets_lowest_health() {
        let arena = layout_arena(
            8,
            8,
            &[
                (Archetype::Bulwark, Position::new(0, 0)),
                (Archetype::Melee, Position::new(7, 0)),
                (Archetype::Caster, Position::new(0, 7)),
            ],
            &[],
        );

        // Caster has the lowest base health (50).
        assert_eq!(arena.weakest_enemy(BotId(0)), Direction::new(0, 1));
    }

    #[test]
    fn self_heal_caps_and_rejects_dead_bots() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Bulwark, Position::new(1, 1)),
                (Archetype::Melee, Position::new(3, 3)),
            ],
            &[],
        );

        assert_eq!(arena.self_heal(BotId(0), 10), Ok((100, 100)));

        // Bulwark blows land for a net 10 each: 75 -> 65 -> ... -> 5 -> 0.
        for _ in 0..8 {
            arena.battle(BotId(0), BotId(1)).expect("blow");
        }
        assert!(!arena.snapshot(BotId(1)).expect("melee").alive);
        assert_eq!(
            arena.self_heal(BotId(1), 10),
            Err(Rejection::DeadBot(BotId(1)))
        );
    }

    #[test]
    fn remove_bot_clears_both_views_and_reports_departure() {
        let sink = CaptureSink::default();
        let arena = Arena::with_layout(
            grid_config(5, 5),
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Bulwark, Position::new(3, 3)),
            ],
            &[],
            Box::new(sink.clone()),
        )
        .expect("arena");

        let bot = arena.remove_bot(BotId(0)).expect("removed");
        assert_eq!(bot.id, BotId(0));
        assert_eq!(arena.bot_count(), 1);
        assert!(arena.snapshot(BotId(0)).is_none());
        assert!(arena.views_consistent());
        assert!(arena.is_game_over());

        let departed = sink
            .events()
            .into_iter()
            .find_map(|event| match event {
                ArenaEvent::BotDeparted { id, victorious, .. } => Some((id, victorious)),
                _ => None,
            })
            .expect("departure event");
        assert_eq!(departed, (BotId(0), true));

        assert!(arena.remove_bot(BotId(0)).is_none(), "slot is tombstoned");
    }

    #[test]
    fn attack_adjacent_resolves_within_one_critical_section() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(1, 1)),
                (Archetype::Bulwark, Position::new(2, 2)),
            ],
            &[],
        );
        let mut rng = SmallRng::seed_from_u64(3);

        let report = arena
            .attack_adjacent(BotId(0), &mut rng)
            .expect("attack")
            .expect("target found");
        assert_eq!(report.target, BotId(1));
        assert_eq!(report.target_health, 75);

        // Alone in the corner: no candidates.
        let lonely = layout_arena(5, 5, &[(Archetype::Melee, Position::new(0, 0))], &[]);
        assert_eq!(lonely.attack_adjacent(BotId(0), &mut rng), Ok(None));
    }

    #[test]
    fn battle_candidates_cover_moore_neighborhood_only() {
        let arena = layout_arena(
            5,
            5,
            &[
                (Archetype::Melee, Position::new(2, 2)),
                (Archetype::Bulwark, Position::new(1, 1)),
                (Archetype::Caster, Position::new(3, 2)),
                (Archetype::Ranged, Position::new(2, 4)),
            ],
            &[],
        );

        let mut candidates = arena.battle_candidates(BotId(0));
        candidates.sort();
        assert_eq!(candidates, vec![Position::new(1, 1), Position::new(3, 2)]);
    }
}
