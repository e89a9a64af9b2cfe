//! Domain entities held by the [`Registry`](crate::Registry).
//!
//! Ships and stations are manufactured entities with cargo holds and
//! event listeners. Loot is what a destroyed ship leaves behind. Deposits
//! are the cosmos-side mineable resources the mining command drains.
//! Each entity references a runner position by [`PositionId`]; the
//! coordinates themselves live in the runner.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stellar_core::{EntityId, EventDispatch, PositionId, RegistryError};

// ── Cargo ──────────────────────────────────────────────────────────

/// A quantity of one material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStack {
    /// Material identifier.
    pub material_id: String,
    /// Units.
    pub quantity: u32,
}

/// A capacity-limited hold of materials, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cargo {
    /// Maximum total units.
    pub capacity: u32,
    resources: IndexMap<String, u32>,
}

impl Cargo {
    /// An empty hold.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            resources: IndexMap::new(),
        }
    }

    /// Total units held.
    pub fn total(&self) -> u32 {
        self.resources.values().fold(0u32, |acc, q| acc.saturating_add(*q))
    }

    /// Units of free space.
    pub fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.total())
    }

    /// True if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Units of `material` held.
    pub fn quantity_of(&self, material: &str) -> u32 {
        self.resources.get(material).copied().unwrap_or(0)
    }

    /// True if `quantity` more units fit.
    pub fn can_accept(&self, quantity: u32) -> bool {
        quantity <= self.free()
    }

    /// Contents as stacks, in insertion order.
    pub fn stacks(&self) -> Vec<ResourceStack> {
        self.resources
            .iter()
            .map(|(m, q)| ResourceStack {
                material_id: m.clone(),
                quantity: *q,
            })
            .collect()
    }

    /// Add `quantity` of `material`. Fails without change if it would
    /// exceed capacity.
    pub fn add(&mut self, material: &str, quantity: u32) -> Result<(), RegistryError> {
        if !self.can_accept(quantity) {
            return Err(RegistryError::TransferRejected {
                reason: format!(
                    "{quantity} {material} exceeds free capacity {}",
                    self.free()
                ),
            });
        }
        *self.resources.entry(material.to_owned()).or_insert(0) += quantity;
        Ok(())
    }

    /// Remove `quantity` of `material`. Fails without change if not
    /// enough is held. Emptied stacks are dropped.
    pub fn remove(&mut self, material: &str, quantity: u32) -> Result<(), RegistryError> {
        let held = self.quantity_of(material);
        if held < quantity {
            return Err(RegistryError::TransferRejected {
                reason: format!("holds {held} {material}, needs {quantity}"),
            });
        }
        if held == quantity {
            self.resources.shift_remove(material);
        } else if let Some(q) = self.resources.get_mut(material) {
            *q -= quantity;
        }
        Ok(())
    }

    /// Empty the hold, returning what it held.
    pub fn take_all(&mut self) -> Vec<ResourceStack> {
        let stacks = self.stacks();
        self.resources.clear();
        stacks
    }
}

// ── Ship ───────────────────────────────────────────────────────────

/// A user-owned ship.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ship {
    /// Identity.
    pub id: EntityId,
    /// Owning user.
    pub user_id: String,
    /// Solar system the ship is in.
    pub system_id: String,
    /// Runner position.
    pub position_id: PositionId,
    /// Hit points. Zero means destroyed.
    pub hp: u32,
    /// Shield absorbs damage before hp.
    pub shield_level: u32,
    /// Damage per attack cycle.
    pub damage_dealt: u32,
    /// Maximum attack range.
    pub attack_distance: f64,
    /// Maximum mining range.
    pub mining_distance: f64,
    /// Units mined per cycle.
    pub mining_quantity: u32,
    /// Maximum transfer range.
    pub transfer_distance: f64,
    /// Hold.
    pub cargo: Cargo,
    /// Ship currently being attacked.
    pub attacking: Option<EntityId>,
    /// Deposit currently being mined.
    pub mining: Option<EntityId>,
    /// Who destroyed this ship.
    pub destroyed_by: Option<EntityId>,
    /// Listeners. Runtime only.
    #[serde(skip)]
    pub events: EventDispatch,
}

impl Ship {
    /// A ship with default combat and mining stats.
    pub fn new(
        id: impl Into<EntityId>,
        user_id: impl Into<String>,
        system_id: impl Into<String>,
        position_id: PositionId,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            system_id: system_id.into(),
            position_id,
            hp: 25,
            shield_level: 0,
            damage_dealt: 0,
            attack_distance: 100.0,
            mining_distance: 100.0,
            mining_quantity: 5,
            transfer_distance: 100.0,
            cargo: Cargo::new(100),
            attacking: None,
            mining: None,
            destroyed_by: None,
            events: EventDispatch::new(),
        }
    }

    /// True while hp is above zero.
    pub fn alive(&self) -> bool {
        self.hp > 0
    }

    /// Whether this ship may attack `defender` from `distance` away.
    pub fn can_attack(&self, defender: &Ship, distance: f64) -> bool {
        self.alive()
            && defender.alive()
            && self.id != defender.id
            && self.system_id == defender.system_id
            && distance <= self.attack_distance
            && self.mining.is_none()
            && self.attacking.as_ref().is_none_or(|t| *t == defender.id)
            && self.damage_dealt > 0
    }

    /// Whether this ship may mine `deposit` from `distance` away.
    pub fn can_mine(&self, deposit: &Deposit, distance: f64) -> bool {
        self.alive()
            && self.system_id == deposit.system_id
            && distance <= self.mining_distance
            && deposit.quantity > 0
            && self.cargo.free() > 0
            && self.mining_quantity > 0
    }

    /// Apply one attack's worth of `damage`: the shield absorbs first,
    /// the remainder reduces hp. Both clamp at zero. Returns true if this
    /// hit destroyed the ship.
    pub fn absorb(&mut self, damage: u32) -> bool {
        if damage <= self.shield_level {
            self.shield_level -= damage;
            return false;
        }
        let spill = damage - self.shield_level;
        self.shield_level = 0;
        let was_alive = self.alive();
        self.hp = self.hp.saturating_sub(spill);
        was_alive && !self.alive()
    }
}

// ── Station ────────────────────────────────────────────────────────

/// A user-owned station.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Station {
    /// Identity.
    pub id: EntityId,
    /// Owning user.
    pub user_id: String,
    /// Solar system.
    pub system_id: String,
    /// Runner position.
    pub position_id: PositionId,
    /// Maximum transfer range.
    pub transfer_distance: f64,
    /// Hold.
    pub cargo: Cargo,
    /// Listeners. Runtime only.
    #[serde(skip)]
    pub events: EventDispatch,
}

impl Station {
    /// A station with a 10 000 unit hold.
    pub fn new(
        id: impl Into<EntityId>,
        user_id: impl Into<String>,
        system_id: impl Into<String>,
        position_id: PositionId,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            system_id: system_id.into(),
            position_id,
            transfer_distance: 100.0,
            cargo: Cargo::new(10_000),
            events: EventDispatch::new(),
        }
    }
}

// ── Loot / Deposit ─────────────────────────────────────────────────

/// Cargo left floating where a ship was destroyed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Loot {
    /// Identity, `<ship>-loot`.
    pub id: EntityId,
    /// Solar system.
    pub system_id: String,
    /// Shared with the destroyed ship.
    pub position_id: PositionId,
    /// What was recovered.
    pub cargo: Cargo,
}

/// A mineable resource in a solar system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    /// Identity.
    pub id: EntityId,
    /// Solar system.
    pub system_id: String,
    /// Runner position.
    pub position_id: PositionId,
    /// Material yielded.
    pub material_id: String,
    /// Units remaining.
    pub quantity: u32,
}

// ── Entity ─────────────────────────────────────────────────────────

/// Anything the registry holds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// A ship.
    Ship(Ship),
    /// A station.
    Station(Station),
    /// Loot.
    Loot(Loot),
    /// A deposit.
    Deposit(Deposit),
}

impl Entity {
    /// Identity.
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Ship(s) => &s.id,
            Self::Station(s) => &s.id,
            Self::Loot(l) => &l.id,
            Self::Deposit(d) => &d.id,
        }
    }

    /// Kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ship(_) => "ship",
            Self::Station(_) => "station",
            Self::Loot(_) => "loot",
            Self::Deposit(_) => "deposit",
        }
    }

    /// Solar system.
    pub fn system_id(&self) -> &str {
        match self {
            Self::Ship(s) => &s.system_id,
            Self::Station(s) => &s.system_id,
            Self::Loot(l) => &l.system_id,
            Self::Deposit(d) => &d.system_id,
        }
    }

    /// Runner position.
    pub fn position_id(&self) -> PositionId {
        match self {
            Self::Ship(s) => s.position_id,
            Self::Station(s) => s.position_id,
            Self::Loot(l) => l.position_id,
            Self::Deposit(d) => d.position_id,
        }
    }

    /// Owning user, for manufactured entities.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Ship(s) => Some(&s.user_id),
            Self::Station(s) => Some(&s.user_id),
            Self::Loot(_) | Self::Deposit(_) => None,
        }
    }

    /// Listener table, for entities that carry one.
    pub fn events(&self) -> Option<&EventDispatch> {
        match self {
            Self::Ship(s) => Some(&s.events),
            Self::Station(s) => Some(&s.events),
            Self::Loot(_) | Self::Deposit(_) => None,
        }
    }

    /// Mutable listener table.
    pub fn events_mut(&mut self) -> Option<&mut EventDispatch> {
        match self {
            Self::Ship(s) => Some(&mut s.events),
            Self::Station(s) => Some(&mut s.events),
            Self::Loot(_) | Self::Deposit(_) => None,
        }
    }

    /// Cargo hold, for entities that have one.
    pub fn cargo(&self) -> Option<&Cargo> {
        match self {
            Self::Ship(s) => Some(&s.cargo),
            Self::Station(s) => Some(&s.cargo),
            Self::Loot(l) => Some(&l.cargo),
            Self::Deposit(_) => None,
        }
    }

    /// Mutable cargo hold.
    pub fn cargo_mut(&mut self) -> Option<&mut Cargo> {
        match self {
            Self::Ship(s) => Some(&mut s.cargo),
            Self::Station(s) => Some(&mut s.cargo),
            Self::Loot(l) => Some(&mut l.cargo),
            Self::Deposit(_) => None,
        }
    }

    /// Transfer range, for ships and stations.
    pub fn transfer_distance(&self) -> Option<f64> {
        match self {
            Self::Ship(s) => Some(s.transfer_distance),
            Self::Station(s) => Some(s.transfer_distance),
            Self::Loot(_) | Self::Deposit(_) => None,
        }
    }

    /// The ship, if this is one.
    pub fn as_ship(&self) -> Option<&Ship> {
        match self {
            Self::Ship(s) => Some(s),
            _ => None,
        }
    }

    /// The mutable ship, if this is one.
    pub fn as_ship_mut(&mut self) -> Option<&mut Ship> {
        match self {
            Self::Ship(s) => Some(s),
            _ => None,
        }
    }

    /// The deposit, if this is one.
    pub fn as_deposit(&self) -> Option<&Deposit> {
        match self {
            Self::Deposit(d) => Some(d),
            _ => None,
        }
    }

    /// The mutable deposit, if this is one.
    pub fn as_deposit_mut(&mut self) -> Option<&mut Deposit> {
        match self {
            Self::Deposit(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Ship> for Entity {
    fn from(v: Ship) -> Self {
        Self::Ship(v)
    }
}

impl From<Station> for Entity {
    fn from(v: Station) -> Self {
        Self::Station(v)
    }
}

impl From<Loot> for Entity {
    fn from(v: Loot) -> Self {
        Self::Loot(v)
    }
}

impl From<Deposit> for Entity {
    fn from(v: Deposit) -> Self {
        Self::Deposit(v)
    }
}
