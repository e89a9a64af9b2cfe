//! Thread-safe store of entities and periodic commands.
//!
//! Everything sits behind one mutex, so a caller either sees a mutation
//! whole or not at all. [`Registry::safe_exec`] hands a closure the
//! locked [`Entities`] for multi-step updates. Listener notifications
//! raised while locked are queued and delivered after the lock is
//! released. Revoked subscribers are pruned under a second, short lock.
//!
//! Lock order is registry, then runner (through [`Locations`]). The
//! runner never takes the registry lock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use stellar_core::{
    dispatch, CommandId, EntityEvent, EntityId, EntityListener, EventKind, EventPayload,
    RegistryError,
};

use crate::command::{
    run_stop, run_tick, Command, CommandContext, CommandRecord, CommandState, PendingEvent,
};
use crate::entity::{Deposit, Entity, Ship};
use crate::seams::{AttributeSink, Locations};

// ── Entities ───────────────────────────────────────────────────────

/// Entities keyed by id, in creation order. Ids are unique across kinds.
#[derive(Debug, Default)]
pub struct Entities {
    map: IndexMap<EntityId, Entity>,
}

impl Entities {
    /// Look up an entity.
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.map.get(id)
    }

    /// Look up an entity mutably.
    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.map.get_mut(id)
    }

    /// Look up an entity or fail with `NotFound`.
    pub fn require(&self, id: &EntityId) -> Result<&Entity, RegistryError> {
        self.get(id).ok_or_else(|| RegistryError::not_found(id))
    }

    /// Look up an entity mutably or fail with `NotFound`.
    pub fn require_mut(&mut self, id: &EntityId) -> Result<&mut Entity, RegistryError> {
        self.map.get_mut(id).ok_or_else(|| RegistryError::not_found(id))
    }

    /// The ship `id`.
    pub fn ship(&self, id: &EntityId) -> Result<&Ship, RegistryError> {
        self.require(id)?.as_ship().ok_or_else(|| wrong_kind(id, "ship"))
    }

    /// The ship `id`, mutably.
    pub fn ship_mut(&mut self, id: &EntityId) -> Result<&mut Ship, RegistryError> {
        self.require_mut(id)?
            .as_ship_mut()
            .ok_or_else(|| wrong_kind(id, "ship"))
    }

    /// The deposit `id`.
    pub fn deposit(&self, id: &EntityId) -> Result<&Deposit, RegistryError> {
        self.require(id)?
            .as_deposit()
            .ok_or_else(|| wrong_kind(id, "deposit"))
    }

    /// The deposit `id`, mutably.
    pub fn deposit_mut(&mut self, id: &EntityId) -> Result<&mut Deposit, RegistryError> {
        self.require_mut(id)?
            .as_deposit_mut()
            .ok_or_else(|| wrong_kind(id, "deposit"))
    }

    /// Add an entity. An existing id is rejected, never overwritten.
    pub fn insert(&mut self, entity: Entity) -> Result<(), RegistryError> {
        let id = entity.id().clone();
        if self.map.contains_key(&id) {
            return Err(RegistryError::DuplicateId { id: id.0 });
        }
        self.map.insert(id, entity);
        Ok(())
    }

    /// Remove an entity, keeping the others in order.
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.map.shift_remove(id)
    }

    /// True if `id` exists.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.map.contains_key(id)
    }

    /// All entities in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.map.values()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if there are none.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot `event.entity`'s listeners for `event.kind`.
    pub(crate) fn pending(&self, event: EntityEvent) -> Option<PendingEvent> {
        let subscriptions = self
            .get(&event.entity)?
            .events()?
            .subscriptions(event.kind);
        (!subscriptions.is_empty()).then_some(PendingEvent {
            subscriptions,
            event,
        })
    }
}

fn wrong_kind(id: &EntityId, expected: &'static str) -> RegistryError {
    RegistryError::WrongKind {
        id: id.clone(),
        expected,
    }
}

// ── Reports ────────────────────────────────────────────────────────

/// Listener delivery totals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that failed.
    pub failed: usize,
    /// Subscriptions removed after revocation.
    pub revoked: usize,
}

/// What one command scheduler tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandTickReport {
    /// Commands ticked.
    pub ran: usize,
    /// Commands whose `execute` ran.
    pub executed: usize,
    /// Commands with a failing hook.
    pub failed: usize,
    /// Commands torn down after `remove` turned true.
    pub finished: Vec<CommandId>,
    /// Commands force-stopped because an entity they process went away.
    pub stopped: Vec<CommandId>,
    /// Listener delivery.
    pub delivery: Delivery,
}

// ── Registry ───────────────────────────────────────────────────────

#[derive(Default)]
struct Store {
    entities: Entities,
    commands: IndexMap<CommandId, Box<dyn Command>>,
}

/// Shared handle to entities and commands. Clones refer to the same
/// store.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<Store>>,
    locations: Arc<dyn Locations>,
    attributes: Arc<dyn AttributeSink>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Registry");
        if let Ok(store) = self.inner.lock() {
            s.field("entities", &store.entities.len())
                .field("commands", &store.commands.len());
        }
        s.finish_non_exhaustive()
    }
}

impl Registry {
    /// An empty registry over the given collaborators.
    pub fn new(locations: Arc<dyn Locations>, attributes: Arc<dyn AttributeSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Store::default())),
            locations,
            attributes,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, RegistryError> {
        self.inner.lock().map_err(|_| RegistryError::Poisoned)
    }

    // ── Entities ─────────────────────────────────────────────────

    /// Add an entity. Duplicate ids are rejected.
    pub fn create(&self, entity: impl Into<Entity>) -> Result<(), RegistryError> {
        let entity = entity.into();
        tracing::debug!(id = %entity.id(), kind = entity.kind(), "entity created");
        self.lock()?.entities.insert(entity)
    }

    /// Snapshot of one entity.
    pub fn get(&self, id: &EntityId) -> Result<Entity, RegistryError> {
        self.lock()?.entities.require(id).cloned()
    }

    /// Snapshots of every entity matching `predicate`, in creation order.
    pub fn find(&self, predicate: impl Fn(&Entity) -> bool) -> Result<Vec<Entity>, RegistryError> {
        Ok(self
            .lock()?
            .entities
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect())
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |s| s.entities.len())
    }

    /// True if there are no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` with exclusive access to every entity. No other reader or
    /// writer observes the store until `f` returns.
    pub fn safe_exec<T>(&self, f: impl FnOnce(&mut Entities) -> T) -> Result<T, RegistryError> {
        let mut store = self.lock()?;
        Ok(f(&mut store.entities))
    }

    /// Remove an entity. Commands that process it are stopped first, so
    /// their stop hooks still see it. Its position is released once no
    /// other entity refers to it.
    pub fn remove(&self, id: &EntityId) -> Result<Entity, RegistryError> {
        let (removed, events) = {
            let mut guard = self.lock()?;
            let Store { entities, commands } = &mut *guard;
            entities.require(id)?;
            let mut ctx = CommandContext::new(now(), entities, &*self.locations, &*self.attributes);
            ctx.stop_commands_for(id);
            let (_, stopped) = drain_stop_requests(commands, &mut ctx, 0);
            tracing::info!(%id, stopped = stopped.len(), "entity removed");
            let events = ctx.into_events();
            let removed = entities.remove(id);
            if let Some(position) = removed.as_ref().map(Entity::position_id) {
                // Loot keeps the wreck's position, so only release unshared ones.
                if !entities.iter().any(|e| e.position_id() == position) {
                    self.locations.release(position);
                }
            }
            (removed, events)
        };
        self.deliver(events)?;
        removed.ok_or_else(|| RegistryError::not_found(id))
    }

    /// Register `listener` for `kind` events on `entity`.
    pub fn subscribe(
        &self,
        entity: &EntityId,
        kind: EventKind,
        subscriber: impl Into<String>,
        listener: Arc<dyn EntityListener>,
    ) -> Result<(), RegistryError> {
        let mut store = self.lock()?;
        let target = store.entities.require_mut(entity)?;
        let events = target
            .events_mut()
            .ok_or_else(|| wrong_kind(entity, "ship or station"))?;
        events.subscribe(kind, subscriber, listener);
        Ok(())
    }

    /// Drop every listener `subscriber` registered on `entity`.
    pub fn unsubscribe(&self, entity: &EntityId, subscriber: &str) -> Result<usize, RegistryError> {
        let mut store = self.lock()?;
        Ok(store
            .entities
            .require_mut(entity)?
            .events_mut()
            .map_or(0, |d| d.unsubscribe(subscriber)))
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Schedule a command. A second command with the same id is rejected.
    pub fn add_command(&self, command: Box<dyn Command>) -> Result<(), RegistryError> {
        let mut store = self.lock()?;
        let id = command.id().clone();
        if store.commands.contains_key(&id) {
            return Err(RegistryError::DuplicateId { id: id.0 });
        }
        tracing::info!(command = %id, "command scheduled");
        store.commands.insert(id, command);
        Ok(())
    }

    /// Scheduled command ids in order.
    pub fn command_ids(&self) -> Result<Vec<CommandId>, RegistryError> {
        Ok(self.lock()?.commands.keys().cloned().collect())
    }

    /// Scheduling state of a command.
    pub fn command_state(&self, id: &CommandId) -> Result<CommandState, RegistryError> {
        self.lock()?
            .commands
            .get(id)
            .map(|c| *c.state())
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Merge `state`'s scheduling fields into a scheduled command.
    pub fn update_command(
        &self,
        id: &CommandId,
        state: &CommandState,
    ) -> Result<(), RegistryError> {
        let mut store = self.lock()?;
        let command = store
            .commands
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
        command.state_mut().merge(state);
        Ok(())
    }

    /// Stop and drop every command that processes `entity`. Each stop
    /// hook runs exactly once.
    pub fn stop_commands_for(&self, entity: &EntityId) -> Result<Vec<CommandId>, RegistryError> {
        let (stopped, events) = {
            let mut guard = self.lock()?;
            let Store { entities, commands } = &mut *guard;
            let mut ctx = CommandContext::new(now(), entities, &*self.locations, &*self.attributes);
            ctx.stop_commands_for(entity);
            let (_, stopped) = drain_stop_requests(commands, &mut ctx, 0);
            (stopped, ctx.into_events())
        };
        self.deliver(events)?;
        Ok(stopped)
    }

    /// Tick every command at the current wall-clock time.
    pub fn tick_commands(&self) -> Result<CommandTickReport, RegistryError> {
        self.tick_commands_at(now())
    }

    /// Tick every command in scheduling order as if the time were `now`
    /// (UNIX seconds).
    ///
    /// Hook failures are logged and isolated to their command. Stop
    /// requests raised by a hook take effect before the next command
    /// runs.
    pub fn tick_commands_at(&self, now: f64) -> Result<CommandTickReport, RegistryError> {
        let mut report = CommandTickReport::default();
        let events = {
            let mut guard = self.lock()?;
            let Store { entities, commands } = &mut *guard;
            let mut ctx = CommandContext::new(now, entities, &*self.locations, &*self.attributes);

            let mut cursor = 0;
            while let Some((_, command)) = commands.get_index_mut(cursor) {
                let outcome = run_tick(command.as_mut(), &mut ctx);
                report.ran += 1;
                report.executed += usize::from(outcome.executed);
                report.failed += usize::from(outcome.failed);
                if outcome.removed {
                    if let Some((id, _)) = commands.shift_remove_index(cursor) {
                        report.finished.push(id);
                    }
                } else {
                    cursor += 1;
                }
                let (next, stopped) = drain_stop_requests(commands, &mut ctx, cursor);
                cursor = next;
                report.stopped.extend(stopped);
            }
            ctx.into_events()
        };
        report.delivery = self.deliver(events)?;
        tracing::trace!(
            ran = report.ran,
            executed = report.executed,
            finished = report.finished.len(),
            stopped = report.stopped.len(),
            "command tick"
        );
        Ok(report)
    }

    // ── Transfer ─────────────────────────────────────────────────

    /// Move `quantity` of `material` from `src` to `dst` as one unit.
    ///
    /// Both sides are validated before anything changes.
    pub fn transfer_resource(
        &self,
        src: &EntityId,
        dst: &EntityId,
        material: &str,
        quantity: u32,
    ) -> Result<(), RegistryError> {
        let events = {
            let mut store = self.lock()?;
            let entities = &mut store.entities;
            self.validate_transfer(entities, src, dst, material, quantity)?;

            move_cargo(entities, src, dst, material, quantity)?;
            tracing::info!(%src, %dst, material, quantity, "resource transferred");

            let payload = EventPayload::Resource {
                material_id: material.to_owned(),
                quantity,
            };
            [
                EntityEvent::between(EventKind::TransferredTo, src, dst)
                    .with_payload(payload.clone()),
                EntityEvent::between(EventKind::TransferredFrom, dst, src).with_payload(payload),
            ]
            .into_iter()
            .filter_map(|e| entities.pending(e))
            .collect::<Vec<_>>()
        };
        self.deliver(events)?;
        Ok(())
    }

    fn validate_transfer(
        &self,
        entities: &Entities,
        src: &EntityId,
        dst: &EntityId,
        material: &str,
        quantity: u32,
    ) -> Result<(), RegistryError> {
        let reject = |reason: String| Err(RegistryError::TransferRejected { reason });
        let s = entities.require(src)?;
        let d = entities.require(dst)?;
        let (Some(range), Some(src_cargo)) = (s.transfer_distance(), s.cargo()) else {
            return Err(wrong_kind(src, "ship or station"));
        };
        let (Some(_), Some(dst_cargo)) = (d.transfer_distance(), d.cargo()) else {
            return Err(wrong_kind(dst, "ship or station"));
        };
        if src == dst {
            return reject("source and destination are the same".into());
        }
        if quantity == 0 {
            return reject("nothing to transfer".into());
        }
        if s.system_id() != d.system_id() {
            return reject(format!("{src} and {dst} are in different systems"));
        }
        let from = self.locations.coordinates_of(s.position_id());
        let to = self.locations.coordinates_of(d.position_id());
        match from.zip(to) {
            Some((a, b)) if a.distance(b) <= range => {}
            Some(_) => return reject(format!("{dst} is out of transfer range")),
            None => return reject("positions are not tracked".into()),
        }
        if src_cargo.quantity_of(material) < quantity {
            return reject(format!("{src} holds {} {material}", src_cargo.quantity_of(material)));
        }
        if !dst_cargo.can_accept(quantity) {
            return reject(format!("{dst} cannot accept {quantity} more units"));
        }
        Ok(())
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Every entity and every persistable command, in order.
    pub fn snapshot(&self) -> Result<(Vec<Entity>, Vec<CommandRecord>), RegistryError> {
        let store = self.lock()?;
        let entities = store.entities.iter().cloned().collect();
        let commands = store
            .commands
            .values()
            .filter_map(|c| {
                let record = c.record();
                if record.is_none() {
                    tracing::warn!(command = %c.id(), "command is not persistable; skipped");
                }
                record
            })
            .collect();
        Ok((entities, commands))
    }

    /// Replace all entities and commands. Nothing changes if an id
    /// repeats.
    pub fn restore(
        &self,
        entities: Vec<Entity>,
        commands: Vec<CommandRecord>,
    ) -> Result<(), RegistryError> {
        let mut rebuilt = Store::default();
        for entity in entities {
            rebuilt.entities.insert(entity)?;
        }
        for record in commands {
            let command = record.into_command();
            let id = command.id().clone();
            if rebuilt.commands.insert(id.clone(), command).is_some() {
                return Err(RegistryError::DuplicateId { id: id.0 });
            }
        }
        *self.lock()? = rebuilt;
        Ok(())
    }

    // ── Delivery ─────────────────────────────────────────────────

    fn deliver(&self, events: Vec<PendingEvent>) -> Result<Delivery, RegistryError> {
        let mut delivery = Delivery::default();
        let mut revoked = Vec::new();
        for pending in events {
            let report = dispatch(&pending.subscriptions, &pending.event);
            delivery.delivered += report.delivered;
            delivery.failed += report.failed;
            for subscriber in report.revoked {
                revoked.push((pending.event.entity.clone(), pending.event.kind, subscriber));
            }
        }
        if revoked.is_empty() {
            return Ok(delivery);
        }
        let mut store = self.lock()?;
        for (entity, kind, subscriber) in revoked {
            if let Some(table) = store.entities.get_mut(&entity).and_then(Entity::events_mut) {
                delivery.revoked += table.remove_kind_for(kind, &subscriber);
            }
        }
        Ok(delivery)
    }
}

/// Stop every command processing each requested entity, including
/// requests raised by the stop hooks themselves. `cursor` is the tick
/// loop's position; it is shifted back for each removal before it.
fn drain_stop_requests(
    commands: &mut IndexMap<CommandId, Box<dyn Command>>,
    ctx: &mut CommandContext<'_>,
    mut cursor: usize,
) -> (usize, Vec<CommandId>) {
    let mut stopped = Vec::new();
    while let Some(entity) = ctx.next_stop_request() {
        let mut i = 0;
        while i < commands.len() {
            let hit = commands
                .get_index(i)
                .is_some_and(|(_, c)| c.processes(&entity));
            if !hit {
                i += 1;
                continue;
            }
            if let Some((id, mut command)) = commands.shift_remove_index(i) {
                if i < cursor {
                    cursor -= 1;
                }
                run_stop(command.as_mut(), ctx);
                stopped.push(id);
            }
        }
    }
    (cursor, stopped)
}

/// Wall-clock UNIX seconds.
fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Credit `dst`, then debit `src`. A failed debit takes the credit back,
/// so either both holds change or neither does.
fn move_cargo(
    entities: &mut Entities,
    src: &EntityId,
    dst: &EntityId,
    material: &str,
    quantity: u32,
) -> Result<(), RegistryError> {
    entities
        .require_mut(dst)?
        .cargo_mut()
        .ok_or_else(|| wrong_kind(dst, "ship or station"))?
        .add(material, quantity)?;
    let debit = entities
        .require_mut(src)
        .and_then(|e| e.cargo_mut().ok_or_else(|| wrong_kind(src, "ship or station")))
        .and_then(|c| c.remove(material, quantity));
    if let Err(e) = debit {
        if let Some(cargo) = entities.get_mut(dst).and_then(Entity::cargo_mut) {
            // Credit was applied above, so this cannot come up short.
            let _ = cargo.remove(material, quantity);
        }
        tracing::warn!(%src, %dst, error = %e, "transfer rolled back");
        return Err(e);
    }
    Ok(())
}
