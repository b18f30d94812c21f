use std::path::Path;

use log::{debug, trace, warn};
use slotmap::{new_key_type, SlotMap};

use crate::body::{Category, Collider, Contact};
use crate::config::WorldConfig;
use crate::error::WorldError;
use crate::quadtree::Quadtree;
use crate::rect::{Rect, Vec2};

new_key_type! {
    /// Handle to a body owned by a `World`. Stale after `despawn`.
    pub struct BodyKey;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// The proposed rectangle leaves the world bounds.
    OutOfBounds,
    /// Rolled back because this body blocked the mover.
    Blocked(BodyKey),
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved)
    }
}

/// Which index a body is filed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Layer {
    Static,
    Dynamic,
}

#[derive(Debug)]
struct Slot {
    body: Box<dyn Collider>,
    layer: Layer,
}

/// Owns every collidable body of a level and resolves movement and melee
/// against them.
///
/// Level geometry lives in a static index that is never re-filed; actors
/// and anything else that moves or can be hit live in the dynamic index.
/// Movement checks both, melee and seeking only the dynamic one.
pub struct World {
    config: WorldConfig,
    bodies: SlotMap<BodyKey, Slot>,
    statics: Quadtree<BodyKey>,
    dynamics: Quadtree<BodyKey>,
    /// Spawn order; `update` processes bodies in this order.
    order: Vec<BodyKey>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            statics: Quadtree::with_config(config.bounds, config.index),
            dynamics: Quadtree::with_config(config.bounds, config.index),
            bodies: SlotMap::with_key(),
            order: Vec::new(),
            config,
        }
    }

    /// Reads and validates a TOML config, then builds an empty world.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        Ok(Self::new(WorldConfig::load_from_file(path)?))
    }

    pub fn with_bounds(bounds: Rect) -> Self {
        Self::new(WorldConfig {
            bounds,
            ..WorldConfig::default()
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn bounds(&self) -> Rect {
        self.config.bounds
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contains(&self, key: BodyKey) -> bool {
        self.bodies.contains_key(key)
    }

    pub fn static_index(&self) -> &Quadtree<BodyKey> {
        &self.statics
    }

    pub fn dynamic_index(&self) -> &Quadtree<BodyKey> {
        &self.dynamics
    }

    /// Adds level geometry. Static bodies are never moved by the world.
    pub fn spawn_static<B: Collider + 'static>(&mut self, body: B) -> BodyKey {
        self.spawn_in(Box::new(body), Layer::Static)
    }

    pub fn spawn<B: Collider + 'static>(&mut self, body: B) -> BodyKey {
        self.spawn_in(Box::new(body), Layer::Dynamic)
    }

    fn spawn_in(&mut self, body: Box<dyn Collider>, layer: Layer) -> BodyKey {
        let rect = body.rect();
        let key = self.bodies.insert(Slot { body, layer });
        self.index_mut(layer).insert(key, rect);
        self.order.push(key);
        debug!("spawned {:?} body {:?} at {:?}", layer, key, rect);
        key
    }

    /// Unregisters `key` from its index and hands the body back.
    pub fn despawn(&mut self, key: BodyKey) -> Option<Box<dyn Collider>> {
        let slot = self.bodies.remove(key)?;
        self.index_mut(slot.layer).remove(key);
        self.order.retain(|k| *k != key);
        debug!("despawned body {:?}", key);
        Some(slot.body)
    }

    pub fn get(&self, key: BodyKey) -> Option<&dyn Collider> {
        self.bodies.get(key).map(|slot| slot.body.as_ref())
    }

    /// Geometry changes made through this reference reach the index only
    /// after `sync`.
    pub fn get_mut(&mut self, key: BodyKey) -> Option<&mut dyn Collider> {
        match self.bodies.get_mut(key) {
            Some(slot) => Some(slot.body.as_mut()),
            None => None,
        }
    }

    /// Re-files `key` under its current rectangle.
    pub fn sync(&mut self, key: BodyKey) -> Result<(), WorldError> {
        let slot = self.bodies.get(key).ok_or(WorldError::UnknownBody(key))?;
        let (rect, layer) = (slot.body.rect(), slot.layer);
        self.index_mut(layer).update(key, rect);
        Ok(())
    }

    pub fn is_inbounds(&self, rect: &Rect) -> bool {
        self.config.bounds.contains(rect)
    }

    /// Bodies from both indexes that may overlap `rect`.
    pub fn collidables_for(&self, rect: &Rect, out: &mut Vec<BodyKey>) {
        self.statics.retrieve(rect, out);
        self.dynamics.retrieve(rect, out);
    }

    /// Dynamic bodies that may overlap `rect`.
    pub fn dynamic_collidables_for(&self, rect: &Rect, out: &mut Vec<BodyKey>) {
        self.dynamics.retrieve(rect, out);
    }

    /// Moves `key` so its top-left corner lands on `position`, unless that
    /// leaves the world or some overlapping body blocks it. A rejected move
    /// leaves the body's rectangle and the indexes as they were before the
    /// call, even if a passing body's callback repositioned the mover.
    pub fn attempt_move(&mut self, key: BodyKey, position: Vec2) -> Result<MoveOutcome, WorldError> {
        let slot = self.bodies.get(key).ok_or(WorldError::UnknownBody(key))?;
        let layer = slot.layer;
        let before = slot.body.rect();
        let proposed = before.moved_to(position);

        if !self.is_inbounds(&proposed) {
            trace!("{:?} -> {:?} rejected: out of bounds", key, proposed);
            return Ok(MoveOutcome::OutOfBounds);
        }

        let mut candidates = Vec::new();
        self.collidables_for(&proposed, &mut candidates);

        for other in candidates {
            if other == key {
                continue;
            }
            let Some([mover, candidate]) = self.bodies.get_disjoint_mut([key, other]) else {
                continue;
            };
            if !candidate.body.can_collide_with(mover.body.as_ref())
                || !proposed.overlaps(&candidate.body.rect())
            {
                continue;
            }
            if candidate.body.handle_collision_with(mover.body.as_mut()) == Contact::Block {
                // Undo anything earlier callbacks did to the mover.
                mover.body.set_position(before.position());
                trace!("{:?} -> {:?} blocked by {:?}", key, proposed, other);
                return Ok(MoveOutcome::Blocked(other));
            }
        }

        let slot = &mut self.bodies[key];
        slot.body.set_position(position);
        let rect = slot.body.rect();
        self.index_mut(layer).update(key, rect);
        Ok(MoveOutcome::Moved)
    }

    pub fn move_by(&mut self, key: BodyKey, displacement: Vec2) -> Result<MoveOutcome, WorldError> {
        let position = self
            .bodies
            .get(key)
            .ok_or(WorldError::UnknownBody(key))?
            .body
            .rect()
            .position();
        self.attempt_move(key, position + displacement)
    }

    /// Applies `displacement` one axis at a time, horizontal first, so a
    /// body blocked on one axis still moves along the other. An axis with
    /// no displacement reports `Moved` without a check.
    pub fn slide(
        &mut self,
        key: BodyKey,
        displacement: Vec2,
    ) -> Result<(MoveOutcome, MoveOutcome), WorldError> {
        let horizontal = if displacement.x != 0.0 {
            self.move_by(key, Vec2::new(displacement.x, 0.0))?
        } else if self.contains(key) {
            MoveOutcome::Moved
        } else {
            return Err(WorldError::UnknownBody(key));
        };
        let vertical = if displacement.y != 0.0 {
            self.move_by(key, Vec2::new(0.0, displacement.y))?
        } else {
            MoveOutcome::Moved
        };
        Ok((horizontal, vertical))
    }

    /// Damages every vulnerable dynamic body that overlaps `hitbox` and
    /// accepts hits from `attacker`. Returns the bodies that were hit.
    pub fn query_melee_targets(
        &mut self,
        attacker: BodyKey,
        hitbox: &Rect,
    ) -> Result<Vec<BodyKey>, WorldError> {
        if !self.bodies.contains_key(attacker) {
            return Err(WorldError::UnknownBody(attacker));
        }
        let amount = self.config.melee_damage;

        let mut candidates = Vec::new();
        self.dynamic_collidables_for(hitbox, &mut candidates);

        let mut hit = Vec::new();
        for target in candidates {
            if target == attacker {
                continue;
            }
            let Some([source, victim]) = self.bodies.get_disjoint_mut([attacker, target]) else {
                continue;
            };
            let source = source.body.as_ref();
            if victim.body.can_collide_with(source)
                && victim.body.can_receive_damage_from(source)
                && hitbox.overlaps(&victim.body.rect())
                && victim.body.is_vulnerable()
            {
                victim.body.damage(source, amount);
                hit.push(target);
            }
        }
        trace!("{:?} melee over {:?} hit {} bodies", attacker, hitbox, hit.len());
        Ok(hit)
    }

    /// Closest dynamic body of `category` around `seeker`, keeping only
    /// bodies nearer than `max_distance` (center to center). The searched
    /// square has side `2 * reach` and is centred on the seeker's top-left
    /// corner, see `search_area`.
    pub fn seek(
        &self,
        seeker: BodyKey,
        category: Category,
        reach: f32,
        max_distance: f32,
    ) -> Result<Option<BodyKey>, WorldError> {
        let origin = self
            .bodies
            .get(seeker)
            .ok_or(WorldError::UnknownBody(seeker))?
            .body
            .rect();
        let area = search_area(&origin, reach);

        let mut candidates = Vec::new();
        self.dynamic_collidables_for(&area, &mut candidates);

        let mut selected = None;
        let mut best = max_distance;
        for key in candidates {
            if key == seeker {
                continue;
            }
            let Some(slot) = self.bodies.get(key) else {
                continue;
            };
            if slot.body.category() != Some(category) {
                continue;
            }
            let distance = slot.body.rect().distance(&origin);
            if distance < best {
                selected = Some(key);
                best = distance;
            }
        }
        Ok(selected)
    }

    /// Runs one frame: every body, in spawn order, advances its timers and
    /// has its requested displacement slid through the world. Dead bodies
    /// are despawned afterwards and returned.
    pub fn update(&mut self, dt: f32) -> Vec<BodyKey> {
        let order = self.order.clone();
        for key in order {
            let Some(slot) = self.bodies.get_mut(key) else {
                continue;
            };
            if let Some(displacement) = slot.body.tick(dt) {
                if let Err(err) = self.slide(key, displacement) {
                    warn!("frame update skipped {:?}: {}", key, err);
                }
            }
        }

        let dead: Vec<BodyKey> = self
            .order
            .iter()
            .copied()
            .filter(|key| self.bodies.get(*key).map_or(false, |slot| !slot.body.is_alive()))
            .collect();
        for key in &dead {
            self.despawn(*key);
        }
        dead
    }

    fn index_mut(&mut self, layer: Layer) -> &mut Quadtree<BodyKey> {
        match layer {
            Layer::Static => &mut self.statics,
            Layer::Dynamic => &mut self.dynamics,
        }
    }
}

/// Square of side `2 * reach` around the top-left corner of `origin`.
fn search_area(origin: &Rect, reach: f32) -> Rect {
    Rect::new(origin.x - reach, origin.y - reach, reach * 2.0, reach * 2.0)
}
