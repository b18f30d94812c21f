use std::fmt::Debug;

use crate::rect::{Rect, Vec2};

/// Faction an entity belongs to. Entities of one category never collide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Player,
    Enemy,
}

/// What a body decides when a mover steps onto it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Contact {
    /// The move is rejected.
    Block,
    /// The mover passes through.
    Pass,
}

/// Anything that can be placed in a `World`.
///
/// The defaults describe a plain static blocker: it collides with every
/// mover, blocks it, and cannot be hurt.
pub trait Collider: Debug {
    fn rect(&self) -> Rect;

    fn set_position(&mut self, position: Vec2);

    /// `None` for bodies that are not entities (tiles, walls).
    fn category(&self) -> Option<Category> {
        None
    }

    fn can_collide_with(&self, _other: &dyn Collider) -> bool {
        true
    }

    /// Called when `mover` would overlap this body. `mover` still has its
    /// pre-move geometry. If any body blocks, the world puts the mover back
    /// where it started, undoing repositioning done in earlier callbacks.
    fn handle_collision_with(&mut self, _mover: &mut dyn Collider) -> Contact {
        Contact::Block
    }

    fn can_receive_damage_from(&self, _attacker: &dyn Collider) -> bool {
        false
    }

    fn is_vulnerable(&self) -> bool {
        false
    }

    fn damage(&mut self, _from: &dyn Collider, _amount: i32) {}

    fn is_alive(&self) -> bool {
        true
    }

    /// Whether the body's own control logic may issue moves right now.
    fn can_move(&self) -> bool {
        self.is_alive()
    }

    fn health(&self) -> Option<i32> {
        None
    }

    /// Advances internal timers and returns the displacement the body
    /// wants applied this frame.
    fn tick(&mut self, _dt: f32) -> Option<Vec2> {
        None
    }
}

/// Impassable piece of level geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    rect: Rect,
}

impl Obstacle {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }
}

impl Collider for Obstacle {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn set_position(&mut self, position: Vec2) {
        self.rect = self.rect.moved_to(position);
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Action {
    Idle,
    /// Pushed away after taking a hit. Blocks voluntary movement.
    Knockback {
        direction: Vec2,
        intensity: f32,
        remaining: f32,
    },
}

/// A mob: player or enemy character.
#[derive(Clone, Debug)]
pub struct Actor {
    rect: Rect,
    category: Category,
    health: i32,
    speed: f32,
    action: Action,
}

impl Actor {
    pub const DEFAULT_HEALTH: i32 = 3;
    /// Units per second at intensity 1.
    pub const DEFAULT_SPEED: f32 = 60.0;
    pub const KNOCKBACK_INTENSITY: f32 = 10.0;
    pub const KNOCKBACK_DURATION: f32 = 0.1;

    pub fn new(rect: Rect, category: Category) -> Self {
        Self {
            rect,
            category,
            health: Self::DEFAULT_HEALTH,
            speed: Self::DEFAULT_SPEED,
            action: Action::Idle,
        }
    }

    pub fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Displacement for walking along `direction` for `dt` seconds.
    pub fn step(&self, direction: Vec2, intensity: f32, dt: f32) -> Vec2 {
        direction * intensity * dt * self.speed
    }
}

impl Collider for Actor {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn set_position(&mut self, position: Vec2) {
        self.rect = self.rect.moved_to(position);
    }

    fn category(&self) -> Option<Category> {
        Some(self.category)
    }

    fn can_collide_with(&self, other: &dyn Collider) -> bool {
        other.category() != Some(self.category)
    }

    fn can_receive_damage_from(&self, attacker: &dyn Collider) -> bool {
        attacker.category() != Some(self.category)
    }

    fn is_vulnerable(&self) -> bool {
        self.is_alive() && self.action == Action::Idle
    }

    fn damage(&mut self, from: &dyn Collider, amount: i32) {
        if !self.is_vulnerable() {
            return;
        }
        self.health = (self.health - amount).max(0);
        if !self.is_alive() {
            return;
        }

        let direction = (self.rect.center() - from.rect().center())
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec2::zeros);
        self.action = Action::Knockback {
            direction,
            intensity: Self::KNOCKBACK_INTENSITY,
            remaining: Self::KNOCKBACK_DURATION,
        };
    }

    fn is_alive(&self) -> bool {
        self.health > 0
    }

    fn can_move(&self) -> bool {
        self.is_alive() && self.action == Action::Idle
    }

    fn health(&self) -> Option<i32> {
        Some(self.health)
    }

    fn tick(&mut self, dt: f32) -> Option<Vec2> {
        let Action::Knockback {
            direction,
            intensity,
            remaining,
        } = self.action
        else {
            return None;
        };

        let displacement = self.step(direction, intensity, dt.min(remaining));
        let remaining = remaining - dt;
        self.action = if remaining > 0.0 {
            Action::Knockback {
                direction,
                intensity,
                remaining,
            }
        } else {
            Action::Idle
        };
        Some(displacement)
    }
}
