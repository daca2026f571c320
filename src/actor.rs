//! Kinematic snapshots of the physical objects that drive grain emission.

use glam::{Quat, Vec3};

// -------------------------------------------------------------------------------------------------

/// A discrete collision event, as reported by the physics layer.
///
/// Each event carries a unique, increasing `id`, so emitters can tell a new collision apart
/// from the one they already reacted to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// Unique id of this collision event.
    pub id: u64,
    /// Relative velocity of the two colliding bodies.
    pub relative_velocity: Vec3,
    /// Impulse applied to resolve the collision.
    pub impulse: Vec3,
}

impl Collision {
    pub fn new(id: u64, relative_velocity: Vec3, impulse: Vec3) -> Self {
        Self {
            id,
            relative_velocity,
            impulse,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Read-only kinematic snapshot of a physical object.
///
/// Actors are owned and updated by the host application's physics layer. The engine only
/// receives per-frame copies via [`Engine::update_actor`](crate::Engine::update_actor).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actor {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    /// True while the actor is touching another body.
    pub is_colliding: bool,
    /// The most recent collision event, if any happened yet.
    pub last_collision: Option<Collision>,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 1.0,
            is_colliding: false,
            last_collision: None,
        }
    }
}

impl Actor {
    pub fn at_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Linear speed in units per second.
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Angular speed in radians per second.
    pub fn angular_speed(&self) -> f32 {
        self.angular_velocity.length()
    }

    /// Average of the actor's scale on all axes.
    pub fn uniform_scale(&self) -> f32 {
        (self.scale.x + self.scale.y + self.scale.z) / 3.0
    }

    /// Distance between this and the other actor's position.
    pub fn distance_to(&self, other: &Actor) -> f32 {
        self.position.distance(other.position)
    }

    /// Speed at which this and the other actor approach each other. Negative when the actors
    /// move apart.
    pub fn approach_speed(&self, other: &Actor) -> f32 {
        let direction = other.position - self.position;
        if direction.length_squared() <= f32::EPSILON {
            return 0.0;
        }
        let relative_velocity = self.velocity - other.velocity;
        relative_velocity.dot(direction.normalize())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approach_speed_sign() {
        let mut a = Actor::at_position(Vec3::ZERO);
        let mut b = Actor::at_position(Vec3::new(10.0, 0.0, 0.0));
        a.velocity = Vec3::new(2.0, 0.0, 0.0);
        b.velocity = Vec3::new(-1.0, 0.0, 0.0);
        assert!((a.approach_speed(&b) - 3.0).abs() < 1e-6);

        a.velocity = Vec3::new(-2.0, 0.0, 0.0);
        b.velocity = Vec3::ZERO;
        assert!(a.approach_speed(&b) < 0.0);

        // coincident actors
        let c = Actor::at_position(Vec3::ZERO);
        assert_eq!(a.approach_speed(&c), 0.0);
    }
}
