//! Demo content: a spinning turret firing projectiles at a ring of targets.

use keel_core::math::{Aabb, BoundingSphere, Quat, Transform, Vec3};
use keel_core::spatial::Region;
use keel_core::world::{
    Component, Context, Message, MessageTarget, ObjectDesc, RegistryError, TypeRegistry,
    UpdatePhase, World, WorldError, WorldModule,
};
use serde::{Deserialize, Serialize};

/// Spatial category of things projectiles can hit.
pub const TARGET: u32 = 1 << 0;
pub const PROJECTILE: u32 = 1 << 1;

const ARENA_RADIUS: f32 = 40.0;

#[derive(Debug)]
pub struct Hit {
    pub damage: f32,
}

keel_core::impl_message!(Hit);

/// Rotates its owner around the world up axis.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Spinner {
    pub radians_per_second: f32,
}

impl Component for Spinner {
    const TYPE_NAME: &'static str = "spinner";
    const UPDATE_PHASES: &'static [UpdatePhase] = &[UpdatePhase::Async];

    fn update(&mut self, _phase: UpdatePhase, ctx: &mut Context<'_>) {
        let Some(owner) = ctx.owner() else { return };
        let Some(local) = ctx.object(owner).map(|object| *object.local_transform()) else {
            return;
        };
        let up = ctx.coordinate_system().up;
        let step = Quat::from_axis_angle(up, self.radians_per_second * ctx.delta_seconds());
        ctx.set_local_transform(
            owner,
            Transform {
                rotation: step * local.rotation,
                ..local
            },
        );
    }
}

/// Flies along its owner's forward axis and damages the first target it
/// touches.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Projectile {
    pub speed: f32,
    pub damage: f32,
    pub seconds_left: f32,
}

impl Component for Projectile {
    const TYPE_NAME: &'static str = "projectile";
    const UPDATE_PHASES: &'static [UpdatePhase] = &[UpdatePhase::Async, UpdatePhase::PostTransform];

    fn update(&mut self, phase: UpdatePhase, ctx: &mut Context<'_>) {
        let Some(owner) = ctx.owner() else { return };
        match phase {
            UpdatePhase::Async => {
                self.seconds_left -= ctx.delta_seconds();
                if self.seconds_left <= 0.0 {
                    ctx.delete_object(owner);
                    return;
                }
                let (Some(global), Some(forward)) =
                    (ctx.global_transform(owner), ctx.global_forward(owner))
                else {
                    return;
                };
                let position = global.position + forward * self.speed * ctx.delta_seconds();
                ctx.set_global_transform(owner, Transform { position, ..global });
            }
            UpdatePhase::PostTransform => {
                let Some(global) = ctx.global_transform(owner) else { return };
                let reach = Region::from(BoundingSphere::new(global.position, 0.5));
                if let Some(target) = ctx.find_in_region(&reach, TARGET).next() {
                    tracing::trace!(projectile = %owner, hit_object = %target, "hit");
                    ctx.send_message(
                        MessageTarget::Event(target),
                        Hit {
                            damage: self.damage,
                        },
                    );
                    ctx.delete_object(owner);
                }
            }
            _ => {}
        }
    }
}

/// Hit points; the owner is deleted when they run out.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub points: f32,
}

impl Component for Health {
    const TYPE_NAME: &'static str = "health";

    fn on_message(&mut self, message: &mut dyn Message, ctx: &mut Context<'_>) -> bool {
        let Some(hit) = message.downcast_ref::<Hit>() else {
            return false;
        };
        self.points -= hit.damage;
        if self.points <= 0.0 {
            if let Some(owner) = ctx.owner() {
                tracing::debug!(target_object = %owner, "target destroyed");
                ctx.delete_object(owner);
            }
        }
        true
    }
}

/// Tracks how many targets are left in the arena.
#[derive(Debug, Default)]
pub struct Navigation {
    targets_in_arena: usize,
}

impl Navigation {
    pub fn targets_in_arena(&self) -> usize {
        self.targets_in_arena
    }
}

impl WorldModule for Navigation {
    const TYPE_NAME: &'static str = "navigation";
    const UPDATE_PHASES: &'static [UpdatePhase] = &[UpdatePhase::PostTransform];
    const DEPENDS_ON: &'static [&'static str] = &[Projectile::TYPE_NAME];

    fn update(&mut self, _phase: UpdatePhase, ctx: &mut Context<'_>) {
        let arena = Region::from(Aabb::from_center_half_extents(
            Vec3::ZERO,
            Vec3::splat(ARENA_RADIUS * 2.0),
        ));
        self.targets_in_arena = ctx.find_in_region(&arena, TARGET).count();
    }

    fn world_clear(&mut self) {
        self.targets_in_arena = 0;
    }
}

pub fn registry() -> Result<TypeRegistry, RegistryError> {
    let mut registry = TypeRegistry::new();
    registry.register_serializable_component::<Spinner>()?;
    registry.register_serializable_component::<Projectile>()?;
    registry.register_serializable_component::<Health>()?;
    registry.register_eager_module::<Navigation>()?;
    Ok(registry)
}

/// Populate `world` with a turret at the origin and `targets` targets on a
/// ring around it.
pub fn populate(world: &mut World, targets: usize) -> Result<(), WorldError> {
    let unit = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));

    let turret = world.create_object(ObjectDesc::new("turret").with_global_key("turret"))?;
    let barrel = world.create_object(ObjectDesc::new("barrel").with_parent(turret))?;
    world.create_component(
        barrel,
        Spinner {
            radians_per_second: std::f32::consts::FRAC_PI_2,
        },
    )?;

    let field = world.create_object(ObjectDesc::new("targets"))?;
    for i in 0..targets {
        let angle = i as f32 / targets.max(1) as f32 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * (ARENA_RADIUS * 0.25);
        let target = world.create_object(
            ObjectDesc::new(format!("target{i}"))
                .with_parent(field)
                .with_position(position)
                .with_bounds(unit)
                .with_category(TARGET)
                .with_team(2),
        )?;
        world.create_component(target, Health { points: 20.0 })?;

        let forward = world.desc().coordinate_system.forward;
        let aim = Quat::from_rotation_arc(forward, position.normalize_or_zero());
        let shot = world.create_object(
            ObjectDesc::new(format!("shot{i}"))
                .with_transform(Transform::new(Vec3::ZERO, aim, Vec3::ONE))
                .with_bounds(unit)
                .with_category(PROJECTILE)
                .with_team(1),
        )?;
        world.create_component(
            shot,
            Projectile {
                speed: 12.0,
                damage: 25.0,
                seconds_left: 3.0,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::time::TimeStep;
    use keel_core::world::WorldDesc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn projectiles_clear_the_ring() {
        let desc = WorldDesc {
            time_step: TimeStep::Fixed(Duration::from_millis(50)),
            ..WorldDesc::new("demo")
        };
        let mut world = World::new(desc, Arc::new(registry().unwrap())).unwrap();
        populate(&mut world, 6).unwrap();
        world.update().unwrap();
        assert_eq!(world.module::<Navigation>().map(Navigation::targets_in_arena), Some(6));

        for _ in 0..60 {
            world.update().unwrap();
        }
        assert_eq!(world.module::<Navigation>().map(Navigation::targets_in_arena), Some(0));
        assert!(world.object_by_global_key("turret").is_some());
        assert!(world.manager::<Projectile>().map_or(true, |m| m.is_empty()));
    }
}
