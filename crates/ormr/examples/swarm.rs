//! Swarm: a few hundred drifting quads that expire, with a neighbour count
//! from the spatial index and a draw list standing in for a renderer.
//!
//! Run with `RUST_LOG=debug cargo run --example swarm` to watch the world
//! log object and system changes.

use std::cell::Cell;
use std::rc::Rc;

use ormr::prelude::*;

#[derive(Debug, Default)]
struct Velocity(Vec2);

impl Component for Velocity {
    fn dependencies(deps: &mut Dependencies) {
        deps.require::<Transform>();
    }
}

/// Seconds left before the object is removed.
#[derive(Debug, Default)]
struct Lifetime(f32);

impl Component for Lifetime {}

/// Broadcast by the reaper for every object it destroys.
struct Expired(ObjectHandle);

#[derive(Default)]
struct Drift;

impl System for Drift {
    fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()> {
        requirements.require::<Velocity>()?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
        ctx.for_each_tracked(|world, object| {
            let Ok(velocity) = world.get_component::<Velocity>(object) else {
                return;
            };
            let delta = velocity.0 * dt;
            if let Err(err) = world.translate(object, delta) {
                log::warn!("drift: {err}");
            }
        });
    }
}

struct Reaper {
    announcer: Option<EventTriggerer>,
}

impl System for Reaper {
    fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()> {
        requirements.require::<Lifetime>()?;
        Ok(())
    }

    fn on_startup(&mut self, ctx: &mut SystemHooks<'_>) {
        self.announcer = Some(ctx.events.triggerer());
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
        let mut expired = Vec::new();
        ctx.for_each_tracked(|world, object| {
            if let Ok(lifetime) = world.get_component_mut::<Lifetime>(object) {
                lifetime.0 -= dt;
                if lifetime.0 <= 0.0 {
                    expired.push(object);
                }
            }
        });
        for object in expired {
            if let Some(announcer) = &self.announcer {
                ctx.world.event_bus().emit(announcer.id(), &Expired(object));
            }
            if let Err(err) = ctx.world.destroy_object(object) {
                log::warn!("reaper: {err}");
            }
        }
    }
}

fn main() {
    env_logger::init();

    let mut world = World::new();
    world.add_system(Drift).expect("drift system");
    world
        .add_system(Reaper { announcer: None })
        .expect("reaper system");
    world.add_system(RenderSystem::new()).expect("render system");

    let expired = Rc::new(Cell::new(0));
    let receiver = world.event_bus().receiver();
    {
        let expired = expired.clone();
        world
            .event_bus()
            .subscribe(receiver.id(), move |_: &Expired| expired.set(expired.get() + 1));
    }

    for i in 0..300 {
        let angle = i as f32 * 0.618_034 * std::f32::consts::TAU;
        let position = Vec2::from_angle(angle) * (i as f32 * 2.0);
        let object = world.create_object(position, angle, Vec2::splat(4.0));
        world
            .add_component(object, Velocity(Vec2::from_angle(angle) * 60.0))
            .expect("velocity");
        world
            .add_component(object, Lifetime(1.0 + (i % 10) as f32 * 0.5))
            .expect("lifetime");
        world
            .add_component(
                object,
                Quad {
                    size: Vec2::splat(3.0),
                    color: [i as f32 / 300.0, 0.5, 1.0, 1.0],
                },
            )
            .expect("quad");
        world.set_z_order(object, i % 7).expect("z order");
    }

    let mut surface = DrawList::default();
    for frame in 0..240 {
        surface.clear();
        world.run_frame(1.0 / 60.0, &[], &mut surface);

        if frame % 60 == 0 {
            let crowd = world.nearby(Vec2::ZERO, 150.0).len();
            println!(
                "frame {frame:3}: {} objects, {} drawn, {crowd} near origin, {} expired",
                world.object_count(),
                surface.len(),
                expired.get()
            );
        }
    }

    world.process_event(&InputEvent::Closed);
    println!("done: {} objects left", world.object_count());
}
