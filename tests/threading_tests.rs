use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{DMat3, DVec3};
use mobod::core::{Joint, JointType, Link, LinkId, MassProperties, Model, Transform};
use mobod::{EngineConfig, ModelId, World};

fn arm() -> Model {
    let mut model = Model::new("arm");
    for (name, x) in [("upper", 0.5), ("lower", 1.5)] {
        model.add_link(
            Link::new(name)
                .with_mass(MassProperties::new(1.0, DVec3::ZERO, DMat3::IDENTITY * 0.01))
                .with_pose(Transform::from_position(DVec3::new(x, 0.0, 0.0))),
        );
    }
    model.add_joint(
        Joint::new("shoulder", JointType::Revolute, None, "upper")
            .with_axis(DVec3::Y)
            .with_pose(Transform::from_position(DVec3::new(-0.5, 0.0, 0.0))),
    );
    model.add_joint(
        Joint::new("elbow", JointType::Revolute, Some("upper"), "lower")
            .with_axis(DVec3::Y)
            .with_pose(Transform::from_position(DVec3::new(-0.5, 0.0, 0.0))),
    );
    model
}

fn is_send<T: Send>() {}

#[test]
fn test_world_can_move_between_threads() {
    is_send::<World>();
    let mut world = World::new(EngineConfig::default()).unwrap();
    world.insert_model(arm()).unwrap();
    let handle = thread::spawn(move || {
        world.run(10).unwrap();
        world
    });
    let world = handle.join().unwrap();
    assert!((world.sim_time() - 0.01).abs() < 1e-12);
}

#[test]
fn test_held_physics_lock_blocks_stepping() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    world.insert_model(arm()).unwrap();
    let lock = world.physics_lock();
    let stepped = Arc::new(AtomicBool::new(false));

    let guard = lock.lock();
    let flag = Arc::clone(&stepped);
    let handle = thread::spawn(move || {
        world.step().unwrap();
        flag.store(true, Ordering::SeqCst);
        world
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!stepped.load(Ordering::SeqCst));
    drop(guard);

    let world = handle.join().unwrap();
    assert!(stepped.load(Ordering::SeqCst));
    assert!(world.sim_time() > 0.0);
}

#[test]
fn test_pose_queue_drains_while_world_steps() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    world.insert_model(arm()).unwrap();
    let queue = world.pose_queue();
    let done = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&done);
    let handle = thread::spawn(move || {
        world.run(100).unwrap();
        flag.store(true, Ordering::SeqCst);
    });

    let mut received = 0;
    while !done.load(Ordering::SeqCst) {
        received += queue.drain().len();
        thread::yield_now();
    }
    handle.join().unwrap();
    received += queue.drain().len();

    // Two links published per step.
    assert_eq!(received, 200);
}

#[test]
fn test_physics_lock_is_reentrant_on_the_stepping_thread() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    world.insert_model(arm()).unwrap();
    let lock = world.physics_lock();
    let _outer = lock.lock();
    world.step().unwrap();
    world.insert_model(arm()).unwrap();
    world.step().unwrap();
    assert_eq!(world.models().len(), 2);
}

/// Runs `op` on another thread while this thread holds the physics lock.
fn assert_waits_for_lock<F>(op: F)
where
    F: FnOnce(&mut World, ModelId) + Send + 'static,
{
    let mut world = World::new(EngineConfig::default()).unwrap();
    let id = world.insert_model(arm()).unwrap();
    let lock = world.physics_lock();
    let finished = Arc::new(AtomicBool::new(false));

    let guard = lock.lock();
    let flag = Arc::clone(&finished);
    let handle = thread::spawn(move || {
        op(&mut world, id);
        flag.store(true, Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!finished.load(Ordering::SeqCst));
    drop(guard);
    handle.join().unwrap();
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_held_lock_blocks_system_build_from_applied_force() {
    assert_waits_for_lock(|world, id| {
        let applied = world
            .engine_mut()
            .apply_link_force(id, LinkId(0), DVec3::X, DVec3::ZERO)
            .unwrap();
        assert!(applied);
    });
}

#[test]
fn test_held_lock_blocks_model_removal() {
    assert_waits_for_lock(|world, id| {
        world.remove_model(id).unwrap();
        assert!(world.models().is_empty());
    });
}

#[test]
fn test_held_lock_blocks_reset() {
    assert_waits_for_lock(|world, _| {
        world.reset().unwrap();
    });
}

#[test]
fn test_held_lock_blocks_gravity_change() {
    assert_waits_for_lock(|world, _| {
        world.set_gravity(DVec3::new(0.0, 0.0, -1.0));
    });
}
