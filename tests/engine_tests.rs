use approx::{assert_abs_diff_eq, assert_relative_eq};
use glam::{DMat3, DQuat, DVec3};
use mobod::core::{Collision, Joint, JointId, JointType, Link, LinkId, MassProperties, Model, Shape, Transform};
use mobod::dynamics::Kinematics;
use mobod::utils::InertiaTensorExt;
use mobod::{
    create_engine, Arena, EngineConfig, EngineContext, MultibodyEngine, PhysicsEngine, PhysicsError, SolverError,
    TopologyError, UnsupportedElementError, World,
};

fn body(name: &str, position: DVec3) -> Link {
    Link::new(name)
        .with_mass(MassProperties::new(1.0, DVec3::ZERO, DMat3::IDENTITY * 0.01))
        .with_pose(Transform::from_position(position))
}

fn weightless() -> EngineConfig {
    EngineConfig::default().with_gravity([0.0, 0.0, 0.0])
}

fn started_engine(config: &EngineConfig) -> MultibodyEngine {
    let mut engine = MultibodyEngine::new(EngineContext::new());
    engine.load(config).unwrap();
    engine.init().unwrap();
    engine
}

/// Bob one metre out along +X, hinged about Y at the world origin.
fn pendulum() -> Model {
    let mut model = Model::new("pendulum");
    model.add_link(body("bob", DVec3::new(1.0, 0.0, 0.0)));
    model.add_joint(
        Joint::new("pivot", JointType::Revolute, None, "bob")
            .with_axis(DVec3::Y)
            .with_pose(Transform::from_position(DVec3::new(-1.0, 0.0, 0.0))),
    );
    model
}

fn four_bar() -> Model {
    let mut model = Model::new("four_bar");
    let corners = [
        DVec3::ZERO,
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::new(1.0, 0.0, 1.0),
        DVec3::new(0.0, 0.0, 1.0),
    ];
    let names = ["l1", "l2", "l3", "l4"];
    for (name, corner) in names.iter().zip(corners) {
        model.add_link(body(name, corner));
    }
    for i in 0..4 {
        model.add_joint(
            Joint::new(format!("j{}", i + 1), JointType::Revolute, Some(names[i]), names[(i + 1) % 4])
                .with_axis(DVec3::Y),
        );
    }
    model
}

#[test]
fn test_gravity_direction_and_magnitude() {
    let mut engine = MultibodyEngine::new(EngineContext::new());
    engine.set_gravity(DVec3::new(0.0, 0.0, -9.8));
    let gravity = engine.gravity();
    assert!((gravity.direction - DVec3::new(0.0, 0.0, -1.0)).length() < 1e-12);
    assert_relative_eq!(gravity.magnitude, 9.8);

    engine.set_gravity(DVec3::ZERO);
    let gravity = engine.gravity();
    assert_eq!(gravity.magnitude, 0.0);
    assert!(gravity.direction.is_finite());
    assert_eq!(gravity.vector(), DVec3::ZERO);
}

#[test]
fn test_factory_knows_multibody_only() {
    let engine = create_engine("multibody", EngineContext::new()).unwrap();
    assert_eq!(engine.name(), "multibody");
    assert!(matches!(
        create_engine("bullet", EngineContext::new()),
        Err(PhysicsError::UnknownEngine(_))
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut engine = MultibodyEngine::new(EngineContext::new());
    let config = EngineConfig::default().with_step_time(0.0);
    assert!(matches!(
        engine.load(&config),
        Err(PhysicsError::InvalidConfig { .. })
    ));
}

#[test]
fn test_two_link_revolute_scenario() {
    let mut engine = started_engine(&EngineConfig::default());
    let mut arena = Arena::new();
    let mut model = Model::new("arm");
    model.add_link(body("upper", DVec3::ZERO));
    model.add_link(body("lower", DVec3::new(0.0, 0.0, -1.0)));
    model.add_joint(Joint::new("elbow", JointType::Revolute, Some("upper"), "lower"));
    let id = arena.insert(model.clone());

    engine.init_model(id, &model).unwrap();
    engine.update_physics(&mut arena, 0.001).unwrap();

    let system = engine.system().unwrap();
    assert_eq!(system.num_masters(), 2);
    assert_eq!(system.count_kind("pin"), 1);
    assert_eq!(system.num_slaves(), 0);
    assert_eq!(engine.context().poses.drain().len(), 2);
    assert!(engine.time() >= 0.001);
}

#[test]
fn test_four_link_loop_scenario_keeps_weld_closed() {
    let mut engine = started_engine(&weightless());
    let mut arena = Arena::new();
    let model = four_bar();
    let id = arena.insert(model.clone());
    engine.init_model(id, &model).unwrap();

    let mut target = 0.0;
    for _ in 0..200 {
        target += 0.001;
        assert!(engine.apply_joint_force(id, JointId(0), 0, 0.5).unwrap());
        engine.update_physics(&mut arena, target).unwrap();
    }

    let system = engine.system().unwrap();
    assert_eq!(system.num_slaves(), 1);
    assert_eq!(system.welds.len(), 1);
    assert_eq!(system.count_kind("pin"), 4);

    let kin = Kinematics::compute(system, engine.state());
    let weld = system.welds[0];
    assert!(kin.poses[weld.master].abs_diff_eq(&kin.poses[weld.slave], 1e-3));
    let angle = engine.joint_position(id, JointId(0), 0).unwrap();
    assert!(angle.abs() > 1e-4, "j1 did not move: {angle}");
}

#[test]
fn test_pendulum_swings_down() {
    let mut engine = started_engine(&EngineConfig::default());
    let mut arena = Arena::new();
    let model = pendulum();
    let id = arena.insert(model.clone());
    engine.init_model(id, &model).unwrap();

    let mut target = 0.0;
    for _ in 0..200 {
        target += 0.001;
        engine.update_physics(&mut arena, target).unwrap();
        assert!(engine.time() >= target);
    }

    let angle = engine.joint_position(id, JointId(0), 0).unwrap();
    // Small-angle estimate: g t^2 / 2 over a one metre arm.
    assert!(angle > 0.1 && angle < 0.3, "angle {angle}");
    let bob = arena.get(id).unwrap().link(LinkId(0)).unwrap().world_pose;
    assert!(bob.position.z < 0.0);
    assert_abs_diff_eq!(bob.position.length(), 1.0, epsilon = 1e-3);
}

#[test]
fn test_one_shot_forces_are_cleared_after_update() {
    let mut engine = started_engine(&weightless());
    let mut arena = Arena::new();
    let mut model = Model::new("puck");
    model.add_link(body("puck", DVec3::ZERO));
    let id = arena.insert(model.clone());
    engine.init_model(id, &model).unwrap();

    assert!(engine
        .apply_link_force(id, LinkId(0), DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO)
        .unwrap());
    engine.update_physics(&mut arena, 0.001).unwrap();
    assert_relative_eq!(engine.state().u[5], 0.01, max_relative = 1e-6);

    engine.update_physics(&mut arena, 0.002).unwrap();
    assert_relative_eq!(engine.state().u[5], 0.01, max_relative = 1e-6);

    assert!(engine.apply_link_torque(id, LinkId(0), DVec3::new(0.0, 0.0, 0.01)).unwrap());
    engine.update_physics(&mut arena, 0.003).unwrap();
    // Spin about Z of a body with 0.01 kg m^2 inertia.
    assert_relative_eq!(engine.state().u[2], 0.001, max_relative = 1e-6);
    assert!(!engine.apply_link_force(id, LinkId(7), DVec3::X, DVec3::ZERO).unwrap());
}

#[test]
fn test_reversed_joint_reads_back_in_joint_convention() {
    let mut engine = started_engine(&EngineConfig::default());
    let mut arena = Arena::new();
    let offset = Transform::from_rotation(DQuat::from_rotation_z(0.3));
    let mut model = Model::new("elbow");
    model.add_link(body("base", DVec3::ZERO));
    model.add_link(body("arm", DVec3::new(1.0, 0.0, 0.0)));
    model.add_joint(Joint::new("anchor", JointType::Revolute, None, "base").with_initial_offset(offset));
    model.add_joint(Joint::new("elbow", JointType::Revolute, Some("arm"), "base").with_initial_offset(offset));
    let id = arena.insert(model.clone());
    engine.init_model(id, &model).unwrap();
    assert!(engine.graph(id).unwrap().mobilizers[1].reversed);

    engine.update_physics(&mut arena, 0.0).unwrap();
    assert_abs_diff_eq!(engine.joint_position(id, JointId(0), 0).unwrap(), 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(engine.joint_position(id, JointId(1), 0).unwrap(), 0.3, epsilon = 1e-12);
    assert!(engine.joint_position(id, JointId(1), 1).is_none());
}

#[test]
fn test_topology_errors_surface_from_init_model() {
    let mut engine = MultibodyEngine::new(EngineContext::new());
    let mut model = Model::new("broken");
    model.add_link(body("a", DVec3::ZERO));
    model.add_joint(Joint::new("j", JointType::Revolute, Some("a"), "missing"));
    let mut arena = Arena::new();
    let id = arena.insert(model.clone());

    assert_eq!(engine.init_model(id, &model), Err(PhysicsError::NotInitialized));
    engine.init().unwrap();
    let err = engine.init_model(id, &model).unwrap_err();
    assert!(matches!(
        err,
        PhysicsError::Topology(TopologyError::UnknownLink { .. })
    ));
}

#[test]
fn test_create_elements_by_type_name() {
    let engine = started_engine(&EngineConfig::default());
    let model = Model::new("factory");

    let joint = engine.create_joint("prismatic", &model).unwrap();
    assert_eq!(joint.joint_type, JointType::Prismatic);
    assert_eq!(
        engine.create_joint("revolute2", &model),
        Err(UnsupportedElementError::JointType("revolute2".to_string()))
    );
    assert_eq!(
        engine.create_joint("gearbox", &model).unwrap_err().to_string(),
        "unable to create joint of type [gearbox]"
    );

    let link = engine.create_link(&model, "wheel");
    assert_eq!(link.name, "wheel");
    let collision = engine.create_collision("trimesh", &link).unwrap();
    assert!(matches!(collision.shape, Shape::Mesh { .. }));
    assert_eq!(collision.material, engine.config().contact_material);
    assert!(matches!(
        engine.create_collision("cone", &link),
        Err(UnsupportedElementError::ShapeType(_))
    ));
}

#[test]
fn test_sphere_comes_to_rest_on_ground_plane() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    let mut ground = Model::new("ground").with_static(true);
    ground.add_link(Link::new("floor").with_collision(Collision::new("plane", Shape::Plane { normal: DVec3::Z })));
    world.insert_model(ground).unwrap();

    let mut ball = Model::new("ball");
    ball.add_link(
        Link::new("ball")
            .with_mass(MassProperties::new(1.0, DVec3::ZERO, DMat3::for_solid_sphere(0.1, 1.0)))
            .with_pose(Transform::from_position(DVec3::new(0.0, 0.0, 0.5)))
            .with_collision(Collision::new("sphere", Shape::Sphere { radius: 0.1 })),
    );
    let ball_id = world.insert_model(ball).unwrap();

    let mut lowest = f64::INFINITY;
    for _ in 0..1000 {
        world.step().unwrap();
        let z = world.model(ball_id).unwrap().link(LinkId(0)).unwrap().world_pose.position.z;
        lowest = lowest.min(z);
    }
    // Reached the floor (centre one radius up, less the penetration) without sinking through it.
    assert!(lowest < 0.1, "ball never touched the floor: {lowest}");
    assert!(lowest > 0.05, "ball sank to {lowest}");
    assert_abs_diff_eq!(world.sim_time(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_removing_a_model_keeps_the_others_moving() {
    let mut world = World::new(weightless()).unwrap();
    let mut a = Model::new("a");
    a.add_link(body("a", DVec3::ZERO));
    let mut b = Model::new("b");
    b.add_link(body("b", DVec3::new(5.0, 0.0, 0.0)));
    let a_id = world.insert_model(a).unwrap();
    let b_id = world.insert_model(b).unwrap();

    world
        .engine_mut()
        .apply_link_force(a_id, LinkId(0), DVec3::new(10.0, 0.0, 0.0), DVec3::ZERO)
        .unwrap();
    world.step().unwrap();

    let removed = world.remove_model(b_id).unwrap();
    assert_eq!(removed.name, "b");
    assert!(world.model(b_id).is_none());
    assert!(matches!(world.remove_model(b_id), Err(PhysicsError::UnknownModel(_))));

    world.run(10).unwrap();
    let x = world.model(a_id).unwrap().link(LinkId(0)).unwrap().world_pose.position.x;
    // 0.01 m/s carried across the rebuild for ten more milliseconds.
    assert!(x > 1e-4, "velocity lost on rebuild: {x}");
}

#[test]
fn test_failed_engine_removal_keeps_the_model() {
    let mut world = World::new(weightless()).unwrap();
    let id = world.insert_model(pendulum()).unwrap();
    world.engine_mut().fini();

    assert!(matches!(world.remove_model(id), Err(PhysicsError::UnknownModel(_))));
    assert_eq!(world.model(id).unwrap().name, "pendulum");
}

#[test]
fn test_solver_error_propagates_from_update_physics() {
    let mut engine = started_engine(&EngineConfig::default());
    let mut arena = Arena::new();
    let mut model = Model::new("ghost");
    model.add_link(
        Link::new("ghost")
            .with_mass(MassProperties::new(0.0, DVec3::ZERO, DMat3::ZERO))
            .with_pose(Transform::from_position(DVec3::new(1.0, 0.0, 0.0))),
    );
    model.add_joint(Joint::new("hinge", JointType::Revolute, None, "ghost").with_axis(DVec3::Y));
    let id = arena.insert(model.clone());
    engine.init_model(id, &model).unwrap();

    assert!(engine.apply_joint_force(id, JointId(0), 0, 1.0).unwrap());
    assert!(engine.loads().mobility_forces.iter().any(|f| *f != 0.0));

    let result = engine.update_physics(&mut arena, 0.001);
    assert!(
        matches!(result, Err(PhysicsError::Solver(SolverError::SingularMassMatrix { .. }))),
        "unexpected result {result:?}"
    );
    assert!(engine.loads().mobility_forces.iter().all(|f| *f == 0.0));
    assert!(engine.loads().body_forces.iter().all(|f| *f == mobod::utils::SpatialVec::ZERO));
}

#[test]
fn test_reset_returns_to_default_configuration() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    let id = world.insert_model(pendulum()).unwrap();
    world.run(100).unwrap();
    assert!(world.engine().joint_position(id, JointId(0), 0).unwrap() > 0.01);

    world.reset().unwrap();
    assert_eq!(world.sim_time(), 0.0);
    let bob = world.model(id).unwrap().link(LinkId(0)).unwrap().world_pose;
    assert!(bob.abs_diff_eq(&Transform::from_position(DVec3::new(1.0, 0.0, 0.0)), 1e-12));

    world.step().unwrap();
    assert_abs_diff_eq!(world.engine().time(), 0.001, epsilon = 1e-12);
    assert!(world.engine().joint_position(id, JointId(0), 0).unwrap() < 1e-4);
}

#[test]
fn test_pause_withholds_steps() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    world.insert_model(pendulum()).unwrap();
    world.set_paused(true);
    assert!(!world.step().unwrap());
    assert_eq!(world.run(5).unwrap(), 0);
    assert_eq!(world.sim_time(), 0.0);

    world.step_once().unwrap();
    assert_abs_diff_eq!(world.sim_time(), 0.001, epsilon = 1e-15);
    world.set_paused(false);
    assert_eq!(world.run(4).unwrap(), 4);
    assert_abs_diff_eq!(world.sim_time(), 0.005, epsilon = 1e-12);
}

#[test]
fn test_static_model_poses_are_published_every_step() {
    let mut world = World::new(EngineConfig::default()).unwrap();
    let mut shelf = Model::new("shelf")
        .with_static(true)
        .with_pose(Transform::from_position(DVec3::new(0.0, 0.0, 1.0)));
    shelf.add_link(body("board", DVec3::new(2.0, 0.0, 0.0)));
    let id = world.insert_model(shelf).unwrap();
    let queue = world.pose_queue();

    world.run(3).unwrap();
    let updates = queue.drain();
    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|u| u.link.model == id));
    assert!((updates[0].pose.position - DVec3::new(2.0, 0.0, 1.0)).length() < 1e-12);
    assert!(queue.is_empty());
}
