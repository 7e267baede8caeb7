use mobod::dynamics::Kinematics;
use mobod::{
    DMat3, DVec3, EngineConfig, EngineContext, Joint, JointId, JointType, Link, MassProperties, Model, MultibodyEngine,
    PhysicsEngine, Transform,
};

fn main() -> Result<(), mobod::PhysicsError> {
    let config = EngineConfig::default().with_gravity([0.0, 0.0, 0.0]);
    let mut engine = MultibodyEngine::new(EngineContext::new());
    engine.load(&config)?;
    engine.init()?;

    let mut model = Model::new("four_bar");
    let names = ["l1", "l2", "l3", "l4"];
    let corners = [
        DVec3::ZERO,
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::new(1.0, 0.0, 1.0),
        DVec3::new(0.0, 0.0, 1.0),
    ];
    for (name, corner) in names.iter().zip(corners) {
        model.add_link(
            Link::new(*name)
                .with_mass(MassProperties::new(1.0, DVec3::ZERO, DMat3::IDENTITY * 0.01))
                .with_pose(Transform::from_position(corner)),
        );
    }
    for i in 0..4 {
        model.add_joint(
            Joint::new(format!("j{}", i + 1), JointType::Revolute, Some(names[i]), names[(i + 1) % 4])
                .with_axis(DVec3::Y),
        );
    }

    let mut models = mobod::Arena::new();
    let id = models.insert(model.clone());
    engine.init_model(id, &model)?;
    if let Some(graph) = engine.graph(id) {
        println!("{graph}");
    }

    let mut time = 0.0;
    for frame in 0..5 {
        for _ in 0..100 {
            time += config.step_time;
            engine.apply_joint_force(id, JointId(0), 0, 0.2)?;
            engine.update_physics(&mut models, time)?;
        }
        let Some(system) = engine.system() else {
            break;
        };
        let kin = Kinematics::compute(system, engine.state());
        let gap = system
            .welds
            .iter()
            .map(|w| (kin.poses[w.master].position - kin.poses[w.slave].position).length())
            .fold(0.0, f64::max);
        println!(
            "step {:4}: j1 = {:+.4} rad, loop gap = {:.2e} m",
            (frame + 1) * 100,
            engine.joint_position(id, JointId(0), 0).unwrap_or(f64::NAN),
            gap
        );
    }
    engine.fini();
    Ok(())
}
