use mobod::{DMat3, DVec3, EngineConfig, Joint, JointId, JointType, Link, LinkId, MassProperties, Model, Transform, World};

fn main() -> Result<(), mobod::PhysicsError> {
    let mut world = World::new(EngineConfig::default())?;

    let mut pendulum = Model::new("pendulum");
    pendulum.add_link(
        Link::new("bob")
            .with_mass(MassProperties::new(1.0, DVec3::ZERO, DMat3::IDENTITY * 0.01))
            .with_pose(Transform::from_position(DVec3::new(1.0, 0.0, 0.0))),
    );
    pendulum.add_joint(
        Joint::new("pivot", JointType::Revolute, None, "bob")
            .with_axis(DVec3::Y)
            .with_pose(Transform::from_position(DVec3::new(-1.0, 0.0, 0.0))),
    );
    let id = world.insert_model(pendulum)?;

    for frame in 0..10 {
        world.run(100)?;
        let angle = world.engine().joint_position(id, JointId(0), 0).unwrap_or(f64::NAN);
        if let Some(bob) = world.model(id).and_then(|m| m.link(LinkId(0))) {
            println!(
                "t = {:.1} s  angle = {:+.3} rad  bob = {:?}",
                (frame + 1) as f64 * 0.1,
                angle,
                bob.world_pose.position
            );
        }
    }
    Ok(())
}
