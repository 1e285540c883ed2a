use std::time::Duration;

use glam::{Vec2, Vec3};
use once_cell::sync::Lazy;

use treasure_island::app::{run_until_arrived, run_until_framed};
use treasure_island::loader::model_from_obj;
use treasure_island::{
    compute_bounds, frame, BoundingBox, FrameConfig, IslandScene, IslandStage, ModelSlot,
    PollState, SceneNode, Transform, TravelStatus,
};

static SCENE: Lazy<IslandScene> = Lazy::new(|| {
    IslandScene::from_xml(
        r#"<scene>
  <island><mesh>models/island.obj</mesh></island>
  <chest><id>gold</id><name>Gold</name><position>2 1 -1</position></chest>
  <chest><id>silver</id><name>Silver</name><position>-3 0.5 2</position></chest>
  <camera><position>0 5 15</position><fov>75</fov></camera>
  <travel><duration>1000</duration></travel>
</scene>"#,
    )
    .expect("sample scene parses")
});

const ISLAND_OBJ: &str = "\
v -5 0 -5
v 5 0 -5
v 5 0 5
v -5 0 5
v -5 4 -5
v 5 4 -5
v 5 4 5
v -5 4 5
f 1 2 3 4
f 5 8 7 6
f 1 5 6 2
f 2 6 7 3
f 3 7 8 4
f 4 8 5 1
";

fn island() -> SceneNode {
    model_from_obj("island", ISLAND_OBJ, Transform::default()).expect("island parses")
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn framed_stage() -> (IslandStage, Duration) {
    let slot = ModelSlot::pending();
    let mut stage = IslandStage::new(SCENE.clone(), slot.clone(), None);
    stage.mount(Duration::ZERO);
    slot.complete(island());
    let now = run_until_framed(&mut stage, Duration::ZERO, Duration::from_secs(5));
    assert_eq!(stage.frame_state(), PollState::Initialized);
    (stage, now)
}

#[test]
fn framing_looks_at_center_from_a_positive_distance() {
    let bounds = compute_bounds(&island()).expect("island has geometry");
    let result = frame(&bounds, 75.0, &FrameConfig::default()).unwrap();
    assert_eq!(result.look_at_target, bounds.center());
    let horizontal = Vec2::new(
        result.camera_position.x - result.look_at_target.x,
        result.camera_position.z - result.look_at_target.z,
    );
    assert!(horizontal.length() > 0.0);
}

#[test]
fn island_box_is_framed_from_above() {
    let bounds = BoundingBox::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 4.0, 5.0));
    let result = frame(&bounds, 75.0, &FrameConfig::default()).unwrap();
    assert_eq!(result.look_at_target, Vec3::new(0.0, 2.0, 0.0));
    assert!(result.camera_position.y > 2.0);
    assert!(result.camera_position.z > 0.0);
}

#[test]
fn point_sized_island_still_gets_a_finite_pose() {
    let bounds = BoundingBox::new(Vec3::splat(1.0), Vec3::splat(1.0));
    let config = FrameConfig::default();
    let result = frame(&bounds, 75.0, &config).unwrap();
    assert!(result.camera_position.is_finite());
    assert_eq!(result.distance, config.min_distance * config.margin);
}

#[test]
fn stage_frames_only_once() {
    let (mut stage, mut now) = framed_stage();
    let framed = *stage.frame_result().expect("framed");
    assert_eq!(stage.rig().camera.position, framed.camera_position);

    stage.orbit(Vec2::new(120.0, 40.0), 720.0);
    let moved = stage.rig().camera.position;
    assert_ne!(moved, framed.camera_position);

    for _ in 0..200 {
        now += ms(16);
        stage.advance(now);
    }
    assert_eq!(stage.rig().camera.position, moved);
    assert_eq!(stage.pending_timers(), 0);
}

#[test]
fn travel_lands_on_the_chest_offset() {
    let (mut stage, now) = framed_stage();
    let start = stage.rig().camera.position;
    let token = stage.click_chest("gold", now).unwrap();

    let mut previous = 0.0;
    let mut clock = now;
    loop {
        clock += ms(50);
        let status = stage.advance(clock);
        let travelled = (stage.rig().camera.position - start).length();
        assert!(travelled + 1e-4 >= previous, "travel moved backwards");
        previous = travelled;
        if status == TravelStatus::Arrived(token) {
            break;
        }
        assert!(clock < now + ms(2_000), "travel never arrived");
    }
    assert_eq!(stage.rig().camera.position, Vec3::new(2.0, 2.5, 0.5));
    assert_eq!(stage.rig().target(), Vec3::new(2.0, 1.0, -1.0));
    assert_eq!(stage.advance(clock + ms(16)), TravelStatus::Idle);
}

#[test]
fn second_click_preempts_the_first() {
    let (mut stage, now) = framed_stage();
    let first = stage.click_chest("gold", now).unwrap();
    stage.advance(now + ms(300));
    let second = stage.click_chest("silver", now + ms(300)).unwrap();
    assert_ne!(first, second);
    assert_eq!(stage.travel().active().map(|(token, _)| token), Some(second));

    let (_, arrived) = run_until_arrived(&mut stage, second, now + ms(300), Duration::from_secs(2));
    assert!(arrived);
    assert_eq!(stage.rig().camera.position, Vec3::new(-3.0, 2.0, 3.5));
    assert_eq!(stage.rig().target(), Vec3::new(-3.0, 0.5, 2.0));
}

#[test]
fn gestures_cancel_travel() {
    let (mut stage, now) = framed_stage();
    stage.click_chest("gold", now).unwrap();
    stage.advance(now + ms(200));
    stage.zoom(1.0);
    assert!(!stage.travel().is_active());
    let held = stage.rig().camera.position;
    stage.advance(now + ms(2_000));
    assert_eq!(stage.rig().camera.position, held);
}

#[test]
fn demo_island_loads_and_frames() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let xml = std::fs::read_to_string(root.join("island.xml")).unwrap();
    let scene = IslandScene::from_xml(&xml).unwrap();
    assert_eq!(scene.chests.len(), 3);

    let island = treasure_island::loader::load_model_file(
        &root.join(&scene.island.mesh),
        scene.island.transform,
    )
    .unwrap();
    let mut stage = IslandStage::new(scene, ModelSlot::ready(island), None);
    stage.mount(Duration::ZERO);
    run_until_framed(&mut stage, Duration::ZERO, Duration::from_secs(5));
    let framed = stage.frame_result().expect("demo island frames");
    assert!(framed.camera_position.y > framed.center.y);
    assert!(stage.water_level() < 0.0);
}
