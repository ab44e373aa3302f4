//! Keyframe sampling through the pose evaluator
//!
//! Loop wrap-around, periodicity and the mix thresholds, checked on the
//! fixture leg rather than on raw key arrays.

mod common;

use common::{KICK, RUN, WALK, leg};
use glam::{Quat, Vec3};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use skelanim::{
    ActionTime, Armature, EngineOptions, PoseData, PoseRequest, PoseState, evaluate_pose,
};
use test_case::test_case;

fn sample(armature: &Armature, request: &PoseRequest) -> Vec<PoseData> {
    let mut pose = PoseState::new(armature);
    evaluate_pose(&mut pose, armature, request, &EngineOptions::default());
    (0..armature.bone_count())
        .map(|bone| *pose.pose_data(bone).unwrap())
        .collect()
}

fn same_rotation(a: Quat, b: Quat, tolerance: f32) -> bool {
    a.dot(b).abs() >= 1.0 - tolerance
}

#[test]
fn test_wraparound_between_last_and_first_key() {
    // Hip keys at 0.0s and 0.9s in a 1s loop; 0.95s is halfway back to the start
    let armature = leg();
    let pose = sample(&armature, &PoseRequest::single(ActionTime::new(WALK, 0.95)));
    assert!(
        pose[0].translation.abs_diff_eq(Vec3::new(0.0, 0.0, 0.45), 1.0e-5),
        "got {:?}",
        pose[0].translation
    );
}

#[test]
fn test_evaluated_time_wraps_into_duration() {
    let armature = leg();
    let mut pose = PoseState::new(&armature);
    let time = evaluate_pose(
        &mut pose,
        &armature,
        &PoseRequest::single(ActionTime::new(WALK, 2.25)),
        &EngineOptions::default(),
    );
    assert!((time.time - 0.25).abs() < 1.0e-5);
    assert!(!time.first_loop);
}

#[test]
fn test_loop_boundary_is_continuous() {
    let armature = leg();
    let duration = armature.action(WALK).unwrap().duration();
    let before = sample(&armature, &PoseRequest::single(ActionTime::new(WALK, duration - 0.001)));
    let after = sample(
        &armature,
        &PoseRequest::single(ActionTime::new(WALK, duration + 0.001).first_loop(false)),
    );
    for (a, b) in before.iter().zip(&after) {
        assert!(a.translation.distance(b.translation) < 0.02);
        assert!(same_rotation(a.rotation, b.rotation, 1.0e-3));
    }
}

#[test]
fn test_non_looping_action_holds_last_key() {
    let armature = leg();
    let action = armature.action(KICK).unwrap();
    assert!(!action.looping());

    let end = sample(&armature, &PoseRequest::single(ActionTime::new(KICK, 0.4)));
    let later = sample(&armature, &PoseRequest::single(ActionTime::new(KICK, 5.0)));
    assert!(same_rotation(end[2].rotation, Quat::from_rotation_x(-1.2), 1.0e-6));
    assert_eq!(end[2].rotation, later[2].rotation);
}

#[test_case(0.0 ; "start")]
#[test_case(0.37 ; "between keys")]
#[test_case(0.95 ; "wrapping")]
#[test_case(3.5 ; "later loop")]
fn test_zero_mix_weight_matches_single_action(time: f32) {
    let armature = leg();
    let primary = ActionTime::new(WALK, time);
    let single = sample(&armature, &PoseRequest::single(primary));
    let mixed = sample(
        &armature,
        &PoseRequest::mixed(primary, ActionTime::new(RUN, time), 0.0),
    );
    assert_eq!(single, mixed);
}

#[test]
fn test_full_mix_weight_samples_secondary() {
    let armature = leg();
    let run_only = sample(&armature, &PoseRequest::single(ActionTime::new(RUN, 0.3)));
    let mixed = sample(
        &armature,
        &PoseRequest::mixed(ActionTime::new(WALK, 0.3), ActionTime::new(RUN, 0.3), 1.0),
    );
    // thigh and shin are keyed by both actions
    assert_eq!(run_only[1..], mixed[1..]);
}

#[test]
fn test_half_mix_lies_between_both_actions() {
    let armature = leg();
    let walk = sample(&armature, &PoseRequest::single(ActionTime::new(WALK, 0.0)));
    let run = sample(&armature, &PoseRequest::single(ActionTime::new(RUN, 0.0)));
    let mixed = sample(
        &armature,
        &PoseRequest::mixed(ActionTime::new(WALK, 0.0), ActionTime::new(RUN, 0.0), 0.5),
    );
    let expected = walk[1].rotation.slerp(run[1].rotation, 0.5);
    assert!(same_rotation(mixed[1].rotation, expected, 1.0e-5));
    // hip is only keyed by walk
    assert_eq!(mixed[0].translation, walk[0].translation);
}

proptest! {
    #[test]
    fn prop_looping_action_is_periodic(time in 0.0f32..1.0, loops in 1u32..4) {
        let armature = leg();
        let duration = armature.action(WALK).unwrap().duration();
        let base = sample(&armature, &PoseRequest::single(ActionTime::new(WALK, time)));
        let shifted = sample(
            &armature,
            &PoseRequest::single(
                ActionTime::new(WALK, time + loops as f32 * duration).first_loop(false),
            ),
        );
        for (a, b) in base.iter().zip(&shifted) {
            prop_assert!(a.translation.distance(b.translation) < 1.0e-3);
            prop_assert!(same_rotation(a.rotation, b.rotation, 1.0e-4));
        }
    }

    #[test]
    fn prop_sampled_rotations_stay_unit(time in -1.0f32..3.0, weight in 0.0f32..1.0) {
        let armature = leg();
        let pose = sample(
            &armature,
            &PoseRequest::mixed(ActionTime::new(WALK, time), ActionTime::new(RUN, time), weight)
                .with_additional_time(1.0),
        );
        for data in &pose {
            prop_assert!((data.rotation.length() - 1.0).abs() < 1.0e-4);
        }
    }
}
