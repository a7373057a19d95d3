// src/analysis/testing.rs
//
// Synthetic poses for unit tests.

use crate::types::{Joint, Landmark, Pose};

/// Side view of a squat with both knees bent to `knee_degrees` (2D) and each
/// knee drifting `knee_drift` in x past its ankle. Torso upright.
pub(crate) fn squat_pose(knee_degrees: f32, knee_drift: f32, visibility: f32) -> Pose {
    let mut pose = Pose::new();
    let shin = 0.2_f32;
    let thigh = 0.2_f32;
    let rad = knee_degrees.to_radians();

    let sides = [
        (0.45_f32, Joint::LeftShoulder, Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle),
        (0.55_f32, Joint::RightShoulder, Joint::RightHip, Joint::RightKnee, Joint::RightAnkle),
    ];

    for (base_x, shoulder, hip, knee, ankle) in sides {
        let ankle_pos = (base_x, 0.9);
        let drop = (shin * shin - knee_drift * knee_drift).max(0.0).sqrt();
        let knee_pos = (base_x + knee_drift, ankle_pos.1 - drop);

        // Unit vector knee -> ankle, rotated by the knee angle gives knee -> hip
        let s = ((ankle_pos.0 - knee_pos.0) / shin, (ankle_pos.1 - knee_pos.1) / shin);
        let h = (
            s.0 * rad.cos() - s.1 * rad.sin(),
            s.0 * rad.sin() + s.1 * rad.cos(),
        );
        let hip_pos = (knee_pos.0 + thigh * h.0, knee_pos.1 + thigh * h.1);
        let shoulder_pos = (hip_pos.0, hip_pos.1 - 0.3);

        pose.insert(ankle, Landmark::new(ankle_pos.0, ankle_pos.1, 0.0, visibility));
        pose.insert(knee, Landmark::new(knee_pos.0, knee_pos.1, 0.0, visibility));
        pose.insert(hip, Landmark::new(hip_pos.0, hip_pos.1, 0.0, visibility));
        pose.insert(shoulder, Landmark::new(shoulder_pos.0, shoulder_pos.1, 0.0, visibility));
    }
    pose
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::{AlignmentCheck, ExerciseProfile};

    #[test]
    fn test_squat_pose_geometry() {
        let squats = ExerciseProfile::squats();
        for degrees in [70.0, 120.0, 165.0] {
            let pose = squat_pose(degrees, 0.08, 0.9);
            let m = squats.angle.measure(&pose, 0.5).unwrap();
            assert!((m.degrees - degrees).abs() < 0.1, "{degrees} vs {}", m.degrees);

            let knee = AlignmentCheck::KneeOverAnkle {
                max_offset: 0.05,
                feedback: String::new(),
            };
            let drift = knee.measure(&pose, 0.5).unwrap();
            assert!((drift - 0.08).abs() < 1e-4);

            let lean = AlignmentCheck::TorsoLean {
                max_degrees: 60.0,
                feedback: String::new(),
            };
            assert!(lean.measure(&pose, 0.5).unwrap() < 0.1);
        }
    }
}
