// src/render/skeleton.rs

use super::canvas::Canvas;
use crate::types::{Joint, Pose};
use image::Rgb;

pub const BONE_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
pub const JOINT_COLOR: Rgb<u8> = Rgb([255, 128, 0]);

/// Pairs of adjacent joints drawn as bones.
pub const SKELETON_SEGMENTS: [(Joint, Joint); 16] = [
    // Head
    (Joint::Nose, Joint::LeftEye),
    (Joint::LeftEye, Joint::LeftEar),
    (Joint::Nose, Joint::RightEye),
    (Joint::RightEye, Joint::RightEar),
    // Torso
    (Joint::LeftShoulder, Joint::RightShoulder),
    (Joint::LeftShoulder, Joint::LeftHip),
    (Joint::RightShoulder, Joint::RightHip),
    (Joint::LeftHip, Joint::RightHip),
    // Arms
    (Joint::LeftShoulder, Joint::LeftElbow),
    (Joint::LeftElbow, Joint::LeftWrist),
    (Joint::RightShoulder, Joint::RightElbow),
    (Joint::RightElbow, Joint::RightWrist),
    // Legs
    (Joint::LeftHip, Joint::LeftKnee),
    (Joint::LeftKnee, Joint::LeftAnkle),
    (Joint::RightHip, Joint::RightKnee),
    (Joint::RightKnee, Joint::RightAnkle),
];

/// Draws bones and joint dots for landmarks at or above `min_visibility`.
/// A bone touching a low-confidence joint is skipped entirely.
pub fn draw_skeleton(canvas: &mut Canvas<'_>, pose: &Pose, min_visibility: f32, scale: u32) {
    let (w, h) = (canvas.width(), canvas.height());

    for (a, b) in SKELETON_SEGMENTS {
        let (Some(la), Some(lb)) = (pose.visible(a, min_visibility), pose.visible(b, min_visibility))
        else {
            continue;
        };
        let (x0, y0) = la.to_pixel(w, h);
        let (x1, y1) = lb.to_pixel(w, h);
        canvas.draw_thick_line(x0, y0, x1, y1, scale.max(1), BONE_COLOR);
    }

    let radius = scale as i32 + 2;
    for (_, landmark) in pose.iter() {
        if !landmark.is_visible(min_visibility) {
            continue;
        }
        let (x, y) = landmark.to_pixel(w, h);
        canvas.fill_circle(x, y, radius, JOINT_COLOR);
    }
}
