//! Overlay Renderer.
//!
//! Draws the projected wireframe prism and the camera-position label onto a
//! frame. Rendering only happens with a valid [`Pose`]; without one the frame
//! is left untouched.

pub mod draw;
pub mod font;

use crate::camera::CalibrationModel;
use crate::pose::Pose;
use crate::projection::project_points;
use crate::target::OverlayGeometry;
use image::{Rgb, RgbImage};
use nalgebra::Vector3;

/// Colors and placement of the overlay.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub lower_color: Rgb<u8>,
    pub upper_color: Rgb<u8>,
    pub pillar_color: Rgb<u8>,
    pub thickness: u32,
    pub text_color: Rgb<u8>,
    /// Baseline-left corner of the label.
    pub text_origin: (i64, i64),
    pub text_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            lower_color: Rgb([64, 64, 0]),
            upper_color: Rgb([255, 255, 0]),
            pillar_color: Rgb([128, 128, 0]),
            thickness: 2,
            text_color: Rgb([0, 255, 0]),
            text_origin: (10, 25),
            text_scale: 2,
        }
    }
}

/// What was written onto a rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Camera center in target coordinates.
    pub position: Vector3<f64>,
    pub label: String,
}

/// Formats a camera position as `XYZ: [x y z]`, three decimals per axis.
pub fn position_label(position: &Vector3<f64>) -> String {
    format!(
        "XYZ: [{:.3} {:.3} {:.3}]",
        position.x, position.y, position.z
    )
}

/// Draws the overlay for `pose` onto `frame`.
///
/// Returns `None`, with `frame` unchanged, when `pose` is `None`.
pub fn render_overlay(
    frame: &mut RgbImage,
    pose: Option<&Pose>,
    calibration: &CalibrationModel,
    geometry: &OverlayGeometry,
    style: &OverlayStyle,
) -> Option<Annotation> {
    pose.map(|pose| draw_overlay(frame, pose, calibration, geometry, style))
}

/// Lower face first, then the upper face, then the pillars joining them,
/// then the position label.
pub fn draw_overlay(
    frame: &mut RgbImage,
    pose: &Pose,
    calibration: &CalibrationModel,
    geometry: &OverlayGeometry,
    style: &OverlayStyle,
) -> Annotation {
    let lower = project_points(calibration, pose, geometry.lower());
    let upper = project_points(calibration, pose, geometry.upper());

    draw::draw_polyline(frame, &lower, true, style.lower_color, style.thickness);
    draw::draw_polyline(frame, &upper, true, style.upper_color, style.thickness);
    for (bottom, top) in lower.iter().zip(&upper) {
        draw::draw_line(frame, bottom, top, style.pillar_color, style.thickness);
    }

    let position = pose.camera_position();
    let label = position_label(&position);
    font::draw_text(frame, &label, style.text_origin, style.text_color, style.text_scale);

    Annotation { position, label }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use crate::target::TargetSpec;
    use nalgebra::Rotation3;

    fn calibration() -> CalibrationModel {
        CalibrationModel::new(
            Intrinsics {
                fx: 500.0,
                fy: 500.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            [0.0; 5],
        )
        .unwrap()
    }

    fn gray_frame() -> RgbImage {
        RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]))
    }

    #[test]
    fn test_position_label_format() {
        assert_eq!(
            position_label(&Vector3::new(0.08123, -0.0526, -0.35)),
            "XYZ: [0.081 -0.053 -0.350]"
        );
    }

    #[test]
    fn test_no_pose_leaves_frame_identical() {
        let target = TargetSpec::new(9, 6, 0.025).unwrap();
        let geometry = OverlayGeometry::prism(&target);
        let mut frame = gray_frame();
        let original = frame.clone();
        let annotation = render_overlay(
            &mut frame,
            None,
            &calibration(),
            &geometry,
            &OverlayStyle::default(),
        );
        assert!(annotation.is_none());
        assert_eq!(frame, original);
    }

    #[test]
    fn test_pose_draws_box_and_label() {
        let target = TargetSpec::new(9, 6, 0.025).unwrap();
        let geometry = OverlayGeometry::prism(&target);
        let pose = Pose::new(Rotation3::identity(), Vector3::new(-0.1, -0.05, 0.2));
        let style = OverlayStyle::default();
        let mut frame = gray_frame();

        let annotation =
            render_overlay(&mut frame, Some(&pose), &calibration(), &geometry, &style).unwrap();
        assert_eq!(annotation.position, pose.camera_position());
        assert_eq!(annotation.label, "XYZ: [0.100 0.050 -0.200]");

        let count = |color: Rgb<u8>| frame.pixels().filter(|p| **p == color).count();
        assert!(count(style.upper_color) > 0);
        assert!(count(style.lower_color) > 0);
        assert!(count(style.pillar_color) > 0);
        assert!(count(style.text_color) > 0);
    }

    #[test]
    fn test_pose_facing_away_does_not_panic() {
        let target = TargetSpec::new(9, 6, 0.025).unwrap();
        let geometry = OverlayGeometry::prism(&target);
        let pose = Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 0.0));
        let mut frame = gray_frame();
        let annotation = render_overlay(
            &mut frame,
            Some(&pose),
            &calibration(),
            &geometry,
            &OverlayStyle::default(),
        );
        assert!(annotation.is_some());
    }
}
