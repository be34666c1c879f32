use glam::{Vec2, Vec3};

use crate::math::{ANG90, Angle, FRACUNIT, to_fixed};
use crate::renderer::software::PlayerView;
use crate::world::geometry::Level;

/// Height of the eye above the floor, in map units.
pub const VIEW_HEIGHT: f32 = 41.0;

/// Free-moving viewer used by the demo binary.
///
/// * Only **yaw** (heading) is simulated – Doom never tilts up/down.
/// * `pos.z` is the eye height above the floor under the camera.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pos: Vec3,
    yaw: f32, // radians (0 = east, counter-clockwise)
}

impl Camera {
    pub fn new(pos: Vec3, yaw: f32) -> Self {
        Self { pos, yaw }
    }

    #[inline]
    pub fn pos(&self) -> Vec3 {
        self.pos
    }

    /// Unit vector pointing where the camera looks on the X-Y plane.
    #[inline(always)]
    pub fn forward(self) -> Vec2 {
        let (s, c) = self.yaw.sin_cos();
        Vec2::new(c, s)
    }

    /// Unit vector pointing to the camera's right on the X-Y plane.
    #[inline(always)]
    pub fn right(self) -> Vec2 {
        -self.forward().perp()
    }

    /// Move by `forward` units and `side` (strafe), preserving eye-height.
    pub fn step(&mut self, forward: f32, side: f32) {
        let f = self.forward();
        let r = self.right();
        self.pos.x += f.x * forward + r.x * side;
        self.pos.y += f.y * forward + r.y * side;
    }

    /// Rotate around Z-axis (positive = turn left).
    pub fn turn(&mut self, delta_yaw: f32) {
        self.yaw = (self.yaw + delta_yaw).rem_euclid(std::f32::consts::TAU);
    }

    /// Binary angle of the heading.
    pub fn angle(self) -> Angle {
        let turns = self.yaw.rem_euclid(std::f32::consts::TAU) / std::f32::consts::TAU;
        (turns as f64 * 4_294_967_296.0) as u64 as Angle
    }

    /// Fixed-point view for the renderer, standing on the floor of the
    /// sector under the camera.
    pub fn player_view(self, level: &Level) -> PlayerView {
        let x = to_fixed(self.pos.x);
        let y = to_fixed(self.pos.y);
        let ss = level.point_in_subsector(x, y);
        let floor = level
            .subsectors
            .get(ss)
            .and_then(|s| level.sectors.get(s.sector))
            .map_or(0, |s| s.interp_floorheight);
        PlayerView {
            x,
            y,
            z: floor + to_fixed(self.pos.z),
            angle: self.angle(),
            ..Default::default()
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, VIEW_HEIGHT), 0.0)
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn forward_and_right_are_orthonormal() {
        let cam = Camera::new(Vec3::ZERO, 0.3);
        let f = cam.forward();
        let r = cam.right();
        assert!((f.length() - 1.0).abs() < 1e-5);
        assert!((r.length() - 1.0).abs() < 1e-5);
        assert!((f.dot(r)).abs() < 1e-5);
        // facing east, right is south
        let r = Camera::new(Vec3::ZERO, 0.0).right();
        assert!((r - Vec2::new(0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn yaw_maps_to_binary_angles() {
        assert_eq!(Camera::new(Vec3::ZERO, 0.0).angle(), 0);
        let a = Camera::new(Vec3::ZERO, FRAC_PI_2).angle();
        assert!(a.abs_diff(ANG90) < 1 << 12);
    }

    #[test]
    fn view_stands_on_the_floor() {
        let level = crate::world::demo::demo_level();
        let cam = Camera::new(Vec3::new(700.0, 200.0, VIEW_HEIGHT), 0.0);
        let view = cam.player_view(&level);
        assert_eq!(view.z, (24 + 41) * FRACUNIT);
        assert_eq!(view.x, 700 * FRACUNIT);
    }
}
