use glam::{Quat, Vec2, Vec3, Vec4};

/// Stored bone rotations are signed 16-bit fixed point scaled by this.
pub const ROTATION_DIVISOR: f32 = 32768.0;

const UNIT_TOLERANCE: f32 = 1e-6;

/// Reconstructs a unit quaternion from the on-disk fixed-point triple.
/// Only x, y, z are stored; the format keeps rotations on the positive-w
/// hemisphere so `w = sqrt(1 - x^2 - y^2 - z^2)`. A triple whose squared
/// magnitude exceeds one is not a valid stored rotation and yields `None`
/// rather than a NaN.
pub fn rotation_from_fixed16(x: i16, y: i16, z: i16) -> Option<Quat> {
    let qx = x as f32 / ROTATION_DIVISOR;
    let qy = y as f32 / ROTATION_DIVISOR;
    let qz = z as f32 / ROTATION_DIVISOR;

    let sq = qx * qx + qy * qy + qz * qz;
    if sq > 1.0 + UNIT_TOLERANCE {
        return None;
    }

    let qw = (1.0 - sq).max(0.0).sqrt();
    Some(Quat::from_xyzw(qx, qy, qz, qw))
}

/// A bone's rotation + translation, either relative to its parent or
/// absolute depending on where it sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTransform {
    pub rotation: Quat,
    pub position: Vec3,
}

impl BoneTransform {
    pub const IDENTITY: BoneTransform = BoneTransform {
        rotation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    /// World transform of a child given `self` as the parent's world
    /// transform and `local` as the child's parent-relative transform.
    /// Rotation composes with the parent on the left.
    pub fn child(&self, local: &BoneTransform) -> BoneTransform {
        BoneTransform {
            rotation: self.rotation * local.rotation,
            position: self.position + self.rotation * local.position,
        }
    }

    /// Bone-local point into the transform's target space.
    pub fn transform_point(&self, v: Vec3) -> Vec3 {
        self.rotation * v + self.position
    }

    /// Direction vectors only rotate, they never translate.
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }
}

/// On-disk V runs image-space-down; the renderer convention is up, so
/// every UV read goes through this exactly once.
pub fn flip_v(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x, 1.0 - uv.y)
}

pub fn color_from_bytes(rgba: [u8; 4]) -> Vec4 {
    Vec4::new(
        rgba[0] as f32 / 255.0,
        rgba[1] as f32 / 255.0,
        rgba[2] as f32 / 255.0,
        rgba[3] as f32 / 255.0,
    )
}

#[cfg(test)]
mod math_tests {
    use super::*;

    #[test]
    fn reconstructed_rotations_are_unit_length() {
        let samples: [(i16, i16, i16); 6] = [
            (0, 0, 0),
            (32767, 0, 0),
            (0, -32768, 0),
            (12000, -9000, 4000),
            (-16384, 16384, 16384),
            (1, 1, 1),
        ];
        for (x, y, z) in samples {
            let q = rotation_from_fixed16(x, y, z).unwrap();
            assert!((q.length() - 1.0).abs() < 1e-6, "non-unit for {x} {y} {z}");
            assert!(q.w >= 0.0);
        }
    }

    #[test]
    fn over_unit_triple_is_rejected() {
        // (1,1,1)/sqrt(3) scaled up past the unit sphere
        assert!(rotation_from_fixed16(32767, 32767, 32767).is_none());
    }

    #[test]
    fn child_of_identity_is_local() {
        let local = BoneTransform {
            rotation: Quat::from_rotation_z(0.5),
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        let world = BoneTransform::IDENTITY.child(&local);
        assert_eq!(world, local);
    }

    #[test]
    fn child_translation_rotates_through_parent() {
        let parent = BoneTransform {
            rotation: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            position: Vec3::new(10.0, 0.0, 0.0),
        };
        let local = BoneTransform {
            rotation: Quat::IDENTITY,
            position: Vec3::new(5.0, 0.0, 0.0),
        };
        let world = parent.child(&local);
        // parent rotates +X onto +Y
        assert!((world.position - Vec3::new(10.0, 5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn v_flip_is_an_involution() {
        for v in [0.0f32, 0.25, 0.5, 0.75, 1.0, -2.5] {
            let uv = Vec2::new(0.1, v);
            assert_eq!(flip_v(flip_v(uv)), uv);
        }
    }

    #[test]
    fn colors_normalize_to_unit_range() {
        assert_eq!(
            color_from_bytes([0, 255, 51, 102]),
            Vec4::new(0.0, 1.0, 0.2, 0.4)
        );
    }
}
