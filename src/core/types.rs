use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, orientation, and uniform-or-not scale of a part or body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale * other.position),
            rotation: (self.rotation * other.rotation).normalize(),
            scale: self.scale * other.scale,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * point)
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        (self.rotation.inverse() * (point - self.position)) / self.scale
    }

    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.inverse() * vector
    }

    /// Largest scale component; meshes are treated as uniformly scaled by it for mass.
    pub fn max_scale(&self) -> f32 {
        self.scale.max_element()
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    /// Velocity of a point rigidly attached to the body, `offset` measured from the centre of mass.
    pub fn at_offset(&self, offset: Vec3) -> Vec3 {
        self.linear + self.angular.cross(offset)
    }
}

/// Mass, body-space inertia tensor and centre of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
    pub center_of_mass: Vec3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Mat3::IDENTITY,
            center_of_mass: Vec3::ZERO,
        }
    }
}

impl MassProperties {
    pub fn is_immovable(&self) -> bool {
        self.mass <= 0.0
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// World-space inverse inertia for the given orientation; zero for immovable parts.
    pub fn world_inverse_inertia(&self, rotation: Quat) -> Mat3 {
        if self.mass <= 0.0 {
            return Mat3::ZERO;
        }
        let rot = Mat3::from_quat(rotation);
        rot * self.inertia.safe_inverse() * rot.transpose()
    }
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    /// Inverse that maps singular tensors to zero instead of producing NaNs.
    fn safe_inverse(&self) -> Mat3;
    /// Raises the diagonal so no axis drops below `fraction` of the largest one.
    fn with_min_axis(&self, fraction: f32) -> Mat3;
    fn principal_diagonal(&self) -> Vec3;
}

impl InertiaTensorExt for Mat3 {
    fn safe_inverse(&self) -> Mat3 {
        let det = self.determinant();
        if det.abs() <= f32::EPSILON * 1e-6 || !det.is_finite() {
            Mat3::ZERO
        } else {
            self.inverse()
        }
    }

    fn with_min_axis(&self, fraction: f32) -> Mat3 {
        let diag = self.principal_diagonal();
        let floor = diag.max_element() * fraction;
        let mut out = *self;
        for axis in 0..3 {
            if out.col(axis)[axis] < floor {
                out.col_mut(axis)[axis] = floor;
            }
        }
        out
    }

    fn principal_diagonal(&self) -> Vec3 {
        Vec3::new(self.x_axis.x, self.y_axis.y, self.z_axis.z)
    }
}

/// Skew-symmetric cross-product matrix so that `skew(a) * b == a.cross(b)`.
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Ground plane `dot(normal, p) = dist`; solid material lies on the negative side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Plane {
    pub fn new(normal: Vec3, origin: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            dist: normal.dot(origin),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.dist
    }

    /// Re-expresses the plane in the local frame of `frame`.
    pub fn to_local(&self, frame: &Transform) -> Plane {
        let origin = frame.inverse_transform_point(self.normal * self.dist);
        Plane::new(frame.inverse_transform_vector(self.normal), origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn skew_matches_cross_product() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        let lhs = skew(a) * b;
        let rhs = a.cross(b);
        assert_relative_eq!(lhs.x, rhs.x, epsilon = 1e-5);
        assert_relative_eq!(lhs.y, rhs.y, epsilon = 1e-5);
        assert_relative_eq!(lhs.z, rhs.z, epsilon = 1e-5);
    }

    #[test]
    fn min_axis_floor_raises_thin_axes() {
        let tensor = Mat3::from_diagonal(Vec3::new(10.0, 0.01, 5.0));
        let floored = tensor.with_min_axis(0.1);
        assert_relative_eq!(floored.y_axis.y, 1.0);
        assert_relative_eq!(floored.x_axis.x, 10.0);
        assert_relative_eq!(floored.z_axis.z, 5.0);
    }

    #[test]
    fn immovable_mass_has_zero_inverse_inertia() {
        let props = MassProperties {
            mass: 0.0,
            ..MassProperties::default()
        };
        assert_eq!(props.world_inverse_inertia(Quat::IDENTITY), Mat3::ZERO);
        assert_eq!(props.inverse_mass(), 0.0);
    }

    #[test]
    fn plane_to_local_round_trips_signed_distance() {
        let plane = Plane::new(Vec3::Y, Vec3::new(0.0, 1.0, 0.0));
        let frame = Transform::from_position_rotation(
            Vec3::new(2.0, 3.0, -1.0),
            Quat::from_rotation_z(0.7),
        );
        let local = plane.to_local(&frame);
        let world_point = Vec3::new(0.5, 4.0, 2.0);
        let local_point = frame.inverse_transform_point(world_point);
        assert_relative_eq!(
            plane.signed_distance(world_point),
            local.signed_distance(local_point),
            epsilon = 1e-4
        );
    }
}
