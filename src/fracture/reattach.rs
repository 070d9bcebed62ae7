use crate::core::{mesh::TriangleMesh, part::Part, types::Transform};

/// Index of the first host mesh that contains or intersects `part`.
///
/// Hosts are given with their placement in the same frame as the part
/// transform. Bounds are checked first, then the exact mesh test.
pub fn find_host(part: &Part, hosts: &[(&TriangleMesh, Transform)]) -> Option<usize> {
    let bounds = part.local_bounds();
    let center = part.center_of_mass();
    hosts.iter().position(|(mesh, frame)| {
        if mesh.is_empty() || !mesh.bounds.transformed(frame).overlaps(&bounds) {
            return false;
        }
        mesh.point_inside(frame.inverse_transform_point(center))
            || mesh.intersects(frame, part.mesh(), &part.transform)
    })
}
