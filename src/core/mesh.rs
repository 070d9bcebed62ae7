use std::collections::HashMap;

use glam::{Mat3, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::types::{Plane, Transform};

/// Axis-aligned bounding box used for mesh and body bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn radius(&self) -> f32 {
        self.extent().length()
    }

    pub fn volume(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.max - self.min;
        size.x * size.y * size.z
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    /// Scales the box about its own centre.
    pub fn scaled(&self, factor: f32) -> Aabb {
        let center = self.center();
        let extent = self.extent() * factor;
        Aabb::new(center - extent, center + extent)
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Aabb::new(self.min.max(other.min), self.max.min(other.max)))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Bounds of this box after moving it by `frame`.
    pub fn transformed(&self, frame: &Transform) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::empty();
        for corner in 0..8 {
            let local = Vec3::new(
                if corner & 1 == 0 { self.min.x } else { self.max.x },
                if corner & 2 == 0 { self.min.y } else { self.max.y },
                if corner & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.extend(frame.transform_point(local));
        }
        out
    }
}

/// Volume, centre of mass and inertia of a closed mesh at unit density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshMassProperties {
    pub volume: f32,
    pub center_of_mass: Vec3,
    /// Inertia about the centre of mass.
    pub inertia: Mat3,
}

/// Result of splitting a mesh along its disconnected triangle islands.
#[derive(Debug, Clone)]
pub struct MeshSplit {
    /// What stays in the source part, `None` when every island left.
    pub remaining: Option<TriangleMesh>,
    pub fragments: Vec<TriangleMesh>,
    /// Triangle indices (in the source mesh) that left with fragments.
    pub removed_triangles: Vec<usize>,
}

/// Closed triangle mesh used as part collision geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub bounds: Aabb,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        let bounds = Aabb::from_points(&vertices);
        Self {
            vertices,
            indices,
            bounds,
        }
    }

    pub fn builder(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> MeshBuilder {
        MeshBuilder::new(vertices, indices)
    }

    /// Closed box with outward winding.
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        let vertices = (0..8)
            .map(|corner| {
                center
                    + Vec3::new(
                        if corner & 1 == 0 { -half_extents.x } else { half_extents.x },
                        if corner & 2 == 0 { -half_extents.y } else { half_extents.y },
                        if corner & 4 == 0 { -half_extents.z } else { half_extents.z },
                    )
            })
            .collect();
        let indices = vec![
            [0, 4, 6],
            [0, 6, 2],
            [1, 3, 7],
            [1, 7, 5],
            [0, 1, 5],
            [0, 5, 4],
            [2, 6, 7],
            [2, 7, 3],
            [0, 2, 3],
            [0, 3, 1],
            [4, 5, 7],
            [4, 7, 6],
        ];
        Self::new(vertices, indices)
    }

    /// Concatenates meshes without welding, so each input stays its own island.
    pub fn merge(meshes: &[&TriangleMesh]) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for mesh in meshes {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend(
                mesh.indices
                    .iter()
                    .map(|tri| [tri[0] + base, tri[1] + base, tri[2] + base]),
            );
        }
        Self::new(vertices, indices)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        let tri = self.indices[index];
        [
            self.vertices[tri[0] as usize],
            self.vertices[tri[1] as usize],
            self.vertices[tri[2] as usize],
        ]
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounds.radius()
    }

    /// Signed volume summed over the given triangles; negative for inward-facing shells.
    pub fn signed_volume_of(&self, triangles: &[usize]) -> f32 {
        triangles
            .iter()
            .map(|&t| {
                let [a, b, c] = self.triangle(t);
                a.dot(b.cross(c))
            })
            .sum::<f32>()
            / 6.0
    }

    /// Exact mass properties by signed tetrahedron decomposition about the origin.
    pub fn mass_properties(&self) -> MeshMassProperties {
        let mut volume = 0.0;
        let mut first_moment = Vec3::ZERO;
        let mut covariance = Mat3::ZERO;

        for t in 0..self.indices.len() {
            let [a, b, c] = self.triangle(t);
            let det = a.dot(b.cross(c));
            volume += det / 6.0;
            first_moment += (a + b + c) * (det / 24.0);

            let sum = a + b + c;
            let outer = outer(a, a) + outer(b, b) + outer(c, c) + outer(sum, sum);
            covariance += outer * (det / 120.0);
        }

        if volume.abs() <= f32::EPSILON {
            return MeshMassProperties {
                volume,
                center_of_mass: self.bounds.center(),
                inertia: Mat3::ZERO,
            };
        }

        let center_of_mass = first_moment / volume;
        let shifted = covariance - outer(center_of_mass, center_of_mass) * volume;
        let trace = shifted.x_axis.x + shifted.y_axis.y + shifted.z_axis.z;
        let inertia = Mat3::from_diagonal(Vec3::splat(trace)) - shifted;

        MeshMassProperties {
            volume,
            center_of_mass,
            inertia,
        }
    }

    /// Groups triangles into islands connected through shared vertex indices.
    pub fn triangle_islands(&self) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..self.vertices.len()).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for tri in &self.indices {
            let a = find(&mut parent, tri[0] as usize);
            for &v in &tri[1..] {
                let b = find(&mut parent, v as usize);
                if a != b {
                    parent[b] = a;
                }
            }
        }

        let mut island_of_root: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Vec<usize>> = Vec::new();
        for (t, tri) in self.indices.iter().enumerate() {
            let root = find(&mut parent, tri[0] as usize);
            let island = *island_of_root.entry(root).or_insert_with(|| {
                islands.push(Vec::new());
                islands.len() - 1
            });
            islands[island].push(t);
        }
        islands
    }

    /// Copies the given triangles into a compact standalone mesh.
    pub fn submesh(&self, triangles: &[usize]) -> TriangleMesh {
        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(triangles.len());
        for &t in triangles {
            let tri = self.indices[t];
            let mut out = [0u32; 3];
            for (slot, &v) in out.iter_mut().zip(tri.iter()) {
                *slot = *remap.entry(v).or_insert_with(|| {
                    vertices.push(self.vertices[v as usize]);
                    (vertices.len() - 1) as u32
                });
            }
            indices.push(out);
        }
        TriangleMesh::new(vertices, indices)
    }

    /// Splits off triangle islands lying entirely above every ground plane.
    ///
    /// Islands with negative volume are cavities and travel with the island that
    /// encloses them. When `originally_mobile` is set at least one solid island stays.
    pub fn split_into_islands(&self, ground: &[Plane], originally_mobile: bool) -> Option<MeshSplit> {
        let islands = self.triangle_islands();
        if islands.len() < 2 {
            return None;
        }

        let volumes: Vec<f32> = islands.iter().map(|tris| self.signed_volume_of(tris)).collect();
        let solid: Vec<usize> = (0..islands.len()).filter(|&i| volumes[i] >= 0.0).collect();

        let mut split = vec![false; islands.len()];
        for &i in &solid {
            split[i] = self.island_above(&islands[i], ground);
        }
        if originally_mobile && solid.iter().all(|&i| split[i]) {
            if let Some(&first) = solid.first() {
                split[first] = false;
            }
        }

        let mut owner: Vec<Option<usize>> = (0..islands.len())
            .map(|i| (volumes[i] >= 0.0).then_some(i))
            .collect();
        for cavity in (0..islands.len()).filter(|&i| volumes[i] < 0.0) {
            owner[cavity] = self.enclosing_island(&islands, &solid, cavity);
            split[cavity] = owner[cavity].map(|o| split[o]).unwrap_or(false);
        }

        if !split.iter().any(|&s| s) {
            return None;
        }

        let mut fragments = Vec::new();
        let mut removed_triangles = Vec::new();
        for &i in solid.iter().filter(|&&i| split[i]) {
            let mut tris: Vec<usize> = islands[i].clone();
            for (cavity, _) in owner
                .iter()
                .enumerate()
                .filter(|(c, o)| *c != i && **o == Some(i) && volumes[*c] < 0.0)
            {
                tris.extend_from_slice(&islands[cavity]);
            }
            tris.sort_unstable();
            removed_triangles.extend_from_slice(&tris);
            fragments.push(self.submesh(&tris));
        }
        removed_triangles.sort_unstable();

        let kept: Vec<usize> = (0..self.indices.len())
            .filter(|t| removed_triangles.binary_search(t).is_err())
            .collect();
        let remaining = (!kept.is_empty()).then(|| self.submesh(&kept));

        Some(MeshSplit {
            remaining,
            fragments,
            removed_triangles,
        })
    }

    fn island_above(&self, triangles: &[usize], ground: &[Plane]) -> bool {
        triangles.iter().all(|&t| {
            self.indices[t].iter().all(|&v| {
                let p = self.vertices[v as usize];
                ground.iter().all(|plane| plane.signed_distance(p) > 0.0)
            })
        })
    }

    fn enclosing_island(&self, islands: &[Vec<usize>], solid: &[usize], cavity: usize) -> Option<usize> {
        let origin = islands[cavity].first().map(|&t| {
            let [a, b, c] = self.triangle(t);
            (a + b + c) / 3.0
        })?;
        let dir = Vec3::Z;
        let mut best: Option<(f32, usize)> = None;
        for &island in solid {
            let mut hits = 0;
            let mut nearest = f32::INFINITY;
            for &t in &islands[island] {
                let [a, b, c] = self.triangle(t);
                if let Some(dist) = ray_triangle(origin, dir, a, b, c) {
                    hits += 1;
                    nearest = nearest.min(dist);
                }
            }
            if hits % 2 == 1 && best.map(|(d, _)| nearest < d).unwrap_or(true) {
                best = Some((nearest, island));
            }
        }
        best.map(|(_, island)| island)
    }

    /// Ray-parity inside test; assumes a closed mesh.
    pub fn point_inside(&self, point: Vec3) -> bool {
        if !self.bounds.contains_point(point) {
            return false;
        }
        let dir = Vec3::new(0.3713, 0.5571, 0.7428).normalize();
        let mut hits = 0;
        for t in 0..self.indices.len() {
            let [a, b, c] = self.triangle(t);
            if ray_triangle(point, dir, a, b, c).is_some() {
                hits += 1;
            }
        }
        hits % 2 == 1
    }

    /// True when the sphere touches the surface or lies inside the mesh.
    pub fn sphere_intersects(&self, center: Vec3, radius: f32) -> bool {
        if !self.bounds.expanded(radius).contains_point(center) {
            return false;
        }
        let radius_sq = radius * radius;
        let touches = (0..self.indices.len()).any(|t| {
            let [a, b, c] = self.triangle(t);
            closest_point_on_triangle(center, a, b, c).distance_squared(center) <= radius_sq
        });
        touches || self.point_inside(center)
    }

    /// Exact surface intersection or containment test between two placed meshes.
    pub fn intersects(&self, frame: &Transform, other: &TriangleMesh, other_frame: &Transform) -> bool {
        let world_a: Vec<Vec3> = self.vertices.iter().map(|&v| frame.transform_point(v)).collect();
        let world_b: Vec<Vec3> = other.vertices.iter().map(|&v| other_frame.transform_point(v)).collect();
        let bounds_a = Aabb::from_points(&world_a);
        let bounds_b = Aabb::from_points(&world_b);
        let Some(overlap) = bounds_a.intersection(&bounds_b) else {
            return false;
        };

        let tri_a: Vec<[Vec3; 3]> = self
            .indices
            .iter()
            .map(|t| [world_a[t[0] as usize], world_a[t[1] as usize], world_a[t[2] as usize]])
            .filter(|t| Aabb::from_points(t).overlaps(&overlap))
            .collect();
        let tri_b: Vec<[Vec3; 3]> = other
            .indices
            .iter()
            .map(|t| [world_b[t[0] as usize], world_b[t[1] as usize], world_b[t[2] as usize]])
            .filter(|t| Aabb::from_points(t).overlaps(&overlap))
            .collect();

        for a in &tri_a {
            let box_a = Aabb::from_points(a);
            for b in &tri_b {
                if box_a.overlaps(&Aabb::from_points(b)) && triangles_intersect(a, b) {
                    return true;
                }
            }
        }

        // Full containment has no surface crossing.
        if let Some(&v) = other.vertices.first() {
            let local = frame.inverse_transform_point(other_frame.transform_point(v));
            if self.point_inside(local) {
                return true;
            }
        }
        if let Some(&v) = self.vertices.first() {
            let local = other_frame.inverse_transform_point(frame.transform_point(v));
            if other.point_inside(local) {
                return true;
            }
        }
        false
    }
}

fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Möller-Trumbore; returns the hit distance for `t > 0`.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let tvec = origin - a;
    let u = tvec.dot(pvec) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(qvec) * inv;
    (t > 1e-6).then_some(t)
}

pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Separating-axis test between two triangles.
pub fn triangles_intersect(a: &[Vec3; 3], b: &[Vec3; 3]) -> bool {
    let edges_a = [a[1] - a[0], a[2] - a[1], a[0] - a[2]];
    let edges_b = [b[1] - b[0], b[2] - b[1], b[0] - b[2]];
    let na = edges_a[0].cross(edges_a[1]);
    let nb = edges_b[0].cross(edges_b[1]);

    let mut axes: Vec<Vec3> = Vec::with_capacity(17);
    axes.push(na);
    axes.push(nb);
    for ea in &edges_a {
        for eb in &edges_b {
            axes.push(ea.cross(*eb));
        }
    }
    // In-plane axes cover the coplanar case.
    for e in &edges_a {
        axes.push(na.cross(*e));
    }
    for e in &edges_b {
        axes.push(nb.cross(*e));
    }

    let project = |tri: &[Vec3; 3], axis: Vec3| {
        let d = [tri[0].dot(axis), tri[1].dot(axis), tri[2].dot(axis)];
        (d[0].min(d[1]).min(d[2]), d[0].max(d[1]).max(d[2]))
    };

    for axis in axes {
        let len_sq = axis.length_squared();
        if len_sq < 1e-12 {
            continue;
        }
        let (min_a, max_a) = project(a, axis);
        let (min_b, max_b) = project(b, axis);
        let tolerance = 1e-6 * len_sq.sqrt();
        if max_a < min_b - tolerance || max_b < min_a - tolerance {
            return false;
        }
    }
    true
}

/// Helper used to cook triangle meshes from raw vertex/index buffers.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self { vertices, indices }
    }

    /// Deduplicates vertices using a quantized grid so island detection sees shared corners.
    pub fn weld_vertices(mut self, epsilon: f32) -> Self {
        if epsilon <= 0.0 || self.vertices.is_empty() {
            return self;
        }

        let inv = 1.0 / epsilon;
        let mut map: HashMap<(i32, i32, i32), u32> = HashMap::new();
        let mut new_vertices: Vec<Vec3> = Vec::new();
        let mut remap: Vec<u32> = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let key = (
                (v.x * inv).round() as i32,
                (v.y * inv).round() as i32,
                (v.z * inv).round() as i32,
            );
            let index = *map.entry(key).or_insert_with(|| {
                let idx = new_vertices.len() as u32;
                new_vertices.push(*v);
                idx
            });
            remap.push(index);
        }

        for tri in &mut self.indices {
            for v in tri.iter_mut() {
                *v = remap[*v as usize];
            }
        }
        self.indices.retain(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2]);

        self.vertices = new_vertices;
        self
    }

    pub fn build(self) -> TriangleMesh {
        TriangleMesh::new(self.vertices, self.indices)
    }
}

/// One incremental change applied to a part mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshUpdateRecord {
    /// Triangle indices removed from the previous mesh version.
    pub removed_triangles: Vec<usize>,
    pub triangle_count: usize,
    pub vertex_count: usize,
}

/// Append-only log of mesh changes shared with downstream consumers.
#[derive(Debug, Default)]
pub struct MeshUpdateLog {
    records: RwLock<Vec<MeshUpdateRecord>>,
}

impl MeshUpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its index.
    pub fn push(&self, record: MeshUpdateRecord) -> usize {
        let mut records = self.records.write();
        records.push(record);
        records.len() - 1
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Records from `start` onward, for consumers catching up incrementally.
    pub fn since(&self, start: usize) -> Vec<MeshUpdateRecord> {
        self.records.read().iter().skip(start).cloned().collect()
    }
}
