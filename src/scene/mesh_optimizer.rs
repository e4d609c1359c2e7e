use super::mesh::{Aabb, Mesh};
use crate::renderer::shader_interfaces::vertex_inputs::Vertex;
use anyhow::Context;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use memoffset::offset_of;
use std::mem;

/// Overdraw optimization may degrade vertex cache efficiency by at most this factor
pub const OVERDRAW_THRESHOLD: f32 = 1.05;

/// Deduplicates vertices then reorders indices for the post-transform cache, overdraw and finally
/// reorders vertices for fetch locality. Skipped for meshes without a whole number of triangles.
pub fn optimize_mesh(mesh: &mut Mesh) -> anyhow::Result<()> {
    let index_count = mesh.indices.len();
    if index_count == 0 || index_count % 3 != 0 {
        trace!(
            "skipping mesh optimization for index count {}",
            index_count
        );
        return Ok(());
    }

    let (unique_vertex_count, remap) =
        meshopt::generate_vertex_remap(&mesh.vertices, Some(&mesh.indices));
    let mut indices = meshopt::remap_index_buffer(Some(&mesh.indices), index_count, &remap);
    let vertices = meshopt::remap_vertex_buffer(&mesh.vertices, unique_vertex_count, &remap);

    meshopt::optimize_vertex_cache_in_place(&mut indices, vertices.len());

    let vertex_adapter = meshopt::VertexDataAdapter::new(
        bytemuck::cast_slice(&vertices),
        mem::size_of::<Vertex>(),
        offset_of!(Vertex, position),
    )
    .map_err(|e| anyhow::anyhow!("{:?}", e))
    .context("creating mesh optimizer vertex adapter")?;
    meshopt::optimize_overdraw_in_place(&mut indices, &vertex_adapter, OVERDRAW_THRESHOLD);

    let vertices = meshopt::optimize_vertex_fetch(&mut indices, &vertices);

    trace!(
        "optimized mesh: {} -> {} vertices",
        mesh.vertices.len(),
        vertices.len()
    );

    mesh.bounding_box = Aabb::from_vertices(&vertices);
    mesh.vertices = vertices;
    mesh.indices = indices;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::mesh::MaterialTextures;
    use std::collections::BTreeSet;

    fn vertex_at(x: f32, y: f32) -> Vertex {
        Vertex {
            position: [x, y, 0.],
            ..Default::default()
        }
    }

    /// Triangles as sorted position triples so vertex and winding order don't matter
    fn triangle_set(mesh: &Mesh) -> BTreeSet<Vec<[u32; 3]>> {
        mesh.indices
            .chunks_exact(3)
            .map(|tri| {
                let mut corners: Vec<[u32; 3]> = tri
                    .iter()
                    .map(|&i| mesh.vertices[i as usize].position.map(f32::to_bits))
                    .collect();
                corners.sort();
                corners
            })
            .collect()
    }

    /// Quad made of two triangles with the shared edge duplicated (6 vertices)
    fn duplicated_quad() -> Mesh {
        let vertices = vec![
            vertex_at(0., 0.),
            vertex_at(1., 0.),
            vertex_at(1., 1.),
            vertex_at(0., 0.),
            vertex_at(1., 1.),
            vertex_at(0., 1.),
        ];
        Mesh::new(vertices, (0..6).collect(), MaterialTextures::default())
    }

    #[test]
    fn duplicates_are_removed_and_triangles_kept() {
        let mut mesh = duplicated_quad();
        let triangles_before = triangle_set(&mesh);

        optimize_mesh(&mut mesh).unwrap();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(triangle_set(&mesh), triangles_before);
    }

    #[test]
    fn partial_triangles_are_left_alone() {
        let mut mesh = duplicated_quad();
        mesh.indices.truncate(5);
        let before = mesh.clone();

        optimize_mesh(&mut mesh).unwrap();

        assert_eq!(mesh.indices, before.indices);
        assert_eq!(mesh.vertices, before.vertices);
    }

    #[test]
    fn empty_mesh_is_left_alone() {
        let mut mesh = Mesh::default();
        optimize_mesh(&mut mesh).unwrap();
        assert!(mesh.vertices.is_empty());
    }
}
