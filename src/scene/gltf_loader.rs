use super::{
    mesh::{MaterialTextures, Mesh},
    object::{Object, Transform},
    ImageData, Scene,
};
use crate::renderer::shader_interfaces::vertex_inputs::Vertex;
use glam::Mat4;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{fmt, path::Path};

pub fn load_gltf(path: impl AsRef<Path>) -> Result<Scene, SceneLoadError> {
    let path = path.as_ref();
    debug!("loading gltf scene {:?}", path);
    let (document, buffers, images) = gltf::import(path).map_err(SceneLoadError::Gltf)?;
    build_scene(&document, &buffers, &images)
}

/// Loads gltf json or glb bytes. External buffer uris are not resolved, data uris are.
pub fn load_gltf_slice(bytes: &[u8]) -> Result<Scene, SceneLoadError> {
    let (document, buffers, images) = gltf::import_slice(bytes).map_err(SceneLoadError::Gltf)?;
    build_scene(&document, &buffers, &images)
}

fn build_scene(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> Result<Scene, SceneLoadError> {
    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(SceneLoadError::NoScene)?;

    let mut objects = Vec::new();
    for node in gltf_scene.nodes() {
        visit_node(&node, Mat4::IDENTITY, buffers, &mut objects)?;
    }

    let images = images
        .iter()
        .enumerate()
        .map(|(index, image)| {
            let rgba = convert_to_rgba8(image.format, &image.pixels);
            if rgba.is_none() {
                warn!(
                    "unsupported gltf image format {:?} (image {}). dropping texture",
                    image.format, index
                );
            }
            ImageData {
                width: image.width,
                height: image.height,
                rgba: rgba.unwrap_or_default(),
            }
        })
        .collect::<Vec<_>>();

    clear_dropped_image_slots(&mut objects, &images);

    debug!(
        "loaded gltf scene: {} objects, {} images",
        objects.len(),
        images.len()
    );

    Ok(Scene { objects, images })
}

fn visit_node(
    node: &gltf::Node,
    parent_transform: Mat4,
    buffers: &[gltf::buffer::Data],
    objects: &mut Vec<Object>,
) -> Result<(), SceneLoadError> {
    let local_transform = Mat4::from_cols_array_2d(&node.transform().matrix());
    let global_transform = parent_transform * local_transform;

    if let Some(gltf_mesh) = node.mesh() {
        let mesh_name = gltf_mesh
            .name()
            .or(node.name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh {}", gltf_mesh.index()));

        for primitive in gltf_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "skipping primitive {} of '{}' with unsupported mode {:?}",
                    primitive.index(),
                    mesh_name,
                    primitive.mode()
                );
                continue;
            }

            let mesh = read_primitive(&primitive, buffers, &mesh_name)?;
            let name = if gltf_mesh.primitives().len() > 1 {
                format!("{} [{}]", mesh_name, primitive.index())
            } else {
                mesh_name.clone()
            };
            objects.push(Object::new(
                name,
                mesh,
                Transform::from_matrix(global_transform),
            ));
        }
    }

    for child in node.children() {
        visit_node(&child, global_transform, buffers, objects)?;
    }
    Ok(())
}

fn read_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    mesh_name: &str,
) -> Result<Mesh, SceneLoadError> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| SceneLoadError::MissingPositions {
            mesh: mesh_name.to_string(),
        })?
        .collect();
    let vertex_count = positions.len();

    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|iter| iter.collect())
        .unwrap_or_else(|| vec![Vertex::DEFAULT_NORMAL; vertex_count]);
    let tex_coords: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|iter| iter.into_f32().collect())
        .unwrap_or_else(|| vec![[0.; 2]; vertex_count]);
    let colors: Vec<[f32; 4]> = reader
        .read_colors(0)
        .map(|iter| iter.into_rgba_f32().collect())
        .unwrap_or_else(|| vec![Vertex::DEFAULT_COLOR; vertex_count]);
    let tangents: Vec<[f32; 4]> = reader
        .read_tangents()
        .map(|iter| iter.collect())
        .unwrap_or_else(|| vec![Vertex::DEFAULT_TANGENT; vertex_count]);

    let vertices = (0..vertex_count)
        .map(|i| Vertex {
            position: positions[i],
            normal: normals.get(i).copied().unwrap_or(Vertex::DEFAULT_NORMAL),
            tex_coord: tex_coords.get(i).copied().unwrap_or([0.; 2]),
            color: colors.get(i).copied().unwrap_or(Vertex::DEFAULT_COLOR),
            tangent: tangents.get(i).copied().unwrap_or(Vertex::DEFAULT_TANGENT),
        })
        .collect::<Vec<_>>();

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_else(|| (0..vertex_count as u32).collect());

    Ok(Mesh::new(
        vertices,
        indices,
        material_textures(&primitive.material()),
    ))
}

/// Material slots pointing at images that couldn't be converted fall back to the default texture
fn clear_dropped_image_slots(objects: &mut [Object], images: &[ImageData]) {
    for object in objects {
        let material = &mut object.mesh.material;
        for slot in [
            &mut material.albedo,
            &mut material.normal,
            &mut material.occlusion,
            &mut material.emissive,
            &mut material.metallic_roughness,
        ] {
            let dropped = slot.map_or(false, |i| images.get(i).map_or(true, |im| im.rgba.is_empty()));
            if dropped {
                *slot = None;
            }
        }
    }
}

fn material_textures(material: &gltf::Material) -> MaterialTextures {
    let pbr = material.pbr_metallic_roughness();
    MaterialTextures {
        albedo: pbr
            .base_color_texture()
            .map(|info| info.texture().source().index()),
        normal: material
            .normal_texture()
            .map(|info| info.texture().source().index()),
        occlusion: material
            .occlusion_texture()
            .map(|info| info.texture().source().index()),
        emissive: material
            .emissive_texture()
            .map(|info| info.texture().source().index()),
        metallic_roughness: pbr
            .metallic_roughness_texture()
            .map(|info| info.texture().source().index()),
    }
}

/// Converts decoded pixel data to rgba8. 16-bit channels keep their high byte and float channels
/// are clamped to 0-1. Missing color channels are 0, missing alpha is opaque. `None` if `pixels`
/// isn't a whole number of pixels.
pub fn convert_to_rgba8(format: gltf::image::Format, pixels: &[u8]) -> Option<Vec<u8>> {
    use gltf::image::Format;

    let (channel_count, channel_size) = match format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
    };
    let pixel_size = channel_count * channel_size;
    if pixels.len() % pixel_size != 0 {
        return None;
    }

    let rgba = pixels
        .chunks_exact(pixel_size)
        .flat_map(|pixel| {
            let mut texel = [0, 0, 0, 255];
            for (out, channel) in texel.iter_mut().zip(pixel.chunks_exact(channel_size)) {
                *out = channel_to_u8(channel);
            }
            texel
        })
        .collect();
    Some(rgba)
}

/// One channel in native byte order: u8, u16 or f32
fn channel_to_u8(channel: &[u8]) -> u8 {
    match *channel {
        [c] => c,
        [a, b] => (u16::from_ne_bytes([a, b]) >> 8) as u8,
        [a, b, c, d] => (f32::from_ne_bytes([a, b, c, d]).clamp(0., 1.) * 255.).round() as u8,
        _ => 0,
    }
}

// ~~ Errors ~~

#[derive(Debug)]
pub enum SceneLoadError {
    Gltf(gltf::Error),
    /// The gltf document has no scenes
    NoScene,
    MissingPositions {
        mesh: String,
    },
}

impl fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gltf(e) => write!(f, "failed to import gltf: {}", e),
            Self::NoScene => write!(f, "gltf document contains no scenes"),
            Self::MissingPositions { mesh } => {
                write!(f, "mesh '{}' has a primitive without positions", mesh)
            }
        }
    }
}

impl std::error::Error for SceneLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gltf(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use glam::Vec3;

    fn triangle_gltf(mode: u32) -> String {
        let positions: [[f32; 3]; 3] = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]];
        let bytes: &[u8] = bytemuck::cast_slice(&positions);
        let uri = format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );
        format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scene": 0,
                "scenes": [{{ "nodes": [0] }}],
                "nodes": [
                    {{ "translation": [1.0, 0.0, 0.0], "children": [1] }},
                    {{ "mesh": 0, "scale": [2.0, 2.0, 2.0] }}
                ],
                "meshes": [{{ "name": "tri", "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "mode": {mode} }}] }}],
                "buffers": [{{ "byteLength": 36, "uri": "{uri}" }}],
                "bufferViews": [{{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }}],
                "accessors": [{{
                    "bufferView": 0,
                    "componentType": 5126,
                    "count": 3,
                    "type": "VEC3",
                    "min": [0.0, 0.0, 0.0],
                    "max": [1.0, 1.0, 0.0]
                }}]
            }}"#
        )
    }

    #[test]
    fn triangle_with_defaults_and_node_hierarchy() {
        let scene = load_gltf_slice(triangle_gltf(4).as_bytes()).unwrap();
        assert_eq!(scene.objects.len(), 1);

        let object = &scene.objects[0];
        assert_eq!(object.name, "tri");
        assert_eq!(object.mesh.indices, vec![0, 1, 2]);
        assert_eq!(object.mesh.material, MaterialTextures::default());

        let v = object.mesh.vertices[1];
        assert_eq!(v.position, [1., 0., 0.]);
        assert_eq!(v.normal, Vertex::DEFAULT_NORMAL);
        assert_eq!(v.tex_coord, [0., 0.]);
        assert_eq!(v.color, Vertex::DEFAULT_COLOR);
        assert_eq!(v.tangent, Vertex::DEFAULT_TANGENT);

        // parent translation applied after child scale
        let p = object.model_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(3., 0., 0.)).length() < 1e-5);
    }

    #[test]
    fn non_triangle_primitives_are_skipped() {
        // mode 1 = LINES
        let scene = load_gltf_slice(triangle_gltf(1).as_bytes()).unwrap();
        assert!(scene.objects.is_empty());
    }

    #[test]
    fn garbage_is_a_gltf_error() {
        let res = load_gltf_slice(b"definitely not gltf");
        assert!(matches!(res, Err(SceneLoadError::Gltf(_))));
    }

    fn png_data_uri(dynamic_image: image::DynamicImage) -> String {
        let mut png = Vec::new();
        dynamic_image
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        )
    }

    /// Indexed triangle (indices 2, 1, 0) with a textured material. Image 0 is 8-bit, image 1 is
    /// 16-bit.
    fn textured_gltf() -> String {
        let positions: [[f32; 3]; 3] = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]];
        let indices: [u16; 3] = [2, 1, 0];
        let mut bytes = bytemuck::cast_slice::<_, u8>(&positions).to_vec();
        bytes.extend_from_slice(bytemuck::cast_slice(&indices));
        let buffer_uri = format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let image_8 = png_data_uri(image::DynamicImage::ImageRgba8(
            image::ImageBuffer::from_pixel(1, 1, image::Rgba([10u8, 20, 30, 255])),
        ));
        let image_16 = png_data_uri(image::DynamicImage::ImageRgba16(
            image::ImageBuffer::from_pixel(1, 1, image::Rgba([65535u16, 0, 65535, 65535])),
        ));

        format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scenes": [{{ "nodes": [0] }}],
                "nodes": [{{ "mesh": 0 }}],
                "meshes": [{{
                    "name": "textured",
                    "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }}]
                }}],
                "materials": [{{
                    "pbrMetallicRoughness": {{
                        "baseColorTexture": {{ "index": 0 }},
                        "metallicRoughnessTexture": {{ "index": 1 }}
                    }},
                    "normalTexture": {{ "index": 1 }},
                    "emissiveTexture": {{ "index": 0 }}
                }}],
                "textures": [{{ "source": 0 }}, {{ "source": 1 }}],
                "images": [{{ "uri": "{image_8}" }}, {{ "uri": "{image_16}" }}],
                "buffers": [{{ "byteLength": 42, "uri": "{buffer_uri}" }}],
                "bufferViews": [
                    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
                    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
                ],
                "accessors": [
                    {{
                        "bufferView": 0,
                        "componentType": 5126,
                        "count": 3,
                        "type": "VEC3",
                        "min": [0.0, 0.0, 0.0],
                        "max": [1.0, 1.0, 0.0]
                    }},
                    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
                ]
            }}"#
        )
    }

    #[test]
    fn material_slots_and_explicit_indices() {
        let scene = load_gltf_slice(textured_gltf().as_bytes()).unwrap();
        assert_eq!(scene.objects.len(), 1);

        let object = &scene.objects[0];
        assert_eq!(object.mesh.indices, vec![2, 1, 0]);
        assert_eq!(
            object.mesh.material,
            MaterialTextures {
                albedo: Some(0),
                normal: Some(1),
                occlusion: None,
                emissive: Some(0),
                metallic_roughness: Some(1),
            }
        );

        assert_eq!(scene.images.len(), 2);
        assert_eq!(scene.images[0].rgba, vec![10, 20, 30, 255]);
        // 16-bit textures are converted rather than dropped
        assert_eq!(scene.images[1].width, 1);
        assert_eq!(scene.images[1].rgba, vec![255, 0, 255, 255]);
    }

    #[test]
    fn slots_pointing_at_dropped_images_are_cleared() {
        let material = MaterialTextures {
            albedo: Some(0),
            normal: Some(1),
            occlusion: Some(5),
            emissive: None,
            metallic_roughness: Some(1),
        };
        let mut objects = vec![Object::new(
            "crate",
            Mesh::new(Vec::new(), Vec::new(), material),
            Transform::IDENTITY,
        )];
        let images = [
            ImageData {
                width: 1,
                height: 1,
                rgba: vec![1, 2, 3, 4],
            },
            // unsupported source format
            ImageData {
                width: 1,
                height: 1,
                rgba: Vec::new(),
            },
        ];

        clear_dropped_image_slots(&mut objects, &images);
        assert_eq!(
            objects[0].mesh.material,
            MaterialTextures {
                albedo: Some(0),
                ..Default::default()
            }
        );
    }

    #[test]
    fn document_without_scenes() {
        let res = load_gltf_slice(br#"{ "asset": { "version": "2.0" } }"#);
        assert!(matches!(res, Err(SceneLoadError::NoScene)));
    }

    #[test]
    fn primitive_without_positions() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "name": "no_positions", "primitives": [{ "attributes": { "NORMAL": 0 } }] }],
            "accessors": [{ "componentType": 5126, "count": 3, "type": "VEC3" }]
        }"#;
        // validation would reject the document before the loader sees it
        let gltf = gltf::Gltf::from_slice_without_validation(json.as_bytes()).unwrap();

        let res = build_scene(&gltf.document, &[], &[]);
        assert!(matches!(
            res,
            Err(SceneLoadError::MissingPositions { ref mesh }) if mesh == "no_positions"
        ));
    }

    #[test]
    fn image_conversion() {
        use gltf::image::Format;

        assert_eq!(
            convert_to_rgba8(Format::R8, &[7, 9]),
            Some(vec![7, 0, 0, 255, 9, 0, 0, 255])
        );
        assert_eq!(
            convert_to_rgba8(Format::R8G8, &[1, 2]),
            Some(vec![1, 2, 0, 255])
        );
        assert_eq!(
            convert_to_rgba8(Format::R8G8B8, &[1, 2, 3, 4, 5, 6]),
            Some(vec![1, 2, 3, 255, 4, 5, 6, 255])
        );
        assert_eq!(
            convert_to_rgba8(Format::R8G8B8A8, &[1, 2, 3, 4]),
            Some(vec![1, 2, 3, 4])
        );
        assert_eq!(convert_to_rgba8(Format::R8G8B8, &[1, 2, 3, 4]), None);
    }

    #[test]
    fn wide_channels_are_narrowed() {
        use gltf::image::Format;

        let r16 = [0xffffu16, 0x8000, 0x00ff]
            .iter()
            .flat_map(|c| c.to_ne_bytes())
            .collect::<Vec<_>>();
        assert_eq!(
            convert_to_rgba8(Format::R16, &r16),
            Some(vec![255, 0, 0, 255, 128, 0, 0, 255, 0, 0, 0, 255])
        );
        assert_eq!(
            convert_to_rgba8(Format::R16G16B16A16, &r16[..6]),
            None
        );

        let rgb32 = [1.0f32, 0.5, -2.0]
            .iter()
            .flat_map(|c| c.to_ne_bytes())
            .collect::<Vec<_>>();
        assert_eq!(
            convert_to_rgba8(Format::R32G32B32FLOAT, &rgb32),
            Some(vec![255, 128, 0, 255])
        );
        let rgba32 = [0.0f32, 2.0, 0.25, 0.0]
            .iter()
            .flat_map(|c| c.to_ne_bytes())
            .collect::<Vec<_>>();
        assert_eq!(
            convert_to_rgba8(Format::R32G32B32A32FLOAT, &rgba32),
            Some(vec![0, 255, 64, 0])
        );
    }
}
