//! Shared fixtures for the render core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use render_core::backend::{NullBackend, ShaderType, TextureParameter};
use render_core::resources::{Image, MemoryFile, Program, ShaderStatus, Texture};
use render_core::vertex::{Vertex3D, VertexData};
use render_core::{RenderConfig, Renderer};

pub const VERTEX_SOURCE: &str = "\
uniform mat4 u_model_matrix;
uniform mat4 u_view_projection;
void main() {}
";

pub const FRAGMENT_SOURCE: &str = "\
uniform sampler2D tex0_diffuse;
uniform sampler2D tex1_normal;
uniform vec4 u_color;
void main() {}
";

/// Renderer on a null backend whose state was initialized and whose call
/// log is empty.
pub fn renderer() -> Renderer<NullBackend> {
    renderer_with(RenderConfig::default())
}

pub fn renderer_with(config: RenderConfig) -> Renderer<NullBackend> {
    render_core::logging::init_logging("debug");
    let backend = config.create_backend();
    let mut renderer = Renderer::new(config, backend);
    assert!(renderer.init_state());
    renderer.backend_mut().clear_calls();
    renderer
}

pub fn program(renderer: &mut Renderer<NullBackend>, name: &str) -> Arc<Program> {
    let vertex = renderer
        .create_shader(
            ShaderType::Vertex,
            MemoryFile::new(format!("{name}.vert"), VERTEX_SOURCE),
            ShaderStatus::OnDisk,
        )
        .unwrap();
    let fragment = renderer
        .create_shader(
            ShaderType::Fragment,
            MemoryFile::new(format!("{name}.frag"), FRAGMENT_SOURCE),
            ShaderStatus::OnDisk,
        )
        .unwrap();
    renderer.create_program(vec![vertex, fragment])
}

/// Valid solid-color texture.
pub fn texture(renderer: &mut Renderer<NullBackend>, color: [u8; 4]) -> Arc<Texture> {
    let texture = renderer.create_texture_from_image(Image::solid_color(color, "solid"), TextureParameter::default());
    renderer.make_texture_valid(&texture).unwrap();
    texture
}

/// Indexed quad of `Vertex3D`.
pub fn quad(renderer: &mut Renderer<NullBackend>) -> Arc<VertexData> {
    let param = renderer.vertex_data_parameter::<Vertex3D>(4, 6);
    let data = renderer.create_vertex_data(&param);
    data.modify(|vertices: &mut [Vertex3D]| {
        for (vertex, (x, y)) in vertices
            .iter_mut()
            .zip([(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)])
        {
            vertex.position = [x, y, 0.0];
        }
    });
    data.write_indices(0, &[0, 1, 2, 2, 3, 0]);
    data
}
