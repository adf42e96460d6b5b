pub mod texture;
pub mod webgl;

pub use texture::Texture;
pub use webgl::{RendererStatus, WebGlPlayer};

use crate::decoder::frame::yuv420_layout;
use crate::decoder::Frame;
use crate::error::RenderError;

/// Something that presents decoded frames.
pub trait FrameRenderer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError>;
}

pub const VERTEX_SHADER: &str = r#"#version 300 es
in highp vec3 aPos;
in vec2 aTexCoord;
out highp vec2 vTexCoord;
void main(void) {
    gl_Position = vec4(aPos, 1.0);
    vTexCoord = aTexCoord;
}
"#;

pub const FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;
in highp vec2 vTexCoord;
uniform sampler2D yTex;
uniform sampler2D uTex;
uniform sampler2D vTex;
const mat4 YUV2RGB = mat4(
    1.1643828125,             0, 1.59602734375, -.87078515625,
    1.1643828125, -.39176171875,    -.81296875,     .52959375,
    1.1643828125,   2.017234375,             0,  -1.081390625,
               0,             0,             0,             1
);
out vec4 outColor;
void main(void) {
    outColor = vec4(
        texture(yTex, vTexCoord).r,
        texture(uTex, vTexCoord).r,
        texture(vTex, vTexCoord).r,
        1.0
    ) * YUV2RGB;
}
"#;

/// BT.601 conversion in the column order GLSL reads the `mat4` literal:
/// column `j` produces output channel `j`.
pub const YUV2RGB: [f32; 16] = [
    1.1643828125, 0.0, 1.59602734375, -0.87078515625,
    1.1643828125, -0.39176171875, -0.81296875, 0.52959375,
    1.1643828125, 2.017234375, 0.0, -1.081390625,
    0.0, 0.0, 0.0, 1.0,
];

/// Triangle strip covering the viewport: position xyz, texcoord st.
/// Texcoords are flipped vertically so row 0 of the image is at the top.
pub const QUAD_VERTICES: [f32; 20] = [
    -1.0, -1.0, 0.0, 0.0, 1.0, // bottom left
    1.0, -1.0, 0.0, 1.0, 1.0, // bottom right
    -1.0, 1.0, 0.0, 0.0, 0.0, // top left
    1.0, 1.0, 0.0, 1.0, 0.0, // top right
];
pub const VERTEX_STRIDE: i32 = 5 * 4;
pub const TEXCOORD_OFFSET: i32 = 3 * 4;
pub const VERTEX_COUNT: i32 = 4;

pub const PLANE_UNIFORMS: [&str; 3] = ["yTex", "uTex", "vTex"];

/// CPU mirror of the fragment shader, components in `0.0..=1.0`.
pub fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [f32; 3] {
    let input = [y, u, v, 1.0];
    let mut out = [0.0f32; 3];
    for (j, channel) in out.iter_mut().enumerate() {
        let column = &YUV2RGB[j * 4..j * 4 + 4];
        *channel = input.iter().zip(column).map(|(a, b)| a * b).sum();
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneUpload<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Splits packed YUV420 `bytes` into the three texture uploads.
/// Short input yields short (possibly empty) planes rather than a panic.
pub fn plane_uploads(width: u32, height: u32, bytes: &[u8]) -> [PlaneUpload<'_>; 3] {
    yuv420_layout(width, height).map(|plane| {
        let end = plane.offset.saturating_add(plane.len).min(bytes.len());
        let start = plane.offset.min(end);
        PlaneUpload {
            width: plane.width,
            height: plane.height,
            data: &bytes[start..end],
        }
    })
}
