use log::debug;
use web_sys::{WebGl2RenderingContext as GL, WebGlProgram, WebGlTexture};

use crate::error::RenderError;

/// One single-channel GPU image bound to a sampler slot.
pub struct Texture {
    gl: GL,
    texture: WebGlTexture,
}

impl Texture {
    pub fn new(gl: &GL) -> Result<Self, RenderError> {
        let texture = gl
            .create_texture()
            .ok_or_else(|| RenderError::Gl("Unable to create texture object".into()))?;
        gl.bind_texture(GL::TEXTURE_2D, Some(&texture));
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_MAG_FILTER, GL::LINEAR as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_MIN_FILTER, GL::LINEAR as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_WRAP_S, GL::CLAMP_TO_EDGE as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_WRAP_T, GL::CLAMP_TO_EDGE as i32);
        Ok(Self {
            gl: gl.clone(),
            texture,
        })
    }

    pub fn bind(&self, slot: u32, program: &WebGlProgram, name: &str) {
        let gl = &self.gl;
        gl.active_texture(GL::TEXTURE0 + slot);
        gl.bind_texture(GL::TEXTURE_2D, Some(&self.texture));
        gl.uniform1i(gl.get_uniform_location(program, name).as_ref(), slot as i32);
    }

    pub fn fill(&self, width: u32, height: u32, data: &[u8]) {
        self.fill_with_format(width, height, data, GL::LUMINANCE);
    }

    /// Uploads `data` as the whole image. Sizes are not checked here; a
    /// mismatch shows up as a GL error, logged and otherwise ignored.
    pub fn fill_with_format(&self, width: u32, height: u32, data: &[u8], format: u32) {
        let gl = &self.gl;
        gl.bind_texture(GL::TEXTURE_2D, Some(&self.texture));
        let uploaded = gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            GL::TEXTURE_2D,
            0,
            format as i32,
            width as i32,
            height as i32,
            0,
            format,
            GL::UNSIGNED_BYTE,
            Some(data),
        );
        if let Err(err) = uploaded {
            debug!("texture upload {width}x{height} ({} bytes) failed: {err:?}", data.len());
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.gl.delete_texture(Some(&self.texture));
    }
}
