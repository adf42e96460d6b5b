use js_sys::{Function, Reflect};
use log::{error, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    HtmlCanvasElement, WebGl2RenderingContext as GL, WebGlBuffer, WebGlProgram, WebGlShader,
};

use super::{
    plane_uploads, FrameRenderer, Texture, FRAGMENT_SHADER, PLANE_UNIFORMS, QUAD_VERTICES,
    TEXCOORD_OFFSET, VERTEX_COUNT, VERTEX_SHADER, VERTEX_STRIDE,
};
use crate::decoder::Frame;
use crate::error::RenderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererStatus {
    Uninitialized,
    Ready,
    Unavailable,
}

struct Pipeline {
    gl: GL,
    program: WebGlProgram,
    vertex_shader: WebGlShader,
    fragment_shader: WebGlShader,
    vertices: WebGlBuffer,
    planes: [Texture; 3],
}

enum State {
    Uninitialized,
    Ready(Pipeline),
    Unavailable,
}

/// Draws YUV420 frames onto a canvas with a WebGL2 YUV→RGB shader.
pub struct WebGlPlayer {
    canvas: HtmlCanvasElement,
    state: State,
}

impl WebGlPlayer {
    /// Never fails: without WebGL the player stays `Unavailable` and every
    /// render reports [`RenderError::Unavailable`].
    pub fn new(canvas: HtmlCanvasElement) -> Self {
        let mut player = Self {
            canvas,
            state: State::Uninitialized,
        };
        player.init();
        player
    }

    pub fn status(&self) -> RendererStatus {
        match self.state {
            State::Uninitialized => RendererStatus::Uninitialized,
            State::Ready(_) => RendererStatus::Ready,
            State::Unavailable => RendererStatus::Unavailable,
        }
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    fn init(&mut self) {
        let gl = match context(&self.canvas) {
            Some(gl) => gl,
            None => {
                error!("WebGL not supported");
                self.state = State::Unavailable;
                return;
            }
        };
        self.state = match Pipeline::new(gl) {
            Ok(pipeline) => {
                info!("webgl player ready");
                State::Ready(pipeline)
            }
            Err(err) => {
                error!("webgl player init failed: {err}");
                State::Unavailable
            }
        };
    }

    /// Uploads a packed YUV420 picture and draws it. Bytes are trusted.
    pub fn render_bytes(
        &mut self,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        let State::Ready(pipeline) = &self.state else {
            error!("Render failed due to WebGL not supported");
            return Err(RenderError::Unavailable);
        };
        let gl = &pipeline.gl;
        gl.viewport(0, 0, self.canvas.width() as i32, self.canvas.height() as i32);
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        gl.clear(GL::COLOR_BUFFER_BIT);

        for (texture, plane) in pipeline.planes.iter().zip(plane_uploads(width, height, bytes)) {
            texture.fill(plane.width, plane.height, plane.data);
        }

        gl.draw_arrays(GL::TRIANGLE_STRIP, 0, VERTEX_COUNT);
        Ok(())
    }

    pub fn fullscreen(&self) -> Result<(), RenderError> {
        const REQUEST: [&str; 5] = [
            "requestFullscreen",
            "RequestFullScreen",
            "webkitRequestFullScreen",
            "mozRequestFullScreen",
            "msRequestFullscreen",
        ];
        let canvas: &JsValue = self.canvas.as_ref();
        if call_first(canvas, &REQUEST) {
            return Ok(());
        }
        notify("This browser doesn't support fullscreen");
        Err(RenderError::Fullscreen("fullscreen not supported"))
    }

    pub fn exit_fullscreen(&self) -> Result<(), RenderError> {
        const EXIT: [&str; 4] = [
            "exitFullscreen",
            "webkitExitFullscreen",
            "mozCancelFullScreen",
            "msExitFullscreen",
        ];
        let document = web_sys::window().and_then(|w| w.document());
        if let Some(document) = document {
            let document: &JsValue = document.as_ref();
            if call_first(document, &EXIT) {
                return Ok(());
            }
        }
        notify("Exit fullscreen doesn't work");
        Err(RenderError::Fullscreen("exit fullscreen not supported"))
    }
}

impl FrameRenderer for WebGlPlayer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.render_bytes(frame.width(), frame.height(), frame.bytes())
    }
}

impl Pipeline {
    fn new(gl: GL) -> Result<Self, RenderError> {
        gl.pixel_storei(GL::UNPACK_ALIGNMENT, 1);

        let vertex_shader = compile_shader(&gl, GL::VERTEX_SHADER, VERTEX_SHADER)?;
        let fragment_shader = compile_shader(&gl, GL::FRAGMENT_SHADER, FRAGMENT_SHADER)?;
        let program = link_program(&gl, &vertex_shader, &fragment_shader)?;

        let vertices = gl
            .create_buffer()
            .ok_or_else(|| RenderError::Gl("Unable to create vertex buffer".into()))?;
        gl.bind_buffer(GL::ARRAY_BUFFER, Some(&vertices));
        gl.buffer_data_with_u8_array(
            GL::ARRAY_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
            GL::STATIC_DRAW,
        );
        enable_attribute(&gl, &program, "aPos", 3, 0);
        enable_attribute(&gl, &program, "aTexCoord", 2, TEXCOORD_OFFSET);

        let planes = [Texture::new(&gl)?, Texture::new(&gl)?, Texture::new(&gl)?];
        for (slot, (texture, name)) in planes.iter().zip(PLANE_UNIFORMS).enumerate() {
            texture.bind(slot as u32, &program, name);
        }

        Ok(Self {
            gl,
            program,
            vertex_shader,
            fragment_shader,
            vertices,
            planes,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let gl = &self.gl;
        gl.delete_buffer(Some(&self.vertices));
        gl.delete_program(Some(&self.program));
        gl.delete_shader(Some(&self.vertex_shader));
        gl.delete_shader(Some(&self.fragment_shader));
    }
}

fn context(canvas: &HtmlCanvasElement) -> Option<GL> {
    canvas
        .get_context("webgl2")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<GL>().ok())
}

fn enable_attribute(gl: &GL, program: &WebGlProgram, name: &str, size: i32, offset: i32) {
    let location = gl.get_attrib_location(program, name);
    if location < 0 {
        error!("attribute {name} not found in shader program");
        return;
    }
    let location = location as u32;
    gl.enable_vertex_attrib_array(location);
    gl.vertex_attrib_pointer_with_i32(location, size, GL::FLOAT, false, VERTEX_STRIDE, offset);
}

/// Compile errors are logged; the shader is returned regardless so the
/// player keeps running, drawing nothing useful.
fn compile_shader(gl: &GL, shader_type: u32, source: &str) -> Result<WebGlShader, RenderError> {
    let shader = gl
        .create_shader(shader_type)
        .ok_or_else(|| RenderError::Gl("Unable to create shader object".into()))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    let compiled = gl
        .get_shader_parameter(&shader, GL::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false);
    if !compiled {
        let kind = if shader_type == GL::VERTEX_SHADER {
            "Vertex"
        } else {
            "Fragment"
        };
        error!(
            "{kind} shader compile failed: {}",
            gl.get_shader_info_log(&shader)
                .unwrap_or_else(|| String::from("Unknown error creating shader"))
        );
    }
    Ok(shader)
}

fn link_program(
    gl: &GL,
    vert_shader: &WebGlShader,
    frag_shader: &WebGlShader,
) -> Result<WebGlProgram, RenderError> {
    let program = gl
        .create_program()
        .ok_or_else(|| RenderError::Gl("Unable to create program object".into()))?;

    gl.attach_shader(&program, vert_shader);
    gl.attach_shader(&program, frag_shader);
    gl.link_program(&program);
    gl.use_program(Some(&program));

    let linked = gl
        .get_program_parameter(&program, GL::LINK_STATUS)
        .as_bool()
        .unwrap_or(false);
    if !linked {
        error!(
            "Shader link failed: {}",
            gl.get_program_info_log(&program)
                .unwrap_or_else(|| String::from("Unknown error creating program"))
        );
    }
    Ok(program)
}

/// Calls the first method of `target` named in `names` that exists.
fn call_first(target: &JsValue, names: &[&str]) -> bool {
    for name in names {
        let Ok(method) = Reflect::get(target, &JsValue::from_str(name)) else {
            continue;
        };
        if let Some(method) = method.dyn_ref::<Function>() {
            if let Err(err) = method.call0(target) {
                error!("{name} failed: {err:?}");
            }
            return true;
        }
    }
    false
}

fn notify(message: &str) {
    log::warn!("{message}");
    if let Some(window) = web_sys::window() {
        let _ = window.alert_with_message(message);
    }
}
