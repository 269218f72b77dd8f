//! ### English
//! Textured quad renderer.
//!
//! Owns the vertex buffer and the shader programs that splat the source
//! texture onto whatever surface is current. One built-in program per
//! texture kind; the 2D one can be swapped for a consumer-supplied pair
//! at runtime and restored later. All entry points assume the worker's
//! context is current.
//!
//! ### 中文
//! 纹理四边形渲染器。
//!
//! 持有顶点缓冲与 shader 程序，把源纹理铺到当前 surface 上。每种纹理
//! 类型一个内建程序；2D 程序可在运行期换成消费者提供的源码，之后可还
//! 原。所有入口都假定 worker 的上下文已 current。

use std::mem;
use std::sync::Arc;

use euclid::default::Transform3D;
use glow::HasContext as _;

use crate::context::RenderingContext;
use crate::source::TextureKind;

mod program;
mod shaders;

use program::TextureProgram;
use shaders::ShaderFlavor;

/// ### English
/// Interleaved position+uv strip covering clip space.
///
/// ### 中文
/// 覆盖裁剪空间的交错 position+uv 条带。
const QUAD_VERTICES: [f32; 16] = [
    -1.0, -1.0, 0.0, 0.0, //
    1.0, -1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, 1.0, //
    1.0, 1.0, 1.0, 1.0, //
];

struct Quad {
    vbo: glow::NativeBuffer,
    /// Core profiles refuse to draw without a bound VAO.
    vao: Option<glow::NativeVertexArray>,
}

impl Quad {
    fn new(gl: &Arc<glow::Context>, needs_vao: bool) -> Result<Self, String> {
        unsafe {
            let vao = if needs_vao {
                let vao = gl
                    .create_vertex_array()
                    .map_err(|err| format!("failed to create vertex array: {err}"))?;
                gl.bind_vertex_array(Some(vao));
                Some(vao)
            } else {
                None
            };
            let vbo = match gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(err) => {
                    if let Some(vao) = vao {
                        gl.delete_vertex_array(vao);
                    }
                    return Err(format!("failed to create vertex buffer: {err}"));
                }
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            let bytes = core::slice::from_raw_parts(
                QUAD_VERTICES.as_ptr() as *const u8,
                mem::size_of_val(&QUAD_VERTICES),
            );
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytes, glow::STATIC_DRAW);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            if vao.is_some() {
                gl.bind_vertex_array(None);
            }
            Ok(Self { vbo, vao })
        }
    }

    /// ### English
    /// Attribute pointers are set on every draw because a consumer
    /// shader swap can move the attribute locations.
    ///
    /// ### 中文
    /// 每次绘制都重设 attribute 指针，因为消费者换 shader 后 attribute
    /// 位置可能变化。
    fn bind(&self, gl: &Arc<glow::Context>, program: &TextureProgram) {
        unsafe {
            if let Some(vao) = self.vao {
                gl.bind_vertex_array(Some(vao));
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.enable_vertex_attrib_array(program.a_position);
            gl.vertex_attrib_pointer_f32(program.a_position, 2, glow::FLOAT, false, 16, 0);
            gl.enable_vertex_attrib_array(program.a_tex_coord);
            gl.vertex_attrib_pointer_f32(program.a_tex_coord, 2, glow::FLOAT, false, 16, 8);
        }
    }

    fn unbind(&self, gl: &Arc<glow::Context>, program: &TextureProgram) {
        unsafe {
            gl.disable_vertex_attrib_array(program.a_position);
            gl.disable_vertex_attrib_array(program.a_tex_coord);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            if self.vao.is_some() {
                gl.bind_vertex_array(None);
            }
        }
    }

    fn destroy(&self, gl: &Arc<glow::Context>) {
        unsafe {
            gl.delete_buffer(self.vbo);
            if let Some(vao) = self.vao {
                gl.delete_vertex_array(vao);
            }
        }
    }
}

pub(crate) struct Drawer {
    gl: Arc<glow::Context>,
    flavor: ShaderFlavor,
    quad: Quad,
    /// `None` after a consumer swap failed; 2D draws no-op until a later
    /// swap or reset brings a program back.
    program_2d: Option<TextureProgram>,
    /// Compiled on first external attach; GLES only.
    program_external: Option<TextureProgram>,
    custom_shader: bool,
}

impl Drawer {
    pub(crate) fn new(context: &RenderingContext) -> Result<Self, String> {
        let gl = context.gl();
        let flavor = ShaderFlavor::pick(context.is_gles(), context.version());
        let quad = Quad::new(&gl, flavor == ShaderFlavor::Core)?;
        let program_2d = match TextureProgram::compile(
            &gl,
            shaders::builtin_vertex(flavor),
            shaders::builtin_fragment_2d(flavor),
        ) {
            Ok(program) => program,
            Err(err) => {
                quad.destroy(&gl);
                return Err(err);
            }
        };
        Ok(Self {
            gl,
            flavor,
            quad,
            program_2d: Some(program_2d),
            program_external: None,
            custom_shader: false,
        })
    }

    /// ### English
    /// Compiles the external-texture program if it is not up yet.
    ///
    /// ### 中文
    /// 若外部纹理程序尚未就绪则编译之。
    pub(crate) fn ensure_external_program(&mut self) -> Result<(), String> {
        if self.program_external.is_some() {
            return Ok(());
        }
        let Some(fragment) = shaders::external_fragment(self.flavor) else {
            return Err("external textures need a GLES context".to_string());
        };
        let program =
            TextureProgram::compile(&self.gl, shaders::builtin_vertex(self.flavor), fragment)?;
        self.program_external = Some(program);
        Ok(())
    }

    /// ### English
    /// Draws the source texture as a quad into the current surface.
    /// `mvp_matrix` carries the scale-mode geometry, `tex_matrix` the
    /// producer's texture transform. Without a live program for `kind`
    /// the call is a no-op: the target still clears and presents, it
    /// just shows no frame.
    ///
    /// ### 中文
    /// 把源纹理以四边形画进当前 surface。`mvp_matrix` 承载缩放模式的几
    /// 何变换，`tex_matrix` 承载生产者的纹理变换。若 `kind` 对应的程序
    /// 不存在则为 no-op：目标仍会清屏并 present，只是没有画面。
    pub(crate) fn draw(
        &self,
        texture: glow::NativeTexture,
        kind: TextureKind,
        mvp_matrix: &Transform3D<f32>,
        tex_matrix: &Transform3D<f32>,
    ) {
        let program = match kind {
            TextureKind::Rgba2D => self.program_2d.as_ref(),
            TextureKind::External => self.program_external.as_ref(),
        };
        let Some(program) = program else {
            return;
        };
        let target = kind.gl_target();
        program.bind(&self.gl, &mvp_matrix.to_array(), &tex_matrix.to_array());
        unsafe {
            self.gl.active_texture(glow::TEXTURE0);
            self.gl.bind_texture(target, Some(texture));
            self.gl.disable(glow::DEPTH_TEST);
            self.gl.disable(glow::BLEND);
        }
        self.quad.bind(&self.gl, program);
        unsafe {
            self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
        self.quad.unbind(&self.gl, program);
        unsafe {
            self.gl.bind_texture(target, None);
            self.gl.use_program(None);
        }
    }

    /// ### English
    /// Swaps the 2D program for consumer-supplied sources. The old
    /// program is gone either way; a compile or link failure leaves the
    /// slot empty, so 2D draws no-op until a later swap or
    /// [`reset_shader`](Self::reset_shader) succeeds.
    ///
    /// ### 中文
    /// 把 2D 程序换成消费者提供的源码。旧程序必定被删除；编译或链接失
    /// 败会使槽位置空，2D 绘制将 no-op，直到后续换入或
    /// [`reset_shader`](Self::reset_shader) 成功。
    pub(crate) fn update_shader(&mut self, vertex: &str, fragment: &str) -> Result<(), String> {
        if let Some(old) = self.program_2d.take() {
            old.destroy(&self.gl);
        }
        self.custom_shader = true;
        self.program_2d = Some(TextureProgram::compile(&self.gl, vertex, fragment)?);
        Ok(())
    }

    /// ### English
    /// Restores the built-in 2D program. No-op when it is already in
    /// place.
    ///
    /// ### 中文
    /// 还原内建 2D 程序。内建程序已生效时为 no-op。
    pub(crate) fn reset_shader(&mut self) -> Result<(), String> {
        if !self.custom_shader {
            return Ok(());
        }
        let program = TextureProgram::compile(
            &self.gl,
            shaders::builtin_vertex(self.flavor),
            shaders::builtin_fragment_2d(self.flavor),
        )?;
        if let Some(old) = self.program_2d.replace(program) {
            old.destroy(&self.gl);
        }
        self.custom_shader = false;
        Ok(())
    }

    /// ### English
    /// Deletes every GL object. Called once while the context is still
    /// current, during worker teardown.
    ///
    /// ### 中文
    /// 删除全部 GL 对象。在上下文仍 current 时、worker 收尾期间调用一
    /// 次。
    pub(crate) fn teardown(&mut self) {
        if let Some(program) = self.program_2d.take() {
            program.destroy(&self.gl);
        }
        if let Some(program) = self.program_external.take() {
            program.destroy(&self.gl);
        }
        self.quad.destroy(&self.gl);
    }
}
