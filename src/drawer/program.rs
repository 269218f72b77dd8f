use std::sync::Arc;

use glow::HasContext as _;

/// ### English
/// Compiled vertex+fragment program with the attribute and uniform
/// locations the quad pass needs. Locations are looked up once at link
/// time; a missing uniform is tolerated (the driver may strip unused
/// ones) but a missing attribute is a broken shader.
///
/// ### 中文
/// 编译完成的 vertex+fragment 程序，带四边形绘制所需的 attribute 与
/// uniform 位置。位置在链接后查询一次；uniform 缺失可以容忍（驱动可能
/// 剔除未使用者），attribute 缺失则视为坏 shader。
pub(crate) struct TextureProgram {
    program: glow::NativeProgram,
    pub(crate) a_position: u32,
    pub(crate) a_tex_coord: u32,
    u_mvp_matrix: Option<glow::NativeUniformLocation>,
    u_tex_matrix: Option<glow::NativeUniformLocation>,
    u_texture: Option<glow::NativeUniformLocation>,
}

impl TextureProgram {
    /// ### English
    /// Compiles and links both stages. Shader objects are detached and
    /// deleted whatever the outcome; on failure the driver's info log is
    /// returned verbatim.
    ///
    /// ### 中文
    /// 编译并链接两个着色阶段。无论成败，shader 对象都会被 detach 并删
    /// 除；失败时原样返回驱动的 info log。
    pub(crate) fn compile(
        gl: &Arc<glow::Context>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, String> {
        unsafe {
            let vertex = gl
                .create_shader(glow::VERTEX_SHADER)
                .map_err(|err| format!("failed to create vertex shader: {err}"))?;
            gl.shader_source(vertex, vertex_source);
            gl.compile_shader(vertex);
            if !gl.get_shader_compile_status(vertex) {
                let info = gl.get_shader_info_log(vertex);
                gl.delete_shader(vertex);
                return Err(format!("vertex shader failed to compile: {info}"));
            }

            let fragment = gl
                .create_shader(glow::FRAGMENT_SHADER)
                .map_err(|err| format!("failed to create fragment shader: {err}"))?;
            gl.shader_source(fragment, fragment_source);
            gl.compile_shader(fragment);
            if !gl.get_shader_compile_status(fragment) {
                let info = gl.get_shader_info_log(fragment);
                gl.delete_shader(vertex);
                gl.delete_shader(fragment);
                return Err(format!("fragment shader failed to compile: {info}"));
            }

            let program = gl
                .create_program()
                .map_err(|err| format!("failed to create program: {err}"))?;
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.link_program(program);

            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            if !gl.get_program_link_status(program) {
                let info = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(format!("program failed to link: {info}"));
            }

            let a_position = match gl.get_attrib_location(program, "aPosition") {
                Some(location) => location,
                None => {
                    gl.delete_program(program);
                    return Err("program has no aPosition attribute".to_string());
                }
            };
            let a_tex_coord = match gl.get_attrib_location(program, "aTexCoord") {
                Some(location) => location,
                None => {
                    gl.delete_program(program);
                    return Err("program has no aTexCoord attribute".to_string());
                }
            };

            Ok(Self {
                program,
                a_position,
                a_tex_coord,
                u_mvp_matrix: gl.get_uniform_location(program, "uMvpMatrix"),
                u_tex_matrix: gl.get_uniform_location(program, "uTexMatrix"),
                u_texture: gl.get_uniform_location(program, "uTexture"),
            })
        }
    }

    /// ### English
    /// Binds the program and uploads the matrices and sampler unit.
    /// Matrix memory order matches what GL expects for column-vector
    /// math, so no transpose.
    ///
    /// ### 中文
    /// 绑定程序并上传矩阵与采样单元。矩阵内存序与 GL 列向量约定一致，
    /// 无需转置。
    pub(crate) fn bind(
        &self,
        gl: &Arc<glow::Context>,
        mvp_matrix: &[f32; 16],
        tex_matrix: &[f32; 16],
    ) {
        unsafe {
            gl.use_program(Some(self.program));
            gl.uniform_matrix_4_f32_slice(self.u_mvp_matrix.as_ref(), false, mvp_matrix);
            gl.uniform_matrix_4_f32_slice(self.u_tex_matrix.as_ref(), false, tex_matrix);
            gl.uniform_1_i32(self.u_texture.as_ref(), 0);
        }
    }

    pub(crate) fn destroy(&self, gl: &Arc<glow::Context>) {
        unsafe {
            gl.delete_program(self.program);
        }
    }
}
