/// ### English
/// GLSL dialect picked from the context's API and version.
///
/// ### 中文
/// 依据上下文 API 与版本选定的 GLSL 方言。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ShaderFlavor {
    /// ES 1.00 sources; compile on GLES 2 and 3.
    Gles,
    /// GLSL 150; desktop core profiles from GL 3.2 up.
    Core,
    /// GLSL 110; desktop GL below 3.2.
    Legacy,
}

impl ShaderFlavor {
    pub(crate) fn pick(is_gles: bool, version: (u32, u32)) -> Self {
        if is_gles {
            Self::Gles
        } else if version >= (3, 2) {
            Self::Core
        } else {
            Self::Legacy
        }
    }
}

const VERTEX_GLES: &str = r#"
attribute vec2 aPosition;
attribute vec2 aTexCoord;
uniform mat4 uMvpMatrix;
uniform mat4 uTexMatrix;
varying vec2 vTexCoord;
void main() {
    gl_Position = uMvpMatrix * vec4(aPosition, 0.0, 1.0);
    vTexCoord = (uTexMatrix * vec4(aTexCoord, 0.0, 1.0)).xy;
}
"#;

const VERTEX_CORE: &str = r#"#version 150
in vec2 aPosition;
in vec2 aTexCoord;
uniform mat4 uMvpMatrix;
uniform mat4 uTexMatrix;
out vec2 vTexCoord;
void main() {
    gl_Position = uMvpMatrix * vec4(aPosition, 0.0, 1.0);
    vTexCoord = (uTexMatrix * vec4(aTexCoord, 0.0, 1.0)).xy;
}
"#;

const VERTEX_LEGACY: &str = r#"#version 110
attribute vec2 aPosition;
attribute vec2 aTexCoord;
uniform mat4 uMvpMatrix;
uniform mat4 uTexMatrix;
varying vec2 vTexCoord;
void main() {
    gl_Position = uMvpMatrix * vec4(aPosition, 0.0, 1.0);
    vTexCoord = (uTexMatrix * vec4(aTexCoord, 0.0, 1.0)).xy;
}
"#;

const FRAGMENT_GLES: &str = r#"
precision mediump float;
varying vec2 vTexCoord;
uniform sampler2D uTexture;
void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#;

const FRAGMENT_CORE: &str = r#"#version 150
in vec2 vTexCoord;
out vec4 oColor;
uniform sampler2D uTexture;
void main() {
    oColor = texture(uTexture, vTexCoord);
}
"#;

const FRAGMENT_LEGACY: &str = r#"#version 110
varying vec2 vTexCoord;
uniform sampler2D uTexture;
void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#;

/// ### English
/// Sampling an external image (e.g. a camera decoder surface) needs the
/// OES sampler type; the dialect only exists on GLES.
///
/// ### 中文
/// 采样外部图像（如相机解码 surface）需要 OES 采样器类型；该方言仅存在
/// 于 GLES。
const FRAGMENT_EXTERNAL_GLES: &str = r#"#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTexCoord;
uniform samplerExternalOES uTexture;
void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#;

pub(crate) fn builtin_vertex(flavor: ShaderFlavor) -> &'static str {
    match flavor {
        ShaderFlavor::Gles => VERTEX_GLES,
        ShaderFlavor::Core => VERTEX_CORE,
        ShaderFlavor::Legacy => VERTEX_LEGACY,
    }
}

pub(crate) fn builtin_fragment_2d(flavor: ShaderFlavor) -> &'static str {
    match flavor {
        ShaderFlavor::Gles => FRAGMENT_GLES,
        ShaderFlavor::Core => FRAGMENT_CORE,
        ShaderFlavor::Legacy => FRAGMENT_LEGACY,
    }
}

pub(crate) fn external_fragment(flavor: ShaderFlavor) -> Option<&'static str> {
    match flavor {
        ShaderFlavor::Gles => Some(FRAGMENT_EXTERNAL_GLES),
        ShaderFlavor::Core | ShaderFlavor::Legacy => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_follows_api_and_version() {
        assert_eq!(ShaderFlavor::pick(true, (2, 0)), ShaderFlavor::Gles);
        assert_eq!(ShaderFlavor::pick(true, (3, 2)), ShaderFlavor::Gles);
        assert_eq!(ShaderFlavor::pick(false, (3, 3)), ShaderFlavor::Core);
        assert_eq!(ShaderFlavor::pick(false, (3, 2)), ShaderFlavor::Core);
        assert_eq!(ShaderFlavor::pick(false, (2, 1)), ShaderFlavor::Legacy);
    }

    #[test]
    fn external_sampling_has_no_desktop_dialect() {
        assert!(external_fragment(ShaderFlavor::Gles).is_some());
        assert!(external_fragment(ShaderFlavor::Core).is_none());
        assert!(external_fragment(ShaderFlavor::Legacy).is_none());
    }
}
