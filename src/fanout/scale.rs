use dpi::PhysicalSize;

/// ### English
/// How a source frame is mapped onto a target whose aspect ratio differs.
///
/// ### 中文
/// 当源帧与目标宽高比不一致时的贴合方式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleMode {
    /// ### English
    /// Fill the whole target; the image distorts when aspects differ.
    ///
    /// ### 中文
    /// 铺满整个目标；宽高比不同时图像会变形。
    StretchFit,
    /// ### English
    /// Letterbox by shrinking the viewport; bars take the clear color.
    ///
    /// ### 中文
    /// 通过收缩视口加黑边；边条为清屏色。
    KeepAspectViewport,
    /// ### English
    /// Letterbox by shrinking the quad inside a full viewport.
    ///
    /// ### 中文
    /// 视口不变，通过缩小四边形加黑边。
    #[default]
    KeepAspect,
    /// ### English
    /// Cover the target by scaling the quad up; overflow is cropped
    /// centered.
    ///
    /// ### 中文
    /// 放大四边形铺满目标；溢出部分居中裁掉。
    CropCenter,
}

/// ### English
/// Per-target draw geometry resolved from a scale mode: the GL viewport
/// rectangle plus the clip-space scale applied to the quad.
///
/// ### 中文
/// 由缩放模式推导出的单目标绘制几何：GL 视口矩形加作用于四边形的裁剪
/// 空间缩放。
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Layout {
    /// `(x, y, width, height)` in pixels, GL convention.
    pub(crate) viewport: (i32, i32, i32, i32),
    pub(crate) scale: (f32, f32),
}

/// ### English
/// Resolves the geometry for one target. All ratio math runs in `f64`
/// and narrows at the edges; pixel offsets round to nearest. Degenerate
/// dimensions fall back to a plain full-target stretch.
///
/// ### 中文
/// 计算单个目标的几何。比例运算全程 `f64`，仅在边界收窄；像素偏移四舍
/// 五入。退化尺寸回退为整目标拉伸。
pub(crate) fn layout(
    mode: ScaleMode,
    target: PhysicalSize<u32>,
    source: PhysicalSize<u32>,
) -> Layout {
    let full = Layout {
        viewport: (0, 0, target.width.max(1) as i32, target.height.max(1) as i32),
        scale: (1.0, 1.0),
    };
    if target.width == 0 || target.height == 0 || source.width == 0 || source.height == 0 {
        return full;
    }

    let (tw, th) = (f64::from(target.width), f64::from(target.height));
    let (sw, sh) = (f64::from(source.width), f64::from(source.height));

    match mode {
        ScaleMode::StretchFit => full,
        ScaleMode::KeepAspectViewport => {
            let fit = (tw / sw).min(th / sh);
            let width = (sw * fit).round() as i32;
            let height = (sh * fit).round() as i32;
            let x = (target.width as i32 - width) / 2;
            let y = (target.height as i32 - height) / 2;
            Layout {
                viewport: (x, y, width, height),
                scale: (1.0, 1.0),
            }
        }
        ScaleMode::KeepAspect => {
            // Ratio of aspects; >= 1 means the source is wider than the target.
            let ratio = (sw / sh) / (tw / th);
            let scale = if ratio >= 1.0 {
                (1.0, (1.0 / ratio) as f32)
            } else {
                (ratio as f32, 1.0)
            };
            Layout {
                viewport: full.viewport,
                scale,
            }
        }
        ScaleMode::CropCenter => {
            let ratio = (sw / sh) / (tw / th);
            let scale = if ratio >= 1.0 {
                (ratio as f32, 1.0)
            } else {
                (1.0, (1.0 / ratio) as f32)
            };
            Layout {
                viewport: full.viewport,
                scale,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn stretch_covers_the_whole_target() {
        let layout = layout(
            ScaleMode::StretchFit,
            PhysicalSize::new(1280, 960),
            PhysicalSize::new(1280, 720),
        );
        assert_eq!(layout.viewport, (0, 0, 1280, 960));
        assert_eq!(layout.scale, (1.0, 1.0));
    }

    #[test]
    fn viewport_letterbox_centers_the_image() {
        let layout = layout(
            ScaleMode::KeepAspectViewport,
            PhysicalSize::new(1280, 960),
            PhysicalSize::new(1280, 720),
        );
        assert_eq!(layout.viewport, (0, 120, 1280, 720));
        assert_eq!(layout.scale, (1.0, 1.0));
    }

    #[test]
    fn quad_letterbox_shrinks_the_wider_axis() {
        let layout = layout(
            ScaleMode::KeepAspect,
            PhysicalSize::new(1280, 960),
            PhysicalSize::new(1280, 720),
        );
        assert_eq!(layout.viewport, (0, 0, 1280, 960));
        assert!(close(layout.scale.0, 1.0));
        assert!(close(layout.scale.1, 0.75));
    }

    #[test]
    fn crop_scales_the_overflowing_axis_up() {
        let layout = layout(
            ScaleMode::CropCenter,
            PhysicalSize::new(1280, 960),
            PhysicalSize::new(1280, 720),
        );
        assert_eq!(layout.viewport, (0, 0, 1280, 960));
        assert!(close(layout.scale.0, 4.0 / 3.0));
        assert!(close(layout.scale.1, 1.0));
    }

    #[test]
    fn tall_sources_mirror_the_wide_case() {
        let target = PhysicalSize::new(1280, 960);
        let source = PhysicalSize::new(720, 1280);

        let keep = layout(ScaleMode::KeepAspect, target, source);
        assert!(close(keep.scale.0, 0.421_875));
        assert!(close(keep.scale.1, 1.0));

        let crop = layout(ScaleMode::CropCenter, target, source);
        assert!(close(crop.scale.0, 1.0));
        assert!(close(crop.scale.1, 2.370_37));
    }

    #[test]
    fn degenerate_sizes_fall_back_to_full_target() {
        let layout = layout(
            ScaleMode::KeepAspect,
            PhysicalSize::new(800, 600),
            PhysicalSize::new(0, 0),
        );
        assert_eq!(layout.viewport, (0, 0, 800, 600));
        assert_eq!(layout.scale, (1.0, 1.0));
    }
}
