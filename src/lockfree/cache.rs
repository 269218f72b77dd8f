//! ### English
//! Cache-line padding arithmetic for the lock-free structures in this crate.
//!
//! ### 中文
//! 本 crate 内无锁结构使用的 cache line padding 计算。

/// ### English
/// The cache line size we lay hot atomics out against (bytes).
///
/// ### 中文
/// 热点原子量布局所对齐的 cache line 大小（字节）。
pub(crate) const CACHE_LINE_BYTES: usize = 64;

/// ### English
/// Returns the padding bytes needed to advance to the next cache-line
/// boundary, for use in `#[repr(C, align(64))]` structs that keep
/// contended fields off each other's lines.
///
/// #### Parameters
/// - `bytes_used`: Number of bytes already occupied by preceding fields.
///
/// ### 中文
/// 返回推进到下一个 cache line 边界所需的 padding 字节数，配合
/// `#[repr(C, align(64))]` 结构体使用，使争用字段不共享缓存行。
///
/// #### 参数
/// - `bytes_used`：前置字段已占用的字节数。
#[inline]
pub(crate) const fn pad_to_cache_line(bytes_used: usize) -> usize {
    let rem = bytes_used % CACHE_LINE_BYTES;
    if rem == 0 { 0 } else { CACHE_LINE_BYTES - rem }
}

/// ### English
/// Returns the padding bytes needed after a single field of type `T` to
/// reach the next cache line.
///
/// ### 中文
/// 返回在单个 `T` 字段之后推进到下一个 cache line 所需的 padding
/// 字节数。
#[inline]
pub(crate) const fn pad_after<T>() -> usize {
    pad_to_cache_line(std::mem::size_of::<T>())
}
