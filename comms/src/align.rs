/// Element types of a receive buffer.
///
/// A buffer of `Align4` elements starts at a 4 byte boundary, so the parameter payload
/// that follows the header can be reinterpreted as `f32` without copying.
pub trait Align4: bytemuck::Pod {}

impl Align4 for u32 {}
impl Align4 for f32 {}
impl Align4 for u64 {}
impl Align4 for f64 {}
