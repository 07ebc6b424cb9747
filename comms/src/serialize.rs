use std::io;

/// Types that know how to write themselves into a frame.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, anything written here is sent first.
    ///
    /// # Returns
    /// An optional borrowed slice that is sent right after `buf` without being copied,
    /// or an io error if the value can't be serialized.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>>;
}
