/// Packet indices live on a ring of 2^16 values; `s1` is newer than `s2`
/// when it lies at most half the ring ahead of it.
const HALF_RING: u16 = 1 << 15;

/// sequence_greater_than(2, 1) is true, sequence_greater_than(1, 1) is not
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    let ahead = s1.wrapping_sub(s2);
    ahead != 0 && ahead <= HALF_RING
}

pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}

/// Signed distance travelled going from `a` to `b` on the ring.
///
/// # Examples
/// ```
/// # use wraith_shared::wrapping_diff;
/// assert_eq!(wrapping_diff(1, 2), 1);
/// assert_eq!(wrapping_diff(2, 1), -1);
/// assert_eq!(wrapping_diff(65535, 0), 1);
/// assert_eq!(wrapping_diff(0, 65535), -1);
/// ```
pub fn wrapping_diff(a: u16, b: u16) -> i16 {
    i16::from_ne_bytes(b.wrapping_sub(a).to_ne_bytes())
}
