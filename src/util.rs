//! Small validation helpers shared by configuration and credential checks.

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
pub(crate) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Hex-encode `data` into a fixed buffer, stopping when it is full.
pub(crate) fn hex_encode<const N: usize>(data: &[u8]) -> heapless::String<N> {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = heapless::String::new();
    for &b in data {
        if out.len() + 2 > N {
            break;
        }
        let _ = out.push(DIGITS[(b >> 4) as usize] as char);
        let _ = out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}
