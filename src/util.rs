use std::io::Write;

use crate::errors::{Error, Result};

/// Rounds `value` up to the next multiple of `align`. An alignment of zero
/// leaves the value untouched.
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Writes `count` zero bytes to `dst` in fixed-size chunks.
pub(crate) fn write_zeros<W: Write + ?Sized>(dst: &mut W, mut count: u64) -> Result<()> {
    let zeros = [0u8; 4096];
    while count > 0 {
        let chunk = count.min(zeros.len() as u64) as usize;
        dst.write_all(&zeros[..chunk])?;
        count -= chunk as u64;
    }
    Ok(())
}

/// Copies `src` into a zeroed fixed-width array. `field` names the
/// offending header field when the value does not fit.
pub(crate) fn padded_array<const N: usize>(src: &[u8], field: &'static str) -> Result<[u8; N]> {
    if src.len() > N {
        return Err(Error::FieldTooLong(field));
    }
    let mut out = [0u8; N];
    out[..src.len()].copy_from_slice(src);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_the_next_boundary() {
        assert_eq!(align_up(0, 2048), 0);
        assert_eq!(align_up(1, 2048), 2048);
        assert_eq!(align_up(2048, 2048), 2048);
        assert_eq!(align_up(2049, 2048), 4096);
        assert_eq!(align_up(123, 0), 123);
    }

    #[test]
    fn write_zeros_covers_multiple_chunks() {
        let mut out = Vec::new();
        write_zeros(&mut out, 4096 + 17).unwrap();
        assert_eq!(out.len(), 4096 + 17);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn padded_array_pads_and_rejects_overflow() {
        let padded: [u8; 8] = padded_array(b"boot", "board_name").unwrap();
        assert_eq!(&padded, b"boot\0\0\0\0");

        let overflow: Result<[u8; 2]> = padded_array(b"boot", "board_name");
        assert!(matches!(overflow, Err(Error::FieldTooLong("board_name"))));
    }
}
