use crate::number::minimally_encode;
use crate::ExecError;

/// Shifts `data`, read as one big-endian bit string, left by `n` bits.
///
/// The length is preserved, bits shifted out are lost and zeros come in.
pub fn lshift(data: &[u8], n: usize) -> Vec<u8> {
    let len = data.len();
    let byte_shift = n / 8;
    let bit_shift = (n % 8) as u32;
    let mut out = vec![0u8; len];
    if byte_shift >= len {
        return out;
    }
    for i in 0..len - byte_shift {
        let src = i + byte_shift;
        out[i] = data[src] << bit_shift;
        if bit_shift > 0 && src + 1 < len {
            out[i] |= data[src + 1] >> (8 - bit_shift);
        }
    }
    out
}

/// Shifts `data`, read as one big-endian bit string, right by `n` bits.
pub fn rshift(data: &[u8], n: usize) -> Vec<u8> {
    let len = data.len();
    let byte_shift = n / 8;
    let bit_shift = (n % 8) as u32;
    let mut out = vec![0u8; len];
    if byte_shift >= len {
        return out;
    }
    for i in byte_shift..len {
        let src = i - byte_shift;
        out[i] = data[src] >> bit_shift;
        if bit_shift > 0 && src > 0 {
            out[i] |= data[src - 1] << (8 - bit_shift);
        }
    }
    out
}

/// Re-encodes a number in exactly `size` bytes, moving the sign bit to the
/// new last byte.
pub fn num2bin(mut num: Vec<u8>, size: usize) -> Result<Vec<u8>, ExecError> {
    minimally_encode(&mut num);
    if num.len() > size {
        return Err(ExecError::ImpossibleEncoding);
    }
    if num.len() == size {
        return Ok(num);
    }

    let mut sign = 0x00;
    if let Some(last) = num.last_mut() {
        sign = *last & 0x80;
        *last &= 0x7f;
    }
    num.reserve(size - num.len());
    num.resize(size - 1, 0x00);
    num.push(sign);
    Ok(num)
}
