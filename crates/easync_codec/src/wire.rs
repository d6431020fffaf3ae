//! Wire constants and multibyte integers.

/// WBXML 1.3.
pub const VERSION: u8 = 0x03;

/// "Unknown" public identifier.
pub const PUBLIC_ID_UNKNOWN: u32 = 0x01;

/// IANA MIBenum for UTF-8.
pub const CHARSET_UTF8: u32 = 106;

/// Preamble written by the encoder: version, public id, charset, empty string table.
pub const HEADER: [u8; 4] = [VERSION, PUBLIC_ID_UNKNOWN as u8, CHARSET_UTF8 as u8, 0x00];

/// Switch the active code page; followed by the page byte.
pub const SWITCH_PAGE: u8 = 0x00;
/// Closes the innermost open element.
pub const END: u8 = 0x01;
/// Character entity (unsupported).
pub const ENTITY: u8 = 0x02;
/// NUL-terminated inline string.
pub const STR_I: u8 = 0x03;
/// Literal tag name (unsupported).
pub const LITERAL: u8 = 0x04;
/// Length-prefixed opaque data.
pub const OPAQUE: u8 = 0xc3;

/// Tag flag: element has content and is closed by [`END`].
pub const CONTENT: u8 = 0x40;
/// Tag flag: element carries attributes (unsupported).
pub const ATTRIBUTES: u8 = 0x80;
/// Mask extracting the tag code from a tag byte.
pub const CODE_MASK: u8 = 0x3f;

/// Maximum encoded length of a 32-bit multibyte integer.
pub const MAX_MULTIBYTE_LEN: usize = 5;

/// Append `value` as a multibyte integer: 7 bits per byte, most
/// significant group first, continuation bit on every byte but the last.
pub fn write_multibyte(buffer: &mut Vec<u8>, mut value: u32) {
    let mut scratch = [0u8; MAX_MULTIBYTE_LEN];
    let mut idx = MAX_MULTIBYTE_LEN;
    loop {
        idx -= 1;
        let continuation = if idx == MAX_MULTIBYTE_LEN - 1 { 0 } else { 0x80 };
        scratch[idx] = (value & 0x7f) as u8 | continuation;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    buffer.extend_from_slice(&scratch[idx..]);
}
