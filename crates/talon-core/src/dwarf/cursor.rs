//! Low-level decoder over DWARF byte streams.

use crate::error::{Result, TalonError};
use crate::types::from_bytes;

use super::encoding::*;

/// A position within a DWARF byte buffer.
///
/// Reads advance the position; all reads are bounds-checked and report
/// truncation as [`TalonError::Dwarf`]. Positions are byte offsets into
/// the containing section, so a cursor's position can be stored and later
/// revisited with [`Cursor::at`].
#[derive(Clone)]
pub(crate) struct Cursor<'a>
{
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a>
{
    pub(crate) fn new(data: &'a [u8]) -> Self
    {
        Cursor { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Self
    {
        Cursor { data, pos }
    }

    pub(crate) fn pos(&self) -> usize
    {
        self.pos
    }

    pub(crate) fn finished(&self) -> bool
    {
        self.pos >= self.data.len()
    }

    pub(crate) fn skip(&mut self, count: usize)
    {
        self.pos += count;
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]>
    {
        let bytes = self
            .data
            .get(self.pos..self.pos + count)
            .ok_or_else(|| TalonError::Dwarf("unexpected end of data".into()))?;
        self.pos += count;
        Ok(bytes)
    }

    fn fixed_int<T: Copy>(&mut self) -> Result<T>
    {
        let bytes = self.take(std::mem::size_of::<T>())?;
        from_bytes(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8>
    {
        self.fixed_int()
    }

    pub(crate) fn u16(&mut self) -> Result<u16>
    {
        self.fixed_int()
    }

    pub(crate) fn u32(&mut self) -> Result<u32>
    {
        self.fixed_int()
    }

    pub(crate) fn u64(&mut self) -> Result<u64>
    {
        self.fixed_int()
    }

    pub(crate) fn s8(&mut self) -> Result<i8>
    {
        self.fixed_int()
    }

    /// Null-terminated string starting at the current position.
    pub(crate) fn string(&mut self) -> Result<&'a str>
    {
        let tail = &self.data[self.pos.min(self.data.len())..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| TalonError::Dwarf("unterminated string".into()))?;
        self.pos += end + 1;
        std::str::from_utf8(&tail[..end])
            .map_err(|_| TalonError::Dwarf("non-UTF-8 string".into()))
    }

    /// Unsigned little-endian base-128 integer.
    pub(crate) fn uleb128(&mut self) -> Result<u64>
    {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Signed little-endian base-128 integer.
    pub(crate) fn sleb128(&mut self) -> Result<i64>
    {
        let mut result = 0u64;
        let mut shift = 0u32;
        let mut byte;
        loop {
            byte = self.u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        if shift < 64 && byte & 0x40 != 0 {
            result |= !0u64 << shift;
        }
        Ok(result as i64)
    }

    /// Skip the value of an attribute with the given form.
    ///
    /// Must understand every DWARF v4 form; an unknown form is fatal
    /// since the size of its value cannot be determined.
    pub(crate) fn skip_form(&mut self, form: u64) -> Result<()>
    {
        match form {
            DW_FORM_flag_present => {}

            DW_FORM_data1 | DW_FORM_ref1 | DW_FORM_flag => self.skip(1),
            DW_FORM_data2 | DW_FORM_ref2 => self.skip(2),
            DW_FORM_data4 | DW_FORM_ref4 | DW_FORM_ref_addr | DW_FORM_sec_offset
            | DW_FORM_strp => self.skip(4),
            DW_FORM_data8 | DW_FORM_ref8 | DW_FORM_addr => self.skip(8),

            DW_FORM_sdata => {
                self.sleb128()?;
            }
            DW_FORM_udata | DW_FORM_ref_udata => {
                self.uleb128()?;
            }

            DW_FORM_block1 => {
                let len = self.u8()?;
                self.skip(len as usize);
            }
            DW_FORM_block2 => {
                let len = self.u16()?;
                self.skip(len as usize);
            }
            DW_FORM_block4 => {
                let len = self.u32()?;
                self.skip(len as usize);
            }
            DW_FORM_block | DW_FORM_exprloc => {
                let len = self.uleb128()?;
                self.skip(len as usize);
            }

            DW_FORM_string => {
                self.string()?;
            }

            DW_FORM_indirect => {
                let real = self.uleb128()?;
                self.skip_form(real)?;
            }

            _ => return Err(TalonError::Dwarf(format!("unrecognized DWARF form 0x{form:x}"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_fixed_reads_advance()
    {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.u8().unwrap(), 0x01);
        assert_eq!(cur.u16().unwrap(), 0x0302);
        assert_eq!(cur.pos(), 3);
        assert!(!cur.finished());
        assert!(cur.u32().is_err());
    }

    #[test]
    fn test_uleb128()
    {
        // Examples from the DWARF specification.
        let cases: [(&[u8], u64); 5] = [
            (&[0x00], 0),
            (&[0x02], 2),
            (&[0x7f], 127),
            (&[0x80, 0x01], 128),
            (&[0xe5, 0x8e, 0x26], 624485),
        ];
        for (bytes, expected) in cases {
            assert_eq!(Cursor::new(bytes).uleb128().unwrap(), expected);
        }
    }

    #[test]
    fn test_sleb128()
    {
        let cases: [(&[u8], i64); 5] = [
            (&[0x02], 2),
            (&[0x7e], -2),
            (&[0xff, 0x00], 127),
            (&[0x81, 0x7f], -127),
            (&[0x80, 0x7f], -128),
        ];
        for (bytes, expected) in cases {
            assert_eq!(Cursor::new(bytes).sleb128().unwrap(), expected);
        }
    }

    #[test]
    fn test_string()
    {
        let data = b"hello\0world\0";
        let mut cur = Cursor::new(data);
        assert_eq!(cur.string().unwrap(), "hello");
        assert_eq!(cur.string().unwrap(), "world");
        assert!(cur.finished());

        let mut unterminated = Cursor::new(b"oops");
        assert!(unterminated.string().is_err());
    }

    #[test]
    fn test_skip_form_sizes()
    {
        let data = [0u8; 16];
        let fixed = [
            (DW_FORM_flag_present, 0usize),
            (DW_FORM_data1, 1),
            (DW_FORM_ref2, 2),
            (DW_FORM_strp, 4),
            (DW_FORM_addr, 8),
        ];
        for (form, size) in fixed {
            let mut cur = Cursor::new(&data);
            cur.skip_form(form).unwrap();
            assert_eq!(cur.pos(), size, "form 0x{form:x}");
        }
    }

    #[test]
    fn test_skip_form_blocks_and_lebs()
    {
        // block1 with a 3-byte payload.
        let data = [0x03, 0xaa, 0xbb, 0xcc, 0xdd];
        let mut cur = Cursor::new(&data);
        cur.skip_form(DW_FORM_block1).unwrap();
        assert_eq!(cur.pos(), 4);

        // udata spanning two bytes.
        let data = [0x80, 0x01, 0xff];
        let mut cur = Cursor::new(&data);
        cur.skip_form(DW_FORM_udata).unwrap();
        assert_eq!(cur.pos(), 2);

        // indirect resolves the real form first.
        let data = [DW_FORM_data2 as u8, 0xaa, 0xbb];
        let mut cur = Cursor::new(&data);
        cur.skip_form(DW_FORM_indirect).unwrap();
        assert_eq!(cur.pos(), 3);
    }

    #[test]
    fn test_unknown_form_is_fatal()
    {
        let data = [0u8; 4];
        let mut cur = Cursor::new(&data);
        assert!(cur.skip_form(0x7f).is_err());
    }
}
