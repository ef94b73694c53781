use std::mem::size_of;

use thiserror::Error;

/// Failure of a PMX parse. `BufferEnd` means the source ran out of bytes
/// mid-read; every other variant means the bytes violate the format.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ParseError {
    #[error("buffer is end")]
    BufferEnd,
    #[error("buffer is not end after parsing")]
    BufferNotEnd,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("model version is incompatible")]
    VersionIncompatible,
    #[error("PMX metadata is corrupted")]
    InfoCorrupted,
    #[error("failed to decode unicode string")]
    DecodeUnicodeStringFailed,
    #[error("vertex data is corrupted")]
    VertexCorrupted,
    #[error("face (indices) data is corrupted")]
    FaceCorrupted,
    #[error("texture reference data is corrupted")]
    TextureCorrupted,
    #[error("material data is corrupted")]
    MaterialCorrupted,
    #[error("bone data is corrupted")]
    BoneCorrupted,
    #[error("IK constraint data is corrupted")]
    ConstraintCorrupted,
    #[error("morph data is corrupted")]
    MorphCorrupted,
    #[error("label data is corrupted")]
    LabelCorrupted,
    #[error("rigid body data is corrupted")]
    RigidBodyCorrupted,
    #[error("joint data is corrupted")]
    JointCorrupted,
    #[error("soft body data is corrupted")]
    SoftBodyCorrupted,
}

impl ParseError {
    /// True when the source ended early; false for structural errors.
    pub fn is_truncation(&self) -> bool {
        matches!(self, ParseError::BufferEnd)
    }
}

/// Error from the path-based entry point: the file either could not be
/// read or its content failed to parse.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub(crate) fn check(cond: bool, err: ParseError) -> Result<(), ParseError> {
    if cond {
        Ok(())
    } else {
        Err(err)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LanguageType {
    Unknown = -1,
    Japanese,
    English,
}

#[derive(Default, Clone, Copy, PartialEq, Debug)]
#[repr(align(16))]
pub struct F128(pub [f32; 4]);

#[macro_export]
macro_rules! read_primitive {
    ($typ: ty, $read_typ:ident) => {
        pub fn $read_typ(&mut self) -> Result<$typ, ParseError> {
            let typ_len = size_of::<$typ>();
            if self.can_read_len(typ_len) {
                let result = <$typ>::from_le_bytes(
                    self.data[self.offset..self.offset + typ_len]
                        .try_into()
                        .expect("Slice From Buffer(passed can_read_len) with incorrect length! "),
                );
                self.offset += typ_len;
                Ok(result)
            } else {
                Err(ParseError::BufferEnd)
            }
        }
    };
}

/// Forward-only cursor over an owned byte source. The offset only ever
/// advances; a consumed position is never revisited.
pub struct Buffer {
    data: Vec<u8>,
    offset: usize,
}

impl Buffer {
    pub fn create(data: Vec<u8>) -> Buffer {
        Buffer { data, offset: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn can_read_len_internal(&self, len: usize) -> bool {
        self.len() >= self.offset && self.len() - self.offset >= len
    }

    pub fn can_read_len(&self, len: usize) -> bool {
        self.can_read_len_internal(len)
    }

    pub fn is_end(&self) -> bool {
        self.len() <= self.offset
    }

    pub fn read_byte(&mut self) -> Result<u8, ParseError> {
        if self.can_read_len(1) {
            let result = self.data[self.offset];
            self.offset += 1;
            Ok(result)
        } else {
            Err(ParseError::BufferEnd)
        }
    }

    /// Reads a record count. A count the remaining bytes cannot possibly
    /// satisfy (negative, or more records than bytes left) is reported as
    /// a truncation since the declared payload cannot be present.
    pub fn read_len(&mut self) -> Result<usize, ParseError> {
        let len = self.read_i32_little_endian()?;
        if len < 0 || !self.can_read_len_internal(len as usize) {
            Err(ParseError::BufferEnd)
        } else {
            Ok(len as usize)
        }
    }

    read_primitive!(u16, read_u16_little_endian);
    read_primitive!(i16, read_i16_little_endian);
    read_primitive!(u32, read_u32_little_endian);
    read_primitive!(i32, read_i32_little_endian);
    read_primitive!(f32, read_f32_little_endian);

    pub fn read_f32_3_little_endian(&mut self) -> Result<F128, ParseError> {
        Ok(F128([
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            0.0f32,
        ]))
    }

    pub fn read_f32_4_little_endian(&mut self) -> Result<F128, ParseError> {
        Ok(F128([
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
        ]))
    }

    /// Reads a 1/2/4 byte index field, sign-extended to i32. Every width is
    /// signed, so a one-byte 0xFF decodes to -1 (the "no reference" value).
    pub fn read_integer(&mut self, size: usize) -> Result<i32, ParseError> {
        Ok(match size {
            1 => self.read_byte()? as i8 as i32,
            2 => self.read_i16_little_endian()? as i32,
            4 => self.read_i32_little_endian()?,
            _ => Err(ParseError::BufferEnd)?,
        })
    }

    pub fn read_buffer(&mut self, len: usize) -> Result<&[u8], ParseError> {
        if self.can_read_len(len) {
            let result = &self.data[self.offset..self.offset + len];
            self.offset += len;
            Ok(result)
        } else {
            Err(ParseError::BufferEnd)
        }
    }
}

#[test]
fn test_buffer_read_primitive() {
    let mut buffer = Buffer::create(vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(Ok(1), buffer.read_byte());
    assert_eq!(Ok((3 << 8) | 2), buffer.read_u16_little_endian());
    assert_eq!(Ok(0x07060504), buffer.read_i32_little_endian());
    assert!(buffer.is_end());
}

#[test]
fn test_buffer_end() {
    let mut buffer = Buffer::create(vec![1, 2]);
    assert_eq!(Err(ParseError::BufferEnd), buffer.read_i32_little_endian());
    assert_eq!(0, buffer.offset());
    assert!(ParseError::BufferEnd.is_truncation());
    assert!(!ParseError::FaceCorrupted.is_truncation());
}

#[test]
fn test_read_integer_is_signed_at_every_width() {
    let mut buffer = Buffer::create(vec![0xff, 0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
    assert_eq!(Ok(-1), buffer.read_integer(1));
    assert_eq!(Ok(-2), buffer.read_integer(2));
    assert_eq!(Ok(-1), buffer.read_integer(4));
    assert_eq!(Ok(127), buffer.read_integer(1));
}

#[test]
fn test_read_len_rejects_impossible_count() {
    let mut buffer = Buffer::create(vec![0xff, 0xff, 0xff, 0xff]);
    assert_eq!(Err(ParseError::BufferEnd), buffer.read_len());
    let mut buffer = Buffer::create(vec![16, 0, 0, 0, 1, 2]);
    assert_eq!(Err(ParseError::BufferEnd), buffer.read_len());
    let mut buffer = Buffer::create(vec![2, 0, 0, 0, 1, 2]);
    assert_eq!(Ok(2), buffer.read_len());
}
