#![forbid(unsafe_code)]

use crate::error::WireError;

pub const WIRE_VARINT: u32 = 0;
pub const WIRE_I64: u32 = 1;
pub const WIRE_LEN: u32 = 2;
pub const WIRE_I32: u32 = 5;

/// Largest field number protobuf allows in a tag.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Output side of the wire-primitive DSL.
///
/// Codecs speak only this vocabulary: open an object, open a field by
/// number, write one primitive, close the field, close the object. Which
/// calls are made in what order is the whole contract; the framing (tags,
/// varint lengths) is the sink's business.
pub trait WireSink {
    fn start_object(&mut self) -> Result<(), WireError>;
    fn end_object(&mut self) -> Result<(), WireError>;
    fn start_field(&mut self, number: u32) -> Result<(), WireError>;
    fn end_field(&mut self) -> Result<(), WireError>;
    fn write_varint(&mut self, v: u64) -> Result<(), WireError>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError>;

    fn write_i32(&mut self, v: i32) -> Result<(), WireError> {
        // Negative int32 goes out sign-extended to 64 bits, per protobuf.
        self.write_varint(v as i64 as u64)
    }

    fn write_i64(&mut self, v: i64) -> Result<(), WireError> {
        self.write_varint(v as u64)
    }

    fn write_bool(&mut self, v: bool) -> Result<(), WireError> {
        self.write_varint(u64::from(v))
    }

    fn write_str(&mut self, s: &str) -> Result<(), WireError> {
        self.write_bytes(s.as_bytes())
    }
}

/// Input side of the wire-primitive DSL.
///
/// `next_field` yields field numbers until the current object is exhausted;
/// `skip_field` discards the value of the field just announced, whatever its
/// wire type. Unknown field numbers are the *caller's* decision to skip.
pub trait WireSource {
    fn next_field(&mut self) -> Result<Option<u32>, WireError>;
    fn start_object(&mut self) -> Result<(), WireError>;
    fn end_object(&mut self) -> Result<(), WireError>;
    fn skip_field(&mut self) -> Result<(), WireError>;
    fn read_varint(&mut self) -> Result<u64, WireError>;
    fn read_bytes(&mut self) -> Result<Vec<u8>, WireError>;

    fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(self.read_varint()? as i64 as i32)
    }

    fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(self.read_varint()? as i64)
    }

    fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_varint()? != 0)
    }

    fn read_str(&mut self) -> Result<String, WireError> {
        String::from_utf8(self.read_bytes()?).map_err(|_| WireError::InvalidUtf8)
    }
}

fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn put_tag(buf: &mut Vec<u8>, number: u32, wire: u32) {
    put_varint(buf, (u64::from(number) << 3) | u64::from(wire));
}

struct Frame {
    buf: Vec<u8>,
    field: Option<u32>,
}

/// Standard protobuf binary implementation of [`WireSink`].
///
/// Nested objects are buffered so their byte length is known when the
/// enclosing length-delimited field is written. The outermost object is
/// unframed, matching a top-level protobuf message.
pub struct BinarySink {
    frames: Vec<Frame>,
    pending: Option<u32>,
    bare_objects: usize,
}

impl Default for BinarySink {
    fn default() -> Self {
        Self::new()
    }
}

impl BinarySink {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                buf: Vec::new(),
                field: None,
            }],
            pending: None,
            bare_objects: 0,
        }
    }

    pub fn finish(mut self) -> Result<Vec<u8>, WireError> {
        if self.frames.len() != 1 || self.pending.is_some() || self.bare_objects != 0 {
            return Err(WireError::UnbalancedObject);
        }
        Ok(self.frames.pop().map(|f| f.buf).unwrap_or_default())
    }

    fn buf(&mut self) -> Result<&mut Vec<u8>, WireError> {
        self.frames
            .last_mut()
            .map(|f| &mut f.buf)
            .ok_or(WireError::UnbalancedObject)
    }
}

impl WireSink for BinarySink {
    fn start_object(&mut self) -> Result<(), WireError> {
        match self.pending.take() {
            Some(n) => {
                self.frames.push(Frame {
                    buf: Vec::new(),
                    field: Some(n),
                });
            }
            // Top-level object: no enclosing field, no framing.
            None => self.bare_objects += 1,
        }
        Ok(())
    }

    fn end_object(&mut self) -> Result<(), WireError> {
        if let Some(n) = self.pending {
            return Err(WireError::EmptyField(n));
        }
        if self.frames.len() > 1 {
            let frame = self.frames.pop().ok_or(WireError::UnbalancedObject)?;
            let field = frame.field.ok_or(WireError::UnbalancedObject)?;
            let parent = self.buf()?;
            put_tag(parent, field, WIRE_LEN);
            put_varint(parent, frame.buf.len() as u64);
            parent.extend_from_slice(&frame.buf);
            Ok(())
        } else if self.bare_objects > 0 {
            self.bare_objects -= 1;
            Ok(())
        } else {
            Err(WireError::UnbalancedObject)
        }
    }

    fn start_field(&mut self, number: u32) -> Result<(), WireError> {
        if let Some(n) = self.pending {
            return Err(WireError::EmptyField(n));
        }
        self.pending = Some(number);
        Ok(())
    }

    fn end_field(&mut self) -> Result<(), WireError> {
        match self.pending.take() {
            Some(n) => Err(WireError::EmptyField(n)),
            None => Ok(()),
        }
    }

    fn write_varint(&mut self, v: u64) -> Result<(), WireError> {
        let pending = self.pending.take();
        let buf = self.buf()?;
        if let Some(n) = pending {
            put_tag(buf, n, WIRE_VARINT);
        }
        put_varint(buf, v);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let pending = self.pending.take();
        let buf = self.buf()?;
        if let Some(n) = pending {
            put_tag(buf, n, WIRE_LEN);
            put_varint(buf, bytes.len() as u64);
        }
        buf.extend_from_slice(bytes);
        Ok(())
    }
}

/// Standard protobuf binary implementation of [`WireSource`].
pub struct BinarySource<'a> {
    data: &'a [u8],
    pos: usize,
    limits: Vec<usize>,
    last_wire: Option<u32>,
}

impl<'a> BinarySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limits: Vec::new(),
            last_wire: None,
        }
    }

    fn limit(&self) -> Result<usize, WireError> {
        self.limits.last().copied().ok_or(WireError::NotInObject)
    }

    fn raw_varint(&mut self, limit: usize) -> Result<u64, WireError> {
        let mut value: u64 = 0;
        for i in 0..10 {
            if self.pos >= limit {
                return Err(WireError::TruncatedVarint);
            }
            let byte = self.data[self.pos];
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::TruncatedVarint)
    }

    fn advance(&mut self, n: usize) -> Result<(), WireError> {
        let limit = self.limit()?;
        let end = self.pos.checked_add(n).ok_or(WireError::LengthOverrun)?;
        if end > limit {
            return Err(WireError::Truncated);
        }
        self.pos = end;
        Ok(())
    }
}

impl WireSource for BinarySource<'_> {
    fn next_field(&mut self) -> Result<Option<u32>, WireError> {
        let limit = self.limit()?;
        if self.pos >= limit {
            return Ok(None);
        }
        let tag = self.raw_varint(limit)?;
        let number = tag >> 3;
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(WireError::InvalidTag);
        }
        self.last_wire = Some((tag & 0x7) as u32);
        Ok(Some(number as u32))
    }

    fn start_object(&mut self) -> Result<(), WireError> {
        if self.limits.is_empty() {
            // Top-level object: the whole input, unframed.
            self.limits.push(self.data.len());
            return Ok(());
        }
        match self.last_wire {
            Some(WIRE_LEN) => {}
            Some(found) => {
                return Err(WireError::WireTypeMismatch {
                    expected: "length-delimited",
                    found,
                });
            }
            None => return Err(WireError::NotInObject),
        }
        let limit = self.limit()?;
        let len = self.raw_varint(limit)? as usize;
        let end = self.pos.checked_add(len).ok_or(WireError::LengthOverrun)?;
        if end > limit {
            return Err(WireError::LengthOverrun);
        }
        self.limits.push(end);
        Ok(())
    }

    fn end_object(&mut self) -> Result<(), WireError> {
        // Any unread remainder of the object is dropped deliberately.
        let end = self.limits.pop().ok_or(WireError::UnbalancedObject)?;
        self.pos = end;
        Ok(())
    }

    fn skip_field(&mut self) -> Result<(), WireError> {
        let limit = self.limit()?;
        match self.last_wire {
            Some(WIRE_VARINT) => {
                self.raw_varint(limit)?;
                Ok(())
            }
            Some(WIRE_LEN) => {
                let len = self.raw_varint(limit)? as usize;
                self.advance(len)
            }
            Some(WIRE_I64) => self.advance(8),
            Some(WIRE_I32) => self.advance(4),
            Some(w) => Err(WireError::UnsupportedWireType(w)),
            None => Err(WireError::NotInObject),
        }
    }

    fn read_varint(&mut self) -> Result<u64, WireError> {
        match self.last_wire {
            Some(WIRE_VARINT) => {
                let limit = self.limit()?;
                self.raw_varint(limit)
            }
            Some(found) => Err(WireError::WireTypeMismatch {
                expected: "varint",
                found,
            }),
            None => Err(WireError::NotInObject),
        }
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        match self.last_wire {
            Some(WIRE_LEN) => {
                let limit = self.limit()?;
                let len = self.raw_varint(limit)? as usize;
                let end = self.pos.checked_add(len).ok_or(WireError::LengthOverrun)?;
                if end > limit {
                    return Err(WireError::LengthOverrun);
                }
                let out = self.data[self.pos..end].to_vec();
                self.pos = end;
                Ok(out)
            }
            Some(found) => Err(WireError::WireTypeMismatch {
                expected: "length-delimited",
                found,
            }),
            None => Err(WireError::NotInObject),
        }
    }
}
