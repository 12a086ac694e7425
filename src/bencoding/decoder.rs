use std::collections::BTreeMap;
use std::ops::Range;

use crate::bencoding::value::Value;
use crate::error::{Error, Result};

const MAX_DEPTH: usize = 64;

/// Decodes the next value from `input`, returning it together with the number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(Value, usize)> {
    let mut decoder = Decoder::new(input);
    let value = decoder.decode()?;
    Ok((value, decoder.position()))
}

/// Returns the original encoded bytes of the value stored under `key` in the top-level
/// dictionary of `input`, exactly as they appear on the wire.
pub fn raw_value<'a>(input: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>> {
    let mut decoder = Decoder::new(input);
    decoder.expect(b'd')?;
    while decoder.peek() != Some(b'e') {
        let entry_key = decoder.decode_string()?;
        let span = decoder.skip()?;
        if entry_key == key {
            return Ok(Some(&input[span]));
        }
    }
    Ok(None)
}

impl Value {
    /// Decodes a complete document. Trailing whitespace is tolerated, any other trailing data
    /// is not.
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let (value, consumed) = decode(input)?;
        match input[consumed..]
            .iter()
            .position(|byte| !byte.is_ascii_whitespace())
        {
            Some(offset) => Err(Error::malformed(consumed + offset, "trailing data")),
            None => Ok(value),
        }
    }
}

/// Recursive-descent decoder over a byte slice. Nested productions share one cursor, so no
/// intermediate slices are allocated.
pub struct Decoder<'a> {
    input: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn decode(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'0'..=b'9') => self.decode_string().map(Value::String),
            Some(b'i') => self.decode_integer().map(Value::Integer),
            Some(b'l') => self.nested(Self::decode_list),
            Some(b'd') => self.nested(Self::decode_dictionary),
            Some(byte) => Err(self.error(format!("unexpected byte 0x{byte:02x}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Decodes and discards the next value, returning the byte range it occupied.
    pub fn skip(&mut self) -> Result<Range<usize>> {
        let start = self.position;
        self.decode()?;
        Ok(start..self.position)
    }

    fn nested(&mut self, production: fn(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth == MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = production(self);
        self.depth -= 1;
        value
    }

    fn decode_string(&mut self) -> Result<Vec<u8>> {
        let digits = self.take_until(b':')?;
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(self.error("invalid string length"));
        }
        let length: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error("string length overflow"))?;
        self.position += 1; // ':'

        let remaining = self.input.len() - self.position;
        if length > remaining {
            return Err(self.error(format!(
                "string length {} exceeds remaining {} bytes",
                length, remaining
            )));
        }
        let bytes = self.input[self.position..self.position + length].to_vec();
        self.position += length;
        Ok(bytes)
    }

    fn decode_integer(&mut self) -> Result<i64> {
        self.expect(b'i')?;
        let start = self.position;
        let digits = self.take_until(b'e')?;
        let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
        let valid = !unsigned.is_empty()
            && unsigned.iter().all(u8::is_ascii_digit)
            && (unsigned == b"0" || unsigned[0] != b'0')
            && digits != b"-0";
        if !valid {
            self.position = start;
            return Err(self.error("invalid integer"));
        }
        let integer: Option<i64> = std::str::from_utf8(digits)
            .ok()
            .and_then(|digits| digits.parse().ok());
        match integer {
            Some(integer) => {
                self.position += 1; // 'e'
                Ok(integer)
            }
            None => {
                self.position = start;
                Err(self.error("integer overflow"))
            }
        }
    }

    fn decode_list(&mut self) -> Result<Value> {
        self.expect(b'l')?;
        let mut values = Vec::new();
        while !self.consume_end()? {
            values.push(self.decode()?);
        }
        Ok(Value::List(values))
    }

    fn decode_dictionary(&mut self) -> Result<Value> {
        self.expect(b'd')?;
        let mut entries = BTreeMap::new();
        while !self.consume_end()? {
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.error("dictionary keys must be strings"));
            }
            let key = self.decode_string()?;
            let value = self.decode()?;
            entries.insert(key, value);
        }
        Ok(Value::Dictionary(entries))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        match self.peek() {
            Some(byte) if byte == expected => {
                self.position += 1;
                Ok(())
            }
            Some(byte) => Err(self.error(format!(
                "expected '{}', found 0x{byte:02x}",
                expected as char
            ))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Consumes the collection end marker if it is next. Running out of input before the marker
    /// is an error.
    fn consume_end(&mut self) -> Result<bool> {
        match self.peek() {
            Some(b'e') => {
                self.position += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(self.error("unterminated collection")),
        }
    }

    /// Returns the bytes up to (not including) `delimiter`, leaving the cursor on the delimiter.
    fn take_until(&mut self, delimiter: u8) -> Result<&'a [u8]> {
        let input = self.input;
        let start = self.position;
        match input[start..].iter().position(|&byte| byte == delimiter) {
            Some(length) => {
                self.position += length;
                Ok(&input[start..start + length])
            }
            None => Err(self.error(format!("missing '{}'", delimiter as char))),
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::malformed(self.position, reason)
    }
}
