//! Word-oriented calldata codec.
//!
//! Calls on the wire are a 4-byte Keccak selector followed by 32-byte
//! big-endian argument words, the word-only subset of the standard
//! contract ABI, which is all the surfaces in this system need. Addresses
//! occupy the low 20 bytes of their word. Return payloads are zero or more
//! words.

use alloy::primitives::{keccak256, Address, Bytes, U256};
use bulwark_core::CallError;

/// First four bytes of the Keccak hash of a method signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Builder for call payloads.
#[derive(Debug, Clone)]
pub struct CalldataBuilder {
    buf: Vec<u8>,
}

impl CalldataBuilder {
    /// Start a payload for the given method signature.
    pub fn new(signature: &str) -> Self {
        let mut buf = Vec::with_capacity(4 + 64);
        buf.extend_from_slice(&selector(signature));
        Self { buf }
    }

    /// Append an address argument.
    pub fn address(mut self, value: Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(value.as_slice());
        self.buf.extend_from_slice(&word);
        self
    }

    /// Append an unsigned integer argument.
    pub fn uint(mut self, value: U256) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes::<32>());
        self
    }

    /// Finish the payload.
    pub fn build(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Sequential reader over a call payload.
#[derive(Debug)]
pub struct CalldataReader<'a> {
    selector: [u8; 4],
    words: &'a [u8],
    offset: usize,
}

impl<'a> CalldataReader<'a> {
    /// Validate framing and position the reader after the selector.
    pub fn parse(data: &'a [u8]) -> Result<Self, CallError> {
        if data.len() < 4 || (data.len() - 4) % 32 != 0 {
            return Err(CallError::BadCalldata);
        }
        Ok(Self {
            selector: [data[0], data[1], data[2], data[3]],
            words: &data[4..],
            offset: 0,
        })
    }

    /// The call's selector.
    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    fn word(&mut self) -> Result<&'a [u8], CallError> {
        let start = self.offset;
        let end = start + 32;
        if end > self.words.len() {
            return Err(CallError::BadCalldata);
        }
        self.offset = end;
        Ok(&self.words[start..end])
    }

    /// Read the next argument as an address.
    pub fn address(&mut self) -> Result<Address, CallError> {
        let word = self.word()?;
        Ok(Address::from_slice(&word[12..]))
    }

    /// Read the next argument as an unsigned integer.
    pub fn uint(&mut self) -> Result<U256, CallError> {
        Ok(U256::from_be_slice(self.word()?))
    }
}

/// Encode a single-word return payload.
pub fn encode_uint(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

/// Encode a boolean return payload.
pub fn encode_bool(value: bool) -> Bytes {
    encode_uint(U256::from(value as u8))
}

/// Encode a sequence of words.
pub fn encode_words(values: &[U256]) -> Bytes {
    let mut buf = Vec::with_capacity(values.len() * 32);
    for value in values {
        buf.extend_from_slice(&value.to_be_bytes::<32>());
    }
    Bytes::from(buf)
}

/// Decode the first word of a return payload as an unsigned integer.
pub fn decode_uint(data: &[u8]) -> Result<U256, CallError> {
    if data.len() < 32 {
        return Err(CallError::BadCalldata);
    }
    Ok(U256::from_be_slice(&data[..32]))
}

/// Decode the first word of a return payload as a boolean.
pub fn decode_bool(data: &[u8]) -> Result<bool, CallError> {
    Ok(!decode_uint(data)?.is_zero())
}
