//! Wire (de)serialization primitives shared by every DNS structure.
//!
//! `ToFromNetworkOrder` is the seam the `DnsStruct` derive macro hooks into:
//! a struct deriving it simply chains `to_network_bytes`/`from_network_bytes`
//! across its fields in declaration order. Anything whose layout depends on
//! another field (record data keyed by `resource_type`, a message's
//! header-counted sections) implements the trait by hand instead.
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Result};

use crate::error::DnsResult;

pub trait ToFromNetworkOrder: std::fmt::Debug {
    /// Append `self` to `buffer` in network byte order, returning the
    /// number of octets written.
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize>;

    /// Read `self` from `buffer`, advancing its cursor.
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()>;
}

impl ToFromNetworkOrder for u8 {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u8(*self)?;
        Ok(1)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        *self = buffer.read_u8()?;
        Ok(())
    }
}

impl ToFromNetworkOrder for u16 {
    /// ```
    /// use dnssd::wire::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(0x1234_u16.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0x12, 0x34]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u16::<BigEndian>(*self)?;
        Ok(2)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        *self = buffer.read_u16::<BigEndian>()?;
        Ok(())
    }
}

impl ToFromNetworkOrder for u32 {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u32::<BigEndian>(*self)?;
        Ok(4)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        *self = buffer.read_u32::<BigEndian>()?;
        Ok(())
    }
}

impl<const N: usize> ToFromNetworkOrder for [u8; N] {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.extend_from_slice(self);
        Ok(N)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        buffer.read_exact(self.as_mut_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_roundtrip() {
        let mut buf = Vec::new();
        255_u8.to_network_bytes(&mut buf).unwrap();
        assert_eq!(buf, &[0xFF]);

        let mut cursor = Cursor::new(buf.as_slice());
        let mut v = 0u8;
        v.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(v, 255);
    }

    #[test]
    fn u32_roundtrip() {
        let mut buf = Vec::new();
        0x12345678_u32.to_network_bytes(&mut buf).unwrap();
        assert_eq!(buf, &[0x12, 0x34, 0x56, 0x78]);

        let mut cursor = Cursor::new(buf.as_slice());
        let mut v = 0u32;
        v.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(v, 0x12345678);
    }

    #[test]
    fn fixed_array_roundtrip() {
        let mut buf = Vec::new();
        [1u8, 2, 3, 4].to_network_bytes(&mut buf).unwrap();
        assert_eq!(buf, &[1, 2, 3, 4]);

        let mut cursor = Cursor::new(buf.as_slice());
        let mut v = [0u8; 4];
        v.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(v, [1, 2, 3, 4]);
    }
}
