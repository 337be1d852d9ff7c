//! Common serde extensions and custom types.

use std::ops::{Deref, DerefMut};
use std::fmt::{self, Write};

use chrono::{DateTime, FixedOffset};


/// A SHA-1 hash serialized as a 40 characters lower case hex string.
pub type Sha1HashString = HexString<20>;

/// A hexadecimal, lower case, formatted bytes string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexString<const N: usize>(pub [u8; N]);

impl<const N: usize> Deref for HexString<N> {
    type Target = [u8; N];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for HexString<N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const N: usize> fmt::Display for HexString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for HexString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<const N: usize> serde::Serialize for HexString<N> {

    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer
    {
        let mut buf = String::with_capacity(N * 2);
        for b in self.0 {
            // Writing to a string never fails.
            let _ = write!(buf, "{b:02x}");
        }
        serializer.serialize_str(&buf)
    }

}

impl<'de, const N: usize> serde::Deserialize<'de> for HexString<N> {

    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {

        struct Visitor<const N: usize>;
        impl<'de, const N: usize> serde::de::Visitor<'de> for Visitor<N> {

            type Value = HexString<N>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a bytes string ({} hex characters)", N * 2)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                parse_hex_bytes::<N>(v)
                    .map(HexString)
                    .ok_or_else(|| E::custom(format_args!("invalid bytes string ({} hex characters)", N * 2)))
            }

        }

        deserializer.deserialize_str(Visitor)

    }

}

/// Parse the given hex bytes string into the given destination slice, returning none if
/// the input string cannot be parsed, is too short or too long.
pub fn parse_hex_bytes<const LEN: usize>(mut string: &str) -> Option<[u8; LEN]> {

    let mut dst = [0; LEN];
    for dst in &mut dst {
        if string.is_char_boundary(2) {

            let (num, rem) = string.split_at(2);
            string = rem;

            *dst = u8::from_str_radix(num, 16).ok()?;

        } else {
            return None;
        }
    }

    // Only successful if no string remains.
    string.is_empty().then_some(dst)

}

/// RFC 3339 date time parsing that tolerates a missing timezone, some third-party
/// version descriptors have been observed with times like "2024-12-09T23:22:49.408008176".
pub fn deserialize_date_time_chill<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: serde::Deserializer<'de>,
{

    use chrono::format::ParseErrorKind;

    struct Visitor;
    impl serde::de::Visitor<'_> for Visitor {

        type Value = DateTime<FixedOffset>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an RFC 3339 formatted date and time string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match DateTime::parse_from_rfc3339(v) {
                Ok(date) => Ok(date),
                Err(e) if e.kind() == ParseErrorKind::TooShort => {
                    let mut buf = v.to_string();
                    buf.push('Z');
                    DateTime::parse_from_rfc3339(&buf).map_err(E::custom)
                }
                Err(e) => Err(E::custom(e)),
            }
        }

    }

    deserializer.deserialize_str(Visitor)

}
