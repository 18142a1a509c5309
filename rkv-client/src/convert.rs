//! # Reply Conversion
//!
//! Purpose: Turn untyped [`Reply`] values into typed results.
//!
//! Every converter takes the `RkvResult<Reply>` returned by
//! [`Conn::exec`](crate::Conn::exec), so calls compose directly:
//!
//! ```ignore
//! let n = convert::int64(conn.exec("INCR", &[Arg::from("hits")]))?;
//! ```
//!
//! ## Null Handling
//!
//! A top-level nil reply is always [`RkvError::Nil`], including for arrays,
//! so "no result" never looks like an empty result. Inside a homogeneous
//! array a nil element becomes the target type's zero value and keeps its
//! position. Error replies surface as [`RkvError::Server`].

use std::collections::HashMap;
use std::str::FromStr;

use rkv_common::{Reply, RkvError, RkvResult};

/// Converts an integer reply (or decimal text) to `isize`.
pub fn int(reply: RkvResult<Reply>) -> RkvResult<isize> {
    int_value(reply?)
}

/// Converts an integer reply (or decimal text) to `i64`.
pub fn int64(reply: RkvResult<Reply>) -> RkvResult<i64> {
    int64_value(reply?)
}

/// Converts an integer reply (or decimal text) to `u64`.
///
/// Negative values fail with [`RkvError::NegativeInt`] rather than wrapping.
pub fn uint64(reply: RkvResult<Reply>) -> RkvResult<u64> {
    match reply? {
        Reply::Integer(value) => u64::try_from(value).map_err(|_| RkvError::NegativeInt(value)),
        Reply::Bytes(data) => parse_text(&data, "unsigned integer").map_err(|err| {
            match parse_text::<i64>(&data, "integer") {
                Ok(value) if value < 0 => RkvError::NegativeInt(value),
                _ => err,
            }
        }),
        other => Err(unexpected(other, "unsigned integer")),
    }
}

/// Converts a bulk string holding a decimal literal to `f64`.
pub fn float64(reply: RkvResult<Reply>) -> RkvResult<f64> {
    float64_value(reply?)
}

/// Converts a bulk string or status reply to UTF-8 text.
pub fn string(reply: RkvResult<Reply>) -> RkvResult<String> {
    string_value(reply?)
}

/// Converts a bulk string or status reply to raw bytes.
pub fn bytes(reply: RkvResult<Reply>) -> RkvResult<Vec<u8>> {
    bytes_value(reply?)
}

/// Converts an integer (non-zero is true) or boolean text to `bool`.
pub fn boolean(reply: RkvResult<Reply>) -> RkvResult<bool> {
    match reply? {
        Reply::Integer(value) => Ok(value != 0),
        Reply::Bytes(data) => parse_bool(&data),
        other => Err(unexpected(other, "boolean")),
    }
}

/// Returns the elements of an array reply without further typing.
pub fn values(reply: RkvResult<Reply>) -> RkvResult<Vec<Reply>> {
    match reply? {
        Reply::Array(items) => Ok(items),
        other => Err(unexpected(other, "array")),
    }
}

/// Converts an array reply to `isize` values; nil elements become 0.
pub fn ints(reply: RkvResult<Reply>) -> RkvResult<Vec<isize>> {
    slice_helper(reply, int_value)
}

/// Converts an array reply to `i64` values; nil elements become 0.
pub fn int64s(reply: RkvResult<Reply>) -> RkvResult<Vec<i64>> {
    slice_helper(reply, int64_value)
}

/// Converts an array reply to `f64` values; nil elements become 0.0.
pub fn float64s(reply: RkvResult<Reply>) -> RkvResult<Vec<f64>> {
    slice_helper(reply, float64_value)
}

/// Converts an array reply to strings; nil elements become "".
pub fn strings(reply: RkvResult<Reply>) -> RkvResult<Vec<String>> {
    slice_helper(reply, string_value)
}

/// Converts an array reply to byte buffers; nil elements become empty.
pub fn byte_slices(reply: RkvResult<Reply>) -> RkvResult<Vec<Vec<u8>>> {
    slice_helper(reply, bytes_value)
}

/// Converts an array of coordinate pairs, as returned by GEOPOS.
///
/// Nil members stay `None` in place; every other member must be a
/// two-element array of float text.
pub fn positions(reply: RkvResult<Reply>) -> RkvResult<Vec<Option<[f64; 2]>>> {
    values(reply)?
        .into_iter()
        .map(|item| match item {
            Reply::Nil => Ok(None),
            Reply::Array(pair) if pair.len() == 2 => {
                let mut coords = [0.0; 2];
                for (slot, coord) in coords.iter_mut().zip(pair) {
                    *slot = float64_value(required(coord, "coordinate")?)?;
                }
                Ok(Some(coords))
            }
            Reply::Array(_) => Err(RkvError::TypeMismatch {
                expected: "coordinate pair",
                found: "array of wrong length",
            }),
            other => Err(unexpected(other, "coordinate pair")),
        })
        .collect()
}

/// Converts a flat `[key, value, ...]` array to a string map.
pub fn string_map(reply: RkvResult<Reply>) -> RkvResult<HashMap<String, String>> {
    map_helper(reply, string_value)
}

/// Converts a flat `[key, value, ...]` array to a map of `isize` values.
pub fn int_map(reply: RkvResult<Reply>) -> RkvResult<HashMap<String, isize>> {
    map_helper(reply, int_value)
}

/// Converts a flat `[key, value, ...]` array to a map of `i64` values.
pub fn int64_map(reply: RkvResult<Reply>) -> RkvResult<HashMap<String, i64>> {
    map_helper(reply, int64_value)
}

fn int_value(reply: Reply) -> RkvResult<isize> {
    let value = int64_value(reply)?;
    isize::try_from(value).map_err(|_| RkvError::TypeMismatch {
        expected: "isize",
        found: "out-of-range integer",
    })
}

fn int64_value(reply: Reply) -> RkvResult<i64> {
    match reply {
        Reply::Integer(value) => Ok(value),
        Reply::Bytes(data) => parse_text(&data, "integer"),
        other => Err(unexpected(other, "integer")),
    }
}

fn float64_value(reply: Reply) -> RkvResult<f64> {
    match reply {
        Reply::Bytes(data) => parse_text(&data, "float"),
        other => Err(unexpected(other, "float")),
    }
}

fn string_value(reply: Reply) -> RkvResult<String> {
    match reply {
        Reply::Bytes(data) => String::from_utf8(data).map_err(|err| RkvError::Parse {
            expected: "utf-8 string",
            text: String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }),
        Reply::Status(text) => Ok(text),
        other => Err(unexpected(other, "string")),
    }
}

fn bytes_value(reply: Reply) -> RkvResult<Vec<u8>> {
    match reply {
        Reply::Bytes(data) => Ok(data),
        Reply::Status(text) => Ok(text.into_bytes()),
        other => Err(unexpected(other, "bytes")),
    }
}

fn slice_helper<T, F>(reply: RkvResult<Reply>, mut convert: F) -> RkvResult<Vec<T>>
where
    T: Default,
    F: FnMut(Reply) -> RkvResult<T>,
{
    values(reply)?
        .into_iter()
        .map(|item| match item {
            Reply::Nil => Ok(T::default()),
            item => convert(item),
        })
        .collect()
}

fn map_helper<T, F>(reply: RkvResult<Reply>, mut convert: F) -> RkvResult<HashMap<String, T>>
where
    F: FnMut(Reply) -> RkvResult<T>,
{
    let items = values(reply)?;
    if items.len() % 2 != 0 {
        return Err(RkvError::TypeMismatch {
            expected: "key/value pairs",
            found: "odd-length array",
        });
    }

    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key = string_value(required(key, "map key")?)?;
        let value = convert(required(value, "map value")?)?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Nil is only a valid element where a zero value can stand in for it.
fn required(reply: Reply, expected: &'static str) -> RkvResult<Reply> {
    match reply {
        Reply::Nil => Err(RkvError::TypeMismatch {
            expected,
            found: "nil",
        }),
        reply => Ok(reply),
    }
}

fn unexpected(reply: Reply, expected: &'static str) -> RkvError {
    match reply {
        Reply::Nil => RkvError::Nil,
        Reply::Error(message) => RkvError::Server(message),
        other => RkvError::TypeMismatch {
            expected,
            found: other.kind(),
        },
    }
}

fn parse_text<T: FromStr>(data: &[u8], expected: &'static str) -> RkvResult<T> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| RkvError::Parse {
            expected,
            text: String::from_utf8_lossy(data).into_owned(),
        })
}

fn parse_bool(data: &[u8]) -> RkvResult<bool> {
    match data.to_ascii_lowercase().as_slice() {
        b"1" | b"t" | b"true" => Ok(true),
        b"0" | b"f" | b"false" => Ok(false),
        _ => Err(RkvError::Parse {
            expected: "boolean",
            text: String::from_utf8_lossy(data).into_owned(),
        }),
    }
}
