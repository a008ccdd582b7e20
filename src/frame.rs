// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::{self, Cursor};

use bytes::Buf;
use bytes::Bytes;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

// Arrays nest only one level deep for commands and a few levels for replies.
const MAX_DEPTH: usize = 32;

// Upper bound for the capacity reserved from an (untrusted) array header.
const MAX_PREALLOCATED: usize = 1024;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("invalid length: {0:?}")]
    InvalidLength(String),
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),
    #[error("bulk string payload is not terminated by CRLF")]
    MissingTerminator,
    #[error("invalid frame format; expected UTF-8")]
    InvalidUtf8,
    #[error("frame nesting is too deep")]
    TooDeep,
    #[error("frame size exceeds limit of {0} bytes")]
    TooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// The null bulk string, `$-1\r\n`.
    Null,
    /// The null array, `*-1\r\n`.
    NullArray,
    Array(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::TooDeep);
        }

        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => Ok(Frame::Simple(get_line_string(src)?)),
            DataType::SimpleError => Ok(Frame::Error(get_line_string(src)?)),
            DataType::Integer => {
                let line = get_line_string(src)?;
                line.parse::<i64>()
                    .map(Frame::Integer)
                    .map_err(|_| Error::InvalidInteger(line))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => match get_length(src)? {
                None => Ok(Frame::Null),
                Some(length) => {
                    let data = get_exact(src, length)?;
                    Ok(Frame::Bulk(Bytes::copy_from_slice(data)))
                }
            },
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => match get_length(src)? {
                None => Ok(Frame::NullArray),
                Some(length) => {
                    let mut frames = Vec::with_capacity(length.min(MAX_PREALLOCATED));
                    for _ in 0..length {
                        frames.push(Self::parse_nested(src, depth + 1)?);
                    }
                    Ok(Frame::Array(frames))
                }
            },
        }
    }

    /// Builds an array of bulk strings, the shape of every client command.
    pub fn bulk_array<I, T>(items: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Frame::Array(items.into_iter().map(|item| Frame::Bulk(item.into())).collect())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        bytes
    }

    fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Integer(i) => {
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(i.to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                bytes.push(u8::from(DataType::BulkString));
                bytes.extend_from_slice(data.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
            }
            Frame::Null => {
                bytes.push(u8::from(DataType::BulkString));
                bytes.extend_from_slice(b"-1");
                bytes.extend_from_slice(CRLF);
            }
            Frame::NullArray => {
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(b"-1");
                bytes.extend_from_slice(CRLF);
            }
            Frame::Array(arr) => {
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(arr.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                // Nested replies (e.g. the results of EXEC) are written as they are.
                for frame in arr {
                    frame.write_to(bytes);
                }
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::NullArray => write!(f, "*-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Returns the bytes up to the next CRLF and moves the cursor past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let line_end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((line_end + CRLF.len()) as u64);

    Ok(&buf[start..line_end])
}

fn get_line_string(src: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let line = get_line(src)?;
    String::from_utf8(line.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Parses a length header. `-1` is the null marker and yields `None`.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
    let line = get_line_string(src)?;
    let length = line
        .parse::<i64>()
        .map_err(|_| Error::InvalidLength(line.clone()))?;

    match length {
        -1 => Ok(None),
        length if length < 0 => Err(Error::InvalidLength(line)),
        length => usize::try_from(length)
            .map(Some)
            .map_err(|_| Error::InvalidLength(line)),
    }
}

/// Takes exactly `length` bytes followed by CRLF.
fn get_exact<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = start.checked_add(length).ok_or(Error::TooLarge(length))?;
    if buf.len() < end + CRLF.len() {
        return Err(Error::Incomplete);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(Error::MissingTerminator);
    }

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    BulkString,   // '$'
    SimpleError,  // '-'
    Integer,      // ':'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
