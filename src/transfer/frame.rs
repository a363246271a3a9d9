//! Wire framing for the streaming operations.
//!
//! Every streamed body is a sequence of length-delimited frames sharing one
//! shape: an optional JSON metadata blob plus a raw data payload. An upload
//! starts with a metadata-only header frame, continues with data-only
//! frames, and may end with a metadata trailer announcing the client-side
//! md5. A download starts with a metadata frame (`name`, `size`) followed
//! by data frames.
//!
//! Layout: `[u32 meta_len][u32 data_len][meta bytes][data bytes]`, both
//! lengths big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on the metadata blob of a single frame.
pub const META_MAX: usize = 64 * 1024;

/// Upper bound on the data payload of a single frame.
pub const DATA_MAX: usize = 8 * 1024 * 1024;

const FRAME_HEAD: usize = 8;

/// One message on a transfer stream.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub meta: Option<Bytes>,
    pub data: Bytes,
}

impl Frame {
    /// A metadata-only frame.
    pub fn with_meta<T: Serialize>(value: &T) -> io::Result<Self> {
        let meta = serde_json::to_vec(value).map_err(io::Error::other)?;
        Ok(Self {
            meta: Some(meta.into()),
            data: Bytes::new(),
        })
    }

    /// A data-only frame.
    pub fn data(data: Bytes) -> Self {
        Self { meta: None, data }
    }

    /// Decode the metadata blob into a typed header.
    pub fn decode_meta<T: DeserializeOwned>(&self) -> io::Result<T> {
        let meta = self
            .meta
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame carries no metadata"))?;
        serde_json::from_slice(meta)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// First frame of an upload stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadHeader {
    #[serde(default)]
    pub space_id: String,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub resource_type: i32,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_by: String,
}

/// First frame of a re-upload stream; name and type come from the existing
/// catalog row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReUploadHeader {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub space_id: String,
    #[serde(default)]
    pub size: i64,
}

/// First frame of a download stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadMeta {
    pub name: String,
    pub size: i64,
}

/// Optional final frame of an upload stream; verified against the backend
/// digest when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestTrailer {
    pub md5: String,
}

#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if src.len() < FRAME_HEAD {
            return Ok(None);
        }
        let mut head = &src[..FRAME_HEAD];
        let meta_len = head.get_u32() as usize;
        let data_len = head.get_u32() as usize;
        if meta_len > META_MAX || data_len > DATA_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds size limits",
            ));
        }

        let total = FRAME_HEAD + meta_len + data_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEAD);
        let meta = if meta_len > 0 {
            Some(src.split_to(meta_len).freeze())
        } else {
            None
        };
        let data = src.split_to(data_len).freeze();
        Ok(Some(Frame { meta, data }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
        let meta_len = frame.meta.as_ref().map_or(0, Bytes::len);
        if meta_len > META_MAX || frame.data.len() > DATA_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds size limits",
            ));
        }
        dst.reserve(FRAME_HEAD + meta_len + frame.data.len());
        dst.put_u32(meta_len as u32);
        dst.put_u32(frame.data.len() as u32);
        if let Some(meta) = frame.meta {
            dst.put(meta);
        }
        dst.put(frame.data);
        Ok(())
    }
}

/// Encode one frame into its wire bytes.
pub fn encode_frame(frame: Frame) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    FrameCodec.encode(frame, &mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_data_frames_round_trip() {
        let header = UploadHeader {
            space_id: "wks-A".into(),
            resource_name: "a.jar".into(),
            resource_type: 1,
            size: 12,
            ..Default::default()
        };

        let mut buf = BytesMut::new();
        let mut codec = FrameCodec;
        codec
            .encode(Frame::with_meta(&header).unwrap(), &mut buf)
            .unwrap();
        codec
            .encode(Frame::data(Bytes::from_static(b"Hello, world")), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let decoded: UploadHeader = first.decode_meta().unwrap();
        assert!(first.data.is_empty());
        assert_eq!(decoded.resource_name, "a.jar");
        assert_eq!(decoded.size, 12);

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(second.meta.is_none());
        assert_eq!(&second.data[..], b"Hello, world");

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_waits_for_a_complete_frame() {
        let wire = encode_frame(Frame::data(Bytes::from_static(b"0123456789"))).unwrap();
        let mut codec = FrameCodec;

        let mut buf = BytesMut::from(&wire[..wire.len() - 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[wire.len() - 3..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.data[..], b"0123456789");
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32((META_MAX + 1) as u32);
        buf.put_u32(0);
        assert!(FrameCodec.decode(&mut buf).is_err());
    }
}
