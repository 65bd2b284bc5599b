//! Framing of admin messages on a byte stream.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use zerocopy::FromBytes;

use super::message::{MAX_MESSAGE_LEN, SIGMSG_HDRLEN, SigMsgHdr};
use crate::error::{Error, Result};

/// Read one message header. `None` on a clean end of stream.
pub(crate) async fn read_header<R>(reader: &mut R) -> Result<Option<SigMsgHdr>>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; SIGMSG_HDRLEN];
    match reader.read_exact(&mut raw).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    SigMsgHdr::read_from_bytes(&raw)
        .map(Some)
        .map_err(|_| Error::Truncated {
            expected: SIGMSG_HDRLEN,
            actual: raw.len(),
        })
}

/// Check the length a header claims for its message.
pub(crate) fn check_len(hdr: &SigMsgHdr) -> Result<usize> {
    let len = hdr.len as usize;
    if !(SIGMSG_HDRLEN..=MAX_MESSAGE_LEN).contains(&len) {
        return Err(Error::InvalidMessage(format!(
            "message length {} outside {}..={}",
            len, SIGMSG_HDRLEN, MAX_MESSAGE_LEN
        )));
    }
    Ok(len)
}

/// Read the rest of the message announced by `hdr`, returning the whole
/// message including its header.
pub(crate) async fn read_body<R>(reader: &mut R, hdr: &SigMsgHdr) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let len = check_len(hdr)?;
    let mut buf = BytesMut::zeroed(len);
    buf[..SIGMSG_HDRLEN].copy_from_slice(hdr.as_bytes());
    reader.read_exact(&mut buf[SIGMSG_HDRLEN..]).await?;
    Ok(buf)
}

/// Read one complete message. `None` on a clean end of stream.
pub(crate) async fn read_message<R>(reader: &mut R) -> Result<Option<BytesMut>>
where
    R: AsyncRead + Unpin,
{
    let Some(hdr) = read_header(reader).await? else {
        return Ok(None);
    };
    read_body(reader, &hdr).await.map(Some)
}
