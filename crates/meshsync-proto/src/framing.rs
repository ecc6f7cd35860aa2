//! Async framing: tag fields, length-prefixed JSON payloads, streamed bodies.
//!
//! Every variable-length payload is preceded by an 8-byte big-endian
//! length. Readers loop until the declared count is accumulated; EOF
//! before completion is a protocol error and must abort the exchange.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtoError, Result};
use crate::token::{
    RequestToken, StatusToken, CHUNK_SIZE, LEN_PREFIX_LEN, MAX_JSON_PAYLOAD, REQUEST_TAG_LEN,
    STATUS_TAG_LEN,
};

/// Send a request tag field.
pub async fn send_request<W: AsyncWrite + Unpin>(w: &mut W, token: RequestToken) -> Result<()> {
    w.write_all(&token.encode()).await?;
    w.flush().await?;
    Ok(())
}

/// Read and decode a request tag field.
pub async fn read_request<R: AsyncRead + Unpin>(r: &mut R) -> Result<RequestToken> {
    let mut field = [0u8; REQUEST_TAG_LEN];
    read_exact_or_truncated(r, &mut field).await?;
    RequestToken::decode(&field)
}

/// Send the `Ok` status tag.
pub async fn send_ok<W: AsyncWrite + Unpin>(w: &mut W) -> Result<()> {
    w.write_all(&StatusToken::Ok.encode()).await?;
    w.flush().await?;
    Ok(())
}

/// Read a status tag field and require it to be `Ok`.
pub async fn expect_ok<R: AsyncRead + Unpin>(r: &mut R) -> Result<()> {
    let mut field = [0u8; STATUS_TAG_LEN];
    read_exact_or_truncated(r, &mut field).await?;
    StatusToken::decode(&field)?;
    Ok(())
}

/// Serialize a value as JSON and send it with a length prefix.
pub async fn send_payload<W, T>(w: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    if body.len() as u64 > MAX_JSON_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge {
            size: body.len() as u64,
            max_size: MAX_JSON_PAYLOAD,
        });
    }
    let mut buf = BytesMut::with_capacity(LEN_PREFIX_LEN + body.len());
    buf.put_u64(body.len() as u64);
    buf.put_slice(&body);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read a length-prefixed JSON payload and decode it.
///
/// A zero length prefix decodes as an empty JSON document and is an
/// error for any concrete shape; list payloads are sent as `[]`, never
/// as zero bytes.
pub async fn read_payload<R, T>(r: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = read_len_prefix(r).await?;
    if len > MAX_JSON_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge {
            size: len,
            max_size: MAX_JSON_PAYLOAD,
        });
    }
    let mut body = vec![0u8; len as usize];
    read_exact_or_truncated(r, &mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Send a bare length prefix.
pub async fn send_len_prefix<W: AsyncWrite + Unpin>(w: &mut W, len: u64) -> Result<()> {
    w.write_all(&len.to_be_bytes()).await?;
    w.flush().await?;
    Ok(())
}

/// Read a bare length prefix.
pub async fn read_len_prefix<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64> {
    let mut field = [0u8; LEN_PREFIX_LEN];
    read_exact_or_truncated(r, &mut field).await?;
    Ok(u64::from_be_bytes(field))
}

/// Copy exactly `len` bytes from `src` to `dst` in [`CHUNK_SIZE`] chunks.
///
/// Used in both directions: file to socket when serving a body, socket to
/// file when receiving one. A zero `len` completes immediately without
/// touching either stream.
pub async fn copy_body<R, W>(src: &mut R, dst: &mut W, len: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = len;
    let mut chunk = [0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let got = src.read(&mut chunk[..want]).await?;
        if got == 0 {
            return Err(ProtoError::Truncated {
                expected: remaining,
            });
        }
        dst.write_all(&chunk[..got]).await?;
        remaining -= got as u64;
    }
    dst.flush().await?;
    Ok(())
}

/// Send a length prefix followed by `len` bytes streamed from `src`.
pub async fn send_body<R, W>(w: &mut W, src: &mut R, len: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_len_prefix(w, len).await?;
    copy_body(src, w, len).await
}

/// Read a length prefix, then stream that many bytes into `dst`.
///
/// Returns the declared length. A prefix of zero means "no payload" and
/// the reader does not block on the stream.
pub async fn recv_body<R, W>(r: &mut R, dst: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let len = read_len_prefix(r).await?;
    copy_body(r, dst, len).await?;
    Ok(len)
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    match r.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtoError::Truncated {
            expected: buf.len() as u64,
        }),
        Err(e) => Err(ProtoError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FileMeta, Peer, PeerAddr, SyncFile};
    use proptest::prelude::*;

    fn peer(host: &str, port: u16, name: &str) -> Peer {
        Peer::new(PeerAddr::new(host, port), name)
    }

    #[tokio::test]
    async fn test_request_tag_over_stream() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_request(&mut a, RequestToken::RequestPeerList)
            .await
            .unwrap();
        let token = read_request(&mut b).await.unwrap();
        assert_eq!(token, RequestToken::RequestPeerList);
    }

    #[tokio::test]
    async fn test_ok_over_stream() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_ok(&mut a).await.unwrap();
        expect_ok(&mut b).await.unwrap();
    }

    #[tokio::test]
    async fn test_payload_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let sent = peer("127.0.0.1", 50001, "A");
        send_payload(&mut a, &sent).await.unwrap();
        let got: Peer = read_payload(&mut b).await.unwrap();
        assert_eq!(got, sent);
    }

    #[tokio::test]
    async fn test_empty_list_payload_accepted() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_payload(&mut a, &Vec::<Peer>::new()).await.unwrap();
        let got: Vec<Peer> = read_payload(&mut b).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        // Declare ten bytes, deliver three, then hang up.
        send_len_prefix(&mut a, 10).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        let err = read_payload::<_, Peer>(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { .. }));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_len_prefix(&mut a, MAX_JSON_PAYLOAD + 1).await.unwrap();
        let err = read_payload::<_, Peer>(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtoError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_len_prefix(&mut a, 4).await.unwrap();
        a.write_all(b"not{").await.unwrap();
        let err = read_payload::<_, Peer>(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtoError::Decode(_)));
    }

    #[tokio::test]
    async fn test_body_streams_across_chunks() {
        let (mut a, mut b) = tokio::io::duplex(256);
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut src = std::io::Cursor::new(body.clone());
        let mut dst = Vec::new();
        let send = async {
            send_body(&mut a, &mut src, body.len() as u64).await.unwrap();
        };
        let recv = async {
            let len = recv_body(&mut b, &mut dst).await.unwrap();
            assert_eq!(len, body.len() as u64);
        };
        tokio::join!(send, recv);
        assert_eq!(dst, body);
    }

    #[tokio::test]
    async fn test_zero_length_body_does_not_block() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let mut src = std::io::Cursor::new(Vec::<u8>::new());
        send_body(&mut a, &mut src, 0).await.unwrap();
        let mut dst = Vec::new();
        let len = recv_body(&mut b, &mut dst).await.unwrap();
        assert_eq!(len, 0);
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_body_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_len_prefix(&mut a, 100).await.unwrap();
        a.write_all(&[7u8; 10]).await.unwrap();
        drop(a);
        let mut dst = Vec::new();
        let err = recv_body(&mut b, &mut dst).await.unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { expected: 90 }));
    }

    proptest! {
        #[test]
        fn prop_peer_round_trip(host in "[a-z0-9.]{1,20}", port in 1024u16..u16::MAX, name in "\\PC{1,16}") {
            let p = peer(&host, port, &name);
            let json = serde_json::to_vec(&p).unwrap();
            let back: Peer = serde_json::from_slice(&json).unwrap();
            prop_assert_eq!(p, back);
        }

        #[test]
        fn prop_file_meta_round_trip(file in "\\PC{1,24}", host in "[a-z0-9.]{1,20}", port in 1024u16..u16::MAX, name in "\\PC{1,16}") {
            let owner = peer(&host, port, &name);
            let f = FileMeta::new(file, &owner);
            let json = serde_json::to_vec(&f).unwrap();
            let back: FileMeta = serde_json::from_slice(&json).unwrap();
            prop_assert_eq!(f, back);
        }

        #[test]
        fn prop_sync_file_round_trip(file in "\\PC{1,24}", subs in proptest::collection::vec(("[a-z0-9.]{1,12}", 1024u16..u16::MAX, "\\PC{1,8}"), 0..5)) {
            let users = subs.into_iter().map(|(h, p, n)| peer(&h, p, &n)).collect();
            let sf = SyncFile::new(file, users);
            let json = serde_json::to_vec(&sf).unwrap();
            let back: SyncFile = serde_json::from_slice(&json).unwrap();
            prop_assert_eq!(sf, back);
        }
    }
}
