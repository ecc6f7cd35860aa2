//! Request and status tokens with their fixed-width wire encoding.
//!
//! Every exchange starts with a request tag: the token's name as ASCII,
//! right-padded with NUL bytes to [`REQUEST_TAG_LEN`]. Responses carry a
//! status tag padded to [`STATUS_TAG_LEN`]; the only defined status is
//! `Ok`. Both widths are protocol constants that all peers must share.

use crate::error::{ProtoError, Result};

/// Width of the request tag field in bytes.
pub const REQUEST_TAG_LEN: usize = 20;

/// Width of the status tag field in bytes.
pub const STATUS_TAG_LEN: usize = 2;

/// Width of the big-endian length prefix preceding every variable payload.
pub const LEN_PREFIX_LEN: usize = 8;

/// Chunk size for streamed file bodies.
pub const CHUNK_SIZE: usize = 4096;

/// Maximum accepted length for a structured (JSON) payload.
///
/// File bodies are streamed and not subject to this bound.
pub const MAX_JSON_PAYLOAD: u64 = 16 * 1024 * 1024;

/// The closed set of requests a peer can initiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestToken {
    /// Register the sender into the recipient's roster.
    AddMe,
    /// Inform the recipient that a third party joined.
    UserJoined,
    /// Ask for the recipient's full roster plus its self-peer.
    RequestPeerList,
    /// Push a file catalog to the recipient.
    SendFiles,
    /// Ask for the recipient's file catalog.
    RequestFiles,
    /// Push sync-file descriptors to the recipient.
    SendSyncFiles,
    /// Ask for the recipient's sync-file descriptors.
    RequestSyncFiles,
    /// Request a streamed blob by file descriptor.
    DownloadFile,
    /// Subscribe to a sync file and fetch its content.
    SubscribeFile,
    /// Notify an existing subscriber of a new subscriber.
    UserSubscribed,
    /// Push updated content of a sync file.
    SyncFileUpdate,
}

impl RequestToken {
    /// The token's name as it appears on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            RequestToken::AddMe => "AddMe",
            RequestToken::UserJoined => "UserJoined",
            RequestToken::RequestPeerList => "RequestPeerList",
            RequestToken::SendFiles => "SendFiles",
            RequestToken::RequestFiles => "RequestFiles",
            RequestToken::SendSyncFiles => "SendSyncFiles",
            RequestToken::RequestSyncFiles => "RequestSyncFiles",
            RequestToken::DownloadFile => "DownloadFile",
            RequestToken::SubscribeFile => "SubscribeFile",
            RequestToken::UserSubscribed => "UserSubscribed",
            RequestToken::SyncFileUpdate => "SyncFileUpdate",
        }
    }

    /// Parse a NUL-stripped tag string into a token.
    pub fn from_wire_name(name: &str) -> Option<RequestToken> {
        match name {
            "AddMe" => Some(RequestToken::AddMe),
            "UserJoined" => Some(RequestToken::UserJoined),
            "RequestPeerList" => Some(RequestToken::RequestPeerList),
            "SendFiles" => Some(RequestToken::SendFiles),
            "RequestFiles" => Some(RequestToken::RequestFiles),
            "SendSyncFiles" => Some(RequestToken::SendSyncFiles),
            "RequestSyncFiles" => Some(RequestToken::RequestSyncFiles),
            "DownloadFile" => Some(RequestToken::DownloadFile),
            "SubscribeFile" => Some(RequestToken::SubscribeFile),
            "UserSubscribed" => Some(RequestToken::UserSubscribed),
            "SyncFileUpdate" => Some(RequestToken::SyncFileUpdate),
            _ => None,
        }
    }

    /// Encode the token as a fixed-width NUL-padded tag field.
    pub fn encode(&self) -> [u8; REQUEST_TAG_LEN] {
        pad_tag::<REQUEST_TAG_LEN>(self.wire_name())
    }

    /// Decode a full-width tag field into a token.
    ///
    /// The field must be exactly [`REQUEST_TAG_LEN`] bytes: an ASCII name
    /// followed only by NUL padding. Anything else is a protocol error.
    pub fn decode(field: &[u8]) -> Result<RequestToken> {
        let name = strip_tag(field, REQUEST_TAG_LEN)?;
        RequestToken::from_wire_name(&name).ok_or(ProtoError::UnknownTag { tag: name })
    }
}

/// The closed set of response statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusToken {
    /// The request was accepted; the exchange continues.
    Ok,
}

impl StatusToken {
    /// The status name as it appears on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            StatusToken::Ok => "Ok",
        }
    }

    /// Encode the status as a fixed-width NUL-padded tag field.
    pub fn encode(&self) -> [u8; STATUS_TAG_LEN] {
        pad_tag::<STATUS_TAG_LEN>(self.wire_name())
    }

    /// Decode a full-width status field.
    pub fn decode(field: &[u8]) -> Result<StatusToken> {
        let name = strip_tag(field, STATUS_TAG_LEN)?;
        match name.as_str() {
            "Ok" => Ok(StatusToken::Ok),
            _ => Err(ProtoError::UnexpectedStatus { status: name }),
        }
    }
}

fn pad_tag<const N: usize>(name: &str) -> [u8; N] {
    let mut field = [0u8; N];
    field[..name.len()].copy_from_slice(name.as_bytes());
    field
}

fn strip_tag(field: &[u8], width: usize) -> Result<String> {
    if field.len() != width {
        return Err(ProtoError::MalformedTag {
            reason: format!("tag field is {} bytes, expected {}", field.len(), width),
        });
    }
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    if end == 0 {
        return Err(ProtoError::MalformedTag {
            reason: "empty tag".to_string(),
        });
    }
    // Padding must be NUL all the way to the end of the field.
    if field[end..].iter().any(|&b| b != 0) {
        return Err(ProtoError::MalformedTag {
            reason: "non-NUL byte inside padding".to_string(),
        });
    }
    let name = std::str::from_utf8(&field[..end]).map_err(|_| ProtoError::MalformedTag {
        reason: "tag is not valid UTF-8".to_string(),
    })?;
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TOKENS: [RequestToken; 11] = [
        RequestToken::AddMe,
        RequestToken::UserJoined,
        RequestToken::RequestPeerList,
        RequestToken::SendFiles,
        RequestToken::RequestFiles,
        RequestToken::SendSyncFiles,
        RequestToken::RequestSyncFiles,
        RequestToken::DownloadFile,
        RequestToken::SubscribeFile,
        RequestToken::UserSubscribed,
        RequestToken::SyncFileUpdate,
    ];

    #[test]
    fn test_request_tag_round_trip() {
        for token in ALL_TOKENS {
            let field = token.encode();
            assert_eq!(field.len(), REQUEST_TAG_LEN);
            assert_eq!(RequestToken::decode(&field).unwrap(), token);
        }
    }

    #[test]
    fn test_tag_is_nul_padded() {
        let field = RequestToken::AddMe.encode();
        assert_eq!(&field[..5], b"AddMe");
        assert!(field[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_longest_token_fits_width() {
        for token in ALL_TOKENS {
            assert!(token.wire_name().len() <= REQUEST_TAG_LEN);
        }
    }

    #[test]
    fn test_unknown_token_rejected() {
        let mut field = [0u8; REQUEST_TAG_LEN];
        field[..7].copy_from_slice(b"GetLost");
        assert!(matches!(
            RequestToken::decode(&field),
            Err(ProtoError::UnknownTag { .. })
        ));
    }

    #[test]
    fn test_short_field_rejected() {
        let field = [b'A'; 4];
        assert!(matches!(
            RequestToken::decode(&field),
            Err(ProtoError::MalformedTag { .. })
        ));
    }

    #[test]
    fn test_all_nul_field_rejected() {
        let field = [0u8; REQUEST_TAG_LEN];
        assert!(matches!(
            RequestToken::decode(&field),
            Err(ProtoError::MalformedTag { .. })
        ));
    }

    #[test]
    fn test_garbage_in_padding_rejected() {
        let mut field = RequestToken::AddMe.encode();
        field[REQUEST_TAG_LEN - 1] = b'x';
        assert!(matches!(
            RequestToken::decode(&field),
            Err(ProtoError::MalformedTag { .. })
        ));
    }

    #[test]
    fn test_status_ok_round_trip() {
        let field = StatusToken::Ok.encode();
        assert_eq!(&field, b"Ok");
        assert_eq!(StatusToken::decode(&field).unwrap(), StatusToken::Ok);
    }

    #[test]
    fn test_unexpected_status_rejected() {
        assert!(matches!(
            StatusToken::decode(b"No"),
            Err(ProtoError::UnexpectedStatus { .. })
        ));
    }
}
