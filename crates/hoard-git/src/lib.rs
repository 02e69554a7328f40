//! Git smart HTTP protocol for Hoard.
//!
//! This crate implements the pkt-line framing, the pack file format, and the
//! three protocol endpoints (ref advertisement, upload-pack, receive-pack).
//! Object and ref access goes through [`GitObjectEngine`]; the bundled
//! [`FsObjectEngine`] keeps a bare repository on any
//! [`hoard_storage::FileSystem`].

mod advertise;
mod engine;
mod error;
mod object;
mod pack;
mod pktline;
mod receive_pack;
mod upload_pack;

pub use advertise::{
    advertise_refs, capabilities, info_refs, service_header, ProtocolSettings, Service,
};
pub use engine::{FsObjectEngine, GitObjectEngine, MAX_SYMREF_DEPTH};
pub use error::{GitError, Result};
pub use object::{
    is_hex_oid, parse_tree, GitObject, ObjectId, ObjectType, TreeEntry, MODE_FILE, MODE_GITLINK,
    MODE_TREE,
};
pub use pack::{
    apply_delta, parse_pack, resolve_entries, PackBuilder, PackEntry, PackEntryKind, PackParser,
};
pub use pktline::{
    decode_lines, encode as encode_pkt_line, PktLine, PktLineReader, PktLineWriter, FLUSH_PKT,
    MAX_PKT_LEN, MAX_PKT_PAYLOAD,
};
pub use receive_pack::{
    find_pack_signature, pack_path, parse_commands, receive_pack, validate_ref_name, Command,
    ReceiveReport, RefStatus, UnpackStatus,
};
pub use upload_pack::{collect_reachable, upload_pack, WantHave};
