//! Chat export reconstruction and context assembly.
//!
//! Bytes go through [`ingest`] (decode, [`reconstruct`], [`timestamp`]) to a
//! list of [`message::Message`]s, which the [`chunker`] splits into
//! budget-bounded chunks and the [`context`] formatter renders as a
//! date-grouped transcript. Live bridge feeds enter through [`feed`].

pub mod chunker;
pub mod context;
pub mod feed;
pub mod ingest;
pub mod message;
pub mod patterns;
pub mod reconstruct;
pub mod timestamp;
