//! Data models for records and exported entries.

mod entry;
mod identity;
mod record;

pub use entry::PublicationEntry;
pub use identity::{
    SLUG_TITLE_CHARS, derive_identity, generated_key, normalize_doi, slug_key, slugify,
};
pub(crate) use record::scalar_to_string;
pub use record::{FieldAccess, Issued, Name, Record};
