//! Bulk user import
//!
//! Two stages, both scoped to a single upload:
//! - [`parser`]: bytes + declared format → flat records with lower-cased keys
//! - [`reconciler`]: records → users (pass 1) → parent links (pass 2)

pub mod parser;
pub mod reconciler;

pub use parser::{parse_import_file, FileFormat, ImportRecord, RawRecord};
pub use reconciler::{import_users, ImportSummary};
