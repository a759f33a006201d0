pub mod enums;
pub mod record;

pub use enums::{LookupMode, QueryErrorKind, RecordType};
pub use record::{AnswerRecord, NameServer};
