//!  Storage is organized through [record_storage::RecordStorageImpl].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Records are stored in record files, one per UTC day of the session start.
//!   - Each line of a record file is a json encoded [SessionRecord](crate::tracker::record::SessionRecord).

pub mod record_storage;
