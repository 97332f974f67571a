use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    #[error("end_track_frame called without an open track frame")]
    NoOpenTrackFrame,

    #[error("a tag cannot be its own subtag")]
    TagCycle,

    #[error("reference {label} cannot be updated")]
    ReadOnlyReference { label: String },
}
