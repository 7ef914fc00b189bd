#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] meetcap_storage::Error),
    #[error("meeting details unavailable after {attempts} attempts")]
    MeetingDetailsUnavailable { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
