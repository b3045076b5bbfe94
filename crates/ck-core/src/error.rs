use thiserror::Error;

/// Failures raised while constructing an [`crate::item::Item`] from captured data.
///
/// These are local rejections: the capture that produced them is dropped and
/// the daemon carries on.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("captured content is not valid UTF-8")]
    InvalidEncoding,

    #[error("captured content is empty")]
    EmptyValue,
}
