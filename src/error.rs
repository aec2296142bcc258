use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The input could not be interpreted as pixel data.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    /// The rotated image could not be written back out.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    #[error("parameter `{name}` = {value} is outside [{min}, {max}]")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}
