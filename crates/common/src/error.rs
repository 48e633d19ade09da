use thiserror::Error;

/// Implemented by error types that can be built from a plain message, which
/// is all [`impl_context!`] needs from a crate's error enum.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Fallback error for the shared surfaces too small to justify their own sum
/// type. The protocol-facing crates all define structured errors; this one
/// carries a message or an I/O cause.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Generate a crate-local `Context` trait adding `.context()` and
/// `.with_context()` to `Result` and `Option`, producing that crate's own
/// `Error` via [`FromMessage`].
///
/// Invoke in a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`. The eager `context`
/// form delegates to the lazy one.
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;

            fn context(self, context: impl Into<String>) -> Result<T>
            where
                Self: Sized,
            {
                self.with_context(move || context)
            }
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|cause| {
                    let context: String = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{context}: {cause}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::{Error, FromMessage};

    type Result<T> = std::result::Result<T, Error>;
    crate::impl_context!();

    #[test]
    fn test_context_wraps_message() {
        let failed: std::result::Result<(), &str> = Err("socket closed");
        let err = failed.context("router dial").unwrap_err();
        assert_eq!(err.to_string(), "router dial: socket closed");
    }

    #[test]
    fn test_with_context_on_option() {
        let missing: Option<u16> = None;
        let err = missing
            .with_context(|| "no port configured".to_string())
            .unwrap_err();
        assert_eq!(err.to_string(), "no port configured");
        assert_eq!(Some(7).context("unused").unwrap(), 7);
    }
}
