//! Unified error type for the Omnibus runtime.

use omnibus_object::ApplyError;
use omnibus_runtime::SubscribeError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `omnibus` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum OmnibusError {
    /// An event could not be applied to an object.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// A subscribe request was refused.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// A runtime thread could not be spawned.
    #[error(transparent)]
    Launch(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnibus_object::Oid;

    #[test]
    fn test_from_apply_error() {
        let err = ApplyError::UnknownField("topic".into());
        let omnibus_err: OmnibusError = err.into();
        assert!(matches!(omnibus_err, OmnibusError::Apply(_)));
        assert!(omnibus_err.to_string().contains("topic"));
    }

    #[test]
    fn test_from_subscribe_error() {
        let err = SubscribeError::NoSuchObject(Oid(3));
        let omnibus_err: OmnibusError = err.into();
        assert!(matches!(omnibus_err, OmnibusError::Subscribe(_)));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::other("spawn failed");
        let omnibus_err: OmnibusError = err.into();
        assert!(matches!(omnibus_err, OmnibusError::Launch(_)));
    }
}
