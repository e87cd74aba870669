//! SDK error classification
//!
//! Maps aws-sdk-s3 failures onto the core taxonomy. Service errors are
//! classified by their S3 error code; timeouts, dispatch failures and
//! unparseable responses are transient.

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_types::error::display::DisplayErrorContext;

use sc_core::Error;

/// Classify an SDK error for the operation on `target`
pub(crate) fn from_sdk<E, R>(err: SdkError<E, R>, target: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let code = match &err {
        SdkError::ServiceError(service) => service.err().code().map(str::to_string),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            return Error::Transient(format!("{target}: {}", DisplayErrorContext(&err)));
        }
        SdkError::ConstructionFailure(_) => {
            return Error::General(format!("{target}: {}", DisplayErrorContext(&err)));
        }
        _ => None,
    };
    classify(code.as_deref(), &DisplayErrorContext(&err).to_string(), target)
}

/// Map an S3 error code to an error variant
pub(crate) fn classify(code: Option<&str>, detail: &str, target: &str) -> Error {
    match code {
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchUpload") => Error::NotFound(target.to_string()),
        Some(
            "AccessDenied" | "Forbidden" | "AllAccessDisabled" | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch" | "AccountProblem",
        ) => Error::AccessDenied(target.to_string()),
        Some(
            "SlowDown" | "Throttling" | "ThrottlingException" | "RequestTimeout" | "InternalError"
            | "ServiceUnavailable" | "RequestTimeTooSkewed",
        ) => Error::Transient(format!("{target}: {detail}")),
        Some(
            "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" | "BucketNotEmpty" | "OperationAborted"
            | "PreconditionFailed",
        ) => Error::Conflict(format!("{target}: {detail}")),
        _ => Error::General(format!("{target}: {detail}")),
    }
}
