//! Error utilities

/// Describes error reason
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    AlreadyExists,
    /// The request was rejected before reaching any object, e.g. because
    /// it used an option the backend does not implement.
    Unsupported,
    Invalid,
    /// Catch-all variant. Since this enum is non-exhaustive,
    /// it should be handled with `_` pattern
    Unknown,
}

/// Tries to classify k8s error
pub fn classify(error_reason: &str) -> ErrorClass {
    match error_reason {
        "NotFound" => ErrorClass::NotFound,
        "Conflict" => ErrorClass::Conflict,
        "AlreadyExists" => ErrorClass::AlreadyExists,
        "Invalid" => ErrorClass::Invalid,
        "MethodNotAllowed" | "NotAcceptable" => ErrorClass::Unsupported,
        _ => ErrorClass::Unknown,
    }
}

/// Tries to classify k8s error, wrapped in kube Error
pub fn classify_kube(error: &kube::Error) -> ErrorClass {
    match error {
        kube::Error::Api(api) => classify(&api.reason),
        _ => ErrorClass::Unknown,
    }
}

/// Errors which can tell what kind of API failure they represent.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

impl Classify for kube::Error {
    fn class(&self) -> ErrorClass {
        classify_kube(self)
    }
}

/// Turns an `AlreadyExists` error into `Ok(None)`.
pub fn ignore_already_exists<T, E: Classify>(res: Result<T, E>) -> Result<Option<T>, E> {
    ignore_class(res, ErrorClass::AlreadyExists)
}

/// Turns a `NotFound` error into `Ok(None)`.
pub fn ignore_not_found<T, E: Classify>(res: Result<T, E>) -> Result<Option<T>, E> {
    ignore_class(res, ErrorClass::NotFound)
}

fn ignore_class<T, E: Classify>(res: Result<T, E>, class: ErrorClass) -> Result<Option<T>, E> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.class() == class => Ok(None),
        Err(e) => Err(e),
    }
}
